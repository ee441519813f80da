use std::ops::Index;
use std::path::Path;

use tracing::{debug, info, warn};

use crate::storage::{
    self, Key, NodeView, TracingObserver, Tree, TreeSnapshot, TreeStatistics, ValidationError,
    Value,
};
use crate::{backup, errors, export};

/// Key-value database on top of the B+ tree.
///
/// Validates entries before they reach the tree and adds the batch, range, backup and JSON
/// helpers. Structural events of the tree are forwarded to `tracing`.
pub struct Database {
    tree: Tree,
}

impl Database {
    pub fn new(order: usize) -> Result<Database, errors::Error> {
        let tree = Tree::with_observer(order, TracingObserver)?;
        info!(order, "Initialized database");
        Ok(Database { tree })
    }

    /// Rebuilds a database from a tree snapshot.
    pub fn from_snapshot(snapshot: TreeSnapshot<Key, Value>) -> Result<Database, errors::Error> {
        let tree = Tree::from_snapshot(snapshot, Some(Box::new(TracingObserver)))?;
        info!(
            order = tree.order(),
            size = tree.len(),
            "Loaded database from snapshot"
        );
        Ok(Database { tree })
    }

    pub fn snapshot(&self) -> TreeSnapshot<Key, Value> {
        self.tree.snapshot()
    }

    /// Inserts a pair, returning the previous value when the key already existed.
    ///
    /// # Errors
    /// Returns `Error::InvalidEntry` for an empty string or non-finite float; the tree is left
    /// untouched.
    pub fn insert(&mut self, key: Key, value: Value) -> Result<Option<Value>, errors::Error> {
        let value = value.validated().map_err(|e| {
            warn!(key, "Invalid entry. {}", e);
            e
        })?;
        debug!(key, value = %value, "Inserting entry");
        Ok(self.tree.insert(key, value))
    }

    /// Parses a key and a value from their text form and inserts them.
    pub fn insert_text(&mut self, key: &str, value: &str) -> Result<Option<Value>, errors::Error> {
        let key = parse_key(key)?;
        let value = Value::parse(value).map_err(|e| {
            warn!(key, "Invalid entry. {}", e);
            e
        })?;
        self.insert(key, value)
    }

    pub fn search(&self, key: Key) -> Option<&Value> {
        self.tree.search(&key)
    }

    pub fn contains_key(&self, key: Key) -> bool {
        self.tree.contains_key(&key)
    }

    pub fn delete(&mut self, key: Key) -> bool {
        let found = self.tree.delete(&key);
        debug!(key, found, "Deleted entry");
        found
    }

    pub fn remove(&mut self, key: Key) -> Option<Value> {
        let value = self.tree.remove(&key);
        debug!(key, found = value.is_some(), "Removed entry");
        value
    }

    /// Inserts every valid pair and skips the rest. Returns the number inserted.
    pub fn batch_insert<I>(&mut self, entries: I) -> usize
    where
        I: IntoIterator<Item = (Key, Value)>,
    {
        let mut total = 0;
        let mut inserted = 0;
        for (key, value) in entries {
            total += 1;
            if self.insert(key, value).is_ok() {
                inserted += 1;
            }
        }
        info!(inserted, total, "Batch insert completed");
        inserted
    }

    /// Pairs with `lo <= key <= hi` in ascending order.
    ///
    /// # Errors
    /// Returns `Error::InvalidOperation` when `lo > hi`.
    pub fn range_search(&self, lo: Key, hi: Key) -> Result<Vec<(Key, Value)>, errors::Error> {
        if lo > hi {
            return Err(err!(
                InvalidOperation,
                "Lower bound {} must not exceed upper bound {}",
                lo,
                hi
            ));
        }
        let entries = self.tree.range_query(&lo, &hi);
        debug!(lo, hi, found = entries.len(), "Range search");
        Ok(entries)
    }

    pub fn get_all(&self) -> Vec<(Key, Value)> {
        self.tree.get_all()
    }

    pub fn iter(&self) -> storage::btree::Iter<'_, Key, Value> {
        self.tree.iter()
    }

    pub fn clear(&mut self) {
        self.tree.clear();
        info!("Cleared database");
    }

    pub fn len(&self) -> usize {
        self.tree.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tree.is_empty()
    }

    pub fn order(&self) -> usize {
        self.tree.order()
    }

    pub fn height(&self) -> usize {
        self.tree.height()
    }

    pub fn statistics(&self) -> TreeStatistics {
        self.tree.statistics()
    }

    pub fn validate(&self) -> bool {
        self.tree.validate()
    }

    pub fn check(&self) -> Result<(), ValidationError> {
        self.tree.check()
    }

    pub fn structure(&self) -> NodeView<Key> {
        self.tree.structure()
    }

    pub fn levels(&self) -> Vec<Vec<&[Key]>> {
        self.tree.levels()
    }

    /// Writes every pair to a CSV backup. Returns the number of rows written.
    pub fn backup(&self, path: &Path) -> Result<usize, errors::Error> {
        let written = backup::save(path, self.tree.iter())?;
        info!(path = %path.display(), rows = written, "Backed up database");
        Ok(written)
    }

    /// Replaces the contents with a CSV backup. Returns the number of pairs restored.
    ///
    /// The file is read in full before anything is cleared, so a missing or unreadable backup
    /// leaves the database as it was.
    pub fn restore(&mut self, path: &Path) -> Result<usize, errors::Error> {
        let restored = backup::load(path)?;
        self.clear();
        let inserted = self.batch_insert(restored.entries);
        info!(
            path = %path.display(),
            rows = inserted,
            skipped = restored.skipped,
            "Restored database"
        );
        Ok(inserted)
    }

    /// Writes every pair to a JSON document. Returns the number of records written.
    pub fn export_json(&self, path: &Path) -> Result<usize, errors::Error> {
        let written = export::save(path, self.tree.iter())?;
        info!(path = %path.display(), records = written, "Exported database");
        Ok(written)
    }

    /// Replaces the contents with a JSON document. Returns the number of pairs imported.
    pub fn import_json(&mut self, path: &Path) -> Result<usize, errors::Error> {
        let imported = export::load(path)?;
        self.clear();
        let inserted = self.batch_insert(imported.entries);
        info!(
            path = %path.display(),
            records = inserted,
            skipped = imported.skipped,
            "Imported database"
        );
        Ok(inserted)
    }
}

impl Index<Key> for Database {
    type Output = Value;

    /// Returns the value for `key`.
    ///
    /// # Panics
    /// Panics if the key is not present. Use [`Database::search`] to handle absence.
    fn index(&self, key: Key) -> &Value {
        match self.search(key) {
            Some(value) => value,
            None => panic!("key {} not found", key),
        }
    }
}

impl std::fmt::Debug for Database {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "Database(order={}, size={}, height={})",
            self.tree.order(),
            self.tree.len(),
            self.tree.height()
        )
    }
}

/// Parses a key from its text form.
///
/// # Errors
/// Returns `Error::InvalidEntry` if the text is not an integer.
pub fn parse_key(text: &str) -> Result<Key, errors::Error> {
    text.trim()
        .parse::<Key>()
        .map_err(|_| err!(InvalidEntry, "Key '{}' is not an integer", text))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn filled(keys: impl IntoIterator<Item = Key>) -> Database {
        let mut db = Database::new(4).unwrap();
        for key in keys {
            db.insert(key, Value::from(format!("value_{}", key))).unwrap();
        }
        db
    }

    #[test]
    fn test_new_rejects_small_order() {
        assert_eq!(Database::new(2).unwrap_err().code(), 7000);
    }

    #[test]
    fn test_basic_operations() {
        let mut db = Database::new(4).unwrap();
        for (key, value) in [(10, "ten"), (20, "twenty"), (5, "five"), (15, "fifteen")] {
            assert_eq!(db.insert(key, Value::from(value)).unwrap(), None);
        }
        assert_eq!(db.len(), 4);
        assert_eq!(db.search(15), Some(&Value::from("fifteen")));
        assert_eq!(db.search(100), None);
        assert!(db.contains_key(20));

        assert!(db.delete(20));
        assert!(!db.contains_key(20));
        assert!(!db.delete(20));
        assert_eq!(db.len(), 3);
    }

    #[test]
    fn test_invalid_entries_leave_tree_untouched() {
        let mut db = filled(1..=3);
        assert_eq!(db.insert(4, Value::from("")).unwrap_err().code(), 4000);
        assert_eq!(db.insert(5, Value::Float(f64::NAN)).unwrap_err().code(), 4000);
        assert_eq!(db.insert_text("abc", "value").unwrap_err().code(), 4000);
        assert_eq!(db.insert_text("6", "").unwrap_err().code(), 4000);
        assert_eq!(db.len(), 3);
        assert!(db.validate());
    }

    #[test]
    fn test_insert_text_infers_value() {
        let mut db = Database::new(4).unwrap();
        db.insert_text("1", "42").unwrap();
        db.insert_text(" 2 ", "hello").unwrap();
        assert_eq!(db[1], Value::Int(42));
        assert_eq!(db[2], Value::from("hello"));
    }

    #[test]
    fn test_batch_insert_counts_valid_entries() {
        let mut db = Database::new(4).unwrap();
        let entries = (1..=20).map(|i| (i, Value::from(format!("value_{}", i))));
        assert_eq!(db.batch_insert(entries), 20);

        let mixed = vec![
            (21, Value::from("valid")),
            (22, Value::from("")),
            (23, Value::from("valid")),
        ];
        assert_eq!(db.batch_insert(mixed), 2);
        assert_eq!(db.len(), 22);
    }

    #[test]
    fn test_range_search() {
        let db = filled(1..=20);
        assert_eq!(db.range_search(5, 10).unwrap().len(), 6);
        assert_eq!(db.range_search(15, 25).unwrap().len(), 6);
        assert!(db.range_search(100, 200).unwrap().is_empty());
        assert_eq!(db.range_search(10, 5).unwrap_err().code(), 7000);
    }

    #[test]
    fn test_overwrite() {
        let mut db = Database::new(4).unwrap();
        db.insert(10, Value::from("first")).unwrap();
        let previous = db.insert(10, Value::from("second")).unwrap();
        assert_eq!(previous, Some(Value::from("first")));
        assert_eq!(db[10], Value::from("second"));
        assert_eq!(db.len(), 1);
    }

    #[test]
    #[should_panic(expected = "key 3 not found")]
    fn test_index_panics_on_missing_key() {
        let db = filled(1..=2);
        let _ = &db[3];
    }

    #[test]
    fn test_backup_and_restore() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("backup.csv");
        let db = filled((1..=10).map(|i| i * 10));
        assert_eq!(db.backup(&path).unwrap(), 10);

        let mut restored = filled([999]);
        assert_eq!(restored.restore(&path).unwrap(), 10);
        assert_eq!(restored.get_all(), db.get_all());
        assert!(!restored.contains_key(999));
    }

    #[test]
    fn test_restore_missing_file_keeps_contents() {
        let dir = tempfile::tempdir().unwrap();
        let mut db = filled(1..=5);
        let err = db.restore(&dir.path().join("missing.csv")).unwrap_err();
        assert_eq!(err.code(), 1000);
        assert_eq!(db.len(), 5);
    }

    #[test]
    fn test_export_and_import_json() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("export.json");
        let db = filled([5, 10, 15, 20, 25, 30, 35, 40]);
        assert_eq!(db.export_json(&path).unwrap(), 8);

        let mut imported = Database::new(4).unwrap();
        assert_eq!(imported.import_json(&path).unwrap(), 8);
        assert_eq!(imported.search(20), Some(&Value::from("value_20")));
        assert_eq!(imported.get_all(), db.get_all());
    }

    #[test]
    fn test_snapshot_round_trip() {
        let db = filled(1..=30);
        let restored = Database::from_snapshot(db.snapshot()).unwrap();
        assert_eq!(restored.get_all(), db.get_all());
        assert_eq!(restored.statistics(), db.statistics());
    }

    #[test]
    fn test_debug_summary() {
        let db = filled(1..=3);
        assert_eq!(format!("{:?}", db), "Database(order=4, size=3, height=1)");
    }
}
