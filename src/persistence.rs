//! Whole-database persistence.
//!
//! After every mutating call the entire tree is snapshotted with `bincode` and written to a
//! temporary file in the store's directory, which then atomically replaces the store file.
//! There is no log: a crash loses at most the mutation in flight, never the previous image.
use crate::database::Database;
use crate::errors::Error;
use crate::storage::{Key, TreeSnapshot, Value};
use bincode::{config, Decode, Encode};
use std::io::Write;
use std::ops::Deref;
use std::path::{Path, PathBuf};
use tempfile::NamedTempFile;
use tracing::{debug, info, warn};

/// Identifies a store file: "KVTR".
const STORE_MAGIC: u32 = 0x4b56_5452;
const STORE_VERSION: u16 = 1;

#[derive(Encode, Decode)]
struct StoreImage {
    magic: u32,
    version: u16,
    snapshot: TreeSnapshot<Key, Value>,
}

/// A [`Database`] that saves itself to disk after every mutation.
///
/// Read-only calls go straight to the wrapped database through `Deref`; every mutating call
/// is mirrored here so it can be followed by a save.
pub struct PersistentDatabase {
    path: Option<PathBuf>,
    db: Database,
}

impl PersistentDatabase {
    /// Opens the store at `path`, or starts an empty database if the file does not exist.
    ///
    /// # Errors
    /// Returns `Error::Encoding` or `Error::Db` if the file exists but does not hold a valid
    /// store image. The file is left as it is.
    pub fn open(path: impl Into<PathBuf>, order: usize) -> Result<Self, Error> {
        let path = path.into();
        let db = if path.exists() {
            let db = load(&path)?;
            if db.order() != order {
                warn!(
                    path = %path.display(),
                    stored = db.order(),
                    requested = order,
                    "Store was built with a different order; keeping the stored one"
                );
            }
            info!(path = %path.display(), size = db.len(), "Loaded persistent database");
            db
        } else {
            info!(path = %path.display(), "Created new persistent database");
            Database::new(order)?
        };
        Ok(PersistentDatabase {
            path: Some(path),
            db,
        })
    }

    /// A database that is never written to disk.
    pub fn in_memory(order: usize) -> Result<Self, Error> {
        Ok(PersistentDatabase {
            path: None,
            db: Database::new(order)?,
        })
    }

    pub fn path(&self) -> Option<&Path> {
        self.path.as_deref()
    }

    /// Writes the current image to the store file. Does nothing for an in-memory database.
    pub fn save(&self) -> Result<(), Error> {
        let Some(path) = &self.path else {
            return Ok(());
        };
        let image = StoreImage {
            magic: STORE_MAGIC,
            version: STORE_VERSION,
            snapshot: self.db.snapshot(),
        };
        let bytes = bincode::encode_to_vec(&image, config::standard())?;

        let dir = match path.parent() {
            Some(dir) if !dir.as_os_str().is_empty() => dir,
            _ => Path::new("."),
        };
        let mut file = NamedTempFile::new_in(dir)?;
        file.write_all(&bytes)?;
        file.as_file().sync_all()?;
        file.persist(path).map_err(|e| Error::Io(e.error))?;
        debug!(path = %path.display(), bytes = bytes.len(), "Saved database");
        Ok(())
    }

    pub fn insert(&mut self, key: Key, value: Value) -> Result<Option<Value>, Error> {
        let previous = self.db.insert(key, value)?;
        self.save()?;
        Ok(previous)
    }

    pub fn insert_text(&mut self, key: &str, value: &str) -> Result<Option<Value>, Error> {
        let previous = self.db.insert_text(key, value)?;
        self.save()?;
        Ok(previous)
    }

    /// Deletes `key`. The store is only rewritten when the key was present.
    pub fn delete(&mut self, key: Key) -> Result<bool, Error> {
        let found = self.db.delete(key);
        if found {
            self.save()?;
        }
        Ok(found)
    }

    pub fn remove(&mut self, key: Key) -> Result<Option<Value>, Error> {
        let value = self.db.remove(key);
        if value.is_some() {
            self.save()?;
        }
        Ok(value)
    }

    pub fn batch_insert<I>(&mut self, entries: I) -> Result<usize, Error>
    where
        I: IntoIterator<Item = (Key, Value)>,
    {
        let inserted = self.db.batch_insert(entries);
        self.save()?;
        Ok(inserted)
    }

    pub fn clear(&mut self) -> Result<(), Error> {
        self.db.clear();
        self.save()
    }

    pub fn restore(&mut self, path: &Path) -> Result<usize, Error> {
        let restored = self.db.restore(path)?;
        self.save()?;
        Ok(restored)
    }

    pub fn import_json(&mut self, path: &Path) -> Result<usize, Error> {
        let imported = self.db.import_json(path)?;
        self.save()?;
        Ok(imported)
    }

    pub fn into_inner(self) -> Database {
        self.db
    }
}

impl Deref for PersistentDatabase {
    type Target = Database;

    fn deref(&self) -> &Database {
        &self.db
    }
}

impl std::fmt::Debug for PersistentDatabase {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match &self.path {
            Some(path) => write!(f, "PersistentDatabase(file={}, {:?})", path.display(), self.db),
            None => write!(f, "PersistentDatabase(in-memory, {:?})", self.db),
        }
    }
}

fn load(path: &Path) -> Result<Database, Error> {
    let bytes = std::fs::read(path)?;
    let (image, _): (StoreImage, usize) = bincode::decode_from_slice(&bytes, config::standard())?;
    if image.magic != STORE_MAGIC {
        return Err(err!(Db, "{} is not a kvtree store", path.display()));
    }
    if image.version != STORE_VERSION {
        return Err(err!(
            Db,
            "Store {} has version {}, expected {}",
            path.display(),
            image.version,
            STORE_VERSION
        ));
    }
    Database::from_snapshot(image.snapshot)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_open_missing_file_starts_empty() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("store.kvt");
        let db = PersistentDatabase::open(&path, 4).unwrap();
        assert!(db.is_empty());
        assert_eq!(db.path(), Some(path.as_path()));
        assert!(!path.exists());
    }

    #[test]
    fn test_mutations_survive_reopen() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("store.kvt");

        let mut db = PersistentDatabase::open(&path, 4).unwrap();
        for key in 1..=25 {
            db.insert(key, Value::from(format!("value_{}", key))).unwrap();
        }
        assert!(db.delete(7).unwrap());
        assert!(!db.delete(7).unwrap());
        let expected = db.get_all();
        drop(db);

        let reopened = PersistentDatabase::open(&path, 4).unwrap();
        assert_eq!(reopened.get_all(), expected);
        assert_eq!(reopened.len(), 24);
        assert!(reopened.validate());
    }

    #[test]
    fn test_clear_is_saved() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("store.kvt");
        let mut db = PersistentDatabase::open(&path, 4).unwrap();
        db.batch_insert((1..=10).map(|i| (i, Value::Int(i)))).unwrap();
        db.clear().unwrap();
        drop(db);

        assert!(PersistentDatabase::open(&path, 4).unwrap().is_empty());
    }

    #[test]
    fn test_stored_order_wins() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("store.kvt");
        let mut db = PersistentDatabase::open(&path, 5).unwrap();
        db.insert(1, Value::from("one")).unwrap();
        drop(db);

        let reopened = PersistentDatabase::open(&path, 4).unwrap();
        assert_eq!(reopened.order(), 5);
    }

    #[test]
    fn test_corrupt_store_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("store.kvt");
        std::fs::write(&path, b"definitely not a store").unwrap();

        assert!(PersistentDatabase::open(&path, 4).is_err());
        assert_eq!(std::fs::read(&path).unwrap(), b"definitely not a store");
    }

    #[test]
    fn test_invalid_entry_is_not_saved() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("store.kvt");
        let mut db = PersistentDatabase::open(&path, 4).unwrap();
        assert!(db.insert(1, Value::from("")).is_err());
        assert!(!path.exists());
    }

    #[test]
    fn test_in_memory_never_touches_disk() {
        let mut db = PersistentDatabase::in_memory(4).unwrap();
        db.insert(1, Value::from("one")).unwrap();
        assert_eq!(db.path(), None);
        assert!(db.save().is_ok());
        assert_eq!(db.len(), 1);
    }
}
