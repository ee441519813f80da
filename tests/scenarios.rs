use kvtree::storage::Tree;
use kvtree::{Database, Key, PersistentDatabase, Value};

fn text(s: &str) -> Value {
    Value::from(s)
}

fn filled(keys: impl IntoIterator<Item = Key>) -> Database {
    let mut db = Database::new(4).unwrap();
    for key in keys {
        db.insert(key, Value::from(format!("value_{}", key))).unwrap();
    }
    db
}

#[test]
fn test_out_of_order_inserts_come_back_sorted() {
    let db = filled([10, 20, 5, 15, 25, 30, 35, 40]);
    let keys: Vec<Key> = db.get_all().into_iter().map(|(k, _)| k).collect();
    assert_eq!(keys, vec![5, 10, 15, 20, 25, 30, 35, 40]);
    assert!(db.height() > 1);
    assert!(db.validate());
}

#[test]
fn test_range_over_sequential_keys() {
    let db = filled(1..=20);
    let found = db.range_search(5, 10).unwrap();
    assert_eq!(found.len(), 6);
    assert_eq!(
        found.iter().map(|(k, _)| *k).collect::<Vec<_>>(),
        vec![5, 6, 7, 8, 9, 10]
    );
}

#[test]
fn test_deletes_keep_tree_valid() {
    let mut db = filled(1..=25);
    for key in [5, 10, 15, 20] {
        assert!(db.delete(key));
    }
    assert!(db.validate());
    assert_eq!(db.len(), 21);
}

#[test]
fn test_delete_on_empty_tree() {
    let mut tree = Tree::new(4).unwrap();
    assert!(!tree.delete(&1));
    assert_eq!(tree.len(), 0);
}

#[test]
fn test_duplicate_key_overwrites() {
    let mut db = Database::new(4).unwrap();
    db.insert(10, text("first")).unwrap();
    let previous = db.insert(10, text("second")).unwrap();
    assert_eq!(previous, Some(text("first")));
    assert_eq!(db.search(10), Some(&text("second")));
    assert_eq!(db.len(), 1);
}

#[test]
fn test_backup_restore_into_fresh_tree() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("backup.csv");
    let mut db = filled((1..=10).map(|i| i * 10));
    db.insert(15, Value::Float(2.0)).unwrap();
    db.insert(25, Value::Float(2.5)).unwrap();
    db.insert(35, Value::Int(-4)).unwrap();
    db.insert(45, Value::Bool(true)).unwrap();
    assert_eq!(db.backup(&path).unwrap(), 14);

    let mut fresh = Database::new(4).unwrap();
    assert_eq!(fresh.restore(&path).unwrap(), 14);
    assert_eq!(fresh.get_all(), db.get_all());
}

#[test]
fn test_json_export_import_into_fresh_tree() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("export.json");
    let mut db = filled([5, 10, 15]);
    db.insert(20, Value::Int(20)).unwrap();
    db.insert(25, Value::Bool(true)).unwrap();
    db.export_json(&path).unwrap();

    let mut fresh = Database::new(4).unwrap();
    assert_eq!(fresh.import_json(&path).unwrap(), 5);
    assert_eq!(fresh.get_all(), db.get_all());
}

#[test]
fn test_store_survives_reopen_through_commands() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("store.kvt");
    {
        let mut db = PersistentDatabase::open(&path, 4).unwrap();
        for key in 1..=30 {
            kvtree::command::run(&mut db, &format!("insert {} 'v{}'", key, key)).unwrap();
        }
        kvtree::command::run(&mut db, "delete 17").unwrap();
    }
    let db = PersistentDatabase::open(&path, 4).unwrap();
    assert_eq!(db.len(), 29);
    assert_eq!(db.search(30), Some(&text("v30")));
    assert_eq!(db.search(17), None);
    assert!(db.validate());
}
