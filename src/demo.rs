//! Scripted walk through the database features, printed section by section.
use crate::database::Database;
use crate::errors;
use crate::storage::{Key, Value};
use std::io::Write;
use std::path::Path;
use tracing::info;

const RULE_WIDTH: usize = 60;

fn section<W: Write>(out: &mut W, title: &str) -> Result<(), errors::Error> {
    let rule = "=".repeat(RULE_WIDTH);
    writeln!(out, "\n{}\n  {}\n{}\n", rule, title, rule)?;
    Ok(())
}

fn show(value: Option<&Value>) -> String {
    match value {
        Some(value) => value.to_string(),
        None => "None".to_string(),
    }
}

fn basic_operations<W: Write>(out: &mut W) -> Result<Database, errors::Error> {
    section(out, "1: Basic Operations")?;
    let mut db = Database::new(4)?;

    writeln!(out, "Inserting keys: 10, 20, 5, 15, 25, 30, 35, 40")?;
    let data = [
        (10, "ten"),
        (20, "twenty"),
        (5, "five"),
        (15, "fifteen"),
        (25, "twenty-five"),
        (30, "thirty"),
        (35, "thirty-five"),
        (40, "forty"),
    ];
    for (key, value) in data {
        db.insert(key, Value::from(value))?;
    }
    writeln!(out, "Inserted {} entries", data.len())?;
    writeln!(out, "Database size: {}", db.len())?;

    writeln!(out, "\nSearching for keys: 15, 25, 100")?;
    for key in [15, 25, 100] {
        writeln!(out, "  Key {}: {}", key, show(db.search(key)))?;
    }

    writeln!(out, "\nIs 20 in database? {}", db.contains_key(20))?;
    writeln!(out, "Is 100 in database? {}", db.contains_key(100))?;

    writeln!(out, "\nDeleting key 20...")?;
    db.delete(20);
    writeln!(out, "Is 20 still in database? {}", db.contains_key(20))?;
    writeln!(out, "Database size after deletion: {}", db.len())?;
    Ok(db)
}

fn dict_interface<W: Write>(out: &mut W) -> Result<Database, errors::Error> {
    section(out, "2: Dictionary-like Interface")?;
    let mut db = Database::new(4)?;

    db.insert(1, Value::from("one"))?;
    db.insert(2, Value::from("two"))?;
    db.insert(3, Value::from("three"))?;
    writeln!(out, "db[1] = {}", db[1])?;
    writeln!(out, "db[2] = {}", db[2])?;

    let previous = db.insert(2, Value::from("TWO"))?;
    writeln!(
        out,
        "\nUpdating key 2 (was {}): db[2] = {}",
        show(previous.as_ref()),
        db[2]
    )?;

    let removed = db.remove(3);
    writeln!(out, "\nRemoved key 3: {}", show(removed.as_ref()))?;
    writeln!(out, "Is 3 in database? {}", db.contains_key(3))?;
    Ok(db)
}

fn batch_operations<W: Write>(out: &mut W) -> Result<Database, errors::Error> {
    section(out, "3: Batch Operations")?;
    let mut db = Database::new(4)?;

    let entries: Vec<(Key, Value)> = (1..=20)
        .map(|i| (i, Value::from(format!("value_{}", i))))
        .collect();
    writeln!(out, "Batch inserting {} entries...", entries.len())?;
    let inserted = db.batch_insert(entries);
    writeln!(out, "Inserted {} entries", inserted)?;
    writeln!(out, "Database size: {}", db.len())?;

    writeln!(out, "\nTesting with some invalid entries...")?;
    let mixed = vec![
        (21, Value::from("valid")),
        (22, Value::from("")),
        (23, Value::Float(f64::NAN)),
        (24, Value::from("valid")),
    ];
    let total = mixed.len();
    let inserted = db.batch_insert(mixed);
    writeln!(out, "Inserted {} out of {} entries", inserted, total)?;
    Ok(db)
}

fn range_queries<W: Write>(out: &mut W) -> Result<Database, errors::Error> {
    section(out, "4: Range Queries")?;
    let mut db = Database::new(4)?;
    for i in 1..=20 {
        db.insert(i, Value::from(format!("value_{}", i)))?;
    }
    writeln!(out, "Database contains keys 1-20")?;

    writeln!(out, "\nRange [5, 10]:")?;
    for (key, value) in db.range_search(5, 10)? {
        writeln!(out, "  {}: {}", key, value)?;
    }
    writeln!(
        out,
        "\nRange [15, 25] (extends beyond data): found {} entries",
        db.range_search(15, 25)?.len()
    )?;
    writeln!(
        out,
        "Range [100, 200] (no data): found {} entries",
        db.range_search(100, 200)?.len()
    )?;
    if let Err(e) = db.range_search(10, 5) {
        writeln!(out, "Range [10, 5]: {}", e)?;
    }
    Ok(db)
}

fn backup_restore<W: Write>(out: &mut W, dir: &Path) -> Result<Database, errors::Error> {
    section(out, "5: Backup & Restore")?;
    let mut db = Database::new(4)?;
    for i in 1..=10 {
        db.insert(i * 10, Value::from(format!("value_{}", i * 10)))?;
    }
    writeln!(out, "Original database size: {}", db.len())?;
    let original = db.get_all();

    let path = dir.join("backup.csv");
    let written = db.backup(&path)?;
    writeln!(out, "Backed up {} rows to {}", written, path.display())?;

    let mut restored = Database::new(4)?;
    let count = restored.restore(&path)?;
    writeln!(out, "Restored {} rows into a new database", count)?;
    writeln!(out, "Data matches: {}", restored.get_all() == original)?;
    Ok(db)
}

fn json_export_import<W: Write>(out: &mut W, dir: &Path) -> Result<Database, errors::Error> {
    section(out, "6: JSON Export & Import")?;
    let mut db = Database::new(4)?;
    let data = [
        (5, "five"),
        (10, "ten"),
        (15, "fifteen"),
        (20, "twenty"),
        (25, "twenty-five"),
        (30, "thirty"),
        (35, "thirty-five"),
        (40, "forty"),
    ];
    for (key, value) in data {
        db.insert(key, Value::from(value))?;
    }
    writeln!(out, "Original database size: {}", db.len())?;

    let path = dir.join("export.json");
    let written = db.export_json(&path)?;
    writeln!(out, "Exported {} records to {}", written, path.display())?;

    let mut imported = Database::new(4)?;
    imported.import_json(&path)?;
    writeln!(out, "Imported database size: {}", imported.len())?;
    for (key, expected) in [(5, "five"), (20, "twenty"), (40, "forty")] {
        let found = imported.search(key);
        let mark = if found == Some(&Value::from(expected)) {
            "ok"
        } else {
            "MISMATCH"
        };
        writeln!(out, "  Key {}: {} {}", key, show(found), mark)?;
    }
    Ok(db)
}

fn statistics<W: Write>(out: &mut W) -> Result<Database, errors::Error> {
    section(out, "7: Tree Statistics")?;
    let mut db = Database::new(4)?;
    for i in 1..=15 {
        db.insert(i * 5, Value::from(format!("value_{}", i * 5)))?;
    }

    let stats = db.statistics();
    writeln!(out, "Size: {} entries", stats.size)?;
    writeln!(out, "Order: {}", stats.order)?;
    writeln!(out, "Height: {}", stats.height)?;
    writeln!(out, "Leaf nodes: {}", stats.leaf_nodes)?;
    writeln!(out, "Internal nodes: {}", stats.internal_nodes)?;
    Ok(db)
}

fn validation<W: Write>(out: &mut W) -> Result<Database, errors::Error> {
    section(out, "8: Tree Validation")?;
    let mut db = Database::new(4)?;
    for i in 1..=25 {
        db.insert(i, Value::from(format!("value_{}", i)))?;
    }
    for key in [5, 10, 15, 20] {
        db.delete(key);
    }
    writeln!(out, "Inserted 25 entries, deleted 4, size {}", db.len())?;
    match db.check() {
        Ok(()) => writeln!(out, "Tree is VALID")?,
        Err(e) => writeln!(out, "Tree is INVALID: {}", e)?,
    }
    Ok(db)
}

fn edge_cases<W: Write>(out: &mut W) -> Result<Database, errors::Error> {
    section(out, "9: Edge Cases & Error Handling")?;
    let mut db = Database::new(4)?;

    writeln!(out, "Search on empty: {}", show(db.search(1)))?;
    writeln!(out, "Delete on empty: {}", db.delete(1))?;
    writeln!(out, "Length of empty: {}", db.len())?;

    writeln!(out, "\nTesting invalid entries:")?;
    if let Err(e) = db.insert_text("invalid", "value") {
        writeln!(out, "  Insert text key: {}", e)?;
    }
    if let Err(e) = db.insert(1, Value::from("")) {
        writeln!(out, "  Insert empty value: {}", e)?;
    }

    writeln!(out, "\nTesting duplicate key handling:")?;
    db.insert(10, Value::from("first"))?;
    db.insert(10, Value::from("second"))?;
    writeln!(out, "  Current value: {}", show(db.search(10)))?;
    writeln!(out, "  Database size: {}", db.len())?;

    writeln!(out, "\nTesting clear operation:")?;
    db.insert(20, Value::from("value"))?;
    db.insert(30, Value::from("value"))?;
    writeln!(out, "  Size before clear: {}", db.len())?;
    db.clear();
    writeln!(out, "  Size after clear: {}", db.len())?;
    Ok(db)
}

/// Runs every section, writing the narration to `out`.
///
/// Backup and export files go to a temporary directory that is removed afterwards.
pub fn run<W: Write>(out: &mut W) -> Result<(), errors::Error> {
    info!("Running demo");
    let dir = tempfile::tempdir()?;

    basic_operations(out)?;
    dict_interface(out)?;
    batch_operations(out)?;
    range_queries(out)?;
    backup_restore(out, dir.path())?;
    json_export_import(out, dir.path())?;
    statistics(out)?;
    validation(out)?;
    let db = edge_cases(out)?;

    section(out, "Final Database State")?;
    writeln!(out, "Total entries: {}", db.len())?;
    for (key, value) in db.iter() {
        writeln!(out, "  {}: {}", key, value)?;
    }
    writeln!(out, "\n{:?}", db)?;

    section(out, "All sections completed")?;
    Ok(())
}
