//! JSON export and import.
//!
//! The document is `{"count": N, "data": [{"key": K, "value": V}, ...]}` with records in
//! ascending key order.
use crate::errors::Error;
use crate::storage::{Key, Value};
use serde::{Deserialize, Serialize};
use std::io::{Read, Write};
use std::path::Path;
use tracing::{debug, warn};

#[derive(Serialize, Debug)]
pub struct ExportDocument<'a> {
    pub count: usize,
    pub data: Vec<ExportRecord<'a>>,
}

#[derive(Serialize, Debug)]
pub struct ExportRecord<'a> {
    pub key: Key,
    pub value: &'a Value,
}

/// Import side of the document. Values stay raw so one bad record does not fail the file.
#[derive(Deserialize, Debug)]
struct ImportDocument {
    #[serde(default)]
    count: Option<usize>,
    data: Vec<ImportRecord>,
}

#[derive(Deserialize, Debug)]
struct ImportRecord {
    key: serde_json::Value,
    value: serde_json::Value,
}

/// Records recovered from a document, plus how many had to be skipped.
#[derive(Debug, Default, PartialEq)]
pub struct Imported {
    pub entries: Vec<(Key, Value)>,
    pub skipped: usize,
}

/// Writes pairs as a pretty-printed document. Returns the number of records written.
pub fn write<'a, W, I>(writer: W, entries: I) -> Result<usize, Error>
where
    W: Write,
    I: IntoIterator<Item = (&'a Key, &'a Value)>,
{
    let data: Vec<ExportRecord> = entries
        .into_iter()
        .map(|(key, value)| ExportRecord { key: *key, value })
        .collect();
    let document = ExportDocument {
        count: data.len(),
        data,
    };
    serde_json::to_writer_pretty(writer, &document)?;
    Ok(document.count)
}

/// Reads records from a document.
///
/// Records whose key is not an integer or whose value is not a string, number or boolean are
/// skipped.
///
/// # Errors
/// Returns `Error::Serialization` if the input is not a document of the expected shape.
pub fn read<R: Read>(reader: R) -> Result<Imported, Error> {
    let document: ImportDocument = serde_json::from_reader(reader)?;
    if let Some(count) = document.count {
        if count != document.data.len() {
            warn!(
                count,
                records = document.data.len(),
                "Document count does not match its records"
            );
        }
    }

    let mut imported = Imported::default();
    for (index, record) in document.data.into_iter().enumerate() {
        match parse_record(&record) {
            Ok(entry) => imported.entries.push(entry),
            Err(e) => {
                warn!(index, "Skipping JSON record. {}", e);
                imported.skipped += 1;
            }
        }
    }
    debug!(
        records = imported.entries.len(),
        skipped = imported.skipped,
        "Read JSON records"
    );
    Ok(imported)
}

fn parse_record(record: &ImportRecord) -> Result<(Key, Value), Error> {
    let key = match &record.key {
        serde_json::Value::Number(n) => n.as_i64(),
        serde_json::Value::String(s) => s.trim().parse::<Key>().ok(),
        _ => None,
    }
    .ok_or_else(|| err!(InvalidEntry, "Key {} is not an integer", record.key))?;
    let value = Value::from_json(&record.value)?;
    Ok((key, value))
}

/// Writes a document file, replacing any existing one.
pub fn save<'a, I>(path: &Path, entries: I) -> Result<usize, Error>
where
    I: IntoIterator<Item = (&'a Key, &'a Value)>,
{
    let file = std::fs::File::create(path)?;
    let mut writer = std::io::BufWriter::new(file);
    let written = write(&mut writer, entries)?;
    writer.flush()?;
    Ok(written)
}

pub fn load(path: &Path) -> Result<Imported, Error> {
    let file = std::fs::File::open(path)?;
    read(std::io::BufReader::new(file))
}
