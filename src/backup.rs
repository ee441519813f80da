//! CSV backup and restore.
//!
//! A backup is a `Key,Value` header followed by one row per pair in ascending key order.
//! Values are written in their text form and inferred again on restore, so a string that looks
//! like a number comes back as a number.
use crate::errors::Error;
use crate::storage::{Key, Value};
use csv::{ReaderBuilder, StringRecord, WriterBuilder};
use std::io::{Read, Write};
use std::path::Path;
use tracing::{debug, warn};

pub const HEADER: [&str; 2] = ["Key", "Value"];

/// Rows recovered from a backup, plus how many rows had to be skipped.
#[derive(Debug, Default, PartialEq)]
pub struct Restored {
    pub entries: Vec<(Key, Value)>,
    pub skipped: usize,
}

/// Writes pairs as CSV rows under the `Key,Value` header. Returns the number of rows written.
pub fn write<'a, W, I>(writer: W, entries: I) -> Result<usize, Error>
where
    W: Write,
    I: IntoIterator<Item = (&'a Key, &'a Value)>,
{
    let mut writer = WriterBuilder::new().from_writer(writer);
    writer.write_record(HEADER)?;
    let mut written = 0;
    for (key, value) in entries {
        writer.write_record([key.to_string(), value.to_string()])?;
        written += 1;
    }
    writer.flush()?;
    Ok(written)
}

/// Reads pairs from CSV rows.
///
/// Rows without exactly two fields, with a non-integer key or with an empty value are skipped.
///
/// # Errors
/// Returns `Error::Serialization` if the header is not `Key,Value`.
pub fn read<R: Read>(reader: R) -> Result<Restored, Error> {
    let mut reader = ReaderBuilder::new().flexible(true).from_reader(reader);
    let headers = reader.headers()?.clone();
    if headers.iter().map(str::trim).ne(HEADER) {
        return Err(err!(
            Serialization,
            "Expected backup header 'Key,Value', found '{}'",
            headers.iter().collect::<Vec<_>>().join(",")
        ));
    }

    let mut restored = Restored::default();
    for (index, result) in reader.records().enumerate() {
        // the header is line 1
        let line = index + 2;
        match result.map_err(Error::from).and_then(|record| parse_row(&record)) {
            Ok(entry) => restored.entries.push(entry),
            Err(e) => {
                warn!(line, "Skipping backup row. {}", e);
                restored.skipped += 1;
            }
        }
    }
    debug!(
        rows = restored.entries.len(),
        skipped = restored.skipped,
        "Read backup rows"
    );
    Ok(restored)
}

fn parse_row(record: &StringRecord) -> Result<(Key, Value), Error> {
    if record.len() != 2 {
        return Err(err!(
            InvalidEntry,
            "Expected 2 fields, found {}",
            record.len()
        ));
    }
    let key = record[0].trim().parse::<Key>()?;
    let value = Value::parse(&record[1])?;
    Ok((key, value))
}

/// Writes a backup file, replacing any existing one.
pub fn save<'a, I>(path: &Path, entries: I) -> Result<usize, Error>
where
    I: IntoIterator<Item = (&'a Key, &'a Value)>,
{
    let file = std::fs::File::create(path)?;
    write(file, entries)
}

/// Reads a backup file.
///
/// # Errors
/// Returns `Error::Io` if the file cannot be opened.
pub fn load(path: &Path) -> Result<Restored, Error> {
    let file = std::fs::File::open(path)?;
    read(file)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_write_layout() {
        let entries = vec![
            (1, Value::from("one")),
            (2, Value::Int(20)),
            (3, Value::from("with, comma")),
        ];
        let mut buf = Vec::new();
        let written = write(&mut buf, entries.iter().map(|(k, v)| (k, v))).unwrap();
        assert_eq!(written, 3);
        assert_eq!(
            String::from_utf8(buf).unwrap(),
            "Key,Value\n1,one\n2,20\n3,\"with, comma\"\n"
        );
    }

    #[test]
    fn test_typed_values_survive_round_trip() {
        let entries = vec![
            (1, Value::Float(2.0)),
            (2, Value::Float(2.5)),
            (3, Value::Int(7)),
            (4, Value::Bool(false)),
            (5, Value::from("text")),
        ];
        let mut buf = Vec::new();
        write(&mut buf, entries.iter().map(|(k, v)| (k, v))).unwrap();
        let restored = read(buf.as_slice()).unwrap();
        assert_eq!(restored.entries, entries);
        assert_eq!(restored.skipped, 0);
    }

    #[test]
    fn test_read_skips_malformed_rows() {
        let text = "Key,Value\n10,ten\nabc,bad\n20\n30,\n40,true\n50,a,b\n";
        let restored = read(text.as_bytes()).unwrap();
        assert_eq!(
            restored.entries,
            vec![(10, Value::from("ten")), (40, Value::Bool(true))]
        );
        assert_eq!(restored.skipped, 4);
    }

    #[test]
    fn test_read_rejects_foreign_header() {
        let err = read("id,name\n1,x\n".as_bytes()).unwrap_err();
        assert_eq!(err.code(), 6000);
    }

    #[test]
    fn test_save_and_load_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("backup.csv");
        let entries: Vec<(Key, Value)> = (1..=10)
            .map(|i| (i * 10, Value::from(format!("value_{}", i * 10))))
            .collect();
        assert_eq!(save(&path, entries.iter().map(|(k, v)| (k, v))).unwrap(), 10);

        let restored = load(&path).unwrap();
        assert_eq!(restored.entries, entries);
        assert_eq!(restored.skipped, 0);
    }

    #[test]
    fn test_load_missing_file() {
        let dir = tempfile::tempdir().unwrap();
        let err = load(&dir.path().join("missing.csv")).unwrap_err();
        assert_eq!(err.code(), 1000);
    }
}
