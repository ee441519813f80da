//! The text command language spoken by the shell and the `--command` flag.
//!
//! One command per line, keyword first, optional trailing `;`:
//!
//! | **Command**          | **Effect**                                         |
//! |----------------------|----------------------------------------------------|
//! | `insert KEY VALUE`   | Insert or overwrite a pair                         |
//! | `get KEY`            | Look a key up                                      |
//! | `delete KEY`         | Remove a key                                       |
//! | `range LO HI`        | Pairs with `LO <= key <= HI`                       |
//! | `all`                | Every pair in key order                            |
//! | `count` / `height`   | Number of pairs / levels                           |
//! | `stats` / `validate` | Tree statistics / structural check                 |
//! | `tree`               | Keys of every node, level by level                 |
//! | `clear`              | Remove everything                                  |
//! | `backup` / `restore` | CSV file out / in                                  |
//! | `export` / `import`  | JSON file out / in                                 |
pub mod parser;
pub mod tokenizer;

pub use parser::parse;

use crate::errors;
use crate::persistence::PersistentDatabase;
use crate::storage::{Key, Value};
use std::path::PathBuf;
use tracing::{debug, info};

#[derive(Debug, Clone, PartialEq)]
pub enum Command {
    Insert { key: Key, value: Value },
    Get { key: Key },
    Delete { key: Key },
    Range { lo: Key, hi: Key },
    All,
    Count,
    Height,
    Stats,
    Validate,
    Tree,
    Clear,
    Backup { path: PathBuf },
    Restore { path: PathBuf },
    Export { path: PathBuf },
    Import { path: PathBuf },
}

#[derive(Debug, PartialEq)]
pub enum CommandResult {
    /// OK response from commands that change or write data
    Ok { affected_rows: usize },
    /// Result set from lookups and introspection
    ResultSet {
        columns: Vec<String>,
        rows: Vec<Vec<String>>,
    },
}

impl CommandResult {
    fn result_set(columns: &[&str], rows: Vec<Vec<String>>) -> Self {
        CommandResult::ResultSet {
            columns: columns.iter().map(|c| c.to_string()).collect(),
            rows,
        }
    }

    /// Renders the result the way the shell prints it.
    pub fn render(&self) -> String {
        match self {
            CommandResult::Ok { affected_rows } => format!(
                "Query OK, {} row{} affected",
                affected_rows,
                if *affected_rows == 1 { "" } else { "s" }
            ),
            CommandResult::ResultSet { rows, .. } if rows.is_empty() => "Empty set".to_string(),
            CommandResult::ResultSet { columns, rows } => format!(
                "{}{} row{} in set",
                build_table(columns, rows),
                rows.len(),
                if rows.len() == 1 { "" } else { "s" }
            ),
        }
    }
}

/// Execute a command against a database.
pub fn execute(
    db: &mut PersistentDatabase,
    command: Command,
) -> Result<CommandResult, errors::Error> {
    debug!(?command, "Executing command");
    let result = match command {
        Command::Insert { key, value } => {
            db.insert(key, value)?;
            CommandResult::Ok { affected_rows: 1 }
        }
        Command::Get { key } => {
            let rows = match db.search(key) {
                Some(value) => vec![entry_row(key, value)],
                None => Vec::new(),
            };
            CommandResult::result_set(&["Key", "Value", "Type"], rows)
        }
        Command::Delete { key } => CommandResult::Ok {
            affected_rows: usize::from(db.delete(key)?),
        },
        Command::Range { lo, hi } => {
            let rows = db
                .range_search(lo, hi)?
                .iter()
                .map(|(key, value)| entry_row(*key, value))
                .collect();
            CommandResult::result_set(&["Key", "Value", "Type"], rows)
        }
        Command::All => {
            let rows = db.iter().map(|(key, value)| entry_row(*key, value)).collect();
            CommandResult::result_set(&["Key", "Value", "Type"], rows)
        }
        Command::Count => {
            CommandResult::result_set(&["Count"], vec![vec![db.len().to_string()]])
        }
        Command::Height => {
            CommandResult::result_set(&["Height"], vec![vec![db.height().to_string()]])
        }
        Command::Stats => {
            let stats = db.statistics();
            let rows = [
                ("Size", stats.size),
                ("Order", stats.order),
                ("Height", stats.height),
                ("Leaf nodes", stats.leaf_nodes),
                ("Internal nodes", stats.internal_nodes),
            ]
            .into_iter()
            .map(|(name, value)| vec![name.to_string(), value.to_string()])
            .collect();
            CommandResult::result_set(&["Statistic", "Value"], rows)
        }
        Command::Validate => {
            let row = match db.check() {
                Ok(()) => vec!["VALID".to_string(), "-".to_string()],
                Err(e) => vec!["INVALID".to_string(), e.to_string()],
            };
            CommandResult::result_set(&["Status", "Detail"], vec![row])
        }
        Command::Tree => {
            let rows = db
                .levels()
                .iter()
                .enumerate()
                .map(|(level, nodes)| {
                    let nodes: Vec<String> = nodes.iter().map(|keys| format!("{:?}", keys)).collect();
                    vec![level.to_string(), nodes.join(" ")]
                })
                .collect();
            CommandResult::result_set(&["Level", "Nodes"], rows)
        }
        Command::Clear => {
            let affected_rows = db.len();
            db.clear()?;
            CommandResult::Ok { affected_rows }
        }
        Command::Backup { path } => CommandResult::Ok {
            affected_rows: db.backup(&path)?,
        },
        Command::Restore { path } => CommandResult::Ok {
            affected_rows: db.restore(&path)?,
        },
        Command::Export { path } => CommandResult::Ok {
            affected_rows: db.export_json(&path)?,
        },
        Command::Import { path } => CommandResult::Ok {
            affected_rows: db.import_json(&path)?,
        },
    };
    if let CommandResult::Ok { affected_rows } = &result {
        info!(affected_rows, "Command OK");
    }
    Ok(result)
}

/// Parses and executes one command line.
pub fn run(db: &mut PersistentDatabase, line: &str) -> Result<CommandResult, errors::Error> {
    execute(db, parse(line)?)
}

fn entry_row(key: Key, value: &Value) -> Vec<String> {
    vec![
        key.to_string(),
        value.to_string(),
        value.type_name().to_string(),
    ]
}

/// Builds an ASCII table from headers and rows.
///
/// # Arguments
/// * `headers` - Column headers.
/// * `rows` - Data rows.
///
/// # Returns
/// A formatted ASCII table as a `String`, or an empty string when there is nothing to show.
pub fn build_table(headers: &[String], rows: &[Vec<String>]) -> String {
    if headers.is_empty() || rows.is_empty() {
        return String::new();
    }

    let column_widths: Vec<usize> = headers
        .iter()
        .enumerate()
        .map(|(i, h)| {
            rows.iter()
                .filter_map(|r| r.get(i))
                .fold(h.chars().count(), |max, cell| max.max(cell.chars().count()))
        })
        .collect();
    let border = format!(
        "+{}+\n",
        column_widths
            .iter()
            .map(|w| "-".repeat(w + 2))
            .collect::<Vec<_>>()
            .join("+")
    );

    let mut result = String::new();
    result.push_str(&border);
    push_row(&mut result, headers, &column_widths);
    result.push_str(&border);
    for row in rows {
        push_row(&mut result, row, &column_widths);
    }
    result.push_str(&border);
    result
}

fn push_row(result: &mut String, cells: &[String], widths: &[usize]) {
    result.push('|');
    for (cell, width) in cells.iter().zip(widths) {
        result.push_str(&format!(" {:<width$} |", cell, width = width));
    }
    result.push('\n');
}
