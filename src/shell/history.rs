use std::fs::{File, OpenOptions};
use std::io::{self, BufRead, BufReader, BufWriter, Write};
use std::path::{Path, PathBuf};

/// Retrieves a file path in the user's home directory.
///
/// # Arguments
/// * `filename` - The name of the file to create the path for
///
/// # Returns
/// `None` if the home directory cannot be determined.
pub fn get_home_file(filename: &str) -> Option<PathBuf> {
    dirs::home_dir().map(|home| home.join(filename))
}

/// Appends a line to the history file.
///
/// # Errors
/// Returns an `io::Error` if the file cannot be opened or written to
pub fn append_history(line: &str, path: &Path) -> io::Result<()> {
    let file = OpenOptions::new().create(true).append(true).open(path)?;

    let mut writer = BufWriter::new(file);
    writeln!(writer, "{}", line.trim())?;
    writer.flush()?;
    Ok(())
}

/// Loads the command history from a file.
///
/// Returns an empty vector if the file cannot be opened or read. Blank lines are dropped.
pub fn load_history(path: &Path) -> Vec<String> {
    let file = match File::open(path) {
        Ok(file) => file,
        Err(_) => return Vec::new(),
    };

    BufReader::new(file)
        .lines()
        .filter_map(|line| {
            line.ok()
                .map(|s| s.trim().to_string())
                .filter(|s| !s.is_empty())
        })
        .collect()
}

/// In-memory history backed by an append-only file.
pub struct History {
    lines: Vec<String>,
    path: Option<PathBuf>,
}

impl History {
    pub fn open(path: Option<PathBuf>) -> Self {
        let lines = path.as_deref().map(load_history).unwrap_or_default();
        History { lines, path }
    }

    pub fn push(&mut self, line: &str) {
        let line = line.trim();
        if line.is_empty() {
            return;
        }
        self.lines.push(line.to_string());
        if let Some(path) = &self.path {
            if let Err(e) = append_history(line, path) {
                tracing::warn!("Failed to save history. {}", e);
            }
        }
    }

    pub fn lines(&self) -> &[String] {
        &self.lines
    }
}
