use std::fmt;

/// Error type for database operations, including specific error codes.
///
/// Each variant represents a distinct error condition with a unique error code for easier
/// debugging. A missing key is never an error: lookups and deletes report it through their
/// normal return value.
#[derive(Debug)]
pub enum Error {
    /// I/O-related error (e.g., backup file missing).
    /// Error code: 1000
    Io(std::io::Error),
    /// Database-specific error (e.g., unusable snapshot).
    /// Error code: 2000
    Db(String),
    /// Command syntax error.
    /// Error code: 3000
    Syntax(String),
    /// Rejected key or value, reported before any mutation.
    /// Error code: 4000
    InvalidEntry(String),
    /// Snapshot encoding/decoding error.
    /// Error code: 5000
    Encoding(String),
    /// Backup or JSON (de)serialization error.
    /// Error code: 6000
    Serialization(String),
    /// Invalid operation (e.g., order below 3, inverted range bounds).
    /// Error code: 7000
    InvalidOperation(String),
    /// Miscellaneous uncategorized error.
    /// Error code: 9000
    Other(String),
}

impl Error {
    /// Returns the error code associated with this error variant.
    ///
    /// # Examples
    /// ```
    /// use kvtree::errors::Error;
    /// let err = Error::Syntax("Missing key".to_string());
    /// assert_eq!(err.code(), 3000);
    /// ```
    pub fn code(&self) -> u32 {
        match self {
            Error::Io(_) => 1000,
            Error::Db(_) => 2000,
            Error::Syntax(_) => 3000,
            Error::InvalidEntry(_) => 4000,
            Error::Encoding(_) => 5000,
            Error::Serialization(_) => 6000,
            Error::InvalidOperation(_) => 7000,
            Error::Other(_) => 9000,
        }
    }

    /// Returns a human-readable error category for this error variant.
    pub fn category(&self) -> &'static str {
        match self {
            Error::Io(_) => "I/O",
            Error::Db(_) => "Database",
            Error::Syntax(_) => "Syntax",
            Error::InvalidEntry(_) => "Invalid Entry",
            Error::Encoding(_) => "Encoding",
            Error::Serialization(_) => "Serialization",
            Error::InvalidOperation(_) => "Invalid Operation",
            Error::Other(_) => "Other",
        }
    }
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Error::Io(e) => write!(f, "[{}] I/O Error: {}", self.code(), e),
            Error::Db(msg) => write!(f, "[{}] Database Error: {}", self.code(), msg),
            Error::Syntax(msg) => write!(f, "[{}] Syntax Error: {}", self.code(), msg),
            Error::InvalidEntry(msg) => write!(f, "[{}] Invalid Entry: {}", self.code(), msg),
            Error::Encoding(msg) => write!(f, "[{}] Encoding Error: {}", self.code(), msg),
            Error::Serialization(msg) => {
                write!(f, "[{}] Serialization Error: {}", self.code(), msg)
            }
            Error::InvalidOperation(msg) => {
                write!(f, "[{}] Invalid Operation: {}", self.code(), msg)
            }
            Error::Other(msg) => write!(f, "[{}] Unknown Error: {}", self.code(), msg),
        }
    }
}

impl std::error::Error for Error {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Error::Io(err) => Some(err),
            _ => None,
        }
    }
}

impl From<std::io::Error> for Error {
    fn from(err: std::io::Error) -> Self {
        Error::Io(err)
    }
}

impl From<std::num::ParseIntError> for Error {
    fn from(err: std::num::ParseIntError) -> Self {
        Error::InvalidEntry(format!("Integer parsing error: {}", err))
    }
}

impl From<csv::Error> for Error {
    fn from(err: csv::Error) -> Self {
        Error::Serialization(format!("CSV error: {}", err))
    }
}

impl From<serde_json::Error> for Error {
    fn from(err: serde_json::Error) -> Self {
        Error::Serialization(format!("JSON error: {}", err))
    }
}

impl From<bincode::error::EncodeError> for Error {
    fn from(err: bincode::error::EncodeError) -> Self {
        Error::Encoding(format!("Failed to encode snapshot. {}", err))
    }
}

impl From<bincode::error::DecodeError> for Error {
    fn from(err: bincode::error::DecodeError) -> Self {
        Error::Encoding(format!("Failed to decode snapshot. {}", err))
    }
}

/// Convenience macro to create an `Error` with a formatted message.
///
/// # Examples
/// ```
/// use kvtree::err;
/// let err = err!(Syntax, "Missing key");
/// assert_eq!(err.code(), 3000);
///
/// let err = err!(InvalidEntry, "Key '{}' is not an integer", "abc");
/// assert_eq!(err.to_string(), "[4000] Invalid Entry: Key 'abc' is not an integer");
/// ```
#[macro_export]
macro_rules! err {
    ($variant:ident, $msg:expr) => {
        $crate::errors::Error::$variant($msg.to_string())
    };
    ($variant:ident, $fmt:expr, $($arg:tt)*) => {
        $crate::errors::Error::$variant(format!($fmt, $($arg)*))
    };
}
