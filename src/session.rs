use std::path::PathBuf;
use tracing::info;
use uuid::Uuid;

use crate::{errors, persistence::PersistentDatabase};

/// One interactive or one-shot connection to a database.
pub struct Session {
    pub id: Uuid,
    pub database: PersistentDatabase,
}

impl Session {
    /// Opens the store at `path`, or an in-memory database when no path is given.
    pub fn open(path: Option<PathBuf>, order: usize) -> Result<Self, errors::Error> {
        let database = match path {
            Some(path) => PersistentDatabase::open(path, order)?,
            None => PersistentDatabase::in_memory(order)?,
        };
        let session = Session {
            id: Uuid::new_v4(),
            database,
        };
        info!(session_id = %session.id, db = ?session.database, "Opened session");
        Ok(session)
    }

    pub fn close(&mut self) -> Result<(), errors::Error> {
        self.database.save()?;
        info!(session_id = %self.id, "Closed session");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::Value;

    #[test]
    fn test_session_ids_are_unique() {
        let a = Session::open(None, 4).unwrap();
        let b = Session::open(None, 4).unwrap();
        assert_ne!(a.id, b.id);
    }

    #[test]
    fn test_close_saves_store() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("session.kvt");
        let mut session = Session::open(Some(path.clone()), 4).unwrap();
        session.database.insert(1, Value::from("one")).unwrap();
        session.close().unwrap();

        let reopened = Session::open(Some(path), 4).unwrap();
        assert_eq!(reopened.database.search(1), Some(&Value::from("one")));
    }
}
