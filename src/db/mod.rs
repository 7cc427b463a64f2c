mod schema;
pub mod cases;
pub mod encodings;
pub mod reports;
pub mod videos;

use anyhow::Result;
use rusqlite::Connection;
use std::path::Path;

pub use cases::MissingPersonCase;
pub use encodings::CaseEncoding;
pub use reports::{MatchRecord, PublicReport};
pub use schema::SCHEMA;
pub use videos::{ProcessingStatus, VideoMatch, VideoUpload};

pub struct Database {
    pub(crate) conn: Connection,
}

impl Database {
    pub fn open(path: &Path) -> Result<Self> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let conn = Connection::open(path)?;
        Ok(Self { conn })
    }

    pub fn initialize(&self) -> Result<()> {
        self.conn.execute_batch(SCHEMA)?;
        Ok(())
    }

    /// In-memory database with the schema applied, for tests.
    #[cfg(test)]
    pub(crate) fn open_in_memory() -> Result<Self> {
        let db = Self {
            conn: Connection::open_in_memory()?,
        };
        db.initialize()?;
        Ok(db)
    }
}
