//! Face matching for missing-person cases: public sighting reports and
//! uploaded videos are scored against cached reference embeddings of active
//! cases, sharing one SQLite database with the upload-facing service.

pub mod config;
pub mod db;
pub mod faces;
pub mod logging;
pub mod matching;
pub mod pipeline;
pub mod scheduler;
pub mod video;
