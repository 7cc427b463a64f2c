//! Database functions for uploaded videos and frame-level matches.

use anyhow::Result;
use rusqlite::params;

use super::Database;

/// Processing state of an uploaded video. Transitions are monotonic:
/// pending -> processing -> completed. There is no failed state; a crash
/// mid-run leaves the row at 'processing'.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProcessingStatus {
    Pending,
    Processing,
    Completed,
}

impl ProcessingStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            ProcessingStatus::Pending => "pending",
            ProcessingStatus::Processing => "processing",
            ProcessingStatus::Completed => "completed",
        }
    }

    pub fn from_str(s: &str) -> Self {
        match s {
            "processing" => ProcessingStatus::Processing,
            "completed" => ProcessingStatus::Completed,
            _ => ProcessingStatus::Pending,
        }
    }
}

/// An uploaded video and its processing progress.
#[derive(Debug, Clone)]
pub struct VideoUpload {
    pub id: i64,
    pub video_path: String,
    pub processing_status: ProcessingStatus,
    pub duration: f64,
    pub total_frames: i64,
    pub frames_processed: i64,
    pub created_at: String,
}

/// A persisted frame-level match.
#[derive(Debug, Clone)]
pub struct VideoMatch {
    pub id: i64,
    pub video_id: i64,
    pub case_id: i64,
    pub timestamp: f64,
    pub frame_path: String,
    pub confidence: f64,
}

impl Database {
    /// Register an uploaded video. Used by tests and registry seeding; the
    /// production upload flow writes these rows directly.
    pub fn create_video(&self, video_path: &str) -> Result<i64> {
        self.conn.execute(
            "INSERT INTO video_uploads (video_path) VALUES (?)",
            params![video_path],
        )?;
        Ok(self.conn.last_insert_rowid())
    }

    pub fn get_video(&self, id: i64) -> Result<Option<VideoUpload>> {
        let result = self.conn.query_row(
            r#"
            SELECT id, video_path, processing_status, duration, total_frames,
                   frames_processed, created_at
            FROM video_uploads
            WHERE id = ?
            "#,
            [id],
            |row| {
                Ok(VideoUpload {
                    id: row.get(0)?,
                    video_path: row.get(1)?,
                    processing_status: ProcessingStatus::from_str(&row.get::<_, String>(2)?),
                    duration: row.get(3)?,
                    total_frames: row.get(4)?,
                    frames_processed: row.get(5)?,
                    created_at: row.get(6)?,
                })
            },
        );

        match result {
            Ok(video) => Ok(Some(video)),
            Err(rusqlite::Error::QueryReturnedNoRows) => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    /// Ids of all videos still pending, oldest upload first.
    pub fn pending_video_ids(&self) -> Result<Vec<i64>> {
        let mut stmt = self.conn.prepare(
            "SELECT id FROM video_uploads WHERE processing_status = 'pending' ORDER BY created_at ASC",
        )?;
        let ids = stmt
            .query_map([], |row| row.get(0))?
            .filter_map(|r| r.ok())
            .collect();
        Ok(ids)
    }

    pub fn set_video_status(&self, id: i64, status: ProcessingStatus) -> Result<()> {
        self.conn.execute(
            "UPDATE video_uploads SET processing_status = ? WHERE id = ?",
            params![status.as_str(), id],
        )?;
        Ok(())
    }

    /// Persist container metadata discovered at the start of a run.
    pub fn set_video_metadata(&self, id: i64, duration: f64, total_frames: i64) -> Result<()> {
        self.conn.execute(
            "UPDATE video_uploads SET duration = ?, total_frames = ? WHERE id = ?",
            params![duration, total_frames, id],
        )?;
        Ok(())
    }

    /// Progress checkpoint after each sampled frame.
    pub fn set_frames_processed(&self, id: i64, frames: i64) -> Result<()> {
        self.conn.execute(
            "UPDATE video_uploads SET frames_processed = ? WHERE id = ?",
            params![frames, id],
        )?;
        Ok(())
    }

    /// Terminal transition: completed, with the progress counter pinned to
    /// the full frame count.
    pub fn complete_video(&self, id: i64, total_frames: i64) -> Result<()> {
        self.conn.execute(
            "UPDATE video_uploads SET processing_status = 'completed', frames_processed = ? WHERE id = ?",
            params![total_frames, id],
        )?;
        Ok(())
    }

    /// Insert one frame-level match. Committed immediately, not batched, so
    /// partial progress survives a crash.
    pub fn insert_video_match(
        &self,
        video_id: i64,
        case_id: i64,
        timestamp: f64,
        frame_path: &str,
        confidence: f64,
    ) -> Result<()> {
        self.conn.execute(
            r#"
            INSERT INTO video_matches (video_id, case_id, timestamp, frame_path, confidence)
            VALUES (?, ?, ?, ?, ?)
            "#,
            params![video_id, case_id, timestamp, frame_path, confidence],
        )?;
        Ok(())
    }

    pub fn video_matches(&self, video_id: i64) -> Result<Vec<VideoMatch>> {
        let mut stmt = self.conn.prepare(
            r#"
            SELECT id, video_id, case_id, timestamp, frame_path, confidence
            FROM video_matches
            WHERE video_id = ?
            ORDER BY id ASC
            "#,
        )?;

        let matches = stmt
            .query_map([video_id], |row| {
                Ok(VideoMatch {
                    id: row.get(0)?,
                    video_id: row.get(1)?,
                    case_id: row.get(2)?,
                    timestamp: row.get(3)?,
                    frame_path: row.get(4)?,
                    confidence: row.get(5)?,
                })
            })?
            .filter_map(|r| r.ok())
            .collect();

        Ok(matches)
    }
}

#[cfg(test)]
mod tests {
    use super::super::Database;
    use super::ProcessingStatus;

    #[test]
    fn test_status_roundtrip() {
        for status in [
            ProcessingStatus::Pending,
            ProcessingStatus::Processing,
            ProcessingStatus::Completed,
        ] {
            assert_eq!(ProcessingStatus::from_str(status.as_str()), status);
        }
    }

    #[test]
    fn test_pending_excludes_other_states() {
        let db = Database::open_in_memory().unwrap();
        let a = db.create_video("/uploads/videos/a.mp4").unwrap();
        let b = db.create_video("/uploads/videos/b.mp4").unwrap();
        db.set_video_status(a, ProcessingStatus::Processing).unwrap();

        assert_eq!(db.pending_video_ids().unwrap(), vec![b]);
    }

    #[test]
    fn test_complete_pins_progress() {
        let db = Database::open_in_memory().unwrap();
        let id = db.create_video("/uploads/videos/a.mp4").unwrap();
        db.set_video_metadata(id, 4.0, 120).unwrap();
        db.set_frames_processed(id, 90).unwrap();
        db.complete_video(id, 120).unwrap();

        let video = db.get_video(id).unwrap().unwrap();
        assert_eq!(video.processing_status, ProcessingStatus::Completed);
        assert_eq!(video.frames_processed, 120);
        assert_eq!(video.total_frames, 120);
    }
}
