//! Database functions for public sighting reports and their matches.

use anyhow::Result;
use rusqlite::params;

use super::Database;
use crate::matching::CandidateMatch;

/// A public sighting report awaiting (or past) matching.
#[derive(Debug, Clone)]
pub struct PublicReport {
    pub id: i64,
    pub report_id: String,
    pub photo_path: String,
    pub processed: bool,
    pub timestamp: String,
}

/// A persisted report-to-case match.
#[derive(Debug, Clone)]
pub struct MatchRecord {
    pub id: i64,
    pub case_id: i64,
    pub report_id: i64,
    pub confidence: f64,
    pub matched_photo: Option<String>,
    pub report_photo: Option<String>,
}

impl Database {
    /// File a new report. Used by tests and registry seeding; the production
    /// upload flow writes these rows directly.
    pub fn create_report(&self, report_id: &str, photo_path: &str) -> Result<i64> {
        self.conn.execute(
            "INSERT INTO public_reports (report_id, photo_path) VALUES (?, ?)",
            params![report_id, photo_path],
        )?;
        Ok(self.conn.last_insert_rowid())
    }

    /// Fetch a report only if it is still unprocessed.
    pub fn get_unprocessed_report(&self, id: i64) -> Result<Option<PublicReport>> {
        let result = self.conn.query_row(
            r#"
            SELECT id, report_id, photo_path, processed, timestamp
            FROM public_reports
            WHERE id = ? AND processed = 0
            "#,
            [id],
            |row| {
                Ok(PublicReport {
                    id: row.get(0)?,
                    report_id: row.get(1)?,
                    photo_path: row.get(2)?,
                    processed: row.get::<_, i64>(3)? != 0,
                    timestamp: row.get(4)?,
                })
            },
        );

        match result {
            Ok(report) => Ok(Some(report)),
            Err(rusqlite::Error::QueryReturnedNoRows) => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    /// Ids of all unprocessed reports, oldest first.
    pub fn pending_report_ids(&self) -> Result<Vec<i64>> {
        let mut stmt = self.conn.prepare(
            "SELECT id FROM public_reports WHERE processed = 0 ORDER BY timestamp ASC",
        )?;
        let ids = stmt
            .query_map([], |row| row.get(0))?
            .filter_map(|r| r.ok())
            .collect();
        Ok(ids)
    }

    /// Flip the processed flag. One-way; never reverts.
    pub fn mark_report_processed(&self, id: i64) -> Result<()> {
        self.conn.execute(
            "UPDATE public_reports SET processed = 1 WHERE id = ?",
            [id],
        )?;
        Ok(())
    }

    /// Persist all matches found for one report and mark it processed, as a
    /// single transaction. The processed flag is the last write, so a crash
    /// can never leave matches recorded against a still-pending report
    /// without them committing together.
    pub fn record_report_matches(
        &self,
        report: &PublicReport,
        matches: &[CandidateMatch],
    ) -> Result<()> {
        let tx = self.conn.unchecked_transaction()?;

        for m in matches {
            tx.execute(
                r#"
                INSERT INTO matches (case_id, report_id, confidence, matched_photo, report_photo)
                VALUES (?, ?, ?, ?, ?)
                "#,
                params![
                    m.case_id,
                    report.id,
                    m.confidence,
                    m.matched_photo,
                    report.photo_path
                ],
            )?;
        }

        tx.execute(
            "UPDATE public_reports SET processed = 1 WHERE id = ?",
            [report.id],
        )?;

        tx.commit()?;
        Ok(())
    }

    /// All matches recorded for a report.
    pub fn matches_for_report(&self, report_id: i64) -> Result<Vec<MatchRecord>> {
        let mut stmt = self.conn.prepare(
            r#"
            SELECT id, case_id, report_id, confidence, matched_photo, report_photo
            FROM matches
            WHERE report_id = ?
            ORDER BY id ASC
            "#,
        )?;

        let matches = stmt
            .query_map([report_id], |row| {
                Ok(MatchRecord {
                    id: row.get(0)?,
                    case_id: row.get(1)?,
                    report_id: row.get(2)?,
                    confidence: row.get(3)?,
                    matched_photo: row.get(4)?,
                    report_photo: row.get(5)?,
                })
            })?
            .filter_map(|r| r.ok())
            .collect();

        Ok(matches)
    }
}
