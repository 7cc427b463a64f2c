//! Report pipeline: matches one public sighting photo against all active
//! cases.
//!
//! A report is processed exactly once. Reports whose photo yields no face
//! are marked processed without matches and never retried.

use anyhow::Result;
use tracing::info;

use crate::config::Config;
use crate::db::Database;
use crate::faces::FaceEmbedder;
use crate::matching::{self, cache::load_face_encoding, CandidateMatch, EncodingCache};

pub struct ReportPipeline<'a> {
    db: &'a Database,
    embedder: &'a dyn FaceEmbedder,
    config: &'a Config,
}

impl<'a> ReportPipeline<'a> {
    pub fn new(db: &'a Database, embedder: &'a dyn FaceEmbedder, config: &'a Config) -> Self {
        Self { db, embedder, config }
    }

    /// Process every unprocessed report, oldest first. Returns the number
    /// handled.
    pub fn process_pending(&self) -> Result<usize> {
        let ids = self.db.pending_report_ids()?;
        info!("Found {} pending report(s)", ids.len());

        for &id in &ids {
            self.process_report(id)?;
        }

        Ok(ids.len())
    }

    /// Process a single report. A report that is unknown or already
    /// processed is a no-op.
    pub fn process_report(&self, id: i64) -> Result<()> {
        let Some(report) = self.db.get_unprocessed_report(id)? else {
            return Ok(());
        };

        info!("Processing report: {}", report.report_id);

        // Report photos are probed directly, never cached; only case
        // reference photos live in the encoding cache.
        let probe = load_face_encoding(self.embedder, &self.config.storage, &report.photo_path);

        let Some(probe) = probe else {
            // No face means this report can never match; terminal.
            self.db.mark_report_processed(id)?;
            return Ok(());
        };

        let cache = EncodingCache::new(self.db, self.embedder, &self.config.storage);
        let threshold = self.config.matching.confidence_threshold;
        let mut matches_found: Vec<CandidateMatch> = Vec::new();

        for case in self.db.get_active_cases()? {
            let candidates: Vec<Vec<f32>> = case
                .photo_paths
                .iter()
                .filter_map(|path| cache.get_or_create(case.id, path))
                .collect();

            // A case with no usable reference encodings is skipped entirely
            if candidates.is_empty() {
                continue;
            }

            let confidence = matching::match_confidence(&candidates, &probe);

            if matching::is_match(confidence, threshold) {
                info!(
                    "Match found: {} - Confidence: {:.2}%",
                    case.full_name, confidence
                );
                matches_found.push(CandidateMatch {
                    case_id: case.id,
                    confidence,
                    matched_photo: case.photo_paths[0].clone(),
                });
            }
        }

        self.db.record_report_matches(&report, &matches_found)?;
        info!("Report processed. Found {} match(es)", matches_found.len());

        Ok(())
    }
}
