//! Video pipeline: scans sampled frames of uploaded videos against cached
//! case encodings.
//!
//! Progress is checkpointed after every sampled frame and each match row is
//! committed immediately, so a crash mid-run loses at most the work since
//! the last sampled frame. Status never rolls back from 'processing'.

use anyhow::Result;
use image::DynamicImage;
use tracing::{info, warn};

use crate::config::Config;
use crate::db::{CaseEncoding, Database, ProcessingStatus};
use crate::faces::FaceEmbedder;
use crate::matching;
use crate::video::VideoSource;

pub struct VideoPipeline<'a> {
    db: &'a Database,
    embedder: &'a dyn FaceEmbedder,
    source: &'a dyn VideoSource,
    config: &'a Config,
}

/// One active case's cached encodings, grouped for per-frame scoring.
struct CaseCandidates {
    case_id: i64,
    full_name: String,
    encodings: Vec<Vec<f32>>,
}

fn group_by_case(rows: Vec<CaseEncoding>) -> Vec<CaseCandidates> {
    let mut cases: Vec<CaseCandidates> = Vec::new();

    for row in rows {
        match cases.last_mut() {
            Some(last) if last.case_id == row.case_id => last.encodings.push(row.encoding),
            _ => cases.push(CaseCandidates {
                case_id: row.case_id,
                full_name: row.full_name,
                encodings: vec![row.encoding],
            }),
        }
    }

    cases
}

impl<'a> VideoPipeline<'a> {
    pub fn new(
        db: &'a Database,
        embedder: &'a dyn FaceEmbedder,
        source: &'a dyn VideoSource,
        config: &'a Config,
    ) -> Self {
        Self { db, embedder, source, config }
    }

    /// Process every pending video, oldest upload first. Returns the number
    /// handled.
    pub fn process_pending(&self) -> Result<usize> {
        let ids = self.db.pending_video_ids()?;
        info!("Found {} pending video(s)", ids.len());

        for &id in &ids {
            self.process_video(id)?;
        }

        Ok(ids.len())
    }

    /// Process a single video. An unknown id or a missing file on disk is a
    /// logged no-op that leaves the status untouched, so a later run can
    /// retry once the file appears.
    pub fn process_video(&self, video_id: i64) -> Result<()> {
        let Some(video) = self.db.get_video(video_id)? else {
            warn!("Video {} not found in database", video_id);
            return Ok(());
        };

        let video_path = self.config.storage.resolve(&video.video_path);
        if !video_path.exists() {
            warn!("Video not found: {:?}", video_path);
            return Ok(());
        }

        info!("Processing video: {:?}", video_path);
        self.db.set_video_status(video_id, ProcessingStatus::Processing)?;

        let cases = group_by_case(self.db.get_active_case_encodings()?);
        if cases.is_empty() {
            info!("No active cases with face encodings found");
            self.db.set_video_status(video_id, ProcessingStatus::Completed)?;
            return Ok(());
        }

        let mut reader = self.source.open(&video_path)?;
        let fps = reader.fps();
        let total_frames = reader.frame_count();
        let duration = if fps > 0.0 {
            total_frames as f64 / fps
        } else {
            0.0
        };
        self.db.set_video_metadata(video_id, duration, total_frames)?;

        // A zero stride would divide by zero below; treat it as "every frame"
        let frame_skip = i64::from(self.config.matching.frame_skip).max(1);
        let threshold = self.config.matching.confidence_threshold;

        info!(
            "Total frames: {}, FPS: {}, Duration: {:.2}s",
            total_frames, fps, duration
        );
        info!("Processing every {}th frame", frame_skip);

        let frames_dir = self.config.storage.matched_frames_dir();
        std::fs::create_dir_all(&frames_dir)?;

        let mut frame_number: i64 = 0;

        while let Some(frame) = reader.next_frame()? {
            if frame_number % frame_skip == 0 {
                let img = DynamicImage::ImageRgb8(frame);

                let face_encodings = match self.embedder.detect_and_embed(&img) {
                    Ok(encodings) => encodings,
                    Err(e) => {
                        warn!("Face extraction failed at frame {}: {}", frame_number, e);
                        Vec::new()
                    }
                };

                for face in &face_encodings {
                    for case in &cases {
                        let confidence = matching::match_confidence(&case.encodings, face);

                        if matching::is_match(confidence, threshold) {
                            let timestamp = if fps > 0.0 {
                                frame_number as f64 / fps
                            } else {
                                0.0
                            };

                            let filename = format!(
                                "video_{}_case_{}_frame_{}.jpg",
                                video_id, case.case_id, frame_number
                            );
                            let frame_file = frames_dir.join(&filename);

                            if let Err(e) = img.save(&frame_file) {
                                warn!("Failed to save matched frame {:?}: {}", frame_file, e);
                                continue;
                            }

                            self.db.insert_video_match(
                                video_id,
                                case.case_id,
                                timestamp,
                                &format!("/uploads/matched-frames/{}", filename),
                                confidence,
                            )?;

                            info!(
                                "Match found at {:.2}s: {} (Confidence: {:.2}%)",
                                timestamp, case.full_name, confidence
                            );
                        }
                    }
                }

                self.db.set_frames_processed(video_id, frame_number)?;

                if frame_number % (frame_skip * 10) == 0 {
                    let progress = if total_frames > 0 {
                        frame_number as f64 / total_frames as f64 * 100.0
                    } else {
                        0.0
                    };
                    info!(
                        "Progress: {:.1}% ({}/{} frames)",
                        progress, frame_number, total_frames
                    );
                }
            }

            frame_number += 1;
        }

        self.db.complete_video(video_id, total_frames)?;
        info!("Video processing completed. Total frames: {}", frame_number);

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::video::VideoReader;
    use anyhow::Result;
    use image::RgbImage;
    use std::collections::HashMap;
    use std::path::Path;

    /// Embedder returning canned encodings keyed by frame width.
    struct StubEmbedder {
        by_width: HashMap<u32, Vec<Vec<f32>>>,
    }

    impl StubEmbedder {
        fn new(by_width: &[(u32, Vec<Vec<f32>>)]) -> Self {
            Self {
                by_width: by_width.iter().cloned().collect(),
            }
        }
    }

    impl FaceEmbedder for StubEmbedder {
        fn detect_and_embed(&self, img: &DynamicImage) -> Result<Vec<Vec<f32>>> {
            Ok(self.by_width.get(&img.width()).cloned().unwrap_or_default())
        }
    }

    /// Source yielding `total` synthetic frames; frame i has width i + 1 so
    /// the stub embedder can key on position.
    struct StubVideoSource {
        total: i64,
        fps: f64,
    }

    struct StubReader {
        total: i64,
        fps: f64,
        next: i64,
    }

    impl VideoSource for StubVideoSource {
        fn open(&self, _path: &Path) -> Result<Box<dyn VideoReader>> {
            Ok(Box::new(StubReader {
                total: self.total,
                fps: self.fps,
                next: 0,
            }))
        }
    }

    impl VideoReader for StubReader {
        fn frame_count(&self) -> i64 {
            self.total
        }

        fn fps(&self) -> f64 {
            self.fps
        }

        fn next_frame(&mut self) -> Result<Option<RgbImage>> {
            if self.next >= self.total {
                return Ok(None);
            }
            let frame = RgbImage::new(self.next as u32 + 1, 4);
            self.next += 1;
            Ok(Some(frame))
        }
    }

    fn test_setup() -> (Database, tempfile::TempDir, Config) {
        let db = Database::open_in_memory().unwrap();
        let dir = tempfile::tempdir().unwrap();
        let mut config = Config::default();
        config.storage.root = dir.path().to_path_buf();
        (db, dir, config)
    }

    fn seeded_case(db: &Database, encoding: &[f32]) -> i64 {
        let case = db
            .create_case("MP-001", "Asha Verma", &["/uploads/family-cases/a.png".into()])
            .unwrap();
        db.store_encoding(case, "/uploads/family-cases/a.png", encoding)
            .unwrap();
        case
    }

    fn seeded_video(db: &Database, config: &Config) -> i64 {
        let id = db.create_video("/uploads/videos/v1.mp4").unwrap();
        let full = config.storage.resolve("/uploads/videos/v1.mp4");
        std::fs::create_dir_all(full.parent().unwrap()).unwrap();
        std::fs::write(full, b"stub").unwrap();
        id
    }

    #[test]
    fn test_match_at_frame_60_has_timestamp_2s() {
        let (db, _dir, config) = test_setup();
        let case = seeded_case(&db, &[0.2]);
        let video = seeded_video(&db, &config);

        // only sampled frame 60 (width 61) contains a face at distance 0.2
        let embedder = StubEmbedder::new(&[(61, vec![vec![0.0]])]);
        let source = StubVideoSource { total: 100, fps: 30.0 };

        VideoPipeline::new(&db, &embedder, &source, &config)
            .process_video(video)
            .unwrap();

        let matches = db.video_matches(video).unwrap();
        assert_eq!(matches.len(), 1);
        assert_eq!(matches[0].case_id, case);
        assert!((matches[0].timestamp - 2.0).abs() < 1e-9);
        assert!((matches[0].confidence - 80.0).abs() < 1e-4);
        assert_eq!(
            matches[0].frame_path,
            format!("/uploads/matched-frames/video_{}_case_{}_frame_60.jpg", video, case)
        );

        // the matched frame image was persisted
        let saved = config
            .storage
            .matched_frames_dir()
            .join(format!("video_{}_case_{}_frame_60.jpg", video, case));
        assert!(saved.exists());

        let record = db.get_video(video).unwrap().unwrap();
        assert_eq!(record.processing_status, ProcessingStatus::Completed);
        assert_eq!(record.frames_processed, 100);
        assert_eq!(record.total_frames, 100);
        assert!((record.duration - 100.0 / 30.0).abs() < 1e-9);
    }

    #[test]
    fn test_unsampled_frames_are_not_analyzed() {
        let (db, _dir, config) = test_setup();
        seeded_case(&db, &[0.2]);
        let video = seeded_video(&db, &config);

        // a perfect face at frame 15, which the default stride skips
        let embedder = StubEmbedder::new(&[(16, vec![vec![0.2]])]);
        let source = StubVideoSource { total: 40, fps: 30.0 };

        VideoPipeline::new(&db, &embedder, &source, &config)
            .process_video(video)
            .unwrap();

        assert!(db.video_matches(video).unwrap().is_empty());
    }

    #[test]
    fn test_missing_file_leaves_status_pending() {
        let (db, _dir, config) = test_setup();
        seeded_case(&db, &[0.2]);
        let video = db.create_video("/uploads/videos/missing.mp4").unwrap();

        let embedder = StubEmbedder::new(&[]);
        let source = StubVideoSource { total: 10, fps: 30.0 };

        VideoPipeline::new(&db, &embedder, &source, &config)
            .process_video(video)
            .unwrap();

        let record = db.get_video(video).unwrap().unwrap();
        assert_eq!(record.processing_status, ProcessingStatus::Pending);
        assert_eq!(record.frames_processed, 0);
        // still eligible for retry by the scheduler
        assert_eq!(db.pending_video_ids().unwrap(), vec![video]);
    }

    #[test]
    fn test_no_encodings_completes_without_reading_frames() {
        let (db, _dir, config) = test_setup();
        let video = seeded_video(&db, &config);

        let embedder = StubEmbedder::new(&[]);
        let source = StubVideoSource { total: 10, fps: 30.0 };

        VideoPipeline::new(&db, &embedder, &source, &config)
            .process_video(video)
            .unwrap();

        let record = db.get_video(video).unwrap().unwrap();
        assert_eq!(record.processing_status, ProcessingStatus::Completed);
        // metadata was never read
        assert_eq!(record.total_frames, 0);
    }

    #[test]
    fn test_zero_frame_skip_samples_every_frame() {
        let (db, _dir, mut config) = test_setup();
        config.matching.frame_skip = 0;
        let case = seeded_case(&db, &[0.2]);
        let video = seeded_video(&db, &config);

        // a face on frame 1, which a 30-frame stride would skip
        let embedder = StubEmbedder::new(&[(2, vec![vec![0.0]])]);
        let source = StubVideoSource { total: 3, fps: 30.0 };

        VideoPipeline::new(&db, &embedder, &source, &config)
            .process_video(video)
            .unwrap();

        let matches = db.video_matches(video).unwrap();
        assert_eq!(matches.len(), 1);
        assert_eq!(matches[0].case_id, case);

        let record = db.get_video(video).unwrap().unwrap();
        assert_eq!(record.processing_status, ProcessingStatus::Completed);
    }

    #[test]
    fn test_zero_fps_yields_zero_duration_and_timestamps() {
        let (db, _dir, config) = test_setup();
        seeded_case(&db, &[0.2]);
        let video = seeded_video(&db, &config);

        let embedder = StubEmbedder::new(&[(1, vec![vec![0.0]])]);
        let source = StubVideoSource { total: 5, fps: 0.0 };

        VideoPipeline::new(&db, &embedder, &source, &config)
            .process_video(video)
            .unwrap();

        let record = db.get_video(video).unwrap().unwrap();
        assert_eq!(record.duration, 0.0);

        let matches = db.video_matches(video).unwrap();
        assert_eq!(matches.len(), 1);
        assert_eq!(matches[0].timestamp, 0.0);
    }
}
