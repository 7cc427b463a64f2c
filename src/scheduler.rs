//! Polling scheduler driving both processing queues.
//!
//! Each tick drains the pending reports first, then the pending videos.
//! A failed tick backs off before the next poll so a persistently broken
//! dependency does not spin the loop.

use std::sync::atomic::{AtomicBool, Ordering};
use std::thread;
use std::time::Duration;

use tracing::{error, info};

use crate::config::Config;
use crate::db::Database;
use crate::faces::FaceEmbedder;
use crate::pipeline::{ReportPipeline, VideoPipeline};
use crate::video::VideoSource;

/// Result of a single scheduler tick.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TickOutcome {
    /// Both queues were empty.
    Idle,
    /// At least one item was handled.
    Processed { reports: usize, videos: usize },
    /// A pipeline returned an error; the queues may be partially drained.
    Failed,
}

pub struct Scheduler<'a> {
    db: &'a Database,
    embedder: &'a dyn FaceEmbedder,
    source: &'a dyn VideoSource,
    config: &'a Config,
}

impl<'a> Scheduler<'a> {
    pub fn new(
        db: &'a Database,
        embedder: &'a dyn FaceEmbedder,
        source: &'a dyn VideoSource,
        config: &'a Config,
    ) -> Self {
        Self { db, embedder, source, config }
    }

    /// Run one polling cycle over both queues. Pipeline errors are logged
    /// here and reported in the outcome rather than propagated, so the
    /// polling loop always survives a bad item.
    pub fn tick(&self) -> TickOutcome {
        let mut failed = false;

        let reports = match ReportPipeline::new(self.db, self.embedder, self.config)
            .process_pending()
        {
            Ok(n) => n,
            Err(e) => {
                error!("Report processing failed: {:#}", e);
                failed = true;
                0
            }
        };

        let videos = match VideoPipeline::new(self.db, self.embedder, self.source, self.config)
            .process_pending()
        {
            Ok(n) => n,
            Err(e) => {
                error!("Video processing failed: {:#}", e);
                failed = true;
                0
            }
        };

        if failed {
            TickOutcome::Failed
        } else if reports == 0 && videos == 0 {
            TickOutcome::Idle
        } else {
            TickOutcome::Processed { reports, videos }
        }
    }

    /// Poll until `shutdown` is set. Consecutive failed ticks double the
    /// wait up to eight poll intervals; any non-failed tick resets it.
    pub fn run(&self, poll_interval: Duration, shutdown: &AtomicBool) {
        let mut consecutive_failures: u32 = 0;

        info!(
            "Scheduler running, polling every {} seconds",
            poll_interval.as_secs()
        );

        while !shutdown.load(Ordering::Relaxed) {
            match self.tick() {
                TickOutcome::Failed => consecutive_failures += 1,
                _ => consecutive_failures = 0,
            }

            let wait = backoff_interval(poll_interval, consecutive_failures);
            if consecutive_failures > 0 {
                info!(
                    "Backing off for {} seconds after {} failed tick(s)",
                    wait.as_secs(),
                    consecutive_failures
                );
            }

            sleep_interruptible(wait, shutdown);
        }

        info!("Scheduler stopped");
    }
}

fn backoff_interval(base: Duration, consecutive_failures: u32) -> Duration {
    let factor = 1u32 << consecutive_failures.min(3);
    base * factor
}

/// Sleep in short slices so a shutdown request is honored promptly.
fn sleep_interruptible(total: Duration, shutdown: &AtomicBool) {
    let slice = Duration::from_millis(250);
    let mut remaining = total;

    while !remaining.is_zero() && !shutdown.load(Ordering::Relaxed) {
        let step = remaining.min(slice);
        thread::sleep(step);
        remaining -= step;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use anyhow::Result;
    use image::{DynamicImage, RgbImage};
    use std::path::Path;

    struct NoFaceEmbedder;

    impl FaceEmbedder for NoFaceEmbedder {
        fn detect_and_embed(&self, _img: &DynamicImage) -> Result<Vec<Vec<f32>>> {
            Ok(Vec::new())
        }
    }

    struct EmptyVideoSource;

    struct EmptyReader;

    impl crate::video::VideoSource for EmptyVideoSource {
        fn open(&self, _path: &Path) -> Result<Box<dyn crate::video::VideoReader>> {
            Ok(Box::new(EmptyReader))
        }
    }

    impl crate::video::VideoReader for EmptyReader {
        fn frame_count(&self) -> i64 {
            0
        }

        fn fps(&self) -> f64 {
            30.0
        }

        fn next_frame(&mut self) -> Result<Option<RgbImage>> {
            Ok(None)
        }
    }

    #[test]
    fn test_tick_idle_on_empty_queues() {
        let db = Database::open_in_memory().unwrap();
        let dir = tempfile::tempdir().unwrap();
        let mut config = Config::default();
        config.storage.root = dir.path().to_path_buf();

        let scheduler = Scheduler::new(&db, &NoFaceEmbedder, &EmptyVideoSource, &config);
        assert_eq!(scheduler.tick(), TickOutcome::Idle);
    }

    #[test]
    fn test_tick_counts_handled_items() {
        let db = Database::open_in_memory().unwrap();
        let dir = tempfile::tempdir().unwrap();
        let mut config = Config::default();
        config.storage.root = dir.path().to_path_buf();

        // a report whose photo is missing resolves as a faceless no-op,
        // and a video with zero frames completes immediately
        db.create_report("r-1", "/uploads/public-reports/r1.jpg")
            .unwrap();
        db.create_video("/uploads/videos/v1.mp4").unwrap();
        let full = config.storage.resolve("/uploads/videos/v1.mp4");
        std::fs::create_dir_all(full.parent().unwrap()).unwrap();
        std::fs::write(full, b"stub").unwrap();

        let scheduler = Scheduler::new(&db, &NoFaceEmbedder, &EmptyVideoSource, &config);
        assert_eq!(
            scheduler.tick(),
            TickOutcome::Processed { reports: 1, videos: 1 }
        );

        assert!(db.pending_report_ids().unwrap().is_empty());
        assert!(db.pending_video_ids().unwrap().is_empty());
        assert_eq!(scheduler.tick(), TickOutcome::Idle);
    }

    #[test]
    fn test_backoff_doubles_and_caps() {
        let base = Duration::from_secs(10);
        assert_eq!(backoff_interval(base, 0), Duration::from_secs(10));
        assert_eq!(backoff_interval(base, 1), Duration::from_secs(20));
        assert_eq!(backoff_interval(base, 2), Duration::from_secs(40));
        assert_eq!(backoff_interval(base, 3), Duration::from_secs(80));
        assert_eq!(backoff_interval(base, 9), Duration::from_secs(80));
    }
}
