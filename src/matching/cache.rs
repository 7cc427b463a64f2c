//! Lazy encoding cache over case reference photos.
//!
//! Encodings are computed once per (case, photo) pair and reused forever.
//! A photo with no detectable face yields nothing and is NOT negatively
//! cached: the next lookup re-attempts extraction, tolerating transient
//! detection failures at the cost of repeated work on faceless photos.

use std::path::Path;

use crate::config::StorageConfig;
use crate::db::Database;
use crate::faces::FaceEmbedder;

pub struct EncodingCache<'a> {
    db: &'a Database,
    embedder: &'a dyn FaceEmbedder,
    storage: &'a StorageConfig,
}

impl<'a> EncodingCache<'a> {
    pub fn new(db: &'a Database, embedder: &'a dyn FaceEmbedder, storage: &'a StorageConfig) -> Self {
        Self { db, embedder, storage }
    }

    /// Cached encoding for a (case, photo) pair, extracting and persisting
    /// it on first use. Returns None when no face can be obtained; never
    /// errors (failures are logged and treated as absent).
    pub fn get_or_create(&self, case_id: i64, photo_path: &str) -> Option<Vec<f32>> {
        match self.db.get_encoding(case_id, photo_path) {
            Ok(Some(encoding)) => return Some(encoding),
            Ok(None) => {}
            Err(e) => {
                tracing::error!("Encoding lookup failed for case {}: {}", case_id, e);
                return None;
            }
        }

        let encoding = load_face_encoding(self.embedder, self.storage, photo_path)?;

        if let Err(e) = self.db.store_encoding(case_id, photo_path, &encoding) {
            tracing::error!("Failed to persist encoding for case {}: {}", case_id, e);
            return None;
        }

        Some(encoding)
    }
}

/// Extract the first face encoding from an image on disk. Missing files,
/// undecodable images and embedder failures all log and return None.
pub fn load_face_encoding(
    embedder: &dyn FaceEmbedder,
    storage: &StorageConfig,
    photo_path: &str,
) -> Option<Vec<f32>> {
    let full_path = storage.resolve(photo_path);
    load_face_encoding_at(embedder, &full_path, photo_path)
}

fn load_face_encoding_at(
    embedder: &dyn FaceEmbedder,
    full_path: &Path,
    display_path: &str,
) -> Option<Vec<f32>> {
    if !full_path.exists() {
        tracing::warn!("Image not found: {:?}", full_path);
        return None;
    }

    let img = match image::open(full_path) {
        Ok(img) => img,
        Err(e) => {
            tracing::warn!("Error loading image {}: {}", display_path, e);
            return None;
        }
    };

    match embedder.embed_single_face(&img) {
        Ok(Some(encoding)) => Some(encoding),
        Ok(None) => {
            tracing::info!("No face detected in: {}", display_path);
            None
        }
        Err(e) => {
            tracing::warn!("Error extracting face from {}: {}", display_path, e);
            None
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::StorageConfig;
    use crate::db::Database;
    use anyhow::Result;
    use image::{DynamicImage, RgbImage};
    use std::cell::Cell;
    use std::collections::HashMap;

    /// Embedder returning canned encodings keyed by image width, counting
    /// invocations.
    struct StubEmbedder {
        by_width: HashMap<u32, Vec<Vec<f32>>>,
        calls: Cell<u32>,
    }

    impl StubEmbedder {
        fn new(by_width: &[(u32, Vec<Vec<f32>>)]) -> Self {
            Self {
                by_width: by_width.iter().cloned().collect(),
                calls: Cell::new(0),
            }
        }
    }

    impl FaceEmbedder for StubEmbedder {
        fn detect_and_embed(&self, img: &DynamicImage) -> Result<Vec<Vec<f32>>> {
            self.calls.set(self.calls.get() + 1);
            Ok(self
                .by_width
                .get(&img.width())
                .cloned()
                .unwrap_or_default())
        }
    }

    fn storage_with_image(width: u32, rel_path: &str) -> (tempfile::TempDir, StorageConfig) {
        let dir = tempfile::tempdir().unwrap();
        let storage = StorageConfig {
            root: dir.path().to_path_buf(),
        };
        let full = storage.resolve(rel_path);
        std::fs::create_dir_all(full.parent().unwrap()).unwrap();
        RgbImage::new(width, 4).save(&full).unwrap();
        (dir, storage)
    }

    #[test]
    fn test_second_lookup_hits_cache() {
        let db = Database::open_in_memory().unwrap();
        let case = db
            .create_case("MP-001", "Asha Verma", &["/uploads/family-cases/a.png".into()])
            .unwrap();
        let (_dir, storage) = storage_with_image(8, "/uploads/family-cases/a.png");
        let embedder = StubEmbedder::new(&[(8, vec![vec![0.25, 0.5]])]);
        let cache = EncodingCache::new(&db, &embedder, &storage);

        let first = cache.get_or_create(case, "/uploads/family-cases/a.png").unwrap();
        let second = cache.get_or_create(case, "/uploads/family-cases/a.png").unwrap();

        assert_eq!(first, second);
        assert_eq!(embedder.calls.get(), 1);
    }

    #[test]
    fn test_faceless_photo_is_not_negatively_cached() {
        let db = Database::open_in_memory().unwrap();
        let case = db
            .create_case("MP-001", "Asha Verma", &["/uploads/family-cases/a.png".into()])
            .unwrap();
        let (_dir, storage) = storage_with_image(8, "/uploads/family-cases/a.png");
        let embedder = StubEmbedder::new(&[]);
        let cache = EncodingCache::new(&db, &embedder, &storage);

        assert!(cache.get_or_create(case, "/uploads/family-cases/a.png").is_none());
        assert!(cache.get_or_create(case, "/uploads/family-cases/a.png").is_none());

        // extraction re-attempted on every miss
        assert_eq!(embedder.calls.get(), 2);
        assert_eq!(db.count_encodings().unwrap(), 0);
    }

    #[test]
    fn test_missing_file_returns_none_without_error() {
        let db = Database::open_in_memory().unwrap();
        let dir = tempfile::tempdir().unwrap();
        let storage = StorageConfig {
            root: dir.path().to_path_buf(),
        };
        let embedder = StubEmbedder::new(&[]);
        let cache = EncodingCache::new(&db, &embedder, &storage);

        assert!(cache.get_or_create(1, "/uploads/family-cases/missing.png").is_none());
        assert_eq!(embedder.calls.get(), 0);
    }
}
