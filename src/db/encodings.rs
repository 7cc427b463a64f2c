//! Cached face encodings for case reference photos.
//!
//! One row per (case, photo) pair, written once and never updated. Photos
//! where no face could be extracted have no row; the cache re-attempts
//! extraction on the next lookup rather than recording the absence.

use anyhow::Result;
use rusqlite::params;

use super::Database;

/// One cached reference encoding joined with its case.
#[derive(Debug, Clone)]
pub struct CaseEncoding {
    pub case_id: i64,
    pub full_name: String,
    pub encoding: Vec<f32>,
}

impl Database {
    /// Look up a cached encoding by exact (case, photo) key.
    pub fn get_encoding(&self, case_id: i64, photo_path: &str) -> Result<Option<Vec<f32>>> {
        let result = self.conn.query_row(
            "SELECT encoding FROM face_encodings WHERE case_id = ? AND photo_path = ?",
            params![case_id, photo_path],
            |row| row.get::<_, Vec<u8>>(0),
        );

        match result {
            Ok(bytes) => Ok(Some(bytes_to_embedding(&bytes))),
            Err(rusqlite::Error::QueryReturnedNoRows) => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    /// Persist a freshly extracted encoding. Rows are immutable once stored.
    pub fn store_encoding(&self, case_id: i64, photo_path: &str, encoding: &[f32]) -> Result<()> {
        self.conn.execute(
            "INSERT INTO face_encodings (case_id, photo_path, encoding) VALUES (?, ?, ?)",
            params![case_id, photo_path, embedding_to_bytes(encoding)],
        )?;
        Ok(())
    }

    /// All cached encodings belonging to active cases, for video scanning.
    pub fn get_active_case_encodings(&self) -> Result<Vec<CaseEncoding>> {
        let mut stmt = self.conn.prepare(
            r#"
            SELECT fe.case_id, mp.full_name, fe.encoding
            FROM face_encodings fe
            JOIN missing_persons mp ON fe.case_id = mp.id
            WHERE mp.status = 'active'
            ORDER BY fe.case_id ASC, fe.id ASC
            "#,
        )?;

        let encodings = stmt
            .query_map([], |row| {
                let bytes: Vec<u8> = row.get(2)?;
                Ok(CaseEncoding {
                    case_id: row.get(0)?,
                    full_name: row.get(1)?,
                    encoding: bytes_to_embedding(&bytes),
                })
            })?
            .filter_map(|r| r.ok())
            .collect();

        Ok(encodings)
    }

    pub fn count_encodings(&self) -> Result<i64> {
        let count: i64 =
            self.conn
                .query_row("SELECT COUNT(*) FROM face_encodings", [], |row| row.get(0))?;
        Ok(count)
    }
}

/// Convert f32 slice to bytes for storage
pub fn embedding_to_bytes(embedding: &[f32]) -> Vec<u8> {
    let mut bytes = Vec::with_capacity(embedding.len() * 4);
    for &val in embedding {
        bytes.extend_from_slice(&val.to_le_bytes());
    }
    bytes
}

/// Convert bytes back to f32 vector
pub fn bytes_to_embedding(bytes: &[u8]) -> Vec<f32> {
    bytes
        .chunks_exact(4)
        .map(|chunk| {
            let arr: [u8; 4] = chunk.try_into().unwrap();
            f32::from_le_bytes(arr)
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::super::Database;
    use super::*;

    #[test]
    fn test_embedding_conversion() {
        let original = vec![1.5, -2.3, 0.0, 100.0];
        let bytes = embedding_to_bytes(&original);
        let recovered = bytes_to_embedding(&bytes);
        assert_eq!(original, recovered);
    }

    #[test]
    fn test_store_and_lookup() {
        let db = Database::open_in_memory().unwrap();
        let case = db
            .create_case("MP-001", "Asha Verma", &["/uploads/family-cases/a.jpg".into()])
            .unwrap();

        assert!(db
            .get_encoding(case, "/uploads/family-cases/a.jpg")
            .unwrap()
            .is_none());

        let encoding = vec![0.25, -0.5, 0.75];
        db.store_encoding(case, "/uploads/family-cases/a.jpg", &encoding)
            .unwrap();

        let cached = db
            .get_encoding(case, "/uploads/family-cases/a.jpg")
            .unwrap()
            .unwrap();
        assert_eq!(cached, encoding);
    }

    #[test]
    fn test_active_case_encodings_excludes_inactive() {
        let db = Database::open_in_memory().unwrap();
        let a = db
            .create_case("MP-001", "Asha Verma", &["/uploads/family-cases/a.jpg".into()])
            .unwrap();
        let b = db
            .create_case("MP-002", "Ravi Kumar", &["/uploads/family-cases/b.jpg".into()])
            .unwrap();
        db.store_encoding(a, "/uploads/family-cases/a.jpg", &[0.1, 0.2])
            .unwrap();
        db.store_encoding(b, "/uploads/family-cases/b.jpg", &[0.3, 0.4])
            .unwrap();
        db.set_case_status(b, "inactive").unwrap();

        let encodings = db.get_active_case_encodings().unwrap();
        assert_eq!(encodings.len(), 1);
        assert_eq!(encodings[0].case_id, a);
        assert_eq!(encodings[0].full_name, "Asha Verma");
    }
}
