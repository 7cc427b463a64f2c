//! Database functions for missing-person cases.
//!
//! Cases are registered by the intake flow; this service only reads them,
//! except for the registration helper used when seeding a registry.

use anyhow::Result;
use rusqlite::params;

use super::Database;

/// A missing-person case with its ordered reference photo list.
#[derive(Debug, Clone)]
pub struct MissingPersonCase {
    pub id: i64,
    pub case_number: String,
    pub full_name: String,
    pub status: String,
    pub photo_paths: Vec<String>,
}

impl Database {
    /// Register a new case. `photo_paths` keeps its order; the first entry is
    /// the photo recorded on any match for this case.
    pub fn create_case(
        &self,
        case_number: &str,
        full_name: &str,
        photo_paths: &[String],
    ) -> Result<i64> {
        let paths_json = serde_json::to_string(photo_paths)?;
        self.conn.execute(
            "INSERT INTO missing_persons (case_number, full_name, photo_paths) VALUES (?, ?, ?)",
            params![case_number, full_name, paths_json],
        )?;
        Ok(self.conn.last_insert_rowid())
    }

    /// All cases with status 'active'. Only these participate in matching.
    pub fn get_active_cases(&self) -> Result<Vec<MissingPersonCase>> {
        let mut stmt = self.conn.prepare(
            r#"
            SELECT id, case_number, full_name, status, photo_paths
            FROM missing_persons
            WHERE status = 'active'
            ORDER BY created_at ASC
            "#,
        )?;

        let cases = stmt
            .query_map([], |row| {
                Ok((
                    row.get::<_, i64>(0)?,
                    row.get::<_, String>(1)?,
                    row.get::<_, String>(2)?,
                    row.get::<_, String>(3)?,
                    row.get::<_, String>(4)?,
                ))
            })?
            .filter_map(|r| r.ok())
            .map(|(id, case_number, full_name, status, paths_json)| MissingPersonCase {
                id,
                case_number,
                full_name,
                status,
                photo_paths: serde_json::from_str(&paths_json).unwrap_or_default(),
            })
            .collect();

        Ok(cases)
    }

    pub fn set_case_status(&self, case_id: i64, status: &str) -> Result<()> {
        self.conn.execute(
            "UPDATE missing_persons SET status = ?, updated_at = CURRENT_TIMESTAMP WHERE id = ?",
            params![status, case_id],
        )?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::super::Database;

    #[test]
    fn test_only_active_cases_returned() {
        let db = Database::open_in_memory().unwrap();
        let a = db
            .create_case("MP-001", "Asha Verma", &["/uploads/family-cases/a.jpg".into()])
            .unwrap();
        let b = db
            .create_case("MP-002", "Ravi Kumar", &["/uploads/family-cases/b.jpg".into()])
            .unwrap();
        db.set_case_status(b, "resolved").unwrap();

        let active = db.get_active_cases().unwrap();
        assert_eq!(active.len(), 1);
        assert_eq!(active[0].id, a);
        assert_eq!(active[0].photo_paths, vec!["/uploads/family-cases/a.jpg"]);
    }
}
