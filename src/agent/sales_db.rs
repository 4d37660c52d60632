//! SQLite repository behind the structured-data tools.

use std::path::Path;
use std::sync::Mutex;

use rusqlite::{Connection, OptionalExtension, params};
use serde::{Deserialize, Serialize};

const SCHEMA: &str = r#"
CREATE TABLE IF NOT EXISTS mdrt_requirement (
    region TEXT NOT NULL,
    category TEXT NOT NULL,
    fycc REAL NOT NULL,
    fyp REAL NOT NULL,
    case_count INTEGER NOT NULL,
    PRIMARY KEY (region, category)
);

CREATE TABLE IF NOT EXISTS agent_sales (
    name TEXT PRIMARY KEY,
    region TEXT NOT NULL,
    fycc REAL NOT NULL,
    fyp REAL NOT NULL,
    case_count INTEGER NOT NULL
);
"#;

/// Production thresholds for one category in one region.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Requirement {
    pub region: String,
    pub category: String,
    pub fycc: f64,
    pub fyp: f64,
    pub case_count: i64,
}

/// Year-to-date production of one agent.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AgentSales {
    pub name: String,
    pub region: String,
    pub fycc: f64,
    pub fyp: f64,
    pub case_count: i64,
}

impl AgentSales {
    pub fn meets(&self, requirement: &Requirement) -> bool {
        self.fycc >= requirement.fycc
            && self.fyp >= requirement.fyp
            && self.case_count >= requirement.case_count
    }
}

pub struct SalesRepository {
    conn: Mutex<Connection>,
}

impl SalesRepository {
    pub fn open(path: &Path) -> Result<Self, rusqlite::Error> {
        if let Some(parent) = path.parent()
            && !parent.as_os_str().is_empty()
        {
            let _ = std::fs::create_dir_all(parent);
        }
        let conn = Connection::open(path)?;
        conn.pragma_update(None, "journal_mode", "WAL")?;
        Self::init(conn)
    }

    pub fn open_in_memory() -> Result<Self, rusqlite::Error> {
        Self::init(Connection::open_in_memory()?)
    }

    fn init(conn: Connection) -> Result<Self, rusqlite::Error> {
        conn.execute_batch(SCHEMA)?;
        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    fn with_conn<T>(
        &self,
        f: impl FnOnce(&Connection) -> Result<T, rusqlite::Error>,
    ) -> Result<T, rusqlite::Error> {
        // A poisoned lock still guards a usable connection.
        let conn = self.conn.lock().unwrap_or_else(|e| e.into_inner());
        f(&conn)
    }

    pub fn requirement(
        &self,
        category: &str,
        region: &str,
    ) -> Result<Option<Requirement>, rusqlite::Error> {
        self.with_conn(|conn| {
            conn.query_row(
                "SELECT region, category, fycc, fyp, case_count FROM mdrt_requirement
                 WHERE region = ?1 COLLATE NOCASE AND category = ?2 COLLATE NOCASE",
                params![region, category],
                |row| {
                    Ok(Requirement {
                        region: row.get(0)?,
                        category: row.get(1)?,
                        fycc: row.get(2)?,
                        fyp: row.get(3)?,
                        case_count: row.get(4)?,
                    })
                },
            )
            .optional()
        })
    }

    pub fn agent_sales(&self, name: &str) -> Result<Option<AgentSales>, rusqlite::Error> {
        self.with_conn(|conn| {
            conn.query_row(
                "SELECT name, region, fycc, fyp, case_count FROM agent_sales
                 WHERE name = ?1 COLLATE NOCASE",
                params![name],
                |row| {
                    Ok(AgentSales {
                        name: row.get(0)?,
                        region: row.get(1)?,
                        fycc: row.get(2)?,
                        fyp: row.get(3)?,
                        case_count: row.get(4)?,
                    })
                },
            )
            .optional()
        })
    }

    pub fn upsert_requirement(&self, requirement: &Requirement) -> Result<(), rusqlite::Error> {
        self.with_conn(|conn| {
            conn.execute(
                "INSERT OR REPLACE INTO mdrt_requirement (region, category, fycc, fyp, case_count)
                 VALUES (?1, ?2, ?3, ?4, ?5)",
                params![
                    requirement.region,
                    requirement.category,
                    requirement.fycc,
                    requirement.fyp,
                    requirement.case_count
                ],
            )
            .map(|_| ())
        })
    }

    pub fn upsert_agent_sales(&self, sales: &AgentSales) -> Result<(), rusqlite::Error> {
        self.with_conn(|conn| {
            conn.execute(
                "INSERT OR REPLACE INTO agent_sales (name, region, fycc, fyp, case_count)
                 VALUES (?1, ?2, ?3, ?4, ?5)",
                params![
                    sales.name,
                    sales.region,
                    sales.fycc,
                    sales.fyp,
                    sales.case_count
                ],
            )
            .map(|_| ())
        })
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;

    pub(crate) fn seeded_repository() -> SalesRepository {
        let repo = SalesRepository::open_in_memory().unwrap();
        repo.upsert_requirement(&Requirement {
            region: "HK".to_string(),
            category: "MDRT".to_string(),
            fycc: 100_000.0,
            fyp: 300_000.0,
            case_count: 20,
        })
        .unwrap();
        repo.upsert_agent_sales(&AgentSales {
            name: "Peter Chan".to_string(),
            region: "HK".to_string(),
            fycc: 120_000.0,
            fyp: 350_000.0,
            case_count: 25,
        })
        .unwrap();
        repo.upsert_agent_sales(&AgentSales {
            name: "Mary Lee".to_string(),
            region: "Macau".to_string(),
            fycc: 50_000.0,
            fyp: 80_000.0,
            case_count: 9,
        })
        .unwrap();
        repo
    }

    #[test]
    fn test_lookup_requirement() {
        let repo = seeded_repository();
        let req = repo.requirement("mdrt", "hk").unwrap().unwrap();
        assert_eq!(req.case_count, 20);
        assert!(repo.requirement("TOT", "HK").unwrap().is_none());
    }

    #[test]
    fn test_lookup_agent_and_meets() {
        let repo = seeded_repository();
        let sales = repo.agent_sales("Peter Chan").unwrap().unwrap();
        let req = repo.requirement("MDRT", &sales.region).unwrap().unwrap();
        assert!(sales.meets(&req));
        assert!(repo.agent_sales("Nobody").unwrap().is_none());
    }

    #[test]
    fn test_parameters_are_not_interpolated() {
        let repo = seeded_repository();
        assert!(repo.agent_sales("x' OR '1'='1").unwrap().is_none());
    }

    #[test]
    fn test_open_file_creates_schema() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("sales.db");
        let repo = SalesRepository::open(&path).unwrap();
        assert!(repo.agent_sales("anyone").unwrap().is_none());
        assert!(path.exists());
    }
}
