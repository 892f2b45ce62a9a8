use anyhow::Result;
use rusqlite::Connection;
use serde::{Deserialize, Serialize};

const DB_PATH: &str = "data/rankings.sqlite";

/// Canonical projection of one raw ranking record. `id` is the upsert key.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TeamRecord {
    pub id: i64,
    pub team_name: String,
    pub total_points: f64,
    pub age: i64,
    pub gender: String,
    pub national_rank: Option<i64>,
}

pub fn connect() -> Result<Connection> {
    if let Some(parent) = std::path::Path::new(DB_PATH).parent() {
        std::fs::create_dir_all(parent)?;
    }
    let conn = Connection::open(DB_PATH)?;
    conn.execute_batch("PRAGMA journal_mode=WAL;")?;
    Ok(conn)
}

pub fn init_schema(conn: &Connection) -> Result<()> {
    conn.execute_batch(
        "
        CREATE TABLE IF NOT EXISTS team_ranking_data (
            id            INTEGER PRIMARY KEY,
            team_name     TEXT NOT NULL,
            total_points  REAL NOT NULL,
            age           INTEGER NOT NULL,
            gender        TEXT NOT NULL,
            national_rank INTEGER,
            updated_at    TEXT NOT NULL DEFAULT (datetime('now'))
        );
        CREATE INDEX IF NOT EXISTS idx_teams_gender_age ON team_ranking_data(gender, age);
        ",
    )?;
    Ok(())
}

/// Insert-or-update the whole batch keyed on `id`, inside one transaction.
/// Either every row lands or none do.
pub fn upsert_teams(conn: &Connection, teams: &[TeamRecord]) -> Result<usize> {
    let tx = conn.unchecked_transaction()?;
    {
        let mut stmt = tx.prepare(
            "INSERT INTO team_ranking_data
             (id, team_name, total_points, age, gender, national_rank)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6)
             ON CONFLICT(id) DO UPDATE SET
                 team_name     = excluded.team_name,
                 total_points  = excluded.total_points,
                 age           = excluded.age,
                 gender        = excluded.gender,
                 national_rank = excluded.national_rank,
                 updated_at    = datetime('now')",
        )?;
        for t in teams {
            stmt.execute(rusqlite::params![
                t.id,
                t.team_name,
                t.total_points,
                t.age,
                t.gender,
                t.national_rank,
            ])?;
        }
    }
    tx.commit()?;
    Ok(teams.len())
}

/// Full table read, ordered by id. Used by `stats` and by ingestion tests to
/// verify the stored set.
pub fn fetch_teams(conn: &Connection) -> Result<Vec<TeamRecord>> {
    let mut stmt = conn.prepare(
        "SELECT id, team_name, total_points, age, gender, national_rank
         FROM team_ranking_data
         ORDER BY id",
    )?;
    let rows = stmt
        .query_map([], |row| {
            Ok(TeamRecord {
                id: row.get(0)?,
                team_name: row.get(1)?,
                total_points: row.get(2)?,
                age: row.get(3)?,
                gender: row.get(4)?,
                national_rank: row.get(5)?,
            })
        })?
        .collect::<Result<Vec<_>, _>>()?;
    Ok(rows)
}

pub struct Stats {
    pub total: usize,
    pub male: usize,
    pub female: usize,
    pub nationally_ranked: usize,
}

pub fn get_stats(conn: &Connection) -> Result<Stats> {
    let total: usize = conn.query_row("SELECT COUNT(*) FROM team_ranking_data", [], |r| r.get(0))?;
    let male: usize = conn.query_row(
        "SELECT COUNT(*) FROM team_ranking_data WHERE gender = 'm'",
        [],
        |r| r.get(0),
    )?;
    let female: usize = conn.query_row(
        "SELECT COUNT(*) FROM team_ranking_data WHERE gender = 'f'",
        [],
        |r| r.get(0),
    )?;
    let nationally_ranked: usize = conn.query_row(
        "SELECT COUNT(*) FROM team_ranking_data WHERE national_rank IS NOT NULL",
        [],
        |r| r.get(0),
    )?;
    Ok(Stats {
        total,
        male,
        female,
        nationally_ranked,
    })
}
