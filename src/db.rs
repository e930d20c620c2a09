use anyhow::{Context, Result};
use rusqlite::Connection;
use std::path::Path;

/// Default database file, overridable with VOTER_DB_PATH
pub fn default_db_path() -> String {
    std::env::var("VOTER_DB_PATH").unwrap_or_else(|_| "voters.db".to_string())
}

/// Open the database file and make sure the schema exists
pub fn open_database(path: &Path) -> Result<Connection> {
    let conn = Connection::open(path)
        .with_context(|| format!("Failed to open database at {:?}", path))?;
    setup_database(&conn)?;
    Ok(conn)
}

pub fn setup_database(conn: &Connection) -> Result<()> {
    // Enable WAL mode for crash recovery
    conn.pragma_update(None, "journal_mode", "WAL")?;

    // ==========================================================================
    // Voters Table
    // voter_id is deliberately NOT unique: source rolls reuse identifiers
    // across re-publications, so uniqueness is decided by the import matcher.
    // ==========================================================================
    conn.execute(
        "CREATE TABLE IF NOT EXISTS voters (
            id TEXT PRIMARY KEY,
            sl_no TEXT NOT NULL,
            name TEXT NOT NULL,
            voter_id TEXT NOT NULL,
            father TEXT NOT NULL DEFAULT 'N/A',
            mother TEXT NOT NULL DEFAULT 'N/A',
            occupation TEXT NOT NULL DEFAULT 'N/A',
            dob TEXT,
            address TEXT NOT NULL DEFAULT 'N/A',
            voter_area_code TEXT NOT NULL,
            status TEXT NOT NULL DEFAULT 'Active',
            created_at TEXT NOT NULL
        )",
        [],
    )?;

    // ==========================================================================
    // Voter Areas Table (one row per published area code)
    // ==========================================================================
    conn.execute(
        "CREATE TABLE IF NOT EXISTS voter_areas (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            voter_area_code TEXT UNIQUE NOT NULL,
            district TEXT NOT NULL,
            upazila_thana TEXT NOT NULL,
            union_paurashava TEXT NOT NULL,
            ward_number TEXT NOT NULL,
            voter_area_name TEXT NOT NULL,
            post_office TEXT NOT NULL DEFAULT '',
            post_code TEXT NOT NULL DEFAULT '',
            total_voters INTEGER NOT NULL DEFAULT 0,
            total_male_voters INTEGER NOT NULL DEFAULT 0,
            publication_date TEXT,
            created_at TEXT NOT NULL
        )",
        [],
    )?;

    // ==========================================================================
    // Users Table (authentication principals)
    // ==========================================================================
    conn.execute(
        "CREATE TABLE IF NOT EXISTS users (
            id TEXT PRIMARY KEY,
            username TEXT UNIQUE NOT NULL,
            password TEXT NOT NULL,
            role TEXT NOT NULL DEFAULT 'user',
            status TEXT NOT NULL DEFAULT 'active',
            created_at TEXT NOT NULL
        )",
        [],
    )?;

    // ==========================================================================
    // Indexes
    // ==========================================================================
    conn.execute(
        "CREATE INDEX IF NOT EXISTS idx_voters_voter_id ON voters(voter_id)",
        [],
    )?;

    conn.execute(
        "CREATE INDEX IF NOT EXISTS idx_voters_area_code ON voters(voter_area_code)",
        [],
    )?;

    conn.execute(
        "CREATE INDEX IF NOT EXISTS idx_voters_status ON voters(status)",
        [],
    )?;

    conn.execute(
        "CREATE INDEX IF NOT EXISTS idx_voters_sl_no ON voters(sl_no)",
        [],
    )?;

    Ok(())
}

/// True when the error is a SQLite unique/constraint violation
pub fn is_constraint_violation(err: &rusqlite::Error) -> bool {
    matches!(
        err,
        rusqlite::Error::SqliteFailure(e, _)
            if e.code == rusqlite::ErrorCode::ConstraintViolation
    )
}
