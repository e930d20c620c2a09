// 👤 User Entity - authentication principals
//
// Session plumbing lives outside this crate; what lives here is the stored
// principal, password hashing/verification, and the rule that the bootstrap
// "admin" account is untouchable.

use anyhow::{bail, Result};
use chrono::{DateTime, Utc};
use rusqlite::{params, Connection};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

use crate::db::is_constraint_violation;

/// Username of the bootstrap account. Never deletable, never listed.
pub const ADMIN_USERNAME: &str = "admin";

const USER_COLUMNS: &str = "id, username, password, role, status, created_at";

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct User {
    pub id: String,
    pub username: String,

    /// Salted digest, format "salt$hex". Never serialized.
    #[serde(skip_serializing, default)]
    pub password: String,

    pub role: String,
    pub status: String,
    pub created_at: DateTime<Utc>,
}

// ============================================================================
// PASSWORD HASHING
// ============================================================================

fn salted_digest(salt: &str, password: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(salt.as_bytes());
    hasher.update(password.as_bytes());
    format!("{:x}", hasher.finalize())
}

/// Hash a password with a fresh random salt
pub fn hash_password(password: &str) -> String {
    let salt = uuid::Uuid::new_v4().simple().to_string();
    format!("{}${}", salt, salted_digest(&salt, password))
}

/// Check a supplied password against a stored "salt$hex" digest
pub fn verify_password(stored: &str, supplied: &str) -> bool {
    match stored.split_once('$') {
        Some((salt, digest)) => salted_digest(salt, supplied) == digest,
        None => false,
    }
}

// ============================================================================
// QUERIES
// ============================================================================

fn user_from_row(row: &rusqlite::Row) -> rusqlite::Result<User> {
    let created_at: String = row.get(5)?;

    Ok(User {
        id: row.get(0)?,
        username: row.get(1)?,
        password: row.get(2)?,
        role: row.get(3)?,
        status: row.get(4)?,
        created_at: DateTime::parse_from_rfc3339(&created_at)
            .map_err(|_| rusqlite::Error::InvalidQuery)?
            .with_timezone(&Utc),
    })
}

/// List users for the admin screen: newest first, bootstrap admin excluded
pub fn list_users(conn: &Connection) -> Result<Vec<User>> {
    let mut stmt = conn.prepare(&format!(
        "SELECT {} FROM users WHERE username <> ?1 ORDER BY created_at DESC",
        USER_COLUMNS
    ))?;

    let users = stmt
        .query_map(params![ADMIN_USERNAME], user_from_row)?
        .collect::<rusqlite::Result<Vec<_>>>()?;

    Ok(users)
}

pub fn get_user(conn: &Connection, id: &str) -> Result<Option<User>> {
    let mut stmt = conn.prepare(&format!("SELECT {} FROM users WHERE id = ?1", USER_COLUMNS))?;

    let mut rows = stmt.query_map(params![id], user_from_row)?;
    match rows.next() {
        Some(user) => Ok(Some(user?)),
        None => Ok(None),
    }
}

pub fn find_by_username(conn: &Connection, username: &str) -> Result<Option<User>> {
    let mut stmt = conn.prepare(&format!(
        "SELECT {} FROM users WHERE username = ?1",
        USER_COLUMNS
    ))?;

    let mut rows = stmt.query_map(params![username], user_from_row)?;
    match rows.next() {
        Some(user) => Ok(Some(user?)),
        None => Ok(None),
    }
}

/// Create a user. Duplicate usernames are rejected with a readable error.
pub fn create_user(conn: &Connection, username: &str, password: &str, role: &str) -> Result<User> {
    if username.is_empty() || password.is_empty() {
        bail!("Missing fields");
    }

    let user = User {
        id: uuid::Uuid::new_v4().to_string(),
        username: username.to_string(),
        password: hash_password(password),
        role: if role.is_empty() {
            "user".to_string()
        } else {
            role.to_string()
        },
        status: "active".to_string(),
        created_at: Utc::now(),
    };

    let inserted = conn.execute(
        "INSERT INTO users (id, username, password, role, status, created_at)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
        params![
            user.id,
            user.username,
            user.password,
            user.role,
            user.status,
            user.created_at.to_rfc3339(),
        ],
    );

    match inserted {
        Ok(_) => Ok(user),
        Err(err) if is_constraint_violation(&err) => bail!("User already exists"),
        Err(err) => Err(err.into()),
    }
}

/// Update password/role/status; each field optional
pub fn update_user(
    conn: &Connection,
    id: &str,
    password: Option<&str>,
    role: Option<&str>,
    status: Option<&str>,
) -> Result<Option<User>> {
    let Some(mut user) = get_user(conn, id)? else {
        return Ok(None);
    };

    if let Some(password) = password.filter(|p| !p.is_empty()) {
        user.password = hash_password(password);
    }
    if let Some(role) = role.filter(|r| !r.is_empty()) {
        user.role = role.to_string();
    }
    if let Some(status) = status.filter(|s| !s.is_empty()) {
        user.status = status.to_string();
    }

    conn.execute(
        "UPDATE users SET password = ?1, role = ?2, status = ?3 WHERE id = ?4",
        params![user.password, user.role, user.status, user.id],
    )?;

    Ok(Some(user))
}

/// Delete a user by id. The bootstrap admin is refused outright.
pub fn delete_user(conn: &Connection, id: &str) -> Result<bool> {
    if let Some(user) = get_user(conn, id)? {
        if user.username == ADMIN_USERNAME {
            bail!("Cannot delete main admin");
        }
    }

    let changed = conn.execute("DELETE FROM users WHERE id = ?1", params![id])?;
    Ok(changed > 0)
}

/// Bootstrap the admin account. Idempotent: an existing admin is left
/// untouched, password included.
pub fn seed_admin(conn: &Connection, password: &str) -> Result<(User, bool)> {
    if let Some(existing) = find_by_username(conn, ADMIN_USERNAME)? {
        return Ok((existing, false));
    }

    let user = create_user(conn, ADMIN_USERNAME, password, "admin")?;
    Ok((user, true))
}

// ============================================================================
// TESTS
// ============================================================================
