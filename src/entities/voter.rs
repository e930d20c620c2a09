// 🗳️ Voter Entity - registration records and their query surface
//
// Deletion is a status transition ("Deleted"), never a row removal; the only
// thing that physically removes rows is the separate purge utility.

use anyhow::Result;
use chrono::{DateTime, Months, NaiveDate, Utc};
use rusqlite::types::Value as SqlValue;
use rusqlite::{params, params_from_iter, Connection};
use serde::{Deserialize, Serialize};
use std::path::Path;

use crate::normalizer::NormalizedVoter;

const VOTER_COLUMNS: &str =
    "id, sl_no, name, voter_id, father, mother, occupation, dob, address, voter_area_code, status, created_at";

/// Stored voter record
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Voter {
    pub id: String,
    pub sl_no: String,
    pub name: String,
    pub voter_id: String,
    pub father: String,
    pub mother: String,
    pub occupation: String,
    pub dob: Option<NaiveDate>,
    pub address: String,
    pub voter_area_code: String,
    pub status: String,
    pub created_at: DateTime<Utc>,
}

/// Fields accepted when creating a voter by hand (as opposed to import)
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct NewVoter {
    pub sl_no: String,
    pub name: String,
    pub voter_id: String,
    pub father: String,
    pub mother: String,
    #[serde(default)]
    pub occupation: String,
    #[serde(default)]
    pub dob: Option<NaiveDate>,
    pub address: String,
    pub voter_area_code: String,
    #[serde(default)]
    pub status: String,
}

/// Partial update: only provided, non-empty fields change
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct VoterUpdate {
    pub sl_no: Option<String>,
    pub name: Option<String>,
    pub voter_id: Option<String>,
    pub father: Option<String>,
    pub mother: Option<String>,
    pub occupation: Option<String>,
    pub dob: Option<NaiveDate>,
    pub address: Option<String>,
    pub voter_area_code: Option<String>,
    pub status: Option<String>,
}

/// Pagination envelope returned alongside listings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Pagination {
    pub page: i64,
    pub limit: i64,
    pub total: i64,
    pub total_pages: i64,
}

// ============================================================================
// FILTERING
// ============================================================================

/// Query parameters shared by the voter listing and the dashboard stats.
/// With no explicit status, soft-deleted voters are excluded.
#[derive(Debug, Clone, Default)]
pub struct VoterFilter {
    /// Substring match over name, voter_id, address, father, mother
    pub search: Option<String>,

    /// Substring match on occupation
    pub occupation: Option<String>,

    /// Exact area code
    pub area_code: Option<String>,

    /// Exact status; None means "everything except Deleted"
    pub status: Option<String>,

    pub min_age: Option<u32>,
    pub max_age: Option<u32>,
}

impl VoterFilter {
    /// Build the WHERE clause and its positional parameters
    pub fn where_clause(&self) -> (String, Vec<SqlValue>) {
        let mut conditions: Vec<String> = Vec::new();
        let mut values: Vec<SqlValue> = Vec::new();

        if let Some(search) = non_empty(&self.search) {
            let needle = format!("%{}%", search.to_lowercase());
            conditions.push(
                "(LOWER(name) LIKE ? OR LOWER(voter_id) LIKE ? OR LOWER(address) LIKE ? \
                 OR LOWER(father) LIKE ? OR LOWER(mother) LIKE ?)"
                    .to_string(),
            );
            for _ in 0..5 {
                values.push(SqlValue::Text(needle.clone()));
            }
        }

        if let Some(occupation) = non_empty(&self.occupation) {
            conditions.push("LOWER(occupation) LIKE ?".to_string());
            values.push(SqlValue::Text(format!("%{}%", occupation.to_lowercase())));
        }

        if let Some(area_code) = non_empty(&self.area_code) {
            conditions.push("voter_area_code = ?".to_string());
            values.push(SqlValue::Text(area_code.to_string()));
        }

        match non_empty(&self.status) {
            Some(status) => {
                conditions.push("status = ?".to_string());
                values.push(SqlValue::Text(status.to_string()));
            }
            None => {
                // Soft-deleted voters are invisible unless asked for
                conditions.push("status <> 'Deleted'".to_string());
            }
        }

        let today = Utc::now().date_naive();

        // Maximum age bounds the earliest acceptable date of birth
        if let Some(max_age) = self.max_age {
            if let Some(min_dob) = today.checked_sub_months(Months::new(12 * max_age)) {
                conditions.push("dob >= ?".to_string());
                values.push(SqlValue::Text(min_dob.format("%Y-%m-%d").to_string()));
            }
        }

        // Minimum age bounds the latest acceptable date of birth
        if let Some(min_age) = self.min_age {
            if let Some(max_dob) = today.checked_sub_months(Months::new(12 * min_age)) {
                conditions.push("dob <= ?".to_string());
                values.push(SqlValue::Text(max_dob.format("%Y-%m-%d").to_string()));
            }
        }

        if conditions.is_empty() {
            (String::new(), values)
        } else {
            (format!(" WHERE {}", conditions.join(" AND ")), values)
        }
    }

    /// Same filter with the status pinned to a specific value
    pub fn with_status(&self, status: &str) -> VoterFilter {
        let mut filter = self.clone();
        filter.status = Some(status.to_string());
        filter
    }
}

fn non_empty(opt: &Option<String>) -> Option<&str> {
    opt.as_deref().filter(|s| !s.is_empty())
}

// ============================================================================
// QUERIES
// ============================================================================

fn voter_from_row(row: &rusqlite::Row) -> rusqlite::Result<Voter> {
    let dob: Option<String> = row.get(7)?;
    let created_at: String = row.get(11)?;

    Ok(Voter {
        id: row.get(0)?,
        sl_no: row.get(1)?,
        name: row.get(2)?,
        voter_id: row.get(3)?,
        father: row.get(4)?,
        mother: row.get(5)?,
        occupation: row.get(6)?,
        dob: dob.and_then(|s| NaiveDate::parse_from_str(&s, "%Y-%m-%d").ok()),
        address: row.get(8)?,
        voter_area_code: row.get(9)?,
        status: row.get(10)?,
        created_at: DateTime::parse_from_rfc3339(&created_at)
            .map_err(|_| rusqlite::Error::InvalidQuery)?
            .with_timezone(&Utc),
    })
}

/// List voters matching a filter, paginated and ordered by serial number
pub fn list_voters(
    conn: &Connection,
    filter: &VoterFilter,
    page: i64,
    limit: i64,
) -> Result<(Vec<Voter>, Pagination)> {
    let page = page.max(1);
    let limit = limit.max(1);
    let (where_sql, values) = filter.where_clause();

    let total: i64 = conn.query_row(
        &format!("SELECT COUNT(*) FROM voters{}", where_sql),
        params_from_iter(values.iter()),
        |row| row.get(0),
    )?;

    let mut list_values = values;
    list_values.push(SqlValue::Integer(limit));
    list_values.push(SqlValue::Integer((page - 1) * limit));

    let mut stmt = conn.prepare(&format!(
        "SELECT {} FROM voters{} ORDER BY sl_no ASC LIMIT ? OFFSET ?",
        VOTER_COLUMNS, where_sql
    ))?;

    let voters = stmt
        .query_map(params_from_iter(list_values.iter()), voter_from_row)?
        .collect::<rusqlite::Result<Vec<_>>>()?;

    let pagination = Pagination {
        page,
        limit,
        total,
        total_pages: (total + limit - 1) / limit,
    };

    Ok((voters, pagination))
}

pub fn count_voters(conn: &Connection, filter: &VoterFilter) -> Result<i64> {
    let (where_sql, values) = filter.where_clause();
    let count: i64 = conn.query_row(
        &format!("SELECT COUNT(*) FROM voters{}", where_sql),
        params_from_iter(values.iter()),
        |row| row.get(0),
    )?;
    Ok(count)
}

pub fn get_voter(conn: &Connection, id: &str) -> Result<Option<Voter>> {
    let mut stmt = conn.prepare(&format!(
        "SELECT {} FROM voters WHERE id = ?1",
        VOTER_COLUMNS
    ))?;

    let mut rows = stmt.query_map(params![id], voter_from_row)?;
    match rows.next() {
        Some(voter) => Ok(Some(voter?)),
        None => Ok(None),
    }
}

/// First stored voter carrying this identifier, in insertion order.
///
/// The store does not enforce voter_id uniqueness, so several rows may share
/// one identifier; the import matcher compares against the FIRST match.
pub fn find_first_by_voter_id(conn: &Connection, voter_id: &str) -> Result<Option<Voter>> {
    let mut stmt = conn.prepare(&format!(
        "SELECT {} FROM voters WHERE voter_id = ?1 ORDER BY rowid ASC LIMIT 1",
        VOTER_COLUMNS
    ))?;

    let mut rows = stmt.query_map(params![voter_id], voter_from_row)?;
    match rows.next() {
        Some(voter) => Ok(Some(voter?)),
        None => Ok(None),
    }
}

/// Create a voter from manual entry
pub fn create_voter(conn: &Connection, new: &NewVoter) -> Result<Voter> {
    let voter = Voter {
        id: uuid::Uuid::new_v4().to_string(),
        sl_no: new.sl_no.clone(),
        name: new.name.clone(),
        voter_id: new.voter_id.clone(),
        father: new.father.clone(),
        mother: new.mother.clone(),
        occupation: if new.occupation.is_empty() {
            "N/A".to_string()
        } else {
            new.occupation.clone()
        },
        dob: new.dob,
        address: new.address.clone(),
        voter_area_code: new.voter_area_code.clone(),
        status: if new.status.is_empty() {
            "Active".to_string()
        } else {
            new.status.clone()
        },
        created_at: Utc::now(),
    };

    insert_voter(conn, &voter)?;
    Ok(voter)
}

/// Create a voter from a normalized import record
pub fn create_from_import(conn: &Connection, record: &NormalizedVoter) -> Result<Voter> {
    let voter = Voter {
        id: uuid::Uuid::new_v4().to_string(),
        sl_no: record.sl_no.clone(),
        name: record.name.clone(),
        voter_id: record.voter_id.clone(),
        father: record.father.clone(),
        mother: record.mother.clone(),
        occupation: record.occupation.clone(),
        dob: record.dob,
        address: record.address.clone(),
        voter_area_code: record.area.voter_area_code.clone(),
        status: record.status.clone(),
        created_at: Utc::now(),
    };

    insert_voter(conn, &voter)?;
    Ok(voter)
}

fn insert_voter(conn: &Connection, voter: &Voter) -> Result<()> {
    conn.execute(
        "INSERT INTO voters (
            id, sl_no, name, voter_id, father, mother, occupation, dob,
            address, voter_area_code, status, created_at
        ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12)",
        params![
            voter.id,
            voter.sl_no,
            voter.name,
            voter.voter_id,
            voter.father,
            voter.mother,
            voter.occupation,
            voter.dob.map(|d| d.format("%Y-%m-%d").to_string()),
            voter.address,
            voter.voter_area_code,
            voter.status,
            voter.created_at.to_rfc3339(),
        ],
    )?;
    Ok(())
}

/// Apply a partial update; returns the fresh row, or None if the id is unknown
pub fn update_voter(conn: &Connection, id: &str, update: &VoterUpdate) -> Result<Option<Voter>> {
    let mut sets: Vec<String> = Vec::new();
    let mut values: Vec<SqlValue> = Vec::new();

    let mut set_text = |column: &str, value: &Option<String>| {
        if let Some(v) = value.as_deref().filter(|v| !v.is_empty()) {
            sets.push(format!("{} = ?", column));
            values.push(SqlValue::Text(v.to_string()));
        }
    };

    set_text("sl_no", &update.sl_no);
    set_text("name", &update.name);
    set_text("voter_id", &update.voter_id);
    set_text("father", &update.father);
    set_text("mother", &update.mother);
    set_text("occupation", &update.occupation);
    set_text("address", &update.address);
    set_text("voter_area_code", &update.voter_area_code);
    set_text("status", &update.status);

    if let Some(dob) = update.dob {
        sets.push("dob = ?".to_string());
        values.push(SqlValue::Text(dob.format("%Y-%m-%d").to_string()));
    }

    if !sets.is_empty() {
        values.push(SqlValue::Text(id.to_string()));
        let changed = conn.execute(
            &format!("UPDATE voters SET {} WHERE id = ?", sets.join(", ")),
            params_from_iter(values.iter()),
        )?;

        if changed == 0 {
            return Ok(None);
        }
    }

    get_voter(conn, id)
}

/// Soft delete: flip the status, keep the row
pub fn soft_delete_voter(conn: &Connection, id: &str) -> Result<bool> {
    let changed = conn.execute(
        "UPDATE voters SET status = 'Deleted' WHERE id = ?1",
        params![id],
    )?;
    Ok(changed > 0)
}

// ============================================================================
// MAINTENANCE UTILITIES
// ============================================================================

/// Hard-delete EVERY voter row. Irreversible; returns the pre-purge count.
/// Deliberately separate from soft delete and never routed through it.
pub fn purge_all_voters(conn: &Connection) -> Result<usize> {
    let before: i64 = conn.query_row("SELECT COUNT(*) FROM voters", [], |row| row.get(0))?;
    conn.execute("DELETE FROM voters", [])?;
    Ok(before as usize)
}

/// Bulk-rename one occupation spelling to another; returns rows touched.
/// Exists because OCR output occasionally ships a misspelled occupation
/// across thousands of rows.
pub fn fix_occupation(conn: &Connection, from: &str, to: &str) -> Result<usize> {
    let changed = conn.execute(
        "UPDATE voters SET occupation = ?1 WHERE occupation = ?2",
        params![to, from],
    )?;
    Ok(changed)
}

/// Write the non-deleted roll to a CSV file
pub fn export_csv(conn: &Connection, path: &Path) -> Result<usize> {
    let mut stmt = conn.prepare(&format!(
        "SELECT {} FROM voters WHERE status <> 'Deleted' ORDER BY sl_no ASC",
        VOTER_COLUMNS
    ))?;
    let voters = stmt
        .query_map([], voter_from_row)?
        .collect::<rusqlite::Result<Vec<_>>>()?;

    let mut writer = csv::Writer::from_path(path)?;
    writer.write_record([
        "sl_no",
        "name",
        "voter_id",
        "father",
        "mother",
        "occupation",
        "dob",
        "address",
        "voter_area_code",
        "status",
    ])?;

    for voter in &voters {
        writer.write_record([
            voter.sl_no.as_str(),
            voter.name.as_str(),
            voter.voter_id.as_str(),
            voter.father.as_str(),
            voter.mother.as_str(),
            voter.occupation.as_str(),
            &voter
                .dob
                .map(|d| d.format("%Y-%m-%d").to_string())
                .unwrap_or_default(),
            voter.address.as_str(),
            voter.voter_area_code.as_str(),
            voter.status.as_str(),
        ])?;
    }

    writer.flush()?;
    Ok(voters.len())
}

// ============================================================================
// TESTS
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::setup_database;

    fn test_conn() -> Connection {
        let conn = Connection::open_in_memory().unwrap();
        setup_database(&conn).unwrap();
        conn
    }

    fn new_voter(sl_no: &str, name: &str, voter_id: &str) -> NewVoter {
        NewVoter {
            sl_no: sl_no.to_string(),
            name: name.to_string(),
            voter_id: voter_id.to_string(),
            father: "Father".to_string(),
            mother: "Mother".to_string(),
            occupation: "Farmer".to_string(),
            dob: NaiveDate::from_ymd_opt(1985, 6, 15),
            address: "Village Road".to_string(),
            voter_area_code: "0123".to_string(),
            status: String::new(),
        }
    }

    #[test]
    fn test_create_and_get_roundtrip() {
        let conn = test_conn();
        let created = create_voter(&conn, &new_voter("1", "Rahim", "001")).unwrap();

        let fetched = get_voter(&conn, &created.id).unwrap().unwrap();
        assert_eq!(fetched.name, "Rahim");
        assert_eq!(fetched.status, "Active");
        assert_eq!(fetched.dob, NaiveDate::from_ymd_opt(1985, 6, 15));

        assert!(get_voter(&conn, "no-such-id").unwrap().is_none());
    }

    #[test]
    fn test_occupation_defaults_on_manual_entry() {
        let conn = test_conn();
        let mut input = new_voter("1", "Rahim", "001");
        input.occupation = String::new();

        let created = create_voter(&conn, &input).unwrap();
        assert_eq!(created.occupation, "N/A");
    }

    #[test]
    fn test_soft_delete_hides_from_default_listing() {
        let conn = test_conn();
        let voter = create_voter(&conn, &new_voter("1", "Rahim", "001")).unwrap();
        create_voter(&conn, &new_voter("2", "Karim", "002")).unwrap();

        assert!(soft_delete_voter(&conn, &voter.id).unwrap());

        let (visible, pagination) = list_voters(&conn, &VoterFilter::default(), 1, 20).unwrap();
        assert_eq!(pagination.total, 1);
        assert_eq!(visible[0].name, "Karim");

        // Explicit status filter surfaces the deleted row again
        let filter = VoterFilter {
            status: Some("Deleted".to_string()),
            ..Default::default()
        };
        let (deleted, _) = list_voters(&conn, &filter, 1, 20).unwrap();
        assert_eq!(deleted.len(), 1);
        assert_eq!(deleted[0].name, "Rahim");

        // Row still physically present
        let raw: i64 = conn
            .query_row("SELECT COUNT(*) FROM voters", [], |r| r.get(0))
            .unwrap();
        assert_eq!(raw, 2);
    }

    #[test]
    fn test_search_matches_across_fields() {
        let conn = test_conn();
        create_voter(&conn, &new_voter("1", "Rahim Uddin", "001")).unwrap();
        create_voter(&conn, &new_voter("2", "Karim", "002")).unwrap();

        let filter = VoterFilter {
            search: Some("rahim".to_string()),
            ..Default::default()
        };
        let (found, _) = list_voters(&conn, &filter, 1, 20).unwrap();
        assert_eq!(found.len(), 1);

        // voter_id is searchable too
        let filter = VoterFilter {
            search: Some("002".to_string()),
            ..Default::default()
        };
        let (found, _) = list_voters(&conn, &filter, 1, 20).unwrap();
        assert_eq!(found.len(), 1);
        assert_eq!(found[0].name, "Karim");
    }

    #[test]
    fn test_age_range_filter() {
        let conn = test_conn();
        let today = Utc::now().date_naive();

        let mut young = new_voter("1", "Young", "001");
        young.dob = today.checked_sub_months(Months::new(12 * 20));
        create_voter(&conn, &young).unwrap();

        let mut old = new_voter("2", "Old", "002");
        old.dob = today.checked_sub_months(Months::new(12 * 70));
        create_voter(&conn, &old).unwrap();

        let mut unknown = new_voter("3", "NoDob", "003");
        unknown.dob = None;
        create_voter(&conn, &unknown).unwrap();

        let filter = VoterFilter {
            min_age: Some(60),
            ..Default::default()
        };
        let (found, _) = list_voters(&conn, &filter, 1, 20).unwrap();
        assert_eq!(found.len(), 1);
        assert_eq!(found[0].name, "Old");

        let filter = VoterFilter {
            min_age: Some(18),
            max_age: Some(30),
            ..Default::default()
        };
        let (found, _) = list_voters(&conn, &filter, 1, 20).unwrap();
        assert_eq!(found.len(), 1);
        assert_eq!(found[0].name, "Young");
    }

    #[test]
    fn test_pagination_math() {
        let conn = test_conn();
        for i in 0..45 {
            create_voter(&conn, &new_voter(&format!("{:03}", i), "Voter", &format!("{:03}", i)))
                .unwrap();
        }

        let (page1, pagination) = list_voters(&conn, &VoterFilter::default(), 1, 20).unwrap();
        assert_eq!(page1.len(), 20);
        assert_eq!(pagination.total, 45);
        assert_eq!(pagination.total_pages, 3);

        let (page3, _) = list_voters(&conn, &VoterFilter::default(), 3, 20).unwrap();
        assert_eq!(page3.len(), 5);
    }

    #[test]
    fn test_partial_update_keeps_other_fields() {
        let conn = test_conn();
        let voter = create_voter(&conn, &new_voter("1", "Rahim", "001")).unwrap();

        let update = VoterUpdate {
            occupation: Some("Teacher".to_string()),
            ..Default::default()
        };
        let updated = update_voter(&conn, &voter.id, &update).unwrap().unwrap();

        assert_eq!(updated.occupation, "Teacher");
        assert_eq!(updated.name, "Rahim");
        assert_eq!(updated.father, "Father");

        assert!(update_voter(&conn, "no-such-id", &update).unwrap().is_none());
    }

    #[test]
    fn test_first_match_semantics_for_shared_identifier() {
        let conn = test_conn();
        create_voter(&conn, &new_voter("1", "First", "777")).unwrap();
        create_voter(&conn, &new_voter("2", "Second", "777")).unwrap();

        let found = find_first_by_voter_id(&conn, "777").unwrap().unwrap();
        assert_eq!(found.name, "First");
    }

    #[test]
    fn test_purge_reports_count_and_empties_table() {
        let conn = test_conn();
        create_voter(&conn, &new_voter("1", "A", "001")).unwrap();
        create_voter(&conn, &new_voter("2", "B", "002")).unwrap();

        assert_eq!(purge_all_voters(&conn).unwrap(), 2);

        let remaining: i64 = conn
            .query_row("SELECT COUNT(*) FROM voters", [], |r| r.get(0))
            .unwrap();
        assert_eq!(remaining, 0);

        // Purging an empty table is a no-op
        assert_eq!(purge_all_voters(&conn).unwrap(), 0);
    }

    #[test]
    fn test_fix_occupation_renames_exact_matches_only() {
        let conn = test_conn();
        let mut a = new_voter("1", "A", "001");
        a.occupation = "গৃিহনী".to_string();
        create_voter(&conn, &a).unwrap();

        let mut b = new_voter("2", "B", "002");
        b.occupation = "Farmer".to_string();
        create_voter(&conn, &b).unwrap();

        let changed = fix_occupation(&conn, "গৃিহনী", "গৃহিনী").unwrap();
        assert_eq!(changed, 1);

        let filter = VoterFilter {
            occupation: Some("গৃহিনী".to_string()),
            ..Default::default()
        };
        assert_eq!(count_voters(&conn, &filter).unwrap(), 1);
    }
}
