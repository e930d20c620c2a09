// 🗺️ Voter Area Entity - administrative subdivisions keyed by area code
//
// Areas own no voter lifecycle: deleting an area leaves its voters in place,
// and total_voters is a published figure recomputed by the import pipeline,
// never incremented.

use anyhow::Result;
use chrono::{DateTime, NaiveDate, Utc};
use rusqlite::types::Value as SqlValue;
use rusqlite::{params, params_from_iter, Connection};
use serde::{Deserialize, Serialize};

use crate::db::is_constraint_violation;
use crate::entities::voter::Pagination;
use crate::normalizer::AreaSeed;

const AREA_COLUMNS: &str =
    "voter_area_code, district, upazila_thana, union_paurashava, ward_number, voter_area_name, \
     post_office, post_code, total_voters, total_male_voters, publication_date, created_at";

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VoterArea {
    pub voter_area_code: String,
    pub district: String,
    pub upazila_thana: String,
    pub union_paurashava: String,
    pub ward_number: String,
    pub voter_area_name: String,
    pub post_office: String,
    pub post_code: String,
    pub total_voters: i64,
    pub total_male_voters: i64,
    pub publication_date: Option<NaiveDate>,
    pub created_at: DateTime<Utc>,
}

/// Partial update for an existing area
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AreaUpdate {
    pub district: Option<String>,
    pub upazila_thana: Option<String>,
    pub union_paurashava: Option<String>,
    pub ward_number: Option<String>,
    pub voter_area_name: Option<String>,
    pub post_office: Option<String>,
    pub post_code: Option<String>,
    pub total_voters: Option<i64>,
    pub total_male_voters: Option<i64>,
    pub publication_date: Option<NaiveDate>,
}

/// Outcome of an idempotent create-if-absent
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UpsertOutcome {
    Created,
    AlreadyExists,
}

fn area_from_row(row: &rusqlite::Row) -> rusqlite::Result<VoterArea> {
    let publication_date: Option<String> = row.get(10)?;
    let created_at: String = row.get(11)?;

    Ok(VoterArea {
        voter_area_code: row.get(0)?,
        district: row.get(1)?,
        upazila_thana: row.get(2)?,
        union_paurashava: row.get(3)?,
        ward_number: row.get(4)?,
        voter_area_name: row.get(5)?,
        post_office: row.get(6)?,
        post_code: row.get(7)?,
        total_voters: row.get(8)?,
        total_male_voters: row.get(9)?,
        publication_date: publication_date
            .and_then(|s| NaiveDate::parse_from_str(&s, "%Y-%m-%d").ok()),
        created_at: DateTime::parse_from_rfc3339(&created_at)
            .map_err(|_| rusqlite::Error::InvalidQuery)?
            .with_timezone(&Utc),
    })
}

/// List areas, newest first, with an optional substring search over the
/// district, upazila, area name and area code
pub fn list_areas(
    conn: &Connection,
    search: Option<&str>,
    page: i64,
    limit: i64,
) -> Result<(Vec<VoterArea>, Pagination)> {
    let page = page.max(1);
    let limit = limit.max(1);

    let mut where_sql = String::new();
    let mut values: Vec<SqlValue> = Vec::new();

    if let Some(search) = search.filter(|s| !s.is_empty()) {
        where_sql = " WHERE (LOWER(district) LIKE ? OR LOWER(upazila_thana) LIKE ? \
                     OR LOWER(voter_area_name) LIKE ? OR LOWER(voter_area_code) LIKE ?)"
            .to_string();
        let needle = format!("%{}%", search.to_lowercase());
        for _ in 0..4 {
            values.push(SqlValue::Text(needle.clone()));
        }
    }

    let total: i64 = conn.query_row(
        &format!("SELECT COUNT(*) FROM voter_areas{}", where_sql),
        params_from_iter(values.iter()),
        |row| row.get(0),
    )?;

    values.push(SqlValue::Integer(limit));
    values.push(SqlValue::Integer((page - 1) * limit));

    let mut stmt = conn.prepare(&format!(
        "SELECT {} FROM voter_areas{} ORDER BY created_at DESC LIMIT ? OFFSET ?",
        AREA_COLUMNS, where_sql
    ))?;

    let areas = stmt
        .query_map(params_from_iter(values.iter()), area_from_row)?
        .collect::<rusqlite::Result<Vec<_>>>()?;

    let pagination = Pagination {
        page,
        limit,
        total,
        total_pages: (total + limit - 1) / limit,
    };

    Ok((areas, pagination))
}

pub fn get_area(conn: &Connection, code: &str) -> Result<Option<VoterArea>> {
    let mut stmt = conn.prepare(&format!(
        "SELECT {} FROM voter_areas WHERE voter_area_code = ?1",
        AREA_COLUMNS
    ))?;

    let mut rows = stmt.query_map(params![code], area_from_row)?;
    match rows.next() {
        Some(area) => Ok(Some(area?)),
        None => Ok(None),
    }
}

pub fn count_areas(conn: &Connection) -> Result<i64> {
    let count: i64 = conn.query_row("SELECT COUNT(*) FROM voter_areas", [], |row| row.get(0))?;
    Ok(count)
}

/// Insert a new area; a duplicate code is a hard error for the caller
pub fn create_area(conn: &Connection, seed: &AreaSeed) -> Result<VoterArea> {
    let created_at = Utc::now();

    conn.execute(
        "INSERT INTO voter_areas (
            voter_area_code, district, upazila_thana, union_paurashava,
            ward_number, voter_area_name, post_office, post_code,
            total_voters, total_male_voters, publication_date, created_at
        ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12)",
        params![
            seed.voter_area_code,
            seed.district,
            seed.upazila_thana,
            seed.union_paurashava,
            seed.ward_number,
            seed.voter_area_name,
            seed.post_office,
            seed.post_code,
            seed.total_voters,
            seed.total_male_voters,
            seed.publication_date.map(|d| d.format("%Y-%m-%d").to_string()),
            created_at.to_rfc3339(),
        ],
    )?;

    Ok(VoterArea {
        voter_area_code: seed.voter_area_code.clone(),
        district: seed.district.clone(),
        upazila_thana: seed.upazila_thana.clone(),
        union_paurashava: seed.union_paurashava.clone(),
        ward_number: seed.ward_number.clone(),
        voter_area_name: seed.voter_area_name.clone(),
        post_office: seed.post_office.clone(),
        post_code: seed.post_code.clone(),
        total_voters: seed.total_voters,
        total_male_voters: seed.total_male_voters,
        publication_date: seed.publication_date,
        created_at,
    })
}

/// Create the area on first sight; a concurrent import racing us to the
/// unique index is treated as "already exists", not as a failure.
pub fn ensure_area(conn: &Connection, seed: &AreaSeed) -> Result<UpsertOutcome> {
    if get_area(conn, &seed.voter_area_code)?.is_some() {
        return Ok(UpsertOutcome::AlreadyExists);
    }

    match create_area(conn, seed) {
        Ok(_) => Ok(UpsertOutcome::Created),
        Err(err) => match err.downcast_ref::<rusqlite::Error>() {
            Some(sql_err) if is_constraint_violation(sql_err) => Ok(UpsertOutcome::AlreadyExists),
            _ => Err(err),
        },
    }
}

pub fn update_area(conn: &Connection, code: &str, update: &AreaUpdate) -> Result<Option<VoterArea>> {
    let mut sets: Vec<String> = Vec::new();
    let mut values: Vec<SqlValue> = Vec::new();

    let mut set_text = |column: &str, value: &Option<String>| {
        if let Some(v) = value.as_deref().filter(|v| !v.is_empty()) {
            sets.push(format!("{} = ?", column));
            values.push(SqlValue::Text(v.to_string()));
        }
    };

    set_text("district", &update.district);
    set_text("upazila_thana", &update.upazila_thana);
    set_text("union_paurashava", &update.union_paurashava);
    set_text("ward_number", &update.ward_number);
    set_text("voter_area_name", &update.voter_area_name);
    set_text("post_office", &update.post_office);
    set_text("post_code", &update.post_code);

    if let Some(total) = update.total_voters {
        sets.push("total_voters = ?".to_string());
        values.push(SqlValue::Integer(total));
    }

    if let Some(total) = update.total_male_voters {
        sets.push("total_male_voters = ?".to_string());
        values.push(SqlValue::Integer(total));
    }

    if let Some(date) = update.publication_date {
        sets.push("publication_date = ?".to_string());
        values.push(SqlValue::Text(date.format("%Y-%m-%d").to_string()));
    }

    if !sets.is_empty() {
        values.push(SqlValue::Text(code.to_string()));
        let changed = conn.execute(
            &format!(
                "UPDATE voter_areas SET {} WHERE voter_area_code = ?",
                sets.join(", ")
            ),
            params_from_iter(values.iter()),
        )?;

        if changed == 0 {
            return Ok(None);
        }
    }

    get_area(conn, code)
}

/// Hard delete by code. No cascade: the area's voters keep their rows and
/// their (now dangling) area code.
pub fn delete_area(conn: &Connection, code: &str) -> Result<bool> {
    let changed = conn.execute(
        "DELETE FROM voter_areas WHERE voter_area_code = ?1",
        params![code],
    )?;
    Ok(changed > 0)
}

/// Recompute total_voters as the exact count of non-deleted voters in the
/// area and persist it. Full recomputation keeps the counter correct under
/// partial imports and repeated runs.
pub fn recount_total_voters(conn: &Connection, code: &str) -> Result<i64> {
    let count: i64 = conn.query_row(
        "SELECT COUNT(*) FROM voters WHERE voter_area_code = ?1 AND status <> 'Deleted'",
        params![code],
        |row| row.get(0),
    )?;

    conn.execute(
        "UPDATE voter_areas SET total_voters = ?1 WHERE voter_area_code = ?2",
        params![count, code],
    )?;

    Ok(count)
}

// ============================================================================
// TESTS
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::setup_database;
    use crate::entities::voter::{create_voter, soft_delete_voter, NewVoter};

    fn test_conn() -> Connection {
        let conn = Connection::open_in_memory().unwrap();
        setup_database(&conn).unwrap();
        conn
    }

    fn seed(code: &str) -> AreaSeed {
        AreaSeed {
            voter_area_code: code.to_string(),
            district: "Dhaka".to_string(),
            upazila_thana: "Savar".to_string(),
            union_paurashava: "Tetuljhora".to_string(),
            ward_number: "4".to_string(),
            voter_area_name: "Tetuljhora East".to_string(),
            post_office: "Savar PO".to_string(),
            post_code: "1340".to_string(),
            total_voters: 0,
            total_male_voters: 0,
            publication_date: None,
        }
    }

    fn voter_in_area(sl_no: &str, voter_id: &str, area_code: &str) -> NewVoter {
        NewVoter {
            sl_no: sl_no.to_string(),
            name: format!("Voter {}", sl_no),
            voter_id: voter_id.to_string(),
            father: "Father".to_string(),
            mother: "Mother".to_string(),
            occupation: "Farmer".to_string(),
            dob: None,
            address: "Address".to_string(),
            voter_area_code: area_code.to_string(),
            status: String::new(),
        }
    }

    #[test]
    fn test_ensure_area_is_idempotent() {
        let conn = test_conn();

        assert_eq!(ensure_area(&conn, &seed("0123")).unwrap(), UpsertOutcome::Created);
        assert_eq!(
            ensure_area(&conn, &seed("0123")).unwrap(),
            UpsertOutcome::AlreadyExists
        );

        assert_eq!(count_areas(&conn).unwrap(), 1);
    }

    #[test]
    fn test_first_sighting_wins_metadata() {
        let conn = test_conn();

        let first = seed("0123");
        ensure_area(&conn, &first).unwrap();

        let mut second = seed("0123");
        second.district = "Chattogram".to_string();
        ensure_area(&conn, &second).unwrap();

        let stored = get_area(&conn, "0123").unwrap().unwrap();
        assert_eq!(stored.district, "Dhaka");
    }

    #[test]
    fn test_create_duplicate_code_is_constraint_violation() {
        let conn = test_conn();
        create_area(&conn, &seed("0123")).unwrap();

        let err = create_area(&conn, &seed("0123")).unwrap_err();
        let sql_err = err.downcast_ref::<rusqlite::Error>().unwrap();
        assert!(is_constraint_violation(sql_err));
    }

    #[test]
    fn test_recount_counts_only_non_deleted() {
        let conn = test_conn();
        ensure_area(&conn, &seed("0123")).unwrap();

        create_voter(&conn, &voter_in_area("1", "001", "0123")).unwrap();
        create_voter(&conn, &voter_in_area("2", "002", "0123")).unwrap();
        let doomed = create_voter(&conn, &voter_in_area("3", "003", "0123")).unwrap();
        // A voter in another area must not count
        create_voter(&conn, &voter_in_area("4", "004", "9999")).unwrap();

        soft_delete_voter(&conn, &doomed.id).unwrap();

        assert_eq!(recount_total_voters(&conn, "0123").unwrap(), 2);
        assert_eq!(get_area(&conn, "0123").unwrap().unwrap().total_voters, 2);
    }

    #[test]
    fn test_recount_is_idempotent() {
        let conn = test_conn();
        ensure_area(&conn, &seed("0123")).unwrap();
        create_voter(&conn, &voter_in_area("1", "001", "0123")).unwrap();

        let first = recount_total_voters(&conn, "0123").unwrap();
        let second = recount_total_voters(&conn, "0123").unwrap();
        assert_eq!(first, second);
        assert_eq!(second, 1);
    }

    #[test]
    fn test_delete_area_leaves_voters_in_place() {
        let conn = test_conn();
        ensure_area(&conn, &seed("0123")).unwrap();
        create_voter(&conn, &voter_in_area("1", "001", "0123")).unwrap();

        assert!(delete_area(&conn, "0123").unwrap());
        assert!(get_area(&conn, "0123").unwrap().is_none());
        assert!(!delete_area(&conn, "0123").unwrap());

        let voters: i64 = conn
            .query_row("SELECT COUNT(*) FROM voters", [], |r| r.get(0))
            .unwrap();
        assert_eq!(voters, 1);
    }

    #[test]
    fn test_list_areas_search_and_order() {
        let conn = test_conn();

        let mut a = seed("0100");
        a.district = "Dhaka".to_string();
        create_area(&conn, &a).unwrap();

        let mut b = seed("0200");
        b.district = "Chattogram".to_string();
        create_area(&conn, &b).unwrap();

        let (all, pagination) = list_areas(&conn, None, 1, 10).unwrap();
        assert_eq!(all.len(), 2);
        assert_eq!(pagination.total, 2);

        let (found, _) = list_areas(&conn, Some("chatto"), 1, 10).unwrap();
        assert_eq!(found.len(), 1);
        assert_eq!(found[0].voter_area_code, "0200");

        // Searching by code works as well
        let (found, _) = list_areas(&conn, Some("0100"), 1, 10).unwrap();
        assert_eq!(found.len(), 1);
    }

    #[test]
    fn test_partial_update() {
        let conn = test_conn();
        create_area(&conn, &seed("0123")).unwrap();

        let update = AreaUpdate {
            post_code: Some("1341".to_string()),
            total_male_voters: Some(120),
            ..Default::default()
        };
        let updated = update_area(&conn, "0123", &update).unwrap().unwrap();

        assert_eq!(updated.post_code, "1341");
        assert_eq!(updated.total_male_voters, 120);
        assert_eq!(updated.district, "Dhaka");

        assert!(update_area(&conn, "9999", &update).unwrap().is_none());
    }
}
