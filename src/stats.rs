// 📊 Dashboard Statistics - grouped counts and manual age bucketing
//
// Honors the same voter filters as the listing; with no explicit status the
// figures cover everything except soft-deleted rows.

use anyhow::Result;
use chrono::{DateTime, Datelike, NaiveDate, Utc};
use rusqlite::{params_from_iter, Connection};
use serde::{Deserialize, Serialize};

use crate::entities::area::count_areas;
use crate::entities::voter::{count_voters, VoterFilter};

/// Fixed dashboard buckets. Voters younger than 18 are not bucketed at all:
/// they should not be on the roll in the first place.
const AGE_GROUPS: [&str; 7] = ["18-29", "30-39", "40-49", "50-59", "60-69", "70-79", "80+"];

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OccupationStat {
    pub occupation: String,
    pub count: i64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AreaStat {
    pub area_code: String,
    pub count: i64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AgeBucket {
    #[serde(rename = "ageGroup")]
    pub age_group: String,
    pub count: i64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RecentVoter {
    pub id: String,
    pub name: String,
    pub voter_id: String,
    pub occupation: String,
    #[serde(rename = "createdAt")]
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DashboardStats {
    #[serde(rename = "totalVoters")]
    pub total_voters: i64,

    #[serde(rename = "deletedVoters")]
    pub deleted_voters: i64,

    #[serde(rename = "totalAreas")]
    pub total_areas: i64,

    #[serde(rename = "occupationStats")]
    pub occupation_stats: Vec<OccupationStat>,

    #[serde(rename = "areaStats")]
    pub area_stats: Vec<AreaStat>,

    #[serde(rename = "ageStats")]
    pub age_stats: Vec<AgeBucket>,

    #[serde(rename = "recentVoters")]
    pub recent_voters: Vec<RecentVoter>,
}

/// Bucket dates of birth by age as of `current_year`.
/// Age is the plain calendar-year difference, matching how the published
/// rolls state ages.
pub fn age_distribution(dobs: &[NaiveDate], current_year: i32) -> Vec<AgeBucket> {
    let mut counts = [0i64; AGE_GROUPS.len()];

    for dob in dobs {
        let age = current_year - dob.year();
        let bucket = match age {
            18..=29 => Some(0),
            30..=39 => Some(1),
            40..=49 => Some(2),
            50..=59 => Some(3),
            60..=69 => Some(4),
            70..=79 => Some(5),
            _ if age >= 80 => Some(6),
            _ => None,
        };
        if let Some(index) = bucket {
            counts[index] += 1;
        }
    }

    AGE_GROUPS
        .iter()
        .zip(counts)
        .map(|(group, count)| AgeBucket {
            age_group: group.to_string(),
            count,
        })
        .collect()
}

/// Assemble the full dashboard payload
pub fn dashboard_stats(conn: &Connection, filter: &VoterFilter) -> Result<DashboardStats> {
    let (where_sql, values) = filter.where_clause();

    let total_voters = count_voters(conn, filter)?;
    let deleted_voters = count_voters(conn, &filter.with_status("Deleted"))?;
    let total_areas = count_areas(conn)?;

    // Top occupations
    let mut stmt = conn.prepare(&format!(
        "SELECT occupation, COUNT(*) AS count FROM voters{} \
         GROUP BY occupation ORDER BY count DESC LIMIT 10",
        where_sql
    ))?;
    let occupation_stats = stmt
        .query_map(params_from_iter(values.iter()), |row| {
            Ok(OccupationStat {
                occupation: row.get(0)?,
                count: row.get(1)?,
            })
        })?
        .collect::<rusqlite::Result<Vec<_>>>()?;

    // Top areas
    let mut stmt = conn.prepare(&format!(
        "SELECT voter_area_code, COUNT(*) AS count FROM voters{} \
         GROUP BY voter_area_code ORDER BY count DESC LIMIT 10",
        where_sql
    ))?;
    let area_stats = stmt
        .query_map(params_from_iter(values.iter()), |row| {
            Ok(AreaStat {
                area_code: row.get(0)?,
                count: row.get(1)?,
            })
        })?
        .collect::<rusqlite::Result<Vec<_>>>()?;

    // Age buckets are computed in code: SQLite has no date arithmetic worth
    // leaning on here, and the bucket edges are a display concern
    let dob_where = if where_sql.is_empty() {
        " WHERE dob IS NOT NULL".to_string()
    } else {
        format!("{} AND dob IS NOT NULL", where_sql)
    };
    let mut stmt = conn.prepare(&format!("SELECT dob FROM voters{}", dob_where))?;
    let dobs = stmt
        .query_map(params_from_iter(values.iter()), |row| {
            let raw: String = row.get(0)?;
            Ok(raw)
        })?
        .collect::<rusqlite::Result<Vec<_>>>()?
        .into_iter()
        .filter_map(|s| NaiveDate::parse_from_str(&s, "%Y-%m-%d").ok())
        .collect::<Vec<_>>();

    let age_stats = age_distribution(&dobs, Utc::now().year());

    // Five most recent additions
    let mut stmt = conn.prepare(&format!(
        "SELECT id, name, voter_id, occupation, created_at FROM voters{} \
         ORDER BY created_at DESC LIMIT 5",
        where_sql
    ))?;
    let recent_voters = stmt
        .query_map(params_from_iter(values.iter()), |row| {
            let created_at: String = row.get(4)?;
            Ok(RecentVoter {
                id: row.get(0)?,
                name: row.get(1)?,
                voter_id: row.get(2)?,
                occupation: row.get(3)?,
                created_at: DateTime::parse_from_rfc3339(&created_at)
                    .map_err(|_| rusqlite::Error::InvalidQuery)?
                    .with_timezone(&Utc),
            })
        })?
        .collect::<rusqlite::Result<Vec<_>>>()?;

    Ok(DashboardStats {
        total_voters,
        deleted_voters,
        total_areas,
        occupation_stats,
        area_stats,
        age_stats,
        recent_voters,
    })
}

// ============================================================================
// TESTS
// ============================================================================
