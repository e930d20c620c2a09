// 💾 Import Pipeline - one batch of records into the store
//
// Per-record failures become skips with reasons; nothing in here aborts a
// batch once it has started. The only fatal conditions are an unparseable
// payload and an empty record array, both raised before any work begins.

use anyhow::{bail, Result};
use rusqlite::Connection;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;

use crate::entities::area::{self, UpsertOutcome};
use crate::entities::voter;
use crate::matcher::{self, MatchDecision};
use crate::normalizer::{normalize, ImportPayload, SkippedRecord};

/// Outcome of one import call (one chunk, from the coordinator's view)
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ImportSummary {
    #[serde(rename = "areaCreated")]
    pub area_created: bool,

    #[serde(rename = "areasCreated")]
    pub areas_created: i64,

    #[serde(rename = "votersCreated")]
    pub voters_created: i64,

    #[serde(rename = "votersSkipped")]
    pub voters_skipped: i64,

    #[serde(rename = "skippedRecords")]
    pub skipped_records: Vec<SkippedRecord>,

    #[serde(rename = "totalProcessed")]
    pub total_processed: i64,
}

/// Run one import batch: normalize, upsert areas on first sight, dedup each
/// record against the store, insert survivors, then recompute the voter
/// counter of every touched area.
pub fn run_import(conn: &Connection, payload: ImportPayload) -> Result<ImportSummary> {
    if payload.record_count() == 0 {
        bail!("Empty voter array provided.");
    }

    let batch = normalize(payload);

    let mut summary = ImportSummary {
        total_processed: batch.total_input as i64,
        ..Default::default()
    };

    // Records the normalizer refused never reach the store
    summary.voters_skipped += batch.skipped.len() as i64;
    summary.skipped_records.extend(batch.skipped);

    let mut processed_areas: HashSet<String> = HashSet::new();

    for record in &batch.records {
        // Area first: the voter row references the code, and the first
        // record sighting a code supplies its metadata
        let code = record.area.voter_area_code.clone();
        if !processed_areas.contains(&code) {
            match area::ensure_area(conn, &record.area) {
                Ok(UpsertOutcome::Created) => summary.areas_created += 1,
                Ok(UpsertOutcome::AlreadyExists) => {}
                Err(err) => {
                    // Storage trouble on the area takes down the record,
                    // not the batch
                    summary.voters_skipped += 1;
                    summary.skipped_records.push(SkippedRecord {
                        record: record.raw.clone(),
                        reason: err.to_string(),
                    });
                    continue;
                }
            }
            processed_areas.insert(code);
        }

        let outcome = voter::find_first_by_voter_id(conn, &record.voter_id)
            .map(|existing| matcher::decide(existing.as_ref(), record));

        match outcome {
            Ok(MatchDecision::Create) => match voter::create_from_import(conn, record) {
                Ok(_) => summary.voters_created += 1,
                Err(err) => {
                    summary.voters_skipped += 1;
                    summary.skipped_records.push(SkippedRecord {
                        record: record.raw.clone(),
                        reason: err.to_string(),
                    });
                }
            },
            Ok(MatchDecision::Skip { reason }) => {
                summary.voters_skipped += 1;
                summary.skipped_records.push(SkippedRecord {
                    record: record.raw.clone(),
                    reason,
                });
            }
            Err(err) => {
                summary.voters_skipped += 1;
                summary.skipped_records.push(SkippedRecord {
                    record: record.raw.clone(),
                    reason: err.to_string(),
                });
            }
        }
    }

    // Full recomputation, not an increment: stays correct under partial
    // failures and repeated imports
    for code in &processed_areas {
        area::recount_total_voters(conn, code)?;
    }

    summary.area_created = summary.areas_created > 0;
    Ok(summary)
}

// ============================================================================
// TESTS
// ============================================================================
