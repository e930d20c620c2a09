// 📦 Batch Coordinator - chunked, strictly sequential import driver
//
// Chunks are submitted one at a time: parallel fan-out would hammer the
// storage backend and make progress reporting non-monotonic. A failed chunk
// still advances `processed` by its full length so the bar never walks
// backwards and the remaining chunks still get their chance.

use anyhow::Result;
use rusqlite::Connection;
use serde::{Deserialize, Serialize};

use crate::importer::{run_import, ImportSummary};
use crate::normalizer::{FlatVoterRecord, ImportPayload, SkippedRecord};

/// Records per submitted chunk
pub const CHUNK_SIZE: usize = 50;

/// Receiving side of one chunk submission: the local store, or an HTTP
/// client posting to /api/import.
pub trait ChunkSink {
    fn submit(&mut self, chunk: &[FlatVoterRecord]) -> Result<ImportSummary>;
}

/// Sink that applies chunks directly to the embedded store
pub struct LocalSink<'a> {
    conn: &'a Connection,
}

impl<'a> LocalSink<'a> {
    pub fn new(conn: &'a Connection) -> Self {
        LocalSink { conn }
    }
}

impl ChunkSink for LocalSink<'_> {
    fn submit(&mut self, chunk: &[FlatVoterRecord]) -> Result<ImportSummary> {
        run_import(self.conn, ImportPayload::Flat(chunk.to_vec()))
    }
}

/// Running totals across all chunks of one batch
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct BatchReport {
    pub processed: usize,
    pub total: usize,
    pub created: i64,
    pub skipped: i64,
    pub areas_created: i64,
    pub failed_chunks: usize,
    pub skipped_records: Vec<SkippedRecord>,
}

pub struct BatchCoordinator {
    chunk_size: usize,
}

impl BatchCoordinator {
    pub fn new() -> Self {
        BatchCoordinator {
            chunk_size: CHUNK_SIZE,
        }
    }

    pub fn with_chunk_size(chunk_size: usize) -> Self {
        BatchCoordinator {
            chunk_size: chunk_size.max(1),
        }
    }

    /// Drive the full record list through the sink, chunk by chunk.
    /// `progress` is called after every chunk with (processed, total).
    pub fn run<F>(
        &self,
        records: &[FlatVoterRecord],
        sink: &mut dyn ChunkSink,
        mut progress: F,
    ) -> BatchReport
    where
        F: FnMut(usize, usize),
    {
        let mut report = BatchReport {
            total: records.len(),
            ..Default::default()
        };

        for chunk in records.chunks(self.chunk_size) {
            match sink.submit(chunk) {
                Ok(summary) => {
                    report.created += summary.voters_created;
                    report.skipped += summary.voters_skipped;
                    report.areas_created += summary.areas_created;
                    report.skipped_records.extend(summary.skipped_records);
                }
                Err(err) => {
                    // The chunk is spent either way; keep going
                    eprintln!("Chunk failed: {}", err);
                    report.failed_chunks += 1;
                }
            }

            report.processed += chunk.len();
            progress(report.processed, report.total);
        }

        report
    }
}

impl Default for BatchCoordinator {
    fn default() -> Self {
        Self::new()
    }
}

// ============================================================================
// TESTS
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::setup_database;
    use anyhow::bail;

    fn records(count: usize) -> Vec<FlatVoterRecord> {
        (0..count)
            .map(|i| FlatVoterRecord {
                serial_no: format!("{}", i + 1),
                name: format!("Voter {}", i + 1),
                voter_id: format!("{:06}", i + 1),
                father_name: format!("Father {}", i + 1),
                voter_area_code: "0123".to_string(),
                district: "Dhaka".to_string(),
                upazila: "Savar".to_string(),
                union_name: "Tetuljhora".to_string(),
                ward_number: "4".to_string(),
                voter_area: "Tetuljhora East".to_string(),
                ..Default::default()
            })
            .collect()
    }

    /// Sink that records chunk sizes and fails on request
    struct MockSink {
        chunk_lengths: Vec<usize>,
        fail_chunks: Vec<usize>,
    }

    impl MockSink {
        fn new() -> Self {
            MockSink {
                chunk_lengths: Vec::new(),
                fail_chunks: Vec::new(),
            }
        }

        fn failing_on(chunks: &[usize]) -> Self {
            MockSink {
                chunk_lengths: Vec::new(),
                fail_chunks: chunks.to_vec(),
            }
        }
    }

    impl ChunkSink for MockSink {
        fn submit(&mut self, chunk: &[FlatVoterRecord]) -> Result<ImportSummary> {
            let index = self.chunk_lengths.len();
            self.chunk_lengths.push(chunk.len());

            if self.fail_chunks.contains(&index) {
                bail!("simulated transport failure");
            }

            Ok(ImportSummary {
                voters_created: chunk.len() as i64,
                total_processed: chunk.len() as i64,
                ..Default::default()
            })
        }
    }

    #[test]
    fn test_120_records_make_three_chunks() {
        let coordinator = BatchCoordinator::new();
        let mut sink = MockSink::new();

        let report = coordinator.run(&records(120), &mut sink, |_, _| {});

        assert_eq!(sink.chunk_lengths, vec![50, 50, 20]);
        assert_eq!(report.processed, 120);
        assert_eq!(report.created, 120);
        assert_eq!(report.failed_chunks, 0);
    }

    #[test]
    fn test_failed_chunk_still_advances_processed() {
        let coordinator = BatchCoordinator::new();
        let mut sink = MockSink::failing_on(&[1]);

        let report = coordinator.run(&records(120), &mut sink, |_, _| {});

        // Middle chunk contributed nothing but was still counted as spent
        assert_eq!(report.processed, 120);
        assert_eq!(report.created, 70);
        assert_eq!(report.failed_chunks, 1);

        // All three chunks were attempted
        assert_eq!(sink.chunk_lengths.len(), 3);
    }

    #[test]
    fn test_progress_is_monotonic_even_under_failures() {
        let coordinator = BatchCoordinator::with_chunk_size(10);
        let mut sink = MockSink::failing_on(&[0, 2]);

        let mut reported = Vec::new();
        coordinator.run(&records(35), &mut sink, |processed, total| {
            reported.push((processed, total));
        });

        assert_eq!(
            reported,
            vec![(10, 35), (20, 35), (30, 35), (35, 35)]
        );
    }

    #[test]
    fn test_skipped_records_accumulate_across_chunks() {
        let conn = Connection::open_in_memory().unwrap();
        setup_database(&conn).unwrap();

        // Import the same 60 records twice: the second pass skips them all,
        // spread over two chunks
        let list = records(60);
        let coordinator = BatchCoordinator::new();

        let mut sink = LocalSink::new(&conn);
        let first = coordinator.run(&list, &mut sink, |_, _| {});
        assert_eq!(first.created, 60);

        let mut sink = LocalSink::new(&conn);
        let second = coordinator.run(&list, &mut sink, |_, _| {});

        assert_eq!(second.created, 0);
        assert_eq!(second.skipped, 60);
        assert_eq!(second.skipped_records.len(), 60);
        assert_eq!(second.processed, 60);
    }

    #[test]
    fn test_empty_queue_produces_empty_report() {
        let coordinator = BatchCoordinator::new();
        let mut sink = MockSink::new();

        let report = coordinator.run(&[], &mut sink, |_, _| {});

        assert_eq!(report.total, 0);
        assert_eq!(report.processed, 0);
        assert!(sink.chunk_lengths.is_empty());
    }
}
