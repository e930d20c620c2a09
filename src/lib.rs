// Voter Registry - Core Library
// Exposes all modules for use in the CLI, API server, and tests

pub mod db;
pub mod entities;
pub mod normalizer;
pub mod matcher;
pub mod importer;
pub mod batch;
pub mod stats;

// Re-export commonly used types
pub use db::{default_db_path, is_constraint_violation, open_database, setup_database};
pub use normalizer::{
    normalize, parse_dob, to_ascii_digits,
    AreaSeed, FlatVoterRecord, ImportPayload, NormalizedBatch, NormalizedVoter, SkippedRecord,
};
pub use matcher::{decide, MatchDecision, DUPLICATE_REASON};
pub use importer::{run_import, ImportSummary};
pub use batch::{BatchCoordinator, BatchReport, ChunkSink, LocalSink, CHUNK_SIZE};
pub use stats::{dashboard_stats, DashboardStats};
pub use entities::{
    NewVoter, Pagination, User, Voter, VoterArea, VoterFilter, VoterUpdate, ADMIN_USERNAME,
};

/// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
