// Entity Models - voters, voter areas, users

pub mod area;
pub mod user;
pub mod voter;

// Re-export main types
pub use area::{AreaUpdate, UpsertOutcome, VoterArea};
pub use user::{User, ADMIN_USERNAME};
pub use voter::{NewVoter, Pagination, Voter, VoterFilter, VoterUpdate};
