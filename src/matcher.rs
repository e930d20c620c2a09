// 🔍 Deduplication Matcher - CREATE vs SKIP for incoming voter records
//
// Identifier equality alone is NOT enough to call something a duplicate:
// published rolls reuse voter identifiers across re-publications, so two
// different people can legitimately share one. A record is a duplicate only
// when identifier, name AND father's name all agree.

use crate::entities::voter::Voter;
use crate::normalizer::NormalizedVoter;

/// Reason string attached to records skipped as duplicates
pub const DUPLICATE_REASON: &str = "Duplicate Record (ID+Name+Father)";

/// Verdict for one candidate record
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MatchDecision {
    /// Store the candidate (new identifier, or a distinct person / upstream
    /// correction sharing an existing one)
    Create,

    /// Drop the candidate as a true duplicate
    Skip { reason: String },
}

impl MatchDecision {
    pub fn is_skip(&self) -> bool {
        matches!(self, MatchDecision::Skip { .. })
    }
}

/// Decide whether a candidate duplicates the FIRST stored voter sharing its
/// identifier (the store enforces no uniqueness; first match is compared).
///
/// Name and father's name are compared whitespace-trimmed and case-folded.
/// Both matching → SKIP. Either differing → CREATE: silently dropping the
/// record would lose a legitimate new entry whenever an identifier is reused
/// or mistyped upstream.
pub fn decide(existing: Option<&Voter>, candidate: &NormalizedVoter) -> MatchDecision {
    let Some(existing) = existing else {
        return MatchDecision::Create;
    };

    let name_match = eq_folded(&existing.name, &candidate.name);
    let father_match = eq_folded(&existing.father, &candidate.father);

    if name_match && father_match {
        MatchDecision::Skip {
            reason: DUPLICATE_REASON.to_string(),
        }
    } else {
        MatchDecision::Create
    }
}

fn eq_folded(a: &str, b: &str) -> bool {
    a.trim().to_lowercase() == b.trim().to_lowercase()
}

// ============================================================================
// TESTS
// ============================================================================
