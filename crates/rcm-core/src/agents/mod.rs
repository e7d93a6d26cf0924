//! The built-in business agents.
//!
//! Each agent owns a typed output struct used by both of its execution
//! paths. Every output carries `development_mode` and `model_used`.

mod appeal;
mod coding;
mod denial;
mod eligibility;
mod submit_claim;

pub use appeal::{AppealDraft, AppealLetterAgent};
pub use coding::{CodeSuggestion, CodingAgent, CodingResult};
pub use denial::{DenialAnalysis, DenialClassifierAgent};
pub use eligibility::{CostEstimate, EligibilityAgent, EligibilityResult, Recommendation};
pub use submit_claim::{ClaimSubmission, SubmitClaimAgent};

use chrono::{DateTime, NaiveDate, NaiveTime, Utc};

/// Parse a date given as RFC 3339 or as a plain `YYYY-MM-DD`.
pub(crate) fn parse_date(raw: &str) -> Option<DateTime<Utc>> {
    let raw = raw.trim();
    if let Ok(dt) = DateTime::parse_from_rfc3339(raw) {
        return Some(dt.with_timezone(&Utc));
    }
    NaiveDate::parse_from_str(raw, "%Y-%m-%d")
        .ok()
        .map(|d| d.and_time(NaiveTime::MIN).and_utc())
}
