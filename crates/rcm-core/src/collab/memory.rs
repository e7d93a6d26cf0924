//! In-memory collaborators for tests and local wiring.

use std::collections::VecDeque;
use std::sync::{Arc, Mutex, MutexGuard};

use async_trait::async_trait;
use serde_json::Value;

use rcm_db::queries::appeals::NewAppeal;
use rcm_db::queries::denials::NewDenial;

use super::{
    BusinessStore, Clearinghouse, ClearinghouseError, CoverageResponse, EligibilityInquiry,
    SubmissionReceipt,
};

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

/// A claim submission captured by [`MemoryBusinessStore`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RecordedSubmission {
    pub claim_id: String,
    pub batch_id: Option<String>,
    pub submission_status: String,
}

#[derive(Debug, Default)]
struct StoreState {
    denials: Vec<NewDenial>,
    appeals: Vec<NewAppeal>,
    submissions: Vec<RecordedSubmission>,
}

/// [`BusinessStore`] that keeps every write in memory. With
/// [`MemoryBusinessStore::failing`] every write errors instead.
#[derive(Debug, Clone, Default)]
pub struct MemoryBusinessStore {
    state: Arc<Mutex<StoreState>>,
    fail: bool,
}

impl MemoryBusinessStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn failing() -> Self {
        Self {
            fail: true,
            ..Self::default()
        }
    }

    pub fn denials(&self) -> Vec<NewDenial> {
        lock(&self.state).denials.clone()
    }

    pub fn appeals(&self) -> Vec<NewAppeal> {
        lock(&self.state).appeals.clone()
    }

    pub fn submissions(&self) -> Vec<RecordedSubmission> {
        lock(&self.state).submissions.clone()
    }

    fn check(&self) -> anyhow::Result<()> {
        if self.fail {
            anyhow::bail!("business store unavailable");
        }
        Ok(())
    }
}

#[async_trait]
impl BusinessStore for MemoryBusinessStore {
    async fn record_denial(&self, denial: &NewDenial) -> anyhow::Result<()> {
        self.check()?;
        lock(&self.state).denials.push(denial.clone());
        Ok(())
    }

    async fn record_appeal(&self, appeal: &NewAppeal) -> anyhow::Result<()> {
        self.check()?;
        lock(&self.state).appeals.push(appeal.clone());
        Ok(())
    }

    async fn record_claim_submission(
        &self,
        claim_id: &str,
        batch_id: Option<&str>,
        submission_status: &str,
    ) -> anyhow::Result<u64> {
        self.check()?;
        lock(&self.state).submissions.push(RecordedSubmission {
            claim_id: claim_id.to_string(),
            batch_id: batch_id.map(str::to_string),
            submission_status: submission_status.to_string(),
        });
        Ok(1)
    }
}

/// [`Clearinghouse`] that replays queued answers and captures requests.
///
/// An empty queue answers with [`ClearinghouseError::NotConfigured`].
#[derive(Debug, Clone, Default)]
pub struct ScriptedClearinghouse {
    receipts: Arc<Mutex<VecDeque<Result<SubmissionReceipt, ClearinghouseError>>>>,
    coverage: Arc<Mutex<VecDeque<Result<CoverageResponse, ClearinghouseError>>>>,
    payloads: Arc<Mutex<Vec<Value>>>,
    inquiries: Arc<Mutex<Vec<EligibilityInquiry>>>,
}

impl ScriptedClearinghouse {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_receipt(self, receipt: Result<SubmissionReceipt, ClearinghouseError>) -> Self {
        lock(&self.receipts).push_back(receipt);
        self
    }

    pub fn with_coverage(self, coverage: Result<CoverageResponse, ClearinghouseError>) -> Self {
        lock(&self.coverage).push_back(coverage);
        self
    }

    /// Claim payloads submitted so far.
    pub fn payloads(&self) -> Vec<Value> {
        lock(&self.payloads).clone()
    }

    /// Eligibility inquiries sent so far.
    pub fn inquiries(&self) -> Vec<EligibilityInquiry> {
        lock(&self.inquiries).clone()
    }
}

#[async_trait]
impl Clearinghouse for ScriptedClearinghouse {
    async fn submit_claim(&self, payload: &Value) -> Result<SubmissionReceipt, ClearinghouseError> {
        lock(&self.payloads).push(payload.clone());
        lock(&self.receipts)
            .pop_front()
            .unwrap_or(Err(ClearinghouseError::NotConfigured))
    }

    async fn check_eligibility(
        &self,
        inquiry: &EligibilityInquiry,
    ) -> Result<CoverageResponse, ClearinghouseError> {
        lock(&self.inquiries).push(inquiry.clone());
        lock(&self.coverage)
            .pop_front()
            .unwrap_or(Err(ClearinghouseError::NotConfigured))
    }
}
