//! Clearinghouse collaborator: claim submission and eligibility
//! inquiries.

use std::collections::BTreeMap;
use std::fmt;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use reqwest::StatusCode;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use thiserror::Error;
use tracing::{debug, warn};

use crate::config::HarnessConfig;

/// API version header sent with every clearinghouse request.
const API_VERSION: &str = "2024-01";

#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum ClearinghouseError {
    #[error("clearinghouse request timed out")]
    Timeout,

    #[error("clearinghouse transport error: {0}")]
    Http(String),

    #[error("clearinghouse returned status {status}: {message}")]
    Api { status: u16, message: String },

    #[error("malformed clearinghouse response: {0}")]
    MalformedResponse(String),

    #[error("clearinghouse is not configured")]
    NotConfigured,
}

impl From<reqwest::Error> for ClearinghouseError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_timeout() {
            Self::Timeout
        } else {
            Self::Http(err.to_string())
        }
    }
}

// ---------------------------------------------------------------------------
// Eligibility (270 / 271)
// ---------------------------------------------------------------------------

/// An X12 270-shaped eligibility inquiry.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EligibilityInquiry {
    pub transaction_set: String,
    pub version: String,
    pub inquiry_id: String,
    pub patient: InquiryPatient,
    pub payer: InquiryPayer,
    pub provider: InquiryProvider,
    pub service_type_codes: Vec<String>,
    pub generated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct InquiryPatient {
    pub id: String,
    pub member_id: String,
    pub first_name: String,
    pub last_name: String,
    pub date_of_birth: String,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct InquiryPayer {
    pub id: String,
    pub name: String,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct InquiryProvider {
    pub npi: String,
    pub name: String,
    pub tax_id: String,
}

/// Coverage state reported by a 271 response. Statuses other than
/// active and inactive collapse to `Unknown`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CoverageStatus {
    Active,
    Inactive,
    #[serde(other)]
    Unknown,
}

impl fmt::Display for CoverageStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Active => "active",
            Self::Inactive => "inactive",
            Self::Unknown => "unknown",
        };
        f.write_str(s)
    }
}

/// An individual limit and how much of it is left.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct Accumulator {
    #[serde(default)]
    pub individual: f64,
    #[serde(default)]
    pub remaining: f64,
}

/// A 271-shaped eligibility response.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CoverageResponse {
    pub eligibility_status: CoverageStatus,
    #[serde(default)]
    pub effective_date: Option<String>,
    #[serde(default)]
    pub termination_date: Option<String>,
    #[serde(default)]
    pub plan_type: Option<String>,
    #[serde(default)]
    pub deductible: Option<Accumulator>,
    /// Copay by service type.
    #[serde(default)]
    pub copay: BTreeMap<String, f64>,
    /// Coinsurance percentage (20.0 means 20%).
    #[serde(default)]
    pub coinsurance: Option<f64>,
    #[serde(default)]
    pub out_of_pocket_max: Option<Accumulator>,
    #[serde(default)]
    pub authorization_required: bool,
    #[serde(default)]
    pub covered_services: Vec<String>,
    #[serde(default)]
    pub reason: Option<String>,
    #[serde(default)]
    pub response_code: Option<String>,
}

impl CoverageResponse {
    /// A response carrying only a status, reason, and response code.
    pub fn bare(status: CoverageStatus, reason: &str, response_code: &str) -> Self {
        Self {
            eligibility_status: status,
            effective_date: None,
            termination_date: None,
            plan_type: None,
            deductible: None,
            copay: BTreeMap::new(),
            coinsurance: None,
            out_of_pocket_max: None,
            authorization_required: false,
            covered_services: Vec::new(),
            reason: Some(reason.to_string()),
            response_code: Some(response_code.to_string()),
        }
    }
}

// ---------------------------------------------------------------------------
// Claim submission
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SubmissionStatus {
    Submitted,
    Rejected,
}

impl SubmissionStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Submitted => "submitted",
            Self::Rejected => "rejected",
        }
    }
}

impl fmt::Display for SubmissionStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// What the clearinghouse said about a submitted claim.
///
/// A validation rejection is a receipt with `status = Rejected`, not an
/// error.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SubmissionReceipt {
    pub status: SubmissionStatus,
    pub batch_id: Option<String>,
    pub claim_id: Option<String>,
    pub tracking_number: Option<String>,
    pub validation_status: Option<String>,
    pub submission_id: Option<String>,
    pub validation_errors: Vec<Value>,
}

impl SubmissionReceipt {
    pub fn rejected(validation_errors: Vec<Value>) -> Self {
        Self {
            status: SubmissionStatus::Rejected,
            batch_id: None,
            claim_id: None,
            tracking_number: None,
            validation_status: None,
            submission_id: None,
            validation_errors,
        }
    }
}

#[derive(Deserialize)]
struct SubmitResponse {
    batch_id: Option<String>,
    claim_id: Option<String>,
    tracking_number: Option<String>,
    validation_status: Option<String>,
    submission_id: Option<String>,
}

// ---------------------------------------------------------------------------
// Trait and HTTP implementation
// ---------------------------------------------------------------------------

#[async_trait]
pub trait Clearinghouse: Send + Sync {
    /// Submit a claim payload for EDI generation and payer submission.
    async fn submit_claim(&self, payload: &Value) -> Result<SubmissionReceipt, ClearinghouseError>;

    /// Send a 270 inquiry and return the 271 response.
    async fn check_eligibility(
        &self,
        inquiry: &EligibilityInquiry,
    ) -> Result<CoverageResponse, ClearinghouseError>;
}

const _: () = {
    fn _assert_object_safe(_: &dyn Clearinghouse) {}
};

/// Clearinghouse reached over its JSON HTTP API.
#[derive(Debug, Clone)]
pub struct HttpClearinghouse {
    client: reqwest::Client,
    api_url: String,
    account_key: Option<String>,
}

impl HttpClearinghouse {
    pub fn new(
        api_url: &str,
        account_key: Option<String>,
        config: &HarnessConfig,
    ) -> Result<Self, ClearinghouseError> {
        let api_url = api_url.trim().trim_end_matches('/');
        if api_url.is_empty() {
            return Err(ClearinghouseError::NotConfigured);
        }
        let client = reqwest::Client::builder()
            .timeout(config.request_timeout())
            .build()
            .map_err(|e| ClearinghouseError::Http(e.to_string()))?;
        Ok(Self {
            client,
            api_url: api_url.to_string(),
            account_key: account_key.filter(|k| !k.is_empty()),
        })
    }

    fn post(&self, path: &str) -> reqwest::RequestBuilder {
        let mut request = self
            .client
            .post(format!("{}{path}", self.api_url))
            .header("X-API-Version", API_VERSION);
        if let Some(key) = &self.account_key {
            request = request.bearer_auth(key);
        }
        request
    }
}

#[async_trait]
impl Clearinghouse for HttpClearinghouse {
    async fn submit_claim(&self, payload: &Value) -> Result<SubmissionReceipt, ClearinghouseError> {
        let resp = self.post("/claims/submit").json(payload).send().await?;
        let status = resp.status();
        let body = resp.text().await?;

        if status.is_success() {
            let parsed: SubmitResponse = serde_json::from_str(&body)
                .map_err(|e| ClearinghouseError::MalformedResponse(e.to_string()))?;
            debug!(batch_id = ?parsed.batch_id, "claim accepted by clearinghouse");
            return Ok(SubmissionReceipt {
                status: SubmissionStatus::Submitted,
                batch_id: parsed.batch_id,
                claim_id: parsed.claim_id,
                tracking_number: parsed.tracking_number,
                validation_status: parsed.validation_status,
                submission_id: parsed.submission_id,
                validation_errors: Vec::new(),
            });
        }

        if status.is_client_error() {
            if let Some(errors) = validation_errors(&body) {
                warn!(status = status.as_u16(), "clearinghouse rejected claim");
                return Ok(SubmissionReceipt::rejected(errors));
            }
        }

        Err(api_error(status, body))
    }

    async fn check_eligibility(
        &self,
        inquiry: &EligibilityInquiry,
    ) -> Result<CoverageResponse, ClearinghouseError> {
        let resp = self.post("/eligibility/inquiry").json(inquiry).send().await?;
        let status = resp.status();
        let body = resp.text().await?;
        if !status.is_success() {
            return Err(api_error(status, body));
        }
        serde_json::from_str(&body).map_err(|e| ClearinghouseError::MalformedResponse(e.to_string()))
    }
}

/// The `errors` array of a rejection body, if it has one.
fn validation_errors(body: &str) -> Option<Vec<Value>> {
    let value: Value = serde_json::from_str(body).ok()?;
    value.get("errors")?.as_array().cloned()
}

fn api_error(status: StatusCode, message: String) -> ClearinghouseError {
    ClearinghouseError::Api {
        status: status.as_u16(),
        message,
    }
}
