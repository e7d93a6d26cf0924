//! Insurance eligibility verification via 270/271 inquiries.

use std::collections::BTreeMap;

use async_trait::async_trait;
use chrono::Utc;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::collab::{
    Accumulator, CoverageResponse, CoverageStatus, EligibilityInquiry, InquiryPatient,
    InquiryPayer, InquiryProvider,
};
use crate::contract::request::{require_object, text_or_empty};
use crate::contract::{AgentContract, AgentError, AgentRequest, Collaborators, DEVELOPMENT_MODEL};

const DEFAULT_SERVICE_TYPE: &str = "medical_care";
const X12_VERSION: &str = "005010X279A1";

/// Reported as `model_used` when coverage came from the clearinghouse.
const CLEARINGHOUSE_SOURCE: &str = "clearinghouse";

/// Estimated charge by service type.
const SERVICE_COSTS: &[(&str, f64)] = &[
    ("office_visit", 200.0),
    ("specialist", 350.0),
    ("imaging", 800.0),
    ("surgery", 5000.0),
    ("emergency", 1200.0),
];
const DEFAULT_SERVICE_COST: f64 = 250.0;

/// Remaining out-of-pocket below which the patient is flagged as close
/// to the maximum.
const OOP_NEAR_MAX: f64 = 1000.0;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Recommendation {
    #[serde(rename = "type")]
    pub kind: String,
    pub message: String,
    pub priority: String,
}

impl Recommendation {
    fn new(kind: &str, message: impl Into<String>, priority: &str) -> Self {
        Self {
            kind: kind.to_string(),
            message: message.into(),
            priority: priority.to_string(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CostEstimate {
    pub estimated_charge: f64,
    pub patient_responsibility: f64,
    pub insurance_portion: f64,
    pub calculation_method: String,
    pub disclaimer: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EligibilityResult {
    pub patient_id: String,
    pub eligibility_check_id: String,
    pub inquiry_id: String,
    pub service_type: String,
    #[serde(flatten)]
    pub coverage: CoverageResponse,
    pub recommendations: Vec<Recommendation>,
    /// `verified`, `failed`, or `unknown`.
    pub verification_status: String,
    /// Present only for active coverage.
    pub estimated_patient_cost: Option<CostEstimate>,
    pub development_mode: bool,
    pub model_used: String,
}

#[derive(Debug, Clone, Copy, Default)]
pub struct EligibilityAgent;

#[async_trait]
impl AgentContract for EligibilityAgent {
    type Output = EligibilityResult;

    fn name(&self) -> &str {
        "eligibility"
    }

    fn validate(&self, request: &AgentRequest) -> Option<String> {
        if request.text("patientId").is_none() {
            return Some("Missing required field: patientId".to_string());
        }
        require_object(request, "insuranceInfo").err()
    }

    async fn execute_production(
        &self,
        request: &AgentRequest,
        collaborators: &Collaborators,
    ) -> Result<EligibilityResult, AgentError> {
        let inquiry = build_inquiry(request);
        let coverage = collaborators
            .clearinghouse
            .check_eligibility(&inquiry)
            .await
            .map_err(|e| AgentError::Collaborator(format!("eligibility inquiry failed: {e}")))?;
        Ok(enhance(inquiry, coverage, false, CLEARINGHOUSE_SOURCE))
    }

    fn execute_development(&self, request: &AgentRequest) -> Result<EligibilityResult, AgentError> {
        let inquiry = build_inquiry(request);
        let coverage = simulated_coverage(&inquiry.patient.id, &service_type(request));
        Ok(enhance(inquiry, coverage, true, DEVELOPMENT_MODEL))
    }
}

fn service_type(request: &AgentRequest) -> String {
    request
        .text("serviceType")
        .unwrap_or_else(|| DEFAULT_SERVICE_TYPE.to_string())
}

fn build_inquiry(request: &AgentRequest) -> EligibilityInquiry {
    let empty = Map::new();
    let insurance = request.object("insuranceInfo").unwrap_or(&empty);
    let provider = request.object("providerInfo").unwrap_or(&empty);
    let now = Utc::now();

    EligibilityInquiry {
        transaction_set: "270".to_string(),
        version: X12_VERSION.to_string(),
        inquiry_id: format!("INQ_{}", now.timestamp()),
        patient: InquiryPatient {
            id: request.text("patientId").unwrap_or_default(),
            member_id: text_or_empty(insurance, "memberId"),
            first_name: text_or_empty(insurance, "firstName"),
            last_name: text_or_empty(insurance, "lastName"),
            date_of_birth: text_or_empty(insurance, "dateOfBirth"),
        },
        payer: InquiryPayer {
            id: text_or_empty(insurance, "payerId"),
            name: text_or_empty(insurance, "payerName"),
        },
        provider: InquiryProvider {
            npi: text_or_empty(provider, "npi"),
            name: text_or_empty(provider, "name"),
            tax_id: text_or_empty(provider, "taxId"),
        },
        service_type_codes: vec![service_type(request)],
        generated_at: now,
    }
}

/// 32-bit FNV-1a, used to pick a stable simulated scenario per patient.
fn fnv1a(input: &str) -> u32 {
    const OFFSET: u32 = 0x811c_9dc5;
    const PRIME: u32 = 0x0100_0193;
    input
        .bytes()
        .fold(OFFSET, |hash, byte| (hash ^ u32::from(byte)).wrapping_mul(PRIME))
}

/// One of four scenarios (active, inactive, pending, limited) chosen by
/// patient id. Pending and limited both report unknown coverage.
fn simulated_coverage(patient_id: &str, service_type: &str) -> CoverageResponse {
    match fnv1a(patient_id) % 4 {
        0 => CoverageResponse {
            eligibility_status: CoverageStatus::Active,
            effective_date: Some("2024-01-01".to_string()),
            termination_date: None,
            plan_type: Some("PPO".to_string()),
            deductible: Some(Accumulator {
                individual: 1500.0,
                remaining: 800.0,
            }),
            copay: BTreeMap::from([
                ("office_visit".to_string(), 25.0),
                ("specialist".to_string(), 50.0),
                ("emergency".to_string(), 150.0),
            ]),
            coinsurance: Some(20.0),
            out_of_pocket_max: Some(Accumulator {
                individual: 5000.0,
                remaining: 3200.0,
            }),
            authorization_required: matches!(service_type, "surgery" | "imaging" | "specialist"),
            covered_services: vec![
                "medical_care".to_string(),
                "preventive".to_string(),
                "pharmacy".to_string(),
            ],
            reason: None,
            response_code: Some("001".to_string()),
        },
        1 => {
            let mut coverage =
                CoverageResponse::bare(CoverageStatus::Inactive, "Coverage terminated", "003");
            coverage.termination_date = Some("2023-12-31".to_string());
            coverage
        }
        _ => CoverageResponse::bare(CoverageStatus::Unknown, "Unable to verify coverage", "004"),
    }
}

fn enhance(
    inquiry: EligibilityInquiry,
    coverage: CoverageResponse,
    development_mode: bool,
    model_used: &str,
) -> EligibilityResult {
    let service_type = inquiry
        .service_type_codes
        .first()
        .cloned()
        .unwrap_or_else(|| DEFAULT_SERVICE_TYPE.to_string());

    let (recommendations, verification_status, estimated_patient_cost) =
        match coverage.eligibility_status {
            CoverageStatus::Active => (
                active_recommendations(&coverage),
                "verified",
                Some(estimate_patient_cost(&coverage, &service_type)),
            ),
            CoverageStatus::Inactive => (
                vec![Recommendation::new(
                    "coverage_issue",
                    "Patient coverage is inactive - verify current insurance",
                    "critical",
                )],
                "failed",
                None,
            ),
            CoverageStatus::Unknown => (
                vec![Recommendation::new(
                    "verification_needed",
                    "Unable to verify coverage - contact insurance directly",
                    "high",
                )],
                "unknown",
                None,
            ),
        };

    EligibilityResult {
        patient_id: inquiry.patient.id,
        eligibility_check_id: format!("EC_{}", inquiry.generated_at.timestamp()),
        inquiry_id: inquiry.inquiry_id,
        service_type,
        coverage,
        recommendations,
        verification_status: verification_status.to_string(),
        estimated_patient_cost,
        development_mode,
        model_used: model_used.to_string(),
    }
}

fn active_recommendations(coverage: &CoverageResponse) -> Vec<Recommendation> {
    let mut recommendations = Vec::new();
    if coverage.authorization_required {
        recommendations.push(Recommendation::new(
            "prior_authorization",
            "Prior authorization required for this service",
            "high",
        ));
    }
    if let Some(deductible) = coverage.deductible.filter(|d| d.remaining > 0.0) {
        recommendations.push(Recommendation::new(
            "patient_payment",
            format!(
                "Patient has ${:.2} remaining deductible",
                deductible.remaining
            ),
            "medium",
        ));
    }
    if coverage
        .out_of_pocket_max
        .is_some_and(|oop| oop.remaining < OOP_NEAR_MAX)
    {
        recommendations.push(Recommendation::new(
            "oop_maximum",
            "Patient close to out-of-pocket maximum",
            "low",
        ));
    }
    recommendations
}

fn round_cents(amount: f64) -> f64 {
    (amount * 100.0).round() / 100.0
}

/// Copay when one applies to the service, otherwise the remaining
/// deductible portion plus coinsurance on the rest.
fn estimate_patient_cost(coverage: &CoverageResponse, service_type: &str) -> CostEstimate {
    let charge = SERVICE_COSTS
        .iter()
        .find(|(kind, _)| *kind == service_type)
        .map_or(DEFAULT_SERVICE_COST, |(_, cost)| *cost);
    let copay = coverage.copay.get(service_type).copied().unwrap_or(0.0);

    let patient_cost = if copay > 0.0 {
        copay
    } else {
        let deductible_remaining = coverage.deductible.map_or(0.0, |d| d.remaining.max(0.0));
        let coinsurance_rate = coverage.coinsurance.unwrap_or(0.0) / 100.0;
        let deductible_portion = charge.min(deductible_remaining);
        deductible_portion + (charge - deductible_portion) * coinsurance_rate
    };

    CostEstimate {
        estimated_charge: charge,
        patient_responsibility: round_cents(patient_cost),
        insurance_portion: round_cents(charge - patient_cost),
        calculation_method: "estimated".to_string(),
        disclaimer: "Estimate only - actual costs may vary".to_string(),
    }
}
