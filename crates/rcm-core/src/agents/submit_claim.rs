//! Claim submission through the clearinghouse.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value, json};
use tracing::{info, warn};

use crate::collab::{SubmissionReceipt, SubmissionStatus};
use crate::contract::request::{require_nested, require_object, text_or_empty};
use crate::contract::{AgentContract, AgentError, AgentRequest, Collaborators, DEVELOPMENT_MODEL};

const REQUIRED_CLAIM_FIELDS: [&str; 4] = ["claimId", "patientId", "providerId", "serviceDate"];
const EXPECTED_RESPONSE_TIME: &str = "24-48 hours";
const CLEARINGHOUSE_SOURCE: &str = "clearinghouse";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ClaimSubmission {
    pub claim_id: String,
    pub claimmd_batch_id: Option<String>,
    pub claimmd_claim_id: Option<String>,
    /// `submitted` or `rejected`.
    pub submission_status: String,
    pub tracking_number: Option<String>,
    pub validation_errors: Vec<Value>,
    pub expected_response_time: String,
    pub submitted_at: DateTime<Utc>,
    pub message: Option<String>,
    pub development_mode: bool,
    pub model_used: String,
}

#[derive(Debug, Clone, Copy, Default)]
pub struct SubmitClaimAgent;

#[async_trait]
impl AgentContract for SubmitClaimAgent {
    type Output = ClaimSubmission;

    fn name(&self) -> &str {
        "submit_claim"
    }

    fn validate(&self, request: &AgentRequest) -> Option<String> {
        let check = || -> Result<(), String> {
            let claim = require_object(request, "claimData")?;
            for field in REQUIRED_CLAIM_FIELDS {
                require_nested(claim, "claimData", field)?;
            }
            match claim.get("services").and_then(Value::as_array) {
                Some(services) if !services.is_empty() => Ok(()),
                _ => Err("At least one service must be provided".to_string()),
            }
        };
        check().err()
    }

    async fn execute_production(
        &self,
        request: &AgentRequest,
        collaborators: &Collaborators,
    ) -> Result<ClaimSubmission, AgentError> {
        let claim = claim_data(request)?;
        let claim_id = text_or_empty(claim, "claimId");
        let payload = build_claim_payload(claim);

        let receipt = collaborators
            .clearinghouse
            .submit_claim(&payload)
            .await
            .map_err(|e| AgentError::Collaborator(format!("claim submission failed: {e}")))?;

        match collaborators
            .store
            .record_claim_submission(
                &claim_id,
                receipt.batch_id.as_deref(),
                receipt.status.as_str(),
            )
            .await
        {
            Ok(0) => warn!(claim_id = %claim_id, "no claim row to update after submission"),
            Ok(_) => {}
            Err(e) => {
                warn!(claim_id = %claim_id, error = %e, "failed to record claim submission");
            }
        }

        info!(
            claim_id = %claim_id,
            status = %receipt.status,
            errors = receipt.validation_errors.len(),
            "claim submitted to clearinghouse"
        );
        Ok(from_receipt(claim_id, receipt))
    }

    fn execute_development(&self, request: &AgentRequest) -> Result<ClaimSubmission, AgentError> {
        let claim = claim_data(request)?;
        let claim_id = text_or_empty(claim, "claimId");
        Ok(ClaimSubmission {
            claimmd_batch_id: Some(format!("BATCH-DEV-{claim_id}")),
            claimmd_claim_id: Some(format!("CMD-DEV-{claim_id}")),
            tracking_number: Some(format!("TRK-DEV-{claim_id}")),
            claim_id,
            submission_status: SubmissionStatus::Submitted.as_str().to_string(),
            validation_errors: Vec::new(),
            expected_response_time: EXPECTED_RESPONSE_TIME.to_string(),
            submitted_at: Utc::now(),
            message: Some(
                "Claim processed in development mode - no actual submission".to_string(),
            ),
            development_mode: true,
            model_used: DEVELOPMENT_MODEL.to_string(),
        })
    }
}

fn claim_data(request: &AgentRequest) -> Result<&Map<String, Value>, AgentError> {
    request
        .object("claimData")
        .ok_or_else(|| AgentError::Unexpected("claimData disappeared after validation".into()))
}

fn from_receipt(claim_id: String, receipt: SubmissionReceipt) -> ClaimSubmission {
    let message = match receipt.status {
        SubmissionStatus::Submitted => None,
        SubmissionStatus::Rejected => Some("Claim rejected by clearinghouse validation".to_string()),
    };
    ClaimSubmission {
        claim_id,
        claimmd_batch_id: receipt.batch_id,
        claimmd_claim_id: receipt.claim_id,
        submission_status: receipt.status.as_str().to_string(),
        tracking_number: receipt.tracking_number,
        validation_errors: receipt.validation_errors,
        expected_response_time: EXPECTED_RESPONSE_TIME.to_string(),
        submitted_at: Utc::now(),
        message,
        development_mode: false,
        model_used: CLEARINGHOUSE_SOURCE.to_string(),
    }
}

fn field(map: &Map<String, Value>, key: &str) -> Value {
    map.get(key).cloned().unwrap_or(Value::Null)
}

fn field_or(map: &Map<String, Value>, key: &str, default: Value) -> Value {
    map.get(key).cloned().unwrap_or(default)
}

/// Map the internal claim shape onto the clearinghouse submission payload.
pub(crate) fn build_claim_payload(claim: &Map<String, Value>) -> Value {
    let empty = Map::new();
    let nested = |key: &str| claim.get(key).and_then(Value::as_object).unwrap_or(&empty);
    let patient = nested("patient");
    let provider = nested("provider");
    let insurance = nested("insurance");
    let service_date = field(claim, "serviceDate");

    let services: Vec<Value> = claim
        .get("services")
        .and_then(Value::as_array)
        .map(Vec::as_slice)
        .unwrap_or_default()
        .iter()
        .enumerate()
        .map(|(i, service)| {
            let service = service.as_object().unwrap_or(&empty);
            json!({
                "line_number": i + 1,
                "procedure_code": field(service, "procedureCode"),
                "modifiers": field_or(service, "modifiers", json!([])),
                "diagnosis_pointers": field_or(service, "diagnosisPointers", json!([1])),
                "service_date": field_or(service, "serviceDate", service_date.clone()),
                "units": field_or(service, "units", json!(1)),
                "charge_amount": field(service, "chargeAmount"),
                "place_of_service": field_or(service, "placeOfService", json!("11")),
            })
        })
        .collect();

    let diagnoses: Vec<Value> = claim
        .get("diagnosisCodes")
        .and_then(Value::as_array)
        .map(Vec::as_slice)
        .unwrap_or_default()
        .iter()
        .enumerate()
        .map(|(i, code)| json!({"pointer": i + 1, "code": code, "code_type": "ICD10"}))
        .collect();

    json!({
        "claim": {
            "id": field(claim, "claimId"),
            "type": field_or(claim, "claimType", json!("professional")),
            "service_date": service_date,
            "patient": {
                "id": field(patient, "id"),
                "first_name": field(patient, "firstName"),
                "last_name": field(patient, "lastName"),
                "date_of_birth": field(patient, "dateOfBirth"),
                "gender": field(patient, "gender"),
                "address": field_or(patient, "address", json!({})),
                "phone": field(patient, "phone"),
                "ssn": field(patient, "ssn"),
            },
            "provider": {
                "npi": field(provider, "npi"),
                "name": field(provider, "name"),
                "taxonomy": field(provider, "taxonomy"),
                "address": field_or(provider, "address", json!({})),
                "phone": field(provider, "phone"),
            },
            "insurance": {
                "payer_id": field(insurance, "payerId"),
                "payer_name": field(insurance, "payerName"),
                "member_id": field(insurance, "memberId"),
                "group_number": field(insurance, "groupNumber"),
                "plan_name": field(insurance, "planName"),
            },
            "services": services,
            "diagnoses": diagnoses,
        },
        "options": {
            "validate_only": false,
            "test_mode": false,
            "priority": "normal",
        },
    })
}
