//! Denial classification: categorize a payer denial and suggest the
//! corrective action.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value, json};
use tracing::warn;

use rcm_db::queries::denials::NewDenial;

use super::parse_date;
use crate::contract::request::{joined, require_nested, require_object, text_or, text_or_empty};
use crate::contract::{AgentContract, AgentError, AgentRequest, Collaborators, DEVELOPMENT_MODEL};
use crate::extract;

const MAX_TOKENS: u32 = 1500;
const TEMPERATURE: f32 = 0.2;

const UNKNOWN: &str = "unknown";
const NEUTRAL_CONFIDENCE: f64 = 0.5;
const FALLBACK_CONFIDENCE: f64 = 0.3;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DenialAnalysis {
    pub claim_id: String,
    pub denial_category: String,
    pub suggested_action: String,
    /// Confidence in the classification, 0 to 1.
    pub confidence: f64,
    /// Estimated chance an appeal succeeds, 0 to 1.
    pub appeal_likelihood: Option<f64>,
    pub prevention_tips: Vec<String>,
    pub requires_review: bool,
    pub estimated_rework_time: Option<String>,
    pub development_mode: bool,
    pub model_used: String,
}

#[derive(Debug, Clone, Copy, Default)]
pub struct DenialClassifierAgent;

#[async_trait]
impl AgentContract for DenialClassifierAgent {
    type Output = DenialAnalysis;

    fn name(&self) -> &str {
        "denial_classifier"
    }

    fn validate(&self, request: &AgentRequest) -> Option<String> {
        let check = || -> Result<(), String> {
            let denial = require_object(request, "denialData")?;
            require_nested(denial, "denialData", "denialReason")?;
            require_nested(denial, "denialData", "claimId")
        };
        check().err()
    }

    async fn execute_production(
        &self,
        request: &AgentRequest,
        collaborators: &Collaborators,
    ) -> Result<DenialAnalysis, AgentError> {
        let denial = denial_data(request)?;
        let claim_id = text_or_empty(denial, "claimId");

        let prompt = build_prompt(denial);
        let text = collaborators
            .inference
            .generate(&prompt, MAX_TOKENS, TEMPERATURE)
            .await?;
        let model_used = collaborators.inference.model_id().to_string();

        let analysis = match extract::extract_object(&text) {
            Ok(map) => normalize(claim_id, &map, model_used),
            Err(e) => {
                warn!(claim_id = %claim_id, error = %e, "denial analysis unusable, routing to manual review");
                DenialAnalysis {
                    claim_id,
                    denial_category: UNKNOWN.to_string(),
                    suggested_action: "manual_review".to_string(),
                    confidence: FALLBACK_CONFIDENCE,
                    appeal_likelihood: None,
                    prevention_tips: Vec::new(),
                    requires_review: true,
                    estimated_rework_time: None,
                    development_mode: false,
                    model_used,
                }
            }
        };

        let record = NewDenial {
            claim_id: analysis.claim_id.clone(),
            denial_date: denial
                .get("denialDate")
                .and_then(Value::as_str)
                .and_then(parse_date)
                .map(|dt| dt.date_naive()),
            denial_reason_code: denial
                .get("denialCode")
                .and_then(crate::contract::request::text_of),
            denial_reason_description: text_or_empty(denial, "denialReason"),
            denial_category: analysis.denial_category.clone(),
            ai_suggested_action: analysis.suggested_action.clone(),
            ai_prevention_tips: json!(analysis.prevention_tips),
        };
        if let Err(e) = collaborators.store.record_denial(&record).await {
            warn!(claim_id = %record.claim_id, error = %e, "failed to store denial record (best-effort)");
        }

        Ok(analysis)
    }

    fn execute_development(&self, request: &AgentRequest) -> Result<DenialAnalysis, AgentError> {
        let denial = denial_data(request)?;
        Ok(DenialAnalysis {
            claim_id: text_or_empty(denial, "claimId"),
            denial_category: "coding_error".to_string(),
            suggested_action: "recode_and_resubmit".to_string(),
            confidence: 0.92,
            appeal_likelihood: Some(0.75),
            prevention_tips: vec![
                "Review CPT code specificity requirements".to_string(),
                "Ensure diagnosis supports medical necessity".to_string(),
                "Consider modifier usage for accurate reporting".to_string(),
            ],
            requires_review: false,
            estimated_rework_time: Some("15-30 minutes".to_string()),
            development_mode: true,
            model_used: DEVELOPMENT_MODEL.to_string(),
        })
    }
}

fn denial_data(request: &AgentRequest) -> Result<&Map<String, Value>, AgentError> {
    request
        .object("denialData")
        .ok_or_else(|| AgentError::Unexpected("denialData missing after validation".to_string()))
}

fn build_prompt(denial: &Map<String, Value>) -> String {
    let empty = Map::new();
    let claim = denial
        .get("claimDetails")
        .and_then(Value::as_object)
        .unwrap_or(&empty);

    format!(
        "You are a medical billing denial management specialist. Analyze the claim denial below.\n\
         \n\
         DENIAL\n\
         Payer: {payer}\n\
         Denial code: {code}\n\
         Denial reason: {reason}\n\
         \n\
         ORIGINAL CLAIM\n\
         Service date: {service_date}\n\
         Procedure codes: {procedures}\n\
         Diagnosis codes: {diagnoses}\n\
         Total amount: ${amount}\n\
         \n\
         Provide:\n\
         1. category (coding_error, authorization_required, eligibility_issue, medical_necessity, documentation_insufficient, billing_error, ...)\n\
         2. suggested_action (recode_and_resubmit, appeal_with_documentation, verify_eligibility, obtain_authorization, ...)\n\
         3. confidence in the classification from 0.0 to 1.0\n\
         4. appeal_likelihood from 0.0 to 1.0\n\
         5. prevention_tips for future claims\n\
         6. requires_review: whether a person must look at this now\n\
         \n\
         Respond with JSON only:\n\
         {{\"category\": \"\", \"suggested_action\": \"\", \"confidence\": 0.0, \"appeal_likelihood\": 0.0, \
         \"prevention_tips\": [], \"requires_review\": false, \"estimated_rework_time\": \"\", \"reasoning\": \"\"}}",
        payer = text_or_empty(denial, "payerName"),
        code = text_or_empty(denial, "denialCode"),
        reason = text_or_empty(denial, "denialReason"),
        service_date = text_or(claim, "serviceDate", "Not provided"),
        procedures = joined(claim, "procedureCodes"),
        diagnoses = joined(claim, "diagnosisCodes"),
        amount = text_or(claim, "totalAmount", "0"),
    )
}

/// Fill gaps in the model's answer: missing labels become `unknown` and a
/// confidence that is missing, non-numeric, or outside `[0, 1]` becomes
/// 0.5.
fn normalize(claim_id: String, map: &Map<String, Value>, model_used: String) -> DenialAnalysis {
    let label = |key: &str| {
        map.get(key)
            .and_then(Value::as_str)
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .unwrap_or(UNKNOWN)
            .to_string()
    };
    let unit = |key: &str| {
        map.get(key)
            .and_then(Value::as_f64)
            .filter(|v| (0.0..=1.0).contains(v))
    };

    DenialAnalysis {
        claim_id,
        denial_category: label("category"),
        suggested_action: label("suggested_action"),
        confidence: unit("confidence").unwrap_or(NEUTRAL_CONFIDENCE),
        appeal_likelihood: unit("appeal_likelihood"),
        prevention_tips: map
            .get("prevention_tips")
            .and_then(Value::as_array)
            .map(|tips| {
                tips.iter()
                    .filter_map(Value::as_str)
                    .map(str::to_string)
                    .collect()
            })
            .unwrap_or_default(),
        requires_review: map
            .get("requires_review")
            .and_then(Value::as_bool)
            .unwrap_or(false),
        estimated_rework_time: map
            .get("estimated_rework_time")
            .and_then(Value::as_str)
            .filter(|s| !s.trim().is_empty())
            .map(str::to_string),
        development_mode: false,
        model_used,
    }
}
