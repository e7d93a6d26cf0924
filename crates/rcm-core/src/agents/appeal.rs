//! Appeal letter drafting for denied claims.

use async_trait::async_trait;
use chrono::{DateTime, Days, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use tracing::warn;

use rcm_db::queries::appeals::NewAppeal;

use super::parse_date;
use crate::contract::request::{joined, require_nested, require_object, text_or, text_or_empty};
use crate::contract::{AgentContract, AgentError, AgentRequest, Collaborators, DEVELOPMENT_MODEL};
use crate::extract::ExtractionError;

const MAX_TOKENS: u32 = 3000;
const TEMPERATURE: f32 = 0.3;

/// Line prefixes the model uses for commentary around the letter.
const COMMENTARY_PREFIXES: &[&str] = &["```", "Here is", "This letter", "Note:"];

/// Base appeal success rates by denial-reason substring, first match wins.
const SUCCESS_RATES: &[(&str, f64)] = &[
    ("medical necessity", 0.65),
    ("documentation", 0.75),
    ("coding error", 0.80),
    ("authorization", 0.55),
    ("eligibility", 0.30),
    ("duplicate", 0.85),
    ("billing error", 0.90),
];
const DEFAULT_SUCCESS_RATE: f64 = 0.60;
const DOCUMENTATION_BONUS: f64 = 0.10;
const DOCUMENTATION_THRESHOLD: usize = 500;
const MAX_SUCCESS_RATE: f64 = 0.95;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AppealDraft {
    pub claim_id: String,
    pub appeal_id: String,
    pub appeal_letter: String,
    pub appeal_deadline: DateTime<Utc>,
    pub supporting_documents_needed: Vec<String>,
    pub success_probability: f64,
    pub development_mode: bool,
    pub model_used: String,
}

#[derive(Debug, Clone, Copy, Default)]
pub struct AppealLetterAgent;

#[async_trait]
impl AgentContract for AppealLetterAgent {
    type Output = AppealDraft;

    fn name(&self) -> &str {
        "appeal_letter"
    }

    fn validate(&self, request: &AgentRequest) -> Option<String> {
        let check = || -> Result<(), String> {
            let appeal = require_object(request, "appealData")?;
            require_nested(appeal, "appealData", "claimId")?;
            require_nested(appeal, "appealData", "denialReason")
        };
        check().err()
    }

    async fn execute_production(
        &self,
        request: &AgentRequest,
        collaborators: &Collaborators,
    ) -> Result<AppealDraft, AgentError> {
        let appeal = appeal_data(request)?;
        let claim_id = text_or_empty(appeal, "claimId");
        let now = Utc::now();

        let raw = collaborators
            .inference
            .generate(&build_prompt(appeal), MAX_TOKENS, TEMPERATURE)
            .await?;
        let letter = clean_letter(&raw);
        if letter.is_empty() {
            return Err(ExtractionError::EmptyOutput.into());
        }

        let success_probability = success_probability(appeal);
        let appeal_id = format!("APPEAL-{claim_id}-{}", now.timestamp());

        let record = NewAppeal {
            appeal_id: appeal_id.clone(),
            claim_id: claim_id.clone(),
            appeal_level: 1,
            appeal_letter: letter.clone(),
            ai_confidence_score: Some(success_probability),
        };
        if let Err(e) = collaborators.store.record_appeal(&record).await {
            warn!(appeal_id = %appeal_id, error = %e, "failed to store appeal record (best-effort)");
        }

        Ok(AppealDraft {
            claim_id,
            appeal_id,
            appeal_letter: letter,
            appeal_deadline: appeal_deadline(appeal, now),
            supporting_documents_needed: supporting_documents(appeal),
            success_probability,
            development_mode: false,
            model_used: collaborators.inference.model_id().to_string(),
        })
    }

    fn execute_development(&self, request: &AgentRequest) -> Result<AppealDraft, AgentError> {
        let appeal = appeal_data(request)?;
        let claim_id = text_or_empty(appeal, "claimId");
        let now = Utc::now();

        Ok(AppealDraft {
            appeal_id: format!("APPEAL-DEV-{claim_id}"),
            appeal_letter: template_letter(appeal, now),
            appeal_deadline: appeal_deadline(appeal, now),
            supporting_documents_needed: supporting_documents(appeal),
            success_probability: success_probability(appeal),
            claim_id,
            development_mode: true,
            model_used: DEVELOPMENT_MODEL.to_string(),
        })
    }
}

fn appeal_data(request: &AgentRequest) -> Result<&Map<String, Value>, AgentError> {
    request
        .object("appealData")
        .ok_or_else(|| AgentError::Unexpected("appealData missing after validation".to_string()))
}

fn build_prompt(appeal: &Map<String, Value>) -> String {
    let empty = Map::new();
    let service = appeal
        .get("serviceDetails")
        .and_then(Value::as_object)
        .unwrap_or(&empty);

    format!(
        "You are a medical billing appeals specialist. Write a formal, persuasive appeal letter for the denied claim below.\n\
         \n\
         APPEAL\n\
         Claim ID: {claim_id}\n\
         Patient: {patient}\n\
         Payer: {payer}\n\
         Denial code: {code}\n\
         Denial reason: {reason}\n\
         \n\
         SERVICE\n\
         Date of service: {dos}\n\
         Procedure codes: {procedures}\n\
         Diagnosis codes: {diagnoses}\n\
         Treating provider: {provider}\n\
         \n\
         CLINICAL CONTEXT\n\
         {notes}\n\
         \n\
         The letter must use business letter format, reference the denied claim, address the specific \
         denial reason, justify medical necessity, cite the supporting documentation, and request prompt \
         reconsideration in a respectful tone. Output only the letter.",
        claim_id = text_or_empty(appeal, "claimId"),
        patient = text_or_empty(appeal, "patientName"),
        payer = text_or_empty(appeal, "payerName"),
        code = text_or_empty(appeal, "denialCode"),
        reason = text_or_empty(appeal, "denialReason"),
        dos = text_or_empty(service, "dateOfService"),
        procedures = joined(service, "procedureCodes"),
        diagnoses = joined(service, "diagnosisCodes"),
        provider = text_or_empty(service, "providerName"),
        notes = text_or_empty(appeal, "clinicalNotes"),
    )
}

/// Drop model commentary lines and surrounding whitespace.
fn clean_letter(raw: &str) -> String {
    raw.lines()
        .filter(|line| !COMMENTARY_PREFIXES.iter().any(|p| line.starts_with(p)))
        .collect::<Vec<_>>()
        .join("\n")
        .trim()
        .to_string()
}

/// Filing window in days: 120 for Medicare, 60 for Medicaid, else 30.
fn appeal_window_days(payer_name: &str) -> u64 {
    let payer = payer_name.to_lowercase();
    if payer.contains("medicare") {
        120
    } else if payer.contains("medicaid") {
        60
    } else {
        30
    }
}

/// Deadline counted from the denial date when it parses, else from `now`.
fn appeal_deadline(appeal: &Map<String, Value>, now: DateTime<Utc>) -> DateTime<Utc> {
    let days = Days::new(appeal_window_days(&text_or_empty(appeal, "payerName")));
    let from = appeal
        .get("denialDate")
        .and_then(Value::as_str)
        .and_then(parse_date)
        .unwrap_or(now);
    from.checked_add_days(days).unwrap_or(from)
}

fn supporting_documents(appeal: &Map<String, Value>) -> Vec<String> {
    let reason = text_or_empty(appeal, "denialReason").to_lowercase();
    let mut docs = vec![
        "Copy of original claim",
        "Clinical notes from date of service",
    ];
    if reason.contains("medical necessity") {
        docs.extend([
            "Medical necessity documentation",
            "Clinical guidelines or research supporting treatment",
            "Provider attestation of medical necessity",
        ]);
    }
    if reason.contains("authorization") {
        docs.extend([
            "Prior authorization request",
            "Emergency treatment documentation if applicable",
        ]);
    }
    if reason.contains("documentation") {
        docs.extend([
            "Complete medical records",
            "Diagnostic test results",
            "Treatment history",
        ]);
    }
    docs.into_iter().map(str::to_string).collect()
}

fn success_probability(appeal: &Map<String, Value>) -> f64 {
    let reason = text_or_empty(appeal, "denialReason").to_lowercase();
    let base = SUCCESS_RATES
        .iter()
        .find(|(needle, _)| reason.contains(needle))
        .map_or(DEFAULT_SUCCESS_RATE, |(_, rate)| *rate);
    let notes_len = appeal
        .get("clinicalNotes")
        .and_then(Value::as_str)
        .map_or(0, |n| n.chars().count());
    let bonus = if notes_len > DOCUMENTATION_THRESHOLD {
        DOCUMENTATION_BONUS
    } else {
        0.0
    };
    (base + bonus).min(MAX_SUCCESS_RATE)
}

fn template_letter(appeal: &Map<String, Value>, now: DateTime<Utc>) -> String {
    let denial_date = appeal
        .get("denialDate")
        .and_then(Value::as_str)
        .and_then(parse_date)
        .unwrap_or(now)
        .format("%Y-%m-%d");

    format!(
        "Dear Claims Administrator,\n\
         \n\
         RE: Appeal for Claim #{claim_id}\n\
         Patient: {patient}\n\
         \n\
         We are formally appealing your denial of the above-referenced claim dated {denial_date}. \
         The denial reason cited was \"{reason}\".\n\
         \n\
         MEDICAL NECESSITY JUSTIFICATION:\n\
         The services provided were medically necessary and appropriate for the patient's condition, \
         and the documentation supports the procedure performed.\n\
         \n\
         SUPPORTING EVIDENCE:\n\
         1. Clinical notes demonstrate the patient's symptoms and examination findings\n\
         2. Diagnostic results support the treatment plan\n\
         3. Current medical guidelines support the chosen intervention\n\
         \n\
         We respectfully request that you reverse your denial and process payment for this claim.\n\
         \n\
         Sincerely,\n\
         Medical Billing Department",
        claim_id = text_or_empty(appeal, "claimId"),
        patient = text_or(appeal, "patientName", "On file"),
        reason = text_or_empty(appeal, "denialReason"),
    )
}
