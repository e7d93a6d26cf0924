//! Claim coding: suggest CPT and ICD-10 codes from chart notes.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use tracing::warn;

use crate::contract::request::{require_object, text_or};
use crate::contract::{
    AgentContract, AgentError, AgentRequest, Collaborators, DEVELOPMENT_MODEL,
};
use crate::extract;

const MAX_TOKENS: u32 = 1000;
const TEMPERATURE: f32 = 0.1;

/// One suggested code.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CodeSuggestion {
    pub code: String,
    #[serde(default)]
    pub description: String,
    /// Model confidence, 0 to 100.
    #[serde(default)]
    pub confidence: f64,
    #[serde(default)]
    pub reasoning: String,
}

impl CodeSuggestion {
    fn new(code: &str, description: &str, confidence: f64, reasoning: &str) -> Self {
        Self {
            code: code.to_string(),
            description: description.to_string(),
            confidence,
            reasoning: reasoning.to_string(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CodingResult {
    pub cpt_codes: Vec<CodeSuggestion>,
    pub icd_codes: Vec<CodeSuggestion>,
    /// Set when the model output was unusable or suggested nothing.
    pub requires_manual_review: bool,
    pub development_mode: bool,
    pub model_used: String,
}

#[derive(Debug, Clone, Copy, Default)]
pub struct CodingAgent;

#[async_trait]
impl AgentContract for CodingAgent {
    type Output = CodingResult;

    fn name(&self) -> &str {
        "coding"
    }

    fn validate(&self, request: &AgentRequest) -> Option<String> {
        if let Err(message) = require_object(request, "patientData") {
            return Some(message);
        }
        if let Err(message) = require_object(request, "encounterData") {
            return Some(message);
        }
        match request.get("chartNotes") {
            Some(Value::String(notes)) if !notes.trim().is_empty() => None,
            Some(Value::String(_)) | None | Some(Value::Null) => {
                Some("Missing required field: chartNotes".to_string())
            }
            Some(_) => Some("Field chartNotes must be a string".to_string()),
        }
    }

    async fn execute_production(
        &self,
        request: &AgentRequest,
        collaborators: &Collaborators,
    ) -> Result<CodingResult, AgentError> {
        let prompt = build_prompt(request);
        let text = collaborators
            .inference
            .generate(&prompt, MAX_TOKENS, TEMPERATURE)
            .await?;
        let model_used = collaborators.inference.model_id().to_string();

        let result = match extract::extract_object(&text) {
            Ok(map) => {
                let cpt_codes = suggestions(&map, "cpt_codes");
                let icd_codes = suggestions(&map, "icd_codes");
                let requires_manual_review = cpt_codes.is_empty() && icd_codes.is_empty();
                CodingResult {
                    cpt_codes,
                    icd_codes,
                    requires_manual_review,
                    development_mode: false,
                    model_used,
                }
            }
            Err(e) => {
                warn!(error = %e, "coding output unusable, flagging for manual review");
                CodingResult {
                    cpt_codes: Vec::new(),
                    icd_codes: Vec::new(),
                    requires_manual_review: true,
                    development_mode: false,
                    model_used,
                }
            }
        };
        Ok(result)
    }

    fn execute_development(&self, _request: &AgentRequest) -> Result<CodingResult, AgentError> {
        Ok(CodingResult {
            cpt_codes: vec![
                CodeSuggestion::new(
                    "99213",
                    "Office or other outpatient visit for evaluation and management",
                    95.0,
                    "Standard office visit with moderate complexity",
                ),
                CodeSuggestion::new(
                    "36415",
                    "Collection of venous blood by venipuncture",
                    88.0,
                    "Blood draw for laboratory tests",
                ),
            ],
            icd_codes: vec![CodeSuggestion::new(
                "Z00.00",
                "Encounter for general adult medical examination without abnormal findings",
                92.0,
                "Routine preventive care visit",
            )],
            requires_manual_review: false,
            development_mode: true,
            model_used: DEVELOPMENT_MODEL.to_string(),
        })
    }
}

fn build_prompt(request: &AgentRequest) -> String {
    let empty = Map::new();
    let patient = request.object("patientData").unwrap_or(&empty);
    let encounter = request.object("encounterData").unwrap_or(&empty);
    let notes = request.text("chartNotes").unwrap_or_default();
    let na = "Not provided";

    format!(
        "You are an expert medical coder. Suggest CPT and ICD-10 codes for the encounter below.\n\
         \n\
         PATIENT\n\
         Age: {age}\n\
         Gender: {gender}\n\
         \n\
         ENCOUNTER\n\
         Chief complaint: {complaint}\n\
         Visit type: {visit}\n\
         Date of service: {dos}\n\
         Provider: {provider}\n\
         \n\
         CLINICAL NOTES\n\
         {notes}\n\
         \n\
         For each code give a confidence from 0 to 100 and one sentence of reasoning.\n\
         Respond with JSON only:\n\
         {{\"cpt_codes\": [{{\"code\": \"\", \"description\": \"\", \"confidence\": 0, \"reasoning\": \"\"}}],\n\
          \"icd_codes\": [{{\"code\": \"\", \"description\": \"\", \"confidence\": 0, \"reasoning\": \"\"}}]}}",
        age = text_or(patient, "age", na),
        gender = text_or(patient, "gender", na),
        complaint = text_or(encounter, "chief_complaint", na),
        visit = text_or(encounter, "visit_type", na),
        dos = text_or(encounter, "date_of_service", na),
        provider = text_or(encounter, "provider", na),
    )
}

/// Entries of `key` that deserialize as suggestions with a non-empty
/// code. Anything else is dropped.
fn suggestions(map: &Map<String, Value>, key: &str) -> Vec<CodeSuggestion> {
    map.get(key)
        .and_then(Value::as_array)
        .map(|items| {
            items
                .iter()
                .filter_map(|item| serde_json::from_value::<CodeSuggestion>(item.clone()).ok())
                .filter(|s| !s.code.trim().is_empty())
                .collect()
        })
        .unwrap_or_default()
}
