//! Database query functions for the `denials` table.

use anyhow::{Context, Result};
use chrono::NaiveDate;
use serde_json::Value;
use sqlx::PgPool;

use crate::models::Denial;

/// Parameters for recording a denial analysis.
#[derive(Debug, Clone)]
pub struct NewDenial {
    pub claim_id: String,
    pub denial_date: Option<NaiveDate>,
    pub denial_reason_code: Option<String>,
    pub denial_reason_description: String,
    pub denial_category: String,
    pub ai_suggested_action: String,
    pub ai_prevention_tips: Value,
}

/// Insert or refresh the denial analysis for a claim.
///
/// A claim keeps a single denial row; re-analysis overwrites the category,
/// suggested action, and prevention tips.
pub async fn upsert_denial(pool: &PgPool, new: &NewDenial) -> Result<Denial> {
    let denial = sqlx::query_as::<_, Denial>(
        "INSERT INTO denials \
             (claim_id, denial_date, denial_reason_code, denial_reason_description, \
              denial_category, ai_suggested_action, ai_prevention_tips) \
         VALUES ($1, $2, $3, $4, $5, $6, $7) \
         ON CONFLICT (claim_id) DO UPDATE SET \
             denial_category = EXCLUDED.denial_category, \
             ai_suggested_action = EXCLUDED.ai_suggested_action, \
             ai_prevention_tips = EXCLUDED.ai_prevention_tips, \
             updated_at = now() \
         RETURNING *",
    )
    .bind(&new.claim_id)
    .bind(new.denial_date)
    .bind(&new.denial_reason_code)
    .bind(&new.denial_reason_description)
    .bind(&new.denial_category)
    .bind(&new.ai_suggested_action)
    .bind(&new.ai_prevention_tips)
    .fetch_one(pool)
    .await
    .with_context(|| format!("failed to upsert denial for claim {}", new.claim_id))?;

    Ok(denial)
}

/// Fetch the denial analysis for a claim.
pub async fn get_denial(pool: &PgPool, claim_id: &str) -> Result<Option<Denial>> {
    let denial = sqlx::query_as::<_, Denial>("SELECT * FROM denials WHERE claim_id = $1")
        .bind(claim_id)
        .fetch_optional(pool)
        .await
        .with_context(|| format!("failed to fetch denial for claim {claim_id}"))?;

    Ok(denial)
}
