//! Database query functions for the `appeals` table.

use anyhow::{Context, Result};
use sqlx::PgPool;

use crate::models::Appeal;

/// Parameters for inserting a draft appeal.
#[derive(Debug, Clone)]
pub struct NewAppeal {
    pub appeal_id: String,
    pub claim_id: String,
    pub appeal_level: i32,
    pub appeal_letter: String,
    pub ai_confidence_score: Option<f64>,
}

/// Insert a generated appeal letter in `draft` status.
pub async fn insert_draft_appeal(pool: &PgPool, new: &NewAppeal) -> Result<Appeal> {
    let appeal = sqlx::query_as::<_, Appeal>(
        "INSERT INTO appeals \
             (appeal_id, claim_id, appeal_level, appeal_letter, status, \
              ai_generated_letter, ai_confidence_score) \
         VALUES ($1, $2, $3, $4, 'draft', TRUE, $5) \
         RETURNING *",
    )
    .bind(&new.appeal_id)
    .bind(&new.claim_id)
    .bind(new.appeal_level)
    .bind(&new.appeal_letter)
    .bind(new.ai_confidence_score)
    .fetch_one(pool)
    .await
    .with_context(|| {
        format!(
            "failed to insert appeal {} for claim {}",
            new.appeal_id, new.claim_id
        )
    })?;

    Ok(appeal)
}

/// List every appeal drafted for a claim, oldest first.
pub async fn list_appeals_for_claim(pool: &PgPool, claim_id: &str) -> Result<Vec<Appeal>> {
    let appeals = sqlx::query_as::<_, Appeal>(
        "SELECT * FROM appeals WHERE claim_id = $1 ORDER BY created_at ASC",
    )
    .bind(claim_id)
    .fetch_all(pool)
    .await
    .with_context(|| format!("failed to list appeals for claim {claim_id}"))?;

    Ok(appeals)
}
