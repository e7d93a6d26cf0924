//! Database query functions for the `claims` table.

use anyhow::{Context, Result};
use sqlx::PgPool;

use crate::models::Claim;

/// Insert a claim row in `draft` status. Claims normally arrive from the
/// billing system; this exists for seeding and tests.
pub async fn insert_claim(pool: &PgPool, claim_id: &str) -> Result<Claim> {
    let claim = sqlx::query_as::<_, Claim>(
        "INSERT INTO claims (claim_id) VALUES ($1) RETURNING *",
    )
    .bind(claim_id)
    .fetch_one(pool)
    .await
    .with_context(|| format!("failed to insert claim {claim_id}"))?;

    Ok(claim)
}

/// Fetch a claim by its ID.
pub async fn get_claim(pool: &PgPool, claim_id: &str) -> Result<Option<Claim>> {
    let claim = sqlx::query_as::<_, Claim>("SELECT * FROM claims WHERE claim_id = $1")
        .bind(claim_id)
        .fetch_optional(pool)
        .await
        .with_context(|| format!("failed to fetch claim {claim_id}"))?;

    Ok(claim)
}

/// Record a clearinghouse submission on a claim.
///
/// The claim status becomes `rejected` when the clearinghouse rejected
/// the submission and `submitted` otherwise. Returns the number of rows
/// updated (`0` when the claim is unknown).
pub async fn record_submission(
    pool: &PgPool,
    claim_id: &str,
    batch_id: Option<&str>,
    submission_status: &str,
) -> Result<u64> {
    let result = sqlx::query(
        "UPDATE claims \
         SET claimmd_batch_id = $2, \
             claimmd_status = $3, \
             claimmd_submission_date = now(), \
             status = CASE WHEN $3 = 'rejected' THEN 'rejected' ELSE 'submitted' END, \
             updated_at = now() \
         WHERE claim_id = $1",
    )
    .bind(claim_id)
    .bind(batch_id)
    .bind(submission_status)
    .execute(pool)
    .await
    .with_context(|| format!("failed to record submission for claim {claim_id}"))?;

    Ok(result.rows_affected())
}
