use async_trait::async_trait;
use sqlx::PgPool;

use rcm_db::queries::appeals::{self, NewAppeal};
use rcm_db::queries::claims;
use rcm_db::queries::denials::{self, NewDenial};

/// Writes to the business side tables.
///
/// Agents treat every failure here as a warning: the business result is
/// returned regardless.
#[async_trait]
pub trait BusinessStore: Send + Sync {
    async fn record_denial(&self, denial: &NewDenial) -> anyhow::Result<()>;

    async fn record_appeal(&self, appeal: &NewAppeal) -> anyhow::Result<()>;

    /// Returns the number of claim rows updated.
    async fn record_claim_submission(
        &self,
        claim_id: &str,
        batch_id: Option<&str>,
        submission_status: &str,
    ) -> anyhow::Result<u64>;
}

const _: () = {
    fn _assert_object_safe(_: &dyn BusinessStore) {}
};

/// [`BusinessStore`] backed by the `denials`, `appeals`, and `claims`
/// tables.
#[derive(Debug, Clone)]
pub struct PgBusinessStore {
    pool: PgPool,
}

impl PgBusinessStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl BusinessStore for PgBusinessStore {
    async fn record_denial(&self, denial: &NewDenial) -> anyhow::Result<()> {
        denials::upsert_denial(&self.pool, denial).await?;
        Ok(())
    }

    async fn record_appeal(&self, appeal: &NewAppeal) -> anyhow::Result<()> {
        appeals::insert_draft_appeal(&self.pool, appeal).await?;
        Ok(())
    }

    async fn record_claim_submission(
        &self,
        claim_id: &str,
        batch_id: Option<&str>,
        submission_status: &str,
    ) -> anyhow::Result<u64> {
        claims::record_submission(&self.pool, claim_id, batch_id, submission_status).await
    }
}
