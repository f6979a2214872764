//! The reconciliation sweep.
//!
//! Webhooks are the fast path but carry no delivery guarantee; the sweep is
//! the safety net that pulls every pending purchase back toward a terminal
//! state. It runs on a schedule, re-derives status from the provider where
//! it can, and applies the escalating timeout table where it can't:
//!
//! | condition                                   | timeout | result    |
//! |---------------------------------------------|---------|-----------|
//! | no provider transaction id                  | 30 min  | CANCELLED |
//! | id recorded but never provider-confirmed    | 6 h     | CANCELLED |
//! | confirmed id, provider unreachable          | 24 h    | CANCELLED |
//! | confirmed id, provider reachable            | none    | live status |
//!
//! Individual purchase failures never abort a run; only failing to load the
//! pending set at all is fatal.

use std::time::Duration;

use chrono::Utc;

use crate::config::SweepSettings;
use crate::db::{queries, AppState, DbPool};
use crate::error::Result;
use crate::models::{Purchase, PurchaseStatus};
use crate::payments::{normalize, TransactionStatusSource};
use crate::transition;

#[derive(Debug, Clone)]
pub struct SweepPolicy {
    pub abandonment_window_secs: i64,
    pub reference_timeout_secs: i64,
    pub hard_timeout_secs: i64,
    /// Delay inserted after each provider query to stay under rate limits
    pub pacing: Duration,
}

impl From<&SweepSettings> for SweepPolicy {
    fn from(settings: &SweepSettings) -> Self {
        Self {
            abandonment_window_secs: settings.abandonment_window_secs,
            reference_timeout_secs: settings.reference_timeout_secs,
            hard_timeout_secs: settings.hard_timeout_secs,
            pacing: settings.pacing,
        }
    }
}

#[derive(Debug)]
pub struct SweepError {
    pub purchase_id: String,
    pub error: String,
}

/// Per-run accounting, logged after every sweep.
#[derive(Debug, Default)]
pub struct SweepSummary {
    pub scanned: usize,
    pub transitioned: usize,
    pub errors: Vec<SweepError>,
}

/// Run one reconciliation pass over all pending purchases, oldest first.
///
/// Propagates an error only if the pending set cannot be loaded; everything
/// after that is best-effort and accounted in the summary.
pub async fn run_sweep(
    db: &DbPool,
    source: &dyn TransactionStatusSource,
    policy: &SweepPolicy,
) -> Result<SweepSummary> {
    let conn = db.get()?;
    let pending = queries::list_purchases_by_status(&conn, PurchaseStatus::Pending)?;
    let now = Utc::now().timestamp();

    let mut summary = SweepSummary {
        scanned: pending.len(),
        ..Default::default()
    };

    for purchase in &pending {
        let queried_provider =
            purchase.provider_confirmed && purchase.provider_transaction_id.is_some();

        // The provider query is the only async step; the connection is never
        // borrowed across it (which would make the sweep future non-`Send`).
        // Decide first, then apply the transition synchronously.
        let outcome = match propose_transition(source, policy, purchase, now).await {
            Ok(Some(status)) => {
                transition::apply(&conn, purchase, status).map(|o| o.did_transition())
            }
            Ok(None) => Ok(false),
            Err(e) => Err(e),
        };

        match outcome {
            Ok(true) => summary.transitioned += 1,
            Ok(false) => {}
            Err(e) => {
                tracing::warn!("sweep: purchase {} raised: {}", purchase.id, e);
                summary.errors.push(SweepError {
                    purchase_id: purchase.id.clone(),
                    error: e.to_string(),
                });
            }
        }

        if queried_provider {
            tokio::time::sleep(policy.pacing).await;
        }
    }

    Ok(summary)
}

/// Decide the transition (if any) a single pending purchase should receive.
///
/// This is the async half of reconciling a purchase: it may query the
/// provider, but never touches the database, so the caller can apply the
/// resulting transition synchronously without holding a connection across an
/// `.await`.
async fn propose_transition(
    source: &dyn TransactionStatusSource,
    policy: &SweepPolicy,
    purchase: &Purchase,
    now: i64,
) -> Result<Option<PurchaseStatus>> {
    let age = now - purchase.created_at;

    let proposed = match (&purchase.provider_transaction_id, purchase.provider_confirmed) {
        // Checkout never reached the provider: the buyer most likely walked
        // away before paying.
        (None, _) => (age > policy.abandonment_window_secs).then_some(PurchaseStatus::Cancelled),

        // An id was recorded but the provider never confirmed it; there is
        // nothing to query, only a longer grace period.
        (Some(_), false) => {
            (age > policy.reference_timeout_secs).then_some(PurchaseStatus::Cancelled)
        }

        // Confirmed id: ask the provider what actually happened.
        (Some(transaction_id), true) => {
            match source
                .fetch_native_status(purchase.provider, transaction_id)
                .await
            {
                Ok(native) => Some(normalize(purchase.provider, &native)),
                Err(e) if e.is_retryable() => {
                    if age > policy.hard_timeout_secs {
                        tracing::warn!(
                            "sweep: purchase {} unresolvable past hard timeout ({}), cancelling",
                            purchase.id,
                            e
                        );
                        Some(PurchaseStatus::Cancelled)
                    } else {
                        tracing::debug!(
                            "sweep: purchase {} provider unreachable ({}), retrying next run",
                            purchase.id,
                            e
                        );
                        None
                    }
                }
                Err(e) => return Err(e.into()),
            }
        }
    };

    Ok(proposed)
}

/// Spawn the background sweep loop.
///
/// The loop itself is the scheduler: one run at a time, next run starts a
/// full interval after the previous one finished.
pub fn spawn_sweep_task(state: AppState, settings: &SweepSettings) {
    let policy = SweepPolicy::from(settings);
    let interval = settings.interval;

    tokio::spawn(async move {
        loop {
            tokio::time::sleep(interval).await;

            match run_sweep(&state.db, &state.providers, &policy).await {
                Ok(summary) => log_summary(&summary),
                Err(e) => {
                    tracing::error!("reconciliation sweep could not start: {}", e);
                }
            }
        }
    });

    tracing::info!(
        "Reconciliation sweep started (runs every {}s)",
        interval.as_secs()
    );
}

fn log_summary(summary: &SweepSummary) {
    if summary.transitioned > 0 || !summary.errors.is_empty() {
        tracing::info!(
            "sweep finished: scanned={} transitioned={} errors={}",
            summary.scanned,
            summary.transitioned,
            summary.errors.len()
        );
    } else {
        tracing::debug!("sweep finished: scanned={}, nothing to do", summary.scanned);
    }
    for err in &summary.errors {
        tracing::warn!("sweep error: purchase={} error={}", err.purchase_id, err.error);
    }
}
