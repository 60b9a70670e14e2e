//! Deadline sweeper.
//!
//! Periodically revokes rejectability from active placements whose window
//! plus grace has lapsed. Uses the same cutoff as the rejection check, so a
//! placement is never made permanent while a rejection would still be
//! accepted. Purely a flag flip: no money moves, no ledger entries.

use crate::db::Repository;
use crate::domain::TimeMs;
use crate::engine::rejection::RejectionPolicy;
use crate::error::SettlementError;
use crate::orchestration::txn::run_unit_of_work;
use std::sync::Arc;
use std::time::Duration;
use tracing::{error, info};

/// Placements processed per sweep pass; the next pass picks up the rest.
const SWEEP_BATCH: i64 = 500;

pub struct DeadlineSweeper {
    repo: Arc<Repository>,
    policy: RejectionPolicy,
    interval: Duration,
    txn_budget_ms: i64,
}

impl DeadlineSweeper {
    pub fn new(
        repo: Arc<Repository>,
        policy: RejectionPolicy,
        sweep_interval_ms: i64,
        txn_budget_ms: i64,
    ) -> Self {
        Self {
            repo,
            policy,
            interval: Duration::from_millis(sweep_interval_ms.max(0) as u64),
            txn_budget_ms,
        }
    }

    /// Run the sweep loop forever. Spawn this on its own task.
    pub async fn run(self) {
        let mut ticker = tokio::time::interval(self.interval);
        ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
        loop {
            ticker.tick().await;
            match self.sweep_once().await {
                Ok(0) => {}
                Ok(swept) => info!(swept, "rejection deadlines swept"),
                Err(err) => error!(error = %err, "deadline sweep failed"),
            }
        }
    }

    /// One sweep pass at the current time.
    pub async fn sweep_once(&self) -> Result<usize, SettlementError> {
        self.sweep_once_at(TimeMs::now()).await
    }

    /// One sweep pass at an explicit time.
    pub async fn sweep_once_at(&self, now: TimeMs) -> Result<usize, SettlementError> {
        let repo = self.repo.clone();
        let grace_ms = self.policy.grace_ms();

        run_unit_of_work(
            self.repo.pool(),
            self.txn_budget_ms,
            "sweep_deadlines",
            move |conn| {
                let repo = repo.clone();
                Box::pin(async move {
                    let expired = repo
                        .expired_rejectable_placements(conn, grace_ms, now, SWEEP_BATCH)
                        .await?;
                    for placement in &expired {
                        repo.clear_rejectable(conn, placement.id).await?;
                    }
                    Ok(expired.len())
                })
            },
        )
        .await
    }
}

impl std::fmt::Debug for DeadlineSweeper {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DeadlineSweeper")
            .field("policy", &self.policy)
            .field("interval", &self.interval)
            .finish_non_exhaustive()
    }
}
