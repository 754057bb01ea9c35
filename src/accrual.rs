// src/accrual.rs
use crate::db;
use crate::plans::{self, Accrual, InvestmentPlan};
use chrono::{DateTime, NaiveDate, Utc};
use log::{error, info, warn};
use scylla::Session;
use std::future::Future;
use std::sync::Arc;
use tokio::time::{self, Duration};

#[derive(Debug, Default, PartialEq)]
pub struct SweepReport {
    pub accrued_plans: usize,
    pub gain_days: usize,
    pub skipped: usize,
    pub failed: usize,
}

/// Accruals owed as of `today`. Inactive plans and plans already accrued
/// through `today` contribute nothing.
pub fn due(plans: &[InvestmentPlan], today: NaiveDate, now: DateTime<Utc>) -> Vec<Accrual> {
    plans
        .iter()
        .filter_map(|plan| plans::accrue(plan, today, now))
        .collect()
}

/// Records each accrual in turn. A lost compare-and-set counts as skipped and
/// a storage error as failed; neither stops the remaining plans.
async fn apply<F, Fut>(accruals: Vec<Accrual>, mut record: F) -> SweepReport
where
    F: FnMut(Accrual) -> Fut,
    Fut: Future<Output = db::DbResult<bool>>,
{
    let mut report = SweepReport::default();
    for accrual in accruals {
        let plan_id = accrual.plan.id.clone();
        let days = accrual.gains.len();
        match record(accrual).await {
            Ok(true) => {
                report.accrued_plans += 1;
                report.gain_days += days;
            }
            Ok(false) => {
                warn!("Plan {} changed during accrual, skipping", plan_id);
                report.skipped += 1;
            }
            Err(e) => {
                error!("Failed to accrue plan {}: {}", plan_id, e);
                report.failed += 1;
            }
        }
    }
    report
}

/// Brings every active plan up to `today`. Safe to run repeatedly: a plan
/// already accrued through `today` is untouched, and a plan moved by a
/// concurrent sweep or a deactivation fails its compare-and-set.
pub async fn sweep(session: &Session, today: NaiveDate) -> db::DbResult<SweepReport> {
    let plans = db::get_all_plans(session).await?;
    let report = apply(due(&plans, today, Utc::now()), |accrual| async move {
        db::record_accrual(session, &accrual.plan, &accrual.gains, accrual.previous_date).await
    })
    .await;
    Ok(report)
}

pub async fn run(session: Arc<Session>, every: Duration) {
    let mut interval = time::interval(every);
    loop {
        interval.tick().await;
        let today = Utc::now().date_naive();
        match sweep(&session, today).await {
            Ok(report) => info!(
                "Accrual sweep for {}: {} plans, {} gain days, {} skipped, {} failed",
                today, report.accrued_plans, report.gain_days, report.skipped, report.failed
            ),
            Err(e) => error!("Accrual sweep for {} failed: {}", today, e),
        }
    }
}
