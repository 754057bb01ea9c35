// src/plans.rs
use chrono::{DateTime, Duration, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum PlanType {
    #[serde(rename = "2000")]
    Starter,
    #[serde(rename = "5000")]
    Growth,
    #[serde(rename = "10000")]
    Premium,
    #[serde(rename = "20000")]
    Elite,
}

impl PlanType {
    pub const ALL: [PlanType; 4] = [
        PlanType::Starter,
        PlanType::Growth,
        PlanType::Premium,
        PlanType::Elite,
    ];

    pub fn code(&self) -> &'static str {
        match self {
            PlanType::Starter => "2000",
            PlanType::Growth => "5000",
            PlanType::Premium => "10000",
            PlanType::Elite => "20000",
        }
    }

    pub fn parse(code: &str) -> Option<PlanType> {
        PlanType::ALL.into_iter().find(|t| t.code() == code)
    }

    /// Amount added to the balance per elapsed day, independent of balance.
    pub fn daily_increment(&self) -> f64 {
        match self {
            PlanType::Starter => 60.0,
            PlanType::Growth => 160.0,
            PlanType::Premium => 330.0,
            PlanType::Elite => 660.0,
        }
    }

    pub fn minimum_amount(&self) -> f64 {
        match self {
            PlanType::Starter => 2000.0,
            PlanType::Growth => 5000.0,
            PlanType::Premium => 10000.0,
            PlanType::Elite => 20000.0,
        }
    }

    pub fn title(&self) -> &'static str {
        match self {
            PlanType::Starter => "Starter Plan",
            PlanType::Growth => "Growth Plan",
            PlanType::Premium => "Premium Plan",
            PlanType::Elite => "Elite Plan",
        }
    }

    fn description(&self) -> &'static str {
        match self {
            PlanType::Starter => "Perfect for beginners looking to start their investment journey",
            PlanType::Growth => "Ideal for investors seeking steady growth",
            PlanType::Premium => "For serious investors wanting higher returns",
            PlanType::Elite => "Maximum returns for high-value investors",
        }
    }
}

#[derive(Debug, PartialEq)]
pub enum PlanError {
    InvalidAmount(f64),
    BelowMinimum { plan_type: PlanType, amount: f64 },
    AlreadyInactive,
}

impl fmt::Display for PlanError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PlanError::InvalidAmount(amount) => write!(f, "Invalid plan amount: {}", amount),
            PlanError::BelowMinimum { plan_type, amount } => write!(
                f,
                "{} requires at least {}, got {}",
                plan_type.title(),
                plan_type.minimum_amount(),
                amount
            ),
            PlanError::AlreadyInactive => write!(f, "Plan is already inactive"),
        }
    }
}

impl std::error::Error for PlanError {}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct InvestmentPlan {
    pub id: String,
    pub user_id: String,
    pub plan_type: PlanType,
    pub initial_amount: f64,
    pub daily_increment: f64,
    pub current_balance: f64,
    pub total_gained: f64,
    pub start_date: NaiveDate,
    pub last_increment_date: Option<NaiveDate>,
    pub is_active: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl InvestmentPlan {
    /// Opens a plan. Without an explicit amount the tier minimum is invested.
    pub fn open(
        user_id: &str,
        plan_type: PlanType,
        amount: Option<f64>,
        now: DateTime<Utc>,
    ) -> Result<InvestmentPlan, PlanError> {
        let initial_amount = amount.unwrap_or_else(|| plan_type.minimum_amount());
        if !initial_amount.is_finite() || initial_amount <= 0.0 {
            return Err(PlanError::InvalidAmount(initial_amount));
        }
        if initial_amount < plan_type.minimum_amount() {
            return Err(PlanError::BelowMinimum {
                plan_type,
                amount: initial_amount,
            });
        }
        let today = now.date_naive();
        Ok(InvestmentPlan {
            id: Uuid::new_v4().to_string(),
            user_id: user_id.to_string(),
            plan_type,
            initial_amount,
            daily_increment: plan_type.daily_increment(),
            current_balance: initial_amount,
            total_gained: 0.0,
            start_date: today,
            last_increment_date: Some(today),
            is_active: true,
            created_at: now,
            updated_at: now,
        })
    }

    pub fn deactivate(&mut self, now: DateTime<Utc>) -> Result<(), PlanError> {
        if !self.is_active {
            return Err(PlanError::AlreadyInactive);
        }
        self.is_active = false;
        self.updated_at = now;
        Ok(())
    }

    pub fn progress_percent(&self) -> f64 {
        if self.initial_amount > 0.0 {
            self.total_gained / self.initial_amount * 100.0
        } else {
            0.0
        }
    }

    pub fn days_active(&self, today: NaiveDate) -> i64 {
        (today - self.start_date).num_days().max(0)
    }

    /// Last calendar date whose gain is already reflected in the balance.
    pub fn accrued_through(&self) -> NaiveDate {
        self.last_increment_date.unwrap_or(self.start_date)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize)]
pub struct PlanTotals {
    pub total_balance: f64,
    pub total_gained: f64,
    pub daily_rate: f64,
}

pub fn active_totals(plans: &[InvestmentPlan]) -> PlanTotals {
    plans
        .iter()
        .filter(|p| p.is_active)
        .fold(PlanTotals::default(), |acc, p| PlanTotals {
            total_balance: acc.total_balance + p.current_balance,
            total_gained: acc.total_gained + p.total_gained,
            daily_rate: acc.daily_rate + p.daily_increment,
        })
}

/// Daily gain scaled for an amount above the tier minimum.
pub fn estimated_daily_gain(plan_type: PlanType, amount: f64) -> f64 {
    amount / plan_type.minimum_amount() * plan_type.daily_increment()
}

pub fn annual_return_percent(plan_type: PlanType) -> f64 {
    plan_type.daily_increment() * 365.0 / plan_type.minimum_amount() * 100.0
}

#[derive(Debug, Serialize)]
pub struct PlanOption {
    pub plan_type: PlanType,
    pub amount: f64,
    pub daily_gain: f64,
    pub title: &'static str,
    pub description: &'static str,
    pub popular: bool,
    pub annual_return_percent: f64,
}

pub fn plan_options() -> Vec<PlanOption> {
    PlanType::ALL
        .into_iter()
        .map(|t| PlanOption {
            plan_type: t,
            amount: t.minimum_amount(),
            daily_gain: t.daily_increment(),
            title: t.title(),
            description: t.description(),
            popular: t == PlanType::Growth,
            annual_return_percent: annual_return_percent(t),
        })
        .collect()
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DailyGain {
    pub id: String,
    pub user_id: String,
    pub investment_plan_id: String,
    pub gain_amount: f64,
    pub balance_before: f64,
    pub balance_after: f64,
    pub gain_date: NaiveDate,
    pub created_at: DateTime<Utc>,
}

impl DailyGain {
    /// Gains are keyed by plan and date, so the id is derived from both.
    pub fn key(plan_id: &str, date: NaiveDate) -> String {
        format!("{}:{}", plan_id, date)
    }
}

#[derive(Debug)]
pub struct Accrual {
    pub plan: InvestmentPlan,
    pub gains: Vec<DailyGain>,
    /// The `last_increment_date` the plan had before this accrual.
    pub previous_date: NaiveDate,
}

/// Applies one increment for each calendar date after the plan's last
/// accrued date, up to and including `today`.
///
/// Returns `None` for inactive plans and plans already accrued through
/// `today`, so repeated sweeps on the same day are no-ops.
pub fn accrue(plan: &InvestmentPlan, today: NaiveDate, now: DateTime<Utc>) -> Option<Accrual> {
    if !plan.is_active {
        return None;
    }
    let previous_date = plan.accrued_through();
    if previous_date >= today {
        return None;
    }

    let mut updated = plan.clone();
    let mut gains = Vec::new();
    let mut date = previous_date;
    while date < today {
        date += Duration::days(1);
        let balance_before = updated.current_balance;
        updated.total_gained += updated.daily_increment;
        updated.current_balance = updated.initial_amount + updated.total_gained;
        gains.push(DailyGain {
            id: DailyGain::key(&plan.id, date),
            user_id: plan.user_id.clone(),
            investment_plan_id: plan.id.clone(),
            gain_amount: updated.daily_increment,
            balance_before,
            balance_after: updated.current_balance,
            gain_date: date,
            created_at: now,
        });
    }
    updated.last_increment_date = Some(today);
    updated.updated_at = now;

    Some(Accrual {
        plan: updated,
        gains,
        previous_date,
    })
}
