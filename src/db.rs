// src/db.rs
use crate::models::{Holding, Portfolio, Theme, UserProfile, UserSettings};
use crate::plans::{DailyGain, InvestmentPlan, PlanType};
use crate::trading::Order;
use crate::watchlist::Watchlist;
use chrono::{DateTime, NaiveDate, Utc};
use log::{debug, error, info};
use scylla::frame::response::result::{CqlValue, Row};
use scylla::{query::Query, Session, SessionBuilder};

pub type DbResult<T> = Result<T, Box<dyn std::error::Error + Send + Sync>>;

pub struct Account {
    pub login_id: String,
    pub user_id: String,
    pub password_hash: String,
}

/// One row per plan per day, newest first within a user's partition.
const DAILY_GAINS_TABLE: &str = "CREATE TABLE IF NOT EXISTS trade_pro.daily_gains (user_id TEXT, gain_date TEXT, investment_plan_id TEXT, gain_amount DOUBLE, balance_before DOUBLE, balance_after DOUBLE, created_at TIMESTAMP, PRIMARY KEY (user_id, gain_date, investment_plan_id)) WITH CLUSTERING ORDER BY (gain_date DESC, investment_plan_id ASC)";

pub async fn init(node: &str) -> DbResult<Session> {
    let session = SessionBuilder::new().known_node(node).build().await?;

    session.query("CREATE KEYSPACE IF NOT EXISTS trade_pro WITH REPLICATION = {'class': 'SimpleStrategy', 'replication_factor': 1}", &[]).await?;
    session.query("CREATE TABLE IF NOT EXISTS trade_pro.accounts (login_id TEXT PRIMARY KEY, user_id TEXT, password_hash TEXT)", &[]).await?;
    session.query("CREATE TABLE IF NOT EXISTS trade_pro.user_profiles (id TEXT PRIMARY KEY, full_name TEXT, contact_number TEXT, avatar_url TEXT, email TEXT, created_at TIMESTAMP, updated_at TIMESTAMP)", &[]).await?;
    session.query("CREATE TABLE IF NOT EXISTS trade_pro.user_settings (user_id TEXT PRIMARY KEY, theme TEXT, language TEXT, currency TEXT, notifications_enabled BOOLEAN, email_notifications BOOLEAN, sms_notifications BOOLEAN, two_factor_enabled BOOLEAN, created_at TIMESTAMP, updated_at TIMESTAMP)", &[]).await?;
    session.query("CREATE TABLE IF NOT EXISTS trade_pro.portfolios (user_id TEXT PRIMARY KEY, holdings TEXT)", &[]).await?;
    session.query("CREATE TABLE IF NOT EXISTS trade_pro.investment_plans (user_id TEXT, id TEXT, plan_type TEXT, initial_amount DOUBLE, daily_increment DOUBLE, current_balance DOUBLE, total_gained DOUBLE, start_date TEXT, last_increment_date TEXT, is_active BOOLEAN, created_at TIMESTAMP, updated_at TIMESTAMP, PRIMARY KEY (user_id, id))", &[]).await?;
    session.query(DAILY_GAINS_TABLE, &[]).await?;
    session.query("CREATE TABLE IF NOT EXISTS trade_pro.orders (user_id TEXT, id TEXT, doc TEXT, PRIMARY KEY (user_id, id))", &[]).await?;
    session.query("CREATE TABLE IF NOT EXISTS trade_pro.watchlists (user_id TEXT PRIMARY KEY, items TEXT)", &[]).await?;

    info!("Successfully connected to ScyllaDB at {}.", node);
    Ok(session)
}

fn missing(column: &str) -> Box<dyn std::error::Error + Send + Sync> {
    format!("Missing or mistyped column: {}", column).into()
}

fn text(row: &Row, idx: usize) -> Option<String> {
    match row.columns.get(idx)?.as_ref()? {
        CqlValue::Text(s) | CqlValue::Ascii(s) => Some(s.clone()),
        _ => None,
    }
}

fn double(row: &Row, idx: usize) -> Option<f64> {
    match row.columns.get(idx)?.as_ref()? {
        CqlValue::Double(v) => Some(*v),
        _ => None,
    }
}

fn boolean(row: &Row, idx: usize) -> Option<bool> {
    match row.columns.get(idx)?.as_ref()? {
        CqlValue::Boolean(v) => Some(*v),
        _ => None,
    }
}

fn timestamp(row: &Row, idx: usize) -> Option<DateTime<Utc>> {
    match row.columns.get(idx)?.as_ref()? {
        CqlValue::Timestamp(ts) => DateTime::<Utc>::from_timestamp_millis(ts.num_milliseconds()),
        _ => None,
    }
}

fn date(row: &Row, idx: usize) -> Option<NaiveDate> {
    text(row, idx).and_then(|s| s.parse().ok())
}

fn first_row(rows: Option<Vec<Row>>) -> Option<Row> {
    rows.and_then(|rows| rows.into_iter().next())
}

/// Result of a lightweight transaction: the `[applied]` column.
fn applied(rows: Option<Vec<Row>>) -> bool {
    first_row(rows)
        .and_then(|row| boolean(&row, 0))
        .unwrap_or(false)
}

// Accounts

/// Creates the account unless the login id is taken. Returns whether it was created.
pub async fn create_account(session: &Session, account: &Account) -> DbResult<bool> {
    let query = Query::new(
        "INSERT INTO trade_pro.accounts (login_id, user_id, password_hash) VALUES (?, ?, ?) IF NOT EXISTS",
    );
    let result = session
        .query(
            query,
            (
                account.login_id.as_str(),
                account.user_id.as_str(),
                account.password_hash.as_str(),
            ),
        )
        .await?;
    Ok(applied(result.rows))
}

pub async fn get_account(session: &Session, login_id: &str) -> DbResult<Option<Account>> {
    let query = Query::new(
        "SELECT login_id, user_id, password_hash FROM trade_pro.accounts WHERE login_id = ?",
    );
    let result = session.query(query, (login_id,)).await?;
    match first_row(result.rows) {
        Some(row) => Ok(Some(Account {
            login_id: text(&row, 0).ok_or_else(|| missing("login_id"))?,
            user_id: text(&row, 1).ok_or_else(|| missing("user_id"))?,
            password_hash: text(&row, 2).ok_or_else(|| missing("password_hash"))?,
        })),
        None => Ok(None),
    }
}

// Profiles and settings

pub async fn put_profile(session: &Session, profile: &UserProfile) -> DbResult<()> {
    let query = Query::new("INSERT INTO trade_pro.user_profiles (id, full_name, contact_number, avatar_url, email, created_at, updated_at) VALUES (?, ?, ?, ?, ?, ?, ?)");
    session
        .query(
            query,
            (
                profile.id.as_str(),
                profile.full_name.clone(),
                profile.contact_number.clone(),
                profile.avatar_url.clone(),
                profile.email.clone(),
                profile.created_at.timestamp_millis(),
                profile.updated_at.timestamp_millis(),
            ),
        )
        .await?;
    Ok(())
}

pub async fn get_profile(session: &Session, user_id: &str) -> DbResult<Option<UserProfile>> {
    let query = Query::new("SELECT id, full_name, contact_number, avatar_url, email, created_at, updated_at FROM trade_pro.user_profiles WHERE id = ?");
    let result = session.query(query, (user_id,)).await?;
    match first_row(result.rows) {
        Some(row) => Ok(Some(UserProfile {
            id: text(&row, 0).ok_or_else(|| missing("id"))?,
            full_name: text(&row, 1),
            contact_number: text(&row, 2),
            avatar_url: text(&row, 3),
            email: text(&row, 4),
            created_at: timestamp(&row, 5).ok_or_else(|| missing("created_at"))?,
            updated_at: timestamp(&row, 6).ok_or_else(|| missing("updated_at"))?,
        })),
        None => Ok(None),
    }
}

pub async fn put_settings(session: &Session, settings: &UserSettings) -> DbResult<()> {
    let query = Query::new("INSERT INTO trade_pro.user_settings (user_id, theme, language, currency, notifications_enabled, email_notifications, sms_notifications, two_factor_enabled, created_at, updated_at) VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?)");
    session
        .query(
            query,
            (
                settings.user_id.as_str(),
                settings.theme.as_str(),
                settings.language.as_str(),
                settings.currency.as_str(),
                settings.notifications_enabled,
                settings.email_notifications,
                settings.sms_notifications,
                settings.two_factor_enabled,
                settings.created_at.timestamp_millis(),
                settings.updated_at.timestamp_millis(),
            ),
        )
        .await?;
    Ok(())
}

pub async fn get_settings(session: &Session, user_id: &str) -> DbResult<Option<UserSettings>> {
    let query = Query::new("SELECT user_id, theme, language, currency, notifications_enabled, email_notifications, sms_notifications, two_factor_enabled, created_at, updated_at FROM trade_pro.user_settings WHERE user_id = ?");
    let result = session.query(query, (user_id,)).await?;
    match first_row(result.rows) {
        Some(row) => Ok(Some(UserSettings {
            user_id: text(&row, 0).ok_or_else(|| missing("user_id"))?,
            theme: text(&row, 1)
                .and_then(|t| Theme::parse(&t))
                .ok_or_else(|| missing("theme"))?,
            language: text(&row, 2).ok_or_else(|| missing("language"))?,
            currency: text(&row, 3).ok_or_else(|| missing("currency"))?,
            notifications_enabled: boolean(&row, 4).unwrap_or(true),
            email_notifications: boolean(&row, 5).unwrap_or(true),
            sms_notifications: boolean(&row, 6).unwrap_or(false),
            two_factor_enabled: boolean(&row, 7).unwrap_or(false),
            created_at: timestamp(&row, 8).ok_or_else(|| missing("created_at"))?,
            updated_at: timestamp(&row, 9).ok_or_else(|| missing("updated_at"))?,
        })),
        None => Ok(None),
    }
}

// Portfolios, stored as one JSON document per user and replaced wholesale.

pub async fn put_portfolio(session: &Session, portfolio: &Portfolio) -> DbResult<()> {
    let holdings_json = serde_json::to_string(&portfolio.holdings)?;
    let query = Query::new("INSERT INTO trade_pro.portfolios (user_id, holdings) VALUES (?, ?)");
    session
        .query(query, (portfolio.user_id.as_str(), holdings_json))
        .await?;
    Ok(())
}

pub async fn get_portfolio(session: &Session, user_id: &str) -> DbResult<Portfolio> {
    let query = Query::new("SELECT holdings FROM trade_pro.portfolios WHERE user_id = ?");
    let result = session.query(query, (user_id,)).await?;
    let holdings: Vec<Holding> = match first_row(result.rows).and_then(|row| text(&row, 0)) {
        Some(json) => serde_json::from_str(&json)?,
        None => Vec::new(),
    };
    Ok(Portfolio {
        user_id: user_id.to_string(),
        holdings,
    })
}

// Investment plans

const PLAN_COLUMNS: &str = "user_id, id, plan_type, initial_amount, daily_increment, current_balance, total_gained, start_date, last_increment_date, is_active, created_at, updated_at";

fn plan_from_row(row: &Row) -> DbResult<InvestmentPlan> {
    let plan_type = text(row, 2).ok_or_else(|| missing("plan_type"))?;
    Ok(InvestmentPlan {
        user_id: text(row, 0).ok_or_else(|| missing("user_id"))?,
        id: text(row, 1).ok_or_else(|| missing("id"))?,
        plan_type: PlanType::parse(&plan_type)
            .ok_or_else(|| format!("Unknown plan type in storage: {}", plan_type))?,
        initial_amount: double(row, 3).ok_or_else(|| missing("initial_amount"))?,
        daily_increment: double(row, 4).ok_or_else(|| missing("daily_increment"))?,
        current_balance: double(row, 5).ok_or_else(|| missing("current_balance"))?,
        total_gained: double(row, 6).ok_or_else(|| missing("total_gained"))?,
        start_date: date(row, 7).ok_or_else(|| missing("start_date"))?,
        last_increment_date: date(row, 8),
        is_active: boolean(row, 9).unwrap_or(false),
        created_at: timestamp(row, 10).ok_or_else(|| missing("created_at"))?,
        updated_at: timestamp(row, 11).ok_or_else(|| missing("updated_at"))?,
    })
}

fn plans_from_rows(rows: Option<Vec<Row>>) -> Vec<InvestmentPlan> {
    rows.unwrap_or_default()
        .iter()
        .filter_map(|row| match plan_from_row(row) {
            Ok(plan) => Some(plan),
            Err(e) => {
                error!("Skipping unreadable plan row: {}", e);
                None
            }
        })
        .collect()
}

/// Inserts a newly opened plan. Later changes go through the conditional
/// updates below so they never overwrite each other.
pub async fn put_plan(session: &Session, plan: &InvestmentPlan) -> DbResult<()> {
    let query = Query::new(format!(
        "INSERT INTO trade_pro.investment_plans ({}) VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)",
        PLAN_COLUMNS
    ));
    session
        .query(
            query,
            (
                plan.user_id.as_str(),
                plan.id.as_str(),
                plan.plan_type.code(),
                plan.initial_amount,
                plan.daily_increment,
                plan.current_balance,
                plan.total_gained,
                plan.start_date.to_string(),
                plan.last_increment_date.map(|d| d.to_string()),
                plan.is_active,
                plan.created_at.timestamp_millis(),
                plan.updated_at.timestamp_millis(),
            ),
        )
        .await?;
    Ok(())
}

/// A user's plans, newest first.
pub async fn get_user_plans(session: &Session, user_id: &str) -> DbResult<Vec<InvestmentPlan>> {
    let query = Query::new(format!(
        "SELECT {} FROM trade_pro.investment_plans WHERE user_id = ?",
        PLAN_COLUMNS
    ));
    let result = session.query(query, (user_id,)).await?;
    let mut plans = plans_from_rows(result.rows);
    plans.sort_by(|a, b| b.created_at.cmp(&a.created_at));
    Ok(plans)
}

pub async fn get_plan(
    session: &Session,
    user_id: &str,
    plan_id: &str,
) -> DbResult<Option<InvestmentPlan>> {
    let query = Query::new(format!(
        "SELECT {} FROM trade_pro.investment_plans WHERE user_id = ? AND id = ?",
        PLAN_COLUMNS
    ));
    let result = session.query(query, (user_id, plan_id)).await?;
    match first_row(result.rows) {
        Some(row) => Ok(Some(plan_from_row(&row)?)),
        None => Ok(None),
    }
}

const DEACTIVATE_PLAN: &str = "UPDATE trade_pro.investment_plans SET is_active = false, updated_at = ? WHERE user_id = ? AND id = ? IF is_active = true";

/// Flips an active plan to inactive, leaving its balances alone. Returns
/// false when the plan is missing or already inactive.
pub async fn deactivate_plan(
    session: &Session,
    user_id: &str,
    plan_id: &str,
    now: DateTime<Utc>,
) -> DbResult<bool> {
    let result = session
        .query(
            Query::new(DEACTIVATE_PLAN),
            (now.timestamp_millis(), user_id, plan_id),
        )
        .await?;
    Ok(applied(result.rows))
}

pub async fn get_all_plans(session: &Session) -> DbResult<Vec<InvestmentPlan>> {
    let query = Query::new(format!(
        "SELECT {} FROM trade_pro.investment_plans",
        PLAN_COLUMNS
    ));
    let result = session.query(query, &[]).await?;
    Ok(plans_from_rows(result.rows))
}

/// Writes an accrual: the gain rows first (upserts keyed by user, date and
/// plan), then the plan balance as a compare-and-set on the date it was last
/// accrued through. Returns false when another sweep already moved the plan.
pub async fn record_accrual(
    session: &Session,
    plan: &InvestmentPlan,
    gains: &[DailyGain],
    previous_date: NaiveDate,
) -> DbResult<bool> {
    let insert = Query::new("INSERT INTO trade_pro.daily_gains (user_id, gain_date, investment_plan_id, gain_amount, balance_before, balance_after, created_at) VALUES (?, ?, ?, ?, ?, ?, ?)");
    for gain in gains {
        session
            .query(
                insert.clone(),
                (
                    gain.user_id.as_str(),
                    gain.gain_date.to_string(),
                    gain.investment_plan_id.as_str(),
                    gain.gain_amount,
                    gain.balance_before,
                    gain.balance_after,
                    gain.created_at.timestamp_millis(),
                ),
            )
            .await?;
    }

    let update = Query::new("UPDATE trade_pro.investment_plans SET current_balance = ?, total_gained = ?, last_increment_date = ?, updated_at = ? WHERE user_id = ? AND id = ? IF last_increment_date = ? AND is_active = true");
    let result = session
        .query(
            update,
            (
                plan.current_balance,
                plan.total_gained,
                plan.last_increment_date.map(|d| d.to_string()),
                plan.updated_at.timestamp_millis(),
                plan.user_id.as_str(),
                plan.id.as_str(),
                previous_date.to_string(),
            ),
        )
        .await?;
    let applied = applied(result.rows);
    debug!(
        "Accrual of {} day(s) for plan {} applied: {}",
        gains.len(),
        plan.id,
        applied
    );
    Ok(applied)
}

pub async fn get_daily_gains(
    session: &Session,
    user_id: &str,
    limit: i32,
) -> DbResult<Vec<DailyGain>> {
    let query = Query::new("SELECT user_id, gain_date, investment_plan_id, gain_amount, balance_before, balance_after, created_at FROM trade_pro.daily_gains WHERE user_id = ? LIMIT ?");
    let result = session.query(query, (user_id, limit)).await?;
    let gains = result
        .rows
        .unwrap_or_default()
        .iter()
        .filter_map(|row| {
            let plan_id = text(row, 2)?;
            let gain_date = date(row, 1)?;
            Some(DailyGain {
                id: DailyGain::key(&plan_id, gain_date),
                user_id: text(row, 0)?,
                investment_plan_id: plan_id,
                gain_amount: double(row, 3)?,
                balance_before: double(row, 4)?,
                balance_after: double(row, 5)?,
                gain_date,
                created_at: timestamp(row, 6)?,
            })
        })
        .collect();
    Ok(gains)
}

// Orders

pub async fn put_order(session: &Session, order: &Order) -> DbResult<()> {
    let doc = serde_json::to_string(order)?;
    let query = Query::new("INSERT INTO trade_pro.orders (user_id, id, doc) VALUES (?, ?, ?)");
    session
        .query(query, (order.user_id.as_str(), order.id.as_str(), doc))
        .await?;
    Ok(())
}

pub async fn get_orders(session: &Session, user_id: &str) -> DbResult<Vec<Order>> {
    let query = Query::new("SELECT doc FROM trade_pro.orders WHERE user_id = ?");
    let result = session.query(query, (user_id,)).await?;
    let mut orders = Vec::new();
    for row in result.rows.unwrap_or_default() {
        if let Some(doc) = text(&row, 0) {
            orders.push(serde_json::from_str::<Order>(&doc)?);
        }
    }
    orders.sort_by(|a, b| b.created_at.cmp(&a.created_at));
    Ok(orders)
}

pub async fn get_order(session: &Session, user_id: &str, order_id: &str) -> DbResult<Option<Order>> {
    let query = Query::new("SELECT doc FROM trade_pro.orders WHERE user_id = ? AND id = ?");
    let result = session.query(query, (user_id, order_id)).await?;
    match first_row(result.rows).and_then(|row| text(&row, 0)) {
        Some(doc) => Ok(Some(serde_json::from_str(&doc)?)),
        None => Ok(None),
    }
}

// Watchlists

pub async fn put_watchlist(session: &Session, user_id: &str, watchlist: &Watchlist) -> DbResult<()> {
    let items_json = serde_json::to_string(&watchlist.items)?;
    let query = Query::new("INSERT INTO trade_pro.watchlists (user_id, items) VALUES (?, ?)");
    session.query(query, (user_id, items_json)).await?;
    Ok(())
}

pub async fn get_watchlist(session: &Session, user_id: &str) -> DbResult<Watchlist> {
    let query = Query::new("SELECT items FROM trade_pro.watchlists WHERE user_id = ?");
    let result = session.query(query, (user_id,)).await?;
    match first_row(result.rows).and_then(|row| text(&row, 0)) {
        Some(json) => Ok(Watchlist {
            items: serde_json::from_str(&json)?,
        }),
        None => Ok(Watchlist::default()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn row(columns: Vec<Option<CqlValue>>) -> Row {
        Row { columns }
    }

    #[test]
    fn applied_reads_the_lwt_flag() {
        assert!(applied(Some(vec![row(vec![Some(CqlValue::Boolean(true))])])));
        assert!(!applied(Some(vec![row(vec![
            Some(CqlValue::Boolean(false)),
            Some(CqlValue::Boolean(false)),
        ])])));
        assert!(!applied(Some(vec![])));
        assert!(!applied(None));
    }

    #[test]
    fn daily_gains_are_keyed_per_plan_and_date() {
        assert!(DAILY_GAINS_TABLE.contains("PRIMARY KEY (user_id, gain_date, investment_plan_id)"));
        assert!(DAILY_GAINS_TABLE.contains("CLUSTERING ORDER BY (gain_date DESC"));
    }

    #[test]
    fn deactivation_only_touches_the_flag() {
        let (set, condition) = DEACTIVATE_PLAN.split_once(" WHERE ").unwrap();
        assert!(set.ends_with("SET is_active = false, updated_at = ?"));
        assert!(condition.ends_with("IF is_active = true"));
        for column in ["current_balance", "total_gained", "last_increment_date"] {
            assert!(!DEACTIVATE_PLAN.contains(column));
        }
    }

    #[test]
    fn plan_row_decodes_dates_and_flags() {
        let created = chrono::Duration::milliseconds(1_709_280_000_000);
        let plan = plan_from_row(&row(vec![
            Some(CqlValue::Text("user-1".to_string())),
            Some(CqlValue::Text("plan-1".to_string())),
            Some(CqlValue::Text("5000".to_string())),
            Some(CqlValue::Double(5000.0)),
            Some(CqlValue::Double(160.0)),
            Some(CqlValue::Double(5320.0)),
            Some(CqlValue::Double(320.0)),
            Some(CqlValue::Text("2024-03-01".to_string())),
            Some(CqlValue::Text("2024-03-03".to_string())),
            Some(CqlValue::Boolean(true)),
            Some(CqlValue::Timestamp(created)),
            Some(CqlValue::Timestamp(created)),
        ]))
        .unwrap();
        assert_eq!(plan.plan_type, PlanType::Growth);
        assert_eq!(
            plan.last_increment_date,
            NaiveDate::from_ymd_opt(2024, 3, 3)
        );
        assert!(plan.is_active);
        assert_eq!(plan.created_at.timestamp_millis(), 1_709_280_000_000);
    }
}
