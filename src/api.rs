// src/api.rs
use crate::auth::{self, AuthError, RegisterData, SignInData};
use crate::config::Config;
use crate::db::{self, Account, DbResult};
use crate::error::ApiError;
use crate::market::{self, MarketFeed};
use crate::models::{Holding, Portfolio, ProfileUpdate, SettingsUpdate, UserProfile, UserSettings};
use crate::plans::{self, InvestmentPlan, PlanError, PlanType};
use crate::portfolio;
use crate::trading::{self, Order, OrderError, OrderRequest};
use crate::watchlist::{PriceAlert, Watchlist, WatchlistItem};
use chrono::{DateTime, Utc};
use log::{error, info, warn};
use reqwest::Client;
use scylla::Session;
use serde::{Deserialize, Serialize};
use serde_json::json;
use std::sync::Arc;
use uuid::Uuid;
use warp::http::StatusCode;
use warp::{Filter, Rejection, Reply};

const DEFAULT_GAINS_LIMIT: i32 = 30;
const MAX_GAINS_LIMIT: i32 = 365;

#[derive(Deserialize)]
struct AssetQuery {
    q: Option<String>,
}

#[derive(Deserialize)]
struct GainsQuery {
    limit: Option<i32>,
}

#[derive(Deserialize)]
struct EstimateQuery {
    plan_type: PlanType,
    amount: Option<f64>,
}

#[derive(Deserialize)]
struct CreatePlan {
    plan_type: PlanType,
    amount: Option<f64>,
}

#[derive(Serialize)]
struct PlanReport {
    #[serde(flatten)]
    plan: InvestmentPlan,
    progress_percent: f64,
    days_active: i64,
}

#[derive(Serialize)]
struct TokenResponse {
    token: String,
    user_id: String,
}

pub fn routes(
    session: Arc<Session>,
    feed: MarketFeed,
    config: Arc<Config>,
    client: Client,
) -> impl Filter<Extract = impl Reply, Error = Rejection> + Clone {
    let signup = warp::path!("auth" / "signup")
        .and(warp::post())
        .and(with_session(session.clone()))
        .and(with_config(config.clone()))
        .and(warp::body::json())
        .and_then(signup_handler);

    let signin = warp::path!("auth" / "signin")
        .and(warp::post())
        .and(with_session(session.clone()))
        .and(with_config(config.clone()))
        .and(warp::body::json())
        .and_then(signin_handler);

    let user = with_user(config.clone());

    let get_profile = warp::path!("profile")
        .and(warp::get())
        .and(with_session(session.clone()))
        .and(user.clone())
        .and_then(get_profile_handler);

    let update_profile = warp::path!("profile")
        .and(warp::put())
        .and(with_session(session.clone()))
        .and(user.clone())
        .and(warp::body::json())
        .and_then(update_profile_handler);

    let get_settings = warp::path!("settings")
        .and(warp::get())
        .and(with_session(session.clone()))
        .and(user.clone())
        .and_then(get_settings_handler);

    let update_settings = warp::path!("settings")
        .and(warp::put())
        .and(with_session(session.clone()))
        .and(user.clone())
        .and(warp::body::json())
        .and_then(update_settings_handler);

    let get_portfolio = warp::path!("portfolio")
        .and(warp::get())
        .and(with_session(session.clone()))
        .and(user.clone())
        .and_then(get_portfolio_handler);

    let replace_portfolio = warp::path!("portfolio")
        .and(warp::put())
        .and(with_session(session.clone()))
        .and(user.clone())
        .and(warp::body::json())
        .and_then(replace_portfolio_handler);

    let list_plans = warp::path!("plans")
        .and(warp::get())
        .and(with_session(session.clone()))
        .and(user.clone())
        .and_then(list_plans_handler);

    let create_plan = warp::path!("plans")
        .and(warp::post())
        .and(with_session(session.clone()))
        .and(user.clone())
        .and(warp::body::json())
        .and_then(create_plan_handler);

    let deactivate_plan = warp::path!("plans" / String / "deactivate")
        .and(warp::post())
        .and(with_session(session.clone()))
        .and(user.clone())
        .and_then(deactivate_plan_handler);

    let daily_gains = warp::path!("plans" / "gains")
        .and(warp::get())
        .and(with_session(session.clone()))
        .and(user.clone())
        .and(warp::query::<GainsQuery>())
        .and_then(daily_gains_handler);

    let list_orders = warp::path!("orders")
        .and(warp::get())
        .and(with_session(session.clone()))
        .and(user.clone())
        .and_then(list_orders_handler);

    let place_order = warp::path!("orders")
        .and(warp::post())
        .and(with_session(session.clone()))
        .and(with_feed(feed.clone()))
        .and(user.clone())
        .and(warp::body::json())
        .and_then(place_order_handler);

    let cancel_order = warp::path!("orders" / String / "cancel")
        .and(warp::post())
        .and(with_session(session.clone()))
        .and(user.clone())
        .and_then(cancel_order_handler);

    let get_watchlist = warp::path!("watchlist")
        .and(warp::get())
        .and(with_session(session.clone()))
        .and(with_feed(feed.clone()))
        .and(user.clone())
        .and_then(get_watchlist_handler);

    let replace_watchlist = warp::path!("watchlist")
        .and(warp::put())
        .and(with_session(session.clone()))
        .and(user.clone())
        .and(warp::body::json())
        .and_then(replace_watchlist_handler);

    let add_to_watchlist = warp::path!("watchlist" / String)
        .and(warp::post())
        .and(with_session(session.clone()))
        .and(with_feed(feed.clone()))
        .and(user.clone())
        .and_then(add_to_watchlist_handler);

    let remove_from_watchlist = warp::path!("watchlist" / String)
        .and(warp::delete())
        .and(with_session(session.clone()))
        .and(user.clone())
        .and_then(remove_from_watchlist_handler);

    let toggle_alert = warp::path!("watchlist" / String / "alert")
        .and(warp::post())
        .and(with_session(session.clone()))
        .and(user.clone())
        .and_then(toggle_alert_handler);

    let set_alert = warp::path!("watchlist" / String / "alert")
        .and(warp::put())
        .and(with_session(session))
        .and(user)
        .and(warp::body::json())
        .and_then(set_alert_handler);

    let account = signup
        .or(signin)
        .or(get_profile)
        .or(update_profile)
        .or(get_settings)
        .or(update_settings);
    let holdings = get_portfolio
        .or(replace_portfolio)
        .or(daily_gains)
        .or(list_plans)
        .or(create_plan)
        .or(deactivate_plan);
    let trading = list_orders
        .or(place_order)
        .or(cancel_order)
        .or(get_watchlist)
        .or(replace_watchlist)
        .or(add_to_watchlist)
        .or(remove_from_watchlist)
        .or(toggle_alert)
        .or(set_alert);

    public_routes(feed, config, client)
        .or(account)
        .or(holdings)
        .or(trading)
}

/// Routes that need neither storage nor a signed-in user.
pub fn public_routes(
    feed: MarketFeed,
    config: Arc<Config>,
    client: Client,
) -> impl Filter<Extract = impl Reply, Error = Rejection> + Clone {
    let plan_options = warp::path!("plans" / "options")
        .and(warp::get())
        .map(|| warp::reply::json(&plans::plan_options()));

    let estimate = warp::path!("plans" / "estimate")
        .and(warp::get())
        .and(warp::query::<EstimateQuery>())
        .and_then(estimate_handler);

    let assets = warp::path!("market" / "assets")
        .and(warp::get())
        .and(with_feed(feed.clone()))
        .and(warp::query::<AssetQuery>())
        .map(|feed: MarketFeed, query: AssetQuery| {
            let snapshot = feed.snapshot();
            match query.q.as_deref() {
                Some(term) => warp::reply::json(&market::search(&snapshot, term)),
                None => warp::reply::json(snapshot.as_ref()),
            }
        });

    let chart = warp::path!("market" / String / "chart")
        .and(warp::get())
        .and(with_feed(feed.clone()))
        .and(with_config(config))
        .and(warp::any().map(move || client.clone()))
        .and_then(chart_handler);

    let quote = warp::path!("market" / "quote")
        .and(warp::post())
        .and(with_feed(feed))
        .and(warp::body::json())
        .and_then(quote_handler);

    plan_options.or(estimate).or(assets).or(chart).or(quote)
}

fn with_session(
    session: Arc<Session>,
) -> impl Filter<Extract = (Arc<Session>,), Error = std::convert::Infallible> + Clone {
    warp::any().map(move || session.clone())
}

fn with_feed(
    feed: MarketFeed,
) -> impl Filter<Extract = (MarketFeed,), Error = std::convert::Infallible> + Clone {
    warp::any().map(move || feed.clone())
}

fn with_config(
    config: Arc<Config>,
) -> impl Filter<Extract = (Arc<Config>,), Error = std::convert::Infallible> + Clone {
    warp::any().map(move || config.clone())
}

/// Extracts the user id from an `Authorization: Bearer <jwt>` header.
fn with_user(config: Arc<Config>) -> impl Filter<Extract = (String,), Error = Rejection> + Clone {
    warp::header::<String>("authorization").and_then(move |header: String| {
        let config = config.clone();
        async move {
            let token = match header.strip_prefix("Bearer ") {
                Some(token) => token,
                None => {
                    return Err(Rejection::from(ApiError::unauthorized(
                        "Expected a bearer token",
                    )))
                }
            };
            auth::verify_token(token.trim(), &config.jwt_secret).map_err(|e| {
                warn!("Rejected token: {}", e);
                Rejection::from(ApiError::unauthorized("Invalid or expired token"))
            })
        }
    })
}

fn storage_error(e: Box<dyn std::error::Error + Send + Sync>) -> Rejection {
    error!("Storage error: {}", e);
    ApiError::internal("Storage unavailable").into()
}

fn auth_rejection(e: AuthError) -> Rejection {
    match e {
        AuthError::InvalidCredentials => ApiError::unauthorized(e.to_string()),
        AuthError::AccountExists => ApiError::conflict(e.to_string()),
        AuthError::Token(_) | AuthError::Hash(_) => {
            error!("Auth failure: {}", e);
            ApiError::internal("Authentication failed")
        }
        _ => ApiError::bad_request(e.to_string()),
    }
    .into()
}

fn plan_rejection(e: PlanError) -> Rejection {
    match e {
        PlanError::AlreadyInactive => ApiError::conflict(e.to_string()),
        _ => ApiError::bad_request(e.to_string()),
    }
    .into()
}

fn order_rejection(e: OrderError) -> Rejection {
    match e {
        OrderError::NotOpen(_) => ApiError::conflict(e.to_string()),
        _ => ApiError::bad_request(e.to_string()),
    }
    .into()
}

fn created(body: &impl Serialize) -> warp::reply::WithStatus<warp::reply::Json> {
    warp::reply::with_status(warp::reply::json(body), StatusCode::CREATED)
}

/// The profile stores the synthetic login email; the address typed at sign-up
/// is only checked for shape.
fn signup_profile(account: &Account, data: &RegisterData, now: DateTime<Utc>) -> UserProfile {
    UserProfile {
        id: account.user_id.clone(),
        full_name: Some(data.full_name.trim().to_string()),
        contact_number: Some(data.contact_number.trim().to_string()),
        avatar_url: None,
        email: Some(account.login_id.clone()),
        created_at: now,
        updated_at: now,
    }
}

async fn signup_handler(
    session: Arc<Session>,
    config: Arc<Config>,
    data: RegisterData,
) -> Result<impl Reply, Rejection> {
    data.validate().map_err(auth_rejection)?;

    let now = Utc::now();
    let account = Account {
        login_id: auth::login_identifier(&data.contact_number),
        user_id: Uuid::new_v4().to_string(),
        password_hash: auth::hash_password(&data.password).map_err(auth_rejection)?,
    };
    if !db::create_account(&session, &account)
        .await
        .map_err(storage_error)?
    {
        return Err(auth_rejection(AuthError::AccountExists));
    }

    let profile = signup_profile(&account, &data, now);
    db::put_profile(&session, &profile)
        .await
        .map_err(storage_error)?;
    db::put_settings(&session, &UserSettings::defaults(&account.user_id, now))
        .await
        .map_err(storage_error)?;

    let token = auth::create_token(&account.user_id, &config.jwt_secret, config.token_ttl)
        .map_err(auth_rejection)?;
    info!("Registered {} as {}", account.login_id, account.user_id);
    Ok(created(&TokenResponse {
        token,
        user_id: account.user_id,
    }))
}

async fn signin_handler(
    session: Arc<Session>,
    config: Arc<Config>,
    data: SignInData,
) -> Result<impl Reply, Rejection> {
    let login_id = auth::login_identifier(&data.login);
    let account = db::get_account(&session, &login_id)
        .await
        .map_err(storage_error)?
        .ok_or_else(|| auth_rejection(AuthError::InvalidCredentials))?;
    auth::verify_password(&data.password, &account.password_hash).map_err(auth_rejection)?;

    let token = auth::create_token(&account.user_id, &config.jwt_secret, config.token_ttl)
        .map_err(auth_rejection)?;
    info!("Signed in {}", account.user_id);
    Ok(warp::reply::json(&TokenResponse {
        token,
        user_id: account.user_id,
    }))
}

async fn load_profile(session: &Session, user_id: &str) -> Result<UserProfile, Rejection> {
    db::get_profile(session, user_id)
        .await
        .map_err(storage_error)?
        .ok_or_else(|| ApiError::not_found("Profile not found").into())
}

async fn get_profile_handler(
    session: Arc<Session>,
    user_id: String,
) -> Result<impl Reply, Rejection> {
    let profile = load_profile(&session, &user_id).await?;
    Ok(warp::reply::json(&profile))
}

async fn update_profile_handler(
    session: Arc<Session>,
    user_id: String,
    update: ProfileUpdate,
) -> Result<impl Reply, Rejection> {
    let mut profile = load_profile(&session, &user_id).await?;
    profile.apply(update, Utc::now());
    db::put_profile(&session, &profile)
        .await
        .map_err(storage_error)?;
    info!("Profile updated for {}", user_id);
    Ok(warp::reply::json(&profile))
}

async fn load_settings(session: &Session, user_id: &str) -> DbResult<UserSettings> {
    Ok(db::get_settings(session, user_id)
        .await?
        .unwrap_or_else(|| UserSettings::defaults(user_id, Utc::now())))
}

async fn get_settings_handler(
    session: Arc<Session>,
    user_id: String,
) -> Result<impl Reply, Rejection> {
    let settings = load_settings(&session, &user_id)
        .await
        .map_err(storage_error)?;
    Ok(warp::reply::json(&settings))
}

async fn update_settings_handler(
    session: Arc<Session>,
    user_id: String,
    update: SettingsUpdate,
) -> Result<impl Reply, Rejection> {
    let mut settings = load_settings(&session, &user_id)
        .await
        .map_err(storage_error)?;
    settings.apply(update, Utc::now());
    db::put_settings(&session, &settings)
        .await
        .map_err(storage_error)?;
    Ok(warp::reply::json(&settings))
}

async fn get_portfolio_handler(
    session: Arc<Session>,
    user_id: String,
) -> Result<impl Reply, Rejection> {
    let portfolio = db::get_portfolio(&session, &user_id)
        .await
        .map_err(storage_error)?;
    Ok(warp::reply::json(&portfolio::summarize(&portfolio.holdings)))
}

async fn replace_portfolio_handler(
    session: Arc<Session>,
    user_id: String,
    holdings: Vec<Holding>,
) -> Result<impl Reply, Rejection> {
    if let Some(bad) = holdings.iter().find(|h| {
        !(h.quantity.is_finite() && h.avg_cost.is_finite() && h.current_price.is_finite())
            || h.quantity < 0.0
    }) {
        return Err(ApiError::bad_request(format!("Invalid holding for {}", bad.symbol)).into());
    }
    let portfolio = Portfolio { user_id, holdings };
    db::put_portfolio(&session, &portfolio)
        .await
        .map_err(storage_error)?;
    info!(
        "Portfolio replaced for {} with {} holdings",
        portfolio.user_id,
        portfolio.holdings.len()
    );
    Ok(warp::reply::json(&portfolio::summarize(&portfolio.holdings)))
}

async fn list_plans_handler(
    session: Arc<Session>,
    user_id: String,
) -> Result<impl Reply, Rejection> {
    let plans = db::get_user_plans(&session, &user_id)
        .await
        .map_err(storage_error)?;
    let totals = plans::active_totals(&plans);
    let today = Utc::now().date_naive();
    let reports: Vec<PlanReport> = plans
        .into_iter()
        .map(|plan| PlanReport {
            progress_percent: plan.progress_percent(),
            days_active: plan.days_active(today),
            plan,
        })
        .collect();
    Ok(warp::reply::json(&json!({ "plans": reports, "totals": totals })))
}

async fn create_plan_handler(
    session: Arc<Session>,
    user_id: String,
    request: CreatePlan,
) -> Result<impl Reply, Rejection> {
    let plan = InvestmentPlan::open(&user_id, request.plan_type, request.amount, Utc::now())
        .map_err(plan_rejection)?;
    db::put_plan(&session, &plan).await.map_err(storage_error)?;
    info!(
        "Opened {} ({}) for {}",
        plan.plan_type.title(),
        plan.id,
        user_id
    );
    Ok(created(&plan))
}

async fn load_plan(
    session: &Session,
    user_id: &str,
    plan_id: &str,
) -> Result<InvestmentPlan, Rejection> {
    db::get_plan(session, user_id, plan_id)
        .await
        .map_err(storage_error)?
        .ok_or_else(|| ApiError::not_found("Plan not found").into())
}

async fn deactivate_plan_handler(
    plan_id: String,
    session: Arc<Session>,
    user_id: String,
) -> Result<impl Reply, Rejection> {
    let now = Utc::now();
    let mut plan = load_plan(&session, &user_id, &plan_id).await?;
    plan.deactivate(now).map_err(plan_rejection)?;
    if !db::deactivate_plan(&session, &user_id, &plan_id, now)
        .await
        .map_err(storage_error)?
    {
        return Err(plan_rejection(PlanError::AlreadyInactive));
    }
    info!("Deactivated plan {}", plan_id);
    // Re-read so the reply carries any accrual that landed in between.
    let plan = load_plan(&session, &user_id, &plan_id).await?;
    Ok(warp::reply::json(&plan))
}

async fn daily_gains_handler(
    session: Arc<Session>,
    user_id: String,
    query: GainsQuery,
) -> Result<impl Reply, Rejection> {
    let limit = query
        .limit
        .unwrap_or(DEFAULT_GAINS_LIMIT)
        .clamp(1, MAX_GAINS_LIMIT);
    let gains = db::get_daily_gains(&session, &user_id, limit)
        .await
        .map_err(storage_error)?;
    Ok(warp::reply::json(&gains))
}

async fn list_orders_handler(
    session: Arc<Session>,
    user_id: String,
) -> Result<impl Reply, Rejection> {
    let orders = db::get_orders(&session, &user_id)
        .await
        .map_err(storage_error)?;
    Ok(warp::reply::json(&trading::active_orders(&orders)))
}

async fn place_order_handler(
    session: Arc<Session>,
    feed: MarketFeed,
    user_id: String,
    request: OrderRequest,
) -> Result<impl Reply, Rejection> {
    let snapshot = feed.snapshot();
    let market_price = request
        .validate(&snapshot)
        .map_err(order_rejection)?
        .price;
    let estimated_total = request.estimated_total(market_price);
    let order = Order::place(&user_id, request, &snapshot, Utc::now()).map_err(order_rejection)?;
    db::put_order(&session, &order)
        .await
        .map_err(storage_error)?;
    info!(
        "Order {} placed: {:?} {} {}",
        order.id, order.side, order.quantity, order.symbol
    );
    Ok(created(&json!({
        "order": order,
        "estimated_total": estimated_total,
    })))
}

async fn cancel_order_handler(
    order_id: String,
    session: Arc<Session>,
    user_id: String,
) -> Result<impl Reply, Rejection> {
    let mut order = db::get_order(&session, &user_id, &order_id)
        .await
        .map_err(storage_error)?
        .ok_or_else(|| Rejection::from(ApiError::not_found("Order not found")))?;
    order.cancel().map_err(order_rejection)?;
    db::put_order(&session, &order)
        .await
        .map_err(storage_error)?;
    Ok(warp::reply::json(&order))
}

async fn get_watchlist_handler(
    session: Arc<Session>,
    feed: MarketFeed,
    user_id: String,
) -> Result<impl Reply, Rejection> {
    let mut watchlist = db::get_watchlist(&session, &user_id)
        .await
        .map_err(storage_error)?;
    watchlist.refresh(&feed.snapshot());
    let triggered: Vec<&str> = watchlist
        .triggered_alerts()
        .into_iter()
        .map(|item| item.symbol.as_str())
        .collect();
    Ok(warp::reply::json(&json!({
        "items": &watchlist.items,
        "triggered": triggered,
    })))
}

async fn replace_watchlist_handler(
    session: Arc<Session>,
    user_id: String,
    items: Vec<WatchlistItem>,
) -> Result<impl Reply, Rejection> {
    let watchlist = Watchlist { items };
    watchlist
        .validate()
        .map_err(|e| Rejection::from(ApiError::bad_request(e.to_string())))?;
    db::put_watchlist(&session, &user_id, &watchlist)
        .await
        .map_err(storage_error)?;
    info!(
        "Watchlist replaced for {} with {} items",
        user_id,
        watchlist.items.len()
    );
    Ok(warp::reply::json(&watchlist))
}

async fn add_to_watchlist_handler(
    symbol: String,
    session: Arc<Session>,
    feed: MarketFeed,
    user_id: String,
) -> Result<impl Reply, Rejection> {
    let snapshot = feed.snapshot();
    let asset = market::find(&snapshot, &symbol)
        .ok_or_else(|| Rejection::from(ApiError::not_found(format!("Unknown symbol: {}", symbol))))?;
    let mut watchlist = db::get_watchlist(&session, &user_id)
        .await
        .map_err(storage_error)?;
    if !watchlist.add(asset) {
        return Err(ApiError::conflict(format!("{} is already on the watchlist", asset.symbol)).into());
    }
    db::put_watchlist(&session, &user_id, &watchlist)
        .await
        .map_err(storage_error)?;
    Ok(created(&watchlist))
}

async fn remove_from_watchlist_handler(
    symbol: String,
    session: Arc<Session>,
    user_id: String,
) -> Result<impl Reply, Rejection> {
    let mut watchlist = db::get_watchlist(&session, &user_id)
        .await
        .map_err(storage_error)?;
    if !watchlist.remove(&symbol) {
        return Err(ApiError::not_found(format!("{} is not on the watchlist", symbol)).into());
    }
    db::put_watchlist(&session, &user_id, &watchlist)
        .await
        .map_err(storage_error)?;
    Ok(warp::reply::json(&watchlist))
}

async fn toggle_alert_handler(
    symbol: String,
    session: Arc<Session>,
    user_id: String,
) -> Result<impl Reply, Rejection> {
    let mut watchlist = db::get_watchlist(&session, &user_id)
        .await
        .map_err(storage_error)?;
    let enabled = watchlist
        .toggle_alert(&symbol)
        .ok_or_else(|| Rejection::from(ApiError::not_found(format!("No alert set for {}", symbol))))?;
    db::put_watchlist(&session, &user_id, &watchlist)
        .await
        .map_err(storage_error)?;
    Ok(warp::reply::json(&json!({ "symbol": symbol, "enabled": enabled })))
}

async fn set_alert_handler(
    symbol: String,
    session: Arc<Session>,
    user_id: String,
    alert: Option<PriceAlert>,
) -> Result<impl Reply, Rejection> {
    let mut watchlist = db::get_watchlist(&session, &user_id)
        .await
        .map_err(storage_error)?;
    if !watchlist.set_alert(&symbol, alert) {
        return Err(ApiError::not_found(format!("{} is not on the watchlist", symbol)).into());
    }
    db::put_watchlist(&session, &user_id, &watchlist)
        .await
        .map_err(storage_error)?;
    Ok(warp::reply::json(&watchlist))
}

async fn chart_handler(
    symbol: String,
    feed: MarketFeed,
    config: Arc<Config>,
    client: Client,
) -> Result<impl Reply, Rejection> {
    let snapshot = feed.snapshot();
    let candles = market::chart_for(
        &client,
        config.alphavantage_api_key.as_deref(),
        &snapshot,
        &symbol,
    )
    .await;
    Ok(warp::reply::json(&candles))
}

async fn estimate_handler(query: EstimateQuery) -> Result<impl Reply, Rejection> {
    let amount = query
        .amount
        .unwrap_or_else(|| query.plan_type.minimum_amount());
    if !(amount.is_finite() && amount >= query.plan_type.minimum_amount()) {
        return Err(plan_rejection(PlanError::BelowMinimum {
            plan_type: query.plan_type,
            amount,
        }));
    }
    let daily_gain = plans::estimated_daily_gain(query.plan_type, amount);
    Ok(warp::reply::json(&json!({
        "plan_type": query.plan_type,
        "amount": amount,
        "daily_gain": daily_gain,
        "monthly_gain": daily_gain * 30.0,
        "annual_return_percent": daily_gain * 365.0 / amount * 100.0,
    })))
}

async fn quote_handler(feed: MarketFeed, request: OrderRequest) -> Result<impl Reply, Rejection> {
    let snapshot = feed.snapshot();
    let asset = request.validate(&snapshot).map_err(order_rejection)?;
    Ok(warp::reply::json(&json!({
        "symbol": asset.symbol,
        "market_price": asset.price,
        "estimated_total": request.estimated_total(asset.price),
    })))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::recover;
    use crate::market::seed_assets;
    use serde_json::Value;

    fn public() -> impl Filter<Extract = impl Reply, Error = std::convert::Infallible> + Clone {
        let (feed, _tx) = MarketFeed::fixed(seed_assets());
        let config = Arc::new(Config::from_lookup(|_| None).unwrap());
        public_routes(feed, config, Client::new()).recover(recover)
    }

    fn body(res: &warp::http::Response<warp::hyper::body::Bytes>) -> Value {
        serde_json::from_slice(res.body()).unwrap()
    }

    #[tokio::test]
    async fn plan_options_lists_all_tiers() {
        let res = warp::test::request()
            .method("GET")
            .path("/plans/options")
            .reply(&public())
            .await;
        assert_eq!(res.status(), StatusCode::OK);
        let options = body(&res);
        let tiers: Vec<&str> = options
            .as_array()
            .unwrap()
            .iter()
            .map(|o| o["plan_type"].as_str().unwrap())
            .collect();
        assert_eq!(tiers, vec!["2000", "5000", "10000", "20000"]);
        assert_eq!(options[2]["daily_gain"], 330.0);
    }

    #[tokio::test]
    async fn estimate_scales_custom_amount() {
        let res = warp::test::request()
            .method("GET")
            .path("/plans/estimate?plan_type=5000&amount=10000")
            .reply(&public())
            .await;
        assert_eq!(res.status(), StatusCode::OK);
        let estimate = body(&res);
        assert_eq!(estimate["daily_gain"], 320.0);
        assert_eq!(estimate["monthly_gain"], 9600.0);

        let res = warp::test::request()
            .method("GET")
            .path("/plans/estimate?plan_type=20000&amount=500")
            .reply(&public())
            .await;
        assert_eq!(res.status(), StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn asset_search_filters_snapshot() {
        let res = warp::test::request()
            .method("GET")
            .path("/market/assets?q=tesla")
            .reply(&public())
            .await;
        assert_eq!(res.status(), StatusCode::OK);
        let assets = body(&res);
        assert_eq!(assets.as_array().unwrap().len(), 1);
        assert_eq!(assets[0]["symbol"], "TSLA");
    }

    #[tokio::test]
    async fn quote_estimates_limit_order_total() {
        let res = warp::test::request()
            .method("POST")
            .path("/market/quote")
            .json(&json!({
                "symbol": "MSFT",
                "side": "buy",
                "order_type": "limit",
                "quantity": 4,
                "price": 350.0
            }))
            .reply(&public())
            .await;
        assert_eq!(res.status(), StatusCode::OK);
        assert_eq!(body(&res)["estimated_total"], 1400.0);
    }

    #[tokio::test]
    async fn quote_rejects_limit_without_price() {
        let res = warp::test::request()
            .method("POST")
            .path("/market/quote")
            .json(&json!({
                "symbol": "MSFT",
                "side": "sell",
                "order_type": "limit",
                "quantity": 4
            }))
            .reply(&public())
            .await;
        assert_eq!(res.status(), StatusCode::BAD_REQUEST);
        assert!(body(&res)["error"].as_str().unwrap().contains("limit price"));
    }

    #[tokio::test]
    async fn synthetic_chart_for_unknown_symbol() {
        let res = warp::test::request()
            .method("GET")
            .path("/market/XYZ/chart")
            .reply(&public())
            .await;
        assert_eq!(res.status(), StatusCode::OK);
        assert_eq!(body(&res).as_array().unwrap().len(), 100);
    }

    #[tokio::test]
    async fn user_filter_requires_valid_bearer() {
        let config = Arc::new(Config::from_lookup(|_| None).unwrap());
        let filter = warp::path!("me")
            .and(with_user(config.clone()))
            .map(|user_id: String| user_id)
            .recover(recover);

        let res = warp::test::request().path("/me").reply(&filter).await;
        assert_eq!(res.status(), StatusCode::UNAUTHORIZED);

        let res = warp::test::request()
            .path("/me")
            .header("authorization", "Bearer not-a-jwt")
            .reply(&filter)
            .await;
        assert_eq!(res.status(), StatusCode::UNAUTHORIZED);

        let token =
            auth::create_token("user-7", &config.jwt_secret, chrono::Duration::hours(1)).unwrap();
        let res = warp::test::request()
            .path("/me")
            .header("authorization", format!("Bearer {}", token))
            .reply(&filter)
            .await;
        assert_eq!(res.status(), StatusCode::OK);
        assert_eq!(res.body().as_ref(), b"user-7");
    }

    #[test]
    fn signup_profile_stores_login_email() {
        let data: RegisterData = serde_json::from_value(json!({
            "email": "ada@example.com",
            "password": "hunter22",
            "confirm_password": "hunter22",
            "full_name": " Ada Lovelace ",
            "contact_number": "+1 (555) 010-0200",
            "agree_to_terms": true
        }))
        .unwrap();
        let account = Account {
            login_id: auth::login_identifier(&data.contact_number),
            user_id: "user-1".to_string(),
            password_hash: String::new(),
        };
        let profile = signup_profile(&account, &data, Utc::now());
        assert_eq!(profile.email.as_deref(), Some("15550100200@trade-pro.com"));
        assert_eq!(profile.full_name.as_deref(), Some("Ada Lovelace"));
        assert_eq!(profile.id, "user-1");
    }

    #[tokio::test]
    async fn repeated_deactivation_is_a_conflict() {
        let filter = warp::path!("plans" / String / "deactivate")
            .and_then(|_id: String| async {
                Err::<String, Rejection>(plan_rejection(PlanError::AlreadyInactive))
            })
            .recover(recover);
        let res = warp::test::request()
            .path("/plans/p-1/deactivate")
            .reply(&filter)
            .await;
        assert_eq!(res.status(), StatusCode::CONFLICT);
    }
}
