// src/trading.rs
use crate::market::{self, Asset};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Side {
    Buy,
    Sell,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum OrderType {
    Market,
    Limit,
    Stop,
    StopLimit,
}

impl OrderType {
    fn needs_limit_price(&self) -> bool {
        matches!(self, OrderType::Limit | OrderType::StopLimit)
    }

    fn needs_stop_price(&self) -> bool {
        matches!(self, OrderType::Stop | OrderType::StopLimit)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TimeInForce {
    Day,
    Gtc,
    Ioc,
    Fok,
}

impl Default for TimeInForce {
    fn default() -> Self {
        TimeInForce::Day
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OrderStatus {
    Open,
    Filled,
    Cancelled,
    Rejected,
}

#[derive(Debug, Clone, Deserialize)]
pub struct OrderRequest {
    pub symbol: String,
    pub side: Side,
    pub order_type: OrderType,
    pub quantity: f64,
    pub price: Option<f64>,
    pub stop_price: Option<f64>,
    #[serde(default)]
    pub time_in_force: TimeInForce,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Order {
    pub id: String,
    pub user_id: String,
    pub symbol: String,
    pub side: Side,
    pub order_type: OrderType,
    pub quantity: f64,
    pub price: Option<f64>,
    pub stop_price: Option<f64>,
    pub time_in_force: TimeInForce,
    pub status: OrderStatus,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, PartialEq)]
pub enum OrderError {
    UnknownSymbol(String),
    InvalidQuantity,
    MissingPrice,
    MissingStopPrice,
    NotOpen(OrderStatus),
}

impl fmt::Display for OrderError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            OrderError::UnknownSymbol(s) => write!(f, "Unknown symbol: {}", s),
            OrderError::InvalidQuantity => write!(f, "Quantity must be greater than zero"),
            OrderError::MissingPrice => write!(f, "A positive limit price is required"),
            OrderError::MissingStopPrice => write!(f, "A positive stop price is required"),
            OrderError::NotOpen(status) => write!(f, "Order is {:?}, not open", status),
        }
    }
}

impl std::error::Error for OrderError {}

fn positive(v: Option<f64>) -> bool {
    matches!(v, Some(p) if p.is_finite() && p > 0.0)
}

impl OrderRequest {
    /// Checks the request against the current quotes and returns the quote
    /// for its symbol.
    pub fn validate<'a>(&self, assets: &'a [Asset]) -> Result<&'a Asset, OrderError> {
        let asset = market::find(assets, &self.symbol)
            .ok_or_else(|| OrderError::UnknownSymbol(self.symbol.clone()))?;
        if !(self.quantity.is_finite() && self.quantity > 0.0) {
            return Err(OrderError::InvalidQuantity);
        }
        if self.order_type.needs_limit_price() && !positive(self.price) {
            return Err(OrderError::MissingPrice);
        }
        if self.order_type.needs_stop_price() && !positive(self.stop_price) {
            return Err(OrderError::MissingStopPrice);
        }
        Ok(asset)
    }

    /// Quantity times the market price for market and stop orders, times the
    /// limit price otherwise.
    pub fn estimated_total(&self, market_price: f64) -> f64 {
        let unit = match (self.order_type.needs_limit_price(), self.price) {
            (true, Some(limit)) => limit,
            _ => market_price,
        };
        self.quantity * unit
    }
}

impl Order {
    pub fn place(
        user_id: &str,
        request: OrderRequest,
        assets: &[Asset],
        now: DateTime<Utc>,
    ) -> Result<Order, OrderError> {
        let symbol = request.validate(assets)?.symbol.clone();
        Ok(Order {
            id: Uuid::new_v4().to_string(),
            user_id: user_id.to_string(),
            symbol,
            side: request.side,
            order_type: request.order_type,
            quantity: request.quantity,
            price: request.price.filter(|_| request.order_type.needs_limit_price()),
            stop_price: request.stop_price.filter(|_| request.order_type.needs_stop_price()),
            time_in_force: request.time_in_force,
            status: OrderStatus::Open,
            created_at: now,
        })
    }

    pub fn cancel(&mut self) -> Result<(), OrderError> {
        if self.status != OrderStatus::Open {
            return Err(OrderError::NotOpen(self.status));
        }
        self.status = OrderStatus::Cancelled;
        Ok(())
    }
}

pub fn active_orders(orders: &[Order]) -> Vec<&Order> {
    orders
        .iter()
        .filter(|o| o.status == OrderStatus::Open)
        .collect()
}
