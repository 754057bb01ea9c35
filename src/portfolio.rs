// src/portfolio.rs
use crate::models::Holding;
use log::debug;
use serde::Serialize;

#[derive(Debug, Serialize)]
pub struct HoldingReport {
    pub symbol: String,
    pub name: String,
    pub quantity: f64,
    pub avg_cost: f64,
    pub current_price: f64,
    pub total_value: f64,
    pub gain_loss: f64,
    pub gain_loss_percent: f64,
    pub allocation: f64,
}

impl From<&Holding> for HoldingReport {
    fn from(h: &Holding) -> Self {
        HoldingReport {
            symbol: h.symbol.clone(),
            name: h.name.clone(),
            quantity: h.quantity,
            avg_cost: h.avg_cost,
            current_price: h.current_price,
            total_value: h.total_value(),
            gain_loss: h.gain_loss(),
            gain_loss_percent: h.gain_loss_percent(),
            allocation: h.allocation,
        }
    }
}

#[derive(Debug, Serialize)]
pub struct PortfolioSummary {
    pub total_value: f64,
    pub total_gain_loss: f64,
    pub total_gain_loss_percent: f64,
    pub holdings: Vec<HoldingReport>,
}

pub fn total_value(holdings: &[Holding]) -> f64 {
    holdings.iter().map(Holding::total_value).sum()
}

pub fn total_gain_loss(holdings: &[Holding]) -> f64 {
    holdings.iter().map(Holding::gain_loss).sum()
}

/// Gain relative to the aggregate cost basis, in percent.
///
/// Returns 0 for an empty portfolio and when the cost basis is zero
/// (every position acquired at no cost), where the ratio is undefined.
pub fn total_gain_loss_percent(holdings: &[Holding]) -> f64 {
    let value = total_value(holdings);
    let gain = total_gain_loss(holdings);
    if value <= 0.0 {
        return 0.0;
    }
    let cost_basis = value - gain;
    if cost_basis.abs() < f64::EPSILON {
        debug!("Zero cost basis across {} holdings", holdings.len());
        return 0.0;
    }
    gain / cost_basis * 100.0
}

pub fn summarize(holdings: &[Holding]) -> PortfolioSummary {
    PortfolioSummary {
        total_value: total_value(holdings),
        total_gain_loss: total_gain_loss(holdings),
        total_gain_loss_percent: total_gain_loss_percent(holdings),
        holdings: holdings.iter().map(HoldingReport::from).collect(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn holding(symbol: &str, quantity: f64, avg_cost: f64, current_price: f64) -> Holding {
        Holding {
            symbol: symbol.to_string(),
            name: symbol.to_string(),
            quantity,
            avg_cost,
            current_price,
            allocation: 0.0,
        }
    }

    fn dashboard_holdings() -> Vec<Holding> {
        vec![
            holding("AAPL", 50.0, 165.50, 175.84),
            holding("GOOGL", 25.0, 145.20, 142.56),
            holding("MSFT", 30.0, 370.00, 378.91),
            holding("TSLA", 10.0, 265.00, 248.42),
        ]
    }

    #[test]
    fn total_value_sums_quantity_times_price() {
        let holdings = dashboard_holdings();
        let expected: f64 = holdings.iter().map(|h| h.quantity * h.current_price).sum();
        assert_eq!(total_value(&holdings), expected);
        assert!((total_value(&holdings) - 26207.5).abs() < 1e-6);
    }

    #[test]
    fn total_gain_loss_can_be_negative() {
        let holdings = vec![
            holding("GOOGL", 25.0, 145.20, 142.56),
            holding("TSLA", 10.0, 265.00, 248.42),
        ];
        assert!((total_gain_loss(&holdings) - (-231.8)).abs() < 1e-6);
    }

    #[test]
    fn percent_is_relative_to_cost_basis() {
        let holdings = dashboard_holdings();
        let gain = total_gain_loss(&holdings);
        let basis = total_value(&holdings) - gain;
        let pct = total_gain_loss_percent(&holdings);
        assert!((pct - gain / basis * 100.0).abs() < 1e-9);
        assert!((pct - 2.1536).abs() < 1e-3);
    }

    #[test]
    fn empty_portfolio_is_all_zero() {
        assert_eq!(total_value(&[]), 0.0);
        assert_eq!(total_gain_loss(&[]), 0.0);
        assert_eq!(total_gain_loss_percent(&[]), 0.0);
    }

    #[test]
    fn zero_cost_basis_does_not_divide_by_zero() {
        let holdings = vec![holding("GIFT", 4.0, 0.0, 25.0)];
        assert_eq!(total_value(&holdings), total_gain_loss(&holdings));
        let pct = total_gain_loss_percent(&holdings);
        assert!(pct.is_finite());
        assert_eq!(pct, 0.0);
    }

    #[test]
    fn summary_carries_supplied_allocation() {
        let mut holdings = dashboard_holdings();
        holdings[0].allocation = 35.2;
        let summary = summarize(&holdings);
        assert_eq!(summary.holdings.len(), 4);
        assert_eq!(summary.holdings[0].allocation, 35.2);
        assert_eq!(summary.total_value, total_value(&holdings));
    }
}
