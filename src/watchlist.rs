// src/watchlist.rs
use crate::market::Asset;
use serde::{Deserialize, Serialize};
use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AlertKind {
    Above,
    Below,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PriceAlert {
    pub kind: AlertKind,
    pub price: f64,
    pub enabled: bool,
}

impl PriceAlert {
    pub fn is_triggered(&self, price: f64) -> bool {
        self.enabled
            && match self.kind {
                AlertKind::Above => price >= self.price,
                AlertKind::Below => price <= self.price,
            }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WatchlistItem {
    pub symbol: String,
    pub name: String,
    pub price: f64,
    pub change: f64,
    pub change_percent: f64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub alert: Option<PriceAlert>,
}

impl From<&Asset> for WatchlistItem {
    fn from(a: &Asset) -> Self {
        WatchlistItem {
            symbol: a.symbol.clone(),
            name: a.name.clone(),
            price: a.price,
            change: a.change,
            change_percent: a.change_percent,
            alert: None,
        }
    }
}

#[derive(Debug, PartialEq)]
pub enum WatchlistError {
    InvalidItem(String),
    InvalidAlert(String),
    Duplicate(String),
}

impl fmt::Display for WatchlistError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            WatchlistError::InvalidItem(symbol) => write!(f, "Invalid quote for {:?}", symbol),
            WatchlistError::InvalidAlert(symbol) => {
                write!(f, "Alert price for {} must be a positive number", symbol)
            }
            WatchlistError::Duplicate(symbol) => write!(f, "{} appears more than once", symbol),
        }
    }
}

impl std::error::Error for WatchlistError {}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Watchlist {
    pub items: Vec<WatchlistItem>,
}

impl Watchlist {
    fn position(&self, symbol: &str) -> Option<usize> {
        self.items
            .iter()
            .position(|i| i.symbol.eq_ignore_ascii_case(symbol))
    }

    /// Adds the asset unless its symbol is already present.
    pub fn add(&mut self, asset: &Asset) -> bool {
        if self.position(&asset.symbol).is_some() {
            return false;
        }
        self.items.push(WatchlistItem::from(asset));
        true
    }

    pub fn remove(&mut self, symbol: &str) -> bool {
        let before = self.items.len();
        self.items.retain(|i| !i.symbol.eq_ignore_ascii_case(symbol));
        self.items.len() != before
    }

    /// Flips an existing alert. Items without an alert are left alone.
    pub fn toggle_alert(&mut self, symbol: &str) -> Option<bool> {
        let idx = self.position(symbol)?;
        let alert = self.items[idx].alert.as_mut()?;
        alert.enabled = !alert.enabled;
        Some(alert.enabled)
    }

    pub fn set_alert(&mut self, symbol: &str, alert: Option<PriceAlert>) -> bool {
        match self.position(symbol) {
            Some(idx) => {
                self.items[idx].alert = alert;
                true
            }
            None => false,
        }
    }

    /// Copies the latest quotes onto the items that have one.
    pub fn refresh(&mut self, assets: &[Asset]) {
        for item in &mut self.items {
            if let Some(a) = assets.iter().find(|a| a.symbol == item.symbol) {
                item.price = a.price;
                item.change = a.change;
                item.change_percent = a.change_percent;
            }
        }
    }

    /// Checks a client-supplied list before it replaces the stored one.
    pub fn validate(&self) -> Result<(), WatchlistError> {
        for (idx, item) in self.items.iter().enumerate() {
            let quote_ok = [item.price, item.change, item.change_percent]
                .iter()
                .all(|v| v.is_finite());
            if item.symbol.trim().is_empty() || !quote_ok {
                return Err(WatchlistError::InvalidItem(item.symbol.clone()));
            }
            if let Some(alert) = &item.alert {
                if !(alert.price.is_finite() && alert.price > 0.0) {
                    return Err(WatchlistError::InvalidAlert(item.symbol.clone()));
                }
            }
            if self.items[..idx]
                .iter()
                .any(|other| other.symbol.eq_ignore_ascii_case(&item.symbol))
            {
                return Err(WatchlistError::Duplicate(item.symbol.clone()));
            }
        }
        Ok(())
    }

    pub fn triggered_alerts(&self) -> Vec<&WatchlistItem> {
        self.items
            .iter()
            .filter(|i| i.alert.as_ref().map_or(false, |a| a.is_triggered(i.price)))
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::market::seed_assets;

    fn watchlist() -> Watchlist {
        let assets = seed_assets();
        let mut list = Watchlist::default();
        list.add(&assets[0]);
        list.add(&assets[1]);
        list.set_alert(
            "AAPL",
            Some(PriceAlert {
                kind: AlertKind::Above,
                price: 180.0,
                enabled: true,
            }),
        );
        list.set_alert(
            "GOOGL",
            Some(PriceAlert {
                kind: AlertKind::Below,
                price: 140.0,
                enabled: false,
            }),
        );
        list
    }

    #[test]
    fn add_skips_duplicates() {
        let assets = seed_assets();
        let mut list = watchlist();
        assert!(!list.add(&assets[0]));
        assert!(list.add(&assets[2]));
        assert_eq!(list.items.len(), 3);
    }

    #[test]
    fn remove_by_symbol() {
        let mut list = watchlist();
        assert!(list.remove("aapl"));
        assert!(!list.remove("AAPL"));
        assert_eq!(list.items.len(), 1);
    }

    #[test]
    fn toggle_only_touches_existing_alerts() {
        let mut list = watchlist();
        assert_eq!(list.toggle_alert("GOOGL"), Some(true));
        assert_eq!(list.toggle_alert("AAPL"), Some(false));
        list.add(&seed_assets()[2]);
        assert_eq!(list.toggle_alert("MSFT"), None);
        assert_eq!(list.toggle_alert("TSLA"), None);
    }

    #[test]
    fn refreshed_quotes_trigger_alerts() {
        let mut list = watchlist();
        assert!(list.triggered_alerts().is_empty());

        let mut assets = seed_assets();
        assets[0].price = 181.5;
        assets[1].price = 139.0;
        list.refresh(&assets);

        let fired: Vec<String> = list
            .triggered_alerts()
            .into_iter()
            .map(|i| i.symbol.clone())
            .collect();
        assert_eq!(fired, vec!["AAPL".to_string()]);

        list.toggle_alert("GOOGL");
        assert_eq!(list.triggered_alerts().len(), 2);
    }

    #[test]
    fn validate_rejects_bad_replacements() {
        assert_eq!(watchlist().validate(), Ok(()));

        let mut list = watchlist();
        list.items[0].alert.as_mut().unwrap().price = f64::NAN;
        assert_eq!(
            list.validate(),
            Err(WatchlistError::InvalidAlert("AAPL".to_string()))
        );

        let mut list = watchlist();
        list.items[1].price = f64::INFINITY;
        assert_eq!(
            list.validate(),
            Err(WatchlistError::InvalidItem("GOOGL".to_string()))
        );

        let mut list = watchlist();
        let mut dup = list.items[0].clone();
        dup.symbol = "aapl".to_string();
        list.items.push(dup);
        assert_eq!(
            list.validate(),
            Err(WatchlistError::Duplicate("aapl".to_string()))
        );
    }
}
