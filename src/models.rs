// src/models.rs
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// A single owned position. Derived figures are computed, never stored.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Holding {
    pub symbol: String,
    pub name: String,
    pub quantity: f64,
    pub avg_cost: f64,
    pub current_price: f64,
    /// Percent share of the portfolio, supplied by the caller.
    #[serde(default)]
    pub allocation: f64,
}

impl Holding {
    pub fn total_value(&self) -> f64 {
        self.quantity * self.current_price
    }

    pub fn cost_basis(&self) -> f64 {
        self.quantity * self.avg_cost
    }

    pub fn gain_loss(&self) -> f64 {
        self.total_value() - self.cost_basis()
    }

    pub fn gain_loss_percent(&self) -> f64 {
        let basis = self.cost_basis();
        if basis == 0.0 {
            0.0
        } else {
            self.gain_loss() / basis * 100.0
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Portfolio {
    pub user_id: String,
    pub holdings: Vec<Holding>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UserProfile {
    pub id: String,
    pub full_name: Option<String>,
    pub contact_number: Option<String>,
    pub avatar_url: Option<String>,
    pub email: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Default, Deserialize)]
pub struct ProfileUpdate {
    pub full_name: Option<String>,
    pub contact_number: Option<String>,
    pub avatar_url: Option<String>,
}

impl UserProfile {
    pub fn apply(&mut self, update: ProfileUpdate, now: DateTime<Utc>) {
        if let Some(full_name) = update.full_name {
            self.full_name = Some(full_name);
        }
        if let Some(contact_number) = update.contact_number {
            self.contact_number = Some(contact_number);
        }
        if let Some(avatar_url) = update.avatar_url {
            self.avatar_url = Some(avatar_url);
        }
        self.updated_at = now;
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Theme {
    Light,
    Dark,
}

impl Theme {
    pub fn as_str(&self) -> &'static str {
        match self {
            Theme::Light => "light",
            Theme::Dark => "dark",
        }
    }

    pub fn parse(s: &str) -> Option<Theme> {
        match s {
            "light" => Some(Theme::Light),
            "dark" => Some(Theme::Dark),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UserSettings {
    pub user_id: String,
    pub theme: Theme,
    pub language: String,
    pub currency: String,
    pub notifications_enabled: bool,
    pub email_notifications: bool,
    pub sms_notifications: bool,
    pub two_factor_enabled: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl UserSettings {
    pub fn defaults(user_id: &str, now: DateTime<Utc>) -> Self {
        UserSettings {
            user_id: user_id.to_string(),
            theme: Theme::Dark,
            language: "en".to_string(),
            currency: "USD".to_string(),
            notifications_enabled: true,
            email_notifications: true,
            sms_notifications: false,
            two_factor_enabled: false,
            created_at: now,
            updated_at: now,
        }
    }

    pub fn apply(&mut self, update: SettingsUpdate, now: DateTime<Utc>) {
        if let Some(theme) = update.theme {
            self.theme = theme;
        }
        if let Some(language) = update.language {
            self.language = language;
        }
        if let Some(currency) = update.currency {
            self.currency = currency;
        }
        if let Some(v) = update.notifications_enabled {
            self.notifications_enabled = v;
        }
        if let Some(v) = update.email_notifications {
            self.email_notifications = v;
        }
        if let Some(v) = update.sms_notifications {
            self.sms_notifications = v;
        }
        if let Some(v) = update.two_factor_enabled {
            self.two_factor_enabled = v;
        }
        self.updated_at = now;
    }
}

#[derive(Debug, Default, Deserialize)]
pub struct SettingsUpdate {
    pub theme: Option<Theme>,
    pub language: Option<String>,
    pub currency: Option<String>,
    pub notifications_enabled: Option<bool>,
    pub email_notifications: Option<bool>,
    pub sms_notifications: Option<bool>,
    pub two_factor_enabled: Option<bool>,
}
