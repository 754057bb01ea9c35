// src/auth.rs
use argon2::{
    password_hash::{rand_core::OsRng, PasswordHash, PasswordHasher, PasswordVerifier, SaltString},
    Argon2,
};
use chrono::{Duration, Utc};
use jsonwebtoken::{decode, encode, DecodingKey, EncodingKey, Header, Validation};
use serde::{Deserialize, Serialize};
use std::fmt;

pub const LOGIN_DOMAIN: &str = "trade-pro.com";
const MIN_PASSWORD_LEN: usize = 6;

#[derive(Debug, Serialize, Deserialize)]
pub struct Claims {
    pub sub: String,
    pub exp: usize,
}

#[derive(Debug, PartialEq)]
pub enum AuthError {
    PasswordMismatch,
    PasswordTooShort,
    TermsNotAccepted,
    MissingContactNumber,
    MissingFullName,
    InvalidEmail,
    InvalidCredentials,
    AccountExists,
    Token(String),
    Hash(String),
}

impl fmt::Display for AuthError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AuthError::PasswordMismatch => write!(f, "Passwords do not match"),
            AuthError::PasswordTooShort => write!(
                f,
                "Password must be at least {} characters",
                MIN_PASSWORD_LEN
            ),
            AuthError::TermsNotAccepted => write!(f, "You must agree to the terms"),
            AuthError::MissingContactNumber => write!(f, "A contact number is required"),
            AuthError::MissingFullName => write!(f, "Full name is required"),
            AuthError::InvalidEmail => write!(f, "Email address is not valid"),
            AuthError::InvalidCredentials => write!(
                f,
                "Invalid contact number or password. Please check your credentials."
            ),
            AuthError::AccountExists => {
                write!(f, "An account with this contact number already exists")
            }
            AuthError::Token(msg) => write!(f, "Invalid token: {}", msg),
            AuthError::Hash(msg) => write!(f, "Password hashing failed: {}", msg),
        }
    }
}

impl std::error::Error for AuthError {}

#[derive(Debug, Deserialize)]
pub struct RegisterData {
    /// Optional contact address. Sign-in always goes through the login identifier.
    #[serde(default)]
    pub email: String,
    pub password: String,
    pub confirm_password: String,
    pub full_name: String,
    pub contact_number: String,
    #[serde(default)]
    pub agree_to_terms: bool,
}

impl RegisterData {
    pub fn validate(&self) -> Result<(), AuthError> {
        if self.full_name.trim().is_empty() {
            return Err(AuthError::MissingFullName);
        }
        if !self.contact_number.chars().any(|c| c.is_ascii_digit()) {
            return Err(AuthError::MissingContactNumber);
        }
        let email = self.email.trim();
        if !email.is_empty() && !email.contains('@') {
            return Err(AuthError::InvalidEmail);
        }
        if self.password.chars().count() < MIN_PASSWORD_LEN {
            return Err(AuthError::PasswordTooShort);
        }
        if self.password != self.confirm_password {
            return Err(AuthError::PasswordMismatch);
        }
        if !self.agree_to_terms {
            return Err(AuthError::TermsNotAccepted);
        }
        Ok(())
    }
}

#[derive(Debug, Deserialize)]
pub struct SignInData {
    /// Contact number or username.
    pub login: String,
    pub password: String,
}

fn is_contact_number(handle: &str) -> bool {
    handle.chars().any(|c| c.is_ascii_digit())
        && handle
            .chars()
            .all(|c| c.is_ascii_digit() || matches!(c, '+' | '-' | '.' | '(' | ')' | ' '))
}

/// Maps a contact number or username onto the synthetic login identifier
/// accounts are keyed by, e.g. `+1 (555) 010-0200` -> `15550100200@trade-pro.com`.
pub fn login_identifier(handle: &str) -> String {
    let handle = handle.trim();
    let local: String = if is_contact_number(handle) {
        handle.chars().filter(|c| c.is_ascii_digit()).collect()
    } else {
        handle.to_lowercase()
    };
    format!("{}@{}", local, LOGIN_DOMAIN)
}

pub fn hash_password(password: &str) -> Result<String, AuthError> {
    let salt = SaltString::generate(&mut OsRng);
    Argon2::default()
        .hash_password(password.as_bytes(), &salt)
        .map(|hash| hash.to_string())
        .map_err(|e| AuthError::Hash(e.to_string()))
}

pub fn verify_password(password: &str, stored_hash: &str) -> Result<(), AuthError> {
    let parsed = PasswordHash::new(stored_hash).map_err(|e| AuthError::Hash(e.to_string()))?;
    Argon2::default()
        .verify_password(password.as_bytes(), &parsed)
        .map_err(|_| AuthError::InvalidCredentials)
}

pub fn create_token(user_id: &str, secret: &str, ttl: Duration) -> Result<String, AuthError> {
    let claims = Claims {
        sub: user_id.to_string(),
        exp: (Utc::now() + ttl).timestamp() as usize,
    };
    encode(
        &Header::default(),
        &claims,
        &EncodingKey::from_secret(secret.as_ref()),
    )
    .map_err(|e| AuthError::Token(e.to_string()))
}

/// Returns the user id carried by a valid, unexpired token.
pub fn verify_token(token: &str, secret: &str) -> Result<String, AuthError> {
    decode::<Claims>(
        token,
        &DecodingKey::from_secret(secret.as_ref()),
        &Validation::default(),
    )
    .map(|data| data.claims.sub)
    .map_err(|e| AuthError::Token(e.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn registration() -> RegisterData {
        RegisterData {
            email: "ada@example.com".to_string(),
            password: "hunter22".to_string(),
            confirm_password: "hunter22".to_string(),
            full_name: "Ada Lovelace".to_string(),
            contact_number: "+1 (555) 010-0200".to_string(),
            agree_to_terms: true,
        }
    }

    #[test]
    fn contact_number_maps_to_digits() {
        assert_eq!(
            login_identifier("+1 (555) 010-0200"),
            "15550100200@trade-pro.com"
        );
        assert_eq!(login_identifier(" 555.0100 "), "5550100@trade-pro.com");
    }

    #[test]
    fn username_maps_to_lowercase() {
        assert_eq!(login_identifier("Trader99"), "trader99@trade-pro.com");
        assert_eq!(login_identifier("  ada "), "ada@trade-pro.com");
    }

    #[test]
    fn registration_rules() {
        assert_eq!(registration().validate(), Ok(()));

        let mut r = registration();
        r.confirm_password = "hunter23".to_string();
        assert_eq!(r.validate(), Err(AuthError::PasswordMismatch));

        let mut r = registration();
        r.password = "abc".to_string();
        r.confirm_password = "abc".to_string();
        assert_eq!(r.validate(), Err(AuthError::PasswordTooShort));

        let mut r = registration();
        r.agree_to_terms = false;
        assert_eq!(r.validate(), Err(AuthError::TermsNotAccepted));

        let mut r = registration();
        r.contact_number = "n/a".to_string();
        assert_eq!(r.validate(), Err(AuthError::MissingContactNumber));

        let mut r = registration();
        r.email = "ada.example.com".to_string();
        assert_eq!(r.validate(), Err(AuthError::InvalidEmail));

        let mut r = registration();
        r.email = String::new();
        assert_eq!(r.validate(), Ok(()));
    }

    #[test]
    fn password_hash_verifies_only_the_original() {
        let hash = hash_password("hunter22").unwrap();
        assert!(hash.starts_with("$argon2"));
        assert_eq!(verify_password("hunter22", &hash), Ok(()));
        assert_eq!(
            verify_password("hunter23", &hash),
            Err(AuthError::InvalidCredentials)
        );
    }

    #[test]
    fn token_round_trips_user_id() {
        let token = create_token("user-42", "secret", Duration::hours(1)).unwrap();
        assert_eq!(verify_token(&token, "secret").unwrap(), "user-42");
        assert!(verify_token(&token, "other-secret").is_err());
    }

    #[test]
    fn expired_token_is_rejected() {
        let token = create_token("user-42", "secret", Duration::hours(-2)).unwrap();
        assert!(verify_token(&token, "secret").is_err());
    }
}
