//! Raw form input as submitted by the screens, and its conversion into request bodies.
//!
//! Conversions returning `Ok(None)` mean the form was left incomplete; the action is
//! then skipped without contacting the backend.

use serde::Deserialize;
use validator::{Validate, ValidationErrors};

use crate::portfolio::{NewStock, StockUpdate};
use crate::user::{Credentials, Registration};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FormError(String);

impl FormError {
    #[must_use]
    pub fn new(message: impl Into<String>) -> Self {
        Self(message.into())
    }
}

impl std::fmt::Display for FormError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

impl std::error::Error for FormError {}

impl From<ValidationErrors> for FormError {
    fn from(errors: ValidationErrors) -> Self {
        let mut messages: Vec<(String, String)> = errors
            .field_errors()
            .into_iter()
            .flat_map(|(field, errors)| {
                errors.iter().map(move |error| {
                    let message = error
                        .message
                        .as_ref()
                        .map_or_else(|| format!("{field} is invalid"), ToString::to_string);
                    (field.to_string(), message)
                })
            })
            .collect();
        messages.sort();
        FormError(
            messages
                .into_iter()
                .map(|(_, message)| message)
                .collect::<Vec<_>>()
                .join("; "),
        )
    }
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct LoginForm {
    pub email: String,
    pub password: String,
}

impl LoginForm {
    #[must_use]
    pub fn credentials(&self) -> Credentials {
        Credentials::new(self.email.clone(), self.password.clone())
    }
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct RegisterForm {
    pub username: String,
    pub email: String,
    pub password: String,
}

impl RegisterForm {
    /// # Errors
    /// - `FormError` listing every field outside its limits
    pub fn registration(&self) -> Result<Registration, FormError> {
        let registration = Registration {
            username: self.username.trim().to_string(),
            email: self.email.trim().to_string(),
            password: self.password.clone(),
        };
        registration.validate()?;
        Ok(registration)
    }
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct PortfolioForm {
    pub name: String,
}

impl PortfolioForm {
    /// Trimmed name, `None` when blank
    /// # Errors
    /// - `FormError` when the name is longer than 50 characters
    pub fn name(&self) -> Result<Option<String>, FormError> {
        let name = self.name.trim();
        if name.is_empty() {
            return Ok(None);
        }
        if name.chars().count() > 50 {
            return Err(FormError::new("Portfolio name must be 1 to 50 characters"));
        }
        Ok(Some(name.to_string()))
    }
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct StockForm {
    pub symbol: String,
    pub shares: String,
    pub average_price: String,
}

impl StockForm {
    /// # Errors
    /// - `FormError` when a number does not parse or a value is out of range
    pub fn new_stock(&self) -> Result<Option<NewStock>, FormError> {
        let symbol = self.symbol.trim();
        if symbol.is_empty() || self.shares.trim().is_empty() || self.average_price.trim().is_empty()
        {
            return Ok(None);
        }
        let stock = NewStock {
            symbol: symbol.to_uppercase(),
            shares: parse_amount("Shares", &self.shares)?,
            average_price: parse_amount("Average price", &self.average_price)?,
        };
        stock.validate()?;
        Ok(Some(stock))
    }
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct HoldingForm {
    pub shares: String,
    pub average_price: String,
}

impl HoldingForm {
    /// # Errors
    /// - `FormError` when a number does not parse or a value is out of range
    pub fn stock_update(&self) -> Result<Option<StockUpdate>, FormError> {
        if self.shares.trim().is_empty() || self.average_price.trim().is_empty() {
            return Ok(None);
        }
        let update = StockUpdate {
            shares: parse_amount("Shares", &self.shares)?,
            average_price: parse_amount("Average price", &self.average_price)?,
        };
        update.validate()?;
        Ok(Some(update))
    }
}

fn parse_amount(label: &str, raw: &str) -> Result<f64, FormError> {
    raw.trim()
        .parse::<f64>()
        .ok()
        .filter(|value| value.is_finite())
        .ok_or_else(|| FormError::new(format!("{label} must be a number")))
}
