//! Fixed-point money helpers
//!
//! All monetary math in the back office runs on `rust_decimal::Decimal`.
//! This module holds the currency list and the VAT extraction used by the
//! ledger poster, so that rounding happens in exactly one place.

use rust_decimal::{Decimal, RoundingStrategy};
use rust_decimal_macros::dec;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use thiserror::Error;

/// Currency codes following ISO 4217
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "UPPERCASE")]
pub enum Currency {
    #[default]
    TRY,
    USD,
    EUR,
    GBP,
}

impl Currency {
    /// Returns the number of decimal places for this currency
    pub fn decimal_places(&self) -> u32 {
        2
    }

    /// Returns the currency symbol
    pub fn symbol(&self) -> &'static str {
        match self {
            Currency::TRY => "₺",
            Currency::USD => "$",
            Currency::EUR => "€",
            Currency::GBP => "£",
        }
    }

    /// Returns the ISO 4217 code
    pub fn code(&self) -> &'static str {
        match self {
            Currency::TRY => "TRY",
            Currency::USD => "USD",
            Currency::EUR => "EUR",
            Currency::GBP => "GBP",
        }
    }
}

impl fmt::Display for Currency {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.code())
    }
}

impl FromStr for Currency {
    type Err = MoneyError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_uppercase().as_str() {
            "TRY" | "TL" => Ok(Currency::TRY),
            "USD" => Ok(Currency::USD),
            "EUR" => Ok(Currency::EUR),
            "GBP" => Ok(Currency::GBP),
            other => Err(MoneyError::UnknownCurrency(other.to_string())),
        }
    }
}

/// Errors that can occur during money operations
#[derive(Debug, Error, PartialEq, Eq)]
pub enum MoneyError {
    #[error("Unknown currency: {0}")]
    UnknownCurrency(String),

    #[error("Invalid amount: {0}")]
    InvalidAmount(String),

    #[error("Invalid VAT rate: {0}")]
    InvalidRate(Decimal),
}

/// Rounds an amount to the minor unit of the currency (half away from zero)
pub fn round_minor(amount: Decimal, currency: Currency) -> Decimal {
    amount.round_dp_with_strategy(currency.decimal_places(), RoundingStrategy::MidpointAwayFromZero)
}

/// A VAT rate expressed as a percentage (20 means 20%)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct VatRate(Decimal);

impl VatRate {
    /// The standard Turkish VAT rate applied when a sale carries no rate
    pub const STANDARD: VatRate = VatRate(dec!(20));

    /// Creates a rate from a percentage value
    ///
    /// # Errors
    ///
    /// Returns `MoneyError::InvalidRate` for negative rates
    pub fn from_percentage(percentage: Decimal) -> Result<Self, MoneyError> {
        if percentage.is_sign_negative() && !percentage.is_zero() {
            return Err(MoneyError::InvalidRate(percentage));
        }
        Ok(Self(percentage))
    }

    /// Returns the rate as a percentage
    pub fn as_percentage(&self) -> Decimal {
        self.0
    }

    /// Extracts net and VAT from a VAT-inclusive gross amount
    ///
    /// `net = gross / (1 + rate/100)`, `vat = gross - net`. The net part is
    /// rounded to the currency's minor unit and VAT takes the remainder, so
    /// `net + vat == gross` always holds exactly.
    pub fn split_gross(&self, gross: Decimal, currency: Currency) -> VatSplit {
        let divisor = Decimal::ONE + self.0 / dec!(100);
        let net = round_minor(gross / divisor, currency);
        VatSplit {
            gross,
            net,
            vat: gross - net,
        }
    }
}

impl Default for VatRate {
    fn default() -> Self {
        Self::STANDARD
    }
}

impl fmt::Display for VatRate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}%", self.0)
    }
}

/// Result of splitting a gross amount into net and VAT
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct VatSplit {
    pub gross: Decimal,
    pub net: Decimal,
    pub vat: Decimal,
}
