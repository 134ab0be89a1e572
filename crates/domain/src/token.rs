use std::fmt;
use std::sync::LazyLock;

use regex::Regex;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::error::TradingError;

static TOKEN_REGEX: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^([0-9]+(?:\.[0-9]+)?|\.[0-9]+)\s*([a-zA-Z][a-zA-Z0-9/:._-]{2,127})$")
        .expect("token regex is valid")
});

/// A decimal amount of some asset, e.g. `12345uosmo` or `1.5ATOM`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Token {
    pub amount: Decimal,
    pub symbol: String,
}

impl Token {
    pub fn new(amount: Decimal, symbol: impl Into<String>) -> Self {
        Self {
            amount,
            symbol: symbol.into(),
        }
    }

    /// Parses the `<amount><symbol>` wire format, tolerating whitespace
    /// between the two parts.
    pub fn parse(s: &str) -> Result<Self, TradingError> {
        let trimmed = s.trim();
        let captures = TOKEN_REGEX
            .captures(trimmed)
            .ok_or_else(|| TradingError::TokenParse(s.to_string()))?;
        let amount: Decimal = captures[1]
            .parse()
            .map_err(|_| TradingError::AmountParse(captures[1].to_string()))?;
        Ok(Self {
            amount,
            symbol: captures[2].to_string(),
        })
    }

    /// Parses a comma-separated list of token strings.
    pub fn parse_list(s: &str) -> Result<Vec<Self>, TradingError> {
        s.split(',').map(Self::parse).collect()
    }

    /// Shifts the decimal point left by `exponent` places and renames the
    /// token, converting a raw chain denom into its display denom.
    pub fn rebase(&self, exponent: u32, symbol: impl Into<String>) -> Result<Self, TradingError> {
        let symbol = symbol.into();
        let mut amount = self.amount;
        let scale = amount.scale();
        amount
            .set_scale(scale + exponent)
            .map_err(|_| TradingError::RebaseScale {
                symbol: symbol.clone(),
                scale,
                exponent,
            })?;
        Ok(Self { amount, symbol })
    }
}

impl fmt::Display for Token {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}{}", self.amount, self.symbol)
    }
}
