use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::TradingError;

/// Default separator for the `"BASE/QUOTE"` string form.
pub const PAIR_SEPARATOR: &str = "/";

/// An ordered base/quote pair of asset symbols.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Pair {
    pub base: String,
    pub quote: String,
}

impl Pair {
    pub fn new(base: impl Into<String>, quote: impl Into<String>) -> Self {
        Self {
            base: base.into(),
            quote: quote.into(),
        }
    }

    pub fn reversed(&self) -> Self {
        Self {
            base: self.quote.clone(),
            quote: self.base.clone(),
        }
    }

    pub fn with_separator(&self, separator: &str) -> String {
        format!("{}{}{}", self.base, separator, self.quote)
    }

    /// Splits on the first occurrence of `separator`.
    pub fn parse_with_separator(s: &str, separator: &str) -> Result<Self, TradingError> {
        let index = s.find(separator).ok_or_else(|| TradingError::PairFormat {
            value: s.to_string(),
            separator: separator.to_string(),
        })?;
        Ok(Self {
            base: s[..index].to_string(),
            quote: s[index + separator.len()..].to_string(),
        })
    }
}

impl fmt::Display for Pair {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}{}{}", self.base, PAIR_SEPARATOR, self.quote)
    }
}

impl FromStr for Pair {
    type Err = TradingError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse_with_separator(s, PAIR_SEPARATOR)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn string_form() {
        let pair = Pair::new("ATOM", "USDC");
        assert_eq!(pair.to_string(), "ATOM/USDC");
    }

    #[test]
    fn parse_round_trip() {
        let pair: Pair = "ATOM/USDC".parse().unwrap();
        assert_eq!(pair, Pair::new("ATOM", "USDC"));
    }

    #[test]
    fn parse_splits_on_first_separator() {
        let pair: Pair = "ATOM/USDC.axl".parse().unwrap();
        assert_eq!(pair.quote, "USDC.axl");
    }

    #[test]
    fn parse_rejects_missing_separator() {
        assert!(matches!(
            "ATOMUSDC".parse::<Pair>(),
            Err(TradingError::PairFormat { .. })
        ));
    }

    #[test]
    fn reversed_swaps_sides() {
        let pair = Pair::new("ATOM", "USDC");
        assert_eq!(pair.reversed(), Pair::new("USDC", "ATOM"));
        assert_eq!(pair.reversed().reversed(), pair);
    }

    #[test]
    fn custom_separator() {
        let pair = Pair::parse_with_separator("ATOM-USDC", "-").unwrap();
        assert_eq!(pair.with_separator("-"), "ATOM-USDC");
    }
}
