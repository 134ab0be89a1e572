use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::pair::Pair;
use crate::token::Token;

/// A single executed swap, normalized to display denoms.
///
/// Both amounts must be positive; degenerate swaps are dropped before a
/// `Trade` is ever constructed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Trade {
    pub base: Token,
    pub quote: Token,
    pub time: DateTime<Utc>,
}

impl Trade {
    pub fn new(base: Token, quote: Token, time: DateTime<Utc>) -> Self {
        Self { base, quote, time }
    }

    /// Price of one base unit in quote units, computed fresh on each call.
    pub fn price(&self) -> Decimal {
        self.quote.amount / self.base.amount
    }

    pub fn pair(&self) -> Pair {
        Pair::new(self.base.symbol.clone(), self.quote.symbol.clone())
    }

    /// The same fill seen from the other side of the book.
    pub fn reversed(&self) -> Self {
        Self {
            base: self.quote.clone(),
            quote: self.base.clone(),
            time: self.time,
        }
    }
}
