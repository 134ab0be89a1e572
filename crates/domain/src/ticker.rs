use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

/// Rolling 24h summary for one pair, derived from its candle window.
///
/// Never persisted; recomputed whenever the underlying window changes.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Ticker {
    pub base_asset: String,
    pub quote_asset: String,
    pub base_volume: Decimal,
    pub quote_volume: Decimal,
    pub price: Decimal,
    pub time: DateTime<Utc>,
}

impl Ticker {
    /// The same summary seen from the other side of the pair.
    pub fn reversed(&self) -> Self {
        let price = if self.price.is_zero() {
            Decimal::ZERO
        } else {
            Decimal::ONE / self.price
        };
        Self {
            base_asset: self.quote_asset.clone(),
            quote_asset: self.base_asset.clone(),
            base_volume: self.quote_volume,
            quote_volume: self.base_volume,
            price,
            time: self.time,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use rust_decimal_macros::dec;

    fn ticker() -> Ticker {
        Ticker {
            base_asset: "ATOM".to_string(),
            quote_asset: "USDC".to_string(),
            base_volume: dec!(10),
            quote_volume: dec!(80),
            price: dec!(8),
            time: Utc.with_ymd_and_hms(2023, 5, 1, 12, 0, 0).unwrap(),
        }
    }

    #[test]
    fn reversed_swaps_assets_and_volumes() {
        let r = ticker().reversed();
        assert_eq!(r.base_asset, "USDC");
        assert_eq!(r.quote_asset, "ATOM");
        assert_eq!(r.base_volume, dec!(80));
        assert_eq!(r.quote_volume, dec!(10));
        assert_eq!(r.price, dec!(0.125));
    }

    #[test]
    fn reversed_zero_price_stays_zero() {
        let mut t = ticker();
        t.price = Decimal::ZERO;
        assert_eq!(t.reversed().price, Decimal::ZERO);
    }

    #[test]
    fn reversed_round_trip() {
        let t = ticker();
        assert_eq!(t.reversed().reversed(), t);
    }
}
