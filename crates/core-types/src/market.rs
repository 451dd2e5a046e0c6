use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

/// Quality score at or above which a snapshot is treated as external exchange data.
pub const PRIMARY_QUALITY_THRESHOLD: f64 = 0.95;

/// Quality score assigned to every historical P2P scrape.
pub const SECONDARY_QUALITY_SCORE: f64 = 0.80;

/// One stored market snapshot for the USDT/BOB pair.
///
/// `total_volume` is the amount of USDT on offer in active ads at that moment.
/// It is a stock level, not traded volume.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MarketSnapshot {
    pub timestamp: DateTime<Utc>,
    pub average_sell_price: Decimal,
    pub average_buy_price: Option<Decimal>,
    pub total_volume: Option<Decimal>,
    /// Can be negative when the sell price is below the buy price.
    pub spread_percentage: Option<Decimal>,
    pub num_active_traders: i32,
    pub data_quality_score: f64,
}

impl MarketSnapshot {
    /// Projects the snapshot onto the price/quantity pair the calculators consume.
    ///
    /// A missing volume becomes zero, which the regression estimator rejects.
    pub fn to_observation(&self) -> Observation {
        Observation {
            timestamp: self.timestamp,
            price: self.average_sell_price,
            quantity: self.total_volume.unwrap_or(Decimal::ZERO),
            quality_score: self.data_quality_score,
        }
    }

    pub fn tier(&self) -> Option<SourceTier> {
        SourceTier::of(self.data_quality_score)
    }
}

/// A single price/quantity observation fed to the elasticity calculators.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Observation {
    pub timestamp: DateTime<Utc>,
    pub price: Decimal,
    pub quantity: Decimal,
    pub quality_score: f64,
}

/// Where a snapshot came from, inferred from its quality score.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SourceTier {
    /// External OHLC exchange data.
    Primary,
    /// Historical P2P scrapes kept for visualisation only.
    Secondary,
}

impl SourceTier {
    pub fn of(quality_score: f64) -> Option<Self> {
        if quality_score >= PRIMARY_QUALITY_THRESHOLD {
            Some(SourceTier::Primary)
        } else if (quality_score - SECONDARY_QUALITY_SCORE).abs() < 1e-9 {
            Some(SourceTier::Secondary)
        } else {
            None
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            SourceTier::Primary => "primary",
            SourceTier::Secondary => "secondary",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use rust_decimal_macros::dec;

    #[test]
    fn test_missing_volume_projects_to_zero_quantity() {
        let snapshot = MarketSnapshot {
            timestamp: Utc.with_ymd_and_hms(2025, 11, 3, 12, 0, 0).unwrap(),
            average_sell_price: dec!(9.9500),
            average_buy_price: None,
            total_volume: None,
            spread_percentage: None,
            num_active_traders: 0,
            data_quality_score: 0.95,
        };

        let observation = snapshot.to_observation();
        assert_eq!(observation.price, dec!(9.95));
        assert_eq!(observation.quantity, Decimal::ZERO);
        assert_eq!(snapshot.tier(), Some(SourceTier::Primary));
    }

    #[test]
    fn test_tiers_follow_quality_score() {
        assert_eq!(SourceTier::of(1.0), Some(SourceTier::Primary));
        assert_eq!(SourceTier::of(0.8), Some(SourceTier::Secondary));
        assert_eq!(SourceTier::of(0.5), None);
    }
}
