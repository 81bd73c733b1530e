//! Composite 0-100 scores for insider activity, lobbying, government
//! spending and earnings.

pub mod earnings;
pub mod insider;
pub mod lobbying;
pub mod spending;

use serde::Serialize;
use std::fmt::Display;

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize)]
pub enum ScoreBand {
    StrongSell,
    Sell,
    Neutral,
    Buy,
    StrongBuy,
}

impl ScoreBand {
    pub fn from_score(score: f64) -> Self {
        match score {
            s if s >= 75.0 => ScoreBand::StrongBuy,
            s if s >= 55.0 => ScoreBand::Buy,
            s if s >= 35.0 => ScoreBand::Neutral,
            s if s >= 15.0 => ScoreBand::Sell,
            _ => ScoreBand::StrongSell,
        }
    }

    /// Label for sentiment scores (insider, earnings).
    pub fn signal(&self) -> &'static str {
        match self {
            ScoreBand::StrongBuy => "Strong Buy",
            ScoreBand::Buy => "Buy",
            ScoreBand::Neutral => "Neutral",
            ScoreBand::Sell => "Sell",
            ScoreBand::StrongSell => "Strong Sell",
        }
    }

    /// Label for magnitude scores (lobbying, government spending).
    pub fn level(&self) -> &'static str {
        match self {
            ScoreBand::StrongBuy => "Very High",
            ScoreBand::Buy => "High",
            ScoreBand::Neutral => "Moderate",
            ScoreBand::Sell => "Low",
            ScoreBand::StrongSell => "Minimal",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum Trend {
    Improving,
    Stable,
    Declining,
}

impl Display for Trend {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(match self {
            Trend::Improving => "Improving",
            Trend::Stable => "Stable",
            Trend::Declining => "Declining",
        })
    }
}

/// One input to a composite score. `value` is on the component's own scale,
/// `max` is its ceiling, `weight` its share of the composite.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Component {
    pub name: &'static str,
    pub value: f64,
    pub max: f64,
    pub weight: f64,
}

impl Component {
    fn percent(name: &'static str, value: f64, weight: f64) -> Self {
        Component {
            name,
            value: clamp_score(value),
            max: 100.0,
            weight,
        }
    }

    fn points(name: &'static str, value: f64, max: f64) -> Self {
        Component {
            name,
            value: value.clamp(0.0, max),
            max,
            weight: 1.0,
        }
    }

    pub fn contribution(&self) -> f64 {
        self.value * self.weight
    }
}

pub fn clamp_score(value: f64) -> f64 {
    if value.is_nan() {
        return 0.0;
    }
    value.clamp(0.0, 100.0)
}

/// Maps a ratio in [-1, 1] onto 0-100 with 0 landing on 50.
pub(crate) fn ratio_to_score(ratio: f64) -> f64 {
    clamp_score((ratio * 100.0 + 100.0) / 2.0)
}

pub(crate) fn total(components: &[Component]) -> f64 {
    clamp_score(components.iter().map(Component::contribution).sum())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_band_edges() {
        assert_eq!(ScoreBand::from_score(75.0), ScoreBand::StrongBuy);
        assert_eq!(ScoreBand::from_score(74.9), ScoreBand::Buy);
        assert_eq!(ScoreBand::from_score(55.0), ScoreBand::Buy);
        assert_eq!(ScoreBand::from_score(35.0), ScoreBand::Neutral);
        assert_eq!(ScoreBand::from_score(15.0), ScoreBand::Sell);
        assert_eq!(ScoreBand::from_score(14.9), ScoreBand::StrongSell);
        assert_eq!(ScoreBand::Neutral.level(), "Moderate");
        assert_eq!(ScoreBand::StrongSell.signal(), "Strong Sell");
    }

    #[test]
    fn test_ratio_mapping() {
        assert_eq!(ratio_to_score(-1.0), 0.0);
        assert_eq!(ratio_to_score(0.0), 50.0);
        assert_eq!(ratio_to_score(1.0), 100.0);
        assert_eq!(clamp_score(f64::NAN), 0.0);
    }
}
