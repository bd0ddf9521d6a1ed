//! Filter execution strategies
//!
//! A strategy names one way of computing the same filter on the GPU. Samples
//! declare which strategies they support and in which order the overlay lists them.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// GPU execution approach for a filter
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Deserialize, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Strategy {
    /// Straightforward fragment shader over the full kernel
    Default,
    /// Hand-tuned fragment shader
    Optimized,
    /// Compute shader writing into storage images
    Compute,
    /// Two separable fragment passes (horizontal then vertical)
    Linear,
}

impl Strategy {
    /// Every strategy, in declaration order
    pub const ALL: [Strategy; 4] = [Strategy::Default, Strategy::Optimized, Strategy::Compute, Strategy::Linear];

    /// Returns the lowercase name used in manifests and the overlay
    pub fn name(&self) -> &'static str {
        match self {
            Strategy::Default => "default",
            Strategy::Optimized => "optimized",
            Strategy::Compute => "compute",
            Strategy::Linear => "linear",
        }
    }
}

impl fmt::Display for Strategy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for Strategy {
    type Err = StrategyParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "default" | "def" => Ok(Strategy::Default),
            "optimized" | "opt" => Ok(Strategy::Optimized),
            "compute" | "comp" => Ok(Strategy::Compute),
            "linear" => Ok(Strategy::Linear),
            _ => Err(StrategyParseError(s.to_string())),
        }
    }
}

/// Error returned when a strategy name is not recognized
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StrategyParseError(pub String);

impl fmt::Display for StrategyParseError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Unknown strategy '{}' (expected default, optimized, compute or linear)", self.0)
    }
}

impl std::error::Error for StrategyParseError {}

/// How a compute strategy covers the image
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Deserialize, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ComputeDispatch {
    /// Two 1D dispatches, a wide x 1 row pass followed by a 1 x wide column pass
    Separable,
    /// One dispatch over square tiles
    Tiled,
}

impl ComputeDispatch {
    /// Number of dispatches this layout records per frame
    pub fn pass_count(&self) -> u32 {
        match self {
            ComputeDispatch::Separable => 2,
            ComputeDispatch::Tiled => 1,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_strategy_parsing() {
        assert_eq!("default".parse::<Strategy>().unwrap(), Strategy::Default);
        assert_eq!("OPT".parse::<Strategy>().unwrap(), Strategy::Optimized);
        assert_eq!("Compute".parse::<Strategy>().unwrap(), Strategy::Compute);
        assert_eq!("linear".parse::<Strategy>().unwrap(), Strategy::Linear);
        assert!("bicubic".parse::<Strategy>().is_err());
    }

    #[test]
    fn test_strategy_names_round_trip() {
        for strategy in Strategy::ALL {
            assert_eq!(strategy.name().parse::<Strategy>().unwrap(), strategy);
            assert_eq!(strategy.to_string(), strategy.name());
        }
    }

    #[test]
    fn test_compute_dispatch_pass_count() {
        assert_eq!(ComputeDispatch::Separable.pass_count(), 2);
        assert_eq!(ComputeDispatch::Tiled.pass_count(), 1);
    }
}
