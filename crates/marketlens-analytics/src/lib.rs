//! Analytical pipelines for marketlens.
//!
//! This crate contains:
//! - The volatility level estimator (ARCH-family fit + level ladder + merge)
//! - The market-regime detector (feature engineering + Gaussian HMM)
//! - Shared rolling statistics and cooperative cancellation

pub mod cancel;
pub mod regime;
pub mod rolling;
pub mod volatility;

pub use cancel::CancelFlag;
pub use regime::{FeatureRow, RegimeDetector, RegimeRow};
pub use volatility::{LevelEstimator, LevelPair, LeveledBar, MergedRow};
