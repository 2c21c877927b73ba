//! Indicator module
//!
//! - `base`: shared trait for trailing indicators
//! - `tracker`: rolling emotional volatility per group
//! - `trend`: least-squares trend with significance
//! - `patterns`: swings, stability runs, extremes, crisis windows

pub mod base;
pub mod patterns;
pub mod tracker;
pub mod trend;
