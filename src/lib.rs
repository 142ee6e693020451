//! Technical indicators over historical price bars from a market data
//! provider's REST API.
//!
//! The indicator core ([`preprocess`] and [`indicator`]) is pure: it turns a
//! validated price series into date-aligned output channels or a typed
//! [`error::IndicatorError`]. [`provider`] fetches the series, [`table`]
//! formats results for display.

pub mod config;
pub mod error;
pub mod indicator;
pub mod model;
pub mod preprocess;
pub mod provider;
pub mod table;
