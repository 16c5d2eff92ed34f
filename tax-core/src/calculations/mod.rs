//! Calculation components of the net-worth tax engine.
//!
//! * [`base`] turns a scale export into a tax base for one net worth.
//! * [`multipliers`] finds a commune's multipliers in the rates export.
//! * [`aggregate`] combines both into per-commune liabilities.

pub mod aggregate;
pub mod base;
pub mod common;
pub mod expression;
pub mod multipliers;

pub use aggregate::{SortKey, TaxAggregator, filter_canton, sort_records};
pub use base::{Brackets, PreparedScale, Step, TaxBaseCalculator};
pub use expression::{Expression, ExpressionError};
pub use multipliers::MultiplierResolver;
