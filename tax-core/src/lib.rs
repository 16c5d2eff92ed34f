pub mod cache;
pub mod calculations;
pub mod config;
pub mod error;
pub mod models;
pub mod source;

pub use calculations::{
    Expression, ExpressionError, MultiplierResolver, SortKey, TaxAggregator, TaxBaseCalculator,
    filter_canton, sort_records,
};
pub use config::EngineConfig;
pub use error::TaxError;
pub use models::*;
pub use source::{RateSource, ScaleSource, SourceError};
