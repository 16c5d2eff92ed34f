use thiserror::Error;

use crate::models::{Canton, RateTable, ScaleTable, TaxType};

#[derive(Debug, Error)]
pub enum SourceError {
    #[error("cannot read export '{location}': {reason}")]
    Unreadable { location: String, reason: String },

    #[error("malformed export '{location}': {reason}")]
    Malformed { location: String, reason: String },
}

/// Provider of normalized scale tables.
///
/// Implementations answer for exactly the requested fiscal year and return
/// `Ok(None)` when no export exists for it; year fallback is the caller's
/// job.
pub trait ScaleSource: Send + Sync {
    fn scale_table(
        &self,
        canton: Canton,
        tax_type: TaxType,
        fiscal_year: i32,
    ) -> Result<Option<ScaleTable>, SourceError>;
}

/// Provider of per-commune multiplier tables, one per fiscal year.
pub trait RateSource: Send + Sync {
    fn rate_table(
        &self,
        fiscal_year: i32,
    ) -> Result<Option<RateTable>, SourceError>;
}
