use thiserror::Error;

use crate::calculations::expression::ExpressionError;
use crate::models::{Authority, Canton, EntityClass, TaxType};
use crate::source::SourceError;

/// Errors surfaced by the calculation engine.
#[derive(Debug, Error)]
pub enum TaxError {
    /// An input outside its enumerated set or range. Raised before any
    /// table is read.
    #[error("invalid argument: {0}")]
    InvalidArgument(String),

    /// No export of the given kind exists between the requested year and
    /// the floor year.
    #[error("no {what} export found for {from_year} down to {floor_year}")]
    MissingData {
        what: String,
        from_year: i32,
        floor_year: i32,
    },

    /// No scale export exists for the canton and tax type between the
    /// requested year and the floor year.
    #[error("no {tax_type} scale for {canton} from {from_year} down to {floor_year}")]
    NoScaleData {
        canton: Canton,
        tax_type: TaxType,
        from_year: i32,
        floor_year: i32,
    },

    /// A scale was found but no row survives entity and authority
    /// filtering, fallbacks included.
    #[error(
        "no {tax_type} bracket in the {fiscal_year} {canton} scale for entity '{entity_class}' and authority '{authority}'"
    )]
    NoMatchingBracket {
        canton: Canton,
        tax_type: TaxType,
        entity_class: EntityClass,
        authority: Authority,
        fiscal_year: i32,
    },

    #[error("formula evaluation failed: {0}")]
    Expression(#[from] ExpressionError),

    #[error("data source error: {0}")]
    Source(#[from] SourceError),
}
