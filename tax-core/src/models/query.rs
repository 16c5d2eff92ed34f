use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use super::{Authority, Canton, EntityClass, TaxType};
use crate::error::TaxError;

/// Inputs of a single tax-base lookup.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TaxQuery {
    pub net_worth: Decimal,
    pub canton: Canton,
    pub tax_type: TaxType,
    pub entity_class: EntityClass,
    pub authority: Authority,
    pub fiscal_year: i32,
}

impl TaxQuery {
    /// Rejects queries that can never be answered, before any table is read.
    pub fn validate(&self) -> Result<(), TaxError> {
        if self.net_worth.is_sign_negative() && !self.net_worth.is_zero() {
            return Err(TaxError::InvalidArgument(format!(
                "net worth must not be negative, got {}",
                self.net_worth
            )));
        }
        Ok(())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TaxResult {
    pub query: TaxQuery,
    pub base_amount: Decimal,
}
