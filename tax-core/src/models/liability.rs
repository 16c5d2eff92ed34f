use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::calculations::common::round_half_up;

/// Tax owed in one commune for a given income and assets figure.
///
/// Components are rounded to cents before the total is formed, so
/// `total == income_tax + assets_tax + federal_tax` holds exactly.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LiabilityRecord {
    pub canton_id: i64,
    pub canton: String,
    pub commune_id: i64,
    pub commune: String,
    pub federal_tax: Decimal,
    pub income_tax: Decimal,
    pub assets_tax: Decimal,
    pub total: Decimal,
}

/// Unrounded per-commune amounts before they are frozen into a record.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LiabilityParts {
    pub cantonal_income_tax: Decimal,
    pub communal_income_tax: Decimal,
    pub cantonal_assets_tax: Decimal,
    pub communal_assets_tax: Decimal,
    pub federal_tax: Decimal,
}

impl LiabilityRecord {
    pub fn new(
        canton_id: i64,
        canton: impl Into<String>,
        commune_id: i64,
        commune: impl Into<String>,
        parts: &LiabilityParts,
    ) -> Self {
        let income_tax = round_half_up(parts.cantonal_income_tax + parts.communal_income_tax);
        let assets_tax = round_half_up(parts.cantonal_assets_tax + parts.communal_assets_tax);
        let federal_tax = round_half_up(parts.federal_tax);

        Self {
            canton_id,
            canton: canton.into(),
            commune_id,
            commune: commune.into(),
            federal_tax,
            income_tax,
            assets_tax,
            total: income_tax + assets_tax + federal_tax,
        }
    }
}
