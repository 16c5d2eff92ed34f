use std::collections::BTreeMap;

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

/// Tax kinds that carry a multiplier column in the rates export.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LevyTax {
    Income,
    Assets,
    Profit,
    Capital,
}

/// Body a multiplier column belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LevyBody {
    Canton,
    Commune,
    Protestant,
    RomanCatholic,
    ChristCatholic,
    Church,
}

/// Multiplier columns of the rates export, in file order.
pub const MULTIPLIER_COLUMNS: [(LevyTax, LevyBody); 16] = [
    (LevyTax::Income, LevyBody::Canton),
    (LevyTax::Income, LevyBody::Commune),
    (LevyTax::Income, LevyBody::Protestant),
    (LevyTax::Income, LevyBody::RomanCatholic),
    (LevyTax::Income, LevyBody::ChristCatholic),
    (LevyTax::Assets, LevyBody::Canton),
    (LevyTax::Assets, LevyBody::Commune),
    (LevyTax::Assets, LevyBody::Protestant),
    (LevyTax::Assets, LevyBody::RomanCatholic),
    (LevyTax::Assets, LevyBody::ChristCatholic),
    (LevyTax::Profit, LevyBody::Canton),
    (LevyTax::Profit, LevyBody::Commune),
    (LevyTax::Profit, LevyBody::Church),
    (LevyTax::Capital, LevyBody::Canton),
    (LevyTax::Capital, LevyBody::Commune),
    (LevyTax::Capital, LevyBody::Church),
];

/// One commune of the rates export.
///
/// Multipliers are fractions (the export's percentages divided by 100).
/// Blank export cells have no entry.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RateRow {
    pub canton_id: i64,
    pub canton: String,
    pub commune_id: i64,
    pub commune: String,
    pub multipliers: BTreeMap<(LevyTax, LevyBody), Decimal>,
}

impl RateRow {
    pub fn multiplier(
        &self,
        tax: LevyTax,
        body: LevyBody,
    ) -> Option<Decimal> {
        self.multipliers.get(&(tax, body)).copied()
    }
}

/// All communes of one fiscal year's rates export, in file order.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RateTable {
    pub fiscal_year: i32,
    pub rows: Vec<RateRow>,
}

impl RateTable {
    /// First row whose commune name contains `commune` (case-sensitive).
    pub fn find_commune(
        &self,
        commune: &str,
    ) -> Option<&RateRow> {
        self.rows.iter().find(|row| row.commune.contains(commune))
    }
}
