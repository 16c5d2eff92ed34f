use std::fmt;

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use super::{Authority, Canton, EntityClass, TaxType};
use crate::calculations::expression::Expression;

/// Bracket encodings found across scale exports.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ScaleVariant {
    /// Threshold, marginal rate and cumulative base amount per row.
    BaseAmount,
    /// Width of each bracket and its marginal rate; thresholds and bases
    /// are derived by cumulative summation.
    Incremental,
    /// One proportional rate.
    Flat,
    /// Threshold and a textual formula over the net worth.
    Formula,
}

impl ScaleVariant {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::BaseAmount => "base_amount",
            Self::Incremental => "incremental",
            Self::Flat => "flat",
            Self::Formula => "formula",
        }
    }
}

impl fmt::Display for ScaleVariant {
    fn fmt(
        &self,
        f: &mut fmt::Formatter<'_>,
    ) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum ScaleBracket {
    BaseAmount {
        threshold: Decimal,
        marginal_rate: Decimal,
        base_amount: Decimal,
    },
    Incremental {
        delta_to_next_threshold: Decimal,
        marginal_rate: Decimal,
    },
    Flat {
        rate: Decimal,
    },
    Formula {
        threshold: Decimal,
        expression: Option<Expression>,
    },
}

impl ScaleBracket {
    pub fn variant(&self) -> ScaleVariant {
        match self {
            Self::BaseAmount { .. } => ScaleVariant::BaseAmount,
            Self::Incremental { .. } => ScaleVariant::Incremental,
            Self::Flat { .. } => ScaleVariant::Flat,
            Self::Formula { .. } => ScaleVariant::Formula,
        }
    }
}

/// One normalized row of a scale export.
#[derive(Debug, Clone, PartialEq)]
pub struct ScaleRow {
    pub canton_id: i64,
    pub canton: String,
    pub tax_type: String,
    pub taxable_entity: String,
    pub tax_authority: String,
    pub bracket: ScaleBracket,
}

impl ScaleRow {
    pub fn is_for_entity(
        &self,
        entity: EntityClass,
    ) -> bool {
        entity.matches_label(&self.taxable_entity)
    }

    pub fn is_for_authority(
        &self,
        authority: Authority,
    ) -> bool {
        authority.matches_label(&self.tax_authority)
    }
}

/// A normalized scale export for one canton, tax type and fiscal year.
///
/// Built through [`ScaleTable::new`], which rejects empty tables and rows
/// whose encoding differs from the table's variant.
#[derive(Debug, Clone, PartialEq)]
pub struct ScaleTable {
    canton: Canton,
    tax_type: TaxType,
    fiscal_year: i32,
    variant: ScaleVariant,
    rows: Vec<ScaleRow>,
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ScaleTableError {
    #[error("scale table has no rows")]
    Empty,

    #[error("row {row} is encoded as {found}, table variant is {expected}")]
    MixedVariants {
        row: usize,
        expected: ScaleVariant,
        found: ScaleVariant,
    },
}

impl ScaleTable {
    pub fn new(
        canton: Canton,
        tax_type: TaxType,
        fiscal_year: i32,
        variant: ScaleVariant,
        rows: Vec<ScaleRow>,
    ) -> Result<Self, ScaleTableError> {
        if rows.is_empty() {
            return Err(ScaleTableError::Empty);
        }
        if let Some((row, found)) = rows
            .iter()
            .map(|r| r.bracket.variant())
            .enumerate()
            .find(|(_, v)| *v != variant)
        {
            return Err(ScaleTableError::MixedVariants {
                row,
                expected: variant,
                found,
            });
        }

        Ok(Self {
            canton,
            tax_type,
            fiscal_year,
            variant,
            rows,
        })
    }

    pub fn canton(&self) -> Canton {
        self.canton
    }

    pub fn tax_type(&self) -> TaxType {
        self.tax_type
    }

    /// Year of the export the table was read from.
    pub fn fiscal_year(&self) -> i32 {
        self.fiscal_year
    }

    pub fn variant(&self) -> ScaleVariant {
        self.variant
    }

    pub fn rows(&self) -> &[ScaleRow] {
        &self.rows
    }
}

#[cfg(test)]
mod tests {
    use pretty_assertions::assert_eq;
    use rust_decimal_macros::dec;

    use super::*;

    fn row(bracket: ScaleBracket) -> ScaleRow {
        ScaleRow {
            canton_id: 26,
            canton: "ZH".to_string(),
            tax_type: "Income tax".to_string(),
            taxable_entity: "All".to_string(),
            tax_authority: "Canton".to_string(),
            bracket,
        }
    }

    #[test]
    fn rejects_empty_tables() {
        let err = ScaleTable::new(
            Canton::Zurich,
            TaxType::Income,
            2024,
            ScaleVariant::Flat,
            vec![],
        )
        .expect_err("empty table");

        assert_eq!(err, ScaleTableError::Empty);
    }

    #[test]
    fn rejects_rows_of_another_encoding() {
        let rows = vec![
            row(ScaleBracket::Flat { rate: dec!(0.01) }),
            row(ScaleBracket::Incremental {
                delta_to_next_threshold: dec!(1000),
                marginal_rate: dec!(0.02),
            }),
        ];

        let err = ScaleTable::new(
            Canton::Zurich,
            TaxType::Income,
            2024,
            ScaleVariant::Flat,
            rows,
        )
        .expect_err("mixed encodings");

        assert_eq!(
            err,
            ScaleTableError::MixedVariants {
                row: 1,
                expected: ScaleVariant::Flat,
                found: ScaleVariant::Incremental,
            }
        );
    }

    #[test]
    fn label_matching_uses_the_multilingual_sets() {
        let r = row(ScaleBracket::Flat { rate: dec!(0.01) });

        assert!(r.is_for_entity(EntityClass::All));
        assert!(!r.is_for_entity(EntityClass::Single));
        assert!(r.is_for_authority(Authority::Canton));
        assert!(!r.is_for_authority(Authority::Federal));
    }
}
