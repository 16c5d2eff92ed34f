//! Normalization of scale exports.
//!
//! Scale exports come in four encodings that differ only in the columns
//! after the common prefix
//! `canton_id, canton, tax_type, taxable_entity, tax_authority`:
//!
//! | variant     | columns | after the prefix                 |
//! |-------------|---------|----------------------------------|
//! | BaseAmount  | 8       | threshold, rate %, base amount   |
//! | Incremental | 7       | delta to next threshold, rate %  |
//! | Flat        | 6       | rate %                           |
//! | Formula     | 7       | threshold, formula               |
//!
//! The dump carries no marker for its encoding, so [`VariantClassifier`]
//! tries the layouts in the order above and keeps the first one whose
//! column count and cell conversions all succeed.

use std::io::Read;

use tax_core::calculations::common::percent_to_fraction;
use tax_core::models::{Canton, ScaleBracket, ScaleRow, ScaleTable, ScaleVariant, TaxType};
use tax_core::Expression;
use tracing::{debug, info};

use crate::error::ExportError;
use crate::raw::{
    RawRow, RawTable, optional_decimal, parse_id, required, required_decimal, text,
};

const PREFIX_COLUMNS: usize = 5;

type BracketParser = fn(&[Option<String>]) -> Result<ScaleBracket, String>;

/// One candidate encoding: its variant, total column count and the parser
/// for the cells after the prefix.
pub struct Layout {
    pub variant: ScaleVariant,
    pub columns: usize,
    parse_bracket: BracketParser,
}

/// Candidate layouts in trial order.
pub const LAYOUTS: [Layout; 4] = [
    Layout {
        variant: ScaleVariant::BaseAmount,
        columns: 8,
        parse_bracket: base_amount_bracket,
    },
    Layout {
        variant: ScaleVariant::Incremental,
        columns: 7,
        parse_bracket: incremental_bracket,
    },
    Layout {
        variant: ScaleVariant::Flat,
        columns: 6,
        parse_bracket: flat_bracket,
    },
    Layout {
        variant: ScaleVariant::Formula,
        columns: 7,
        parse_bracket: formula_bracket,
    },
];

fn base_amount_bracket(cells: &[Option<String>]) -> Result<ScaleBracket, String> {
    Ok(ScaleBracket::BaseAmount {
        threshold: required_decimal(&cells[0], "threshold")?,
        marginal_rate: percent_to_fraction(required_decimal(&cells[1], "rate")?),
        base_amount: optional_decimal(&cells[2], "base amount")?,
    })
}

fn incremental_bracket(cells: &[Option<String>]) -> Result<ScaleBracket, String> {
    Ok(ScaleBracket::Incremental {
        delta_to_next_threshold: optional_decimal(&cells[0], "delta to next threshold")?,
        marginal_rate: percent_to_fraction(required_decimal(&cells[1], "rate")?),
    })
}

fn flat_bracket(cells: &[Option<String>]) -> Result<ScaleBracket, String> {
    Ok(ScaleBracket::Flat {
        rate: percent_to_fraction(required_decimal(&cells[0], "rate")?),
    })
}

fn formula_bracket(cells: &[Option<String>]) -> Result<ScaleBracket, String> {
    let expression = match &cells[1] {
        Some(formula) => {
            Some(Expression::parse(formula).map_err(|e| format!("formula '{formula}': {e}"))?)
        }
        None => None,
    };
    Ok(ScaleBracket::Formula {
        threshold: required_decimal(&cells[0], "threshold")?,
        expression,
    })
}

impl Layout {
    fn parse_rows(
        &self,
        rows: &[RawRow],
    ) -> Result<Vec<ScaleRow>, String> {
        rows.iter()
            .enumerate()
            .map(|(i, cells)| {
                if cells.len() != self.columns {
                    return Err(format!(
                        "expected {} columns, found {}",
                        self.columns,
                        cells.len()
                    ));
                }
                self.parse_row(cells).map_err(|e| format!("row {i}: {e}"))
            })
            .collect()
    }

    fn parse_row(
        &self,
        cells: &[Option<String>],
    ) -> Result<ScaleRow, String> {
        Ok(ScaleRow {
            canton_id: parse_id(required(&cells[0], "canton id")?)?,
            canton: text(&cells[1]),
            tax_type: text(&cells[2]),
            taxable_entity: text(&cells[3]),
            tax_authority: text(&cells[4]),
            bracket: (self.parse_bracket)(&cells[PREFIX_COLUMNS..])?,
        })
    }
}

/// Detects the encoding of a cropped scale dump.
pub struct VariantClassifier;

impl VariantClassifier {
    /// Rows of `table` under the first layout that accepts all of them.
    pub fn classify(table: &RawTable) -> Result<(ScaleVariant, Vec<ScaleRow>), ExportError> {
        let mut attempts = Vec::with_capacity(LAYOUTS.len());

        for layout in &LAYOUTS {
            match layout.parse_rows(table.rows()) {
                Ok(rows) => return Ok((layout.variant, rows)),
                Err(reason) => {
                    debug!(variant = %layout.variant, %reason, "layout rejected");
                    attempts.push((layout.variant, reason));
                }
            }
        }

        Err(ExportError::UnrecognizedLayout { attempts })
    }
}

/// Loader for scale exports of one canton and tax type.
pub struct ScaleTableNormalizer;

impl ScaleTableNormalizer {
    /// Parse a scale dump from any reader (a file or a string slice).
    pub fn parse<R: Read>(
        reader: R,
        canton: Canton,
        tax_type: TaxType,
        fiscal_year: i32,
    ) -> Result<ScaleTable, ExportError> {
        let raw = RawTable::from_reader(reader)?;
        Self::normalize(raw, canton, tax_type, fiscal_year)
    }

    /// Crops the metadata and blank cells, classifies the encoding and
    /// casts every row.
    pub fn normalize(
        raw: RawTable,
        canton: Canton,
        tax_type: TaxType,
        fiscal_year: i32,
    ) -> Result<ScaleTable, ExportError> {
        let cropped = raw.crop();
        if cropped.is_empty() {
            return Err(ExportError::Layout {
                row: 0,
                reason: "scale export has no data rows".to_string(),
            });
        }

        let (variant, rows) = VariantClassifier::classify(&cropped)?;
        let count = rows.len();
        let table = ScaleTable::new(canton, tax_type, fiscal_year, variant, rows).map_err(
            |e| ExportError::Layout {
                row: 0,
                reason: e.to_string(),
            },
        )?;

        info!(%canton, %tax_type, fiscal_year, %variant, rows = count, "scale export loaded");
        Ok(table)
    }
}
