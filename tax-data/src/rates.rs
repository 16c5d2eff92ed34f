use std::collections::BTreeMap;
use std::io::Read;

use tax_core::calculations::common::percent_to_fraction;
use tax_core::models::{MULTIPLIER_COLUMNS, RateRow, RateTable};
use tracing::debug;

use crate::error::ExportError;
use crate::raw::{RawRow, RawTable, parse_decimal, parse_id, required, text};

/// Columns of the rates export: canton id, canton, commune id, commune and
/// one column per entry of [`MULTIPLIER_COLUMNS`].
pub const RATE_COLUMNS: usize = 4 + MULTIPLIER_COLUMNS.len();

/// Loader for the yearly per-commune multiplier export.
///
/// Multiplier cells are percentages in the export and fractions in the
/// resulting [`RateRow`]s. Blank multiplier cells are left out of the row's
/// map.
pub struct RateTableLoader;

impl RateTableLoader {
    /// Parse a rates dump from any reader (a file or a string slice).
    pub fn parse<R: Read>(
        reader: R,
        fiscal_year: i32,
    ) -> Result<RateTable, ExportError> {
        let raw = RawTable::from_reader(reader)?;
        Self::from_raw(raw, fiscal_year)
    }

    pub fn from_raw(
        raw: RawTable,
        fiscal_year: i32,
    ) -> Result<RateTable, ExportError> {
        let table = raw.crop_trailing();
        if table.width() != RATE_COLUMNS {
            return Err(ExportError::Layout {
                row: 0,
                reason: format!(
                    "expected {RATE_COLUMNS} columns, found {}",
                    table.width()
                ),
            });
        }

        let rows = table
            .rows()
            .iter()
            .enumerate()
            .map(|(i, cells)| {
                parse_row(cells).map_err(|reason| ExportError::Layout { row: i, reason })
            })
            .collect::<Result<Vec<_>, _>>()?;

        debug!(fiscal_year, communes = rows.len(), "parsed rates export");
        Ok(RateTable { fiscal_year, rows })
    }
}

fn parse_row(cells: &RawRow) -> Result<RateRow, String> {
    let canton_id = parse_id(required(&cells[0], "canton id")?)?;
    let commune_id = parse_id(required(&cells[2], "commune id")?)?;

    let mut multipliers = BTreeMap::new();
    for (key, cell) in MULTIPLIER_COLUMNS.iter().zip(&cells[4..]) {
        if let Some(value) = cell {
            let percent = parse_decimal(value).map_err(|e| format!("{key:?}: {e}"))?;
            multipliers.insert(*key, percent_to_fraction(percent));
        }
    }

    Ok(RateRow {
        canton_id,
        canton: text(&cells[1]),
        commune_id,
        commune: text(&cells[3]),
        multipliers,
    })
}

#[cfg(test)]
mod tests {
    use pretty_assertions::assert_eq;
    use rust_decimal_macros::dec;
    use tax_core::models::{LevyBody, LevyTax};

    use super::*;

    const HEADER: &str =
        "Steuerfüsse 2024\nQuelle: ESTV\nStand 1.1.2024\nKantons-ID,Kanton,Gemeinde-ID,Gemeinde\n";

    #[test]
    fn multipliers_are_fractions_keyed_by_column() {
        let dump = format!(
            "{HEADER}26,ZH,261,Zürich,100,119,10,12,14,100,119,10,12,14,100,119,12,100,119,12\n"
        );

        let table = RateTableLoader::parse(dump.as_bytes(), 2024).unwrap();

        assert_eq!(table.fiscal_year, 2024);
        let row = &table.rows[0];
        assert_eq!((row.canton_id, row.commune_id), (26, 261));
        assert_eq!(row.commune, "Zürich");
        assert_eq!(
            row.multiplier(LevyTax::Income, LevyBody::Commune),
            Some(dec!(1.19))
        );
        assert_eq!(
            row.multiplier(LevyTax::Assets, LevyBody::RomanCatholic),
            Some(dec!(0.12))
        );
        assert_eq!(
            row.multiplier(LevyTax::Capital, LevyBody::Church),
            Some(dec!(0.12))
        );
    }

    #[test]
    fn blank_multipliers_are_absent() {
        let dump = format!(
            "{HEADER}1,AG,4001,Aarau,97,97,,,,97,97,,,,97,97,,97,97,\n\
             1,AG,4002,Aarburg,97,122,20,18,,97,122,20,18,,97,122,18,97,122,18\n"
        );

        let table = RateTableLoader::parse(dump.as_bytes(), 2024).unwrap();

        let aarau = &table.rows[0];
        assert_eq!(aarau.multiplier(LevyTax::Income, LevyBody::Protestant), None);
        assert_eq!(aarau.multipliers.len(), 8);
        assert_eq!(
            aarau.multiplier(LevyTax::Income, LevyBody::Canton),
            Some(dec!(0.97))
        );
    }

    #[test]
    fn wrong_width_is_a_layout_error() {
        let dump = format!("{HEADER}26,ZH,261,Zürich,100,119\n");

        let err = RateTableLoader::parse(dump.as_bytes(), 2024).expect_err("too narrow");

        assert!(matches!(err, ExportError::Layout { row: 0, .. }));
    }

    #[test]
    fn unparsable_cells_name_the_row() {
        let dump = format!(
            "{HEADER}26,ZH,261,Zürich,100,119,10,12,14,100,119,10,12,14,100,119,12,100,119,12\n\
             26,ZH,230,Winterthur,100,n/a,10,12,14,100,119,10,12,14,100,119,12,100,119,12\n"
        );

        let err = RateTableLoader::parse(dump.as_bytes(), 2024).expect_err("n/a");

        let ExportError::Layout { row, reason } = err else {
            panic!("expected a layout error");
        };
        assert_eq!(row, 1);
        assert!(reason.contains("n/a"), "reason was: {reason}");
    }
}
