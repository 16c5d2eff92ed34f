//! Untyped view of a CSV export dump and the cell conversions shared by the
//! rate and scale loaders.

use std::io::Read;
use std::str::FromStr;

use rust_decimal::Decimal;
use rust_decimal::prelude::ToPrimitive;

use crate::error::ExportError;

/// Metadata rows (title, source note, header lines) above the data.
pub const METADATA_ROWS: usize = 4;

/// Cells as read from the dump; blank cells are `None`.
pub type RawRow = Vec<Option<String>>;

/// A rectangular grid of trimmed cells. Short rows are padded with `None`.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct RawTable {
    rows: Vec<RawRow>,
    width: usize,
}

impl RawTable {
    /// Reads every record of a header-less, possibly ragged CSV dump.
    pub fn from_reader<R: Read>(reader: R) -> Result<Self, ExportError> {
        let mut csv_reader = csv::ReaderBuilder::new()
            .has_headers(false)
            .flexible(true)
            .from_reader(reader);

        let mut rows = Vec::new();
        for result in csv_reader.records() {
            let record = result?;
            rows.push(
                record
                    .iter()
                    .map(|cell| {
                        let cell = cell.trim();
                        (!cell.is_empty()).then(|| cell.to_string())
                    })
                    .collect(),
            );
        }

        Ok(Self::from_rows(rows))
    }

    pub fn from_rows(mut rows: Vec<RawRow>) -> Self {
        let width = rows.iter().map(Vec::len).max().unwrap_or(0);
        for row in &mut rows {
            row.resize(width, None);
        }
        Self { rows, width }
    }

    pub fn rows(&self) -> &[RawRow] {
        &self.rows
    }

    pub fn width(&self) -> usize {
        self.width
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    /// Drops the metadata rows, then every column and every row that is
    /// blank throughout.
    pub fn crop(self) -> Self {
        let width = self.width;
        let rows = self.data_rows();
        let keep: Vec<usize> = (0..width)
            .filter(|&col| rows.iter().any(|row| row[col].is_some()))
            .collect();
        Self::select_columns(rows, &keep)
    }

    /// Like [`RawTable::crop`] but only blank columns at the right edge go,
    /// so interior columns keep their position.
    pub fn crop_trailing(self) -> Self {
        let width = self.width;
        let rows = self.data_rows();
        let width = (0..width)
            .rev()
            .find(|&col| rows.iter().any(|row| row[col].is_some()))
            .map_or(0, |col| col + 1);
        let keep: Vec<usize> = (0..width).collect();
        Self::select_columns(rows, &keep)
    }

    fn data_rows(self) -> Vec<RawRow> {
        self.rows
            .into_iter()
            .skip(METADATA_ROWS)
            .filter(|row| row.iter().any(Option::is_some))
            .collect()
    }

    fn select_columns(
        rows: Vec<RawRow>,
        keep: &[usize],
    ) -> Self {
        let rows = rows
            .into_iter()
            .map(|row| keep.iter().map(|&col| row[col].clone()).collect())
            .collect();
        Self {
            rows,
            width: keep.len(),
        }
    }
}

/// Parses an amount or percentage cell.
///
/// Swiss apostrophes and spaces used as thousands separators are stripped.
/// A comma counts as a thousands separator only when exactly three digits
/// follow it; any other comma (a decimal comma such as `2,5`) rejects the
/// cell. Scientific notation such as `1.5E+05` is accepted.
pub fn parse_decimal(cell: &str) -> Result<Decimal, String> {
    let not_a_number = || format!("'{cell}' is not a number");
    let chars: Vec<char> = cell.chars().collect();

    let mut cleaned = String::with_capacity(chars.len());
    for (i, &c) in chars.iter().enumerate() {
        match c {
            '\'' | '’' | ' ' | '\u{a0}' | '\u{202f}' => {}
            ',' => {
                let digits = chars[i + 1..]
                    .iter()
                    .take_while(|d| d.is_ascii_digit())
                    .count();
                if digits != 3 {
                    return Err(format!("'{cell}' has an ambiguous decimal comma"));
                }
            }
            _ => cleaned.push(c),
        }
    }
    if cleaned.is_empty() {
        return Err(not_a_number());
    }

    Decimal::from_str(&cleaned)
        .or_else(|_| Decimal::from_scientific(&cleaned))
        .map_err(|_| not_a_number())
}

/// Parses an identifier cell. Dash placeholders (`-`, `–`, `—`) read as 0.
pub fn parse_id(cell: &str) -> Result<i64, String> {
    let cell = cell.trim();
    if matches!(cell, "-" | "–" | "—") {
        return Ok(0);
    }
    let value = parse_decimal(cell)?;
    if !value.fract().is_zero() {
        return Err(format!("'{cell}' is not a whole number"));
    }
    value
        .to_i64()
        .ok_or_else(|| format!("'{cell}' is out of range"))
}

pub fn required<'a>(
    cell: &'a Option<String>,
    column: &str,
) -> Result<&'a str, String> {
    cell.as_deref()
        .ok_or_else(|| format!("{column} is blank"))
}

/// A numeric cell that must be present.
pub fn required_decimal(
    cell: &Option<String>,
    column: &str,
) -> Result<Decimal, String> {
    parse_decimal(required(cell, column)?).map_err(|e| format!("{column}: {e}"))
}

/// A numeric cell where blank means zero.
pub fn optional_decimal(
    cell: &Option<String>,
    column: &str,
) -> Result<Decimal, String> {
    match cell {
        Some(value) => parse_decimal(value).map_err(|e| format!("{column}: {e}")),
        None => Ok(Decimal::ZERO),
    }
}

pub fn text(cell: &Option<String>) -> String {
    cell.clone().unwrap_or_default()
}
