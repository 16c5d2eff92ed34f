//! Rendering of engine results for the terminal.

use std::io::Write;

use rust_decimal::Decimal;
use tabled::{
    Table, Tabled,
    settings::{Alignment, Modify, Style, object::Columns},
};
use tax_core::models::{LiabilityRecord, RateRow, ScaleBracket, ScaleTable};

#[derive(Debug, Clone, Tabled)]
struct LiabilityRow {
    #[tabled(rename = "Canton")]
    canton: String,
    #[tabled(rename = "BFS-ID")]
    commune_id: i64,
    #[tabled(rename = "Commune")]
    commune: String,
    #[tabled(rename = "Income tax")]
    income_tax: String,
    #[tabled(rename = "Assets tax")]
    assets_tax: String,
    #[tabled(rename = "Federal tax")]
    federal_tax: String,
    #[tabled(rename = "Total")]
    total: String,
}

#[derive(Debug, Clone, Tabled)]
struct BracketRow {
    #[tabled(rename = "Entity")]
    entity: String,
    #[tabled(rename = "Authority")]
    authority: String,
    #[tabled(rename = "Threshold")]
    threshold: String,
    #[tabled(rename = "Rate")]
    rate: String,
    #[tabled(rename = "Base / formula")]
    detail: String,
}

#[derive(Debug, Clone, Tabled)]
struct MultiplierRow {
    #[tabled(rename = "Tax")]
    tax: String,
    #[tabled(rename = "Body")]
    body: String,
    #[tabled(rename = "Multiplier")]
    multiplier: String,
}

/// Formats an amount with two decimals and Swiss thousands separators.
pub fn format_chf(amount: Decimal) -> String {
    let text = format!("{:.2}", amount.abs());
    let (whole, cents) = text.split_once('.').unwrap_or((text.as_str(), "00"));

    let mut grouped = String::with_capacity(whole.len() + whole.len() / 3);
    for (i, digit) in whole.chars().enumerate() {
        if i > 0 && (whole.len() - i) % 3 == 0 {
            grouped.push('\'');
        }
        grouped.push(digit);
    }

    let sign = if amount.is_sign_negative() && !amount.is_zero() {
        "-"
    } else {
        ""
    };
    format!("{sign}{grouped}.{cents}")
}

fn format_percent(fraction: Decimal) -> String {
    format!("{}%", (fraction * Decimal::ONE_HUNDRED).normalize())
}

pub fn liability_table(records: &[LiabilityRecord]) -> String {
    let rows = records.iter().map(|r| LiabilityRow {
        canton: r.canton.clone(),
        commune_id: r.commune_id,
        commune: r.commune.clone(),
        income_tax: format_chf(r.income_tax),
        assets_tax: format_chf(r.assets_tax),
        federal_tax: format_chf(r.federal_tax),
        total: format_chf(r.total),
    });

    Table::new(rows)
        .with(Style::rounded())
        .with(Modify::new(Columns::new(3..)).with(Alignment::right()))
        .to_string()
}

/// Writes records as CSV with a header row, amounts as plain decimals.
pub fn write_liability_csv<W: Write>(
    records: &[LiabilityRecord],
    writer: W,
) -> Result<(), csv::Error> {
    let mut csv_writer = csv::Writer::from_writer(writer);
    for record in records {
        csv_writer.serialize(record)?;
    }
    csv_writer.flush()?;
    Ok(())
}

pub fn scale_table(table: &ScaleTable) -> String {
    let rows = table.rows().iter().map(|row| {
        let (threshold, rate, detail) = match &row.bracket {
            ScaleBracket::BaseAmount {
                threshold,
                marginal_rate,
                base_amount,
            } => (
                format_chf(*threshold),
                format_percent(*marginal_rate),
                format_chf(*base_amount),
            ),
            ScaleBracket::Incremental {
                delta_to_next_threshold,
                marginal_rate,
            } => (
                format!("+{}", format_chf(*delta_to_next_threshold)),
                format_percent(*marginal_rate),
                String::new(),
            ),
            ScaleBracket::Flat { rate } => (String::new(), format_percent(*rate), String::new()),
            ScaleBracket::Formula {
                threshold,
                expression,
            } => (
                format_chf(*threshold),
                String::new(),
                expression
                    .as_ref()
                    .map(ToString::to_string)
                    .unwrap_or_default(),
            ),
        };
        BracketRow {
            entity: row.taxable_entity.clone(),
            authority: row.tax_authority.clone(),
            threshold,
            rate,
            detail,
        }
    });

    Table::new(rows).with(Style::rounded()).to_string()
}

pub fn multiplier_table(row: &RateRow) -> String {
    let rows = row
        .multipliers
        .iter()
        .map(|((tax, body), value)| MultiplierRow {
            tax: format!("{tax:?}"),
            body: format!("{body:?}"),
            multiplier: format_percent(*value),
        });

    Table::new(rows)
        .with(Style::rounded())
        .with(Modify::new(Columns::new(2..)).with(Alignment::right()))
        .to_string()
}

#[cfg(test)]
mod tests {
    use pretty_assertions::assert_eq;
    use rust_decimal_macros::dec;

    use super::*;

    fn record() -> LiabilityRecord {
        LiabilityRecord {
            canton_id: 26,
            canton: "ZH".to_string(),
            commune_id: 261,
            commune: "Zürich".to_string(),
            federal_tax: dec!(500.00),
            income_tax: dec!(7227.00),
            assets_tax: dec!(109.50),
            total: dec!(7836.50),
        }
    }

    #[test]
    fn chf_amounts_are_grouped() {
        assert_eq!(format_chf(dec!(0)), "0.00");
        assert_eq!(format_chf(dec!(999.5)), "999.50");
        assert_eq!(format_chf(dec!(7836.5)), "7'836.50");
        assert_eq!(format_chf(dec!(1234567.891)), "1'234'567.89");
        assert_eq!(format_chf(dec!(-1500)), "-1'500.00");
    }

    #[test]
    fn percentages_drop_trailing_zeros() {
        assert_eq!(format_percent(dec!(1.19)), "119%");
        assert_eq!(format_percent(dec!(0.0005)), "0.05%");
    }

    #[test]
    fn table_lists_every_record() {
        let table = liability_table(&[record()]);

        assert!(table.contains("Zürich"));
        assert!(table.contains("7'836.50"));
        assert!(table.contains("Federal tax"));
    }

    #[test]
    fn csv_has_a_header_and_plain_amounts() {
        let mut out = Vec::new();
        write_liability_csv(&[record()], &mut out).unwrap();

        let text = String::from_utf8(out).unwrap();
        let lines: Vec<&str> = text.lines().collect();
        assert_eq!(
            lines,
            vec![
                "canton_id,canton,commune_id,commune,federal_tax,income_tax,assets_tax,total",
                "26,ZH,261,Zürich,500.00,7227.00,109.50,7836.50",
            ]
        );
    }
}
