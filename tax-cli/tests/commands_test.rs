//! Subcommands run against the export fixtures of `tax-data`.

use std::path::PathBuf;
use std::time::Duration;

use pretty_assertions::assert_eq;
use rust_decimal_macros::dec;
use tax_cli::commands::{self, AggregateOptions, Engine, OutputFormat};
use tax_core::models::{Authority, Canton, EntityClass, TaxQuery, TaxType};
use tax_core::{EngineConfig, SortKey};

fn engine() -> Engine {
    let root = PathBuf::from(env!("CARGO_MANIFEST_DIR")).join("../tax-data/test-data/export");
    Engine::new(root, EngineConfig::default())
}

fn options(format: OutputFormat) -> AggregateOptions {
    AggregateOptions {
        income: dec!(100000),
        assets: dec!(200000),
        fiscal_year: 2024,
        entity_class: EntityClass::Single,
        canton: None,
        sort: SortKey::Total,
        format,
        timeout: Some(Duration::from_secs(30)),
    }
}

fn run_to_string(f: impl FnOnce(&mut Vec<u8>) -> anyhow::Result<()>) -> String {
    let mut out = Vec::new();
    f(&mut out).unwrap();
    String::from_utf8(out).unwrap()
}

// =============================================================================
// base / multipliers / scale
// =============================================================================

#[test]
fn test_base_prints_the_amount() {
    let engine = engine();
    let query = TaxQuery {
        net_worth: dec!(100000),
        canton: Canton::Zurich,
        tax_type: TaxType::Income,
        entity_class: EntityClass::Single,
        authority: Authority::Canton,
        fiscal_year: 2024,
    };

    let text = run_to_string(|out| commands::base(&engine, query, out));

    assert_eq!(
        text.trim_end(),
        "ZH income tax base for 100'000.00 (single, canton, 2024): CHF 3'300.00"
    );
}

#[test]
fn test_base_rejects_negative_net_worth() {
    let engine = engine();
    let query = TaxQuery {
        net_worth: dec!(-1),
        canton: Canton::Zurich,
        tax_type: TaxType::Income,
        entity_class: EntityClass::Single,
        authority: Authority::Canton,
        fiscal_year: 2024,
    };

    let err = commands::base(&engine, query, &mut Vec::new()).expect_err("negative");

    assert!(format!("{err:#}").contains("must not be negative"));
}

#[test]
fn test_multipliers_for_a_commune() {
    let engine = engine();

    let text = run_to_string(|out| commands::multipliers(&engine, "Winter", 2024, out));

    assert!(text.starts_with("Winterthur (ZH, BFS-ID 230)"));
    assert!(text.contains("122%"));
}

#[test]
fn test_unknown_commune_is_an_error() {
    let engine = engine();

    let err = commands::multipliers(&engine, "Atlantis", 2024, &mut Vec::new())
        .expect_err("no such commune");

    assert!(err.to_string().contains("Atlantis"));
}

#[test]
fn test_scale_reports_the_year_actually_used() {
    let engine = engine();

    let text =
        run_to_string(|out| commands::scale(&engine, Canton::Bern, TaxType::Assets, 2024, out));

    assert!(text.starts_with("BE assets scale 2023 (flat encoding"));
}

// =============================================================================
// aggregate
// =============================================================================

#[tokio::test]
async fn test_aggregate_as_csv() {
    let engine = engine();
    let mut out = Vec::new();

    commands::aggregate(&engine, options(OutputFormat::Csv), &mut out)
        .await
        .unwrap();

    let text = String::from_utf8(out).unwrap();
    let communes: Vec<&str> = text
        .lines()
        .skip(1)
        .filter_map(|line| line.split(',').nth(3))
        .collect();
    assert_eq!(communes, vec!["Lugano", "Zürich", "Winterthur", "Bern"]);
}

#[tokio::test]
async fn test_aggregate_table_filtered_to_one_canton() {
    let engine = engine();
    let mut opts = options(OutputFormat::Table);
    opts.canton = Some(Canton::Bern);
    let mut out = Vec::new();

    commands::aggregate(&engine, opts, &mut out).await.unwrap();

    let text = String::from_utf8(out).unwrap();
    assert!(text.contains("Bern"));
    assert!(text.contains("14'300.00"));
    assert!(!text.contains("Lugano"));
}

#[tokio::test]
async fn test_aggregate_negative_income_fails() {
    let engine = engine();
    let mut opts = options(OutputFormat::Table);
    opts.income = dec!(-5);

    let err = commands::aggregate(&engine, opts, &mut Vec::new())
        .await
        .expect_err("negative income");

    assert!(format!("{err:#}").contains("aggregation failed"));
}
