//! Integration tests running the calculation engine over export dumps on
//! disk.

use std::path::PathBuf;
use std::sync::Arc;

use pretty_assertions::assert_eq;
use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use tax_core::models::{
    Authority, Canton, EntityClass, LevyBody, LevyTax, ScaleVariant, TaxQuery, TaxType,
};
use tax_core::{
    EngineConfig, MultiplierResolver, SortKey, TaxAggregator, TaxBaseCalculator, TaxError,
    filter_canton, sort_records,
};
use tax_data::{ExportError, FileExportStore, RateTableLoader};

const RATES_2024: &str = include_str!("../test-data/export/rates/estv_rates_2024.csv");

fn export_root() -> PathBuf {
    PathBuf::from(env!("CARGO_MANIFEST_DIR")).join("test-data/export")
}

struct Engine {
    calculator: Arc<TaxBaseCalculator>,
    resolver: Arc<MultiplierResolver>,
}

fn engine() -> Engine {
    let store = Arc::new(FileExportStore::new(export_root()));
    let config = EngineConfig::default();
    Engine {
        calculator: Arc::new(TaxBaseCalculator::new(store.clone(), config)),
        resolver: Arc::new(MultiplierResolver::new(store, config)),
    }
}

fn query(
    net_worth: Decimal,
    canton: Canton,
    tax_type: TaxType,
) -> TaxQuery {
    TaxQuery {
        net_worth,
        canton,
        tax_type,
        entity_class: EntityClass::Single,
        authority: Authority::Canton,
        fiscal_year: 2024,
    }
}

// =============================================================================
// store layout and loading
// =============================================================================

#[test]
fn test_rates_dump_parses_from_a_string() {
    let table = RateTableLoader::parse(RATES_2024.as_bytes(), 2024).unwrap();

    let communes: Vec<&str> = table.rows.iter().map(|r| r.commune.as_str()).collect();
    assert_eq!(
        communes,
        vec!["Zürich", "Winterthur", "Bern", "Lugano", "Aarau"]
    );
    assert_eq!(
        table.rows[2].multiplier(LevyTax::Income, LevyBody::Canton),
        Some(dec!(3.06))
    );
}

#[test]
fn test_store_paths_follow_the_year_layout() {
    let store = FileExportStore::new("/data");

    assert_eq!(
        store.rates_path(2024),
        PathBuf::from("/data/rates/estv_rates_2024.csv")
    );
    assert_eq!(
        store.scale_path(Canton::Confederation, TaxType::Income, 2024),
        PathBuf::from("/data/scales/income/2024/estv_scales_Conf.csv")
    );
    assert_eq!(
        store.scale_path(Canton::Ticino, TaxType::Assets, 2019),
        PathBuf::from("/data/scales/assets/2019/estv_scales_TI.csv")
    );
}

#[test]
fn test_each_fixture_is_classified() {
    let store = FileExportStore::new(export_root());
    let cases = [
        (Canton::Zurich, TaxType::Income, ScaleVariant::BaseAmount),
        (Canton::Zurich, TaxType::Assets, ScaleVariant::Incremental),
        (Canton::Bern, TaxType::Income, ScaleVariant::Formula),
        (Canton::Bern, TaxType::Assets, ScaleVariant::Flat),
        (Canton::Confederation, TaxType::Income, ScaleVariant::BaseAmount),
    ];

    for (canton, tax_type, expected) in cases {
        let table = store.latest_scale(canton, tax_type, 2024).unwrap();
        assert_eq!(table.variant(), expected, "{canton} {tax_type}");
    }
}

#[test]
fn test_latest_scale_walks_down_to_an_older_year() {
    let store = FileExportStore::new(export_root());

    let table = store.latest_scale(Canton::Bern, TaxType::Income, 2024).unwrap();

    assert_eq!(table.fiscal_year(), 2023);
}

#[test]
fn test_latest_scale_without_any_file_is_missing_data() {
    let store = FileExportStore::new(export_root()).with_floor_year(2020);

    let err = store
        .latest_scale(Canton::Aargau, TaxType::Income, 2024)
        .expect_err("no Aargau scale");

    assert!(matches!(
        err,
        ExportError::MissingData {
            from_year: 2024,
            floor_year: 2020,
            ..
        }
    ));
}

#[test]
fn test_missing_year_is_not_an_error() {
    let store = FileExportStore::new(export_root());

    assert!(store.load_rates(2031).unwrap().is_none());
    assert!(
        store
            .load_scale(Canton::Zurich, TaxType::Income, 2031)
            .unwrap()
            .is_none()
    );
}

// =============================================================================
// tax bases
// =============================================================================

#[test]
fn test_base_amount_scale_with_separators() {
    let engine = engine();

    let base = engine
        .calculator
        .compute_base(&query(dec!(100000), Canton::Zurich, TaxType::Income))
        .unwrap();

    assert_eq!(base, dec!(3300));
}

#[test]
fn test_incremental_scale_with_blank_last_delta() {
    let engine = engine();

    let base = engine
        .calculator
        .compute_base(&query(dec!(200000), Canton::Zurich, TaxType::Assets))
        .unwrap();

    assert_eq!(base, dec!(50));
}

#[test]
fn test_formula_scale_from_an_older_year() {
    let engine = engine();

    let base = engine
        .calculator
        .compute_base(&query(dec!(100000), Canton::Bern, TaxType::Income))
        .unwrap();

    assert_eq!(base, dec!(2800));
}

#[test]
fn test_entity_specific_rows_are_selected() {
    let engine = engine();
    let mut single = query(dec!(100000), Canton::Ticino, TaxType::Income);
    let mut family = single.clone();
    family.entity_class = EntityClass::WithFamily;

    assert_eq!(engine.calculator.compute_base(&single).unwrap(), dec!(3600));
    assert_eq!(engine.calculator.compute_base(&family).unwrap(), dec!(2400));

    // The commune authority is not tagged in the export; canton rows apply.
    single.authority = Authority::Commune;
    assert_eq!(engine.calculator.compute_base(&single).unwrap(), dec!(3600));
}

#[test]
fn test_federal_scale() {
    let engine = engine();
    let mut federal = query(dec!(100000), Canton::Confederation, TaxType::Income);
    federal.authority = Authority::Federal;

    assert_eq!(engine.calculator.compute_base(&federal).unwrap(), dec!(500));
}

#[test]
fn test_canton_without_exports() {
    let engine = engine();

    let err = engine
        .calculator
        .compute_base(&query(dec!(100000), Canton::Aargau, TaxType::Income))
        .expect_err("no Aargau scale");

    assert!(matches!(err, TaxError::NoScaleData { .. }));
}

// =============================================================================
// multipliers
// =============================================================================

#[test]
fn test_commune_substring_first_match_wins() {
    let engine = engine();

    // Both Winterthur and Bern contain "er"; Winterthur comes first.
    let row = engine.resolver.resolve("er", 2024).unwrap().unwrap();

    assert_eq!(row.commune_id, 230);
}

#[test]
fn test_commune_only_in_an_older_export() {
    let engine = engine();

    let row = engine.resolver.resolve("Bauma", 2024).unwrap().unwrap();

    assert_eq!(row.commune_id, 297);
    assert_eq!(
        row.multiplier(LevyTax::Income, LevyBody::Commune),
        Some(dec!(1.16))
    );
}

#[test]
fn test_unknown_commune() {
    let engine = engine();

    assert_eq!(engine.resolver.resolve("Atlantis", 2024).unwrap(), None);
}

// =============================================================================
// aggregation
// =============================================================================

#[test]
fn test_aggregate_all_communes() {
    let engine = engine();
    let aggregator = TaxAggregator::new(engine.calculator, engine.resolver, 2024);

    let mut records = aggregator.aggregate(dec!(100000), dec!(200000)).unwrap();
    sort_records(&mut records, SortKey::Total);

    let summary: Vec<(&str, Decimal, Decimal, Decimal, Decimal)> = records
        .iter()
        .map(|r| {
            (
                r.commune.as_str(),
                r.income_tax,
                r.assets_tax,
                r.federal_tax,
                r.total,
            )
        })
        .collect();

    // Aarau is left out: there is no Aargau scale.
    assert_eq!(
        summary,
        vec![
            ("Lugano", dec!(6372), dec!(708), dec!(500), dec!(7580)),
            ("Zürich", dec!(7227), dec!(109.50), dec!(500), dec!(7836.50)),
            ("Winterthur", dec!(7326), dec!(111), dec!(500), dec!(7937)),
            ("Bern", dec!(12880), dec!(920), dec!(500), dec!(14300)),
        ]
    );

    for record in &records {
        assert_eq!(
            record.total,
            record.income_tax + record.assets_tax + record.federal_tax
        );
    }
}

#[test]
fn test_aggregate_filtered_to_one_canton() {
    let engine = engine();
    let aggregator = TaxAggregator::new(engine.calculator, engine.resolver, 2024);

    let records = aggregator.aggregate(dec!(100000), dec!(200000)).unwrap();
    let mut zurich = filter_canton(records, Canton::Zurich);
    sort_records(&mut zurich, SortKey::Commune);

    let communes: Vec<&str> = zurich.iter().map(|r| r.commune.as_str()).collect();
    assert_eq!(communes, vec!["Winterthur", "Zürich"]);
}

#[test]
fn test_aggregate_is_idempotent() {
    let engine = engine();
    let aggregator = TaxAggregator::new(engine.calculator, engine.resolver, 2024)
        .with_entity_class(EntityClass::WithFamily);

    let mut first = aggregator.aggregate(dec!(80000), dec!(0)).unwrap();
    let mut second = aggregator.aggregate(dec!(80000), dec!(0)).unwrap();
    sort_records(&mut first, SortKey::Canton);
    sort_records(&mut second, SortKey::Canton);

    assert_eq!(first, second);
}
