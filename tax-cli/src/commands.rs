//! Subcommand implementations. Each writes its report to `out`; logging
//! goes to stderr.

use std::io::Write;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result, bail};
use clap::ValueEnum;
use rust_decimal::Decimal;
use tax_core::models::{Canton, EntityClass, TaxQuery, TaxType};
use tax_core::{
    EngineConfig, MultiplierResolver, SortKey, TaxAggregator, TaxBaseCalculator, filter_canton,
    sort_records,
};
use tax_data::FileExportStore;
use tracing::{debug, info};

use crate::report;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, ValueEnum)]
pub enum OutputFormat {
    #[default]
    Table,
    Csv,
}

/// The export store and the engine components reading from it.
pub struct Engine {
    pub store: Arc<FileExportStore>,
    pub calculator: Arc<TaxBaseCalculator>,
    pub resolver: Arc<MultiplierResolver>,
}

impl Engine {
    pub fn new(
        root: impl Into<PathBuf>,
        config: EngineConfig,
    ) -> Self {
        let store = Arc::new(FileExportStore::new(root).with_floor_year(config.floor_year));
        debug!(root = %store.root().display(), ?config, "engine ready");
        Self {
            calculator: Arc::new(TaxBaseCalculator::new(store.clone(), config)),
            resolver: Arc::new(MultiplierResolver::new(store.clone(), config)),
            store,
        }
    }
}

pub fn base(
    engine: &Engine,
    query: TaxQuery,
    out: &mut impl Write,
) -> Result<()> {
    let result = engine
        .calculator
        .compute(query)
        .context("tax base computation failed")?;
    let q = &result.query;

    writeln!(
        out,
        "{} {} tax base for {} ({}, {}, {}): CHF {}",
        q.canton,
        q.tax_type,
        report::format_chf(q.net_worth),
        q.entity_class,
        q.authority,
        q.fiscal_year,
        report::format_chf(result.base_amount)
    )?;
    Ok(())
}

pub fn multipliers(
    engine: &Engine,
    commune: &str,
    fiscal_year: i32,
    out: &mut impl Write,
) -> Result<()> {
    let Some(row) = engine.resolver.resolve(commune, fiscal_year)? else {
        bail!("no commune matching '{commune}' in rates exports up to {fiscal_year}");
    };

    writeln!(
        out,
        "{} ({}, BFS-ID {})",
        row.commune, row.canton, row.commune_id
    )?;
    writeln!(out, "{}", report::multiplier_table(&row))?;
    Ok(())
}

pub fn scale(
    engine: &Engine,
    canton: Canton,
    tax_type: TaxType,
    fiscal_year: i32,
    out: &mut impl Write,
) -> Result<()> {
    let table = engine
        .store
        .latest_scale(canton, tax_type, fiscal_year)
        .with_context(|| format!("cannot load the {canton} {tax_type} scale"))?;

    writeln!(
        out,
        "{} {} scale {} ({} encoding, {} rows)",
        table.canton(),
        table.tax_type(),
        table.fiscal_year(),
        table.variant(),
        table.rows().len()
    )?;
    writeln!(out, "{}", report::scale_table(&table))?;
    Ok(())
}

#[derive(Debug, Clone)]
pub struct AggregateOptions {
    pub income: Decimal,
    pub assets: Decimal,
    pub fiscal_year: i32,
    pub entity_class: EntityClass,
    pub canton: Option<Canton>,
    pub sort: SortKey,
    pub format: OutputFormat,
    pub timeout: Option<Duration>,
}

/// Runs the aggregation on the blocking pool, bounded by the optional
/// timeout, then renders the sorted records.
pub async fn aggregate(
    engine: &Engine,
    options: AggregateOptions,
    out: &mut impl Write,
) -> Result<()> {
    let aggregator = TaxAggregator::new(
        engine.calculator.clone(),
        engine.resolver.clone(),
        options.fiscal_year,
    )
    .with_entity_class(options.entity_class);
    let (income, assets) = (options.income, options.assets);

    let task = tokio::task::spawn_blocking(move || aggregator.aggregate(income, assets));
    let joined = match options.timeout {
        Some(limit) => tokio::time::timeout(limit, task)
            .await
            .with_context(|| format!("aggregation timed out after {}s", limit.as_secs()))?,
        None => task.await,
    };
    let mut records = joined
        .context("aggregation task failed")?
        .context("aggregation failed")?;

    if let Some(canton) = options.canton {
        records = filter_canton(records, canton);
    }
    sort_records(&mut records, options.sort);
    info!(records = records.len(), sort = %options.sort, "rendering liabilities");

    match options.format {
        OutputFormat::Table => writeln!(out, "{}", report::liability_table(&records))?,
        OutputFormat::Csv => report::write_liability_csv(&records, &mut *out)?,
    }
    Ok(())
}
