use std::io;
use std::path::PathBuf;
use std::time::Duration;

use anyhow::Context;
use clap::{Parser, Subcommand};
use rust_decimal::Decimal;
use tracing::debug;

use tax_cli::commands::{self, AggregateOptions, Engine, OutputFormat};
use tax_cli::{AppConfig, logging};
use tax_core::SortKey;
use tax_core::models::{Authority, Canton, EntityClass, TaxQuery, TaxType};

// ─── CLI definition ──────────────────────────────────────────────────────────

/// Swiss net-worth tax estimates from ESTV scale and multiplier exports.
///
/// Reads `taxmap.yaml` from the working directory unless `--config` is
/// given. Flags override the file.
#[derive(Debug, Parser)]
#[command(name = "taxmap", version, about, long_about = None)]
struct Cli {
    /// Configuration file.
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Directory holding the `rates/` and `scales/` exports.
    #[arg(long, global = true)]
    data_root: Option<PathBuf>,

    /// Fiscal year to look up; older exports are used when it is missing.
    #[arg(long, global = true)]
    year: Option<i32>,

    /// Log level or `EnvFilter` directive (e.g. `debug`, `tax_core=trace`).
    #[arg(long, global = true)]
    log_level: Option<String>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Tax base for one canton, tax type and net worth.
    Base {
        #[arg(long)]
        net_worth: Decimal,

        /// Canton code (`ZH`, `BE`, ...) or `Conf` for the federal scale.
        #[arg(long)]
        canton: Canton,

        /// `income` or `assets`.
        #[arg(long, default_value = "income")]
        tax_type: TaxType,

        /// `single`, `with_family` or `all`. Defaults to the configured entity.
        #[arg(long)]
        entity: Option<EntityClass>,

        /// `canton`, `commune` or `federal`.
        #[arg(long, default_value = "canton")]
        authority: Authority,
    },

    /// Multipliers of the first commune whose name contains `--commune`.
    Multipliers {
        #[arg(long)]
        commune: String,
    },

    /// Print the normalized scale of a canton.
    Scale {
        #[arg(long)]
        canton: Canton,

        #[arg(long, default_value = "income")]
        tax_type: TaxType,
    },

    /// Total tax liability in every commune.
    Aggregate {
        /// Taxable income in CHF.
        #[arg(long)]
        income: Decimal,

        /// Taxable assets in CHF.
        #[arg(long, default_value = "0")]
        assets: Decimal,

        #[arg(long)]
        entity: Option<EntityClass>,

        /// Only list communes of this canton.
        #[arg(long)]
        canton: Option<Canton>,

        /// `total`, `commune` or `canton`.
        #[arg(long, default_value = "total")]
        sort: SortKey,

        #[arg(long, value_enum, default_value_t = OutputFormat::Table)]
        format: OutputFormat,

        /// Give up after this many seconds.
        #[arg(long)]
        timeout_secs: Option<u64>,
    },
}

// ─── entry point ─────────────────────────────────────────────────────────────

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let config = AppConfig::load(cli.config.as_deref()).context("failed to load configuration")?;
    logging::init(
        cli.log_level.as_deref(),
        &config.logging.level,
        config.logging.file.as_deref(),
    )?;

    let root = cli.data_root.unwrap_or_else(|| config.data.root.clone());
    let fiscal_year = cli.year.unwrap_or_else(|| config.defaults.fiscal_year());
    debug!(root = %root.display(), fiscal_year, "configuration loaded");

    let engine = Engine::new(root, config.engine);
    let mut out = io::stdout().lock();

    match cli.command {
        Command::Base {
            net_worth,
            canton,
            tax_type,
            entity,
            authority,
        } => {
            let query = TaxQuery {
                net_worth,
                canton,
                tax_type,
                entity_class: entity.unwrap_or(config.defaults.entity),
                authority,
                fiscal_year,
            };
            commands::base(&engine, query, &mut out)
        }
        Command::Multipliers { commune } => {
            commands::multipliers(&engine, &commune, fiscal_year, &mut out)
        }
        Command::Scale { canton, tax_type } => {
            commands::scale(&engine, canton, tax_type, fiscal_year, &mut out)
        }
        Command::Aggregate {
            income,
            assets,
            entity,
            canton,
            sort,
            format,
            timeout_secs,
        } => {
            let options = AggregateOptions {
                income,
                assets,
                fiscal_year,
                entity_class: entity.unwrap_or(config.defaults.entity),
                canton,
                sort,
                format,
                timeout: timeout_secs.map(Duration::from_secs),
            };
            commands::aggregate(&engine, options, &mut out).await
        }
    }
}
