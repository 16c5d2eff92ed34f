//! Tax-base evaluation over normalized scale tables.
//!
//! A lookup runs in two stages. [`TaxBaseCalculator::prepare`] resolves the
//! scale export (falling back to older fiscal years), filters its rows by
//! entity class and authority and derives whatever the encoding leaves
//! implicit, producing a [`PreparedScale`]. That result depends only on the
//! query tuple (canton, tax type, entity class, authority, fiscal year) and
//! is cached. [`PreparedScale::evaluate`] then walks the brackets for one
//! net-worth figure.
//!
//! Thresholds are inclusive: a net worth equal to a threshold is taxed by
//! that bracket. Below the lowest threshold the first bracket applies with
//! a zero increment.

use std::sync::Arc;

use rust_decimal::Decimal;
use tracing::{debug, info};

use crate::cache::BoundedCache;
use crate::calculations::common::excess_over;
use crate::calculations::expression::Expression;
use crate::config::{EngineConfig, years_down_to};
use crate::error::TaxError;
use crate::models::{
    Authority, Canton, EntityClass, ScaleBracket, ScaleRow, ScaleTable, ScaleVariant, TaxQuery,
    TaxResult, TaxType,
};
use crate::source::ScaleSource;

/// One bracket with its lower bound, marginal rate and the tax accumulated
/// below that bound.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Step {
    pub threshold: Decimal,
    pub rate: Decimal,
    pub base: Decimal,
}

#[derive(Debug, Clone, PartialEq)]
pub enum Brackets {
    /// Ascending steps carrying cumulative bases (stated or derived).
    Cumulative(Vec<Step>),
    /// Ascending steps whose bases are all zero in the export; the base is
    /// accumulated from the marginal rates while walking.
    Marginal(Vec<Step>),
    Flat(Decimal),
    /// Ascending thresholds, each with an optional formula.
    Formula(Vec<(Decimal, Option<Expression>)>),
}

/// Brackets selected for one query tuple, ready to evaluate.
#[derive(Debug, Clone, PartialEq)]
pub struct PreparedScale {
    /// Year of the export the brackets come from.
    pub fiscal_year: i32,
    pub variant: ScaleVariant,
    pub brackets: Brackets,
}

impl PreparedScale {
    pub fn evaluate(
        &self,
        net_worth: Decimal,
    ) -> Result<Decimal, TaxError> {
        match &self.brackets {
            Brackets::Cumulative(steps) => {
                let step = steps[bracket_index(steps.iter().map(|s| s.threshold), net_worth)];
                Ok(step.base + step.rate * excess_over(net_worth, step.threshold))
            }
            Brackets::Marginal(steps) => {
                let mut base = Decimal::ZERO;
                let mut i = 0;
                while i + 1 < steps.len() && steps[i + 1].threshold <= net_worth {
                    base += (steps[i + 1].threshold - steps[i].threshold) * steps[i].rate;
                    i += 1;
                }
                Ok(base + excess_over(net_worth, steps[i].threshold) * steps[i].rate)
            }
            Brackets::Flat(rate) => Ok(*rate * net_worth),
            Brackets::Formula(rows) => {
                let index = bracket_index(rows.iter().map(|(t, _)| *t), net_worth);
                match &rows[index].1 {
                    Some(expression) => Ok(expression.evaluate(net_worth)?),
                    None => Ok(Decimal::ZERO),
                }
            }
        }
    }
}

/// Index of the last threshold not above `net_worth`, clamped to the first
/// bracket. Thresholds must be ascending and non-empty.
fn bracket_index(
    thresholds: impl Iterator<Item = Decimal>,
    net_worth: Decimal,
) -> usize {
    thresholds
        .enumerate()
        .take_while(|(_, threshold)| *threshold <= net_worth)
        .last()
        .map_or(0, |(index, _)| index)
}

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
struct SelectionKey {
    canton: Canton,
    tax_type: TaxType,
    entity_class: EntityClass,
    authority: Authority,
    fiscal_year: i32,
}

/// Computes tax bases from scale exports.
///
/// Scale tables are read through the [`ScaleSource`] at most once per
/// (canton, tax type, year) while they stay cached, including years that
/// turned out to have no export.
pub struct TaxBaseCalculator {
    source: Arc<dyn ScaleSource>,
    config: EngineConfig,
    tables: BoundedCache<(Canton, TaxType, i32), Option<Arc<ScaleTable>>>,
    prepared: BoundedCache<SelectionKey, Arc<PreparedScale>>,
}

impl TaxBaseCalculator {
    pub fn new(
        source: Arc<dyn ScaleSource>,
        config: EngineConfig,
    ) -> Self {
        Self {
            source,
            config,
            tables: BoundedCache::new(config.cache_capacity),
            prepared: BoundedCache::new(config.cache_capacity),
        }
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    /// Tax base owed for `query.net_worth` before any multiplier.
    ///
    /// # Errors
    ///
    /// * [`TaxError::InvalidArgument`] for a negative net worth.
    /// * [`TaxError::NoScaleData`] when no export exists down to the floor
    ///   year.
    /// * [`TaxError::NoMatchingBracket`] when filtering leaves no rows.
    /// * [`TaxError::Expression`] when a formula cannot be evaluated.
    pub fn compute_base(
        &self,
        query: &TaxQuery,
    ) -> Result<Decimal, TaxError> {
        query.validate()?;
        let prepared = self.prepare(
            query.canton,
            query.tax_type,
            query.entity_class,
            query.authority,
            query.fiscal_year,
        )?;
        prepared.evaluate(query.net_worth)
    }

    pub fn compute(
        &self,
        query: TaxQuery,
    ) -> Result<TaxResult, TaxError> {
        let base_amount = self.compute_base(&query)?;
        Ok(TaxResult { query, base_amount })
    }

    /// Selects and prepares the brackets for one query tuple.
    pub fn prepare(
        &self,
        canton: Canton,
        tax_type: TaxType,
        entity_class: EntityClass,
        authority: Authority,
        fiscal_year: i32,
    ) -> Result<Arc<PreparedScale>, TaxError> {
        let key = SelectionKey {
            canton,
            tax_type,
            entity_class,
            authority,
            fiscal_year,
        };
        self.prepared
            .get_or_try_insert_with(key.clone(), || -> Result<_, TaxError> {
                let table = self.resolve_table(canton, tax_type, fiscal_year)?;
                let rows = select_rows(&table, &key)?;
                Ok(Arc::new(prepare_rows(&table, &rows)))
            })
    }

    /// Newest scale export at or below `fiscal_year`.
    pub fn resolve_table(
        &self,
        canton: Canton,
        tax_type: TaxType,
        fiscal_year: i32,
    ) -> Result<Arc<ScaleTable>, TaxError> {
        for year in years_down_to(fiscal_year, self.config.floor_year) {
            let table = self
                .tables
                .get_or_try_insert_with((canton, tax_type, year), || {
                    debug!(%canton, %tax_type, year, "reading scale export");
                    self.source
                        .scale_table(canton, tax_type, year)
                        .map(|t| t.map(Arc::new))
                })?;

            if let Some(table) = table {
                if year != fiscal_year {
                    info!(
                        %canton,
                        %tax_type,
                        requested = fiscal_year,
                        used = year,
                        "scale export missing for requested year, using older one"
                    );
                }
                return Ok(table);
            }
        }

        Err(TaxError::NoScaleData {
            canton,
            tax_type,
            from_year: fiscal_year,
            floor_year: self.config.floor_year,
        })
    }

    pub fn clear_cache(&self) {
        self.tables.clear();
        self.prepared.clear();
    }
}

/// Rows for the query's authority and entity class.
///
/// Authorities are tried in turn, the requested one first and then the
/// others in [`Authority::FALLBACK_ORDER`]. Within an authority, rows for
/// the entity class win over rows for all entities. The first authority
/// left with any rows is used.
fn select_rows<'t>(
    table: &'t ScaleTable,
    key: &SelectionKey,
) -> Result<Vec<&'t ScaleRow>, TaxError> {
    let candidates = std::iter::once(key.authority).chain(
        Authority::FALLBACK_ORDER
            .into_iter()
            .filter(|authority| *authority != key.authority),
    );

    for authority in candidates {
        let for_authority: Vec<&'t ScaleRow> = table
            .rows()
            .iter()
            .filter(|row| row.is_for_authority(authority))
            .collect();
        if for_authority.is_empty() {
            continue;
        }

        let rows = select_entity(&for_authority, key, authority);
        if rows.is_empty() {
            continue;
        }
        if authority != key.authority {
            // Exports often leave single-authority scales untagged.
            debug!(
                canton = %key.canton,
                tax_type = %key.tax_type,
                requested = %key.authority,
                used = %authority,
                "no rows for authority, substituting"
            );
        }
        return Ok(rows);
    }

    Err(TaxError::NoMatchingBracket {
        canton: key.canton,
        tax_type: key.tax_type,
        entity_class: key.entity_class,
        authority: key.authority,
        fiscal_year: table.fiscal_year(),
    })
}

fn select_entity<'t>(
    rows: &[&'t ScaleRow],
    key: &SelectionKey,
    authority: Authority,
) -> Vec<&'t ScaleRow> {
    let for_entity = |entity: EntityClass| -> Vec<&'t ScaleRow> {
        rows.iter()
            .copied()
            .filter(|row| row.is_for_entity(entity))
            .collect()
    };

    let selected = for_entity(key.entity_class);
    if !selected.is_empty() || key.entity_class == EntityClass::All {
        return selected;
    }
    debug!(
        canton = %key.canton,
        %authority,
        entity = %key.entity_class,
        "no rows for entity class, using rows for all entities"
    );
    for_entity(EntityClass::All)
}

fn prepare_rows(
    table: &ScaleTable,
    rows: &[&ScaleRow],
) -> PreparedScale {
    let brackets = match table.variant() {
        ScaleVariant::BaseAmount => {
            let mut steps: Vec<Step> = rows
                .iter()
                .filter_map(|row| match row.bracket {
                    ScaleBracket::BaseAmount {
                        threshold,
                        marginal_rate,
                        base_amount,
                    } => Some(Step {
                        threshold,
                        rate: marginal_rate,
                        base: base_amount,
                    }),
                    _ => None,
                })
                .collect();
            steps.sort_by(|a, b| a.threshold.cmp(&b.threshold));

            if steps.iter().all(|s| s.base.is_zero()) {
                Brackets::Marginal(steps)
            } else {
                Brackets::Cumulative(steps)
            }
        }
        ScaleVariant::Incremental => {
            let mut threshold = Decimal::ZERO;
            let mut base = Decimal::ZERO;
            let mut steps = Vec::with_capacity(rows.len());
            for row in rows {
                if let ScaleBracket::Incremental {
                    delta_to_next_threshold,
                    marginal_rate,
                } = row.bracket
                {
                    steps.push(Step {
                        threshold,
                        rate: marginal_rate,
                        base,
                    });
                    threshold += delta_to_next_threshold;
                    base += delta_to_next_threshold * marginal_rate;
                }
            }
            Brackets::Cumulative(steps)
        }
        ScaleVariant::Flat => {
            let rate = rows
                .iter()
                .find_map(|row| match row.bracket {
                    ScaleBracket::Flat { rate } => Some(rate),
                    _ => None,
                })
                .unwrap_or(Decimal::ZERO);
            Brackets::Flat(rate)
        }
        ScaleVariant::Formula => {
            let mut formulas: Vec<(Decimal, Option<Expression>)> = rows
                .iter()
                .filter_map(|row| match &row.bracket {
                    ScaleBracket::Formula {
                        threshold,
                        expression,
                    } => Some((*threshold, expression.clone())),
                    _ => None,
                })
                .collect();
            formulas.sort_by(|a, b| a.0.cmp(&b.0));
            Brackets::Formula(formulas)
        }
    };

    PreparedScale {
        fiscal_year: table.fiscal_year(),
        variant: table.variant(),
        brackets,
    }
}
