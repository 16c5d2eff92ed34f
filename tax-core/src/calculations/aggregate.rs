//! Per-commune liability for one income and assets figure.
//!
//! The aggregator walks every commune of the newest rates export, applies
//! the commune's canton and commune multipliers to the canton's income and
//! assets bases and adds the federal income tax. Bases depend only on the
//! canton, so they are computed once per (net worth, canton, tax type) and
//! shared by all communes of that canton.

use std::cmp::Ordering;
use std::fmt;
use std::str::FromStr;
use std::sync::Arc;

use rayon::prelude::*;
use rust_decimal::Decimal;
use tracing::{debug, info, warn};

use crate::cache::BoundedCache;
use crate::calculations::base::TaxBaseCalculator;
use crate::calculations::multipliers::MultiplierResolver;
use crate::error::TaxError;
use crate::models::{
    Authority, Canton, EntityClass, LevyBody, LevyTax, LiabilityParts, LiabilityRecord, RateRow,
    TaxQuery, TaxType,
};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct CantonBases {
    canton: Decimal,
    commune: Decimal,
}

pub struct TaxAggregator {
    calculator: Arc<TaxBaseCalculator>,
    resolver: Arc<MultiplierResolver>,
    fiscal_year: i32,
    entity_class: EntityClass,
    bases: BoundedCache<(Decimal, Canton, TaxType), CantonBases>,
}

impl TaxAggregator {
    /// An aggregator for `fiscal_year` and the default entity class
    /// ([`EntityClass::Single`]).
    pub fn new(
        calculator: Arc<TaxBaseCalculator>,
        resolver: Arc<MultiplierResolver>,
        fiscal_year: i32,
    ) -> Self {
        let capacity = calculator.config().cache_capacity;
        Self {
            calculator,
            resolver,
            fiscal_year,
            entity_class: EntityClass::default(),
            bases: BoundedCache::new(capacity),
        }
    }

    pub fn with_entity_class(
        mut self,
        entity_class: EntityClass,
    ) -> Self {
        self.entity_class = entity_class;
        self.bases.clear();
        self
    }

    pub fn fiscal_year(&self) -> i32 {
        self.fiscal_year
    }

    pub fn entity_class(&self) -> EntityClass {
        self.entity_class
    }

    /// One record per commune of the newest rates export at or below the
    /// fiscal year. Record order is unspecified; see [`sort_records`].
    ///
    /// Communes whose canton code is unknown, whose canton has no scale or
    /// whose income or assets multipliers are blank are left out with a
    /// warning. Any other failure aborts the whole aggregation.
    pub fn aggregate(
        &self,
        income: Decimal,
        assets: Decimal,
    ) -> Result<Vec<LiabilityRecord>, TaxError> {
        for (name, value) in [("income", income), ("assets", assets)] {
            if value.is_sign_negative() && !value.is_zero() {
                return Err(TaxError::InvalidArgument(format!(
                    "{name} must not be negative, got {value}"
                )));
            }
        }

        let rates = self.resolver.latest_table(self.fiscal_year)?;
        let federal_base = self.calculator.compute_base(&TaxQuery {
            net_worth: income,
            canton: Canton::Confederation,
            tax_type: TaxType::Income,
            entity_class: self.entity_class,
            authority: Authority::Federal,
            fiscal_year: self.fiscal_year,
        })?;

        let records = rates
            .rows
            .par_iter()
            .map(|row| self.commune_record(row, income, assets, federal_base))
            .collect::<Result<Vec<_>, TaxError>>()?;
        let records: Vec<LiabilityRecord> = records.into_iter().flatten().collect();

        info!(
            fiscal_year = self.fiscal_year,
            rates_year = rates.fiscal_year,
            communes = rates.rows.len(),
            records = records.len(),
            "aggregation finished"
        );
        Ok(records)
    }

    fn commune_record(
        &self,
        row: &RateRow,
        income: Decimal,
        assets: Decimal,
        federal_base: Decimal,
    ) -> Result<Option<LiabilityRecord>, TaxError> {
        let Some(canton) = Canton::parse(&row.canton).filter(|c| *c != Canton::Confederation)
        else {
            warn!(
                commune = %row.commune,
                canton = %row.canton,
                "unknown canton code, commune omitted"
            );
            return Ok(None);
        };

        let multiplier = |tax: LevyTax, body: LevyBody| {
            let value = row.multiplier(tax, body);
            if value.is_none() {
                warn!(
                    commune = %row.commune,
                    ?tax,
                    ?body,
                    "multiplier missing, commune omitted"
                );
            }
            value
        };
        let Some(income_canton) = multiplier(LevyTax::Income, LevyBody::Canton) else {
            return Ok(None);
        };
        let Some(income_commune) = multiplier(LevyTax::Income, LevyBody::Commune) else {
            return Ok(None);
        };
        let Some(assets_canton) = multiplier(LevyTax::Assets, LevyBody::Canton) else {
            return Ok(None);
        };
        let Some(assets_commune) = multiplier(LevyTax::Assets, LevyBody::Commune) else {
            return Ok(None);
        };

        let (Some(income_bases), Some(assets_bases)) = (
            self.canton_bases(income, canton, TaxType::Income)?,
            self.canton_bases(assets, canton, TaxType::Assets)?,
        ) else {
            warn!(commune = %row.commune, %canton, "no scale for canton, commune omitted");
            return Ok(None);
        };

        let parts = LiabilityParts {
            cantonal_income_tax: income_canton * income_bases.canton,
            communal_income_tax: income_commune * income_bases.commune,
            cantonal_assets_tax: assets_canton * assets_bases.canton,
            communal_assets_tax: assets_commune * assets_bases.commune,
            federal_tax: federal_base,
        };

        Ok(Some(LiabilityRecord::new(
            row.canton_id,
            canton.as_str(),
            row.commune_id,
            row.commune.as_str(),
            &parts,
        )))
    }

    /// Canton and commune bases, or `None` when the canton has no scale.
    fn canton_bases(
        &self,
        net_worth: Decimal,
        canton: Canton,
        tax_type: TaxType,
    ) -> Result<Option<CantonBases>, TaxError> {
        let computed = self
            .bases
            .get_or_try_insert_with((net_worth, canton, tax_type), || -> Result<_, TaxError> {
                debug!(%canton, %tax_type, %net_worth, "computing canton bases");
                let base = |authority| {
                    self.calculator.compute_base(&TaxQuery {
                        net_worth,
                        canton,
                        tax_type,
                        entity_class: self.entity_class,
                        authority,
                        fiscal_year: self.fiscal_year,
                    })
                };
                Ok(CantonBases {
                    canton: base(Authority::Canton)?,
                    commune: base(Authority::Commune)?,
                })
            });

        match computed {
            Ok(bases) => Ok(Some(bases)),
            Err(TaxError::NoScaleData { .. }) => Ok(None),
            Err(err) => Err(err),
        }
    }

    /// Drops the cached bases together with the calculator's and resolver's
    /// caches, so the next aggregation reads the exports again.
    pub fn clear_cache(&self) {
        self.bases.clear();
        self.calculator.clear_cache();
        self.resolver.clear_cache();
    }
}

/// Ordering applied to aggregated records.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SortKey {
    /// Ascending total, cheapest commune first.
    #[default]
    Total,
    Commune,
    Canton,
}

impl SortKey {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Total => "total",
            Self::Commune => "commune",
            Self::Canton => "canton",
        }
    }
}

impl fmt::Display for SortKey {
    fn fmt(
        &self,
        f: &mut fmt::Formatter<'_>,
    ) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for SortKey {
    type Err = TaxError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "total" => Ok(Self::Total),
            "commune" => Ok(Self::Commune),
            "canton" => Ok(Self::Canton),
            other => Err(TaxError::InvalidArgument(format!(
                "'{other}' is not a sort key; expected total, commune or canton"
            ))),
        }
    }
}

/// Sorts records in place. Ties are broken by commune id so the result
/// does not depend on aggregation order.
pub fn sort_records(
    records: &mut [LiabilityRecord],
    key: SortKey,
) {
    records.sort_by(|a, b| {
        let primary = match key {
            SortKey::Total => a.total.cmp(&b.total),
            SortKey::Commune => a.commune.cmp(&b.commune),
            SortKey::Canton => a
                .canton_id
                .cmp(&b.canton_id)
                .then_with(|| a.total.cmp(&b.total)),
        };
        match primary {
            Ordering::Equal => a.commune_id.cmp(&b.commune_id),
            other => other,
        }
    });
}

/// Keeps the records of one canton.
pub fn filter_canton(
    records: Vec<LiabilityRecord>,
    canton: Canton,
) -> Vec<LiabilityRecord> {
    records
        .into_iter()
        .filter(|record| record.canton == canton.as_str())
        .collect()
}
