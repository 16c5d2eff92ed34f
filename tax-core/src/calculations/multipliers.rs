//! Commune multiplier lookup over yearly rate exports.

use std::sync::Arc;

use tracing::{debug, info};

use crate::cache::BoundedCache;
use crate::config::{EngineConfig, years_down_to};
use crate::error::TaxError;
use crate::models::{RateRow, RateTable};
use crate::source::RateSource;

/// Finds a commune's multiplier row, falling back to older exports.
pub struct MultiplierResolver {
    source: Arc<dyn RateSource>,
    config: EngineConfig,
    tables: BoundedCache<i32, Option<Arc<RateTable>>>,
    matches: BoundedCache<(String, i32), Option<RateRow>>,
}

impl MultiplierResolver {
    pub fn new(
        source: Arc<dyn RateSource>,
        config: EngineConfig,
    ) -> Self {
        Self {
            source,
            config,
            tables: BoundedCache::new(config.cache_capacity),
            matches: BoundedCache::new(config.cache_capacity),
        }
    }

    /// Multiplier row of the first commune whose name contains `commune`.
    ///
    /// Matching is a case-sensitive substring test; when several communes
    /// match, the first in export order wins. A year whose export is
    /// missing or has no match falls back to the previous year, down to the
    /// floor year. `Ok(None)` means no year matched.
    pub fn resolve(
        &self,
        commune: &str,
        fiscal_year: i32,
    ) -> Result<Option<RateRow>, TaxError> {
        let key = (commune.to_string(), fiscal_year);
        self.matches.get_or_try_insert_with(key, || -> Result<_, TaxError> {
            for year in years_down_to(fiscal_year, self.config.floor_year) {
                let Some(table) = self.table(year)? else {
                    continue;
                };
                if let Some(row) = table.find_commune(commune) {
                    if year != fiscal_year {
                        info!(
                            commune,
                            requested = fiscal_year,
                            used = year,
                            "commune resolved from an older rates export"
                        );
                    }
                    return Ok(Some(row.clone()));
                }
            }
            debug!(commune, fiscal_year, "no commune matched");
            Ok(None)
        })
    }

    /// Newest rates export at or below `fiscal_year`.
    ///
    /// # Errors
    ///
    /// [`TaxError::MissingData`] when no export exists down to the floor
    /// year.
    pub fn latest_table(
        &self,
        fiscal_year: i32,
    ) -> Result<Arc<RateTable>, TaxError> {
        for year in years_down_to(fiscal_year, self.config.floor_year) {
            if let Some(table) = self.table(year)? {
                if year != fiscal_year {
                    info!(
                        requested = fiscal_year,
                        used = year,
                        "rates export missing for requested year, using older one"
                    );
                }
                return Ok(table);
            }
        }

        Err(TaxError::MissingData {
            what: "rates".to_string(),
            from_year: fiscal_year,
            floor_year: self.config.floor_year,
        })
    }

    fn table(
        &self,
        year: i32,
    ) -> Result<Option<Arc<RateTable>>, TaxError> {
        Ok(self.tables.get_or_try_insert_with(year, || {
            debug!(year, "reading rates export");
            self.source.rate_table(year).map(|t| t.map(Arc::new))
        })?)
    }

    pub fn clear_cache(&self) {
        self.tables.clear();
        self.matches.clear();
    }
}

#[cfg(test)]
mod tests {
    use std::collections::{BTreeMap, HashMap};
    use std::sync::Mutex;

    use pretty_assertions::assert_eq;
    use rust_decimal_macros::dec;

    use super::*;
    use crate::models::{LevyBody, LevyTax};
    use crate::source::SourceError;

    #[derive(Default)]
    struct MemoryRates {
        tables: HashMap<i32, RateTable>,
        reads: Mutex<usize>,
    }

    impl MemoryRates {
        fn with(
            mut self,
            table: RateTable,
        ) -> Self {
            self.tables.insert(table.fiscal_year, table);
            self
        }
    }

    impl RateSource for MemoryRates {
        fn rate_table(
            &self,
            fiscal_year: i32,
        ) -> Result<Option<RateTable>, SourceError> {
            *self.reads.lock().unwrap() += 1;
            Ok(self.tables.get(&fiscal_year).cloned())
        }
    }

    fn commune(
        id: i64,
        name: &str,
        income_canton: rust_decimal::Decimal,
    ) -> RateRow {
        RateRow {
            canton_id: 26,
            canton: "ZH".to_string(),
            commune_id: id,
            commune: name.to_string(),
            multipliers: BTreeMap::from([((LevyTax::Income, LevyBody::Canton), income_canton)]),
        }
    }

    fn rates(
        year: i32,
        rows: Vec<RateRow>,
    ) -> RateTable {
        RateTable {
            fiscal_year: year,
            rows,
        }
    }

    fn resolver(source: MemoryRates) -> (MultiplierResolver, Arc<MemoryRates>) {
        let source = Arc::new(source);
        (
            MultiplierResolver::new(source.clone(), EngineConfig::default()),
            source,
        )
    }

    #[test]
    fn first_substring_match_in_export_order_wins() {
        let (resolver, _) = resolver(MemoryRates::default().with(rates(
            2024,
            vec![
                commune(1, "Wil", dec!(0.98)),
                commune(2, "Wil (SG)", dec!(1.15)),
                commune(3, "Wilchingen", dec!(0.90)),
            ],
        )));

        let row = resolver.resolve("Wil", 2024).unwrap().unwrap();
        assert_eq!(row.commune_id, 1);

        let row = resolver.resolve("Wil (", 2024).unwrap().unwrap();
        assert_eq!(row.commune_id, 2);
    }

    #[test]
    fn matching_is_case_sensitive() {
        let (resolver, _) = resolver(
            MemoryRates::default().with(rates(2024, vec![commune(261, "Zürich", dec!(1.19))])),
        );

        assert_eq!(resolver.resolve("zürich", 2024).unwrap(), None);
        assert_eq!(
            resolver
                .resolve("Zür", 2024)
                .unwrap()
                .map(|r| r.multiplier(LevyTax::Income, LevyBody::Canton)),
            Some(Some(dec!(1.19)))
        );
    }

    #[test]
    fn falls_back_when_the_year_has_no_match() {
        // 2024 exists but lacks the commune; 2023 is missing entirely.
        let (resolver, _) = resolver(
            MemoryRates::default()
                .with(rates(2024, vec![commune(1, "Aarau", dec!(0.97))]))
                .with(rates(2022, vec![commune(9, "Bern", dec!(1.54))])),
        );

        let row = resolver.resolve("Bern", 2024).unwrap().unwrap();
        assert_eq!(row.commune_id, 9);
    }

    #[test]
    fn no_match_down_to_the_floor_is_none() {
        let (resolver, _) = resolver(MemoryRates::default().with(rates(
            2024,
            vec![commune(1, "Aarau", dec!(0.97))],
        )));

        assert_eq!(resolver.resolve("Genève", 2024).unwrap(), None);
    }

    #[test]
    fn repeated_lookups_hit_the_cache() {
        let (resolver, source) = resolver(MemoryRates::default().with(rates(
            2024,
            vec![commune(1, "Aarau", dec!(0.97))],
        )));

        let first = resolver.resolve("Aarau", 2024).unwrap();
        let second = resolver.resolve("Aarau", 2024).unwrap();

        assert_eq!(first, second);
        assert_eq!(*source.reads.lock().unwrap(), 1);
    }

    #[test]
    fn clearing_the_cache_rereads_the_export() {
        let (resolver, source) = resolver(MemoryRates::default().with(rates(
            2024,
            vec![commune(1, "Aarau", dec!(0.97))],
        )));

        resolver.resolve("Aarau", 2024).unwrap();
        resolver.latest_table(2024).unwrap();
        assert_eq!(*source.reads.lock().unwrap(), 1);

        resolver.clear_cache();
        let row = resolver.resolve("Aarau", 2024).unwrap().unwrap();

        assert_eq!(row.commune_id, 1);
        assert_eq!(*source.reads.lock().unwrap(), 2);
    }

    #[test]
    fn latest_table_uses_the_newest_available_year() {
        let (resolver, _) = resolver(MemoryRates::default().with(rates(2021, vec![])));

        assert_eq!(resolver.latest_table(2024).unwrap().fiscal_year, 2021);
    }

    #[test]
    fn latest_table_without_any_export_is_missing_data() {
        let (resolver, _) = resolver(MemoryRates::default());

        let err = resolver.latest_table(2024).expect_err("no exports");
        assert!(matches!(
            err,
            TaxError::MissingData {
                from_year: 2024,
                floor_year: 2010,
                ..
            }
        ));
    }
}
