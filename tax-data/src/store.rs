use std::fs::File;
use std::io::{self, BufReader};
use std::path::{Path, PathBuf};

use tax_core::config::DEFAULT_FLOOR_YEAR;
use tax_core::models::{Canton, RateTable, ScaleTable, TaxType};
use tax_core::{RateSource, ScaleSource, SourceError};
use tracing::{debug, info};

use crate::error::ExportError;
use crate::rates::RateTableLoader;
use crate::scales::ScaleTableNormalizer;

/// Export dumps laid out on disk by year:
///
/// ```text
/// <root>/rates/estv_rates_<year>.csv
/// <root>/scales/<income|assets>/<year>/estv_scales_<CANTON>.csv
/// ```
///
/// A missing file means "no export for that year", which lets the engine
/// fall back to older years.
#[derive(Debug, Clone)]
pub struct FileExportStore {
    root: PathBuf,
    floor_year: i32,
}

impl FileExportStore {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self {
            root: root.into(),
            floor_year: DEFAULT_FLOOR_YEAR,
        }
    }

    pub fn with_floor_year(
        mut self,
        floor_year: i32,
    ) -> Self {
        self.floor_year = floor_year;
        self
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn rates_path(
        &self,
        fiscal_year: i32,
    ) -> PathBuf {
        self.root
            .join("rates")
            .join(format!("estv_rates_{fiscal_year}.csv"))
    }

    pub fn scale_path(
        &self,
        canton: Canton,
        tax_type: TaxType,
        fiscal_year: i32,
    ) -> PathBuf {
        self.root
            .join("scales")
            .join(tax_type.as_str())
            .join(fiscal_year.to_string())
            .join(format!("estv_scales_{canton}.csv"))
    }

    /// The rates export of exactly `fiscal_year`, if present.
    pub fn load_rates(
        &self,
        fiscal_year: i32,
    ) -> Result<Option<RateTable>, ExportError> {
        let path = self.rates_path(fiscal_year);
        let Some(file) = open_if_exists(&path)? else {
            debug!(path = %path.display(), "no rates export");
            return Ok(None);
        };

        let table = RateTableLoader::parse(file, fiscal_year).map_err(|e| e.in_file(&path))?;
        info!(path = %path.display(), communes = table.rows.len(), "rates export loaded");
        Ok(Some(table))
    }

    /// The scale export of exactly `fiscal_year`, if present.
    pub fn load_scale(
        &self,
        canton: Canton,
        tax_type: TaxType,
        fiscal_year: i32,
    ) -> Result<Option<ScaleTable>, ExportError> {
        let path = self.scale_path(canton, tax_type, fiscal_year);
        let Some(file) = open_if_exists(&path)? else {
            debug!(path = %path.display(), "no scale export");
            return Ok(None);
        };

        ScaleTableNormalizer::parse(file, canton, tax_type, fiscal_year)
            .map(Some)
            .map_err(|e| e.in_file(&path))
    }

    /// Newest scale export at or below `fiscal_year`, down to the floor year.
    pub fn latest_scale(
        &self,
        canton: Canton,
        tax_type: TaxType,
        fiscal_year: i32,
    ) -> Result<ScaleTable, ExportError> {
        for year in (self.floor_year..=fiscal_year).rev() {
            if let Some(table) = self.load_scale(canton, tax_type, year)? {
                if year != fiscal_year {
                    info!(
                        %canton,
                        %tax_type,
                        requested = fiscal_year,
                        used = year,
                        "using older scale export"
                    );
                }
                return Ok(table);
            }
        }

        Err(ExportError::MissingData {
            what: format!("{canton} {tax_type} scale"),
            from_year: fiscal_year,
            floor_year: self.floor_year,
        })
    }
}

fn open_if_exists(path: &Path) -> Result<Option<BufReader<File>>, ExportError> {
    match File::open(path) {
        Ok(file) => Ok(Some(BufReader::new(file))),
        Err(err) if err.kind() == io::ErrorKind::NotFound => Ok(None),
        Err(err) => Err(ExportError::from(err).in_file(path)),
    }
}

impl ScaleSource for FileExportStore {
    fn scale_table(
        &self,
        canton: Canton,
        tax_type: TaxType,
        fiscal_year: i32,
    ) -> Result<Option<ScaleTable>, SourceError> {
        Ok(self.load_scale(canton, tax_type, fiscal_year)?)
    }
}

impl RateSource for FileExportStore {
    fn rate_table(
        &self,
        fiscal_year: i32,
    ) -> Result<Option<RateTable>, SourceError> {
        Ok(self.load_rates(fiscal_year)?)
    }
}
