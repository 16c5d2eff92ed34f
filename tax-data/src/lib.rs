//! Readers for the federal tax administration's export dumps.
//!
//! Exports are header-less CSV dumps of the published spreadsheets: four
//! metadata rows, then data. [`RateTableLoader`] reads the per-commune
//! multipliers, [`ScaleTableNormalizer`] reads one canton's scale and
//! [`FileExportStore`] finds both on disk by year and serves them to the
//! calculation engine.

pub mod error;
pub mod raw;
pub mod rates;
pub mod scales;
pub mod store;

pub use error::ExportError;
pub use rates::RateTableLoader;
pub use scales::{LAYOUTS, ScaleTableNormalizer, VariantClassifier};
pub use store::FileExportStore;
