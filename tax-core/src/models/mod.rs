mod canton;
mod classification;
mod liability;
mod query;
mod rate_row;
mod scale;

pub use canton::Canton;
pub use classification::{Authority, EntityClass, TaxType};
pub use liability::{LiabilityParts, LiabilityRecord};
pub use query::{TaxQuery, TaxResult};
pub use rate_row::{LevyBody, LevyTax, MULTIPLIER_COLUMNS, RateRow, RateTable};
pub use scale::{ScaleBracket, ScaleRow, ScaleTable, ScaleTableError, ScaleVariant};
