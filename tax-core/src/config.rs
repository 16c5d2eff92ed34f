use chrono::{Datelike, Local};
use serde::{Deserialize, Serialize};

/// Oldest fiscal year the export service publishes.
pub const DEFAULT_FLOOR_YEAR: i32 = 2010;

/// Entries kept per cache before the least recently used one is evicted.
pub const DEFAULT_CACHE_CAPACITY: usize = 256;

/// Engine-wide settings shared by the calculator, resolver and aggregator.
///
/// | field            | meaning |
/// |------------------|---------|
/// | `floor_year`     | year fallback stops here (inclusive) |
/// | `cache_capacity` | bound of every read-through cache |
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    pub floor_year: i32,
    pub cache_capacity: usize,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            floor_year: DEFAULT_FLOOR_YEAR,
            cache_capacity: DEFAULT_CACHE_CAPACITY,
        }
    }
}

/// The calendar year of the local clock, the natural "latest" fiscal year.
pub fn current_fiscal_year() -> i32 {
    Local::now().year()
}

/// Years from `from_year` down to `floor_year`, newest first.
pub(crate) fn years_down_to(
    from_year: i32,
    floor_year: i32,
) -> impl Iterator<Item = i32> {
    (floor_year..=from_year).rev()
}
