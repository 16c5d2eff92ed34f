use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::TaxError;

/// Tax types that carry a progressive scale.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TaxType {
    Income,
    Assets,
}

impl TaxType {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Income => "income",
            Self::Assets => "assets",
        }
    }
}

/// The body levying a tax on a computed base.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Authority {
    Canton,
    Commune,
    Federal,
}

impl Authority {
    /// Order in which substitute authorities are tried when a scale carries
    /// no rows tagged with the requested one.
    pub const FALLBACK_ORDER: [Authority; 3] = [Self::Canton, Self::Commune, Self::Federal];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Canton => "canton",
            Self::Commune => "commune",
            Self::Federal => "federal",
        }
    }

    /// Export labels, one per export language.
    pub fn labels(&self) -> &'static [&'static str] {
        match self {
            Self::Canton => &["Kanton", "Canton", "Cantone"],
            Self::Commune => &["Gemeinde", "Commune", "Comune", "Municipality"],
            Self::Federal => &[
                "Bund",
                "Confédération",
                "Confederazione",
                "Confederation",
                "Federal",
            ],
        }
    }

    pub fn matches_label(
        &self,
        label: &str,
    ) -> bool {
        self.labels().contains(&label.trim())
    }
}

/// Household class a scale row applies to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EntityClass {
    #[default]
    Single,
    WithFamily,
    All,
}

impl EntityClass {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Single => "single",
            Self::WithFamily => "with_family",
            Self::All => "all",
        }
    }

    /// Export labels, one per export language.
    pub fn labels(&self) -> &'static [&'static str] {
        match self {
            Self::Single => &[
                "Alleinstehend ohne Kinder",
                "Personne vivant seule, sans enfant",
                "Persona sola senza figli",
                "Single, no children",
            ],
            Self::WithFamily => &[
                "Verheiratet / Alleinstehend mit Kindern",
                "Personne mariée / vivant seule, avec enfant",
                "Coniugato / persona sola con figli",
                "Married/Single, with children",
            ],
            Self::All => &["Alle", "Tous", "Tutti", "All"],
        }
    }

    pub fn matches_label(
        &self,
        label: &str,
    ) -> bool {
        self.labels().contains(&label.trim())
    }
}

macro_rules! impl_str_enum {
    ($ty:ty, $what:literal, [$($variant:expr),+ $(,)?]) => {
        impl fmt::Display for $ty {
            fn fmt(
                &self,
                f: &mut fmt::Formatter<'_>,
            ) -> fmt::Result {
                f.write_str(self.as_str())
            }
        }

        impl FromStr for $ty {
            type Err = TaxError;

            fn from_str(s: &str) -> Result<Self, Self::Err> {
                let wanted = s.trim().to_ascii_lowercase();
                [$($variant),+]
                    .into_iter()
                    .find(|v| v.as_str() == wanted)
                    .ok_or_else(|| {
                        let valid: Vec<&str> = [$($variant),+].iter().map(|v| v.as_str()).collect();
                        TaxError::InvalidArgument(format!(
                            "'{}' is not a valid {}; expected one of {:?}",
                            s.trim(),
                            $what,
                            valid
                        ))
                    })
            }
        }
    };
}

impl_str_enum!(TaxType, "tax type", [TaxType::Income, TaxType::Assets]);
impl_str_enum!(
    Authority,
    "tax authority",
    [Authority::Canton, Authority::Commune, Authority::Federal]
);
impl_str_enum!(
    EntityClass,
    "taxable entity",
    [EntityClass::Single, EntityClass::WithFamily, EntityClass::All]
);
