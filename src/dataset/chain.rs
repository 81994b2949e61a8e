//! Supported chains.

use std::fmt;

use crate::error::{TranslationError, TranslationResult};

/// A dataset whose tables the migration targets.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Chain {
    Ethereum,
    Gnosis,
    Optimism,
    Bnb,
    Polygon,
}

impl Chain {
    /// Checked in this order, so `"gnosis-ethereum"` resolves to gnosis.
    const LOOKUP: [Chain; 5] = [
        Chain::Gnosis,
        Chain::Optimism,
        Chain::Bnb,
        Chain::Polygon,
        Chain::Ethereum,
    ];

    /// Resolve a free-form dataset name by case-insensitive containment.
    pub fn resolve(name: &str) -> TranslationResult<Self> {
        let lower = name.to_lowercase();
        Self::LOOKUP
            .into_iter()
            .find(|c| lower.contains(c.as_str()))
            .ok_or_else(|| TranslationError::UnknownDataset(name.to_string()))
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Chain::Ethereum => "ethereum",
            Chain::Gnosis => "gnosis",
            Chain::Optimism => "optimism",
            Chain::Bnb => "bnb",
            Chain::Polygon => "polygon",
        }
    }
}

impl fmt::Display for Chain {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for Chain {
    type Err = TranslationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::resolve(s)
    }
}
