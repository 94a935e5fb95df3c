//! Tunables for search-spot generation.
//!
//! Loaded from RON at level load. Every field has a default, so a config
//! file only needs to mention what it overrides:
//!
//! ```ron
//! SearchConfig(
//!     cover_radius: 20.0,
//!     max_search_spots: 16,
//! )
//! ```
//!
//! Values are not validated. A zero radius or a zero spot cap simply yields
//! groups that contain only the target-position spot.

use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::error::{Result, SearchError};
use crate::math::{decimal_serde, Fixed};

/// Search-spot generation parameters.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SearchConfig {
    /// Radius around the last known target position sampled for cover.
    #[serde(with = "decimal_serde")]
    pub cover_radius: Fixed,
    /// Candidates closer than this to an accepted spot are dropped.
    #[serde(with = "decimal_serde")]
    pub min_spot_separation: Fixed,
    /// Maximum number of cover-derived spots per group. The target spot is
    /// added on top of this.
    pub max_search_spots: usize,
    /// Maximum number of samples taken from a single cover surface.
    pub max_cover_per_surface: usize,
    /// Spot timeout used by callers that do not pass their own, in seconds.
    /// Zero or less means spots stay searched for the rest of the search.
    #[serde(with = "decimal_serde")]
    pub default_spot_timeout: Fixed,
}

impl Default for SearchConfig {
    fn default() -> Self {
        Self {
            cover_radius: Fixed::from_num(15),
            min_spot_separation: Fixed::from_num(1),
            max_search_spots: 32,
            max_cover_per_surface: 4,
            default_spot_timeout: Fixed::ZERO,
        }
    }
}

impl SearchConfig {
    /// Parse a config from a RON string.
    pub fn from_ron_str(ron: &str) -> Result<Self> {
        Ok(ron::from_str(ron)?)
    }

    /// Load a config from a RON file.
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let contents = std::fs::read_to_string(path).map_err(|source| SearchError::ConfigRead {
            path: path.display().to_string(),
            source,
        })?;
        Self::from_ron_str(&contents)
    }
}
