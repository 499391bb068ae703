//! Built-in news sources.
//!
//! | Kind | Topic | Pagination | Page cap |
//! |------|-------|------------|----------|
//! | `rbc-realty` | 1 | page number | 1 |
//! | `ria-realty` | 2 | page number | 1 |
//! | `e1-realty` | 3 | date window | 50 |
//! | `e1-builders` | 4 | page path | 10 |

mod e1;
mod rbc;
mod ria;

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use url::Url;

use super::adapter::SiteAdapter;
use crate::error::{AppError, Result};

pub use e1::{E1BuildersAdapter, E1RealtyAdapter};
pub use rbc::RbcAdapter;
pub use ria::RiaAdapter;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum AdapterKind {
    RbcRealty,
    RiaRealty,
    E1Realty,
    E1Builders,
}

impl AdapterKind {
    pub const ALL: [AdapterKind; 4] = [
        AdapterKind::RbcRealty,
        AdapterKind::RiaRealty,
        AdapterKind::E1Realty,
        AdapterKind::E1Builders,
    ];

    pub fn name(self) -> &'static str {
        match self {
            AdapterKind::RbcRealty => "rbc-realty",
            AdapterKind::RiaRealty => "ria-realty",
            AdapterKind::E1Realty => "e1-realty",
            AdapterKind::E1Builders => "e1-builders",
        }
    }

    pub fn default_url(self) -> &'static str {
        match self {
            AdapterKind::RbcRealty => rbc::DEFAULT_URL,
            AdapterKind::RiaRealty => ria::DEFAULT_URL,
            AdapterKind::E1Realty => e1::REALTY_URL,
            AdapterKind::E1Builders => e1::BUILDERS_URL,
        }
    }

    pub fn default_topic(self) -> i64 {
        match self {
            AdapterKind::RbcRealty => 1,
            AdapterKind::RiaRealty => 2,
            AdapterKind::E1Realty => 3,
            AdapterKind::E1Builders => 4,
        }
    }

    /// Instantiate the adapter, optionally against a mirror of the site.
    pub fn build(self, base_url: Option<&str>) -> Result<Box<dyn SiteAdapter>> {
        let base = directory_url(Url::parse(base_url.unwrap_or(self.default_url()))?);
        Ok(match self {
            AdapterKind::RbcRealty => Box::new(RbcAdapter::new(base)?),
            AdapterKind::RiaRealty => Box::new(RiaAdapter::new(base)?),
            AdapterKind::E1Realty => Box::new(E1RealtyAdapter::new(base)?),
            AdapterKind::E1Builders => Box::new(E1BuildersAdapter::new(base)?),
        })
    }
}

/// Listing bases are directories; page paths and relative links join onto
/// them, so a missing trailing slash would drop the last segment.
fn directory_url(mut url: Url) -> Url {
    if !url.path().ends_with('/') {
        let path = format!("{}/", url.path());
        url.set_path(&path);
    }
    url
}

impl fmt::Display for AdapterKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for AdapterKind {
    type Err = AppError;

    fn from_str(s: &str) -> Result<Self> {
        AdapterKind::ALL
            .into_iter()
            .find(|kind| kind.name() == s)
            .ok_or_else(|| AppError::UnknownSource(s.to_string()))
    }
}
