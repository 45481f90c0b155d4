//! Store configuration loaded from JSON.
//!
//! Every field is optional in the file; missing fields take their defaults.

use std::collections::HashSet;
use std::io;
use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::route::RouteCatalog;

/// Settings for a [`BookingStore`](crate::BookingStore).
///
/// # Examples
///
/// ```
/// use ridebook::StoreConfig;
///
/// let config = StoreConfig::from_json_str(r#"{ "name": "rides" }"#).unwrap();
/// assert_eq!(config.name, "rides");
/// assert_eq!(config.routes.len(), 4);
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct StoreConfig {
    /// Label attached to every log line as the `store` field.
    pub name: String,
    /// Routes offered for booking.
    pub routes: RouteCatalog,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            name: "bookings".to_owned(),
            routes: RouteCatalog::builtin(),
        }
    }
}

impl StoreConfig {
    /// Parse a configuration from JSON text.
    ///
    /// # Errors
    ///
    /// Returns [`io::Error`] with [`io::ErrorKind::InvalidData`] if the text
    /// is not valid JSON for this type, or if two routes share an id.
    pub fn from_json_str(json: &str) -> io::Result<Self> {
        let config: Self =
            serde_json::from_str(json).map_err(|e| io::Error::new(io::ErrorKind::InvalidData, e))?;
        config.validate()?;
        Ok(config)
    }

    /// Read and parse the configuration file at `path`.
    ///
    /// # Errors
    ///
    /// Returns [`io::Error`] if the file cannot be read or does not parse.
    pub fn load(path: impl AsRef<Path>) -> io::Result<Self> {
        let content = std::fs::read_to_string(path.as_ref())?;
        Self::from_json_str(&content)
    }

    /// Like [`load`](Self::load), but a missing file yields the defaults.
    ///
    /// # Errors
    ///
    /// Returns [`io::Error`] for any failure other than the file not existing.
    pub fn load_or_default(path: impl AsRef<Path>) -> io::Result<Self> {
        let path = path.as_ref();
        match Self::load(path) {
            Ok(config) => Ok(config),
            Err(e) if e.kind() == io::ErrorKind::NotFound => {
                tracing::debug!(path = %path.display(), "no store config, using defaults");
                Ok(Self::default())
            }
            Err(e) => Err(e),
        }
    }

    fn validate(&self) -> io::Result<()> {
        let mut seen = HashSet::new();
        for route in self.routes.iter() {
            if !seen.insert(route.id.as_str()) {
                return Err(io::Error::new(
                    io::ErrorKind::InvalidData,
                    format!("duplicate route id {:?}", route.id),
                ));
            }
        }
        Ok(())
    }
}
