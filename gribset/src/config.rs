//! Display configuration for tabulating records.

use std::path::Path;

use serde::Deserialize;

use crate::error::{Error, Result};

/// Keys tabulated when nothing else is configured.
pub const DEFAULT_KEYS: [&str; 9] = [
    "edition",
    "centre",
    "typeOfLevel",
    "level",
    "dataDate",
    "stepRange",
    "shortName",
    "packingType",
    "gridType",
];

/// Which fields to show and how many rows.
///
/// When `namespace` is set it wins over `keys`: columns come from the codec's
/// namespace iterator on the first record.
#[derive(Debug, Clone, PartialEq)]
pub struct DisplayConfig {
    pub keys: Vec<String>,
    pub namespace: Option<String>,
    /// Elide the middle of listings longer than this.
    pub max_rows: Option<usize>,
}

/// On-disk shape; every field optional so explicit `keys` can be told apart
/// from defaults.
#[derive(Debug, Default, Deserialize)]
#[serde(deny_unknown_fields)]
struct RawDisplayConfig {
    keys: Option<Vec<String>>,
    namespace: Option<String>,
    max_rows: Option<usize>,
}

impl Default for DisplayConfig {
    fn default() -> Self {
        Self {
            keys: default_keys(),
            namespace: None,
            max_rows: None,
        }
    }
}

fn default_keys() -> Vec<String> {
    DEFAULT_KEYS.iter().map(|k| (*k).to_owned()).collect()
}

impl DisplayConfig {
    /// Explicit `keys` and `namespace` are mutually exclusive. Empty `keys`
    /// fall back to the defaults.
    pub fn new(
        keys: Option<Vec<String>>,
        namespace: Option<String>,
        max_rows: Option<usize>,
    ) -> Result<Self> {
        if keys.is_some() && namespace.is_some() {
            return Err(Error::Config(
                "keys and namespace cannot be provided together".into(),
            ));
        }
        Ok(Self {
            keys: keys.filter(|k| !k.is_empty()).unwrap_or_else(default_keys),
            namespace,
            max_rows,
        })
    }

    pub fn from_toml_str(s: &str) -> Result<Self> {
        let raw: RawDisplayConfig =
            toml::from_str(s).map_err(|e| Error::Config(e.to_string()))?;
        Self::new(raw.keys, raw.namespace, raw.max_rows)
    }

    pub fn from_path(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path).map_err(|source| {
            if source.kind() == std::io::ErrorKind::NotFound {
                Error::FileNotFound(path.to_path_buf())
            } else {
                Error::Io {
                    path: path.to_path_buf(),
                    source,
                }
            }
        })?;
        Self::from_toml_str(&text)
    }

    /// Set one option from its textual form. Recognized: `keys` (comma
    /// separated), `namespace`, `max_rows` (`none` or empty clears it).
    pub fn update(&mut self, option: &str, value: &str) -> Result<()> {
        let value = value.trim();
        match option {
            "keys" => {
                self.keys = value
                    .split(',')
                    .map(str::trim)
                    .filter(|k| !k.is_empty())
                    .map(str::to_owned)
                    .collect();
            }
            "namespace" => {
                self.namespace = (!value.is_empty()).then(|| value.to_owned());
            }
            "max_rows" => {
                self.max_rows = match value {
                    "" | "none" => None,
                    v => Some(v.parse().map_err(|_| {
                        Error::Config(format!(
                            "max_rows must be a non-negative integer, got '{v}'"
                        ))
                    })?),
                };
            }
            other => return Err(Error::Config(format!("invalid option: {other}"))),
        }
        Ok(())
    }

    pub fn reset(&mut self) {
        *self = Self::default();
    }
}
