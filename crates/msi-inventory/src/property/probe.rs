//! Native capability probing.
//!
//! Some properties are only reachable through the extended native read
//! functions, which exist from installer 3.0 onwards. The [`ApiSelector`]
//! decides once which flavor to use and every bag created from it keeps that
//! choice for its whole lifetime.

use std::fmt;
use std::str::FromStr;
use std::sync::{Arc, OnceLock};

use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::config::{InventoryConfig, PropertyApiMode};
use crate::error::{InventoryError, Result};

/// Which family of native property functions to call.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PropertyApi {
    /// Pre-3.0 functions: product code and property name only.
    Legacy,
    /// 3.0+ functions taking install context and user SID.
    Extended,
}

/// Four-part native version number, e.g. `5.0.19041.1`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default)]
pub struct InstallerVersion {
    pub major: u32,
    pub minor: u32,
    pub build: u32,
    pub revision: u32,
}

impl InstallerVersion {
    pub const fn new(major: u32, minor: u32, build: u32, revision: u32) -> Self {
        Self {
            major,
            minor,
            build,
            revision,
        }
    }
}

impl fmt::Display for InstallerVersion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}.{}.{}.{}",
            self.major, self.minor, self.build, self.revision
        )
    }
}

impl FromStr for InstallerVersion {
    type Err = InventoryError;

    /// Parse one to four dot-separated numbers; missing parts are zero.
    fn from_str(s: &str) -> Result<Self> {
        let trimmed = s.trim();
        let invalid = || InventoryError::invalid_argument("version", format!("invalid version {s:?}"));
        if trimmed.is_empty() {
            return Err(invalid());
        }

        let mut parts = [0u32; 4];
        let mut count = 0;
        for piece in trimmed.split('.') {
            if count == parts.len() {
                return Err(invalid());
            }
            parts[count] = piece.parse().map_err(|_| invalid())?;
            count += 1;
        }

        Ok(Self::new(parts[0], parts[1], parts[2], parts[3]))
    }
}

impl Serialize for InstallerVersion {
    fn serialize<S: serde::Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

impl<'de> Deserialize<'de> for InstallerVersion {
    fn deserialize<D: serde::Deserializer<'de>>(deserializer: D) -> std::result::Result<Self, D::Error> {
        let text = String::deserialize(deserializer)?;
        text.parse().map_err(serde::de::Error::custom)
    }
}

/// Reports the version of the installed native library.
pub trait VersionProbe: Send + Sync {
    fn installer_version(&self) -> Result<InstallerVersion>;
}

impl<F> VersionProbe for F
where
    F: Fn() -> Result<InstallerVersion> + Send + Sync,
{
    fn installer_version(&self) -> Result<InstallerVersion> {
        self()
    }
}

/// Chooses the property API flavor, probing the native library at most once.
pub struct ApiSelector {
    mode: PropertyApiMode,
    min_extended: InstallerVersion,
    probe: Arc<dyn VersionProbe>,
    selected: OnceLock<PropertyApi>,
}

impl ApiSelector {
    pub fn new(config: &InventoryConfig, probe: Arc<dyn VersionProbe>) -> Self {
        Self {
            mode: config.property_api,
            min_extended: config.extended_api_min_version,
            probe,
            selected: OnceLock::new(),
        }
    }

    /// Selector that never probes.
    pub fn fixed(api: PropertyApi) -> Self {
        let mode = match api {
            PropertyApi::Legacy => PropertyApiMode::Legacy,
            PropertyApi::Extended => PropertyApiMode::Extended,
        };
        let probe: Arc<dyn VersionProbe> = Arc::new(|| -> Result<InstallerVersion> {
            Err(InventoryError::Config {
                message: "fixed selector does not probe".to_string(),
            })
        });
        let selected = OnceLock::new();
        let _ = selected.set(api);
        Self {
            mode,
            min_extended: InstallerVersion::default(),
            probe,
            selected,
        }
    }

    /// The flavor to use; the first call may probe the native library.
    pub fn select(&self) -> PropertyApi {
        *self.selected.get_or_init(|| match self.mode {
            PropertyApiMode::Legacy => PropertyApi::Legacy,
            PropertyApiMode::Extended => PropertyApi::Extended,
            PropertyApiMode::Auto => self.probe_once(),
        })
    }

    /// Whether a flavor has already been chosen.
    pub fn is_resolved(&self) -> bool {
        self.selected.get().is_some()
    }

    fn probe_once(&self) -> PropertyApi {
        match self.probe.installer_version() {
            Ok(version) if version >= self.min_extended => {
                debug!("Installer {} supports extended property API", version);
                PropertyApi::Extended
            }
            Ok(version) => {
                debug!("Installer {} predates extended property API", version);
                PropertyApi::Legacy
            }
            Err(e) => {
                warn!("Installer version probe failed, using legacy API: {}", e);
                PropertyApi::Legacy
            }
        }
    }
}

impl fmt::Debug for ApiSelector {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ApiSelector")
            .field("mode", &self.mode)
            .field("min_extended", &self.min_extended)
            .field("selected", &self.selected.get())
            .finish()
    }
}
