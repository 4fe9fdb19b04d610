//! Centralized configuration for the inventory core.
//!
//! Fixed native facts live in [`NativeLimits`]; tunable behavior lives in
//! [`InventoryConfig`], which can be loaded from JSON.

use serde::{Deserialize, Serialize};

use crate::error::{InventoryError, Result};
use crate::property::InstallerVersion;

/// Fixed limits of the Windows Installer native API.
pub struct NativeLimits;

impl NativeLimits {
    /// Characters in a braced GUID plus the terminator.
    pub const GUID_BUFFER_LEN: usize = 39;
    /// Initial property buffer capacity, in characters including the terminator.
    pub const DEFAULT_BUFFER_CAPACITY: usize = 260;
    /// First installer version that ships the `*Ex` property functions.
    pub const EXTENDED_API_MIN_VERSION: InstallerVersion = InstallerVersion::new(3, 0, 0, 0);
}

/// How property reads choose between the legacy and extended native functions.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PropertyApiMode {
    /// Probe the installed native library version once.
    #[default]
    Auto,
    /// Always use the legacy functions.
    Legacy,
    /// Always use the extended functions.
    Extended,
}

/// Tunable behavior of the inventory core.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case", default)]
pub struct InventoryConfig {
    /// Initial capacity handed to every property read.
    pub default_buffer_capacity: usize,
    /// Legacy/extended selection policy.
    pub property_api: PropertyApiMode,
    /// Minimum installer version for which `Auto` selects the extended API.
    pub extended_api_min_version: InstallerVersion,
}

impl Default for InventoryConfig {
    fn default() -> Self {
        Self {
            default_buffer_capacity: NativeLimits::DEFAULT_BUFFER_CAPACITY,
            property_api: PropertyApiMode::Auto,
            extended_api_min_version: NativeLimits::EXTENDED_API_MIN_VERSION,
        }
    }
}

impl InventoryConfig {
    /// Parse and validate a JSON configuration document.
    ///
    /// Missing fields take their default values.
    pub fn from_json_str(json: &str) -> Result<Self> {
        let config: InventoryConfig = serde_json::from_str(json)?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        if self.default_buffer_capacity == 0 {
            return Err(InventoryError::invalid_argument(
                "default_buffer_capacity",
                "must be greater than zero",
            ));
        }
        Ok(())
    }

    pub fn with_buffer_capacity(mut self, capacity: usize) -> Self {
        self.default_buffer_capacity = capacity;
        self
    }

    pub fn with_property_api(mut self, mode: PropertyApiMode) -> Self {
        self.property_api = mode;
        self
    }
}
