//! Applied patch wrapper.

use std::path::PathBuf;

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

use super::keys::PatchKey;
use super::properties::patch as prop;
use crate::error::Result;
use crate::property::{PropertyBag, PropertyReader};

/// Native patch state bits.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PatchState {
    Applied,
    Superseded,
    Obsoleted,
    Registered,
    Unknown,
}

impl PatchState {
    pub fn from_native(value: i32) -> Self {
        match value {
            1 => PatchState::Applied,
            2 => PatchState::Superseded,
            4 => PatchState::Obsoleted,
            8 => PatchState::Registered,
            _ => PatchState::Unknown,
        }
    }

    /// Filter value selecting every state during enumeration.
    pub const ALL_NATIVE: u32 = 1 | 2 | 4 | 8;
}

/// A patch registered for a product, with lazily read properties.
pub struct PatchInstallation<R> {
    key: PatchKey,
    bag: PropertyBag<R>,
}

impl<R: PropertyReader> PatchInstallation<R> {
    pub fn new(key: PatchKey, bag: PropertyBag<R>) -> Self {
        Self { key, bag }
    }

    pub fn key(&self) -> &PatchKey {
        &self.key
    }

    pub fn patch_code(&self) -> &str {
        &self.key.patch_code
    }

    pub fn product_code(&self) -> &str {
        &self.key.product_code
    }

    pub fn properties(&mut self) -> &mut PropertyBag<R> {
        &mut self.bag
    }

    pub fn display_name(&mut self) -> Result<String> {
        self.bag.get(prop::DISPLAY_NAME)
    }

    pub fn state(&mut self) -> Result<PatchState> {
        let state: Option<i32> = self.bag.get(prop::STATE)?;
        Ok(state.map_or(PatchState::Unknown, PatchState::from_native))
    }

    pub fn is_uninstallable(&mut self) -> Result<bool> {
        self.bag.get(prop::UNINSTALLABLE)
    }

    pub fn install_date(&mut self) -> Result<Option<NaiveDate>> {
        self.bag.get(prop::INSTALL_DATE)
    }

    pub fn local_package(&mut self) -> Result<Option<PathBuf>> {
        self.bag.get(prop::LOCAL_PACKAGE)
    }

    pub fn more_info_url(&mut self) -> Result<String> {
        self.bag.get(prop::MORE_INFO_URL)
    }

    pub fn transforms(&mut self) -> Result<Vec<String>> {
        let raw: String = self.bag.get(prop::TRANSFORMS)?;
        Ok(raw
            .split(';')
            .map(str::trim)
            .filter(|t| !t.is_empty())
            .map(str::to_string)
            .collect())
    }
}

impl<R> std::fmt::Debug for PatchInstallation<R> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PatchInstallation")
            .field("key", &self.key)
            .field("bag", &self.bag)
            .finish()
    }
}
