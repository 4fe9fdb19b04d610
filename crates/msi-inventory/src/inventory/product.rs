//! Installed product wrapper.

use std::path::PathBuf;

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::keys::ProductKey;
use super::properties::product as prop;
use crate::error::Result;
use crate::property::{InstallerVersion, PropertyApi, PropertyBag, PropertyReader};

/// Registration state of a product.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ProductState {
    Advertised,
    Installed,
    Unknown,
}

impl ProductState {
    fn from_native(value: i32) -> Self {
        match value {
            1 => ProductState::Advertised,
            5 => ProductState::Installed,
            _ => ProductState::Unknown,
        }
    }
}

/// A product registered with the installer, with lazily read properties.
pub struct ProductInstallation<R> {
    key: ProductKey,
    bag: PropertyBag<R>,
}

impl<R: PropertyReader> ProductInstallation<R> {
    pub fn new(key: ProductKey, bag: PropertyBag<R>) -> Self {
        Self { key, bag }
    }

    pub fn key(&self) -> &ProductKey {
        &self.key
    }

    pub fn product_code(&self) -> &str {
        &self.key.product_code
    }

    /// Direct access to the underlying property bag.
    pub fn properties(&mut self) -> &mut PropertyBag<R> {
        &mut self.bag
    }

    /// Installed name, or the advertised name for advertised products.
    pub fn product_name(&mut self) -> Result<String> {
        let installed: String = self.bag.get(prop::INSTALLED_PRODUCT_NAME)?;
        if !installed.is_empty() {
            return Ok(installed);
        }
        self.bag.get(prop::PRODUCT_NAME)
    }

    pub fn version(&mut self) -> Result<Option<InstallerVersion>> {
        self.bag.get(prop::VERSION_STRING)
    }

    pub fn install_date(&mut self) -> Result<Option<NaiveDate>> {
        self.bag.get(prop::INSTALL_DATE)
    }

    pub fn publisher(&mut self) -> Result<String> {
        self.bag.get(prop::PUBLISHER)
    }

    pub fn local_package(&mut self) -> Result<Option<PathBuf>> {
        self.bag.get(prop::LOCAL_PACKAGE)
    }

    pub fn install_location(&mut self) -> Result<Option<PathBuf>> {
        self.bag.get(prop::INSTALL_LOCATION)
    }

    pub fn install_source(&mut self) -> Result<Option<PathBuf>> {
        self.bag.get(prop::INSTALL_SOURCE)
    }

    pub fn language(&mut self) -> Result<Option<i32>> {
        self.bag.get(prop::LANGUAGE)
    }

    pub fn package_code(&mut self) -> Result<Option<Uuid>> {
        self.bag.get(prop::PACKAGE_CODE)
    }

    pub fn help_link(&mut self) -> Result<String> {
        self.bag.get(prop::HELP_LINK)
    }

    /// Registration state.
    ///
    /// The extended API reports it directly. The legacy API has no such
    /// property, so a product with a cached local package counts as installed.
    pub fn state(&mut self) -> Result<ProductState> {
        match self.bag.api() {
            PropertyApi::Extended => {
                let state: Option<i32> = self.bag.get(prop::STATE)?;
                Ok(state.map_or(ProductState::Unknown, ProductState::from_native))
            }
            PropertyApi::Legacy => {
                let package = self.local_package()?;
                Ok(if package.is_some() {
                    ProductState::Installed
                } else {
                    ProductState::Advertised
                })
            }
        }
    }

    pub fn is_installed(&mut self) -> Result<bool> {
        Ok(self.state()? == ProductState::Installed)
    }

    pub fn is_advertised(&mut self) -> Result<bool> {
        Ok(self.state()? == ProductState::Advertised)
    }
}

impl<R> std::fmt::Debug for ProductInstallation<R> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ProductInstallation")
            .field("key", &self.key)
            .field("bag", &self.bag)
            .finish()
    }
}
