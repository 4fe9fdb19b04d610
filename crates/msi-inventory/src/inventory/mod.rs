//! Products and patches registered with the installer.
//!
//! [`Inventory`] wires the generic pieces together: an [`InstallerService`]
//! supplies the native enumeration steps and per-entity property readers,
//! [`EnumerationSession`] turns the steps into lazy sequences, and every
//! yielded key gets its own [`PropertyBag`].
//!
//! Entities are independent of each other. A failure while reading one
//! product never affects another, and it is up to the caller whether a batch
//! continues past a failed entity.

mod keys;
mod patch;
mod product;
pub mod properties;

pub use keys::{validate_code, InstallContext, PatchKey, ProductKey};
pub use patch::{PatchInstallation, PatchState};
pub use product::{ProductInstallation, ProductState};

use std::sync::Arc;

use tracing::debug;

use crate::context::InventoryContext;
use crate::enumerate::EnumerationSession;
use crate::error::Result;
use crate::property::{
    ApiSelector, BagServices, PropertyApi, PropertyBag, PropertyReader, VersionProbe,
};
use crate::status::StatusCode;

/// Native integration for one installer implementation.
///
/// Every method is one native step; the core handles sequencing, buffer
/// growth and status classification.
pub trait InstallerService: VersionProbe {
    type ProductReader: PropertyReader;
    type PatchReader: PropertyReader;

    /// Product at `index` of the registered product list.
    fn product_at(&self, api: PropertyApi, index: u32) -> (StatusCode, Option<ProductKey>);

    /// Registration at `index` among those of one product.
    ///
    /// A product may be registered once per install context. The default
    /// walks the full product list; callers skip keys for other products.
    fn product_registration_at(
        &self,
        api: PropertyApi,
        _product_code: &str,
        index: u32,
    ) -> (StatusCode, Option<ProductKey>) {
        self.product_at(api, index)
    }

    /// Patch at `index`, optionally restricted to one product.
    fn patch_at(
        &self,
        api: PropertyApi,
        product_code: Option<&str>,
        index: u32,
    ) -> (StatusCode, Option<PatchKey>);

    fn product_reader(&self, key: &ProductKey) -> Self::ProductReader;

    fn patch_reader(&self, key: &PatchKey) -> Self::PatchReader;
}

/// Entry point for enumerating and inspecting installed entities.
pub struct Inventory<S> {
    service: Arc<S>,
    selector: Arc<ApiSelector>,
    context: InventoryContext,
}

impl<S: InstallerService + 'static> Inventory<S> {
    /// Create an inventory over `service`.
    ///
    /// The property API flavor is probed from the service on first use and
    /// then kept for every entity created through this context.
    pub fn new(service: Arc<S>, context: InventoryContext) -> Self {
        let probe: Arc<dyn VersionProbe> = service.clone();
        let selector = context.selector(probe);
        Self {
            service,
            selector,
            context,
        }
    }

    /// Create an inventory sharing an existing selector.
    pub fn with_selector(
        service: Arc<S>,
        context: InventoryContext,
        selector: Arc<ApiSelector>,
    ) -> Self {
        Self {
            service,
            selector,
            context,
        }
    }

    pub fn context(&self) -> &InventoryContext {
        &self.context
    }

    /// Property API flavor in use; probes on first call.
    pub fn api(&self) -> PropertyApi {
        self.selector.select()
    }

    fn bag_services(&self) -> BagServices {
        self.context.bag_services(self.api())
    }

    /// Lazily enumerate registered products.
    pub fn products(&self) -> impl Iterator<Item = Result<ProductInstallation<S::ProductReader>>> {
        let api = self.api();
        let services = self.bag_services();
        let fetcher = Arc::clone(&self.service);
        let service = Arc::clone(&self.service);
        debug!("Enumerating products with {:?} API", api);

        EnumerationSession::new(
            "enumerate products",
            move |index: u32| fetcher.product_at(api, index),
            self.context.status_table(),
        )
        .map_items(move |key| {
            let reader = service.product_reader(&key);
            let bag = PropertyBag::new(key.product_code.clone(), reader, services.clone());
            ProductInstallation::new(key, bag)
        })
    }

    /// Open one product by code.
    ///
    /// Under the extended API the product's install context is looked up
    /// first. A product with no registration is read through the legacy API,
    /// which needs no context.
    pub fn product(&self, product_code: &str) -> Result<ProductInstallation<S::ProductReader>> {
        validate_code("product_code", product_code)?;
        let (key, api) = match self.api() {
            PropertyApi::Legacy => (ProductKey::new(product_code), PropertyApi::Legacy),
            PropertyApi::Extended => match self.locate_product(product_code)? {
                Some(key) => (key, PropertyApi::Extended),
                None => {
                    debug!("No registration found for {}, reading with legacy API", product_code);
                    (ProductKey::new(product_code), PropertyApi::Legacy)
                }
            },
        };

        let reader = self.service.product_reader(&key);
        let bag = PropertyBag::new(product_code, reader, self.context.bag_services(api));
        Ok(ProductInstallation::new(key, bag))
    }

    /// First registration of `product_code` carrying an install context.
    fn locate_product(&self, product_code: &str) -> Result<Option<ProductKey>> {
        let api = self.api();
        let service = Arc::clone(&self.service);
        let filter = product_code.to_string();
        let registrations = EnumerationSession::new(
            "locate product",
            move |index: u32| service.product_registration_at(api, &filter, index),
            self.context.status_table(),
        );

        for key in registrations {
            let key = key?;
            if key.context.is_some() && key.product_code.eq_ignore_ascii_case(product_code) {
                return Ok(Some(key));
            }
        }
        Ok(None)
    }

    /// Lazily enumerate patches, for one product or for all of them.
    pub fn patches(
        &self,
        product_code: Option<&str>,
    ) -> Result<impl Iterator<Item = Result<PatchInstallation<S::PatchReader>>>> {
        if let Some(code) = product_code {
            validate_code("product_code", code)?;
        }

        let api = self.api();
        let services = self.bag_services();
        let fetcher = Arc::clone(&self.service);
        let service = Arc::clone(&self.service);
        let filter = product_code.map(str::to_string);
        debug!("Enumerating patches for {:?} with {:?} API", filter, api);

        Ok(EnumerationSession::new(
            "enumerate patches",
            move |index: u32| fetcher.patch_at(api, filter.as_deref(), index),
            self.context.status_table(),
        )
        .map_items(move |key| {
            let reader = service.patch_reader(&key);
            let bag = PropertyBag::new(key.patch_code.clone(), reader, services.clone());
            PatchInstallation::new(key, bag)
        }))
    }
}
