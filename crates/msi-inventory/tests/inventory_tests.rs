//! Integration tests for product and patch inventory.
//!
//! These tests drive [`Inventory`] with an in-memory installer service that
//! counts every native call, so memoization and probing are observable.

use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use chrono::NaiveDate;
use msi_inventory::inventory::properties::{patch, product};
use msi_inventory::status::win32;
use msi_inventory::{
    InstallContext, InstallerService, InstallerVersion, Inventory, InventoryConfig,
    InventoryContext, InventoryError, PatchKey, PatchState, ProductKey, ProductState,
    PropertyApi, PropertyApiMode, PropertyBuffer, PropertyReader, Result, StatusCode,
    VersionProbe,
};

const PRODUCT_A: &str = "{11111111-1111-1111-1111-111111111111}";
const PRODUCT_B: &str = "{22222222-2222-2222-2222-222222222222}";
const PRODUCT_C: &str = "{33333333-3333-3333-3333-333333333333}";
const PATCH_A: &str = "{AAAAAAAA-AAAA-AAAA-AAAA-AAAAAAAAAAAA}";

type Properties = HashMap<&'static str, &'static str>;

/// Reader answering from a fixed property map.
///
/// Like the native side, `State` is only reported for a known install
/// context read through the extended API.
struct MemoryReader {
    properties: Properties,
    context: Option<InstallContext>,
    reads: Arc<AtomicUsize>,
}

impl PropertyReader for MemoryReader {
    fn read(&self, api: PropertyApi, name: &str, buffer: &mut PropertyBuffer) -> StatusCode {
        self.reads.fetch_add(1, Ordering::SeqCst);
        if name == product::STATE && (api == PropertyApi::Legacy || self.context.is_none()) {
            return win32::ERROR_UNKNOWN_PROPERTY;
        }
        match self.properties.get(name) {
            None => win32::ERROR_UNKNOWN_PROPERTY,
            Some(value) if buffer.write(value) => win32::ERROR_SUCCESS,
            Some(_) => win32::ERROR_MORE_DATA,
        }
    }
}

/// In-memory installer service.
struct MemoryInstaller {
    version: InstallerVersion,
    products: Vec<(&'static str, Properties)>,
    patches: Vec<(&'static str, &'static str, Properties)>,
    /// Status returned at this enumeration index instead of an item.
    fail_at: Option<(u32, StatusCode)>,
    probes: AtomicUsize,
    enum_calls: AtomicUsize,
    reads: Arc<AtomicUsize>,
}

impl MemoryInstaller {
    fn new(version: InstallerVersion) -> Self {
        Self {
            version,
            products: Vec::new(),
            patches: Vec::new(),
            fail_at: None,
            probes: AtomicUsize::new(0),
            enum_calls: AtomicUsize::new(0),
            reads: Arc::new(AtomicUsize::new(0)),
        }
    }

    fn with_product(mut self, code: &'static str, properties: &[(&'static str, &'static str)]) -> Self {
        self.products.push((code, properties.iter().copied().collect()));
        self
    }

    fn with_patch(
        mut self,
        code: &'static str,
        product_code: &'static str,
        properties: &[(&'static str, &'static str)],
    ) -> Self {
        self.patches
            .push((code, product_code, properties.iter().copied().collect()));
        self
    }

    fn failing_at(mut self, index: u32, code: StatusCode) -> Self {
        self.fail_at = Some((index, code));
        self
    }

    fn reads(&self) -> usize {
        self.reads.load(Ordering::SeqCst)
    }
}

impl VersionProbe for MemoryInstaller {
    fn installer_version(&self) -> Result<InstallerVersion> {
        self.probes.fetch_add(1, Ordering::SeqCst);
        Ok(self.version)
    }
}

impl InstallerService for MemoryInstaller {
    type ProductReader = MemoryReader;
    type PatchReader = MemoryReader;

    fn product_at(&self, api: PropertyApi, index: u32) -> (StatusCode, Option<ProductKey>) {
        self.enum_calls.fetch_add(1, Ordering::SeqCst);
        if let Some((at, code)) = self.fail_at {
            if at == index {
                return (code, None);
            }
        }
        match self.products.get(index as usize) {
            Some((code, _)) => {
                let key = ProductKey::new(*code);
                let key = match api {
                    PropertyApi::Extended => key.with_context(InstallContext::Machine),
                    PropertyApi::Legacy => key,
                };
                (win32::ERROR_SUCCESS, Some(key))
            }
            None => (win32::ERROR_NO_MORE_ITEMS, None),
        }
    }

    fn patch_at(
        &self,
        api: PropertyApi,
        product_code: Option<&str>,
        index: u32,
    ) -> (StatusCode, Option<PatchKey>) {
        if api == PropertyApi::Legacy {
            return (win32::ERROR_CALL_NOT_IMPLEMENTED, None);
        }
        let matching: Vec<_> = self
            .patches
            .iter()
            .filter(|(_, target, _)| product_code.map_or(true, |code| code == *target))
            .collect();
        match matching.get(index as usize) {
            Some((code, target, _)) => {
                let key = PatchKey::new(*code, *target).with_context(InstallContext::Machine);
                (win32::ERROR_SUCCESS, Some(key))
            }
            None => (win32::ERROR_NO_MORE_ITEMS, None),
        }
    }

    fn product_reader(&self, key: &ProductKey) -> MemoryReader {
        let properties = self
            .products
            .iter()
            .find(|(code, _)| *code == key.product_code)
            .map(|(_, properties)| properties.clone())
            .unwrap_or_default();
        MemoryReader {
            properties,
            context: key.context,
            reads: Arc::clone(&self.reads),
        }
    }

    fn patch_reader(&self, key: &PatchKey) -> MemoryReader {
        let properties = self
            .patches
            .iter()
            .find(|(code, target, _)| *code == key.patch_code && *target == key.product_code)
            .map(|(_, _, properties)| properties.clone())
            .unwrap_or_default();
        MemoryReader {
            properties,
            context: key.context,
            reads: Arc::clone(&self.reads),
        }
    }
}

fn modern() -> InstallerVersion {
    InstallerVersion::new(5, 0, 19041, 1)
}

fn three_products() -> MemoryInstaller {
    MemoryInstaller::new(modern())
        .with_product(
            PRODUCT_A,
            &[
                (product::INSTALLED_PRODUCT_NAME, "Alpha"),
                (product::VERSION_STRING, "1.2.3.4"),
                (product::INSTALL_DATE, "20080303"),
                (product::STATE, "5"),
                (product::LANGUAGE, "1033"),
            ],
        )
        .with_product(
            PRODUCT_B,
            &[
                (product::PRODUCT_NAME, "Beta"),
                (product::STATE, "1"),
            ],
        )
        .with_product(PRODUCT_C, &[(product::INSTALLED_PRODUCT_NAME, "Gamma")])
}

fn inventory(service: MemoryInstaller) -> (Inventory<MemoryInstaller>, Arc<MemoryInstaller>) {
    let service = Arc::new(service);
    let inventory = Inventory::new(Arc::clone(&service), InventoryContext::default());
    (inventory, service)
}

#[test]
fn test_enumerates_every_product_in_order() {
    let (inventory, service) = inventory(three_products());

    let codes: Vec<String> = inventory
        .products()
        .map(|product| product.map(|p| p.product_code().to_string()))
        .collect::<Result<_>>()
        .unwrap();

    assert_eq!(codes, [PRODUCT_A, PRODUCT_B, PRODUCT_C]);
    // Three items plus the end-of-sequence step.
    assert_eq!(service.enum_calls.load(Ordering::SeqCst), 4);
}

#[test]
fn test_fatal_status_stops_after_yielded_items() {
    let (inventory, service) =
        inventory(three_products().failing_at(2, win32::ERROR_BAD_CONFIGURATION));

    let mut products = inventory.products();
    assert_eq!(products.next().unwrap().unwrap().product_code(), PRODUCT_A);
    assert_eq!(products.next().unwrap().unwrap().product_code(), PRODUCT_B);

    let err = products.next().unwrap().unwrap_err();
    assert_eq!(err.native_code(), Some(win32::ERROR_BAD_CONFIGURATION));
    assert!(products.next().is_none());
    assert_eq!(service.enum_calls.load(Ordering::SeqCst), 3);
}

#[test]
fn test_properties_are_read_once() {
    let (inventory, service) = inventory(three_products());
    let mut alpha = inventory.product(PRODUCT_A).unwrap();

    assert_eq!(alpha.product_name().unwrap(), "Alpha");
    assert_eq!(alpha.product_name().unwrap(), "Alpha");
    assert_eq!(service.reads(), 1);
}

#[test]
fn test_typed_accessors_decode_values() {
    let (inventory, _) = inventory(three_products());
    let mut alpha = inventory.products().next().unwrap().unwrap();

    assert_eq!(alpha.version().unwrap(), Some(InstallerVersion::new(1, 2, 3, 4)));
    assert_eq!(
        alpha.install_date().unwrap(),
        NaiveDate::from_ymd_opt(2008, 3, 3)
    );
    assert_eq!(alpha.language().unwrap(), Some(1033));
    assert_eq!(alpha.state().unwrap(), ProductState::Installed);
    assert!(alpha.is_installed().unwrap());
}

#[test]
fn test_absent_properties_yield_defaults() {
    let (inventory, _) = inventory(three_products());
    let mut gamma = inventory.product(PRODUCT_C).unwrap();

    assert_eq!(gamma.publisher().unwrap(), "");
    assert_eq!(gamma.install_date().unwrap(), None);
    assert_eq!(gamma.package_code().unwrap(), None);
    assert_eq!(gamma.state().unwrap(), ProductState::Unknown);
}

#[test]
fn test_product_name_falls_back_to_advertised_name() {
    let (inventory, _) = inventory(three_products());
    let mut beta = inventory.product(PRODUCT_B).unwrap();

    assert_eq!(beta.product_name().unwrap(), "Beta");
    assert!(beta.is_advertised().unwrap());
}

#[test]
fn test_direct_open_resolves_install_context() {
    let (inventory, _) = inventory(three_products());
    let mut alpha = inventory.product(PRODUCT_A).unwrap();

    assert_eq!(alpha.key().context, Some(InstallContext::Machine));
    assert_eq!(alpha.properties().api(), PropertyApi::Extended);
    assert_eq!(alpha.state().unwrap(), ProductState::Installed);
}

#[test]
fn test_unregistered_product_reads_with_legacy_api() {
    const UNREGISTERED: &str = "{44444444-4444-4444-4444-444444444444}";
    let (inventory, service) = inventory(three_products());
    let mut product = inventory.product(UNREGISTERED).unwrap();

    // The whole product list was walked without a match.
    assert_eq!(service.enum_calls.load(Ordering::SeqCst), 4);
    assert!(product.key().context.is_none());
    assert_eq!(product.properties().api(), PropertyApi::Legacy);
    assert_eq!(product.state().unwrap(), ProductState::Advertised);
    assert!(!product.properties().is_cached(product::STATE));
}

#[test]
fn test_small_buffer_grows_once() {
    let service = Arc::new(three_products());
    let context = InventoryContext::builder()
        .config(InventoryConfig::default().with_buffer_capacity(4))
        .build()
        .unwrap();
    let inventory = Inventory::new(Arc::clone(&service), context);
    let mut alpha = inventory.product(PRODUCT_A).unwrap();

    assert_eq!(alpha.version().unwrap(), Some(InstallerVersion::new(1, 2, 3, 4)));
    assert_eq!(alpha.properties().native_calls(), 2);
}

#[test]
fn test_invalid_product_code_rejected() {
    let (inventory, service) = inventory(three_products());

    for code in ["", "not-a-guid", "11111111-1111-1111-1111-111111111111"] {
        let err = inventory.product(code).unwrap_err();
        assert!(matches!(err, InventoryError::InvalidArgument { .. }), "{code:?}");
    }
    assert_eq!(service.reads(), 0);
}

#[test]
fn test_old_installer_selects_legacy_api() {
    let service = MemoryInstaller::new(InstallerVersion::new(2, 0, 0, 0))
        .with_product(PRODUCT_A, &[(product::LOCAL_PACKAGE, "C:\\Windows\\Installer\\a.msi")])
        .with_product(PRODUCT_B, &[]);
    let (inventory, _) = inventory(service);
    assert_eq!(inventory.api(), PropertyApi::Legacy);

    let mut products: Vec<_> = inventory.products().collect::<Result<_>>().unwrap();
    assert!(products[0].key().context.is_none());
    assert_eq!(products[0].state().unwrap(), ProductState::Installed);
    assert_eq!(products[1].state().unwrap(), ProductState::Advertised);
}

#[test]
fn test_probe_runs_once_per_context() {
    let service = Arc::new(three_products());
    let context = InventoryContext::default();

    let first = Inventory::new(Arc::clone(&service), context.clone());
    let second = Inventory::new(Arc::clone(&service), context);
    assert_eq!(first.api(), PropertyApi::Extended);
    assert_eq!(second.api(), PropertyApi::Extended);
    let _ = first.products().count();
    let _ = second.products().count();

    assert_eq!(service.probes.load(Ordering::SeqCst), 1);
}

#[test]
fn test_forced_api_skips_probe() {
    let service = Arc::new(three_products());
    let context = InventoryContext::builder()
        .config(InventoryConfig::default().with_property_api(PropertyApiMode::Legacy))
        .build()
        .unwrap();
    let inventory = Inventory::new(Arc::clone(&service), context);

    assert_eq!(inventory.api(), PropertyApi::Legacy);
    assert_eq!(service.probes.load(Ordering::SeqCst), 0);
}

#[test]
fn test_patches_for_one_product() {
    let service = three_products()
        .with_patch(
            PATCH_A,
            PRODUCT_A,
            &[
                (patch::DISPLAY_NAME, "Hotfix"),
                (patch::STATE, "1"),
                (patch::UNINSTALLABLE, "1"),
                (patch::TRANSFORMS, ":Patch1;:Patch1.Upgrade"),
            ],
        )
        .with_patch(PATCH_A, PRODUCT_B, &[]);
    let (inventory, _) = inventory(service);

    let mut patches: Vec<_> = inventory
        .patches(Some(PRODUCT_A))
        .unwrap()
        .collect::<Result<_>>()
        .unwrap();
    assert_eq!(patches.len(), 1);

    let hotfix = &mut patches[0];
    assert_eq!(hotfix.product_code(), PRODUCT_A);
    assert_eq!(hotfix.display_name().unwrap(), "Hotfix");
    assert_eq!(hotfix.state().unwrap(), PatchState::Applied);
    assert!(hotfix.is_uninstallable().unwrap());
    assert_eq!(hotfix.transforms().unwrap(), [":Patch1", ":Patch1.Upgrade"]);

    let all = inventory.patches(None).unwrap().count();
    assert_eq!(all, 2);
}

#[test]
fn test_patches_need_extended_api() {
    let service = MemoryInstaller::new(InstallerVersion::new(2, 0, 0, 0))
        .with_patch(PATCH_A, PRODUCT_A, &[]);
    let (inventory, _) = inventory(service);

    let mut patches = inventory.patches(None).unwrap();
    let err = patches.next().unwrap().unwrap_err();
    assert_eq!(err.native_code(), Some(win32::ERROR_CALL_NOT_IMPLEMENTED));
    assert!(patches.next().is_none());
}

#[test]
fn test_failed_entity_does_not_affect_siblings() {
    let (inventory, _) = inventory(three_products());
    let mut products: Vec<_> = inventory.products().collect::<Result<_>>().unwrap();

    // A text property read as a number fails for that read only.
    let err = products[0].properties().get::<i32>(product::INSTALLED_PRODUCT_NAME);
    assert!(matches!(err, Err(InventoryError::Conversion { .. })));
    assert_eq!(products[1].product_name().unwrap(), "Beta");
    assert_eq!(products[0].product_name().unwrap(), "Alpha");
}
