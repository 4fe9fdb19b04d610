//! MSI Inventory - lazy enumeration and property caching over an installer service.
//!
//! This crate adapts an index-driven, status-code-returning installer service
//! into typed Rust sequences and caches:
//!
//! - [`enumerate`] turns `fetch(index)` steps into fused iterators.
//! - [`property`] reads and decodes named properties once per entity,
//!   negotiating buffer sizes with the native side.
//! - [`metadata`] shares column metadata between rows of the same query and
//!   frees it once no row needs it.
//! - [`status`] classifies native result codes.
//!
//! The Windows Installer bindings live in [`platform`]; everything else is
//! platform independent and can be driven by in-memory services.
//!
//! # Example
//!
//! ```rust,ignore
//! use std::sync::Arc;
//! use msi_inventory::{Inventory, InventoryContext, WindowsInstaller};
//!
//! fn main() -> msi_inventory::Result<()> {
//!     let context = InventoryContext::builder().build()?;
//!     let inventory = Inventory::new(Arc::new(WindowsInstaller::new()), context);
//!
//!     for product in inventory.products() {
//!         let mut product = product?;
//!         println!("{} {}", product.product_code(), product.product_name()?);
//!     }
//!     Ok(())
//! }
//! ```

pub mod config;
pub mod context;
pub mod enumerate;
pub mod error;
pub mod inventory;
pub mod metadata;
pub mod platform;
pub mod property;
pub mod status;

// Re-export commonly used types
pub use config::{InventoryConfig, NativeLimits, PropertyApiMode};
pub use context::{InventoryContext, InventoryContextBuilder};
pub use enumerate::{EnumerationSession, IndexedFetch};
pub use error::{InventoryError, Result};
pub use inventory::{
    InstallContext, InstallerService, Inventory, PatchInstallation, PatchKey, PatchState,
    ProductInstallation, ProductKey, ProductState,
};
pub use metadata::{
    CacheStats, ColumnDescriptor, ColumnKind, ColumnSet, ColumnType, DisplayMemberSet,
    FieldValue, QueryDescriber, QueryKey, QueryMetadataCache, RecordView,
};
pub use property::{
    ApiSelector, ConverterRegistry, FromProperty, InstallerVersion, PropertyApi, PropertyBag,
    PropertyBuffer, PropertyReader, ValueKind, VersionProbe,
};
pub use status::{NativeStatus, StatusClass, StatusCode, StatusTable, Win32StatusTable};

#[cfg(windows)]
pub use platform::{MsiDatabaseDescriber, WindowsInstaller};
