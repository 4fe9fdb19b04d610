//! Process-wide services shared by every inventory consumer.

use std::fmt;
use std::sync::{Arc, OnceLock};

use tracing::debug;

use crate::config::InventoryConfig;
use crate::error::{InventoryError, Result};
use crate::metadata::{QueryDescriber, QueryMetadataCache};
use crate::property::{ApiSelector, BagServices, ConverterRegistry, PropertyApi, VersionProbe};
use crate::status::{StatusTable, Win32StatusTable};

/// Shared services, built once at startup and passed to consumers.
///
/// Clones are cheap and share the API selector and the metadata cache.
///
/// # Example
///
/// ```rust,ignore
/// let context = InventoryContext::builder()
///     .config(InventoryConfig::default().with_buffer_capacity(512))
///     .describer(Arc::new(MsiDatabaseDescriber::new(path)))
///     .build()?;
/// let columns = context.metadata()?.get_columns("SELECT * FROM Property")?;
/// ```
#[derive(Clone)]
pub struct InventoryContext {
    config: Arc<InventoryConfig>,
    table: Arc<dyn StatusTable>,
    converters: Arc<ConverterRegistry>,
    selector: Arc<OnceLock<Arc<ApiSelector>>>,
    metadata: Option<Arc<QueryMetadataCache>>,
}

impl InventoryContext {
    pub fn builder() -> InventoryContextBuilder {
        InventoryContextBuilder::new()
    }

    pub fn config(&self) -> &InventoryConfig {
        &self.config
    }

    pub fn status_table(&self) -> Arc<dyn StatusTable> {
        Arc::clone(&self.table)
    }

    pub fn converters(&self) -> &Arc<ConverterRegistry> {
        &self.converters
    }

    /// The shared API selector, created from `probe` on first use.
    ///
    /// Later calls return the same selector whatever probe they pass.
    pub fn selector(&self, probe: Arc<dyn VersionProbe>) -> Arc<ApiSelector> {
        Arc::clone(
            self.selector
                .get_or_init(|| Arc::new(ApiSelector::new(&self.config, probe))),
        )
    }

    /// Services for a new property bag reading through `api`.
    pub fn bag_services(&self, api: PropertyApi) -> BagServices {
        BagServices::new(api, self.status_table())
            .with_converters(Arc::clone(&self.converters))
            .with_initial_capacity(self.config.default_buffer_capacity)
    }

    /// The query metadata cache.
    ///
    /// Only available when the context was built with a describer.
    pub fn metadata(&self) -> Result<&Arc<QueryMetadataCache>> {
        self.metadata.as_ref().ok_or_else(|| InventoryError::Config {
            message: "No query describer configured for metadata".to_string(),
        })
    }
}

impl Default for InventoryContext {
    fn default() -> Self {
        Self {
            config: Arc::new(InventoryConfig::default()),
            table: Arc::new(Win32StatusTable),
            converters: Arc::new(ConverterRegistry::new()),
            selector: Arc::new(OnceLock::new()),
            metadata: None,
        }
    }
}

impl fmt::Debug for InventoryContext {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("InventoryContext")
            .field("config", &self.config)
            .field("selector", &self.selector.get())
            .field("metadata", &self.metadata.is_some())
            .finish_non_exhaustive()
    }
}

/// Builder for [`InventoryContext`].
#[derive(Default)]
pub struct InventoryContextBuilder {
    config: InventoryConfig,
    table: Option<Arc<dyn StatusTable>>,
    converters: Option<ConverterRegistry>,
    describer: Option<Arc<dyn QueryDescriber>>,
    selector: Option<Arc<ApiSelector>>,
}

impl InventoryContextBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn config(mut self, config: InventoryConfig) -> Self {
        self.config = config;
        self
    }

    /// Status classification table.
    ///
    /// Default: the Win32 installer table.
    pub fn status_table(mut self, table: Arc<dyn StatusTable>) -> Self {
        self.table = Some(table);
        self
    }

    /// Converter registry, for callers registering extra decoders.
    pub fn converters(mut self, converters: ConverterRegistry) -> Self {
        self.converters = Some(converters);
        self
    }

    /// Row describer backing the metadata cache.
    ///
    /// Without one, [`InventoryContext::metadata`] reports a configuration error.
    pub fn describer(mut self, describer: Arc<dyn QueryDescriber>) -> Self {
        self.describer = Some(describer);
        self
    }

    /// Use an already resolved selector instead of probing.
    pub fn selector(mut self, selector: Arc<ApiSelector>) -> Self {
        self.selector = Some(selector);
        self
    }

    pub fn build(self) -> Result<InventoryContext> {
        self.config.validate()?;

        let selector = OnceLock::new();
        if let Some(preset) = self.selector {
            let _ = selector.set(preset);
        }

        let metadata = self
            .describer
            .map(|describer| Arc::new(QueryMetadataCache::new(describer)));
        debug!(
            "Built inventory context (buffer capacity {}, metadata: {})",
            self.config.default_buffer_capacity,
            metadata.is_some()
        );

        Ok(InventoryContext {
            config: Arc::new(self.config),
            table: self.table.unwrap_or_else(|| Arc::new(Win32StatusTable)),
            converters: Arc::new(self.converters.unwrap_or_default()),
            selector: Arc::new(selector),
            metadata,
        })
    }
}
