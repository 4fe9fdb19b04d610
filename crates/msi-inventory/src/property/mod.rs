//! Per-entity lazy property retrieval.
//!
//! A [`PropertyBag`] reads named scalar properties of one entity on demand.
//! Each name reaches the native reader at most once per bag, whatever the
//! outcome; later lookups are served from the bag, and decoded values are
//! memoized per requested type tag as well.
//!
//! # Buffer negotiation
//!
//! A read starts with the configured default capacity. If the native side
//! reports that it needs `n` characters, the read is repeated exactly once
//! with a buffer of `n + 1`. A second shortfall breaks the native contract
//! and is reported as a protocol violation instead of being retried again.

mod buffer;
mod probe;
mod value;

pub use buffer::PropertyBuffer;
pub use probe::{ApiSelector, InstallerVersion, PropertyApi, VersionProbe};
pub use value::{parse_date, Converter, ConverterRegistry, FromProperty, PropertyValue, ValueKind};

use std::collections::hash_map::Entry;
use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use tracing::{debug, trace, warn};

use crate::config::NativeLimits;
use crate::error::{InventoryError, Result};
use crate::status::{NativeStatus, StatusCode, StatusTable, Win32StatusTable};

/// One native property read against a caller-owned buffer.
///
/// Implementations are bound to a single entity.
pub trait PropertyReader {
    fn read(&self, api: PropertyApi, name: &str, buffer: &mut PropertyBuffer) -> StatusCode;
}

impl<F> PropertyReader for F
where
    F: Fn(PropertyApi, &str, &mut PropertyBuffer) -> StatusCode,
{
    fn read(&self, api: PropertyApi, name: &str, buffer: &mut PropertyBuffer) -> StatusCode {
        self(api, name, buffer)
    }
}

/// Shared services every bag needs, cloned cheaply per entity.
#[derive(Clone)]
pub struct BagServices {
    pub api: PropertyApi,
    pub table: Arc<dyn StatusTable>,
    pub converters: Arc<ConverterRegistry>,
    pub initial_capacity: usize,
}

impl BagServices {
    pub fn new(api: PropertyApi, table: Arc<dyn StatusTable>) -> Self {
        Self {
            api,
            table,
            converters: Arc::new(ConverterRegistry::new()),
            initial_capacity: NativeLimits::DEFAULT_BUFFER_CAPACITY,
        }
    }

    pub fn with_converters(mut self, converters: Arc<ConverterRegistry>) -> Self {
        self.converters = converters;
        self
    }

    pub fn with_initial_capacity(mut self, capacity: usize) -> Self {
        self.initial_capacity = capacity;
        self
    }
}

impl Default for BagServices {
    fn default() -> Self {
        Self::new(PropertyApi::Legacy, Arc::new(Win32StatusTable))
    }
}

impl fmt::Debug for BagServices {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("BagServices")
            .field("api", &self.api)
            .field("converters", &self.converters)
            .field("initial_capacity", &self.initial_capacity)
            .finish()
    }
}

#[derive(Debug, Clone)]
enum CellState {
    Present(String),
    Absent,
    Failed(FetchFailure),
}

#[derive(Debug, Clone, Copy)]
enum FetchFailure {
    Native(StatusCode),
    Protocol { capacity: usize, required_len: usize },
}

/// Outcome of decoding a cell under one kind.
#[derive(Debug)]
enum Decoded {
    Value(Option<PropertyValue>),
    Rejected(InventoryError),
}

#[derive(Debug)]
struct PropertyCell {
    state: CellState,
    decoded: HashMap<ValueKind, Decoded>,
}

impl PropertyCell {
    fn new(state: CellState) -> Self {
        Self {
            state,
            decoded: HashMap::new(),
        }
    }
}

/// The native side of a bag: reader, services and call accounting.
struct NativeSource<R> {
    entity: String,
    reader: R,
    services: BagServices,
    calls: usize,
}

impl<R: PropertyReader> NativeSource<R> {
    fn fetch(&mut self, name: &str) -> CellState {
        let mut capacity = self.services.initial_capacity;
        let mut retried = false;

        loop {
            let mut buffer = PropertyBuffer::with_capacity(capacity);
            let code = self.reader.read(self.services.api, name, &mut buffer);
            self.calls += 1;

            match self.services.table.resolve(code, buffer.required_len()) {
                NativeStatus::Success => {
                    trace!("Read {} of {}", name, self.entity);
                    return CellState::Present(buffer.into_value());
                }
                NativeStatus::ValueAbsent => {
                    debug!("Property {} of {} is absent (status {})", name, self.entity, code);
                    return CellState::Absent;
                }
                NativeStatus::InsufficientBuffer(required_len) if !retried => {
                    debug!(
                        "Property {} of {} needs {} characters, retrying",
                        name, self.entity, required_len
                    );
                    capacity = required_len + 1;
                    retried = true;
                }
                NativeStatus::InsufficientBuffer(required_len) => {
                    warn!(
                        "Property {} of {} still needs {} characters after growing to {}",
                        name, self.entity, required_len, capacity
                    );
                    return CellState::Failed(FetchFailure::Protocol {
                        capacity,
                        required_len,
                    });
                }
                NativeStatus::Fatal(code) => {
                    debug!("Reading {} of {} failed with status {}", name, self.entity, code);
                    return CellState::Failed(FetchFailure::Native(code));
                }
                // End-of-sequence has no meaning for a single read.
                NativeStatus::SequenceEnd => {
                    return CellState::Failed(FetchFailure::Native(code));
                }
            }
        }
    }
}

/// Memoized property reads for one entity.
pub struct PropertyBag<R> {
    source: NativeSource<R>,
    cells: HashMap<String, PropertyCell>,
}

impl<R: PropertyReader> PropertyBag<R> {
    /// Create a bag for `entity`. The API flavor in `services` is fixed for
    /// the bag's lifetime.
    pub fn new(entity: impl Into<String>, reader: R, services: BagServices) -> Self {
        Self {
            source: NativeSource {
                entity: entity.into(),
                reader,
                services,
                calls: 0,
            },
            cells: HashMap::new(),
        }
    }

    /// Identifier of the entity this bag reads.
    pub fn entity(&self) -> &str {
        &self.source.entity
    }

    /// API flavor used for every read.
    pub fn api(&self) -> PropertyApi {
        self.source.services.api
    }

    /// Number of native reader invocations so far, retries included.
    pub fn native_calls(&self) -> usize {
        self.source.calls
    }

    /// Whether `name` has already been read, successfully or not.
    pub fn is_cached(&self, name: &str) -> bool {
        self.cells.contains_key(name)
    }

    /// Names read so far.
    pub fn cached_names(&self) -> impl Iterator<Item = &str> {
        self.cells.keys().map(String::as_str)
    }

    /// Get a property decoded as `T`.
    ///
    /// Absent and empty values yield `T::absent()`.
    pub fn get<T: FromProperty>(&mut self, name: &str) -> Result<T> {
        let converters = Arc::clone(&self.source.services.converters);
        let cell = self.cell(name)?;

        let decoded = match cell.decoded.entry(T::KIND) {
            Entry::Occupied(entry) => {
                trace!("Decoded cache hit for {} as {}", name, T::KIND);
                entry.into_mut()
            }
            Entry::Vacant(entry) => {
                let raw = match &cell.state {
                    CellState::Present(raw) => Some(raw.as_str()),
                    _ => None,
                };
                let decoded = match converters.decode(name, T::KIND, raw) {
                    Ok(value) => Decoded::Value(value),
                    Err(e) => Decoded::Rejected(e),
                };
                entry.insert(decoded)
            }
        };

        match decoded {
            Decoded::Value(value) => extract(name, value.as_ref()),
            Decoded::Rejected(e) => Err(rejection(e)),
        }
    }

    /// Get the undecoded string, `None` when the property is absent.
    pub fn raw(&mut self, name: &str) -> Result<Option<&str>> {
        let cell = self.cell(name)?;
        match &cell.state {
            CellState::Present(raw) => Ok(Some(raw.as_str())),
            _ => Ok(None),
        }
    }

    fn cell(&mut self, name: &str) -> Result<&mut PropertyCell> {
        if name.is_empty() {
            return Err(InventoryError::invalid_argument(
                "name",
                "property name must not be empty",
            ));
        }

        let cell = match self.cells.entry(name.to_string()) {
            Entry::Occupied(entry) => entry.into_mut(),
            Entry::Vacant(entry) => {
                let state = self.source.fetch(name);
                entry.insert(PropertyCell::new(state))
            }
        };

        match cell.state {
            CellState::Failed(FetchFailure::Native(code)) => {
                Err(InventoryError::native(format!("read {name}"), code))
            }
            CellState::Failed(FetchFailure::Protocol {
                capacity,
                required_len,
            }) => Err(InventoryError::protocol(
                format!("read {name}"),
                format!(
                    "buffer of {capacity} characters still too small, native layer asked for {required_len}"
                ),
            )),
            _ => Ok(cell),
        }
    }
}

impl<R> fmt::Debug for PropertyBag<R> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PropertyBag")
            .field("entity", &self.source.entity)
            .field("api", &self.source.services.api)
            .field("cached", &self.cells.len())
            .field("native_calls", &self.source.calls)
            .finish()
    }
}

/// Rebuild a remembered decode failure for the caller.
fn rejection(error: &InventoryError) -> InventoryError {
    match error {
        InventoryError::Conversion {
            property,
            kind,
            raw,
        } => InventoryError::Conversion {
            property: property.clone(),
            kind: *kind,
            raw: raw.clone(),
        },
        other => InventoryError::Other(other.to_string()),
    }
}

fn extract<T: FromProperty>(name: &str, decoded: Option<&PropertyValue>) -> Result<T> {
    match decoded {
        None => Ok(T::absent()),
        Some(value) => T::from_decoded(value).ok_or_else(|| InventoryError::Conversion {
            property: name.to_string(),
            kind: T::KIND,
            raw: format!("{value:?}"),
        }),
    }
}
