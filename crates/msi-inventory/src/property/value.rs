//! Typed decoding of raw property strings.
//!
//! Every target type carries a [`ValueKind`] tag known at compile time. Two
//! kinds have fixed rules (booleans and `YYYYMMDD` dates); the rest are
//! looked up in a [`ConverterRegistry`] built when the context is created.

use std::collections::HashMap;
use std::fmt;
use std::path::PathBuf;

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::{InventoryError, Result};
use crate::property::InstallerVersion;

/// Semantic type tag of a decoded property.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ValueKind {
    Bool,
    Date,
    Text,
    Int16,
    Int32,
    Int64,
    UInt32,
    Guid,
    Version,
    Path,
}

impl ValueKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            ValueKind::Bool => "bool",
            ValueKind::Date => "date",
            ValueKind::Text => "text",
            ValueKind::Int16 => "int16",
            ValueKind::Int32 => "int32",
            ValueKind::Int64 => "int64",
            ValueKind::UInt32 => "uint32",
            ValueKind::Guid => "guid",
            ValueKind::Version => "version",
            ValueKind::Path => "path",
        }
    }
}

impl fmt::Display for ValueKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// A decoded property value.
#[derive(Debug, Clone, PartialEq)]
pub enum PropertyValue {
    Bool(bool),
    Date(NaiveDate),
    Text(String),
    Int16(i16),
    Int32(i32),
    Int64(i64),
    UInt32(u32),
    Guid(Uuid),
    Version(InstallerVersion),
    Path(PathBuf),
}

/// Types a property bag can decode into.
pub trait FromProperty: Sized {
    const KIND: ValueKind;

    /// Value for an absent or empty property.
    fn absent() -> Self;

    /// Extract from a decoded value; `None` if the variant does not match.
    fn from_decoded(value: &PropertyValue) -> Option<Self>;
}

macro_rules! impl_from_property {
    ($ty:ty, $kind:ident, $absent:expr) => {
        impl FromProperty for $ty {
            const KIND: ValueKind = ValueKind::$kind;

            fn absent() -> Self {
                $absent
            }

            fn from_decoded(value: &PropertyValue) -> Option<Self> {
                match value {
                    PropertyValue::$kind(v) => Some(v.clone()),
                    _ => None,
                }
            }
        }
    };
}

impl_from_property!(bool, Bool, false);
impl_from_property!(NaiveDate, Date, NaiveDate::default());
impl_from_property!(String, Text, String::new());
impl_from_property!(i16, Int16, 0);
impl_from_property!(i32, Int32, 0);
impl_from_property!(i64, Int64, 0);
impl_from_property!(u32, UInt32, 0);
impl_from_property!(Uuid, Guid, Uuid::nil());
impl_from_property!(InstallerVersion, Version, InstallerVersion::default());
impl_from_property!(PathBuf, Path, PathBuf::new());

impl<T: FromProperty> FromProperty for Option<T> {
    const KIND: ValueKind = T::KIND;

    fn absent() -> Self {
        None
    }

    fn from_decoded(value: &PropertyValue) -> Option<Self> {
        T::from_decoded(value).map(Some)
    }
}

/// Decode function for one value kind. `None` rejects the input.
pub type Converter = fn(&str) -> Option<PropertyValue>;

/// Registration table of string-to-value converters keyed by kind.
#[derive(Clone)]
pub struct ConverterRegistry {
    converters: HashMap<ValueKind, Converter>,
}

impl ConverterRegistry {
    /// Registry with the built-in converters for every non-fixed kind.
    pub fn new() -> Self {
        let mut registry = Self {
            converters: HashMap::new(),
        };
        registry.register(ValueKind::Text, |raw| Some(PropertyValue::Text(raw.to_string())));
        registry.register(ValueKind::Int16, |raw| raw.trim().parse().ok().map(PropertyValue::Int16));
        registry.register(ValueKind::Int32, |raw| raw.trim().parse().ok().map(PropertyValue::Int32));
        registry.register(ValueKind::Int64, |raw| raw.trim().parse().ok().map(PropertyValue::Int64));
        registry.register(ValueKind::UInt32, |raw| {
            raw.trim().parse().ok().map(PropertyValue::UInt32)
        });
        registry.register(ValueKind::Guid, |raw| {
            Uuid::parse_str(raw.trim()).ok().map(PropertyValue::Guid)
        });
        registry.register(ValueKind::Version, |raw| {
            raw.parse::<InstallerVersion>().ok().map(PropertyValue::Version)
        });
        registry.register(ValueKind::Path, |raw| Some(PropertyValue::Path(PathBuf::from(raw))));
        registry
    }

    /// Register or replace the converter for `kind`.
    ///
    /// Booleans and dates always use their fixed rules; registering them has
    /// no effect on decoding.
    pub fn register(&mut self, kind: ValueKind, converter: Converter) {
        self.converters.insert(kind, converter);
    }

    pub fn converter(&self, kind: ValueKind) -> Option<Converter> {
        self.converters.get(&kind).copied()
    }

    /// Decode a raw value. Absent and empty values decode to `None` without
    /// touching any converter.
    pub fn decode(
        &self,
        property: &str,
        kind: ValueKind,
        raw: Option<&str>,
    ) -> Result<Option<PropertyValue>> {
        let raw = match raw {
            Some(raw) if !raw.is_empty() => raw,
            _ => return Ok(None),
        };

        let decoded = match kind {
            ValueKind::Bool => Some(PropertyValue::Bool(raw.trim() != "0")),
            ValueKind::Date => parse_date(raw).map(PropertyValue::Date),
            other => self.converter(other).and_then(|convert| convert(raw)),
        };

        decoded
            .map(Some)
            .ok_or_else(|| InventoryError::Conversion {
                property: property.to_string(),
                kind,
                raw: raw.to_string(),
            })
    }
}

impl Default for ConverterRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for ConverterRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut kinds: Vec<&str> = self.converters.keys().map(ValueKind::as_str).collect();
        kinds.sort_unstable();
        f.debug_struct("ConverterRegistry").field("kinds", &kinds).finish()
    }
}

/// Parse the fixed 8-digit `YYYYMMDD` form.
pub fn parse_date(raw: &str) -> Option<NaiveDate> {
    let raw = raw.trim();
    if raw.len() != 8 || !raw.bytes().all(|b| b.is_ascii_digit()) {
        return None;
    }
    let year = raw[0..4].parse().ok()?;
    let month = raw[4..6].parse().ok()?;
    let day = raw[6..8].parse().ok()?;
    NaiveDate::from_ymd_opt(year, month, day)
}
