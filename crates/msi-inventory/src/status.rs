//! Native status classification.
//!
//! The native layer reports every call outcome as a bare numeric code. The
//! core never interprets those codes directly; it asks a [`StatusTable`]
//! supplied by the integration layer to place each code into one of five
//! classes, and combines the class with the length the native call reported
//! through its buffer.

use std::collections::HashMap;
use std::fmt;

use serde::{Deserialize, Serialize};

/// Raw status code returned by a native call.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct StatusCode(pub u32);

impl StatusCode {
    pub fn raw(self) -> u32 {
        self.0
    }
}

impl fmt::Display for StatusCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<u32> for StatusCode {
    fn from(code: u32) -> Self {
        StatusCode(code)
    }
}

/// Classification of a native status code.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StatusClass {
    Success,
    SequenceEnd,
    ValueAbsent,
    InsufficientBuffer,
    Fatal,
}

/// A classified native outcome, carrying the data each class needs.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NativeStatus {
    Success,
    SequenceEnd,
    ValueAbsent,
    /// The value needs `required_len` characters, not counting the terminator.
    InsufficientBuffer(usize),
    Fatal(StatusCode),
}

impl NativeStatus {
    /// Combine a class with the raw code and the length reported by the call.
    pub fn from_class(class: StatusClass, code: StatusCode, required_len: usize) -> Self {
        match class {
            StatusClass::Success => NativeStatus::Success,
            StatusClass::SequenceEnd => NativeStatus::SequenceEnd,
            StatusClass::ValueAbsent => NativeStatus::ValueAbsent,
            StatusClass::InsufficientBuffer => NativeStatus::InsufficientBuffer(required_len),
            StatusClass::Fatal => NativeStatus::Fatal(code),
        }
    }
}

/// Maps native codes to status classes.
///
/// Implementations must be pure: the same code always yields the same class.
pub trait StatusTable: Send + Sync {
    fn classify(&self, code: StatusCode) -> StatusClass;

    /// Classify and attach the reported length in one step.
    fn resolve(&self, code: StatusCode, required_len: usize) -> NativeStatus {
        NativeStatus::from_class(self.classify(code), code, required_len)
    }
}

/// Win32 error codes returned by msi.dll.
pub mod win32 {
    use super::StatusCode;

    pub const ERROR_SUCCESS: StatusCode = StatusCode(0);
    pub const ERROR_ACCESS_DENIED: StatusCode = StatusCode(5);
    pub const ERROR_INVALID_PARAMETER: StatusCode = StatusCode(87);
    pub const ERROR_CALL_NOT_IMPLEMENTED: StatusCode = StatusCode(120);
    pub const ERROR_MORE_DATA: StatusCode = StatusCode(234);
    pub const ERROR_NO_MORE_ITEMS: StatusCode = StatusCode(259);
    pub const ERROR_UNKNOWN_PRODUCT: StatusCode = StatusCode(1605);
    pub const ERROR_UNKNOWN_COMPONENT: StatusCode = StatusCode(1607);
    pub const ERROR_UNKNOWN_PROPERTY: StatusCode = StatusCode(1608);
    pub const ERROR_BAD_CONFIGURATION: StatusCode = StatusCode(1610);
    pub const ERROR_UNKNOWN_PATCH: StatusCode = StatusCode(1647);
}

/// Default classification for the Windows Installer code space.
///
/// Unknown product, component, property and patch are treated as absent
/// values. Every code not listed is fatal, including access-denied.
#[derive(Debug, Clone, Copy, Default)]
pub struct Win32StatusTable;

impl StatusTable for Win32StatusTable {
    fn classify(&self, code: StatusCode) -> StatusClass {
        match code {
            win32::ERROR_SUCCESS => StatusClass::Success,
            win32::ERROR_NO_MORE_ITEMS => StatusClass::SequenceEnd,
            win32::ERROR_MORE_DATA => StatusClass::InsufficientBuffer,
            win32::ERROR_UNKNOWN_PRODUCT
            | win32::ERROR_UNKNOWN_COMPONENT
            | win32::ERROR_UNKNOWN_PROPERTY
            | win32::ERROR_UNKNOWN_PATCH => StatusClass::ValueAbsent,
            _ => StatusClass::Fatal,
        }
    }
}

/// Explicit code-to-class registration table.
///
/// Used by integrations whose native layer does not speak Win32 codes.
/// Codes that were never registered are fatal.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct MappedStatusTable {
    entries: HashMap<u32, StatusClass>,
}

impl MappedStatusTable {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a code, replacing any previous class for it.
    pub fn with(mut self, code: impl Into<StatusCode>, class: StatusClass) -> Self {
        self.entries.insert(code.into().raw(), class);
        self
    }

    pub fn insert(&mut self, code: impl Into<StatusCode>, class: StatusClass) {
        self.entries.insert(code.into().raw(), class);
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

impl StatusTable for MappedStatusTable {
    fn classify(&self, code: StatusCode) -> StatusClass {
        self.entries
            .get(&code.raw())
            .copied()
            .unwrap_or(StatusClass::Fatal)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_win32_classification() {
        let table = Win32StatusTable;
        assert_eq!(table.classify(win32::ERROR_SUCCESS), StatusClass::Success);
        assert_eq!(table.classify(win32::ERROR_NO_MORE_ITEMS), StatusClass::SequenceEnd);
        assert_eq!(table.classify(win32::ERROR_MORE_DATA), StatusClass::InsufficientBuffer);
        assert_eq!(table.classify(win32::ERROR_UNKNOWN_PRODUCT), StatusClass::ValueAbsent);
        assert_eq!(table.classify(win32::ERROR_UNKNOWN_PROPERTY), StatusClass::ValueAbsent);
        assert_eq!(table.classify(win32::ERROR_UNKNOWN_PATCH), StatusClass::ValueAbsent);
        assert_eq!(table.classify(win32::ERROR_ACCESS_DENIED), StatusClass::Fatal);
        assert_eq!(table.classify(win32::ERROR_BAD_CONFIGURATION), StatusClass::Fatal);
    }

    #[test]
    fn test_resolve_carries_length_and_code() {
        let table = Win32StatusTable;
        assert_eq!(
            table.resolve(win32::ERROR_MORE_DATA, 12),
            NativeStatus::InsufficientBuffer(12)
        );
        assert_eq!(
            table.resolve(StatusCode(1603), 0),
            NativeStatus::Fatal(StatusCode(1603))
        );
    }

    #[test]
    fn test_mapped_table_defaults_to_fatal() {
        let table = MappedStatusTable::new()
            .with(0u32, StatusClass::Success)
            .with(1u32, StatusClass::SequenceEnd);
        assert_eq!(table.len(), 2);
        assert_eq!(table.classify(StatusCode(1)), StatusClass::SequenceEnd);
        assert_eq!(table.classify(StatusCode(99)), StatusClass::Fatal);
    }
}
