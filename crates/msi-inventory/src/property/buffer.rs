//! Caller-owned string buffer for the size-negotiation protocol.
//!
//! Native property reads take a buffer with a fixed capacity, measured in
//! characters including the terminator. When the value does not fit, the
//! native side reports the length it needs (without the terminator) and the
//! caller retries once with a buffer of that length plus one.

/// Buffer handed to a [`PropertyReader`](super::PropertyReader) call.
#[derive(Debug, Clone)]
pub struct PropertyBuffer {
    capacity: usize,
    value: String,
    required_len: usize,
}

impl PropertyBuffer {
    /// Create an empty buffer. A zero capacity is raised to one character so
    /// the terminator always fits.
    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            capacity: capacity.max(1),
            value: String::new(),
            required_len: 0,
        }
    }

    /// Capacity in characters, including the terminator.
    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Store `value` if it fits, otherwise record the length it needs.
    ///
    /// Returns `true` when the value was stored. Length is counted in UTF-16
    /// code units, the unit the native API measures in.
    pub fn write(&mut self, value: &str) -> bool {
        let needed = value.encode_utf16().count();
        if needed + 1 > self.capacity {
            self.value.clear();
            self.required_len = needed;
            return false;
        }
        self.value.clear();
        self.value.push_str(value);
        self.required_len = needed;
        true
    }

    /// Store a value the native side already copied into its own storage.
    pub fn set_value(&mut self, value: String) {
        self.required_len = value.encode_utf16().count();
        self.value = value;
    }

    /// Record the length reported by an insufficient-buffer result.
    pub fn set_required_len(&mut self, len: usize) {
        self.required_len = len;
    }

    /// Length reported by the last call, without the terminator.
    pub fn required_len(&self) -> usize {
        self.required_len
    }

    pub fn value(&self) -> &str {
        &self.value
    }

    pub fn into_value(self) -> String {
        self.value
    }
}
