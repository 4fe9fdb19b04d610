//! Identifiers of inventoried entities.

use std::fmt;
use std::sync::LazyLock;

use regex::Regex;
use serde::{Deserialize, Serialize};

use crate::error::{InventoryError, Result};

static BRACED_GUID: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^\{[0-9A-Fa-f]{8}-[0-9A-Fa-f]{4}-[0-9A-Fa-f]{4}-[0-9A-Fa-f]{4}-[0-9A-Fa-f]{12}\}$")
        .unwrap()
});

/// Check that `code` is a braced GUID as the native API expects.
pub fn validate_code(field: &str, code: &str) -> Result<()> {
    if code.is_empty() {
        return Err(InventoryError::invalid_argument(field, "must not be empty"));
    }
    if !BRACED_GUID.is_match(code) {
        return Err(InventoryError::invalid_argument(
            field,
            format!("{code:?} is not a braced GUID"),
        ));
    }
    Ok(())
}

/// Where a product or patch is registered.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum InstallContext {
    UserManaged,
    UserUnmanaged,
    Machine,
}

impl InstallContext {
    /// Native `MSIINSTALLCONTEXT` value.
    pub fn to_native(self) -> u32 {
        match self {
            InstallContext::UserManaged => 1,
            InstallContext::UserUnmanaged => 2,
            InstallContext::Machine => 4,
        }
    }

    pub fn from_native(value: u32) -> Option<Self> {
        match value {
            1 => Some(InstallContext::UserManaged),
            2 => Some(InstallContext::UserUnmanaged),
            4 => Some(InstallContext::Machine),
            _ => None,
        }
    }
}

impl fmt::Display for InstallContext {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            InstallContext::UserManaged => "UserManaged",
            InstallContext::UserUnmanaged => "UserUnmanaged",
            InstallContext::Machine => "Machine",
        };
        write!(f, "{name}")
    }
}

/// A product as yielded by enumeration.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ProductKey {
    pub product_code: String,
    /// Known only when enumerated through the extended API.
    pub context: Option<InstallContext>,
    pub user_sid: Option<String>,
}

impl ProductKey {
    pub fn new(product_code: impl Into<String>) -> Self {
        Self {
            product_code: product_code.into(),
            context: None,
            user_sid: None,
        }
    }

    pub fn with_context(mut self, context: InstallContext) -> Self {
        self.context = Some(context);
        self
    }

    pub fn with_user_sid(mut self, sid: impl Into<String>) -> Self {
        self.user_sid = Some(sid.into());
        self
    }
}

impl fmt::Display for ProductKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.product_code)
    }
}

/// A patch applied to one product.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct PatchKey {
    pub patch_code: String,
    pub product_code: String,
    pub context: Option<InstallContext>,
    pub user_sid: Option<String>,
}

impl PatchKey {
    pub fn new(patch_code: impl Into<String>, product_code: impl Into<String>) -> Self {
        Self {
            patch_code: patch_code.into(),
            product_code: product_code.into(),
            context: None,
            user_sid: None,
        }
    }

    pub fn with_context(mut self, context: InstallContext) -> Self {
        self.context = Some(context);
        self
    }

    pub fn with_user_sid(mut self, sid: impl Into<String>) -> Self {
        self.user_sid = Some(sid.into());
        self
    }
}

impl fmt::Display for PatchKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} on {}", self.patch_code, self.product_code)
    }
}
