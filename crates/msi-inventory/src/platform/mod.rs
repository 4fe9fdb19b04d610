//! Platform bindings for the native installer service.
//!
//! All `#[cfg]` blocks for OS-specific behavior live in this module. The
//! rest of the crate only sees [`InstallerService`](crate::inventory::InstallerService)
//! and [`QueryDescriber`](crate::metadata::QueryDescriber), so it builds and
//! tests on every platform.
//!
//! # Supported Platforms
//!
//! - **Windows**: `msi.dll` through `windows-sys`
//! - **Linux/macOS**: no native installer; only in-memory services

#[cfg(windows)]
mod windows;

#[cfg(windows)]
pub use windows::{MsiDatabaseDescriber, PatchInfoReader, ProductInfoReader, WindowsInstaller};

/// Returns true if a native installer service exists on this platform.
pub fn has_native_installer() -> bool {
    cfg!(windows)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_native_installer_matches_target() {
        assert_eq!(has_native_installer(), cfg!(target_os = "windows"));
    }
}
