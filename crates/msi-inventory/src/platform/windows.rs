//! Windows Installer bindings over `msi.dll`.
//!
//! Every function here performs exactly one native step and reports the raw
//! status; sequencing, buffer growth and classification stay in the core.
//! The one exception is [`MsiDatabaseDescriber`], which drives a whole
//! database round-trip because the metadata cache expects a finished result.

#![allow(unsafe_code)]

use std::os::windows::ffi::OsStrExt;
use std::path::{Path, PathBuf};
use std::ptr;

use tracing::{debug, trace};
use windows_sys::Win32::System::ApplicationInstallationAndServicing::{
    MsiCloseHandle, MsiDatabaseOpenViewW, MsiEnumPatchesExW, MsiEnumProductsExW,
    MsiEnumProductsW, MsiGetFileVersionW, MsiGetPatchInfoExW, MsiGetPatchInfoW,
    MsiGetProductInfoExW, MsiGetProductInfoW, MsiOpenDatabaseW, MsiRecordGetFieldCount,
    MsiRecordGetStringW, MsiViewGetColumnInfo, MSICOLINFO, MSICOLINFO_NAMES, MSICOLINFO_TYPES,
    MSIHANDLE, MSIINSTALLCONTEXT, MSIINSTALLCONTEXT_ALL,
};
use windows_sys::Win32::System::SystemInformation::GetSystemDirectoryW;

use crate::config::NativeLimits;
use crate::error::{InventoryError, Result};
use crate::inventory::{InstallContext, InstallerService, PatchKey, PatchState, ProductKey};
use crate::metadata::{ColumnDescriptor, QueryDescriber};
use crate::property::{InstallerVersion, PropertyApi, PropertyBuffer, PropertyReader, VersionProbe};
use crate::status::{win32, NativeStatus, StatusCode, StatusTable, Win32StatusTable};

/// Capacity for user SID strings returned by the extended enumerators.
const SID_BUFFER_LEN: usize = 256;

/// Capacity for the dotted installer version string.
const VERSION_BUFFER_LEN: usize = 64;

const MAX_PATH: usize = 260;

/// Null-terminated UTF-16 copy of `value`.
fn wide(value: &str) -> Vec<u16> {
    value.encode_utf16().chain(Some(0)).collect()
}

fn wide_path(path: &Path) -> Vec<u16> {
    path.as_os_str().encode_wide().chain(Some(0)).collect()
}

fn wide_opt(value: Option<&str>) -> Option<Vec<u16>> {
    value.map(wide)
}

fn as_pcwstr(value: &Option<Vec<u16>>) -> *const u16 {
    value.as_ref().map_or(ptr::null(), |v| v.as_ptr())
}

/// Decode the first `len` characters of a filled native buffer.
fn from_wide(buffer: &[u16], len: usize) -> String {
    String::from_utf16_lossy(&buffer[..len.min(buffer.len())])
}

/// Owned `MSIHANDLE`, closed on drop.
struct MsiHandle(MSIHANDLE);

impl MsiHandle {
    fn raw(&self) -> MSIHANDLE {
        self.0
    }
}

impl Drop for MsiHandle {
    fn drop(&mut self) {
        if self.0 != 0 {
            // SAFETY: the handle was returned by msi.dll, is owned by this
            // guard and is closed exactly once.
            unsafe {
                MsiCloseHandle(self.0);
            }
        }
    }
}

/// Run a string-returning native call with one buffer-growth retry.
///
/// `call` receives the buffer and an in/out length: capacity going in, the
/// reported length coming back. It returns the native status.
fn negotiate_string(
    operation: &str,
    initial: usize,
    mut call: impl FnMut(&mut [u16], &mut u32) -> u32,
) -> Result<String> {
    let table = Win32StatusTable;
    let mut capacity = initial.max(1);

    for attempt in 0..2 {
        let mut buffer = vec![0u16; capacity];
        let mut len = capacity as u32;
        let code = StatusCode(call(&mut buffer, &mut len));
        match table.resolve(code, len as usize) {
            NativeStatus::Success => return Ok(from_wide(&buffer, len as usize)),
            NativeStatus::InsufficientBuffer(required) if attempt == 0 => {
                capacity = required + 1;
            }
            NativeStatus::InsufficientBuffer(required) => {
                return Err(InventoryError::protocol(
                    operation,
                    format!("still needs {} characters after growing to {}", required, capacity),
                ));
            }
            _ => return Err(InventoryError::native(operation, code)),
        }
    }

    Err(InventoryError::protocol(operation, "buffer negotiation did not settle"))
}

/// Fill a [`PropertyBuffer`] from a single native read.
fn fill_buffer(buffer: &mut PropertyBuffer, call: impl FnOnce(*mut u16, *mut u32) -> u32) -> StatusCode {
    let capacity = buffer.capacity();
    let mut native = vec![0u16; capacity];
    let mut len = capacity as u32;
    let code = StatusCode(call(native.as_mut_ptr(), &mut len));

    if code == win32::ERROR_SUCCESS {
        buffer.set_value(from_wide(&native, len as usize));
    } else if code == win32::ERROR_MORE_DATA {
        buffer.set_required_len(len as usize);
    }
    code
}

/// The installed Windows Installer service.
#[derive(Debug, Default, Clone, Copy)]
pub struct WindowsInstaller;

impl WindowsInstaller {
    pub fn new() -> Self {
        Self
    }

    fn system_msi_path() -> Result<PathBuf> {
        let mut buffer = vec![0u16; MAX_PATH];
        // SAFETY: the buffer holds MAX_PATH characters and that capacity is
        // passed alongside it.
        let len = unsafe { GetSystemDirectoryW(buffer.as_mut_ptr(), buffer.len() as u32) } as usize;
        if len == 0 || len >= buffer.len() {
            return Err(InventoryError::Other(
                "Failed to resolve the system directory".to_string(),
            ));
        }
        Ok(PathBuf::from(from_wide(&buffer, len)).join("msi.dll"))
    }

    fn enum_products_legacy(index: u32) -> (StatusCode, Option<ProductKey>) {
        let mut code_buf = vec![0u16; NativeLimits::GUID_BUFFER_LEN];
        // SAFETY: MsiEnumProductsW writes at most 39 characters, the size
        // of a braced GUID plus terminator.
        let status = StatusCode(unsafe { MsiEnumProductsW(index, code_buf.as_mut_ptr()) });
        if status != win32::ERROR_SUCCESS {
            return (status, None);
        }
        let code = from_wide(&code_buf, NativeLimits::GUID_BUFFER_LEN - 1);
        (status, Some(ProductKey::new(code)))
    }

    fn enum_products_extended(
        product_code: Option<&str>,
        index: u32,
    ) -> (StatusCode, Option<ProductKey>) {
        let filter = wide_opt(product_code);
        let mut code_buf = vec![0u16; NativeLimits::GUID_BUFFER_LEN];
        let mut sid_buf = vec![0u16; SID_BUFFER_LEN];
        let mut sid_len = SID_BUFFER_LEN as u32;
        let mut context: MSIINSTALLCONTEXT = 0;

        // SAFETY: the product filter is null or null-terminated; every output
        // buffer is sized as declared by its length argument.
        let status = StatusCode(unsafe {
            MsiEnumProductsExW(
                as_pcwstr(&filter),
                ptr::null(),
                MSIINSTALLCONTEXT_ALL as _,
                index,
                code_buf.as_mut_ptr(),
                &mut context,
                sid_buf.as_mut_ptr(),
                &mut sid_len,
            )
        });
        if status != win32::ERROR_SUCCESS {
            return (status, None);
        }

        let mut key = ProductKey::new(from_wide(&code_buf, NativeLimits::GUID_BUFFER_LEN - 1));
        if let Some(context) = InstallContext::from_native(context as u32) {
            key = key.with_context(context);
        }
        if sid_len > 0 {
            key = key.with_user_sid(from_wide(&sid_buf, sid_len as usize));
        }
        (status, Some(key))
    }
}

impl VersionProbe for WindowsInstaller {
    fn installer_version(&self) -> Result<InstallerVersion> {
        let path = wide_path(&Self::system_msi_path()?);
        let raw = negotiate_string("MsiGetFileVersion", VERSION_BUFFER_LEN, |buffer, len| {
            // SAFETY: `path` is null-terminated; the version buffer and its
            // capacity come from `negotiate_string`; language output is skipped.
            unsafe {
                MsiGetFileVersionW(
                    path.as_ptr(),
                    buffer.as_mut_ptr(),
                    len,
                    ptr::null_mut(),
                    ptr::null_mut(),
                )
            }
        })?;
        debug!("Windows Installer version {}", raw);
        raw.parse()
    }
}

impl InstallerService for WindowsInstaller {
    type ProductReader = ProductInfoReader;
    type PatchReader = PatchInfoReader;

    fn product_at(&self, api: PropertyApi, index: u32) -> (StatusCode, Option<ProductKey>) {
        trace!("MsiEnumProducts index {} ({:?})", index, api);
        match api {
            PropertyApi::Legacy => Self::enum_products_legacy(index),
            PropertyApi::Extended => Self::enum_products_extended(None, index),
        }
    }

    fn product_registration_at(
        &self,
        api: PropertyApi,
        product_code: &str,
        index: u32,
    ) -> (StatusCode, Option<ProductKey>) {
        trace!("MsiEnumProductsEx {} index {} ({:?})", product_code, index, api);
        match api {
            PropertyApi::Legacy => Self::enum_products_legacy(index),
            PropertyApi::Extended => Self::enum_products_extended(Some(product_code), index),
        }
    }

    fn patch_at(
        &self,
        api: PropertyApi,
        product_code: Option<&str>,
        index: u32,
    ) -> (StatusCode, Option<PatchKey>) {
        // Patch enumeration exists only in the extended API.
        if api == PropertyApi::Legacy {
            return (win32::ERROR_CALL_NOT_IMPLEMENTED, None);
        }

        let product = wide_opt(product_code);
        let mut patch_buf = vec![0u16; NativeLimits::GUID_BUFFER_LEN];
        let mut target_buf = vec![0u16; NativeLimits::GUID_BUFFER_LEN];
        let mut sid_buf = vec![0u16; SID_BUFFER_LEN];
        let mut sid_len = SID_BUFFER_LEN as u32;
        let mut context: MSIINSTALLCONTEXT = 0;

        // SAFETY: the product filter is null or null-terminated; output
        // buffers match the sizes the API documents or the passed length.
        let status = StatusCode(unsafe {
            MsiEnumPatchesExW(
                as_pcwstr(&product),
                ptr::null(),
                MSIINSTALLCONTEXT_ALL as _,
                PatchState::ALL_NATIVE,
                index,
                patch_buf.as_mut_ptr(),
                target_buf.as_mut_ptr(),
                &mut context,
                sid_buf.as_mut_ptr(),
                &mut sid_len,
            )
        });
        if status != win32::ERROR_SUCCESS {
            return (status, None);
        }

        let mut key = PatchKey::new(
            from_wide(&patch_buf, NativeLimits::GUID_BUFFER_LEN - 1),
            from_wide(&target_buf, NativeLimits::GUID_BUFFER_LEN - 1),
        );
        if let Some(context) = InstallContext::from_native(context as u32) {
            key = key.with_context(context);
        }
        if sid_len > 0 {
            key = key.with_user_sid(from_wide(&sid_buf, sid_len as usize));
        }
        (status, Some(key))
    }

    fn product_reader(&self, key: &ProductKey) -> ProductInfoReader {
        ProductInfoReader {
            product_code: wide(&key.product_code),
            user_sid: wide_opt(key.user_sid.as_deref()),
            context: key.context,
        }
    }

    fn patch_reader(&self, key: &PatchKey) -> PatchInfoReader {
        PatchInfoReader {
            patch_code: wide(&key.patch_code),
            product_code: wide(&key.product_code),
            user_sid: wide_opt(key.user_sid.as_deref()),
            context: key.context,
        }
    }
}

/// Product property reads through `MsiGetProductInfo[Ex]W`.
#[derive(Debug, Clone)]
pub struct ProductInfoReader {
    product_code: Vec<u16>,
    user_sid: Option<Vec<u16>>,
    context: Option<InstallContext>,
}

impl PropertyReader for ProductInfoReader {
    fn read(&self, api: PropertyApi, name: &str, buffer: &mut PropertyBuffer) -> StatusCode {
        let property = wide(name);
        match (api, self.context) {
            // The extended call needs the registration context, which only
            // enumeration reports.
            (PropertyApi::Extended, Some(context)) => fill_buffer(buffer, |value, len| {
                // SAFETY: all strings are null-terminated and `value` holds
                // `*len` characters.
                unsafe {
                    MsiGetProductInfoExW(
                        self.product_code.as_ptr(),
                        as_pcwstr(&self.user_sid),
                        context.to_native() as _,
                        property.as_ptr(),
                        value,
                        len,
                    )
                }
            }),
            _ => fill_buffer(buffer, |value, len| {
                // SAFETY: as above.
                unsafe { MsiGetProductInfoW(self.product_code.as_ptr(), property.as_ptr(), value, len) }
            }),
        }
    }
}

/// Patch property reads through `MsiGetPatchInfo[Ex]W`.
#[derive(Debug, Clone)]
pub struct PatchInfoReader {
    patch_code: Vec<u16>,
    product_code: Vec<u16>,
    user_sid: Option<Vec<u16>>,
    context: Option<InstallContext>,
}

impl PropertyReader for PatchInfoReader {
    fn read(&self, api: PropertyApi, name: &str, buffer: &mut PropertyBuffer) -> StatusCode {
        let property = wide(name);
        match (api, self.context) {
            (PropertyApi::Extended, Some(context)) => fill_buffer(buffer, |value, len| {
                // SAFETY: all strings are null-terminated and `value` holds
                // `*len` characters.
                unsafe {
                    MsiGetPatchInfoExW(
                        self.patch_code.as_ptr(),
                        self.product_code.as_ptr(),
                        as_pcwstr(&self.user_sid),
                        context.to_native() as _,
                        property.as_ptr(),
                        value,
                        len,
                    )
                }
            }),
            _ => fill_buffer(buffer, |value, len| {
                // SAFETY: as above.
                unsafe { MsiGetPatchInfoW(self.patch_code.as_ptr(), property.as_ptr(), value, len) }
            }),
        }
    }
}

/// Describes queries by preparing them against an installer database.
#[derive(Debug, Clone)]
pub struct MsiDatabaseDescriber {
    path: PathBuf,
    initial_capacity: usize,
}

impl MsiDatabaseDescriber {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            initial_capacity: NativeLimits::DEFAULT_BUFFER_CAPACITY,
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn open_database(&self) -> Result<MsiHandle> {
        let path = wide_path(&self.path);
        let mut handle: MSIHANDLE = 0;
        // SAFETY: `path` is null-terminated; a null persist mode opens the
        // database read-only.
        let status = StatusCode(unsafe { MsiOpenDatabaseW(path.as_ptr(), ptr::null(), &mut handle) });
        if status != win32::ERROR_SUCCESS {
            return Err(InventoryError::native("MsiOpenDatabase", status));
        }
        Ok(MsiHandle(handle))
    }

    fn open_view(database: &MsiHandle, query: &str) -> Result<MsiHandle> {
        let query = wide(query);
        let mut handle: MSIHANDLE = 0;
        // SAFETY: the database handle is open and `query` is null-terminated.
        let status =
            StatusCode(unsafe { MsiDatabaseOpenViewW(database.raw(), query.as_ptr(), &mut handle) });
        if status != win32::ERROR_SUCCESS {
            return Err(InventoryError::native("MsiDatabaseOpenView", status));
        }
        Ok(MsiHandle(handle))
    }

    fn column_info(view: &MsiHandle, info: MSICOLINFO) -> Result<MsiHandle> {
        let mut handle: MSIHANDLE = 0;
        // SAFETY: the view handle is open; the record handle is written once.
        let status = StatusCode(unsafe { MsiViewGetColumnInfo(view.raw(), info, &mut handle) });
        if status != win32::ERROR_SUCCESS {
            return Err(InventoryError::native("MsiViewGetColumnInfo", status));
        }
        Ok(MsiHandle(handle))
    }

    fn record_strings(&self, record: &MsiHandle) -> Result<Vec<String>> {
        // SAFETY: the record handle is open.
        let count = unsafe { MsiRecordGetFieldCount(record.raw()) };
        (1..=count)
            .map(|field| {
                negotiate_string("MsiRecordGetString", self.initial_capacity, |buffer, len| {
                    // SAFETY: `buffer` holds `*len` characters.
                    unsafe { MsiRecordGetStringW(record.raw(), field, buffer.as_mut_ptr(), len) }
                })
            })
            .collect()
    }
}

impl QueryDescriber for MsiDatabaseDescriber {
    fn describe_query(&self, query: &str) -> Result<Vec<ColumnDescriptor>> {
        debug!("Describing {:?} against {}", query, self.path.display());
        let database = self.open_database()?;
        let view = Self::open_view(&database, query)?;

        let names = self.record_strings(&Self::column_info(&view, MSICOLINFO_NAMES)?)?;
        let types = self.record_strings(&Self::column_info(&view, MSICOLINFO_TYPES)?)?;
        if names.len() != types.len() {
            return Err(InventoryError::protocol(
                "MsiViewGetColumnInfo",
                format!("{} names but {} types", names.len(), types.len()),
            ));
        }

        names
            .into_iter()
            .zip(types)
            .enumerate()
            .map(|(ordinal, (name, definition))| {
                ColumnDescriptor::from_definition(name, ordinal, &definition)
            })
            .collect()
    }
}
