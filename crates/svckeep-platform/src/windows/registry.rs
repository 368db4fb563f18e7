//! Registry-backed key-value store.
//!
//! Namespaces are subkeys of [`SERVICES_ROOT`] under `HKEY_LOCAL_MACHINE`,
//! so `Agent\Parameters` lands next to the SCM's own record for `Agent`
//! and `EventLog\Application\Agent` is the event source key. Each call opens
//! and closes its own key handle.

use windows::Win32::Foundation::{ERROR_FILE_NOT_FOUND, ERROR_SUCCESS, WIN32_ERROR};
use windows::Win32::System::Registry::{
    HKEY, HKEY_LOCAL_MACHINE, KEY_READ, KEY_WRITE, REG_DWORD, REG_EXPAND_SZ,
    REG_OPTION_NON_VOLATILE, REG_SAM_FLAGS, REG_SZ, REG_VALUE_TYPE, RegCloseKey,
    RegCreateKeyExW, RegDeleteTreeW, RegDeleteValueW, RegOpenKeyExW, RegQueryInfoKeyW,
    RegQueryValueExW, RegSetValueExW,
};
use windows::core::{PCWSTR, PWSTR};

use svckeep_core::{KeyValueStore, StoreError, StoreResult, StoreValue};

use super::wide;

/// Parent key of every service's registry data.
pub const SERVICES_ROOT: &str = r"SYSTEM\CurrentControlSet\Services";

/// Registry store rooted at a key under `HKEY_LOCAL_MACHINE`.
#[derive(Debug, Clone)]
pub struct RegistryStore {
    root: String,
}

impl RegistryStore {
    /// Store rooted at [`SERVICES_ROOT`].
    #[must_use]
    pub fn services() -> Self {
        Self::with_root(SERVICES_ROOT)
    }

    /// Store rooted at `root`.
    #[must_use]
    pub fn with_root(root: impl Into<String>) -> Self {
        Self { root: root.into() }
    }

    fn path(&self, namespace: &str) -> String {
        format!("{}\\{namespace}", self.root)
    }
}

fn check(status: WIN32_ERROR, operation: &'static str, path: &str) -> StoreResult<()> {
    if status == ERROR_SUCCESS {
        Ok(())
    } else {
        let os = std::io::Error::from_raw_os_error(status.0 as i32);
        Err(StoreError::backend(operation, path, os.to_string()))
    }
}

/// Open key handle, closed on drop.
struct Key(HKEY);

impl Key {
    fn create(path: &str) -> StoreResult<Self> {
        let subkey = wide(path);
        let mut hkey = HKEY::default();
        let status = unsafe {
            RegCreateKeyExW(
                HKEY_LOCAL_MACHINE,
                PCWSTR(subkey.as_ptr()),
                0,
                PCWSTR::null(),
                REG_OPTION_NON_VOLATILE,
                KEY_READ | KEY_WRITE,
                None,
                &mut hkey,
                None,
            )
        };
        check(status, "RegCreateKeyEx", path)?;
        Ok(Self(hkey))
    }

    fn open(path: &str, access: REG_SAM_FLAGS) -> StoreResult<Option<Self>> {
        let subkey = wide(path);
        let mut hkey = HKEY::default();
        let status =
            unsafe { RegOpenKeyExW(HKEY_LOCAL_MACHINE, PCWSTR(subkey.as_ptr()), 0, access, &mut hkey) };
        if status == ERROR_FILE_NOT_FOUND {
            return Ok(None);
        }
        check(status, "RegOpenKeyEx", path)?;
        Ok(Some(Self(hkey)))
    }
}

impl Drop for Key {
    fn drop(&mut self) {
        let _ = unsafe { RegCloseKey(self.0) };
    }
}

fn utf16_bytes(text: &str) -> Vec<u8> {
    wide(text).iter().flat_map(|unit| unit.to_le_bytes()).collect()
}

fn utf16_text(bytes: &[u8]) -> String {
    let units: Vec<u16> = bytes
        .chunks_exact(2)
        .map(|pair| u16::from_le_bytes([pair[0], pair[1]]))
        .collect();
    let end = units.iter().position(|&unit| unit == 0).unwrap_or(units.len());
    String::from_utf16_lossy(&units[..end])
}

fn encode(value: &StoreValue) -> (REG_VALUE_TYPE, Vec<u8>) {
    match value {
        StoreValue::String(s) => (REG_SZ, utf16_bytes(s)),
        StoreValue::ExpandString(s) => (REG_EXPAND_SZ, utf16_bytes(s)),
        StoreValue::Dword(n) => (REG_DWORD, n.to_le_bytes().to_vec()),
    }
}

fn decode(key: &str, kind: REG_VALUE_TYPE, bytes: &[u8]) -> StoreResult<StoreValue> {
    match kind {
        REG_SZ => Ok(StoreValue::String(utf16_text(bytes))),
        REG_EXPAND_SZ => Ok(StoreValue::ExpandString(utf16_text(bytes))),
        REG_DWORD if bytes.len() >= 4 => Ok(StoreValue::Dword(u32::from_le_bytes([
            bytes[0], bytes[1], bytes[2], bytes[3],
        ]))),
        other => Err(StoreError::WrongType {
            key: key.to_string(),
            found: format!("registry type {}", other.0),
        }),
    }
}

impl KeyValueStore for RegistryStore {
    fn write(&self, namespace: &str, key: &str, value: &StoreValue) -> StoreResult<()> {
        let path = self.path(namespace);
        let handle = Key::create(&path)?;
        let name = wide(key);
        let (kind, data) = encode(value);
        let status = unsafe { RegSetValueExW(handle.0, PCWSTR(name.as_ptr()), 0, kind, Some(&data)) };
        check(status, "RegSetValueEx", &path)
    }

    fn read(&self, namespace: &str, key: &str) -> StoreResult<Option<StoreValue>> {
        let path = self.path(namespace);
        let Some(handle) = Key::open(&path, KEY_READ)? else {
            return Ok(None);
        };
        let name = wide(key);
        let mut kind = REG_VALUE_TYPE::default();
        let mut len = 0u32;
        let status = unsafe {
            RegQueryValueExW(
                handle.0,
                PCWSTR(name.as_ptr()),
                None,
                Some(&mut kind),
                None,
                Some(&mut len),
            )
        };
        if status == ERROR_FILE_NOT_FOUND {
            return Ok(None);
        }
        check(status, "RegQueryValueEx", &path)?;

        let mut data = vec![0u8; len as usize];
        let status = unsafe {
            RegQueryValueExW(
                handle.0,
                PCWSTR(name.as_ptr()),
                None,
                Some(&mut kind),
                Some(data.as_mut_ptr()),
                Some(&mut len),
            )
        };
        check(status, "RegQueryValueEx", &path)?;
        data.truncate(len as usize);
        decode(key, kind, &data).map(Some)
    }

    fn value_count(&self, namespace: &str) -> StoreResult<Option<usize>> {
        let path = self.path(namespace);
        let Some(handle) = Key::open(&path, KEY_READ)? else {
            return Ok(None);
        };
        let mut values = 0u32;
        let status = unsafe {
            RegQueryInfoKeyW(
                handle.0,
                PWSTR::null(),
                None,
                None,
                None,
                None,
                None,
                Some(&mut values),
                None,
                None,
                None,
                None,
            )
        };
        check(status, "RegQueryInfoKey", &path)?;
        Ok(Some(values as usize))
    }

    fn remove_value(&self, namespace: &str, key: &str) -> StoreResult<bool> {
        let path = self.path(namespace);
        let Some(handle) = Key::open(&path, KEY_WRITE)? else {
            return Ok(false);
        };
        let name = wide(key);
        let status = unsafe { RegDeleteValueW(handle.0, PCWSTR(name.as_ptr())) };
        if status == ERROR_FILE_NOT_FOUND {
            return Ok(false);
        }
        check(status, "RegDeleteValue", &path)?;
        Ok(true)
    }

    fn remove_namespace(&self, namespace: &str) -> StoreResult<bool> {
        let path = self.path(namespace);
        let subkey = wide(&path);
        let status = unsafe { RegDeleteTreeW(HKEY_LOCAL_MACHINE, PCWSTR(subkey.as_ptr())) };
        if status == ERROR_FILE_NOT_FOUND {
            return Ok(false);
        }
        check(status, "RegDeleteTree", &path)?;
        tracing::debug!(path = %path, "removed registry key");
        Ok(true)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_path_joins_root() {
        let store = RegistryStore::services();
        assert_eq!(
            store.path("Agent\\Parameters"),
            "SYSTEM\\CurrentControlSet\\Services\\Agent\\Parameters"
        );
    }

    #[test]
    fn test_string_encoding_is_nul_terminated() {
        let (kind, data) = encode(&StoreValue::String("ab".into()));
        assert_eq!(kind, REG_SZ);
        assert_eq!(data, vec![b'a', 0, b'b', 0, 0, 0]);
        assert_eq!(decode("k", kind, &data).unwrap(), StoreValue::String("ab".into()));
    }

    #[test]
    fn test_decode_rejects_binary() {
        let err = decode("Param1", REG_VALUE_TYPE(3), &[1, 2]).unwrap_err();
        assert!(matches!(err, StoreError::WrongType { .. }));
    }
}
