//! NVS (Non-Volatile Storage) backend for the settings registry.
//!
//! Each registered namespace maps to an NVS namespace of the same name on the
//! default partition. The typed NVS getters line up one-to-one with
//! [`StoredKind`].

use std::sync::Mutex;

use devcfg_core::{NamespaceStore, StorageBackend, StoredKind, StoredValue, StoreError};
use esp_idf_svc::nvs::{EspDefaultNvsPartition, EspNvs, NvsDefault};
use esp_idf_svc::sys::{self, esp, EspError};
use log::{info, warn};

/// Longest string or blob read back from flash.
const VALUE_BUF_LEN: usize = 512;

fn map_err(key: &str, err: EspError) -> StoreError {
    // NVS error constants are generated as u32.
    match err.code() as u32 {
        sys::ESP_ERR_NVS_NOT_FOUND => StoreError::NotFound(key.to_string()),
        sys::ESP_ERR_NVS_TYPE_MISMATCH => StoreError::TypeMismatch(key.to_string()),
        sys::ESP_ERR_NVS_NO_FREE_PAGES
        | sys::ESP_ERR_NVS_NEW_VERSION_FOUND
        | sys::ESP_ERR_NVS_NOT_ENOUGH_SPACE => StoreError::PartitionFull,
        sys::ESP_ERR_NVS_PART_NOT_FOUND => StoreError::PartitionNotFound,
        _ => StoreError::Io(format!("{key}: {err}")),
    }
}

/// The default NVS partition.
pub struct NvsBackend {
    partition: Mutex<Option<EspDefaultNvsPartition>>,
}

impl NvsBackend {
    pub fn new() -> Self {
        Self {
            partition: Mutex::new(None),
        }
    }

    fn partition(&self) -> Result<EspDefaultNvsPartition, StoreError> {
        let mut slot = self
            .partition
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner);
        if let Some(partition) = slot.as_ref() {
            return Ok(partition.clone());
        }
        let partition = EspDefaultNvsPartition::take().map_err(|e| map_err("nvs", e))?;
        *slot = Some(partition.clone());
        Ok(partition)
    }
}

impl Default for NvsBackend {
    fn default() -> Self {
        Self::new()
    }
}

impl StorageBackend for NvsBackend {
    fn init(&self) -> Result<(), StoreError> {
        esp!(unsafe { sys::nvs_flash_init() }).map_err(|e| map_err("nvs", e))?;
        info!("NVS partition ready");
        Ok(())
    }

    fn format(&self) -> Result<(), StoreError> {
        warn!("Erasing NVS partition");
        esp!(unsafe { sys::nvs_flash_erase() }).map_err(|e| map_err("nvs", e))
    }

    fn open(&self, namespace: &str) -> Result<Box<dyn NamespaceStore>, StoreError> {
        let nvs = EspNvs::new(self.partition()?, namespace, true)
            .map_err(|e| map_err(namespace, e))?;
        Ok(Box::new(NvsNamespaceStore {
            namespace: namespace.to_string(),
            nvs,
        }))
    }
}

/// Read/write handle on one NVS namespace.
pub struct NvsNamespaceStore {
    namespace: String,
    nvs: EspNvs<NvsDefault>,
}

impl NvsNamespaceStore {
    fn found<T>(key: &str, value: Result<Option<T>, EspError>) -> Result<T, StoreError> {
        value
            .map_err(|e| map_err(key, e))?
            .ok_or_else(|| StoreError::NotFound(key.to_string()))
    }
}

impl NamespaceStore for NvsNamespaceStore {
    fn set(&mut self, key: &str, value: StoredValue) -> Result<(), StoreError> {
        let nvs = &mut self.nvs;
        let result = match &value {
            StoredValue::I8(v) => nvs.set_i8(key, *v),
            StoredValue::U8(v) => nvs.set_u8(key, *v),
            StoredValue::I16(v) => nvs.set_i16(key, *v),
            StoredValue::U16(v) => nvs.set_u16(key, *v),
            StoredValue::I32(v) => nvs.set_i32(key, *v),
            StoredValue::U32(v) => nvs.set_u32(key, *v),
            StoredValue::I64(v) => nvs.set_i64(key, *v),
            StoredValue::U64(v) => nvs.set_u64(key, *v),
            StoredValue::Blob(v) => nvs.set_blob(key, v),
            StoredValue::Str(v) => nvs.set_str(key, v),
        };
        result.map_err(|e| map_err(key, e))
    }

    fn get(&self, key: &str, kind: StoredKind) -> Result<StoredValue, StoreError> {
        let nvs = &self.nvs;
        let value = match kind {
            StoredKind::I8 => StoredValue::I8(Self::found(key, nvs.get_i8(key))?),
            StoredKind::U8 => StoredValue::U8(Self::found(key, nvs.get_u8(key))?),
            StoredKind::I16 => StoredValue::I16(Self::found(key, nvs.get_i16(key))?),
            StoredKind::U16 => StoredValue::U16(Self::found(key, nvs.get_u16(key))?),
            StoredKind::I32 => StoredValue::I32(Self::found(key, nvs.get_i32(key))?),
            StoredKind::U32 => StoredValue::U32(Self::found(key, nvs.get_u32(key))?),
            StoredKind::I64 => StoredValue::I64(Self::found(key, nvs.get_i64(key))?),
            StoredKind::U64 => StoredValue::U64(Self::found(key, nvs.get_u64(key))?),
            StoredKind::Blob => {
                let mut buf = [0u8; VALUE_BUF_LEN];
                let bytes = Self::found(key, nvs.get_blob(key, &mut buf))?;
                StoredValue::Blob(bytes.to_vec())
            }
            StoredKind::Str => {
                let mut buf = [0u8; VALUE_BUF_LEN];
                let text = Self::found(key, nvs.get_str(key, &mut buf))?;
                StoredValue::Str(text.to_string())
            }
        };
        Ok(value)
    }

    fn erase_key(&mut self, key: &str) -> Result<(), StoreError> {
        match self.nvs.remove(key) {
            Ok(true) => Ok(()),
            Ok(false) => Err(StoreError::NotFound(key.to_string())),
            Err(e) => Err(map_err(key, e)),
        }
    }

    fn erase_all(&mut self) -> Result<(), StoreError> {
        esp!(unsafe { sys::nvs_erase_all(self.nvs.handle()) })
            .map_err(|e| map_err(&self.namespace, e))
    }

    fn commit(&mut self) -> Result<(), StoreError> {
        esp!(unsafe { sys::nvs_commit(self.nvs.handle()) })
            .map_err(|e| map_err(&self.namespace, e))
    }
}
