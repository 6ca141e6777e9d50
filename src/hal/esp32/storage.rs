//! SPIFFS mount through the ESP-IDF VFS.
//!
//! Once mounted, files under `base_path` are reachable with `std::fs`, so
//! [`FsImageStore`](crate::persistence::FsImageStore) works unchanged.

use std::ffi::CString;
use std::ptr;

use esp_idf_sys::{
    esp, esp_spiffs_info, esp_vfs_spiffs_conf_t, esp_vfs_spiffs_register,
    esp_vfs_spiffs_unregister, EspError, ESP_ERR_INVALID_ARG,
};
use log::{info, warn};

use crate::config::StorageConfig;
use crate::error::DeviceError;

/// A mounted SPIFFS partition. Unmounted on drop.
pub struct Esp32Spiffs {
    base_path: CString,
    label: Option<CString>,
}

impl Esp32Spiffs {
    /// Register the partition at `config.base_path`.
    ///
    /// With `format_if_mount_failed`, a corrupt or blank partition is
    /// formatted, which can take several seconds on first boot.
    pub fn mount(config: &StorageConfig) -> Result<Self, DeviceError> {
        let base_path = CString::new(config.base_path.as_str()).map_err(|_| invalid_arg())?;
        let label = if config.partition_label.is_empty() {
            None
        } else {
            Some(CString::new(config.partition_label.as_str()).map_err(|_| invalid_arg())?)
        };

        let conf = esp_vfs_spiffs_conf_t {
            base_path: base_path.as_ptr(),
            partition_label: label.as_ref().map_or(ptr::null(), |l| l.as_ptr()),
            max_files: usize::from(config.max_files),
            format_if_mount_failed: config.format_if_mount_failed,
        };

        info!("Mounting SPIFFS at {}", config.base_path);
        // SAFETY: conf points at CStrings owned by the returned value
        esp!(unsafe { esp_vfs_spiffs_register(&conf) }).map_err(mount_failed)?;

        let spiffs = Self { base_path, label };
        match spiffs.usage() {
            Ok((total, used)) => info!("SPIFFS mounted: {} of {} bytes used", used, total),
            Err(e) => warn!("Failed to read SPIFFS usage: {}", e),
        }
        Ok(spiffs)
    }

    /// `(total, used)` bytes on the partition.
    pub fn usage(&self) -> Result<(usize, usize), EspError> {
        let mut total = 0;
        let mut used = 0;
        // SAFETY: label pointer is null or a live CString
        esp!(unsafe { esp_spiffs_info(self.label_ptr(), &mut total, &mut used) })?;
        Ok((total, used))
    }

    /// Mount point.
    pub fn base_path(&self) -> &str {
        self.base_path.to_str().unwrap_or("")
    }

    fn label_ptr(&self) -> *const core::ffi::c_char {
        self.label.as_ref().map_or(ptr::null(), |l| l.as_ptr())
    }
}

impl Drop for Esp32Spiffs {
    fn drop(&mut self) {
        // SAFETY: partition was registered in `mount`
        if let Err(e) = esp!(unsafe { esp_vfs_spiffs_unregister(self.label_ptr()) }) {
            warn!("Failed to unmount SPIFFS: {}", e);
        }
    }
}

fn mount_failed(e: EspError) -> DeviceError {
    DeviceError::InitFailed {
        component: "spiffs",
        code: e.code(),
    }
}

fn invalid_arg() -> DeviceError {
    DeviceError::InitFailed {
        component: "spiffs",
        code: ESP_ERR_INVALID_ARG as i32,
    }
}
