//! External RAM probe.

use esp_idf_sys::{heap_caps_get_free_size, MALLOC_CAP_SPIRAM};
use log::{error, info};

/// Free bytes in external PSRAM, 0 if none is mapped.
pub fn psram_free_bytes() -> usize {
    // SAFETY: read-only heap statistics query
    unsafe { heap_caps_get_free_size(MALLOC_CAP_SPIRAM) }
}

/// Log PSRAM availability and return the free byte count.
pub fn log_psram() -> usize {
    let free = psram_free_bytes();
    if free > 0 {
        info!("PSRAM is available: {} bytes", free);
    } else {
        error!("No PSRAM available");
    }
    free
}
