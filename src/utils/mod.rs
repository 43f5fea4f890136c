pub mod config;
pub mod env;
pub mod logging;
pub mod progress_config;

/// Used host memory in MB.
pub async fn get_memory_usage() -> u64 {
    use sysinfo::System;
    let mut sys = System::new();
    sys.refresh_memory();
    sys.used_memory() / (1024 * 1024)
}
