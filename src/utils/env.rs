// src/utils/env.rs
use log::{debug, info};
use std::path::Path;

const ENV_PATHS: [&str; 3] = [".env", ".env.local", "../.env"];

/// Loads the first of `paths` that exists and parses, returning its index.
/// Variables already set in the process win.
fn load_first<P: AsRef<Path>>(paths: &[P]) -> Option<usize> {
    paths
        .iter()
        .position(|path| path.as_ref().exists() && dotenv::from_path(path.as_ref()).is_ok())
}

/// Loads `.env`, `.env.local` or `../.env` and returns the path used.
pub fn load_env() -> Option<&'static str> {
    load_first(&ENV_PATHS).map(|index| ENV_PATHS[index])
}

/// Loads the env file first so a `RUST_LOG` set there takes effect, then
/// initializes `env_logger`.
pub fn init_logging(default_filter: &str) {
    let env_file = load_env();
    env_logger::init_from_env(env_logger::Env::default().default_filter_or(default_filter));
    match env_file {
        Some(path) => info!("Loaded environment variables from {}", path),
        None => debug!("No .env file found, using process environment only"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;

    #[test]
    fn test_first_existing_env_file_is_loaded() {
        let dir = tempfile::tempdir().unwrap();
        let missing = dir.path().join(".env");
        let present = dir.path().join(".env.local");
        fs::write(&present, "RESOLVER_ENV_FILE_TEST=loaded\n").unwrap();

        assert_eq!(load_first(&[missing, present]), Some(1));
        assert_eq!(std::env::var("RESOLVER_ENV_FILE_TEST").as_deref(), Ok("loaded"));
    }

    #[test]
    fn test_no_env_file() {
        let dir = tempfile::tempdir().unwrap();
        assert_eq!(load_first(&[dir.path().join("absent.env")]), None);
    }
}
