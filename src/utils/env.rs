// src/utils/env.rs
use log::{info, warn};
use std::path::Path;

const ENV_FILE_CANDIDATES: [&str; 3] = [".env", ".env.local", "../.env"];

/// Loads the first usable `.env` candidate relative to the working directory.
/// Variables already set in the process keep their values.
pub fn load_env() -> Option<&'static str> {
    let loaded = load_first_env_file(&ENV_FILE_CANDIDATES);
    if loaded.is_none() {
        info!("No .env file found, using environment variables from system");
    }
    loaded
}

fn load_first_env_file<'a>(candidates: &[&'a str]) -> Option<&'a str> {
    candidates
        .iter()
        .copied()
        .filter(|path| Path::new(path).is_file())
        .find(|path| match dotenv::from_path(path) {
            Ok(()) => {
                info!("Loaded environment variables from {}", path);
                true
            }
            Err(e) => {
                warn!("Skipping unreadable env file {}: {}", path, e);
                false
            }
        })
}
