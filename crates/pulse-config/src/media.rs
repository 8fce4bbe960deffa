// ============================================================================
// Media Configuration
// ============================================================================

use crate::constants::MAX_MEDIA_FILE_SIZE;
use crate::env_or;

#[derive(Clone, Debug)]
pub struct MediaConfig {
    /// Maximum accepted upload size in bytes
    pub max_file_size: usize,
    /// Root directory of the local object store
    pub storage_dir: String,
    /// Base URL objects are served from (e.g. "https://cdn.example.com/media")
    pub public_base_url: String,
}

impl MediaConfig {
    pub(crate) fn from_env() -> Self {
        Self {
            max_file_size: env_or("MEDIA_MAX_FILE_SIZE", MAX_MEDIA_FILE_SIZE),
            storage_dir: std::env::var("MEDIA_STORAGE_DIR")
                .unwrap_or_else(|_| "./data/media".to_string()),
            public_base_url: std::env::var("MEDIA_PUBLIC_BASE_URL")
                .unwrap_or_else(|_| "http://localhost:3003/files".to_string()),
        }
    }
}

impl Default for MediaConfig {
    fn default() -> Self {
        Self {
            max_file_size: MAX_MEDIA_FILE_SIZE,
            storage_dir: "./data/media".to_string(),
            public_base_url: "http://localhost:3003/files".to_string(),
        }
    }
}
