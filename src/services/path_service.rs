use std::path::{Path, PathBuf};
use std::sync::OnceLock;
use thiserror::Error;

static USER_DATA_DIR: OnceLock<PathBuf> = OnceLock::new();

const APP_DIR_NAME: &str = "musicai-editor";

#[derive(Error, Debug)]
pub enum PathError {
    #[error("User data directory not found")]
    UserDataNotFound,
    #[error("Path service not initialized")]
    NotInitialized,
    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),
}

/// Resolve the platform data directory and remember it for the process.
pub fn init() -> Result<PathBuf, PathError> {
    let user_data = dirs::data_dir()
        .ok_or(PathError::UserDataNotFound)?
        .join(APP_DIR_NAME);
    init_with(&user_data)
}

/// Use an explicit data directory (CLI override, tests).
///
/// The first successful call wins; later calls return the stored directory.
pub fn init_with(dir: &Path) -> Result<PathBuf, PathError> {
    if let Some(existing) = USER_DATA_DIR.get() {
        return Ok(existing.clone());
    }
    std::fs::create_dir_all(dir)?;
    let _ = USER_DATA_DIR.set(dir.to_path_buf());
    log::info!("Path service initialized. User data: {:?}", USER_DATA_DIR.get());
    get_user_data_dir()
}

pub fn get_user_data_dir() -> Result<PathBuf, PathError> {
    USER_DATA_DIR.get().cloned().ok_or(PathError::NotInitialized)
}

pub fn get_settings_path() -> Result<PathBuf, PathError> {
    Ok(get_user_data_dir()?.join("settings.json"))
}

/// Default destination for downloaded stems and mashups.
pub fn get_downloads_dir() -> Result<PathBuf, PathError> {
    let downloads = get_user_data_dir()?.join("downloads");
    if !downloads.exists() {
        std::fs::create_dir_all(&downloads)?;
    }
    Ok(downloads)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_init_with_creates_dirs_once() {
        let dir = tempfile::tempdir().unwrap();
        let data = dir.path().join("data");
        let first = init_with(&data).unwrap();
        // A second init keeps whatever was stored first
        let second = init_with(&dir.path().join("other")).unwrap();
        assert_eq!(first, second);
        assert!(first.exists());

        let downloads = get_downloads_dir().unwrap();
        assert!(downloads.starts_with(&first));
        assert!(downloads.exists());
        assert_eq!(get_settings_path().unwrap(), first.join("settings.json"));
    }
}
