use directories::{BaseDirs, ProjectDirs};
use std::path::PathBuf;
use std::sync::{OnceLock, RwLock};

fn app_root_override_lock() -> &'static RwLock<Option<PathBuf>> {
    static OVERRIDE: OnceLock<RwLock<Option<PathBuf>>> = OnceLock::new();
    OVERRIDE.get_or_init(|| RwLock::new(None))
}

fn app_root_override() -> Option<PathBuf> {
    let lock = app_root_override_lock();
    match lock.read() {
        Ok(guard) => guard.clone(),
        Err(poisoned) => poisoned.into_inner().clone(),
    }
}

/// Test hook so suites can pin the data root to a tempdir.
#[cfg(test)]
pub(crate) fn set_debug_app_root_override(path: Option<PathBuf>) {
    let lock = app_root_override_lock();
    match lock.write() {
        Ok(mut guard) => *guard = path,
        Err(poisoned) => {
            let mut guard = poisoned.into_inner();
            *guard = path;
        }
    }
}

fn platform_app_root() -> PathBuf {
    if let Some(project_dirs) = ProjectDirs::from("", "", "daybot") {
        return project_dirs.data_dir().to_path_buf();
    }

    if let Some(base_dirs) = BaseDirs::new() {
        return base_dirs.data_local_dir().join("daybot");
    }

    std::env::temp_dir().join("daybot")
}

pub fn app_root() -> PathBuf {
    app_root_override().unwrap_or_else(platform_app_root)
}

pub fn default_data_dir() -> String {
    app_root().join("data").to_string_lossy().to_string()
}

pub fn default_config_path() -> String {
    app_root().join("config.json").to_string_lossy().to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_data_dir_lives_under_app_root() {
        let dir = tempfile::tempdir().expect("temp dir");
        set_debug_app_root_override(Some(dir.path().to_path_buf()));
        let data_dir = default_data_dir();
        assert!(data_dir.starts_with(dir.path().to_string_lossy().as_ref()));
        set_debug_app_root_override(None);
    }
}
