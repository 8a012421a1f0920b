use std::path::PathBuf;

/// Identity file name inside the data directory.
pub const IDENTITY_FILE_NAME: &str = "listener_id";

pub fn data_dir() -> PathBuf {
    // On macOS and Linux, use ~/.local/share/elgean/ (XDG standard)
    // instead of macOS Application Support for consistency
    #[cfg(unix)]
    {
        dirs::home_dir()
            .unwrap_or_else(temp_dir)
            .join(".local")
            .join("share")
            .join("elgean")
    }
    #[cfg(windows)]
    {
        // On Windows, check for portable data directory in executable directory first
        if let Some(portable) = beside_exe("data") {
            return portable;
        }

        dirs::data_local_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join("elgean")
    }
}

pub fn config_dir() -> PathBuf {
    #[cfg(windows)]
    {
        if let Some(portable) = beside_exe("config.toml") {
            if let Some(dir) = portable.parent() {
                return dir.to_path_buf();
            }
        }
    }

    // On macOS and Linux, always use ~/.config/elgean/
    #[cfg(unix)]
    {
        dirs::home_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join(".config")
            .join("elgean")
    }

    #[cfg(windows)]
    {
        dirs::config_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join("elgean")
    }
}

pub fn temp_dir() -> PathBuf {
    std::env::temp_dir()
}

/// Default location of the persisted listener identity.
pub fn identity_path() -> PathBuf {
    data_dir().join(IDENTITY_FILE_NAME)
}

#[cfg(windows)]
fn beside_exe(name: &str) -> Option<PathBuf> {
    let exe = std::env::current_exe().ok()?;
    let candidate = exe.parent()?.join(name);
    candidate.exists().then_some(candidate)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn identity_lives_in_data_dir() {
        let path = identity_path();
        assert!(path.starts_with(data_dir()));
        assert!(path.ends_with(IDENTITY_FILE_NAME));
    }
}
