use std::path::PathBuf;

/// Port the remote playback engine listens on unless configured otherwise.
pub const ENGINE_TCP_PORT: u16 = 9877;
const ENGINE_TCP_HOST: &str = "127.0.0.1";

pub fn engine_address() -> String {
    format!("{}:{}", ENGINE_TCP_HOST, ENGINE_TCP_PORT)
}

pub fn data_dir() -> PathBuf {
    // On macOS and Linux, use ~/.local/share/mmedia/ (XDG standard)
    #[cfg(unix)]
    {
        dirs::home_dir()
            .unwrap_or_else(|| PathBuf::from("/tmp"))
            .join(".local")
            .join("share")
            .join("mmedia")
    }
    #[cfg(windows)]
    {
        dirs::data_local_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join("mmedia")
    }
}

pub fn config_dir() -> PathBuf {
    // On macOS and Linux, always use ~/.config/mmedia/
    #[cfg(unix)]
    {
        dirs::home_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join(".config")
            .join("mmedia")
    }

    #[cfg(windows)]
    {
        dirs::config_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join("mmedia")
    }
}
