use std::path::PathBuf;

const APP_DIR: &str = "pgprobe";

/// `<platform config dir>/pgprobe`, home of `connections.toml`.
pub fn default_config_dir() -> Option<PathBuf> {
    dirs::config_dir().map(|base| base.join(APP_DIR))
}

/// `<platform data dir>/pgprobe/results`, where published results land.
pub fn default_results_dir() -> Option<PathBuf> {
    dirs::data_local_dir().map(|base| base.join(APP_DIR).join("results"))
}
