use std::path::PathBuf;

const APP_DIR: &str = "uptime";

const DATABASE_FILE: &str = "uptime.db";

const CONFIG_FILE: &str = "config.json";

const DB_PATH: &str = "UPTIME_DB_PATH";

const CONFIG_PATH: &str = "UPTIME_CONFIG";

/// Directory holding the database and config file (`~/.config/uptime` on Linux)
pub fn get_config_dir() -> PathBuf {
    dirs::config_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join(APP_DIR)
}

pub fn get_database_path() -> PathBuf {
    let path_from_env = std::env::var(DB_PATH);
    path_from_env.map_or_else(|_| get_config_dir().join(DATABASE_FILE), PathBuf::from)
}

pub fn get_config_path() -> PathBuf {
    let path_from_env = std::env::var(CONFIG_PATH);
    path_from_env.map_or_else(|_| get_config_dir().join(CONFIG_FILE), PathBuf::from)
}
