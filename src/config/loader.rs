use super::structs::Config;
use log::{info, warn};
use std::fs;
use std::path::Path;

const CONFIG_PATH: &str = "/etc/schedsnap/config.toml";

pub fn load_config() -> Config {
    load_config_from(Path::new(CONFIG_PATH))
}

fn load_config_from(path: &Path) -> Config {
    if path.exists() {
        match fs::read_to_string(path) {
            Ok(content) => match toml::from_str(&content) {
                Ok(config) => {
                    info!("Loaded configuration from {}", path.display());
                    return config;
                }
                Err(e) => {
                    warn!("Failed to parse config file: {}. Using defaults.", e);
                }
            },
            Err(e) => {
                warn!("Failed to read config file: {}. Using defaults.", e);
            }
        }
    } else {
        info!("No config file found at {}. Using defaults.", path.display());
    }

    Config::default()
}
