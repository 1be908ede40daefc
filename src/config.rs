use std::net::SocketAddr;
use std::path::PathBuf;

pub const DEFAULT_LISTEN_ADDR: &str = "[::1]:50051";
pub const DEFAULT_MODEL_DIR: &str = "model";
pub const DEFAULT_MAX_IMAGE_BYTES: usize = 16 * 1024 * 1024;

#[derive(thiserror::Error, Debug)]
pub enum ConfigError {
    #[error("invalid {key}={value}: {reason}")]
    Invalid {
        key: &'static str,
        value: String,
        reason: String,
    },
}

#[derive(Debug, Clone, PartialEq)]
pub struct ServerConfig {
    pub listen_addr: SocketAddr,
    pub model_dir: PathBuf,
    pub max_image_bytes: usize,
}

impl ServerConfig {
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Builds the config from `LISTEN_ADDR`, `MODEL_DIR` and `MAX_IMAGE_BYTES`
    /// as returned by `lookup`, with defaults for anything unset.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let listen_addr =
            lookup("LISTEN_ADDR").unwrap_or_else(|| DEFAULT_LISTEN_ADDR.to_string());
        let listen_addr = listen_addr
            .parse()
            .map_err(|e: std::net::AddrParseError| ConfigError::Invalid {
                key: "LISTEN_ADDR",
                value: listen_addr.clone(),
                reason: e.to_string(),
            })?;

        let model_dir = lookup("MODEL_DIR")
            .filter(|dir| !dir.trim().is_empty())
            .unwrap_or_else(|| DEFAULT_MODEL_DIR.to_string());

        let max_image_bytes = match lookup("MAX_IMAGE_BYTES") {
            Some(raw) => match raw.trim().parse::<usize>() {
                Ok(0) => {
                    return Err(ConfigError::Invalid {
                        key: "MAX_IMAGE_BYTES",
                        value: raw,
                        reason: "must be greater than zero".into(),
                    });
                }
                Ok(n) => n,
                Err(e) => {
                    return Err(ConfigError::Invalid {
                        key: "MAX_IMAGE_BYTES",
                        value: raw,
                        reason: e.to_string(),
                    });
                }
            },
            None => DEFAULT_MAX_IMAGE_BYTES,
        };

        Ok(Self {
            listen_addr,
            model_dir: PathBuf::from(model_dir),
            max_image_bytes,
        })
    }
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            listen_addr: DEFAULT_LISTEN_ADDR
                .parse()
                .unwrap_or_else(|_| SocketAddr::from(([0, 0, 0, 0, 0, 0, 0, 1], 50051))),
            model_dir: PathBuf::from(DEFAULT_MODEL_DIR),
            max_image_bytes: DEFAULT_MAX_IMAGE_BYTES,
        }
    }
}
