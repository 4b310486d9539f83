use std::net::SocketAddr;
use std::path::PathBuf;

use config::ConfigError;
use serde::Deserialize;
use serde::Serialize;

use crate::Error;
use crate::Result;

/// HTTP listener settings
#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct ServerConfig {
    /// Network listening address (IP:PORT)
    ///
    /// Default: `0.0.0.0:3000`
    #[serde(default = "default_listen_address")]
    pub listen_address: SocketAddr,

    /// Path segments of the event stream route, without leading slash
    ///
    /// Default: `api/stream`
    #[serde(default = "default_stream_path")]
    pub stream_path: String,

    /// Directory for the server's own log file; stdout when unset
    #[serde(default)]
    pub log_dir: Option<PathBuf>,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            listen_address: default_listen_address(),
            stream_path: default_stream_path(),
            log_dir: None,
        }
    }
}

impl ServerConfig {
    pub fn validate(&self) -> Result<()> {
        if self.stream_segments().is_empty() {
            return Err(Error::Config(ConfigError::Message(
                "server.stream_path must contain at least one path segment".into(),
            )));
        }

        if let Some(dir) = &self.log_dir {
            if dir.as_os_str().is_empty() {
                return Err(Error::Config(ConfigError::Message(
                    "server.log_dir cannot be empty when set".into(),
                )));
            }
        }
        Ok(())
    }

    /// Non-empty segments of `stream_path`
    pub fn stream_segments(&self) -> Vec<String> {
        self.stream_path
            .split('/')
            .filter(|s| !s.is_empty())
            .map(str::to_string)
            .collect()
    }
}

fn default_listen_address() -> SocketAddr {
    SocketAddr::from(([0, 0, 0, 0], 3000))
}

fn default_stream_path() -> String {
    "api/stream".to_string()
}
