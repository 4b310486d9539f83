use std::time::Duration;

use config::ConfigError;
use serde::Deserialize;
use serde::Serialize;

use crate::constants::DEFAULT_EVENT_CHANNEL_CAPACITY;
use crate::constants::DEFAULT_FALLBACK_POLL_INTERVAL_IN_MS;
use crate::constants::DEFAULT_MAX_READ_CHUNK_BYTES;
use crate::constants::DEFAULT_OUTBOUND_BUFFER_CAPACITY;
use crate::constants::DEFAULT_PROBE_TIMEOUT_IN_MS;
use crate::constants::DEFAULT_UPDATE_INTERVAL_IN_MS;
use crate::Error;
use crate::Result;

/// How a session learns that a log file changed
#[derive(Debug, Serialize, Deserialize, Clone, Copy, PartialEq, Eq, Default)]
#[serde(rename_all = "lowercase")]
pub enum WatchMode {
    /// OS change notifications, falling back to polling if setup fails
    #[default]
    Native,
    /// Fixed-period re-check only
    Poll,
}

/// Per-session polling and tailing parameters
#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct SessionConfig {
    /// Delay between the end of one status poll and the start of the next
    #[serde(default = "default_update_interval")]
    pub update_interval_in_ms: u64,

    /// Upper bound for a single health probe
    #[serde(default = "default_probe_timeout")]
    pub probe_timeout_in_ms: u64,

    /// Re-check period used when native change notification is unavailable
    #[serde(default = "default_fallback_poll_interval")]
    pub fallback_poll_interval_in_ms: u64,

    /// Capacity of the queue all producers push events onto
    #[serde(default = "default_event_channel_capacity")]
    pub event_channel_capacity: usize,

    /// Encoded frames buffered between the session writer and the transport
    #[serde(default = "default_outbound_buffer_capacity")]
    pub outbound_buffer_capacity: usize,

    /// Maximum bytes emitted by one tail read
    #[serde(default = "default_max_read_chunk_bytes")]
    pub max_read_chunk_bytes: usize,

    #[serde(default)]
    pub watch_mode: WatchMode,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            update_interval_in_ms: default_update_interval(),
            probe_timeout_in_ms: default_probe_timeout(),
            fallback_poll_interval_in_ms: default_fallback_poll_interval(),
            event_channel_capacity: default_event_channel_capacity(),
            outbound_buffer_capacity: default_outbound_buffer_capacity(),
            max_read_chunk_bytes: default_max_read_chunk_bytes(),
            watch_mode: WatchMode::default(),
        }
    }
}

impl SessionConfig {
    pub fn validate(&self) -> Result<()> {
        for (name, value) in [
            ("update_interval_in_ms", self.update_interval_in_ms),
            ("probe_timeout_in_ms", self.probe_timeout_in_ms),
            ("fallback_poll_interval_in_ms", self.fallback_poll_interval_in_ms),
        ] {
            if value == 0 {
                return Err(Error::Config(ConfigError::Message(format!(
                    "stream.{name} must be greater than 0"
                ))));
            }
        }

        for (name, value) in [
            ("event_channel_capacity", self.event_channel_capacity),
            ("outbound_buffer_capacity", self.outbound_buffer_capacity),
            ("max_read_chunk_bytes", self.max_read_chunk_bytes),
        ] {
            if value == 0 {
                return Err(Error::Config(ConfigError::Message(format!(
                    "stream.{name} must be greater than 0"
                ))));
            }
        }

        // a UTF-8 character must always fit into one read
        if self.max_read_chunk_bytes < 4 {
            return Err(Error::Config(ConfigError::Message(format!(
                "stream.max_read_chunk_bytes {} too small, minimum 4 bytes",
                self.max_read_chunk_bytes
            ))));
        }
        Ok(())
    }

    pub fn update_interval(&self) -> Duration {
        Duration::from_millis(self.update_interval_in_ms)
    }

    pub fn probe_timeout(&self) -> Duration {
        Duration::from_millis(self.probe_timeout_in_ms)
    }

    pub fn fallback_poll_interval(&self) -> Duration {
        Duration::from_millis(self.fallback_poll_interval_in_ms)
    }
}

fn default_update_interval() -> u64 {
    DEFAULT_UPDATE_INTERVAL_IN_MS
}
fn default_probe_timeout() -> u64 {
    DEFAULT_PROBE_TIMEOUT_IN_MS
}
fn default_fallback_poll_interval() -> u64 {
    DEFAULT_FALLBACK_POLL_INTERVAL_IN_MS
}
fn default_event_channel_capacity() -> usize {
    DEFAULT_EVENT_CHANNEL_CAPACITY
}
fn default_outbound_buffer_capacity() -> usize {
    DEFAULT_OUTBOUND_BUFFER_CAPACITY
}
fn default_max_read_chunk_bytes() -> usize {
    DEFAULT_MAX_READ_CHUNK_BYTES
}
