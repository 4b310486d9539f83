use std::path::PathBuf;

use config::ConfigError;
use serde::Deserialize;
use serde::Serialize;

use crate::Error;
use crate::Result;
use crate::ServiceId;

/// One monitored service: where its log lives and how to probe it
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq, Eq)]
pub struct ServiceConfig {
    pub service: ServiceId,
    pub log_path: PathBuf,
    #[serde(default)]
    pub probe: ProbeConfig,
}

/// Probe implementation for one service.
///
/// String fields may reference environment variables as `${NAME}` or
/// `${NAME:-fallback}`; they are expanded by the probe on every check.
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq, Eq, Default)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ProbeConfig {
    /// GET `url`, healthy when the body contains `expect`
    Http { url: String, expect: String },
    /// Run `program args..`, healthy when it exits 0 and stdout contains `expect`
    Command {
        program: String,
        #[serde(default)]
        args: Vec<String>,
        expect: String,
    },
    /// Always reported down
    #[default]
    Disabled,
}

impl ServiceConfig {
    pub fn validate(&self) -> Result<()> {
        if self.log_path.as_os_str().is_empty() {
            return Err(Error::Config(ConfigError::Message(format!(
                "service {}: log_path cannot be empty",
                self.service
            ))));
        }

        match &self.probe {
            ProbeConfig::Http { url, .. } if url.trim().is_empty() => Err(Error::Config(ConfigError::Message(
                format!("service {}: http probe url cannot be empty", self.service),
            ))),
            ProbeConfig::Command { program, .. } if program.trim().is_empty() => Err(Error::Config(
                ConfigError::Message(format!("service {}: command probe program cannot be empty", self.service)),
            )),
            _ => Ok(()),
        }
    }
}

/// Services of the reference deployment
pub(crate) fn default_services() -> Vec<ServiceConfig> {
    ServiceId::ALL
        .iter()
        .map(|id| ServiceConfig {
            service: *id,
            log_path: default_log_path(*id),
            probe: default_probe(*id),
        })
        .collect()
}

fn default_log_path(service: ServiceId) -> PathBuf {
    PathBuf::from(match service {
        ServiceId::ApiServer => "/var/log/apiserver/apiserver.log",
        ServiceId::SyncServer => "/var/log/sync_server/sync_server.log",
        ServiceId::Redis => "/var/log/redis/redis.log",
        ServiceId::Postgres => "/var/log/postgres/postgres.log",
    })
}

fn default_probe(service: ServiceId) -> ProbeConfig {
    match service {
        ServiceId::ApiServer => ProbeConfig::Http {
            url: "${API_SERVER_URL:-http://localhost:9696/}".into(),
            expect: "hello world".into(),
        },
        ServiceId::SyncServer => ProbeConfig::Http {
            url: "${SYNC_SERVER_URL:-http://localhost:9697/}".into(),
            expect: "hello world".into(),
        },
        ServiceId::Redis => ProbeConfig::Command {
            program: "redis-cli".into(),
            args: vec!["-p".into(), "${REDIS_PORT:-6379}".into(), "ping".into()],
            expect: "PONG".into(),
        },
        ServiceId::Postgres => ProbeConfig::Command {
            program: "pg_isready".into(),
            args: vec![
                "-h".into(),
                "${DB_HOST:-localhost}".into(),
                "-p".into(),
                "${DB_PORT:-5432}".into(),
            ],
            expect: "accepting connections".into(),
        },
    }
}
