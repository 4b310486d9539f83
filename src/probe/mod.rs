//! Health probes and the registry that maps services to them.
//!
//! A probe only answers "is the backing service alive". Whatever goes wrong
//! inside a probe stays inside [`ProbeRegistry::check_health`]: it is logged
//! for operators and reported as down.

mod command;
mod http;
pub use command::*;
pub use http::*;

use std::collections::HashMap;
use std::env;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
#[cfg(test)]
use mockall::automock;
use tokio::time::timeout;
use tracing::debug;
use tracing::warn;

use crate::metrics::PROBE_FAILURES;
use crate::ProbeConfig;
use crate::ProbeError;
use crate::ServiceConfig;
use crate::ServiceId;

/// Liveness check of one backing service.
///
/// `Ok(())` means up. Any error, including a non-affirmative answer,
/// means down.
#[cfg_attr(test, automock)]
#[async_trait]
pub trait HealthProbe: Send + Sync + 'static {
    async fn check(&self) -> std::result::Result<(), ProbeError>;
}

/// Maps each configured service to its probe. Shared read-only by all sessions.
#[derive(Clone, Default)]
pub struct ProbeRegistry {
    probes: HashMap<ServiceId, Arc<dyn HealthProbe>>,
    probe_timeout: Option<Duration>,
}

impl ProbeRegistry {
    pub fn new(probe_timeout: Duration) -> Self {
        Self {
            probes: HashMap::new(),
            probe_timeout: Some(probe_timeout),
        }
    }

    /// Builds one probe per service from its `probe` section
    pub fn from_config(
        services: &[ServiceConfig],
        probe_timeout: Duration,
    ) -> Self {
        let client = reqwest::Client::builder()
            .timeout(probe_timeout)
            .build()
            .unwrap_or_else(|e| {
                warn!("failed to build tuned http client, using defaults: {}", e);
                reqwest::Client::new()
            });

        let mut registry = Self::new(probe_timeout);
        for service in services {
            match &service.probe {
                ProbeConfig::Http { url, expect } => {
                    registry.register(service.service, HttpProbe::new(client.clone(), url, expect));
                }
                ProbeConfig::Command { program, args, expect } => {
                    registry.register(service.service, CommandProbe::new(program, args.clone(), expect));
                }
                ProbeConfig::Disabled => {
                    debug!("probe for {} disabled, it will always report down", service.service);
                }
            }
        }
        registry
    }

    /// Registers (or replaces) the probe of `service`
    pub fn register(
        &mut self,
        service: ServiceId,
        probe: impl HealthProbe,
    ) -> &mut Self {
        self.probes.insert(service, Arc::new(probe));
        self
    }

    pub fn contains(
        &self,
        service: ServiceId,
    ) -> bool {
        self.probes.contains_key(&service)
    }

    /// Runs the probe of `service`, coercing every failure to `false`
    pub async fn check_health(
        &self,
        service: ServiceId,
    ) -> bool {
        let Some(probe) = self.probes.get(&service) else {
            debug!("no probe registered for {}", service);
            return false;
        };

        let result = match self.probe_timeout {
            Some(limit) => match timeout(limit, probe.check()).await {
                Ok(result) => result,
                Err(_) => Err(ProbeError::Timeout(limit)),
            },
            None => probe.check().await,
        };

        match result {
            Ok(()) => true,
            Err(e) => {
                warn!("{} service is down: {}", service, e);
                PROBE_FAILURES.with_label_values(&[service.as_str()]).inc();
                false
            }
        }
    }
}

/// Expands `${NAME}` and `${NAME:-fallback}` from the process environment
pub(crate) fn expand_env(input: &str) -> String {
    expand_with(input, |name| env::var(name).ok())
}

pub(crate) fn expand_with<F>(
    input: &str,
    lookup: F,
) -> String
where
    F: Fn(&str) -> Option<String>,
{
    let mut out = String::with_capacity(input.len());
    let mut rest = input;

    while let Some(start) = rest.find("${") {
        out.push_str(&rest[..start]);
        let after = &rest[start + 2..];
        let Some(end) = after.find('}') else {
            // unterminated reference is kept verbatim
            out.push_str(&rest[start..]);
            return out;
        };

        let expr = &after[..end];
        let (name, fallback) = match expr.split_once(":-") {
            Some((name, fallback)) => (name, Some(fallback)),
            None => (expr, None),
        };
        let value = lookup(name)
            .filter(|v| !v.is_empty())
            .or_else(|| fallback.map(str::to_string))
            .unwrap_or_default();
        out.push_str(&value);
        rest = &after[end + 1..];
    }
    out.push_str(rest);
    out
}
