//! Service identities and status snapshots.
//!
//! [`ServiceId`] is a closed set: adding a dependent service means adding one
//! variant here, and every exhaustive `match` in the crate points at the
//! places that need a probe or a default.

use std::collections::BTreeMap;
use std::fmt;

use serde::Deserialize;
use serde::Serialize;


#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ServiceId {
    ApiServer,
    SyncServer,
    Redis,
    Postgres,
}

impl ServiceId {
    pub const ALL: [ServiceId; 4] = [
        ServiceId::ApiServer,
        ServiceId::SyncServer,
        ServiceId::Redis,
        ServiceId::Postgres,
    ];

    /// Wire name, identical to the serde representation
    pub fn as_str(&self) -> &'static str {
        match self {
            ServiceId::ApiServer => "api-server",
            ServiceId::SyncServer => "sync-server",
            ServiceId::Redis => "redis",
            ServiceId::Postgres => "postgres",
        }
    }
}

impl fmt::Display for ServiceId {
    fn fmt(
        &self,
        f: &mut fmt::Formatter<'_>,
    ) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ServiceStatus {
    pub service_id: ServiceId,
    pub is_up: bool,
}

impl ServiceStatus {
    pub fn down(service_id: ServiceId) -> Self {
        Self {
            service_id,
            is_up: false,
        }
    }
}

/// Complete status mapping for every configured service as of one poll cycle.
///
/// The key set is fixed at construction and never changes: results for
/// services outside the configured set are ignored, configured services
/// without a result stay down.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(transparent)]
pub struct StatusSnapshot {
    statuses: BTreeMap<ServiceId, ServiceStatus>,
}

impl StatusSnapshot {
    /// Snapshot with every configured service marked down
    pub fn all_down(services: &[ServiceId]) -> Self {
        Self {
            statuses: services.iter().map(|id| (*id, ServiceStatus::down(*id))).collect(),
        }
    }

    /// Assembles a snapshot once per poll cycle from the collected probe results
    pub fn from_results<I>(
        services: &[ServiceId],
        results: I,
    ) -> Self
    where
        I: IntoIterator<Item = (ServiceId, bool)>,
    {
        let mut snapshot = Self::all_down(services);
        for (service_id, is_up) in results {
            if let Some(status) = snapshot.statuses.get_mut(&service_id) {
                status.is_up = is_up;
            }
        }
        snapshot
    }

    pub fn get(
        &self,
        service_id: ServiceId,
    ) -> Option<&ServiceStatus> {
        self.statuses.get(&service_id)
    }

    pub fn is_up(
        &self,
        service_id: ServiceId,
    ) -> bool {
        self.get(service_id).map(|s| s.is_up).unwrap_or(false)
    }

    pub fn services(&self) -> impl Iterator<Item = ServiceId> + '_ {
        self.statuses.keys().copied()
    }

    pub fn len(&self) -> usize {
        self.statuses.len()
    }

    pub fn is_empty(&self) -> bool {
        self.statuses.is_empty()
    }
}
