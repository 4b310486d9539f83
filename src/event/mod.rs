//! Client-facing event schema and SSE framing.
//!
//! Every event becomes exactly one `data: <json>\n\n` frame. `serde_json`
//! escapes control characters, so the payload never spans multiple lines.

use bytes::Bytes;
use serde::Serialize;

use crate::constants::SSE_DATA_PREFIX;
use crate::constants::SSE_FRAME_TERMINATOR;
use crate::Result;
use crate::ServiceId;
use crate::StatusSnapshot;

#[cfg(test)]
mod event_test;

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "type", rename_all = "kebab-case")]
pub enum StreamEvent {
    StatusUpdate {
        statuses: StatusSnapshot,
    },
    #[serde(rename_all = "camelCase")]
    LogUpdate {
        service_name: ServiceId,
        content: String,
    },
}

impl StreamEvent {
    pub fn status_update(statuses: StatusSnapshot) -> Self {
        StreamEvent::StatusUpdate { statuses }
    }

    pub fn log_update(
        service_name: ServiceId,
        content: impl Into<String>,
    ) -> Self {
        StreamEvent::LogUpdate {
            service_name,
            content: content.into(),
        }
    }

    /// Discriminator as written on the wire
    pub fn kind(&self) -> &'static str {
        match self {
            StreamEvent::StatusUpdate { .. } => crate::STATUS_UPDATE_EVENT,
            StreamEvent::LogUpdate { .. } => crate::LOG_UPDATE_EVENT,
        }
    }

    /// Encodes the event as one complete SSE frame
    pub fn to_frame(&self) -> Result<Bytes> {
        let payload = serde_json::to_string(self)?;
        let mut frame =
            String::with_capacity(SSE_DATA_PREFIX.len() + payload.len() + SSE_FRAME_TERMINATOR.len());
        frame.push_str(SSE_DATA_PREFIX);
        frame.push_str(&payload);
        frame.push_str(SSE_FRAME_TERMINATOR);
        Ok(Bytes::from(frame))
    }
}
