// -
// Event wire format

/// `type` discriminator of a status snapshot frame
pub const STATUS_UPDATE_EVENT: &str = "status-update";
/// `type` discriminator of a log chunk frame
pub const LOG_UPDATE_EVENT: &str = "log-update";

pub(crate) const SSE_DATA_PREFIX: &str = "data: ";
pub(crate) const SSE_FRAME_TERMINATOR: &str = "\n\n";

// -
// Stream endpoint headers

pub(crate) const CONTENT_TYPE_EVENT_STREAM: &str = "text/event-stream";
pub(crate) const CACHE_CONTROL_NO_CACHE: &str = "no-cache, no-transform";
pub(crate) const CONNECTION_KEEP_ALIVE: &str = "keep-alive";
/// Disables response buffering in nginx-style reverse proxies
pub(crate) const X_ACCEL_BUFFERING: &str = "x-accel-buffering";

// -
// Defaults

/// Period between two status polls of one session
pub(crate) const DEFAULT_UPDATE_INTERVAL_IN_MS: u64 = 10_000;
pub(crate) const DEFAULT_PROBE_TIMEOUT_IN_MS: u64 = 5_000;
pub(crate) const DEFAULT_FALLBACK_POLL_INTERVAL_IN_MS: u64 = 1_000;
pub(crate) const DEFAULT_EVENT_CHANNEL_CAPACITY: usize = 256;
pub(crate) const DEFAULT_OUTBOUND_BUFFER_CAPACITY: usize = 64;
pub(crate) const DEFAULT_MAX_READ_CHUNK_BYTES: usize = 1024 * 1024;

/// Env var prefix for configuration overrides, e.g. `STREAM__SERVER__LISTEN_ADDRESS`
pub(crate) const CONFIG_ENV_PREFIX: &str = "STREAM";
