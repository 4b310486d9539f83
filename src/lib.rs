//! Live service status and log tail streaming.
//!
//! One HTTP request opens one [`Session`]: the session polls every configured
//! service's health on a fixed period, tails every configured log file, and
//! multiplexes both into a single server-sent-events stream.

mod config;
mod constants;
mod errors;
mod event;
pub mod metrics;
mod poller;
mod probe;
mod server;
mod service;
mod session;
mod tail;
mod watcher;

pub use config::*;
pub use constants::LOG_UPDATE_EVENT;
pub use constants::STATUS_UPDATE_EVENT;
pub use errors::*;
pub use event::*;
pub use poller::*;
pub use probe::*;
pub use server::*;
pub use service::*;
pub use session::*;
pub use tail::*;
pub use watcher::*;
