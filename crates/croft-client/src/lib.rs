//! Client-side session service for the Croft farmer community.
//!
//! [`CommunityService`] owns one farmer's connection to the hub: the REST
//! write path, the WebSocket change feed, presence heartbeats, typing
//! debounce, and a single-flight reconnection coordinator with exponential
//! backoff. Consumers construct it explicitly (there is no global
//! singleton) and watch [`ServiceEvent`]s on a broadcast stream.

pub mod config;
pub mod error;
pub mod events;
pub mod http;
pub mod service;

pub use config::ClientConfig;
pub use error::ClientError;
pub use events::ServiceEvent;
pub use service::{CommunityService, ConnectionPhase};
