//! # mdr-fanout
//!
//! Room-based fan-out of normalized market events to browser connections.
//!
//! - [`hub`]: room membership owned by one task, driven through [`HubHandle`]
//! - [`server`]: axum `/ws` and `/health` endpoints in front of the hub
//! - [`protocol`]: `{"event", "data"}` wire envelopes and room naming
//! - [`client`]: reconnecting room client with queued subscriptions
//! - [`bus`]: local listener registry used by the client

pub mod bus;
pub mod client;
pub mod hub;
pub mod protocol;
pub mod server;

pub use client::{ClientState, RoomClient};
pub use hub::{HubHandle, HubStats, spawn_hub};
pub use protocol::{ClientRequest, RoomKind, ServerEvent};
pub use server::FanoutState;
