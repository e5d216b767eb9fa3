//! WebSocket wire plumbing shared by the `bus`, `scheduler`, and `producer`
//! binaries: the relay broker and the client connect helper.

pub mod client;
pub mod relay;

pub use client::{connect, WsSink, WsSource, WsStream};
pub use relay::BusRelay;
