//! Channel registry, broadcast engine, and the connection lifecycle around them.

pub mod broadcast;
pub mod connection;
pub mod events;
pub mod heartbeat;
pub mod reaper;
pub mod registry;
pub mod server;
