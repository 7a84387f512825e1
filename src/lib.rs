//! Real-time message relay.
//!
//! ARCHITECTURE
//! ============
//! Clients connect over a WebSocket, claim a unique display name, and then
//! exchange envelopes one-to-one or through named groups. The `hub` owns
//! the registry and routing; each connection runs a `session` with an
//! inbound and an outbound pump; `routes` is the HTTP surface around them.

pub mod config;
pub mod envelope;
pub mod hub;
pub mod routes;
pub mod session;
pub mod state;
pub mod transport;
