//! `PairChat` — client-side conversation sync engine.
//!
//! Merges three independent message sources into one ordered, deduplicated,
//! gap-free view of a two-party conversation: a paginated history fetch,
//! a live WebSocket push stream, and locally originated optimistic sends.
//! Also tracks the connection-request lifecycle that gates who may message
//! whom.

pub mod api;
pub mod auth;
pub mod channel;
pub mod config;
pub mod connections;
pub mod convo;
pub mod session;
