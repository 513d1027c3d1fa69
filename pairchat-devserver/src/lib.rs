//! `PairChat` development backend.
//!
//! An axum server that implements the backend contract in memory: the
//! message and connection routes plus the per-user WebSocket push
//! endpoint. Authentication is development-grade: the bearer token is
//! the user ID.

pub mod server;
