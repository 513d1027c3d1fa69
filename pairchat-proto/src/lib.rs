//! Shared data contracts for the `PairChat` backend boundary.

pub mod connection;
pub mod event;
pub mod message;
