//! Storage Node Module
//!
//! A storage node is a trivial in-memory keyed-byte-range server; the
//! coordinator is the smart side. This module carries the whole contract:
//!
//! - **`protocol`**: wire DTOs, endpoint paths, and the frame codec of the
//!   chunked write stream.
//! - **`memory`**: the volatile record store.
//! - **`handlers`**: the axum server side, used by the node binary.
//! - **`client`**: the reqwest client side, used by the coordinator.
//!
//! A node is trusted and best-effort: it validates framing and read bounds
//! but nothing else, and a restart silently discards every record.

pub mod client;
pub mod handlers;
pub mod memory;
pub mod protocol;

#[cfg(test)]
mod tests;
