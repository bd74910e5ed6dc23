//! Coordinator Storage Module
//!
//! The core of the front: everything between a parsed request and the node
//! wire contract.
//!
//! ## Core Concepts
//! - **Planning**: `planner` maps a file size and the fleet snapshot to an
//!   ordered list of ranges covering the file exactly.
//! - **State**: `memory` holds the node table with per-node aggregates, the
//!   file index, and the id counter under one locking discipline.
//! - **Streaming**: `upload` pushes each partition to its node as a chunked
//!   write stream and commits the record only after every receipt.
//! - **Reading**: `reader` serves random access by fanning range reads out
//!   to the owning nodes and stitching the payloads back in order.

pub mod memory;
pub mod planner;
pub mod reader;
pub mod types;
pub mod upload;
