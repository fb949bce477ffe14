//! Core graph definitions for the archive engine.
//!
//! This module defines the `ObjectGraph` arena, the `Node` structure and the
//! builder that walks user values into the graph.

/// Defines the `GraphBuilder` walk.
pub mod build;
/// Defines the `ObjectGraph` and `Node` structures.
pub mod core;
/// Defines the `NodeId` type.
pub mod id;

pub use build::GraphBuilder;
pub use core::{Node, NodeKind, ObjectGraph};
pub use id::NodeId;
