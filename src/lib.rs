//! gltrace - GLES call capture, trace container and headless replay
//!
//! This library provides a schema-driven codec for GLES call records, a
//! versioned trace container with an appendable JSON metadata block, handle
//! virtualization for replay, and the offline tools behind the `gltrace` CLI.
//!
//! ```text
//! capture::Tracer ──► container::TraceWriter ──► .pat file
//!                                                  │
//! replay::ReplayEngine ◄── container::TraceReader ◄┘
//! ```

pub mod capture;
pub mod cli;
pub mod codec;
pub mod container;
pub mod error;
pub mod gl;
pub mod handles;
pub mod replay;
pub mod schema;
pub mod tools;

pub use error::{Result, TraceError};
