//! Retrace: re-issue a decoded call stream against a live driver
//!
//! Handles are virtualized through [`crate::handles::HandleTable`]; the engine owns
//! one [`ReplayContext`] and dispatches every record through a table built from the
//! schema registry.

pub mod config;
pub mod context;
pub mod dispatch;
pub mod driver;
pub mod engine;
pub mod shader_cache;

pub use config::ReplayConfig;
pub use context::{ContextOptions, DrawParams, MappedRange, ReplayContext, ReplayStats, ThreadState};
pub use dispatch::{Dispatcher, Handler, Step};
pub use driver::{Capabilities, Driver, DriverCall, HeadlessDriver, HEADLESS_BINARY_FORMAT};
pub use engine::{EngineState, ReplayEngine, ReplayReport, StopReason};
pub use shader_cache::{CacheEntry, ShaderCache};
