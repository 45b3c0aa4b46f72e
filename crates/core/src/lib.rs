//! # Tandem Core
//!
//! Domain types and traits for composing agents: the [`Agent`] capability,
//! the streaming [`Event`] model, the call [`Context`] and [`CallOptions`],
//! and the error taxonomy. Composite implementations live in
//! `tandem-agent`; leaf agents live wherever their providers do.

pub mod agent;
pub mod context;
pub mod error;
pub mod event;
pub mod options;
pub mod tool;

// Re-export key types at crate root for ergonomics
pub use agent::{Agent, AgentRef, Persona};
pub use context::Context;
pub use error::{AgentError, CompositeKind, ContextError, Result};
pub use event::{Event, EventStream, EventType};
pub use options::CallOptions;
pub use tool::{Tool, ToolDefinition};
