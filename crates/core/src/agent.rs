//! The Agent capability: the uniform interface of leaves and composites.
//!
//! Leaf agents (LLM-backed, tool-using, ...) live outside this workspace and
//! implement this trait. Composites implement it too, which is what lets a
//! pipeline contain a fan-out that contains a refinement loop.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::sync::Arc;

use crate::context::Context;
use crate::error::Result;
use crate::event::EventStream;
use crate::options::CallOptions;
use crate::tool::Tool;

/// A shared, type-erased agent. Children are held this way so one agent
/// can sit in several composites at once.
pub type AgentRef = Arc<dyn Agent>;

/// Descriptive role/goal pair. Never inspected by composition logic.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Persona {
    #[serde(default)]
    pub role: String,

    #[serde(default)]
    pub goal: String,
}

impl Persona {
    pub fn new(role: impl Into<String>, goal: impl Into<String>) -> Self {
        Self {
            role: role.into(),
            goal: goal.into(),
        }
    }
}

/// The core Agent trait.
///
/// Implementations must be safe to call many times, concurrently, so they
/// should keep no mutable state between calls.
#[async_trait]
pub trait Agent: Send + Sync {
    /// Diagnostic identifier. Not required to be globally unique.
    fn id(&self) -> &str;

    fn persona(&self) -> &Persona;

    /// Tools this agent can call. Composites always return an empty list.
    fn tools(&self) -> Vec<Arc<dyn Tool>> {
        Vec::new()
    }

    /// Child agents in declaration order. Leaves have none.
    fn children(&self) -> &[AgentRef] {
        &[]
    }

    /// Run to completion and return the final text.
    async fn invoke(&self, ctx: &Context, input: &str, options: &CallOptions) -> Result<String>;

    /// Run incrementally. The returned stream is lazy: no work happens until
    /// it is polled, and dropping it stops the producer.
    fn stream(&self, ctx: &Context, input: &str, options: &CallOptions) -> EventStream;
}
