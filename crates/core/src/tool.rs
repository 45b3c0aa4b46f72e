//! Tool descriptors: what a leaf agent advertises it can call.
//!
//! Composites never use tools directly; they always report an empty list.
//! Tool execution belongs to leaf agents and is not modelled here.

use serde::{Deserialize, Serialize};

/// A tool definition suitable for sending to an LLM.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolDefinition {
    /// The tool name
    pub name: String,

    /// Description of what the tool does
    pub description: String,

    /// JSON Schema describing the tool's parameters
    pub parameters: serde_json::Value,
}

/// The Tool trait, as seen by the composition layer.
pub trait Tool: Send + Sync {
    /// The unique name of this tool (e.g., "search", "calculator").
    fn name(&self) -> &str;

    /// A description of what this tool does.
    fn description(&self) -> &str;

    /// JSON Schema describing this tool's parameters.
    fn parameters_schema(&self) -> serde_json::Value {
        serde_json::json!({ "type": "object", "properties": {} })
    }

    fn to_definition(&self) -> ToolDefinition {
        ToolDefinition {
            name: self.name().to_string(),
            description: self.description().to_string(),
            parameters: self.parameters_schema(),
        }
    }
}
