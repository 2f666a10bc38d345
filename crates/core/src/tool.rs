//! Tool trait: the abstraction over assistant capabilities.
//!
//! Tools are what let the assistant act beyond talking: evaluate
//! arithmetic, look up the weather, read the clock. Each tool takes a
//! single free-text argument whose shape it describes in
//! [`Tool::argument_format`].

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tokio_util::sync::CancellationToken;

use crate::error::ToolError;

/// What the reasoning loop and the command matcher know about a tool.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolDescriptor {
    pub name: String,
    pub description: String,
    pub argument_format: String,
}

/// The core Tool trait.
#[async_trait]
pub trait Tool: Send + Sync {
    /// The unique name of this tool (e.g., "Calculator").
    fn name(&self) -> &str;

    /// A description of what this tool does (sent to the model).
    fn description(&self) -> &str;

    /// Human-readable shape of the single argument (e.g., "<expression>").
    fn argument_format(&self) -> &str;

    /// Phrases a user might say when they want this tool.
    ///
    /// These are embedded once and become the tool's match examples.
    fn examples(&self) -> &[&str] {
        &[]
    }

    /// Execute the tool. Implementations must stop promptly once
    /// `cancel` fires.
    async fn execute(
        &self,
        argument: &str,
        cancel: &CancellationToken,
    ) -> std::result::Result<String, ToolError>;

    fn descriptor(&self) -> ToolDescriptor {
        ToolDescriptor {
            name: self.name().to_string(),
            description: self.description().to_string(),
            argument_format: self.argument_format().to_string(),
        }
    }
}

/// A registry of available tools, kept in registration order.
///
/// Registration order is what breaks ties between equally confident
/// command matches, so lookups scan a `Vec` instead of hashing.
#[derive(Clone, Default)]
pub struct ToolRegistry {
    tools: Vec<Arc<dyn Tool>>,
}

impl ToolRegistry {
    pub fn new() -> Self {
        Self { tools: Vec::new() }
    }

    /// Register a tool. A tool with the same name is replaced in place,
    /// keeping its original position.
    pub fn register(&mut self, tool: Arc<dyn Tool>) {
        match self.tools.iter().position(|t| t.name() == tool.name()) {
            Some(idx) => self.tools[idx] = tool,
            None => self.tools.push(tool),
        }
    }

    /// Get a tool by name.
    pub fn get(&self, name: &str) -> Option<Arc<dyn Tool>> {
        self.tools.iter().find(|t| t.name() == name).cloned()
    }

    /// Snapshot of every tool's descriptor, in registration order.
    pub fn list_tools(&self) -> Vec<ToolDescriptor> {
        self.tools.iter().map(|t| t.descriptor()).collect()
    }

    /// Iterate over registered tools in registration order.
    pub fn iter(&self) -> impl Iterator<Item = &Arc<dyn Tool>> {
        self.tools.iter()
    }

    /// Execute a tool by name.
    pub async fn execute(
        &self,
        name: &str,
        argument: &str,
        cancel: &CancellationToken,
    ) -> std::result::Result<String, ToolError> {
        let tool = self.get(name).ok_or_else(|| ToolError::NotFound(name.to_string()))?;
        tool.execute(argument, cancel).await
    }

    pub fn len(&self) -> usize {
        self.tools.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tools.is_empty()
    }
}
