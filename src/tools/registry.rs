//! Tool registry for managing the agent's callable functions

use std::collections::BTreeMap;
use std::sync::Arc;

use serde_json::Value;

use super::tool::{FunctionDeclaration, Tool, ToolResult};
use crate::core::{EngineError, EngineResult};

/// Registry that holds all available tools
#[derive(Default)]
pub struct ToolRegistry {
    tools: BTreeMap<String, Arc<dyn Tool>>,
}

impl ToolRegistry {
    /// Create a new empty tool registry
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a tool in the registry
    pub fn register<T: Tool + 'static>(&mut self, tool: T) {
        let name = tool.name().to_string();
        tracing::info!("Registering tool: {}", name);
        self.tools.insert(name, Arc::new(tool));
    }

    /// Get a tool by name
    pub fn get(&self, name: &str) -> Option<Arc<dyn Tool>> {
        self.tools.get(name).cloned()
    }

    /// Get all function declarations for the model
    pub fn declarations(&self) -> Vec<FunctionDeclaration> {
        self.tools.values().map(|t| t.declaration()).collect()
    }

    /// Execute a tool by name
    pub async fn execute(&self, name: &str, input: &Value) -> EngineResult<ToolResult> {
        let tool = self
            .tools
            .get(name)
            .ok_or_else(|| EngineError::Tool(format!("Tool not found: {}", name)))?;

        tracing::info!("Executing tool: {}", name);
        tracing::debug!("Input: {:?}", input);

        let result = tool
            .execute(input)
            .await
            .map_err(|e| EngineError::Tool(format!("{}: {:#}", name, e)))?;

        tracing::debug!("Tool {} completed. Is error: {}", name, result.is_error);

        Ok(result)
    }

    /// Get the list of tool names
    pub fn tool_names(&self) -> Vec<&str> {
        self.tools.keys().map(|s| s.as_str()).collect()
    }

    /// Get the number of registered tools
    pub fn len(&self) -> usize {
        self.tools.len()
    }

    /// Check if the registry is empty
    pub fn is_empty(&self) -> bool {
        self.tools.is_empty()
    }
}

impl std::fmt::Debug for ToolRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ToolRegistry")
            .field("tools", &self.tool_names())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tools::GetWeatherTool;
    use serde_json::json;

    #[test]
    fn test_empty_registry() {
        let registry = ToolRegistry::new();
        assert!(registry.is_empty());
        assert_eq!(registry.len(), 0);
        assert!(registry.get("nonexistent").is_none());
    }

    #[tokio::test]
    async fn test_execute_registered_tool() {
        let mut registry = ToolRegistry::new();
        registry.register(GetWeatherTool::new());

        assert_eq!(registry.tool_names(), vec!["get_weather"]);
        let result = registry
            .execute("get_weather", &json!({"query": "SF"}))
            .await
            .unwrap();
        assert_eq!(result.output, "It's 60 degrees and foggy.");
    }

    #[tokio::test]
    async fn test_execute_unknown_tool() {
        let registry = ToolRegistry::new();
        let err = registry.execute("missing", &json!({})).await.unwrap_err();
        assert!(matches!(err, EngineError::Tool(_)));
    }
}
