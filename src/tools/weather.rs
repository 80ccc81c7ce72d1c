//! Simulated weather lookup
//!
//! A placeholder tool: answers from the location keywords in the query.

use anyhow::Result;
use async_trait::async_trait;
use serde_json::{json, Value};

use super::tool::{Tool, ToolResult};

/// Look up the (simulated) weather for a free-text location query
pub fn get_weather(query: &str) -> &'static str {
    let query = query.to_lowercase();
    if query.contains("sf") || query.contains("san francisco") {
        "It's 60 degrees and foggy."
    } else {
        "It's 90 degrees and sunny."
    }
}

/// Tool wrapper around [`get_weather`]
#[derive(Debug, Default, Clone)]
pub struct GetWeatherTool;

impl GetWeatherTool {
    pub fn new() -> Self {
        Self
    }
}

#[async_trait]
impl Tool for GetWeatherTool {
    fn name(&self) -> &str {
        "get_weather"
    }

    fn description(&self) -> &str {
        "Simulates a web search. Use it get information on weather."
    }

    fn parameters(&self) -> Option<Value> {
        Some(json!({
            "type": "object",
            "properties": {
                "query": {
                    "type": "string",
                    "description": "A string containing the location to get weather information for."
                }
            },
            "required": ["query"]
        }))
    }

    async fn execute(&self, input: &Value) -> Result<ToolResult> {
        let Some(query) = input.get("query").and_then(|v| v.as_str()) else {
            return Ok(ToolResult::error("Missing required string argument 'query'"));
        };
        Ok(ToolResult::success(get_weather(query)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_san_francisco_variants() {
        assert_eq!(get_weather("Weather in SF?"), "It's 60 degrees and foggy.");
        assert_eq!(get_weather("san francisco"), "It's 60 degrees and foggy.");
        assert_eq!(get_weather("SAN FRANCISCO, CA"), "It's 60 degrees and foggy.");
    }

    #[test]
    fn test_other_locations() {
        assert_eq!(get_weather("Phoenix"), "It's 90 degrees and sunny.");
        assert_eq!(get_weather(""), "It's 90 degrees and sunny.");
    }

    #[tokio::test]
    async fn test_tool_missing_query() {
        let result = GetWeatherTool::new().execute(&json!({})).await.unwrap();
        assert!(result.is_error);

        let result = GetWeatherTool::new()
            .execute(&json!({"query": 42}))
            .await
            .unwrap();
        assert!(result.is_error);
    }

    #[test]
    fn test_declaration() {
        let decl = GetWeatherTool::new().declaration();
        assert_eq!(decl.name, "get_weather");
        assert_eq!(decl.parameters.unwrap()["required"][0], "query");
    }
}
