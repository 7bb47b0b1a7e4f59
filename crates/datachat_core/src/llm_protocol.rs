//! Request/response shapes for the OpenAI-compatible chat-completions API
//! with tool calling, plus the tool definitions the model is offered.

use serde::{Deserialize, Serialize};
use serde_json::{json, Value};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChatMessage {
    pub role: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub content: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tool_calls: Option<Vec<ToolCallMsg>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tool_call_id: Option<String>,
}

impl ChatMessage {
    pub fn system(content: impl ToString) -> Self {
        Self {
            role: "system".into(),
            content: Some(content.to_string()),
            tool_calls: None,
            tool_call_id: None,
        }
    }

    pub fn user(content: impl ToString) -> Self {
        Self {
            role: "user".into(),
            content: Some(content.to_string()),
            tool_calls: None,
            tool_call_id: None,
        }
    }

    pub fn tool(tool_call_id: &str, content: impl ToString) -> Self {
        Self {
            role: "tool".into(),
            content: Some(content.to_string()),
            tool_calls: None,
            tool_call_id: Some(tool_call_id.to_string()),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ToolCallMsg {
    pub id: String,
    #[serde(rename = "type")]
    pub kind: String,
    pub function: FunctionCall,
}

/// `arguments` arrives as a JSON-encoded string, per the API.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FunctionCall {
    pub name: String,
    pub arguments: String,
}

#[derive(Debug, Deserialize)]
pub struct ChatCompletionResponse {
    pub choices: Vec<ChatChoice>,
}

#[derive(Debug, Deserialize)]
pub struct ChatChoice {
    pub message: ChatMessage,
}

/// Tool definitions offered to the model. CreatePlot is present only when
/// plotting is enabled for the turn. The LLM-facing parameter is
/// `chart_type`; the proxy maps it to the wire's `type`.
pub fn tool_definitions(plotting_enabled: bool) -> Vec<Value> {
    let mut tools = vec![
        function_def(
            "list_tables",
            "Lists all tables in the database.",
            json!({ "type": "object", "properties": {}, "required": [] }),
        ),
        function_def(
            "get_table_schema",
            "Returns the CREATE TABLE statement for a specific table.",
            json!({
                "type": "object",
                "properties": { "table_name": { "type": "string" } },
                "required": ["table_name"],
            }),
        ),
        function_def(
            "query_database",
            "Executes a read-only SQL SELECT query and returns the rows.",
            json!({
                "type": "object",
                "properties": { "query": { "type": "string" } },
                "required": ["query"],
            }),
        ),
    ];
    if plotting_enabled {
        tools.push(function_def(
            "create_plot",
            "Creates a Plotly chart from query result rows.",
            json!({
                "type": "object",
                "properties": {
                    "data": { "type": "array", "items": { "type": "object" } },
                    "x": { "type": "string", "description": "Column name for the x-axis." },
                    "y": { "type": "string", "description": "Column name for the y-axis." },
                    "chart_type": { "type": "string", "description": "bar, line, scatter, or pie." },
                    "title": { "type": "string" },
                },
                "required": ["data", "x", "y"],
            }),
        ));
    }
    tools
}

fn function_def(name: &str, description: &str, parameters: Value) -> Value {
    json!({
        "type": "function",
        "function": { "name": name, "description": description, "parameters": parameters },
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn plotting_gates_the_create_plot_tool() {
        let without: Vec<String> = tool_definitions(false)
            .iter()
            .map(|t| t["function"]["name"].as_str().unwrap().to_string())
            .collect();
        assert_eq!(without, vec!["list_tables", "get_table_schema", "query_database"]);
        let with = tool_definitions(true);
        assert_eq!(with.len(), 4);
        assert_eq!(with[3]["function"]["name"], "create_plot");
    }

    #[test]
    fn assistant_tool_call_round_trips() {
        let raw = json!({
            "role": "assistant",
            "content": null,
            "tool_calls": [{
                "id": "call_1",
                "type": "function",
                "function": { "name": "query_database", "arguments": "{\"query\":\"SELECT 1\"}" }
            }]
        });
        let msg: ChatMessage = serde_json::from_value(raw).unwrap();
        assert!(msg.content.is_none());
        let calls = msg.tool_calls.unwrap();
        assert_eq!(calls[0].function.name, "query_database");
    }
}
