//! Client-side tool stubs. The wire carries tool output as text; these
//! decode it with strict serde_json parsing only — never anything that
//! evaluates the payload.

use crate::error::ToolError;
use crate::session::Session;
use crate::tools::plot::{DEFAULT_KIND, DEFAULT_TITLE};
use crate::wire::ToolCallResult;
use serde::Deserialize;
use serde_json::{json, Map, Value};
use std::sync::Arc;

pub type Row = Map<String, Value>;

#[derive(Clone)]
pub struct ToolProxy {
    session: Arc<Session>,
}

/// LLM-facing argument shapes. `deny_unknown_fields` makes extra parameters
/// a validation failure instead of silently dropping them.
#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct GetTableSchemaArgs {
    table_name: String,
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct QueryDatabaseArgs {
    query: String,
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct CreatePlotArgs {
    data: Vec<Row>,
    x: String,
    y: String,
    #[serde(default = "default_kind")]
    chart_type: String,
    #[serde(default = "default_title")]
    title: String,
}

fn default_kind() -> String {
    DEFAULT_KIND.to_string()
}

fn default_title() -> String {
    DEFAULT_TITLE.to_string()
}

impl ToolProxy {
    pub fn new(session: Arc<Session>) -> Self {
        Self { session }
    }

    pub async fn list_tables(&self) -> Result<Vec<String>, ToolError> {
        let text = self.call_text("list_tables", json!({})).await?;
        serde_json::from_str(&text).map_err(|e| ToolError::MalformedResult(e.to_string()))
    }

    pub async fn get_table_schema(&self, table_name: &str) -> Result<String, ToolError> {
        self.call_text("get_table_schema", json!({ "table_name": table_name }))
            .await
    }

    pub async fn run_query(&self, query: &str) -> Result<Vec<Row>, ToolError> {
        let text = self.call_text("query_database", json!({ "query": query })).await?;
        serde_json::from_str(&text).map_err(|e| ToolError::MalformedResult(e.to_string()))
    }

    pub async fn create_plot(
        &self,
        data: &[Row],
        x: &str,
        y: &str,
        kind: &str,
        title: &str,
    ) -> Result<String, ToolError> {
        // LLM-facing `chart_type` maps to the wire's `type`.
        self.call_text(
            "create_plot",
            json!({ "data": data, "x": x, "y": y, "type": kind, "title": title }),
        )
        .await
    }

    /// Route an LLM-issued tool call by name. Returns the textual payload
    /// that becomes the tool message fed back to the model.
    pub async fn dispatch(&self, name: &str, raw_arguments: &str) -> Result<String, ToolError> {
        let args: Value = if raw_arguments.trim().is_empty() {
            json!({})
        } else {
            serde_json::from_str(raw_arguments)
                .map_err(|e| ToolError::invalid_arguments(name, e))?
        };
        match name {
            "list_tables" => {
                if args.as_object().is_some_and(|m| !m.is_empty()) {
                    return Err(ToolError::invalid_arguments(name, "takes no arguments"));
                }
                let tables = self.list_tables().await?;
                serde_json::to_string(&tables).map_err(|e| ToolError::MalformedResult(e.to_string()))
            }
            "get_table_schema" => {
                let a: GetTableSchemaArgs = serde_json::from_value(args)
                    .map_err(|e| ToolError::invalid_arguments(name, e))?;
                self.get_table_schema(&a.table_name).await
            }
            "query_database" => {
                let a: QueryDatabaseArgs = serde_json::from_value(args)
                    .map_err(|e| ToolError::invalid_arguments(name, e))?;
                let rows = self.run_query(&a.query).await?;
                serde_json::to_string(&rows).map_err(|e| ToolError::MalformedResult(e.to_string()))
            }
            "create_plot" => {
                let a: CreatePlotArgs = serde_json::from_value(args)
                    .map_err(|e| ToolError::invalid_arguments(name, e))?;
                self.create_plot(&a.data, &a.x, &a.y, &a.chart_type, &a.title)
                    .await
            }
            other => Err(ToolError::UnknownTool(other.to_string())),
        }
    }

    async fn call_text(&self, name: &str, arguments: Value) -> Result<String, ToolError> {
        let raw = self.session.call_tool(name, arguments).await?;
        let result: ToolCallResult = serde_json::from_value(raw)
            .map_err(|e| ToolError::MalformedResult(e.to_string()))?;
        let text = result
            .content
            .first()
            .map(|c| c.text.clone())
            .ok_or_else(|| ToolError::MalformedResult("tool result had no content".into()))?;
        if result.is_error {
            return Err(ToolError::Tool(text));
        }
        Ok(text)
    }
}
