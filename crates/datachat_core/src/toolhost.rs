//! The tool server: line-delimited JSON-RPC over stdio, exactly one peer.
//! Handshake first, then `tools/list` / `tools/call`; exits when stdin
//! closes.

use crate::error::ToolError;
use crate::tools::{plot, query, schema};
use crate::wire::{
    ToolCallParams, ToolCallResult, WireRequest, WireResponse, CODE_INVALID_PARAMS,
    CODE_METHOD_NOT_FOUND, METHOD_INITIALIZE, METHOD_TOOLS_CALL, METHOD_TOOLS_LIST,
    PROTOCOL_VERSION,
};
use anyhow::{Context, Result};
use serde::Deserialize;
use serde_json::{json, Map, Value};
use std::io::{self, BufRead, Write};
use std::path::{Path, PathBuf};

pub const SERVER_NAME: &str = "datachat-toolhost";

pub struct ToolHost {
    db_path: PathBuf,
    initialized: bool,
}

#[derive(Deserialize)]
#[serde(deny_unknown_fields)]
struct InitializeParams {
    #[serde(rename = "protocolVersion")]
    protocol_version: String,
}

#[derive(Deserialize)]
#[serde(deny_unknown_fields)]
struct NoArgs {}

#[derive(Deserialize)]
#[serde(deny_unknown_fields)]
struct GetTableSchemaArgs {
    table_name: String,
}

#[derive(Deserialize)]
#[serde(deny_unknown_fields)]
struct QueryDatabaseArgs {
    query: String,
}

#[derive(Deserialize)]
#[serde(deny_unknown_fields)]
struct CreatePlotArgs {
    data: Vec<Map<String, Value>>,
    x: String,
    y: String,
    #[serde(rename = "type", default = "default_kind")]
    kind: String,
    #[serde(default = "default_title")]
    title: String,
}

fn default_kind() -> String {
    plot::DEFAULT_KIND.to_string()
}

fn default_title() -> String {
    plot::DEFAULT_TITLE.to_string()
}

impl ToolHost {
    pub fn new(db_path: impl Into<PathBuf>) -> Self {
        Self {
            db_path: db_path.into(),
            initialized: false,
        }
    }

    /// One request line in, one response line out. Unparseable lines are
    /// dropped, matching the single-peer assumption that the session layer
    /// never sends garbage.
    pub fn handle_line(&mut self, line: &str) -> Option<String> {
        let line = line.trim();
        if line.is_empty() {
            return None;
        }
        let req: WireRequest = match serde_json::from_str(line) {
            Ok(r) => r,
            Err(e) => {
                tracing::warn!(error = %e, "dropping unparseable request line");
                return None;
            }
        };
        let resp = self.dispatch(req);
        serde_json::to_string(&resp).ok()
    }

    fn dispatch(&mut self, req: WireRequest) -> WireResponse {
        match req.method.as_str() {
            METHOD_INITIALIZE => self.initialize(req),
            METHOD_TOOLS_LIST => WireResponse::ok(req.id, json!({ "tools": tool_list() })),
            METHOD_TOOLS_CALL => self.tools_call(req),
            other => WireResponse::err(
                req.id,
                CODE_METHOD_NOT_FOUND,
                format!("unknown method: {other}"),
            ),
        }
    }

    fn initialize(&mut self, req: WireRequest) -> WireResponse {
        let params: InitializeParams =
            match serde_json::from_value(req.params.unwrap_or_else(|| json!({}))) {
                Ok(p) => p,
                Err(e) => return WireResponse::err(req.id, CODE_INVALID_PARAMS, e),
            };
        if params.protocol_version != PROTOCOL_VERSION {
            return WireResponse::err(
                req.id,
                CODE_INVALID_PARAMS,
                format!(
                    "unsupported protocol version {} (want {})",
                    params.protocol_version, PROTOCOL_VERSION
                ),
            );
        }
        self.initialized = true;
        WireResponse::ok(
            req.id,
            json!({
                "protocolVersion": PROTOCOL_VERSION,
                "capabilities": { "tools": {} },
                "serverInfo": { "name": SERVER_NAME, "version": env!("CARGO_PKG_VERSION") },
            }),
        )
    }

    fn tools_call(&mut self, req: WireRequest) -> WireResponse {
        if !self.initialized {
            return WireResponse::err(req.id, CODE_INVALID_PARAMS, "not initialized");
        }
        let params: ToolCallParams =
            match serde_json::from_value(req.params.unwrap_or_else(|| json!({}))) {
                Ok(p) => p,
                Err(e) => return WireResponse::err(req.id, CODE_INVALID_PARAMS, e),
            };
        let result = match self.call_tool(&params.name, params.arguments) {
            Ok(r) => r,
            // Tool-level failures stay readable by the reasoning loop.
            Err(e) => ToolCallResult::error(e),
        };
        match serde_json::to_value(&result) {
            Ok(v) => WireResponse::ok(req.id, v),
            Err(e) => WireResponse::err(req.id, CODE_INVALID_PARAMS, e),
        }
    }

    fn call_tool(&self, name: &str, arguments: Value) -> Result<ToolCallResult, ToolError> {
        let arguments = if arguments.is_null() { json!({}) } else { arguments };
        match name {
            "list_tables" => {
                let _: NoArgs = decode_args(name, arguments)?;
                let tables = schema::list_tables(&self.db_path)?;
                let text = serde_json::to_string(&tables)
                    .map_err(|e| ToolError::MalformedResult(e.to_string()))?;
                Ok(ToolCallResult::text(text))
            }
            "get_table_schema" => {
                let args: GetTableSchemaArgs = decode_args(name, arguments)?;
                Ok(ToolCallResult::text(schema::get_table_schema(
                    &self.db_path,
                    &args.table_name,
                )?))
            }
            "query_database" => {
                let args: QueryDatabaseArgs = decode_args(name, arguments)?;
                let rows = query::run_query(&self.db_path, &args.query)?;
                let text = serde_json::to_string(&rows)
                    .map_err(|e| ToolError::MalformedResult(e.to_string()))?;
                Ok(ToolCallResult::text(text))
            }
            "create_plot" => {
                let args: CreatePlotArgs = decode_args(name, arguments)?;
                Ok(ToolCallResult::text(plot::create_plot(
                    &args.data, &args.x, &args.y, &args.kind, &args.title,
                )))
            }
            other => Err(ToolError::UnknownTool(other.to_string())),
        }
    }
}

fn decode_args<T: serde::de::DeserializeOwned>(tool: &str, args: Value) -> Result<T, ToolError> {
    serde_json::from_value(args).map_err(|e| ToolError::invalid_arguments(tool, e))
}

/// Descriptors advertised to the peer. Schemas use the wire parameter names
/// (`type`, not the LLM-facing `chart_type`).
pub fn tool_list() -> Vec<Value> {
    vec![
        json!({
            "name": "list_tables",
            "description": "Lists all tables in the database.",
            "inputSchema": { "type": "object", "properties": {}, "required": [] },
        }),
        json!({
            "name": "get_table_schema",
            "description": "Returns the CREATE TABLE statement for a specific table.",
            "inputSchema": {
                "type": "object",
                "properties": { "table_name": { "type": "string" } },
                "required": ["table_name"],
            },
        }),
        json!({
            "name": "query_database",
            "description": "Executes a read-only SQL query and returns the rows as JSON.",
            "inputSchema": {
                "type": "object",
                "properties": { "query": { "type": "string" } },
                "required": ["query"],
            },
        }),
        json!({
            "name": "create_plot",
            "description": "Generates a Plotly JSON configuration for visualization.",
            "inputSchema": {
                "type": "object",
                "properties": {
                    "data": { "type": "array", "items": { "type": "object" } },
                    "x": { "type": "string" },
                    "y": { "type": "string" },
                    "type": { "type": "string", "description": "bar, line, scatter, or pie" },
                    "title": { "type": "string" },
                },
                "required": ["data", "x", "y"],
            },
        }),
    ]
}

/// Blocking request/response loop over stdio. Returns when the peer closes
/// our stdin or on an unrecoverable I/O error.
pub fn serve(db_path: &Path) -> Result<()> {
    let mut host = ToolHost::new(db_path);
    tracing::info!(db = %db_path.display(), "toolhost serving on stdio");
    let stdin = io::stdin();
    let stdout = io::stdout();
    let mut reader = io::BufReader::new(stdin.lock());
    let mut line = String::with_capacity(4096);
    loop {
        line.clear();
        let n = reader.read_line(&mut line).context("reading request line")?;
        if n == 0 {
            tracing::info!("peer closed stdin; exiting");
            return Ok(());
        }
        if let Some(resp) = host.handle_line(&line) {
            let mut out = stdout.lock();
            writeln!(out, "{resp}").context("writing response line")?;
            out.flush().context("flushing response")?;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tools::fixtures::seeded_db;

    fn ready_host() -> (tempfile::TempDir, ToolHost) {
        let (dir, db) = seeded_db();
        let mut host = ToolHost::new(db);
        let resp = roundtrip(&mut host, &WireRequest::initialize(1));
        assert!(resp.error.is_none());
        (dir, host)
    }

    fn roundtrip(host: &mut ToolHost, req: &WireRequest) -> WireResponse {
        let line = serde_json::to_string(req).unwrap();
        let out = host.handle_line(&line).expect("response expected");
        serde_json::from_str(&out).unwrap()
    }

    fn call_result(resp: &WireResponse) -> ToolCallResult {
        serde_json::from_value(resp.result.clone().unwrap()).unwrap()
    }

    #[test]
    fn handshake_reports_protocol_and_server_info() {
        let (_dir, db) = seeded_db();
        let mut host = ToolHost::new(db);
        let resp = roundtrip(&mut host, &WireRequest::initialize(1));
        let result = resp.result.unwrap();
        assert_eq!(result["protocolVersion"], PROTOCOL_VERSION);
        assert_eq!(result["serverInfo"]["name"], SERVER_NAME);
    }

    #[test]
    fn tool_calls_before_initialize_are_refused() {
        let (_dir, db) = seeded_db();
        let mut host = ToolHost::new(db);
        let resp = roundtrip(&mut host, &WireRequest::tool_call(1, "list_tables", json!({})));
        assert!(resp.error.unwrap().message.contains("not initialized"));
    }

    #[test]
    fn wrong_protocol_version_fails_the_handshake() {
        let (_dir, db) = seeded_db();
        let mut host = ToolHost::new(db);
        let req = WireRequest::new(
            1,
            METHOD_INITIALIZE,
            Some(json!({ "protocolVersion": "1999-01-01" })),
        );
        let resp = roundtrip(&mut host, &req);
        assert!(resp.error.is_some());
    }

    #[test]
    fn list_tables_returns_json_array_text() {
        let (_dir, mut host) = ready_host();
        let resp = roundtrip(&mut host, &WireRequest::tool_call(2, "list_tables", json!({})));
        let result = call_result(&resp);
        assert!(!result.is_error);
        let tables: Vec<String> = serde_json::from_str(&result.content[0].text).unwrap();
        assert!(tables.contains(&"sales".to_string()));
    }

    #[test]
    fn rejected_sql_is_a_tool_error_not_a_channel_error() {
        let (_dir, mut host) = ready_host();
        let req = WireRequest::tool_call(3, "query_database", json!({ "query": "DROP TABLE sales" }));
        let resp = roundtrip(&mut host, &req);
        assert!(resp.error.is_none(), "must not use the channel error envelope");
        let result = call_result(&resp);
        assert!(result.is_error);
        assert!(result.content[0].text.contains("Only SELECT"));
    }

    #[test]
    fn extra_arguments_are_a_validation_failure() {
        let (_dir, mut host) = ready_host();
        let req = WireRequest::tool_call(
            4,
            "get_table_schema",
            json!({ "table_name": "sales", "surprise": true }),
        );
        let resp = roundtrip(&mut host, &req);
        let result = call_result(&resp);
        assert!(result.is_error);
        assert!(result.content[0].text.contains("invalid arguments"));
    }

    #[test]
    fn missing_required_arguments_are_a_validation_failure() {
        let (_dir, mut host) = ready_host();
        let req = WireRequest::tool_call(5, "query_database", json!({}));
        let resp = roundtrip(&mut host, &req);
        assert!(call_result(&resp).is_error);
    }

    #[test]
    fn create_plot_defaults_kind_and_title() {
        let (_dir, mut host) = ready_host();
        let req = WireRequest::tool_call(
            6,
            "create_plot",
            json!({ "data": [{"name": "Widget", "total": 8}], "x": "name", "y": "total" }),
        );
        let resp = roundtrip(&mut host, &req);
        let result = call_result(&resp);
        assert!(!result.is_error);
        let v: Value = serde_json::from_str(&result.content[0].text).unwrap();
        assert_eq!(v["data"][0]["type"], "bar");
        assert_eq!(v["layout"]["title"], "Chart");
    }

    #[test]
    fn unknown_tool_is_a_tool_error() {
        let (_dir, mut host) = ready_host();
        let resp = roundtrip(&mut host, &WireRequest::tool_call(7, "drop_everything", json!({})));
        let result = call_result(&resp);
        assert!(result.is_error);
        assert!(result.content[0].text.contains("unknown tool"));
    }

    #[test]
    fn unknown_method_uses_the_channel_error_envelope() {
        let (_dir, mut host) = ready_host();
        let resp = roundtrip(&mut host, &WireRequest::new(8, "resources/list", None));
        assert_eq!(resp.error.unwrap().code, CODE_METHOD_NOT_FOUND);
    }
}
