use thiserror::Error;

/// Failures that cross the tool seams. Everything here is either visible to
/// the reasoning loop as a tool error (so it can rephrase) or terminal for
/// the request; see `agent_loop` for the split.
#[derive(Debug, Error)]
pub enum ToolError {
    /// The toolhost subprocess or its channel is gone. Terminal for the
    /// request; there is no reconnect path until the host restarts.
    #[error("tool session unavailable: {0}")]
    SessionUnavailable(String),

    /// The SQL safety gate refused a non-SELECT statement before it reached
    /// the engine.
    #[error("Only SELECT queries are allowed.")]
    RejectedStatement,

    /// The storage engine could not be reached at all (missing database
    /// file, bad path). Distinct from per-statement execution errors, which
    /// come back as `{"error": ...}` rows.
    #[error("storage engine unavailable: {0}")]
    StorageUnavailable(String),

    /// A wire payload that should have decoded into the caller's expected
    /// type did not. Distinct from tool-level errors.
    #[error("malformed tool result: {0}")]
    MalformedResult(String),

    /// The peer reported a tool-level failure; the message is the tool's own
    /// error text.
    #[error("{0}")]
    Tool(String),

    #[error("unknown tool: {0}")]
    UnknownTool(String),

    #[error("invalid arguments for {tool}: {reason}")]
    InvalidArguments { tool: String, reason: String },
}

impl ToolError {
    pub fn invalid_arguments(tool: &str, reason: impl ToString) -> Self {
        ToolError::InvalidArguments {
            tool: tool.to_string(),
            reason: reason.to_string(),
        }
    }
}
