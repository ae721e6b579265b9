use thiserror::Error;

pub const INVALID_REQUEST: i64 = -32600;
pub const METHOD_NOT_FOUND: i64 = -32601;
pub const INVALID_PARAMS: i64 = -32602;
pub const INTERNAL_ERROR: i64 = -32603;
pub const PARSE_ERROR: i64 = -32700;

/// Failures that surface to JSON-RPC callers.
///
/// Per-attempt bridge failures never appear here; the dispatcher swallows them
/// and only reports `ToolNotFound` once every candidate is exhausted.
#[derive(Debug, Error)]
pub enum GatewayError {
    #[error("Method not found: {0}")]
    MethodNotFound(String),

    #[error("Invalid request: {0}")]
    InvalidRequest(String),

    #[error("Invalid params: {0}")]
    InvalidParams(String),

    #[error("Tool not found: {0}")]
    ToolNotFound(String),

    #[error("Prompt not found: {0}")]
    PromptNotFound(String),

    #[error("Resource not found: {0}")]
    ResourceNotFound(String),

    #[error("handler for tool {tool} failed: {source:#}")]
    HandlerExecution {
        tool: String,
        #[source]
        source: anyhow::Error,
    },

    #[error(transparent)]
    Internal(#[from] anyhow::Error),
}

impl GatewayError {
    pub fn code(&self) -> i64 {
        match self {
            GatewayError::MethodNotFound(_) => METHOD_NOT_FOUND,
            GatewayError::InvalidRequest(_) => INVALID_REQUEST,
            GatewayError::InvalidParams(_)
            | GatewayError::ToolNotFound(_)
            | GatewayError::PromptNotFound(_)
            | GatewayError::ResourceNotFound(_) => INVALID_PARAMS,
            GatewayError::HandlerExecution { .. } | GatewayError::Internal(_) => INTERNAL_ERROR,
        }
    }

    /// Tag recorded by the metrics sink.
    pub fn kind(&self) -> &'static str {
        match self {
            GatewayError::MethodNotFound(_) => "method_not_found",
            GatewayError::InvalidRequest(_) => "invalid_request",
            GatewayError::InvalidParams(_) => "invalid_params",
            GatewayError::ToolNotFound(_) => "tool_not_found",
            GatewayError::PromptNotFound(_) => "prompt_not_found",
            GatewayError::ResourceNotFound(_) => "resource_not_found",
            GatewayError::HandlerExecution { .. } => "handler_execution",
            GatewayError::Internal(_) => "internal_error",
        }
    }

    /// Internal failures are the only ones whose detail is gated.
    pub fn is_internal(&self) -> bool {
        self.code() == INTERNAL_ERROR
    }
}

pub type Result<T, E = GatewayError> = std::result::Result<T, E>;
