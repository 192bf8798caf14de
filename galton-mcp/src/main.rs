//! Galton MCP Server
//!
//! Newline-delimited JSON-RPC 2.0 over stdio.
//!
//! Tools:
//! - profile: Moments, outliers, modality and normality of a sample
//! - outliers: IQR or z-score outlier flags
//! - homogeneity: Levene check across groups of a table column
//! - recommend: Test family from verdicts and design
//! - diagnose: Full pipeline on a table column, optionally executed
//! - run_test: Run a named test or mixed model
//! - help: Documentation for a function
//! - list_functions: List available functions
//!
//! Tables are passed as `{"columns": {"name": [...]}}`.

use galton::Galton;
use galton_core::Value;
use galton_plugin::AdvisorConfig;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value as JsonValue};
use std::io::{self, BufRead, Write};
use tracing::{debug, error, info, warn};
use tracing_subscriber::EnvFilter;

const PROTOCOL_VERSION: &str = "2025-11-25";
const SERVER_NAME: &str = "galton";
const SERVER_VERSION: &str = env!("CARGO_PKG_VERSION");

/// Positional parameter order of each pipeline tool, matching the
/// underlying function's argument list
const TOOL_PARAMS: [(&str, &[&str]); 6] = [
    ("profile", &["data", "name"]),
    ("outliers", &["data", "method", "threshold"]),
    ("homogeneity", &["table", "value_col", "group_col"]),
    ("recommend", &["is_normal", "is_homogeneous", "has_subject_id", "is_paired", "group_count"]),
    ("diagnose", &["table", "value_col", "group_col", "subject_col", "paired", "execute"]),
    ("run_test", &["method", "table", "value_col", "group_col", "subject_col", "mu0", "formula"]),
];

// MCP Protocol types
#[derive(Debug, Deserialize)]
struct McpRequest {
    #[allow(dead_code)]
    jsonrpc: String,
    id: Option<JsonValue>,
    method: String,
    #[serde(default)]
    params: Option<JsonValue>,
}

#[derive(Debug, Serialize)]
struct McpResponse {
    jsonrpc: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    id: Option<JsonValue>,
    #[serde(skip_serializing_if = "Option::is_none")]
    result: Option<JsonValue>,
    #[serde(skip_serializing_if = "Option::is_none")]
    error: Option<McpError>,
}

#[derive(Debug, Serialize)]
struct McpError {
    code: i32,
    message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    data: Option<JsonValue>,
}

impl McpError {
    fn invalid_params(message: impl Into<String>) -> Self {
        Self {
            code: -32602,
            message: message.into(),
            data: None,
        }
    }
}

impl McpResponse {
    fn parse_error(message: String) -> Self {
        Self {
            jsonrpc: "2.0".to_string(),
            id: None,
            result: None,
            error: Some(McpError {
                code: -32700,
                message,
                data: None,
            }),
        }
    }
}

fn init_tracing() {
    // stdout carries the protocol, so logs go to stderr
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with_writer(io::stderr)
        .with_ansi(false)
        .init();
}

fn write_response(response: &McpResponse) -> io::Result<()> {
    let text = serde_json::to_string(response).map_err(io::Error::other)?;
    let mut stdout = io::stdout().lock();
    writeln!(stdout, "{}", text)?;
    stdout.flush()
}

fn main() {
    init_tracing();

    let config = AdvisorConfig::from_env();
    info!(version = SERVER_VERSION, protocol = PROTOCOL_VERSION, alpha = config.alpha, "Galton MCP server started");
    let galton = Galton::with_standard_library().with_config(config);

    let stdin = io::stdin();
    let mut reader = io::BufReader::new(stdin.lock());

    loop {
        let mut line = String::new();
        match reader.read_line(&mut line) {
            Ok(0) => {
                info!("client disconnected (EOF)");
                break;
            }
            Ok(_) => {
                let line = line.trim();
                if line.is_empty() {
                    continue;
                }
                debug!(bytes = line.len(), "received");

                let request: McpRequest = match serde_json::from_str(line) {
                    Ok(r) => r,
                    Err(e) => {
                        warn!(error = %e, "unparseable request");
                        if let Err(e) = write_response(&McpResponse::parse_error(format!("Parse error: {}", e))) {
                            error!(error = %e, "failed to write response");
                            break;
                        }
                        continue;
                    }
                };

                let response = handle_request(&galton, &request);

                // Notifications (no id) get no response
                if request.id.is_none() {
                    debug!(method = %request.method, "notification processed");
                    continue;
                }

                if let Err(e) = write_response(&response) {
                    error!(error = %e, "failed to write response");
                    break;
                }
                debug!(method = %request.method, "sent response");
            }
            Err(e) => {
                error!(error = %e, "failed to read input");
                break;
            }
        }
    }

    info!("server shutting down");
}

fn handle_request(galton: &Galton, request: &McpRequest) -> McpResponse {
    let result = match request.method.as_str() {
        // Lifecycle
        "initialize" => handle_initialize(&request.params),
        "initialized" | "notifications/initialized" => Ok(json!({})),
        "ping" => Ok(json!({})),

        // Tools
        "tools/list" => Ok(tools_list()),
        "tools/call" => handle_tool_call(galton, &request.params),

        _ => Err(McpError {
            code: -32601,
            message: format!("Method not found: {}", request.method),
            data: None,
        }),
    };

    match result {
        Ok(r) => McpResponse {
            jsonrpc: "2.0".to_string(),
            id: request.id.clone(),
            result: Some(r),
            error: None,
        },
        Err(e) => McpResponse {
            jsonrpc: "2.0".to_string(),
            id: request.id.clone(),
            result: None,
            error: Some(e),
        },
    }
}

fn handle_initialize(params: &Option<JsonValue>) -> Result<JsonValue, McpError> {
    let client_info = params
        .as_ref()
        .and_then(|p| p.get("clientInfo"))
        .and_then(|c| c.get("name"))
        .and_then(|n| n.as_str())
        .unwrap_or("unknown");

    // Use client's protocol version for compatibility
    let client_protocol = params
        .as_ref()
        .and_then(|p| p.get("protocolVersion"))
        .and_then(|v| v.as_str())
        .unwrap_or(PROTOCOL_VERSION);

    info!(client = client_info, protocol = client_protocol, "client connected");

    Ok(json!({
        "protocolVersion": client_protocol,
        "serverInfo": {
            "name": SERVER_NAME,
            "version": SERVER_VERSION,
            "description": "Exploratory diagnosis and statistical test selection"
        },
        "capabilities": {
            "tools": {
                "listChanged": false
            }
        },
        "instructions": "Galton profiles a numeric sample, checks variance homogeneity across groups and recommends a test. Start with 'diagnose' on a table; use 'run_test' to execute a method by name."
    }))
}

fn table_schema() -> JsonValue {
    json!({
        "type": "object",
        "description": "Table as {\"columns\": {name: [values]}}; numeric columns may contain null",
        "properties": {
            "columns": { "type": "object", "additionalProperties": { "type": "array" } }
        },
        "required": ["columns"]
    })
}

fn tools_list() -> JsonValue {
    let data = json!({ "type": "array", "items": { "type": ["number", "null"] }, "description": "Sample values; null is missing" });
    let column = |d: &str| json!({ "type": "string", "description": d });
    json!({
        "tools": [
            {
                "name": "profile",
                "description": "Moments with labels, IQR outliers, KDE modality and a normality verdict with advice.",
                "inputSchema": {
                    "type": "object",
                    "properties": { "data": data, "name": column("Display name (default: Data)") },
                    "required": ["data"]
                }
            },
            {
                "name": "outliers",
                "description": "Flag outliers by IQR fences or |z| > 3.",
                "inputSchema": {
                    "type": "object",
                    "properties": {
                        "data": data,
                        "method": { "type": "string", "enum": ["iqr", "zscore"], "default": "iqr" },
                        "threshold": { "type": "number", "description": "IQR multiplier (default: 1.5)" }
                    },
                    "required": ["data"]
                }
            },
            {
                "name": "homogeneity",
                "description": "Levene test of equal variances across groups. Null verdict when no groups apply.",
                "inputSchema": {
                    "type": "object",
                    "properties": {
                        "table": table_schema(),
                        "value_col": column("Numeric column"),
                        "group_col": column("Group label column")
                    },
                    "required": ["table", "value_col"]
                }
            },
            {
                "name": "recommend",
                "description": "Recommend a test family from normality, homogeneity and the design.",
                "inputSchema": {
                    "type": "object",
                    "properties": {
                        "is_normal": { "type": "boolean" },
                        "is_homogeneous": { "type": ["boolean", "null"] },
                        "has_subject_id": { "type": "boolean", "default": false },
                        "is_paired": { "type": "boolean", "default": false },
                        "group_count": { "type": "integer", "default": 1 }
                    },
                    "required": ["is_normal"]
                }
            },
            {
                "name": "diagnose",
                "description": "Profile a table column, audit variance across groups and recommend a test. Set execute to run it.",
                "inputSchema": {
                    "type": "object",
                    "properties": {
                        "table": table_schema(),
                        "value_col": column("Numeric column"),
                        "group_col": column("Group label column"),
                        "subject_col": column("Subject or cluster id column"),
                        "paired": { "type": "boolean", "default": false },
                        "execute": { "type": "boolean", "default": false }
                    },
                    "required": ["table", "value_col"]
                }
            },
            {
                "name": "run_test",
                "description": "Run a test or mixed model by canonical name, e.g. \"Mann-Whitney U\" or \"LMM\".",
                "inputSchema": {
                    "type": "object",
                    "properties": {
                        "method": column("Canonical method name"),
                        "table": table_schema(),
                        "value_col": column("Numeric column"),
                        "group_col": column("Group label column"),
                        "subject_col": column("Random-intercept column for mixed models"),
                        "mu0": { "type": "number", "default": 0 },
                        "formula": column("Mixed-model formula (default: value_col ~ group_col)")
                    },
                    "required": ["method", "table", "value_col"]
                }
            },
            {
                "name": "help",
                "description": "Documentation for a function, or the list of categories.",
                "inputSchema": {
                    "type": "object",
                    "properties": { "name": column("Function name. Omit for general help.") }
                }
            },
            {
                "name": "list_functions",
                "description": "List all available functions, optionally by category.",
                "inputSchema": {
                    "type": "object",
                    "properties": {
                        "category": {
                            "type": "string",
                            "enum": ["advisor", "stats/shape", "stats/outliers", "stats/normality", "stats/variance", "stats/hypothesis", "stats/nonparametric"]
                        }
                    }
                }
            }
        ]
    })
}

fn handle_tool_call(galton: &Galton, params: &Option<JsonValue>) -> Result<JsonValue, McpError> {
    let params = params.as_ref().ok_or_else(|| McpError::invalid_params("Missing params"))?;
    let name = params
        .get("name")
        .and_then(|v| v.as_str())
        .ok_or_else(|| McpError::invalid_params("Missing tool name"))?;
    let args = params.get("arguments").cloned().unwrap_or(json!({}));
    if !args.is_object() {
        return Err(McpError::invalid_params("arguments must be an object"));
    }

    match name {
        "help" => {
            let help = galton.help(args.get("name").and_then(|v| v.as_str()));
            Ok(tool_result(&help))
        }
        "list_functions" => {
            let functions = galton.list_functions(args.get("category").and_then(|v| v.as_str()));
            Ok(tool_result(&functions))
        }
        _ => {
            let (_, params) = TOOL_PARAMS
                .iter()
                .find(|(tool, _)| *tool == name)
                .ok_or_else(|| McpError::invalid_params(format!("Unknown tool: {}", name)))?;
            let positional = positional_args(&args, params);
            debug!(tool = name, args = positional.len(), "calling");
            Ok(tool_result(&galton.call(name, &positional)))
        }
    }
}

/// Named JSON arguments in positional order. Gaps become null and
/// trailing nulls are dropped.
fn positional_args(args: &JsonValue, names: &[&str]) -> Vec<Value> {
    let mut values: Vec<Value> = names
        .iter()
        .map(|n| args.get(*n).map(Value::from_json).unwrap_or(Value::Null))
        .collect();
    while matches!(values.last(), Some(Value::Null)) {
        values.pop();
    }
    values
}

fn tool_result(value: &Value) -> JsonValue {
    let data = value.to_json();
    let text = match value {
        Value::Error(e) => format!("Error: {}", e),
        _ => serde_json::to_string_pretty(&data).unwrap_or_else(|_| data.to_string()),
    };
    json!({
        "content": [{ "type": "text", "text": text }],
        "data": data,
        "isError": value.is_error()
    })
}
