//! MCP Server implementation
//!
//! Implements the Model Context Protocol server for stdio transport.

use std::sync::Arc;

use serde_json::Value;
use tokio::io::{AsyncBufRead, AsyncBufReadExt, AsyncWrite, AsyncWriteExt, BufReader};

use crate::drone::Vehicle;
use crate::error::Result;
use crate::mcp::tools::ToolHandler;
use crate::mcp::types::*;

/// MCP Server info
const SERVER_NAME: &str = "MAVLink MCP";
const SERVER_VERSION: &str = env!("CARGO_PKG_VERSION");

const INSTRUCTIONS: &str = "Tools control a single MAVLink drone. Arm before takeoff, \
moves and missions. Positions are in meters and degrees.";

/// MCP Server for a MAVLink vehicle
pub struct McpServer {
    /// Tool handler
    tool_handler: ToolHandler,

    /// Whether the client sent notifications/initialized
    initialized: bool,
}

impl McpServer {
    /// Create a new MCP server
    pub fn new(vehicle: Arc<Vehicle>) -> Self {
        Self {
            tool_handler: ToolHandler::new(vehicle),
            initialized: false,
        }
    }

    /// Whether the client finished the initialize handshake
    pub fn is_initialized(&self) -> bool {
        self.initialized
    }

    /// Run the server on stdio
    pub async fn run_stdio(&mut self) -> Result<()> {
        let stdin = BufReader::new(tokio::io::stdin());
        let stdout = tokio::io::stdout();
        self.run(stdin, stdout).await
    }

    /// Serve line-delimited JSON-RPC until the reader reaches EOF
    pub async fn run<R, W>(&mut self, reader: R, mut writer: W) -> Result<()>
    where
        R: AsyncBufRead + Unpin,
        W: AsyncWrite + Unpin,
    {
        let mut lines = reader.lines();

        while let Some(line) = lines.next_line().await? {
            if line.trim().is_empty() {
                continue;
            }

            match self.handle_message(&line).await {
                Ok(Some(response)) => {
                    let mut response_str = serde_json::to_string(&response)?;
                    response_str.push('\n');
                    writer.write_all(response_str.as_bytes()).await?;
                    writer.flush().await?;
                }
                Ok(None) => {
                    // Notification, no response needed
                }
                Err(e) => {
                    tracing::error!("Error handling message: {}", e);
                }
            }
        }

        tracing::info!("Client closed the connection");
        Ok(())
    }

    /// Handle an incoming JSON-RPC message
    pub async fn handle_message(&mut self, message: &str) -> Result<Option<JsonRpcResponse>> {
        let request: JsonRpcRequest = match serde_json::from_str(message) {
            Ok(req) => req,
            Err(e) => {
                return Ok(Some(JsonRpcResponse::error(
                    RequestId::Number(0),
                    JsonRpcError::parse_error(e.to_string()),
                )));
            }
        };

        if request.is_notification() {
            self.handle_notification(&request);
            return Ok(None);
        }
        let id = request.id.clone().unwrap_or(RequestId::Number(0));

        if request.jsonrpc != JSONRPC_VERSION {
            return Ok(Some(JsonRpcResponse::error(
                id,
                JsonRpcError::invalid_request(format!("Unsupported jsonrpc version: {}", request.jsonrpc)),
            )));
        }

        match request.method.as_str() {
            methods::INITIALIZE => {
                let result = self.handle_initialize()?;
                Ok(Some(JsonRpcResponse::success(id, result)))
            }
            methods::PING => Ok(Some(JsonRpcResponse::success(id, serde_json::json!({})))),
            methods::LIST_TOOLS => {
                let result = self.handle_list_tools()?;
                Ok(Some(JsonRpcResponse::success(id, result)))
            }
            methods::CALL_TOOL => {
                if !self.is_initialized() {
                    tracing::warn!("tools/call before notifications/initialized");
                }
                match self.handle_call_tool(&request).await {
                    Ok(result) => Ok(Some(JsonRpcResponse::success(id, result))),
                    Err(error) => Ok(Some(JsonRpcResponse::error(id, error))),
                }
            }
            _ => Ok(Some(JsonRpcResponse::error(
                id,
                JsonRpcError::method_not_found(&request.method),
            ))),
        }
    }

    fn handle_notification(&mut self, request: &JsonRpcRequest) {
        match request.method.as_str() {
            methods::INITIALIZED => {
                tracing::info!("Client initialized");
                self.initialized = true;
            }
            other => tracing::debug!("Ignoring notification {}", other),
        }
    }

    /// Handle initialize request
    fn handle_initialize(&self) -> Result<Value> {
        let result = InitializeResult {
            protocol_version: MCP_VERSION.to_string(),
            server_info: ServerInfo {
                name: SERVER_NAME.to_string(),
                version: SERVER_VERSION.to_string(),
            },
            capabilities: ServerCapabilities {
                tools: Some(ToolsCapability::default()),
            },
            instructions: Some(INSTRUCTIONS.to_string()),
        };

        Ok(serde_json::to_value(result)?)
    }

    /// Handle list tools request
    fn handle_list_tools(&self) -> Result<Value> {
        let result = ListToolsResult {
            tools: self.tool_handler.list_tools(),
        };

        Ok(serde_json::to_value(result)?)
    }

    /// Handle call tool request; tool failures stay inside the result
    async fn handle_call_tool(&self, request: &JsonRpcRequest) -> std::result::Result<Value, JsonRpcError> {
        let params: CallToolParams = match request.params.as_ref() {
            Some(p) => serde_json::from_value(p.clone())
                .map_err(|e| JsonRpcError::invalid_params(format!("Invalid tool parameters: {}", e)))?,
            None => return Err(JsonRpcError::invalid_params("Missing tool parameters")),
        };

        let result = self.tool_handler.call_tool(&params.name, params.arguments).await;
        serde_json::to_value(result).map_err(|e| JsonRpcError::invalid_params(e.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Config;
    use crate::drone::link::MavlinkLink;
    use crate::drone::vehicle::VehicleSettings;

    async fn server() -> McpServer {
        let config = Config::default();
        let link = MavlinkLink::bind("127.0.0.1:0", None, config.system_id, config.component_id)
            .await
            .unwrap();
        McpServer::new(Arc::new(Vehicle::start(link, VehicleSettings::from(&config))))
    }

    #[tokio::test]
    async fn test_initialized_notification() {
        let mut server = server().await;
        assert!(!server.is_initialized());

        let response = server
            .handle_message(r#"{"jsonrpc":"2.0","method":"notifications/initialized"}"#)
            .await
            .unwrap();
        assert!(response.is_none());
        assert!(server.is_initialized());
    }

    #[tokio::test]
    async fn test_wrong_jsonrpc_version() {
        let mut server = server().await;
        let response = server
            .handle_message(r#"{"jsonrpc":"1.0","id":7,"method":"ping"}"#)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(response.id, RequestId::Number(7));
        assert_eq!(response.error.unwrap().code, -32600);
    }

    #[test]
    fn test_server_info() {
        assert_eq!(SERVER_NAME, "MAVLink MCP");
    }
}
