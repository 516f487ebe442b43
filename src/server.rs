use std::path::Path;

use anyhow::Result;
use serde_json::{json, Map, Value};
use tokio::io::{stdin, stdout, AsyncBufReadExt, AsyncWriteExt, BufReader};

use crate::registry::ToolRegistry;

pub const PROTOCOL_VERSION: &str = "2024-11-05";

/// Serves this run's tool registry over stdio as newline-delimited
/// JSON-RPC 2.0. The agent CLI spawns this process from the run's config
/// artifact. Runs until stdin closes or ctrl-c, then shuts the registry
/// down exactly once.
pub async fn serve_stdio(project_root: &Path) -> Result<()> {
    let registry = ToolRegistry::for_project(project_root);
    let mut lines = BufReader::new(stdin()).lines();
    let mut out = stdout();

    loop {
        let line = tokio::select! {
            line = lines.next_line() => match line {
                Ok(Some(line)) => line,
                Ok(None) | Err(_) => break,
            },
            _ = tokio::signal::ctrl_c() => break,
        };
        if line.trim().is_empty() {
            continue;
        }
        if let Some(response) = handle_line(&registry, &line).await {
            out.write_all(response.to_string().as_bytes()).await?;
            out.write_all(b"\n").await?;
            out.flush().await?;
        }
    }

    registry.shutdown().await;
    Ok(())
}

/// One request line in, at most one response out. Notifications (no id)
/// produce nothing; unparseable lines produce a -32700 error addressed to
/// a null id.
pub async fn handle_line(registry: &ToolRegistry, line: &str) -> Option<Value> {
    let msg: Value = match serde_json::from_str(line) {
        Ok(msg) => msg,
        Err(_) => {
            return Some(json!({
                "jsonrpc": "2.0",
                "id": null,
                "error": {"code": -32700, "message": "Parse error"},
            }))
        }
    };
    let id = msg.get("id").cloned()?;
    let method = msg
        .get("method")
        .and_then(Value::as_str)
        .unwrap_or_default();
    let result = match method {
        "initialize" => json!({
            "protocolVersion": PROTOCOL_VERSION,
            "capabilities": {"tools": {}},
            "serverInfo": {
                "name": "agentcheck",
                "version": env!("CARGO_PKG_VERSION"),
            },
        }),
        "tools/list" => {
            let tools: Vec<Value> = registry
                .wire_tools()
                .into_iter()
                .map(|d| {
                    json!({
                        "name": d.name,
                        "description": d.description,
                        "inputSchema": d.input_schema(),
                    })
                })
                .collect();
            json!({"tools": tools})
        }
        "tools/call" => {
            let params = msg.get("params").cloned().unwrap_or(Value::Null);
            let name = params
                .get("name")
                .and_then(Value::as_str)
                .unwrap_or_default()
                .to_string();
            let args: Map<String, Value> = params
                .get("arguments")
                .and_then(Value::as_object)
                .cloned()
                .unwrap_or_default();
            call_result(registry, &name, args).await
        }
        _ => {
            return Some(json!({
                "jsonrpc": "2.0",
                "id": id,
                "error": {"code": -32601, "message": "Method not found"},
            }))
        }
    };
    Some(json!({"jsonrpc": "2.0", "id": id, "result": result}))
}

/// MCP tool-result envelope. Tool failures are data, not protocol errors:
/// the agent sees `isError` and the message and decides what to do.
async fn call_result(registry: &ToolRegistry, name: &str, args: Map<String, Value>) -> Value {
    match registry.call_tool(name, args).await {
        Ok(value) => {
            let text = match &value {
                Value::String(s) => s.clone(),
                other => other.to_string(),
            };
            json!({
                "content": [{"type": "text", "text": text}],
                "isError": false,
            })
        }
        Err(e) => json!({
            "content": [{"type": "text", "text": format!("{:#}", e)}],
            "isError": true,
        }),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::registry::RegistryBuilder;

    fn request(id: u64, method: &str, params: Value) -> String {
        json!({"jsonrpc": "2.0", "id": id, "method": method, "params": params}).to_string()
    }

    #[tokio::test]
    async fn initialize_reports_protocol_and_server_info() {
        let registry = RegistryBuilder::new().build();
        let resp = handle_line(&registry, &request(1, "initialize", json!({})))
            .await
            .unwrap();
        assert_eq!(resp["id"], json!(1));
        assert_eq!(resp["result"]["protocolVersion"], json!(PROTOCOL_VERSION));
        assert_eq!(resp["result"]["serverInfo"]["name"], json!("agentcheck"));
    }

    #[tokio::test]
    async fn tools_list_carries_schemas() {
        let registry = RegistryBuilder::new().build();
        let resp = handle_line(&registry, &request(2, "tools/list", json!({})))
            .await
            .unwrap();
        let tools = resp["result"]["tools"].as_array().unwrap();
        let store = tools
            .iter()
            .find(|t| t["name"] == json!("store_value"))
            .expect("store_value listed");
        assert_eq!(store["inputSchema"]["type"], json!("object"));
        assert!(store["inputSchema"]["required"]
            .as_array()
            .unwrap()
            .contains(&json!("name")));
    }

    #[tokio::test]
    async fn tools_call_wraps_success_and_failure() {
        let registry = RegistryBuilder::new().build();
        let ok = handle_line(
            &registry,
            &request(
                3,
                "tools/call",
                json!({"name": "store_value", "arguments": {"name": "k", "value": "v"}}),
            ),
        )
        .await
        .unwrap();
        assert_eq!(ok["result"]["isError"], json!(false));
        assert!(ok["result"]["content"][0]["text"]
            .as_str()
            .unwrap()
            .contains("\"stored\":true"));

        let bad = handle_line(
            &registry,
            &request(4, "tools/call", json!({"name": "ghost", "arguments": {}})),
        )
        .await
        .unwrap();
        assert_eq!(bad["result"]["isError"], json!(true));
        assert!(bad["result"]["content"][0]["text"]
            .as_str()
            .unwrap()
            .contains("unknown tool"));
    }

    #[tokio::test]
    async fn unknown_method_is_32601() {
        let registry = RegistryBuilder::new().build();
        let resp = handle_line(&registry, &request(5, "resources/list", json!({})))
            .await
            .unwrap();
        assert_eq!(resp["error"]["code"], json!(-32601));
    }

    #[tokio::test]
    async fn parse_error_is_32700_with_null_id() {
        let registry = RegistryBuilder::new().build();
        let resp = handle_line(&registry, "{not json").await.unwrap();
        assert_eq!(resp["error"]["code"], json!(-32700));
        assert_eq!(resp["id"], json!(null));
    }

    #[tokio::test]
    async fn notifications_get_no_response() {
        let registry = RegistryBuilder::new().build();
        let note = json!({"jsonrpc": "2.0", "method": "notifications/initialized"}).to_string();
        assert!(handle_line(&registry, &note).await.is_none());
    }
}
