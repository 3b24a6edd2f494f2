use std::io;

use async_trait::async_trait;
use serde::Deserialize;
use serde_json::{json, Map, Value};
use tokio::{
    io::{AsyncBufReadExt, AsyncReadExt, AsyncWriteExt, BufReader},
    net::TcpStream,
};

use super::{BridgeAdapter, BridgeError, BridgeParams, BridgeResponse};
use crate::parameter::ParameterValue;

/// Port the host-side listener binds by default.
pub const DEFAULT_PORT: u16 = 8089;

/// Longest response line accepted from the host, newline excluded.
pub const MAX_FRAME_BYTES: usize = 1 << 20;

#[derive(Debug, Deserialize)]
struct WireResponse {
    #[serde(default)]
    success: bool,
    #[serde(default)]
    message: String,
    #[serde(default)]
    data: Value,
}

/// Adapter speaking newline-delimited JSON to a listener inside the host.
///
/// Each call opens a fresh connection, writes one request line and reads one
/// response line.
#[derive(Debug, Clone)]
pub struct TcpBridge {
    address: String,
}

impl TcpBridge {
    /// Targets `address` (`host:port`).
    #[must_use]
    pub fn new(address: impl Into<String>) -> Self {
        Self {
            address: address.into(),
        }
    }

    /// Targets the default port on localhost.
    #[must_use]
    pub fn localhost() -> Self {
        Self::new(format!("127.0.0.1:{DEFAULT_PORT}"))
    }

    /// Remote address.
    #[must_use]
    pub fn address(&self) -> &str {
        &self.address
    }

    async fn round_trip(&self, request: &Value) -> Result<WireResponse, BridgeError> {
        let stream = TcpStream::connect(&self.address)
            .await
            .map_err(|err| BridgeError::Unavailable(format!("{}: {err}", self.address)))?;
        let (reader, mut writer) = stream.into_split();
        let mut line = serde_json::to_string(request)
            .map_err(|err| BridgeError::Protocol(err.to_string()))?;
        line.push('\n');
        writer.write_all(line.as_bytes()).await.map_err(io_error)?;
        writer.flush().await.map_err(io_error)?;

        let mut reply = String::new();
        let read = BufReader::new(reader.take(MAX_FRAME_BYTES as u64 + 1))
            .read_line(&mut reply)
            .await
            .map_err(io_error)?;
        if read == 0 {
            return Err(BridgeError::ConnectionReset(
                "host closed the connection before replying".into(),
            ));
        }
        if read > MAX_FRAME_BYTES && !reply.ends_with('\n') {
            return Err(BridgeError::Protocol(format!(
                "response frame exceeds {MAX_FRAME_BYTES} bytes"
            )));
        }
        serde_json::from_str(reply.trim())
            .map_err(|err| BridgeError::Protocol(format!("invalid response: {err}")))
    }
}

#[async_trait]
impl BridgeAdapter for TcpBridge {
    fn name(&self) -> &str {
        "tcp"
    }

    async fn execute(
        &self,
        operation: &str,
        params: &BridgeParams,
    ) -> Result<BridgeResponse, BridgeError> {
        let response = self.round_trip(&encode_operation(operation, params)).await?;
        if !response.success {
            return Err(BridgeError::Rejected(response.message));
        }
        Ok(decode_response(operation, response))
    }

    async fn ping(&self) -> Result<(), BridgeError> {
        let response = self.round_trip(&json!({ "action": "ping" })).await?;
        if response.success && response.message == "pong" {
            Ok(())
        } else {
            Err(BridgeError::Protocol(format!(
                "unexpected ping reply: {}",
                response.message
            )))
        }
    }
}

fn io_error(err: io::Error) -> BridgeError {
    match err.kind() {
        io::ErrorKind::ConnectionReset
        | io::ErrorKind::ConnectionAborted
        | io::ErrorKind::BrokenPipe
        | io::ErrorKind::UnexpectedEof => BridgeError::ConnectionReset(err.to_string()),
        _ => BridgeError::Unavailable(err.to_string()),
    }
}

fn encode_operation(operation: &str, params: &BridgeParams) -> Value {
    let target = params
        .get("target")
        .and_then(ParameterValue::as_text)
        .map(str::to_string);
    let parameters: Map<String, Value> = params
        .iter()
        .filter(|(key, _)| key.as_str() != "target")
        .map(|(key, value)| (key.clone(), value.to_json()))
        .collect();
    json!({
        "action": "execute_operation",
        "operation": {
            "type": operation,
            "target": target,
            "parameters": parameters,
        },
    })
}

fn names(data: &Value, key: &str) -> Vec<String> {
    data.get(key)
        .and_then(Value::as_array)
        .map(|items| {
            items
                .iter()
                .filter_map(Value::as_str)
                .map(str::to_string)
                .collect()
        })
        .unwrap_or_default()
}

const CREATING_OPERATIONS: &[&str] = &["create_primitive", "duplicate_object", "setup_lighting"];

fn decode_response(operation: &str, response: WireResponse) -> BridgeResponse {
    let data = response.data;
    let mut objects_created = names(&data, "objects_created");
    let mut objects_affected = names(&data, "objects_affected");
    let objects_removed = names(&data, "objects_removed");
    if let Some(single) = data.get("object_name").and_then(Value::as_str) {
        if objects_affected.is_empty() {
            objects_affected.push(single.to_string());
        }
        let created = CREATING_OPERATIONS.contains(&operation)
            || data.get("created").and_then(Value::as_bool) == Some(true);
        if created && objects_created.is_empty() {
            objects_created.push(single.to_string());
        }
    }
    for created in &objects_created {
        if !objects_affected.contains(created) {
            objects_affected.push(created.clone());
        }
    }
    BridgeResponse {
        message: response.message,
        objects_created,
        objects_affected,
        objects_removed,
        data,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::net::TcpListener;

    async fn serve_once(reply: impl Into<String>) -> (String, tokio::task::JoinHandle<Value>) {
        let reply = reply.into();
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let address = listener.local_addr().unwrap().to_string();
        let handle = tokio::spawn(async move {
            let (stream, _) = listener.accept().await.unwrap();
            let (reader, mut writer) = stream.into_split();
            let mut line = String::new();
            BufReader::new(reader).read_line(&mut line).await.unwrap();
            writer.write_all(reply.as_bytes()).await.unwrap();
            serde_json::from_str(line.trim()).unwrap()
        });
        (address, handle)
    }

    #[tokio::test]
    async fn execute_sends_operation_envelope() {
        let (address, server) = serve_once(
            "{\"success\":true,\"message\":\"ok\",\"data\":{\"object_name\":\"Cube\"}}\n",
        )
        .await;
        let bridge = TcpBridge::new(address);
        let mut params = BridgeParams::new();
        params.insert("shape".into(), ParameterValue::Text("cube".into()));
        params.insert("size".into(), ParameterValue::Vector(vec![2.0, 2.0, 2.0]));
        let response = bridge.execute("create_primitive", &params).await.unwrap();
        assert_eq!(response.objects_created, vec!["Cube"]);
        assert_eq!(response.objects_affected, vec!["Cube"]);

        let request = server.await.unwrap();
        assert_eq!(request["action"], "execute_operation");
        assert_eq!(request["operation"]["type"], "create_primitive");
        assert_eq!(request["operation"]["parameters"]["size"], json!([2.0, 2.0, 2.0]));
        assert!(request["operation"]["target"].is_null());
    }

    #[tokio::test]
    async fn host_refusal_is_not_transient() {
        let (address, _server) =
            serve_once("{\"success\":false,\"message\":\"Object not found: Ghost\"}\n").await;
        let err = TcpBridge::new(address)
            .execute("apply_material", &BridgeParams::new())
            .await
            .unwrap_err();
        assert_eq!(err, BridgeError::Rejected("Object not found: Ghost".into()));
    }

    #[tokio::test]
    async fn garbage_reply_is_a_protocol_error() {
        let (address, _server) = serve_once("not json\n").await;
        let err = TcpBridge::new(address)
            .execute("scene_status", &BridgeParams::new())
            .await
            .unwrap_err();
        assert!(matches!(err, BridgeError::Protocol(_)));
    }

    #[tokio::test]
    async fn oversized_reply_is_a_protocol_error() {
        let mut reply = String::from("{\"success\":true,\"message\":\"");
        reply.push_str(&"x".repeat(MAX_FRAME_BYTES + 16));
        reply.push_str("\"}\n");
        let (address, _server) = serve_once(reply).await;
        let err = TcpBridge::new(address)
            .execute("scene_status", &BridgeParams::new())
            .await
            .unwrap_err();
        match err {
            BridgeError::Protocol(message) => assert!(message.contains("exceeds")),
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[tokio::test]
    async fn ping_expects_pong_and_closed_port_is_transient() {
        let (address, _server) = serve_once("{\"success\":true,\"message\":\"pong\"}\n").await;
        TcpBridge::new(address).ping().await.unwrap();

        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let closed = listener.local_addr().unwrap().to_string();
        drop(listener);
        let err = TcpBridge::new(closed).ping().await.unwrap_err();
        assert!(err.is_transient());
    }
}
