//! Listener lifecycle and HTTP transport.

use std::net::SocketAddr;
use std::sync::Arc;

use heron_bytecode::{Instruction, Program, SourceFile};
use heron_inspector::{
    DebugSession, DetachedHost, InspectorConfig, InspectorError, InspectorServer,
};
use serde_json::{Value, json};
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpStream;

fn local_config() -> InspectorConfig {
    InspectorConfig {
        host: "127.0.0.1".to_string(),
        port: 0,
    }
}

/// Send one HTTP/1.1 request and return the status code and body
async fn send(addr: SocketAddr, method: &str, path: &str, body: &str) -> (u16, String) {
    let mut stream = TcpStream::connect(addr).await.unwrap();
    let request = format!(
        "{method} {path} HTTP/1.1\r\nHost: {addr}\r\nContent-Type: application/json\r\n\
         Content-Length: {}\r\nConnection: close\r\n\r\n{body}",
        body.len()
    );
    stream.write_all(request.as_bytes()).await.unwrap();

    let mut raw = String::new();
    stream.read_to_string(&mut raw).await.unwrap();
    let (head, body) = raw.split_once("\r\n\r\n").unwrap();
    let status = head.split(' ').nth(1).unwrap().parse().unwrap();
    (status, body.to_string())
}

async fn rpc(addr: SocketAddr, request: Value) -> Value {
    let (status, body) = send(addr, "POST", "/", &request.to_string()).await;
    assert_eq!(status, 200);
    serde_json::from_str(&body).unwrap()
}

#[tokio::test]
async fn test_serves_requests_until_stopped() {
    let program = Program::builder(Arc::new(SourceFile::new("test.js", "1+1")))
        .instruction_at(Instruction::Add, 1)
        .instruction(Instruction::Ret)
        .build();
    let mut session = DebugSession::new(DetachedHost);
    session.register_program(&program);

    let mut server = InspectorServer::start(local_config(), session.shared())
        .await
        .unwrap();
    let addr = server.local_addr();
    assert_ne!(addr.port(), 0);

    let enabled = rpc(addr, json!({"id": 1, "method": "Debugger.enable"})).await;
    assert_eq!(enabled["id"], 1);
    assert!(enabled["result"]["debuggerId"].is_string());

    let source = rpc(
        addr,
        json!({"id": 2, "method": "Debugger.getScriptSource", "params": {"scriptId": "1"}}),
    )
    .await;
    assert_eq!(source, json!({"id": 2, "result": {"scriptSource": "1+1"}}));

    let events = rpc(addr, json!({"id": 3, "method": "Inspector.drainEvents"})).await;
    assert_eq!(events["result"]["events"][0]["method"], "Debugger.scriptParsed");

    server.stop().unwrap();
    assert!(matches!(server.stop(), Err(InspectorError::AlreadyStopped)));

    // Let the accept loop observe the shutdown signal
    tokio::task::yield_now().await;
    tokio::time::sleep(std::time::Duration::from_millis(50)).await;
    assert!(TcpStream::connect(addr).await.is_err());
}

#[tokio::test]
async fn test_protocol_errors_travel_as_responses() {
    let server = InspectorServer::start(local_config(), DebugSession::new(DetachedHost).shared())
        .await
        .unwrap();
    let addr = server.local_addr();

    let (status, body) = send(addr, "POST", "/", "{oops").await;
    assert_eq!(status, 200);
    let reply: Value = serde_json::from_str(&body).unwrap();
    assert_eq!(reply["id"], Value::Null);
    assert_eq!(reply["error"]["code"], -32700);

    let unknown = rpc(addr, json!({"id": 7, "method": "Nope.nothing"})).await;
    assert_eq!(unknown["id"], 7);
    assert_eq!(unknown["error"]["code"], -32601);
}

#[tokio::test]
async fn test_rejects_other_routes() {
    let server = InspectorServer::start(local_config(), DebugSession::new(DetachedHost).shared())
        .await
        .unwrap();
    let addr = server.local_addr();

    let (status, _) = send(addr, "GET", "/", "").await;
    assert_eq!(status, 405);

    let (status, _) = send(addr, "POST", "/json", "{}").await;
    assert_eq!(status, 404);
}

#[tokio::test]
async fn test_drop_stops_listener() {
    let server = InspectorServer::start(local_config(), DebugSession::new(DetachedHost).shared())
        .await
        .unwrap();
    let addr = server.local_addr();
    drop(server);

    tokio::time::sleep(std::time::Duration::from_millis(50)).await;
    assert!(TcpStream::connect(addr).await.is_err());
}
