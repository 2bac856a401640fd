#![allow(dead_code)]

use std::net::SocketAddr;

use bytes::BytesMut;
use tempfile::TempDir;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpStream;
use vault_server::{Directory, FileStorage, Server, ServerConfig, ServerState};
use vault_shared::constants::RESPONSE_HEADER_SIZE;
use vault_shared::protocol::{RequestCode, RequestHeader, ResponseHeader};
use vault_shared::ClientId;
use vault_store::Database;

pub struct TestServer {
    pub addr: SocketAddr,
    pub state: ServerState,
    pub dir: TempDir,
}

pub async fn start() -> TestServer {
    start_with(ServerConfig::default()).await
}

pub async fn start_with(mut config: ServerConfig) -> TestServer {
    let dir = TempDir::new().unwrap();
    config.storage_path = dir.path().join("files");
    config.db_path = dir.path().join("server.db");

    let directory = Directory::load(Database::open_at(&config.db_path).unwrap()).unwrap();
    let storage = FileStorage::new(config.storage_path.clone()).await.unwrap();
    let state = ServerState::new(directory, storage, &config);

    let server = Server::bind("127.0.0.1:0".parse().unwrap(), state.clone())
        .await
        .unwrap();
    let addr = server.local_addr().unwrap();
    tokio::spawn(server.run());

    TestServer { addr, state, dir }
}

pub fn frame(id: ClientId, code: u16, payload: &[u8]) -> BytesMut {
    frame_declaring(id, code, payload.len() as u32, payload)
}

/// A request whose header declares `payload_size` regardless of what follows.
pub fn frame_declaring(id: ClientId, code: u16, payload_size: u32, body: &[u8]) -> BytesMut {
    let mut buf = BytesMut::new();
    RequestHeader {
        client_id: id,
        version: 3,
        code,
        payload_size,
    }
    .encode(&mut buf);
    buf.extend_from_slice(body);
    buf
}

pub fn register_frame(name: &str) -> BytesMut {
    let mut payload = BytesMut::new();
    vault_shared::protocol::put_name_field(&mut payload, name).unwrap();
    frame(ClientId::NIL, RequestCode::Register.as_u16(), &payload)
}

pub async fn send(stream: &mut TcpStream, bytes: &[u8]) {
    stream.write_all(bytes).await.unwrap();
    stream.flush().await.unwrap();
}

pub async fn read_response(stream: &mut TcpStream) -> (ResponseHeader, Vec<u8>) {
    let mut raw = [0u8; RESPONSE_HEADER_SIZE];
    stream.read_exact(&mut raw).await.unwrap();
    let header = ResponseHeader::decode(&raw).unwrap();
    let mut payload = vec![0u8; header.payload_size as usize];
    stream.read_exact(&mut payload).await.unwrap();
    (header, payload)
}

/// Assert the server sends nothing within a short grace period.
pub async fn expect_silence(stream: &mut TcpStream) {
    let mut byte = [0u8; 1];
    let res = tokio::time::timeout(
        std::time::Duration::from_millis(200),
        stream.read(&mut byte),
    )
    .await;
    assert!(res.is_err(), "server replied unexpectedly");
}

/// Assert the server closed the connection.
pub async fn expect_closed(stream: &mut TcpStream) {
    let mut byte = [0u8; 1];
    let n = tokio::time::timeout(std::time::Duration::from_secs(5), stream.read(&mut byte))
        .await
        .expect("connection left open")
        .unwrap_or(0);
    assert_eq!(n, 0);
}
