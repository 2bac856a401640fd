//! Byte-level exchanges, including the trailing-body form where the header
//! declares no payload and the body follows on the stream.

mod common;

use bytes::BytesMut;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpStream;
use vault_server::ServerConfig;
use vault_shared::checksum::cksum;
use vault_shared::constants::{CHECKSUM_FRAME_SIZE, RESPONSE_HEADER_SIZE};
use vault_shared::crypto::{
    aes_cbc_encrypt, encode_public_key, generate_rsa_keypair, unwrap_aes_key,
};
use vault_shared::protocol::{
    put_name_field, ChecksumFrame, RequestCode, ResponseCode, UploadHeader,
};
use vault_shared::ClientId;

use common::{expect_closed, expect_silence, frame, frame_declaring, read_response, send};

async fn register(stream: &mut TcpStream, name: &str) -> ClientId {
    send(stream, &common::register_frame(name)).await;
    let (header, payload) = read_response(stream).await;
    assert_eq!(header.response_code().unwrap(), ResponseCode::RegistrationOk);
    assert!(payload.is_empty());
    header.client_id
}

async fn exchange_keys(stream: &mut TcpStream, id: ClientId, name: &str) -> [u8; 16] {
    let private_key = generate_rsa_keypair().unwrap();
    let public_key = encode_public_key(&private_key.to_public_key()).unwrap();

    let mut payload = BytesMut::new();
    put_name_field(&mut payload, name).unwrap();
    payload.extend_from_slice(&public_key);
    send(stream, &frame(id, RequestCode::SendPublicKey.as_u16(), &payload)).await;

    let (header, wrapped) = read_response(stream).await;
    assert_eq!(header.response_code().unwrap(), ResponseCode::SwitchingKeys);
    assert_eq!(header.client_id, id);
    assert_eq!(header.payload_size as usize, wrapped.len());
    assert_eq!(wrapped.len(), 128);
    unwrap_aes_key(&private_key, &wrapped).unwrap()
}

fn upload_body(id: ClientId, key: &[u8; 16], filename: &str, content: &[u8]) -> BytesMut {
    let ciphertext = aes_cbc_encrypt(key, content);
    let mut body = BytesMut::new();
    UploadHeader {
        client_id: id,
        content_size: ciphertext.len() as u32,
        filename: filename.to_string(),
    }
    .encode(&mut body)
    .unwrap();
    body.extend_from_slice(&ciphertext);
    body
}

fn name_field(name: &str) -> BytesMut {
    let mut buf = BytesMut::new();
    put_name_field(&mut buf, name).unwrap();
    buf
}

async fn read_checksum_ready(stream: &mut TcpStream) -> ChecksumFrame {
    let (header, payload) = read_response(stream).await;
    assert_eq!(header.response_code().unwrap(), ResponseCode::ChecksumReady);
    assert_eq!(header.payload_size, 0);
    assert!(payload.is_empty());

    let mut raw = [0u8; CHECKSUM_FRAME_SIZE];
    stream.read_exact(&mut raw).await.unwrap();
    ChecksumFrame::decode(&raw).unwrap()
}

#[tokio::test]
async fn legacy_trailing_body_flow() {
    let server = common::start().await;
    let mut stream = TcpStream::connect(server.addr).await.unwrap();

    let id = register(&mut stream, "alice").await;
    let key = exchange_keys(&mut stream, id, "alice").await;

    let content = b"zero-length header, body on the stream".to_vec();
    let body = upload_body(id, &key, "Legacy.txt", &content);
    send(
        &mut stream,
        &frame_declaring(id, RequestCode::SendFile.as_u16(), 0, &body),
    )
    .await;

    let ready = read_checksum_ready(&mut stream).await;
    assert_eq!(ready.content_length as usize, content.len());
    assert_eq!(ready.filename, "legacy.txt");
    assert_eq!(ready.checksum, cksum(&content));

    send(
        &mut stream,
        &frame_declaring(id, RequestCode::ChecksumOk.as_u16(), 0, &name_field("legacy.txt")),
    )
    .await;
    let (header, _) = read_response(&mut stream).await;
    assert_eq!(header.response_code().unwrap(), ResponseCode::MessageReceived);
    assert_eq!(header.client_id, id);

    assert!(server.state.directory.files_of(&id).await[0].verified);
}

#[tokio::test]
async fn checksum_ready_is_header_then_fixed_trailer() {
    let server = common::start().await;
    let mut stream = TcpStream::connect(server.addr).await.unwrap();
    let id = register(&mut stream, "ivan").await;
    let key = exchange_keys(&mut stream, id, "ivan").await;

    let content = b"read field by field".to_vec();
    let body = upload_body(id, &key, "Fields.bin", &content);
    send(&mut stream, &frame(id, RequestCode::SendFile.as_u16(), &body)).await;

    // header, then whatever it declares, then length | filename | checksum
    let (header, payload) = read_response(&mut stream).await;
    assert_eq!(header.response_code().unwrap(), ResponseCode::ChecksumReady);
    assert!(payload.is_empty());

    let mut length = [0u8; 4];
    let mut filename = [0u8; 255];
    let mut checksum = [0u8; 4];
    let read_trailer = async {
        stream.read_exact(&mut length).await.unwrap();
        stream.read_exact(&mut filename).await.unwrap();
        stream.read_exact(&mut checksum).await.unwrap();
    };
    tokio::time::timeout(std::time::Duration::from_secs(2), read_trailer)
        .await
        .expect("trailer incomplete");

    assert_eq!(u32::from_le_bytes(length) as usize, content.len());
    assert_eq!(&filename[..10], b"fields.bin");
    assert!(filename[10..].iter().all(|&b| b == 0));
    assert_eq!(u32::from_le_bytes(checksum), cksum(&content));
    expect_silence(&mut stream).await;
}

#[tokio::test]
async fn inner_double_dot_filename_is_stored() {
    let server = common::start().await;
    let mut stream = TcpStream::connect(server.addr).await.unwrap();
    let id = register(&mut stream, "judy").await;
    let key = exchange_keys(&mut stream, id, "judy").await;

    let body = upload_body(id, &key, "report..v2.txt", b"second draft");
    send(&mut stream, &frame(id, RequestCode::SendFile.as_u16(), &body)).await;

    let ready = read_checksum_ready(&mut stream).await;
    assert_eq!(ready.filename, "report..v2.txt");
    assert_eq!(
        server.state.storage.read(&id, "report..v2.txt").await.unwrap(),
        b"second draft"
    );
}

#[tokio::test]
async fn final_failure_for_unusable_name_is_acknowledged() {
    let server = common::start().await;
    let mut stream = TcpStream::connect(server.addr).await.unwrap();
    let id = register(&mut stream, "kim").await;

    send(
        &mut stream,
        &frame(id, RequestCode::ChecksumErrFinal.as_u16(), &name_field("../nope")),
    )
    .await;
    let (header, _) = read_response(&mut stream).await;
    assert_eq!(header.response_code().unwrap(), ResponseCode::MessageReceived);
    assert_eq!(header.client_id, id);
}

#[tokio::test]
async fn unregistered_client_gets_one_error_per_request() {
    let server = common::start().await;
    let mut stream = TcpStream::connect(server.addr).await.unwrap();
    let stranger = ClientId([0x42; 16]);

    let requests = [
        frame(stranger, RequestCode::SendPublicKey.as_u16(), &[0u8; 415]),
        frame(stranger, RequestCode::ChecksumOk.as_u16(), &name_field("x")),
        frame_declaring(stranger, RequestCode::ChecksumErrFinal.as_u16(), 0, &name_field("x")),
        frame(stranger, 4242, b"junk"),
    ];

    for request in requests {
        send(&mut stream, &request).await;
        let (header, payload) = read_response(&mut stream).await;
        assert_eq!(header.response_code().unwrap(), ResponseCode::RegistrationErr);
        assert!(header.client_id.is_nil());
        assert!(payload.is_empty());
    }
    expect_silence(&mut stream).await;
    assert_eq!(server.state.directory.client_count().await, 0);
}

#[tokio::test]
async fn unknown_opcode_is_ignored_and_session_continues() {
    let server = common::start().await;
    let mut stream = TcpStream::connect(server.addr).await.unwrap();
    let id = register(&mut stream, "bob").await;

    send(&mut stream, &frame(id, 1102, b"whatever")).await;
    expect_silence(&mut stream).await;

    // still in step with the framing
    send(&mut stream, &common::register_frame("bob-again")).await;
    let (header, _) = read_response(&mut stream).await;
    assert_eq!(header.response_code().unwrap(), ResponseCode::RegistrationOk);
}

#[tokio::test]
async fn duplicate_and_empty_names() {
    let server = common::start().await;
    let mut stream = TcpStream::connect(server.addr).await.unwrap();
    register(&mut stream, "carol").await;

    for name in ["carol", ""] {
        send(&mut stream, &common::register_frame(name)).await;
        let (header, _) = read_response(&mut stream).await;
        assert_eq!(header.response_code().unwrap(), ResponseCode::RegistrationErr);
        assert!(header.client_id.is_nil());
    }
    assert_eq!(server.state.directory.client_count().await, 1);
}

#[tokio::test]
async fn bad_public_key_gets_no_reply() {
    let server = common::start().await;
    let mut stream = TcpStream::connect(server.addr).await.unwrap();
    let id = register(&mut stream, "dave").await;

    let mut payload = name_field("dave");
    payload.extend_from_slice(&[0xAB; 160]);
    send(&mut stream, &frame(id, RequestCode::SendPublicKey.as_u16(), &payload)).await;
    expect_silence(&mut stream).await;
    assert!(server.state.directory.aes_key(&id).await.is_none());
}

#[tokio::test]
async fn undecryptable_upload_gets_no_reply() {
    let server = common::start().await;
    let mut stream = TcpStream::connect(server.addr).await.unwrap();
    let id = register(&mut stream, "erin").await;
    exchange_keys(&mut stream, id, "erin").await;

    // not a whole number of cipher blocks
    let mut body = BytesMut::new();
    UploadHeader {
        client_id: id,
        content_size: 17,
        filename: "x.bin".into(),
    }
    .encode(&mut body)
    .unwrap();
    body.extend_from_slice(&[0x5A; 17]);
    send(&mut stream, &frame(id, RequestCode::SendFile.as_u16(), &body)).await;
    expect_silence(&mut stream).await;
    assert!(server.state.directory.files_of(&id).await.is_empty());
}

#[tokio::test]
async fn traversal_filename_is_refused() {
    let server = common::start().await;
    let mut stream = TcpStream::connect(server.addr).await.unwrap();
    let id = register(&mut stream, "mallory").await;
    let key = exchange_keys(&mut stream, id, "mallory").await;

    let body = upload_body(id, &key, "../escape.txt", b"owned");
    send(&mut stream, &frame(id, RequestCode::SendFile.as_u16(), &body)).await;
    expect_silence(&mut stream).await;
    assert!(!server.dir.path().join("escape.txt").exists());
    assert!(server.state.directory.files_of(&id).await.is_empty());
}

#[tokio::test]
async fn truncated_header_closes_session() {
    let server = common::start().await;
    let mut stream = TcpStream::connect(server.addr).await.unwrap();

    send(&mut stream, &[1u8; 10]).await;
    stream.shutdown().await.unwrap();
    expect_closed(&mut stream).await;
}

#[tokio::test]
async fn oversized_upload_closes_session() {
    let config = ServerConfig {
        max_file_size: 1024,
        ..ServerConfig::default()
    };
    let server = common::start_with(config).await;
    let mut stream = TcpStream::connect(server.addr).await.unwrap();
    let id = register(&mut stream, "frank").await;

    let mut body = BytesMut::new();
    UploadHeader {
        client_id: id,
        content_size: 1 << 20,
        filename: "huge.bin".into(),
    }
    .encode(&mut body)
    .unwrap();
    send(
        &mut stream,
        &frame_declaring(id, RequestCode::SendFile.as_u16(), 0, &body),
    )
    .await;
    expect_closed(&mut stream).await;

    // other sessions are unaffected
    let mut other = TcpStream::connect(server.addr).await.unwrap();
    register(&mut other, "grace").await;
}

#[tokio::test]
async fn response_header_layout() {
    let server = common::start().await;
    let mut stream = TcpStream::connect(server.addr).await.unwrap();
    send(&mut stream, &common::register_frame("heidi")).await;

    let mut raw = [0u8; RESPONSE_HEADER_SIZE];
    stream.read_exact(&mut raw).await.unwrap();
    assert_eq!(raw[0], 3);
    assert_eq!(u16::from_le_bytes([raw[1], raw[2]]), 2100);
    assert_eq!(&raw[3..7], &[0, 0, 0, 0]);
    assert!(raw[7..].iter().any(|&b| b != 0));
}
