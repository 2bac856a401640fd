//! Authorization gate and opcode routing.

use bytes::BytesMut;
use tracing::{debug, error, warn};
use vault_shared::protocol::{RequestCode, Response, ResponseCode};
use vault_shared::ClientId;

use crate::error::Result;
use crate::handlers::{identity, transfer};
use crate::server::ServerState;
use crate::session::{Request, RequestBody};

/// Frames to write back for one request, in order. Empty means the client
/// gets no answer.
#[derive(Debug, Default)]
pub struct Reply {
    frames: Vec<BytesMut>,
}

impl Reply {
    pub fn none() -> Self {
        Self::default()
    }

    pub fn response(response: Response) -> Self {
        Self {
            frames: vec![response.to_bytes()],
        }
    }

    /// Append a raw frame that follows the response without a header of
    /// its own.
    pub fn then_raw(mut self, frame: BytesMut) -> Self {
        self.frames.push(frame);
        self
    }

    pub fn is_empty(&self) -> bool {
        self.frames.is_empty()
    }

    pub fn into_frames(self) -> Vec<BytesMut> {
        self.frames
    }
}

/// Route one request to its handler.
///
/// Every opcode except Register requires a known client id; otherwise the
/// single reply is a RegistrationErr carrying the nil id. Handler failures
/// are logged and answered with silence. Only framing and socket errors
/// escape, which ends the session.
pub async fn dispatch(state: &ServerState, request: Request) -> Result<Reply> {
    let client_id = request.header.client_id;
    let code = request.header.code;

    if !matches!(request.body, RequestBody::Register(_)) {
        let Some(name) = state.directory.client_name(&client_id).await else {
            warn!(client = %client_id, code, "Request from unregistered client");
            return Ok(Reply::response(Response::new(
                ResponseCode::RegistrationErr,
                ClientId::NIL,
            )));
        };
        debug!(client = %client_id, name = %name, code, "Request");
        if let Err(e) = state.directory.touch(&client_id).await {
            warn!(client = %client_id, error = %e, "Failed to update last seen");
        }
    }

    let result = match request.body {
        RequestBody::Register(payload) => identity::register(state, payload).await,
        RequestBody::KeyExchange(payload) => {
            identity::exchange_keys(state, &request.header, payload).await
        }
        RequestBody::Upload { header, ciphertext } => {
            transfer::receive_file(state, &request.header, header, ciphertext).await
        }
        RequestBody::ChecksumResult { code, result } => match code {
            RequestCode::ChecksumOk => {
                transfer::checksum_ok(state, &request.header, result).await
            }
            RequestCode::ChecksumErr => {
                transfer::checksum_err(state, &request.header, result).await
            }
            RequestCode::ChecksumErrFinal => {
                transfer::checksum_err_final(state, &request.header, result).await
            }
            other => {
                warn!(client = %client_id, code = ?other, "Not a checksum result opcode");
                Ok(Reply::none())
            }
        },
        RequestBody::Unknown(code) => {
            warn!(client = %client_id, code, "Ignoring unknown opcode");
            Ok(Reply::none())
        }
    };

    match result {
        Ok(reply) => Ok(reply),
        Err(e) if e.is_fatal() => Err(e),
        Err(e) => {
            error!(client = %client_id, code, error = %e, "Request failed");
            Ok(Reply::none())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use vault_shared::checksum::cksum;
    use vault_shared::crypto::aes_cbc_encrypt;
    use vault_shared::protocol::{
        ChecksumFrame, ChecksumResult, RegisterPayload, RequestHeader, ResponseHeader,
        UploadHeader,
    };
    use vault_shared::constants::RESPONSE_HEADER_SIZE;
    use vault_store::Database;

    use crate::config::ServerConfig;
    use crate::directory::Directory;
    use crate::file_store::FileStorage;

    async fn test_state() -> (ServerState, tempfile::TempDir) {
        let tmp = tempfile::tempdir().unwrap();
        let directory = Directory::load(Database::open_in_memory().unwrap()).unwrap();
        let storage = FileStorage::new(tmp.path().join("files")).await.unwrap();
        (ServerState::new(directory, storage, &ServerConfig::default()), tmp)
    }

    fn request(client_id: ClientId, code: RequestCode, body: RequestBody) -> Request {
        Request {
            header: RequestHeader::new(client_id, code, 0),
            body,
        }
    }

    fn only_header(reply: Reply) -> ResponseHeader {
        let frames = reply.into_frames();
        assert_eq!(frames.len(), 1);
        assert_eq!(frames[0].len(), RESPONSE_HEADER_SIZE);
        ResponseHeader::decode(&frames[0]).unwrap()
    }

    fn checksum_request(id: ClientId, code: RequestCode, filename: &str) -> Request {
        request(
            id,
            code,
            RequestBody::ChecksumResult {
                code,
                result: ChecksumResult {
                    filename: filename.into(),
                },
            },
        )
    }

    #[tokio::test]
    async fn test_unknown_client_gets_registration_error_only() {
        let (state, _tmp) = test_state().await;
        let stranger = ClientId([9; 16]);

        let reply = dispatch(&state, checksum_request(stranger, RequestCode::ChecksumOk, "x"))
            .await
            .unwrap();
        let header = only_header(reply);
        assert_eq!(header.response_code().unwrap(), ResponseCode::RegistrationErr);
        assert!(header.client_id.is_nil());

        let reply = dispatch(&state, request(stranger, RequestCode::Register, RequestBody::Unknown(1102)))
            .await
            .unwrap();
        assert_eq!(
            only_header(reply).response_code().unwrap(),
            ResponseCode::RegistrationErr
        );
        assert_eq!(state.directory.client_count().await, 0);
    }

    #[tokio::test]
    async fn test_register_then_duplicate() {
        let (state, _tmp) = test_state().await;
        let body = || RequestBody::Register(RegisterPayload { name: "alice".into() });

        let reply = dispatch(&state, request(ClientId::NIL, RequestCode::Register, body()))
            .await
            .unwrap();
        let ok = only_header(reply);
        assert_eq!(ok.response_code().unwrap(), ResponseCode::RegistrationOk);
        assert!(state.directory.client_exists(&ok.client_id).await);

        let reply = dispatch(&state, request(ClientId::NIL, RequestCode::Register, body()))
            .await
            .unwrap();
        let err = only_header(reply);
        assert_eq!(err.response_code().unwrap(), ResponseCode::RegistrationErr);
        assert!(err.client_id.is_nil());
        assert_eq!(state.directory.client_count().await, 1);
    }

    #[tokio::test]
    async fn test_unknown_opcode_from_known_client_is_silent() {
        let (state, _tmp) = test_state().await;
        let id = state.directory.register("bob").await.unwrap();

        let reply = dispatch(&state, request(id, RequestCode::Register, RequestBody::Unknown(1199)))
            .await
            .unwrap();
        assert!(reply.is_empty());
    }

    #[tokio::test]
    async fn test_upload_without_session_key_is_silent() {
        let (state, _tmp) = test_state().await;
        let id = state.directory.register("carol").await.unwrap();

        let body = RequestBody::Upload {
            header: UploadHeader {
                client_id: id,
                content_size: 16,
                filename: "a.txt".into(),
            },
            ciphertext: vec![0u8; 16],
        };
        let reply = dispatch(&state, request(id, RequestCode::SendFile, body)).await.unwrap();
        assert!(reply.is_empty());
        assert!(state.directory.files_of(&id).await.is_empty());
    }

    #[tokio::test]
    async fn test_upload_and_checksum_outcomes() {
        let (state, _tmp) = test_state().await;
        let id = state.directory.register("dave").await.unwrap();
        let key = [5u8; 16];
        state.directory.set_keys(&id, &[0u8; 160], &key).await.unwrap();

        let content = b"quarterly numbers".to_vec();
        let ciphertext = aes_cbc_encrypt(&key, &content);
        let body = RequestBody::Upload {
            header: UploadHeader {
                client_id: id,
                content_size: ciphertext.len() as u32,
                filename: "Report.TXT".into(),
            },
            ciphertext,
        };
        let frames = dispatch(&state, request(id, RequestCode::SendFile, body))
            .await
            .unwrap()
            .into_frames();
        assert_eq!(frames.len(), 2);

        let header = ResponseHeader::decode(&frames[0][..RESPONSE_HEADER_SIZE]).unwrap();
        assert_eq!(header.response_code().unwrap(), ResponseCode::ChecksumReady);
        assert_eq!(header.payload_size, 0);
        assert_eq!(frames[0].len(), RESPONSE_HEADER_SIZE);

        let frame = ChecksumFrame::decode(&frames[1]).unwrap();
        assert_eq!(frame.content_length as usize, content.len());
        assert_eq!(frame.filename, "report.txt");
        assert_eq!(frame.checksum, cksum(&content));
        assert_eq!(state.storage.read(&id, "report.txt").await.unwrap(), content);

        // a mismatch report changes nothing and gets no answer
        let reply = dispatch(&state, checksum_request(id, RequestCode::ChecksumErr, "report.txt"))
            .await
            .unwrap();
        assert!(reply.is_empty());
        assert!(!state.directory.files_of(&id).await[0].verified);

        let reply = dispatch(&state, checksum_request(id, RequestCode::ChecksumOk, "report.txt"))
            .await
            .unwrap();
        assert_eq!(
            only_header(reply).response_code().unwrap(),
            ResponseCode::MessageReceived
        );
        assert!(state.directory.files_of(&id).await[0].verified);

        let reply = dispatch(
            &state,
            checksum_request(id, RequestCode::ChecksumErrFinal, "report.txt"),
        )
        .await
        .unwrap();
        assert_eq!(
            only_header(reply).response_code().unwrap(),
            ResponseCode::MessageReceived
        );
        assert!(state.directory.files_of(&id).await.is_empty());
        assert!(state.storage.read(&id, "report.txt").await.is_err());
    }

    #[tokio::test]
    async fn test_final_failure_for_unusable_name_is_acknowledged() {
        let (state, _tmp) = test_state().await;
        let id = state.directory.register("erin").await.unwrap();

        for name in ["../escape.txt", "a/b", ".."] {
            let reply = dispatch(&state, checksum_request(id, RequestCode::ChecksumErrFinal, name))
                .await
                .unwrap();
            assert_eq!(
                only_header(reply).response_code().unwrap(),
                ResponseCode::MessageReceived
            );
        }
    }

    #[tokio::test]
    async fn test_name_that_grows_when_lowercased_is_refused_before_writing() {
        let (state, tmp) = test_state().await;
        let id = state.directory.register("frank").await.unwrap();
        let key = [6u8; 16];
        state.directory.set_keys(&id, &[0u8; 160], &key).await.unwrap();

        // 'İ' is two bytes but lowercases to three
        let filename = "\u{130}".repeat(127);
        assert!(filename.len() <= 255);
        assert!(filename.to_lowercase().len() > 255);

        let ciphertext = aes_cbc_encrypt(&key, b"content");
        let body = RequestBody::Upload {
            header: UploadHeader {
                client_id: id,
                content_size: ciphertext.len() as u32,
                filename,
            },
            ciphertext,
        };
        let reply = dispatch(&state, request(id, RequestCode::SendFile, body)).await.unwrap();
        assert!(reply.is_empty());
        assert!(state.directory.files_of(&id).await.is_empty());
        assert!(!tmp.path().join("files").join(id.to_hex()).exists());
    }
}
