//! In-process mock of the Bot API plus in-memory framework collaborators.

#![allow(clippy::unwrap_used, clippy::expect_used, dead_code)]

use std::{
    collections::{HashMap, HashSet, VecDeque},
    path::{Path, PathBuf},
    sync::{Arc, Mutex},
    time::Duration,
};

use {
    async_trait::async_trait,
    axum::{
        Json, Router,
        body::Bytes,
        extract::State,
        http::{StatusCode, Uri},
        response::{IntoResponse, Response},
        routing::post,
    },
    futures::{StreamExt, TryStreamExt},
    relaygram_bridge::{
        ActorId, ActorSessionData, BridgeApi, ByteStream, EventId, MediaDownload, MediaRef,
        MediaStore, MemoryActorRepository, RemoteMessageId, RemoteRoomId, UserId,
    },
    relaygram_telegram::{TelegramConfig, TelegramWorker},
    serde_json::{Value, json},
    tokio::sync::oneshot,
};

pub const ACTOR: ActorId = ActorId(1);
pub const ADMIN: &str = "@admin:example.org";
pub const TOKEN: &str = "test-token";

/// One request the mock received.
#[derive(Debug, Clone)]
pub struct Captured {
    pub method: String,
    pub raw_body: String,
    pub json: Option<Value>,
}

#[derive(Default)]
struct Inner {
    requests: Vec<Captured>,
    responses: HashMap<String, VecDeque<Value>>,
    files: HashMap<String, Vec<u8>>,
    next_message_id: i64,
}

#[derive(Clone, Default)]
struct MockState {
    inner: Arc<Mutex<Inner>>,
}

/// Bot API mock. Methods answer with scripted responses first, then with
/// plausible defaults; `GetUpdates` defaults to an empty batch after a short
/// delay so an idle poller does not spin.
pub struct MockBotApi {
    pub api_url: String,
    state: MockState,
    shutdown: Option<oneshot::Sender<()>>,
}

impl MockBotApi {
    pub async fn start() -> Self {
        let state = MockState::default();
        state.inner.lock().unwrap().next_message_id = 100;
        let app = Router::new()
            .route("/{*path}", post(api_handler).get(file_handler))
            .with_state(state.clone());

        let listener = tokio::net::TcpListener::bind("127.0.0.1:0")
            .await
            .expect("bind test listener");
        let addr = listener.local_addr().expect("local addr");
        let (shutdown_tx, shutdown_rx) = oneshot::channel::<()>();
        tokio::spawn(async move {
            axum::serve(listener, app)
                .with_graceful_shutdown(async {
                    let _ = shutdown_rx.await;
                })
                .await
                .expect("serve mock telegram api");
        });

        Self {
            api_url: format!("http://{addr}/"),
            state,
            shutdown: Some(shutdown_tx),
        }
    }

    /// Queue a full response document (`{"ok": ..}`) for `method`.
    pub fn respond(&self, method: &str, response: Value) {
        self.state
            .inner
            .lock()
            .unwrap()
            .responses
            .entry(method.to_string())
            .or_default()
            .push_back(response);
    }

    pub fn respond_ok(&self, method: &str, result: Value) {
        self.respond(method, json!({ "ok": true, "result": result }));
    }

    pub fn respond_error(&self, method: &str, code: u16, description: &str) {
        self.respond(
            method,
            json!({ "ok": false, "error_code": code, "description": description }),
        );
    }

    /// Serve `bytes` for the Bot API file path `path`.
    pub fn serve_file(&self, path: &str, bytes: &[u8]) {
        self.state
            .inner
            .lock()
            .unwrap()
            .files
            .insert(path.to_string(), bytes.to_vec());
    }

    pub fn requests(&self) -> Vec<Captured> {
        self.state.inner.lock().unwrap().requests.clone()
    }

    pub fn requests_for(&self, method: &str) -> Vec<Captured> {
        self.requests()
            .into_iter()
            .filter(|r| r.method == method)
            .collect()
    }

    /// Wait until at least `count` requests for `method` arrived.
    pub async fn wait_for(&self, method: &str, count: usize) -> Vec<Captured> {
        for _ in 0..200 {
            let seen = self.requests_for(method);
            if seen.len() >= count {
                return seen;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        panic!("timed out waiting for {count} {method} requests");
    }
}

impl Drop for MockBotApi {
    fn drop(&mut self) {
        if let Some(tx) = self.shutdown.take() {
            let _ = tx.send(());
        }
    }
}

async fn api_handler(State(state): State<MockState>, uri: Uri, body: Bytes) -> Json<Value> {
    let method = uri.path().rsplit('/').next().unwrap_or_default().to_string();
    let json: Option<Value> = serde_json::from_slice(&body).ok();

    let (scripted, message_id) = {
        let mut inner = state.inner.lock().unwrap();
        inner.requests.push(Captured {
            method: method.clone(),
            raw_body: String::from_utf8_lossy(&body).to_string(),
            json: json.clone(),
        });
        let scripted = inner
            .responses
            .get_mut(&method)
            .and_then(VecDeque::pop_front);
        let message_id = inner.next_message_id;
        if scripted.is_none() {
            inner.next_message_id += 1;
        }
        (scripted, message_id)
    };
    if let Some(response) = scripted {
        return Json(response);
    }

    let chat_id = json
        .as_ref()
        .and_then(|j| j.get("chat_id"))
        .and_then(Value::as_i64)
        .unwrap_or(42);
    let result = match method.as_str() {
        "GetUpdates" => {
            tokio::time::sleep(Duration::from_millis(20)).await;
            json!([])
        },
        "SendMessage" | "SendPhoto" | "SendDocument" | "EditMessageText" => {
            message_json(message_id, chat_id, "ok")
        },
        "GetMe" => json!({
            "id": 1,
            "is_bot": true,
            "first_name": "Relay",
            "username": "relay_bot",
            "can_join_groups": true,
            "can_read_all_group_messages": false,
            "supports_inline_queries": false,
            "can_connect_to_business": false,
            "has_main_web_app": false
        }),
        _ => json!(true),
    };
    Json(json!({ "ok": true, "result": result }))
}

async fn file_handler(State(state): State<MockState>, uri: Uri) -> Response {
    let inner = state.inner.lock().unwrap();
    let found = inner
        .files
        .iter()
        .find(|(path, _)| uri.path().ends_with(path.as_str()))
        .map(|(_, bytes)| bytes.clone());
    match found {
        Some(bytes) => bytes.into_response(),
        None => StatusCode::NOT_FOUND.into_response(),
    }
}

pub fn message_json(message_id: i64, chat_id: i64, text: &str) -> Value {
    json!({
        "message_id": message_id,
        "date": 0,
        "chat": { "id": chat_id, "type": "private", "first_name": "Alice" },
        "from": { "id": 1, "is_bot": true, "first_name": "Relay" },
        "text": text
    })
}

/// `{"update_id": id, "message": {...}}` for a text message in a private chat.
pub fn text_update(update_id: u32, chat_id: i64, from: u64, message_id: i32, text: &str) -> Value {
    json!({
        "update_id": update_id,
        "message": {
            "message_id": message_id,
            "date": 1,
            "chat": { "id": chat_id, "type": "private", "first_name": "Alice" },
            "from": { "id": from, "is_bot": false, "first_name": "Alice" },
            "text": text
        }
    })
}

/// Framework stand-in: bridged rooms and message links in memory.
#[derive(Default)]
pub struct MockBridge {
    bridged: Mutex<HashSet<RemoteRoomId>>,
    links: Mutex<Vec<(RemoteRoomId, EventId, RemoteMessageId)>>,
    unavailable_checks: Mutex<usize>,
}

impl MockBridge {
    /// Make the next `count` bridged-room checks fail as if the framework
    /// were unreachable.
    pub fn fail_bridged_checks(&self, count: usize) {
        *self.unavailable_checks.lock().unwrap() = count;
    }

    pub fn bridge_room(&self, room_id: RemoteRoomId) {
        self.bridged.lock().unwrap().insert(room_id);
    }

    pub fn link(&self, room_id: RemoteRoomId, event_id: &str, message_id: i32) {
        self.links.lock().unwrap().push((
            room_id,
            EventId::new(event_id),
            RemoteMessageId(message_id),
        ));
    }

    pub fn links(&self) -> Vec<(RemoteRoomId, EventId, RemoteMessageId)> {
        self.links.lock().unwrap().clone()
    }
}

#[async_trait]
impl BridgeApi for MockBridge {
    async fn is_room_bridged(&self, room_id: &RemoteRoomId) -> relaygram_bridge::Result<bool> {
        {
            let mut remaining = self.unavailable_checks.lock().unwrap();
            if *remaining > 0 {
                *remaining -= 1;
                return Err(relaygram_bridge::Error::unavailable("bridge database offline"));
            }
        }
        Ok(self.bridged.lock().unwrap().contains(room_id))
    }

    async fn get_message_event_id(
        &self,
        room_id: &RemoteRoomId,
        message_id: RemoteMessageId,
    ) -> relaygram_bridge::Result<Option<EventId>> {
        Ok(self
            .links
            .lock()
            .unwrap()
            .iter()
            .rev()
            .find(|(room, _, msg)| room == room_id && *msg == message_id)
            .map(|(_, event, _)| event.clone()))
    }

    async fn get_remote_message_id(
        &self,
        room_id: &RemoteRoomId,
        event_id: &EventId,
    ) -> relaygram_bridge::Result<Option<RemoteMessageId>> {
        Ok(self
            .links
            .lock()
            .unwrap()
            .iter()
            .rev()
            .find(|(room, event, _)| room == room_id && event == event_id)
            .map(|(_, _, msg)| *msg))
    }

    async fn link_message_id(
        &self,
        room_id: &RemoteRoomId,
        event_id: &EventId,
        message_id: RemoteMessageId,
    ) -> relaygram_bridge::Result<()> {
        self.links
            .lock()
            .unwrap()
            .push((room_id.clone(), event_id.clone(), message_id));
        Ok(())
    }
}

/// Room-message store stand-in serving fixed bytes and recording uploads.
#[derive(Default)]
pub struct MockStore {
    pub uploads: Mutex<Vec<Upload>>,
}

#[derive(Debug, Clone)]
pub struct Upload {
    pub content_type: Option<String>,
    pub file_name: Option<String>,
    pub bytes: Vec<u8>,
}

#[async_trait]
impl MediaStore for MockStore {
    async fn download(&self, _media: &MediaRef) -> relaygram_bridge::Result<MediaDownload> {
        let chunks: Vec<std::io::Result<Bytes>> = vec![
            Ok(Bytes::from_static(b"\x89PNG")),
            Ok(Bytes::from_static(b"fake image")),
        ];
        Ok(MediaDownload {
            body: futures::stream::iter(chunks).boxed(),
            content_type: Some("image/png".into()),
            length: Some(14),
        })
    }

    async fn upload(
        &self,
        body: ByteStream,
        content_type: Option<&str>,
        file_name: Option<&str>,
        _length: Option<u64>,
    ) -> relaygram_bridge::Result<MediaRef> {
        let chunks: Vec<Bytes> = body
            .try_collect()
            .await
            .map_err(|e| relaygram_bridge::Error::external("read upload body", e))?;
        let mut uploads = self.uploads.lock().unwrap();
        uploads.push(Upload {
            content_type: content_type.map(str::to_string),
            file_name: file_name.map(str::to_string),
            bytes: chunks.concat(),
        });
        Ok(MediaRef::new(format!("mxc://example.org/upload{}", uploads.len())))
    }
}

/// A worker wired to the mock API, with one provisioned actor.
pub struct Harness {
    pub api: MockBotApi,
    pub bridge: Arc<MockBridge>,
    pub store: Arc<MockStore>,
    pub worker: TelegramWorker,
    pub scratch: tempfile::TempDir,
}

impl Harness {
    pub async fn new() -> Self {
        let api = MockBotApi::start().await;
        let bridge = Arc::new(MockBridge::default());
        let store = Arc::new(MockStore::default());
        let scratch = tempfile::tempdir().expect("scratch dir");
        let repository = Arc::new(MemoryActorRepository::with_actors([(
            ACTOR,
            ActorSessionData::new(TOKEN, UserId::parse(ADMIN).unwrap()),
        )]));
        let config = TelegramConfig {
            api_url: Some(api.api_url.clone()),
            poll_timeout_secs: 0,
            request_timeout_secs: 5,
            scratch_dir: Some(scratch.path().to_path_buf()),
            ..TelegramConfig::default()
        };
        let worker = TelegramWorker::new(
            config,
            repository,
            Arc::clone(&bridge) as Arc<dyn BridgeApi>,
            Arc::clone(&store) as Arc<dyn MediaStore>,
        );
        Self {
            api,
            bridge,
            store,
            worker,
            scratch,
        }
    }

    pub fn scratch_path(&self) -> &Path {
        self.scratch.path()
    }

    /// Entries left in the scratch parent directory.
    pub fn scratch_entries(&self) -> Vec<PathBuf> {
        std::fs::read_dir(self.scratch.path())
            .unwrap()
            .map(|entry| entry.unwrap().path())
            .collect()
    }
}
