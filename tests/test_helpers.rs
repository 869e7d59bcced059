//! Shared helpers: an in-process server on an ephemeral port and a framed
//! TCP test client speaking the real wire protocol.

#![allow(dead_code)]

use serde_json::{json, Value};
use std::io::Write;
use std::net::SocketAddr;
use std::sync::Arc;
use tempfile::TempDir;
use tokio::net::{TcpListener, TcpStream};
use tokio_util::sync::CancellationToken;

use gamedock_server::config::Config;
use gamedock_server::protocol::{encode_chunk, read_frame, write_frame};
use gamedock_server::server::PlatformServer;

/// A running platform server backed by a temp state directory.
///
/// The handle keeps the server reachable for direct catalog and runtime
/// assertions next to the wire-level dialog.
pub struct TestServer {
    pub addr: SocketAddr,
    pub server: Arc<PlatformServer>,
    shutdown: CancellationToken,
    _state_dir: TempDir,
}

impl TestServer {
    /// Boot a server whose runtime runs shell-script bundles, so spawn
    /// paths work without any game toolchain installed.
    pub async fn spawn() -> Self {
        let state_dir = TempDir::new().expect("temp state dir");

        let mut config = Config::default();
        config.server.db_dir = state_dir.path().join("db").display().to_string();
        config.server.storage_dir = state_dir.path().join("storage").display().to_string();
        config.server.base_game_port = 30002;
        config.runtime.interpreter = "sh".to_string();
        config.runtime.entry_suffix = ".sh".to_string();
        config.runtime.readiness_window_secs = 0;
        config.runtime.stop_grace_secs = 2;

        let server = PlatformServer::new(config).await.expect("server boots");
        let listener = TcpListener::bind("127.0.0.1:0").await.expect("bind");
        let addr = listener.local_addr().expect("local addr");

        let shutdown = CancellationToken::new();
        let run_server = Arc::clone(&server);
        let run_token = shutdown.clone();
        tokio::spawn(async move {
            let _ = run_server.run(listener, run_token).await;
        });

        Self {
            addr,
            server,
            shutdown,
            _state_dir: state_dir,
        }
    }

    pub async fn client(&self) -> TestClient {
        TestClient::connect(self.addr).await
    }
}

impl Drop for TestServer {
    fn drop(&mut self) {
        self.shutdown.cancel();
    }
}

/// One framed TCP connection to the test server.
pub struct TestClient {
    stream: TcpStream,
}

impl TestClient {
    pub async fn connect(addr: SocketAddr) -> Self {
        let stream = TcpStream::connect(addr).await.expect("connect");
        Self { stream }
    }

    pub async fn send(&mut self, value: &Value) {
        write_frame(&mut self.stream, value).await.expect("send");
    }

    pub async fn recv(&mut self) -> Value {
        read_frame(&mut self.stream).await.expect("recv")
    }

    /// Send one request and read its single reply.
    pub async fn request(&mut self, value: Value) -> Value {
        self.send(&value).await;
        self.recv().await
    }

    pub async fn register(&mut self, username: &str, role: &str) -> Value {
        self.request(json!({
            "action": "register",
            "username": username,
            "password": "pw",
            "role": role,
        }))
        .await
    }

    pub async fn login(&mut self, username: &str, role: &str) -> Value {
        self.request(json!({
            "action": "login",
            "username": username,
            "password": "pw",
            "role": role,
        }))
        .await
    }

    /// Register (ignoring an already-exists error) and log in.
    pub async fn sign_in(&mut self, username: &str, role: &str) {
        self.register(username, role).await;
        let reply = self.login(username, role).await;
        assert_eq!(reply["status"], "ok", "login failed: {reply}");
    }

    /// Stream `bundle` as one upload; returns the new game's id looked up
    /// from the reply of a follow-up `my_games`.
    pub async fn upload_game(&mut self, name: &str, bundle: &[u8], chunk_size: usize) -> String {
        let init = self
            .request(json!({
                "action": "upload_game_init",
                "name": name,
                "version": "1.0",
                "description": "test bundle",
                "client_entry": "client.sh",
                "server_entry": "server.sh",
                "max_players": 4,
            }))
            .await;
        assert_eq!(init["status"], "ok", "upload init failed: {init}");
        let upload_id = init["upload_id"].as_str().expect("upload_id").to_string();

        let chunks: Vec<&[u8]> = if bundle.is_empty() {
            vec![bundle]
        } else {
            bundle.chunks(chunk_size).collect()
        };
        let last = chunks.len() - 1;
        for (i, chunk) in chunks.iter().enumerate() {
            let reply = self
                .request(json!({
                    "action": "upload_game_chunk",
                    "upload_id": upload_id,
                    "data": encode_chunk(chunk),
                    "eof": i == last,
                }))
                .await;
            assert_eq!(reply["status"], "ok", "chunk failed: {reply}");
        }

        let mine = self.request(json!({"action": "my_games"})).await;
        let games = mine["games"].as_array().expect("games array");
        games
            .iter()
            .find(|g| g["name"] == name)
            .and_then(|g| g["game_id"].as_str())
            .expect("uploaded game listed")
            .to_string()
    }

    /// Pull every `download_chunk` frame for one download into a buffer.
    pub async fn download_game(&mut self, game_id: &str) -> Result<Vec<u8>, Value> {
        self.send(&json!({"action": "download_game", "game_id": game_id}))
            .await;
        let mut bytes = Vec::new();
        loop {
            let frame = self.recv().await;
            if frame["status"] == "error" {
                return Err(frame);
            }
            assert_eq!(frame["action"], "download_chunk", "unexpected frame: {frame}");
            if let Some(data) = frame["data"].as_str() {
                bytes.extend(
                    gamedock_server::protocol::decode_chunk(data).expect("valid chunk"),
                );
            }
            if frame["eof"] == true {
                return Ok(bytes);
            }
        }
    }
}

/// Build an in-memory zip whose server entry is a shell script.
pub fn shell_bundle(server_body: &str) -> Vec<u8> {
    let mut cursor = std::io::Cursor::new(Vec::new());
    {
        let mut writer = zip::ZipWriter::new(&mut cursor);
        writer
            .start_file("client.sh", zip::write::SimpleFileOptions::default())
            .expect("zip entry");
        writer.write_all(b"echo client\n").expect("zip write");
        writer
            .start_file("server.sh", zip::write::SimpleFileOptions::default())
            .expect("zip entry");
        writer.write_all(server_body.as_bytes()).expect("zip write");
        writer.finish().expect("zip finish");
    }
    cursor.into_inner()
}
