//! Game-server subprocess lifecycle.
//!
//! For each room going `playing` the runtime extracts the game's bundle into
//! a fresh temp directory, spawns the server entry under the configured
//! interpreter, waits a short readiness window, and tracks the child under
//! the room id until it is stopped or reaped. The owning handle deletes the
//! temp directory on every exit path.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::time::Duration;
use tempfile::TempDir;
use tokio::io::AsyncReadExt;
use tokio::process::{Child, Command};
use tokio::sync::Mutex;

use crate::config::RuntimeConfig;
use crate::datastore::Game;
use crate::error::ServerError;

/// One tracked child. Dropping it kills the process (`kill_on_drop`) and
/// removes the extraction directory (`TempDir`).
struct RunningGame {
    child: Child,
    temp_dir: TempDir,
    port: u16,
}

/// Tracks the game-server child process of every playing room.
pub struct GameRuntime {
    config: RuntimeConfig,
    children: Mutex<HashMap<String, RunningGame>>,
}

impl GameRuntime {
    pub fn new(config: RuntimeConfig) -> Self {
        Self {
            config,
            children: Mutex::new(HashMap::new()),
        }
    }

    /// Extract the bundle and spawn the game server for `room_id`.
    ///
    /// The child is handed `--host 0.0.0.0 --port <port> --players <N>` and
    /// must bind the port within the readiness window; exiting inside the
    /// window is reported as a start failure with its captured stderr.
    pub async fn start(
        &self,
        room_id: &str,
        game: &Game,
        port: u16,
        players: usize,
    ) -> Result<(), ServerError> {
        let bundle = PathBuf::from(&game.bundle_path);
        if tokio::fs::metadata(&bundle).await.is_err() {
            return Err(ServerError::BundleMissing);
        }

        let explicit_entry = game.server_entry.clone();
        let suffix = self.config.entry_suffix.clone();
        let prefix = format!("game_{room_id}_");
        let (temp_dir, entry) = tokio::task::spawn_blocking(move || {
            extract_and_locate(&bundle, &prefix, explicit_entry.as_deref(), &suffix)
        })
        .await
        .map_err(|e| ServerError::Internal(e.into()))??;

        let work_dir = entry
            .parent()
            .map(Path::to_path_buf)
            .unwrap_or_else(|| temp_dir.path().to_path_buf());

        let mut child = Command::new(&self.config.interpreter)
            .arg(&entry)
            .arg("--host")
            .arg("0.0.0.0")
            .arg("--port")
            .arg(port.to_string())
            .arg("--players")
            .arg(players.to_string())
            .current_dir(&work_dir)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()
            .map_err(|e| ServerError::Spawn(e.to_string()))?;

        // Give the child time to bind its port before reporting success.
        tokio::time::sleep(Duration::from_secs(self.config.readiness_window_secs)).await;

        if let Some(status) = child
            .try_wait()
            .map_err(|e| ServerError::Spawn(e.to_string()))?
        {
            let mut stderr = String::new();
            if let Some(mut pipe) = child.stderr.take() {
                let mut raw = Vec::new();
                let _ = pipe.read_to_end(&mut raw).await;
                stderr = String::from_utf8_lossy(&raw).into_owned();
            }
            tracing::error!(%room_id, %status, %stderr, "game server exited during startup");
            return Err(ServerError::Spawn(format!(
                "game server exited during startup ({status}): {}",
                stderr.trim()
            )));
        }

        let pid = child.id();
        let mut children = self.children.lock().await;
        children.insert(
            room_id.to_string(),
            RunningGame {
                child,
                temp_dir,
                port,
            },
        );
        tracing::info!(%room_id, port, ?pid, "game server started");
        Ok(())
    }

    /// Stop the child for `room_id`, waiting up to the grace period for it
    /// to be reaped. Returns false when nothing was tracked. The temp
    /// directory is removed either way.
    pub async fn stop(&self, room_id: &str) -> bool {
        let entry = {
            let mut children = self.children.lock().await;
            children.remove(room_id)
        };
        let Some(mut running) = entry else {
            return false;
        };

        if let Err(e) = running.child.start_kill() {
            tracing::debug!(%room_id, error = %e, "kill signal failed (already exited?)");
        }
        let grace = Duration::from_secs(self.config.stop_grace_secs);
        match tokio::time::timeout(grace, running.child.wait()).await {
            Ok(Ok(status)) => {
                tracing::info!(%room_id, %status, "game server stopped");
            }
            Ok(Err(e)) => {
                tracing::warn!(%room_id, error = %e, "error reaping game server");
            }
            Err(_) => {
                tracing::warn!(%room_id, "game server did not exit within the grace period");
            }
        }

        if let Err(e) = running.temp_dir.close() {
            tracing::debug!(%room_id, error = %e, "could not remove extraction dir");
        }
        true
    }

    /// Whether a live child exists for the room. Reaps an exited child as a
    /// side effect.
    pub async fn is_running(&self, room_id: &str) -> bool {
        let mut children = self.children.lock().await;
        let Some(running) = children.get_mut(room_id) else {
            return false;
        };
        match running.child.try_wait() {
            Ok(None) => true,
            Ok(Some(status)) => {
                tracing::info!(%room_id, %status, "game server exited on its own");
                children.remove(room_id);
                false
            }
            Err(e) => {
                tracing::warn!(%room_id, error = %e, "could not poll game server");
                false
            }
        }
    }

    /// The port a tracked child was started on.
    pub async fn port_of(&self, room_id: &str) -> Option<u16> {
        let children = self.children.lock().await;
        children.get(room_id).map(|r| r.port)
    }

    /// Terminate every tracked child and remove every extraction dir.
    pub async fn shutdown_all(&self) {
        let drained: Vec<(String, RunningGame)> = {
            let mut children = self.children.lock().await;
            children.drain().collect()
        };
        for (room_id, mut running) in drained {
            let _ = running.child.start_kill();
            let _ = tokio::time::timeout(
                Duration::from_secs(self.config.stop_grace_secs),
                running.child.wait(),
            )
            .await;
            if let Err(e) = running.temp_dir.close() {
                tracing::debug!(%room_id, error = %e, "could not remove extraction dir");
            }
            tracing::info!(%room_id, "game server terminated at shutdown");
        }
    }
}

/// Blocking helper: unzip the bundle into a fresh temp dir and resolve the
/// server entry inside it.
fn extract_and_locate(
    bundle: &Path,
    prefix: &str,
    explicit_entry: Option<&str>,
    suffix: &str,
) -> Result<(TempDir, PathBuf), ServerError> {
    let temp_dir = tempfile::Builder::new()
        .prefix(prefix)
        .tempdir()
        .map_err(|e| ServerError::Extraction(e.to_string()))?;

    let file =
        std::fs::File::open(bundle).map_err(|e| ServerError::Extraction(e.to_string()))?;
    let mut archive =
        zip::ZipArchive::new(file).map_err(|e| ServerError::Extraction(e.to_string()))?;
    archive
        .extract(temp_dir.path())
        .map_err(|e| ServerError::Extraction(e.to_string()))?;

    let entry = locate_server_entry(temp_dir.path(), explicit_entry, suffix).ok_or_else(|| {
        ServerError::Extraction("no server entry found in bundle".to_string())
    })?;

    Ok((temp_dir, entry))
}

/// Resolve the server entry: the explicit relative path when it exists,
/// otherwise the first extracted file whose name contains "server"
/// (case-insensitive) and carries the expected suffix.
fn locate_server_entry(root: &Path, explicit: Option<&str>, suffix: &str) -> Option<PathBuf> {
    if let Some(rel) = explicit {
        let candidate = root.join(rel);
        if candidate.is_file() {
            return Some(candidate);
        }
    }

    let mut stack = vec![root.to_path_buf()];
    while let Some(dir) = stack.pop() {
        let Ok(entries) = std::fs::read_dir(&dir) else {
            continue;
        };
        let mut paths: Vec<PathBuf> = entries.flatten().map(|e| e.path()).collect();
        paths.sort();
        for path in paths {
            if path.is_dir() {
                stack.push(path);
            } else if let Some(name) = path.file_name().and_then(|n| n.to_str()) {
                let lower = name.to_lowercase();
                if lower.contains("server") && lower.ends_with(suffix) {
                    return Some(path);
                }
            }
        }
    }
    None
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use zip::write::SimpleFileOptions;

    fn write_zip(path: &Path, files: &[(&str, &str)]) {
        let file = std::fs::File::create(path).unwrap();
        let mut writer = zip::ZipWriter::new(file);
        for (name, contents) in files {
            writer
                .start_file(*name, SimpleFileOptions::default())
                .unwrap();
            writer.write_all(contents.as_bytes()).unwrap();
        }
        writer.finish().unwrap();
    }

    fn game(bundle: &Path, server_entry: Option<&str>) -> Game {
        Game {
            game_id: "g1".to_string(),
            name: "g".to_string(),
            developer: "alice".to_string(),
            version: "1".to_string(),
            description: String::new(),
            bundle_path: bundle.display().to_string(),
            client_entry: "client.sh".to_string(),
            server_entry: server_entry.map(str::to_string),
            max_players: 2,
            downloads: 0,
            reviews: Vec::new(),
        }
    }

    fn shell_runtime() -> GameRuntime {
        GameRuntime::new(RuntimeConfig {
            interpreter: "sh".to_string(),
            entry_suffix: ".sh".to_string(),
            readiness_window_secs: 0,
            stop_grace_secs: 2,
        })
    }

    #[test]
    fn locates_entry_by_heuristic() {
        let dir = TempDir::new().unwrap();
        std::fs::create_dir_all(dir.path().join("nested")).unwrap();
        std::fs::write(dir.path().join("client.py"), "").unwrap();
        std::fs::write(dir.path().join("nested/game_server.py"), "").unwrap();

        let found = locate_server_entry(dir.path(), None, ".py").unwrap();
        assert!(found.ends_with("nested/game_server.py"));
    }

    #[test]
    fn explicit_entry_wins_over_heuristic() {
        let dir = TempDir::new().unwrap();
        std::fs::write(dir.path().join("main.py"), "").unwrap();
        std::fs::write(dir.path().join("other_server.py"), "").unwrap();

        let found = locate_server_entry(dir.path(), Some("main.py"), ".py").unwrap();
        assert!(found.ends_with("main.py"));
    }

    #[test]
    fn suffix_mismatch_finds_nothing() {
        let dir = TempDir::new().unwrap();
        std::fs::write(dir.path().join("server.txt"), "").unwrap();
        assert!(locate_server_entry(dir.path(), None, ".py").is_none());
    }

    #[tokio::test]
    async fn missing_bundle_is_reported() {
        let runtime = shell_runtime();
        let game = game(Path::new("/definitely/not/here.zip"), None);
        assert!(matches!(
            runtime.start("r1", &game, 29000, 2).await,
            Err(ServerError::BundleMissing)
        ));
    }

    #[tokio::test]
    async fn start_tracks_child_and_stop_reaps_it() {
        let dir = TempDir::new().unwrap();
        let bundle = dir.path().join("bundle.zip");
        write_zip(
            &bundle,
            &[
                ("client.sh", "echo client\n"),
                ("server.sh", "sleep 30\n"),
            ],
        );
        let runtime = shell_runtime();
        let game = game(&bundle, None);

        runtime.start("r1", &game, 29001, 2).await.unwrap();
        assert!(runtime.is_running("r1").await);
        assert_eq!(runtime.port_of("r1").await, Some(29001));

        assert!(runtime.stop("r1").await);
        assert!(!runtime.is_running("r1").await);
        assert!(!runtime.stop("r1").await);
    }

    #[tokio::test]
    async fn early_exit_surfaces_stderr() {
        let dir = TempDir::new().unwrap();
        let bundle = dir.path().join("bundle.zip");
        write_zip(
            &bundle,
            &[("server.sh", "echo boom >&2\nexit 3\n")],
        );
        let mut runtime = shell_runtime();
        runtime.config.readiness_window_secs = 1;
        let game = game(&bundle, None);

        match runtime.start("r1", &game, 29002, 2).await {
            Err(ServerError::Spawn(msg)) => assert!(msg.contains("boom")),
            other => panic!("unexpected outcome: {other:?}"),
        }
        assert!(!runtime.is_running("r1").await);
    }

    #[tokio::test]
    async fn shutdown_all_clears_every_child() {
        let dir = TempDir::new().unwrap();
        let bundle = dir.path().join("bundle.zip");
        write_zip(&bundle, &[("server.sh", "sleep 30\n")]);
        let runtime = shell_runtime();
        let game = game(&bundle, None);

        runtime.start("r1", &game, 29003, 2).await.unwrap();
        runtime.start("r2", &game, 29004, 3).await.unwrap();

        runtime.shutdown_all().await;
        assert!(!runtime.is_running("r1").await);
        assert!(!runtime.is_running("r2").await);
    }
}
