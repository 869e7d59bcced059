use std::io::Write;
use std::path::Path;
use std::sync::Arc;

use tempfile::TempDir;
use zip::write::SimpleFileOptions;

use crate::config::RuntimeConfig;
use crate::datastore::{CatalogStore, GameUpsert, JsonCatalog, Role, RoomStatus};
use crate::error::ServerError;
use crate::lobby::LobbyManager;
use crate::runtime::GameRuntime;

struct Fixture {
    _dir: TempDir,
    catalog: Arc<dyn CatalogStore>,
    runtime: Arc<GameRuntime>,
    lobby: LobbyManager,
    game_id: String,
}

fn write_bundle(path: &Path, server_body: &str) {
    let file = std::fs::File::create(path).unwrap();
    let mut writer = zip::ZipWriter::new(file);
    writer
        .start_file("client.sh", SimpleFileOptions::default())
        .unwrap();
    writer.write_all(b"echo client\n").unwrap();
    writer
        .start_file("server.sh", SimpleFileOptions::default())
        .unwrap();
    writer.write_all(server_body.as_bytes()).unwrap();
    writer.finish().unwrap();
}

/// Catalog + lobby wired to a shell-script runtime so spawn paths run
/// without any game toolchain.
async fn fixture(server_body: &str) -> Fixture {
    let dir = TempDir::new().unwrap();
    let catalog: Arc<dyn CatalogStore> =
        Arc::new(JsonCatalog::open(&dir.path().join("db")).await.unwrap());
    catalog
        .register_user("alice", "pw", Role::Developer)
        .await
        .unwrap();
    for player in ["bob", "carol", "dave"] {
        catalog
            .register_user(player, "pw", Role::Player)
            .await
            .unwrap();
    }

    let bundle = dir.path().join("bundle.zip");
    write_bundle(&bundle, server_body);
    let game_id = catalog
        .upsert_game(GameUpsert {
            developer: "alice".to_string(),
            name: "duel".to_string(),
            version: "1".to_string(),
            description: String::new(),
            bundle_path: bundle.display().to_string(),
            client_entry: "client.sh".to_string(),
            server_entry: Some("server.sh".to_string()),
            max_players: 4,
            game_id: None,
        })
        .await
        .unwrap();

    let runtime = Arc::new(GameRuntime::new(RuntimeConfig {
        interpreter: "sh".to_string(),
        entry_suffix: ".sh".to_string(),
        readiness_window_secs: 0,
        stop_grace_secs: 2,
    }));
    let lobby = LobbyManager::new(Arc::clone(&catalog), Arc::clone(&runtime));

    Fixture {
        _dir: dir,
        catalog,
        runtime,
        lobby,
        game_id,
    }
}

#[tokio::test]
async fn create_room_clamps_to_the_games_player_limit() {
    let fx = fixture("sleep 30\n").await;

    let room = fx
        .lobby
        .create_room("bob", &fx.game_id, "big", 8, 20002)
        .await
        .unwrap();
    assert_eq!(room.max_players, 4);
    assert_eq!(room.players, vec!["bob".to_string()]);
    assert_eq!(room.status, RoomStatus::Waiting);

    // A floor of two even when the host asks for less.
    fx.lobby.close_room(&room.room_id, "bob").await.unwrap();
    let room = fx
        .lobby
        .create_room("bob", &fx.game_id, "tiny", 0, 20003)
        .await
        .unwrap();
    assert_eq!(room.max_players, 2);
}

#[tokio::test]
async fn one_hosted_room_at_a_time() {
    let fx = fixture("sleep 30\n").await;
    let room = fx
        .lobby
        .create_room("bob", &fx.game_id, "one", 2, 20002)
        .await
        .unwrap();

    match fx
        .lobby
        .create_room("bob", &fx.game_id, "two", 2, 20003)
        .await
    {
        Err(ServerError::AlreadyHosting(existing)) => assert_eq!(existing, room.room_id),
        other => panic!("unexpected outcome: {other:?}"),
    }
}

#[tokio::test]
async fn create_room_requires_an_existing_game() {
    let fx = fixture("sleep 30\n").await;
    assert!(matches!(
        fx.lobby.create_room("bob", "missing", "r", 2, 20002).await,
        Err(ServerError::GameNotFound)
    ));
}

#[tokio::test]
async fn start_game_is_gated_on_readiness_and_launches_the_child() {
    let fx = fixture("sleep 30\n").await;
    let room = fx
        .lobby
        .create_room("bob", &fx.game_id, "duel", 2, 21002)
        .await
        .unwrap();
    fx.lobby.join_room(&room.room_id, "carol").await.unwrap();

    match fx.lobby.start_game(&room.room_id, "bob").await {
        Err(ServerError::NotAllReady(missing)) => {
            assert!(missing.contains("bob"));
            assert!(missing.contains("carol"));
        }
        other => panic!("unexpected outcome: {other:?}"),
    }
    assert_eq!(
        fx.lobby.get_room(&room.room_id).await.unwrap().status,
        RoomStatus::Waiting
    );

    fx.lobby.set_ready(&room.room_id, "bob", true).await.unwrap();
    fx.lobby
        .set_ready(&room.room_id, "carol", true)
        .await
        .unwrap();

    let (started, port) = fx.lobby.start_game(&room.room_id, "bob").await.unwrap();
    assert_eq!(port, 21002);
    assert_eq!(started.status, RoomStatus::Playing);
    assert!(fx.runtime.is_running(&room.room_id).await);

    // A second start is refused while playing.
    assert!(matches!(
        fx.lobby.start_game(&room.room_id, "bob").await,
        Err(ServerError::RoomAlreadyStarted)
    ));

    fx.lobby.close_room(&room.room_id, "bob").await.unwrap();
    assert!(!fx.runtime.is_running(&room.room_id).await);
}

#[tokio::test]
async fn only_the_host_starts_and_closes() {
    let fx = fixture("sleep 30\n").await;
    let room = fx
        .lobby
        .create_room("bob", &fx.game_id, "duel", 2, 21002)
        .await
        .unwrap();
    fx.lobby.join_room(&room.room_id, "carol").await.unwrap();

    assert!(matches!(
        fx.lobby.start_game(&room.room_id, "carol").await,
        Err(ServerError::NotHost)
    ));
    assert!(matches!(
        fx.lobby.close_room(&room.room_id, "carol").await,
        Err(ServerError::NotHost)
    ));
}

#[tokio::test]
async fn spawn_failure_rolls_the_room_back_to_waiting() {
    let fx = fixture("echo broken >&2\nexit 1\n").await;
    // A real readiness window so the early exit is observed.
    let runtime = Arc::new(GameRuntime::new(RuntimeConfig {
        interpreter: "sh".to_string(),
        entry_suffix: ".sh".to_string(),
        readiness_window_secs: 1,
        stop_grace_secs: 2,
    }));
    let lobby = LobbyManager::new(Arc::clone(&fx.catalog), runtime);

    let room = lobby
        .create_room("bob", &fx.game_id, "duel", 2, 21003)
        .await
        .unwrap();
    lobby.join_room(&room.room_id, "carol").await.unwrap();
    lobby.set_ready(&room.room_id, "bob", true).await.unwrap();
    lobby.set_ready(&room.room_id, "carol", true).await.unwrap();

    match lobby.start_game(&room.room_id, "bob").await {
        Err(ServerError::Spawn(msg)) => assert!(msg.contains("broken")),
        other => panic!("unexpected outcome: {other:?}"),
    }

    let room = lobby.get_room(&room.room_id).await.unwrap();
    assert_eq!(room.status, RoomStatus::Waiting);
    // Readiness survives the failed launch; the host may retry.
    assert_eq!(room.ready_players.len(), 2);
}

#[tokio::test]
async fn start_game_fails_cleanly_when_the_game_was_deleted() {
    let fx = fixture("sleep 30\n").await;
    let room = fx
        .lobby
        .create_room("bob", &fx.game_id, "duel", 2, 21008)
        .await
        .unwrap();
    fx.lobby.join_room(&room.room_id, "carol").await.unwrap();
    fx.lobby.set_ready(&room.room_id, "bob", true).await.unwrap();
    fx.lobby
        .set_ready(&room.room_id, "carol", true)
        .await
        .unwrap();

    // The developer pulls the game after everyone readies up.
    fx.catalog.delete_game(&fx.game_id).await.unwrap();

    assert!(matches!(
        fx.lobby.start_game(&room.room_id, "bob").await,
        Err(ServerError::GameNotFound)
    ));
    let room = fx.lobby.get_room(&room.room_id).await.unwrap();
    assert_eq!(room.status, RoomStatus::Waiting);
    assert!(!fx.runtime.is_running(&room.room_id).await);
}

#[tokio::test]
async fn end_game_allows_a_rematch() {
    let fx = fixture("sleep 30\n").await;
    let room = fx
        .lobby
        .create_room("bob", &fx.game_id, "duel", 2, 21004)
        .await
        .unwrap();
    fx.lobby.join_room(&room.room_id, "carol").await.unwrap();
    fx.lobby.set_ready(&room.room_id, "bob", true).await.unwrap();
    fx.lobby
        .set_ready(&room.room_id, "carol", true)
        .await
        .unwrap();
    fx.lobby.start_game(&room.room_id, "bob").await.unwrap();

    // Any member can end, not just the host.
    let room_after = fx.lobby.end_game(&room.room_id, "carol").await.unwrap();
    assert_eq!(room_after.status, RoomStatus::Waiting);
    assert!(room_after.ready_players.is_empty());
    assert!(!fx.runtime.is_running(&room.room_id).await);

    assert!(matches!(
        fx.lobby.end_game(&room.room_id, "eve").await,
        Err(ServerError::NotInRoom)
    ));

    // Rematch works after everyone readies up again.
    fx.lobby.set_ready(&room.room_id, "bob", true).await.unwrap();
    fx.lobby
        .set_ready(&room.room_id, "carol", true)
        .await
        .unwrap();
    fx.lobby.start_game(&room.room_id, "bob").await.unwrap();
    assert!(fx.runtime.is_running(&room.room_id).await);
    fx.lobby.close_room(&room.room_id, "bob").await.unwrap();
}

#[tokio::test]
async fn host_leaving_closes_the_room_and_child() {
    let fx = fixture("sleep 30\n").await;
    let room = fx
        .lobby
        .create_room("bob", &fx.game_id, "duel", 2, 21005)
        .await
        .unwrap();
    fx.lobby.join_room(&room.room_id, "carol").await.unwrap();
    fx.lobby.set_ready(&room.room_id, "bob", true).await.unwrap();
    fx.lobby
        .set_ready(&room.room_id, "carol", true)
        .await
        .unwrap();
    fx.lobby.start_game(&room.room_id, "bob").await.unwrap();

    fx.lobby.leave_room(&room.room_id, "bob").await.unwrap();
    assert!(matches!(
        fx.lobby.get_room(&room.room_id).await,
        Err(ServerError::RoomNotFound)
    ));
    assert!(!fx.runtime.is_running(&room.room_id).await);
}

#[tokio::test]
async fn member_leaving_while_playing_leaves_the_child_alone() {
    let fx = fixture("sleep 30\n").await;
    let room = fx
        .lobby
        .create_room("bob", &fx.game_id, "trio", 3, 21006)
        .await
        .unwrap();
    fx.lobby.join_room(&room.room_id, "carol").await.unwrap();
    fx.lobby.join_room(&room.room_id, "dave").await.unwrap();
    for p in ["bob", "carol", "dave"] {
        fx.lobby.set_ready(&room.room_id, p, true).await.unwrap();
    }
    fx.lobby.start_game(&room.room_id, "bob").await.unwrap();

    fx.lobby.leave_room(&room.room_id, "dave").await.unwrap();
    let room_after = fx.lobby.get_room(&room.room_id).await.unwrap();
    assert_eq!(room_after.status, RoomStatus::Playing);
    assert!(fx.runtime.is_running(&room.room_id).await);

    fx.lobby.close_room(&room.room_id, "bob").await.unwrap();
}

#[tokio::test]
async fn join_after_start_is_refused() {
    let fx = fixture("sleep 30\n").await;
    let room = fx
        .lobby
        .create_room("bob", &fx.game_id, "trio", 3, 21007)
        .await
        .unwrap();
    fx.lobby.join_room(&room.room_id, "carol").await.unwrap();
    fx.lobby.set_ready(&room.room_id, "bob", true).await.unwrap();
    fx.lobby
        .set_ready(&room.room_id, "carol", true)
        .await
        .unwrap();
    fx.lobby.start_game(&room.room_id, "bob").await.unwrap();

    assert!(matches!(
        fx.lobby.join_room(&room.room_id, "dave").await,
        Err(ServerError::RoomAlreadyStarted)
    ));

    fx.lobby.close_room(&room.room_id, "bob").await.unwrap();
}
