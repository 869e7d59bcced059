//! Default value functions referenced from serde attributes.

pub fn host() -> String {
    "0.0.0.0".to_string()
}

pub fn port() -> u16 {
    10001
}

pub fn db_dir() -> String {
    "db".to_string()
}

pub fn storage_dir() -> String {
    "storage".to_string()
}

pub fn chunk_size() -> usize {
    4096
}

pub fn base_game_port() -> u16 {
    10002
}

pub fn max_room_players() -> u8 {
    8
}

pub fn interpreter() -> String {
    "python3".to_string()
}

pub fn entry_suffix() -> String {
    ".py".to_string()
}

pub fn readiness_window_secs() -> u64 {
    1
}

pub fn stop_grace_secs() -> u64 {
    5
}

pub fn log_dir() -> String {
    "logs".to_string()
}

pub fn log_filename() -> String {
    "server.log".to_string()
}

pub fn log_rotation() -> String {
    "daily".to_string()
}
