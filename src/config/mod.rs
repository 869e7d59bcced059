//! Configuration for the platform server.
//!
//! Layered loading, highest precedence first:
//! 1. `GAMEDOCK_CONFIG_JSON` env var containing raw JSON
//! 2. File pointed at by `GAMEDOCK_CONFIG_PATH`
//! 3. `config.json` in the current working directory
//! 4. Defaults compiled into the binary
//!
//! Individual fields can be overridden with `GAMEDOCK__`-prefixed env vars
//! using `__` as the nested separator, e.g. `GAMEDOCK__PORT=20001` or
//! `GAMEDOCK__LOGGING__LEVEL=debug`.

pub mod defaults;
pub mod loader;
pub mod types;

pub use loader::load;
pub use types::{
    Config, LogFormat, LogLevel, LoggingConfig, RuntimeConfig, ServerConfig,
};
