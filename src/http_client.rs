use std::time::Duration;

use anyhow::{Context, Result};
use reqwest::blocking::Client;

const REQUEST_TIMEOUT_SECS: u64 = 10;

/// Identifying header required by the chess.com public API; anonymous
/// user agents get throttled aggressively.
pub const USER_AGENT_VALUE: &str = "chess_archive/0.1 (contact: ops@chess-archive.local)";

/// Builds the blocking client used for all archive requests. The entry
/// point owns it and injects it into components; nothing constructs its
/// own client.
pub fn build_client() -> Result<Client> {
    Client::builder()
        .timeout(Duration::from_secs(REQUEST_TIMEOUT_SECS))
        .build()
        .context("failed to build http client")
}
