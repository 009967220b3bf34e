use std::cell::Cell;
use std::time::{Duration, Instant};

use anyhow::{Context, Result, anyhow};
use reqwest::blocking::Client;
use reqwest::header::USER_AGENT;
use serde::Deserialize;
use tracing::{debug, info, warn};

use crate::archive_cache::{ArchiveCache, ArchiveMonth};
use crate::http_client::USER_AGENT_VALUE;

const API_BASE: &str = "https://api.chess.com/pub";

/// Minimum spacing between consecutive network requests. The public API
/// rate-limits serial clients at roughly one request per second; cache
/// hits are not subject to this.
pub const MIN_REQUEST_INTERVAL: Duration = Duration::from_millis(1100);

/// Response of the archive-index endpoint: one URL per calendar month
/// with recorded activity, in chronological order.
#[derive(Debug, Clone, Deserialize)]
pub struct RawArchiveIndex {
    #[serde(default)]
    pub archives: Vec<String>,
}

#[derive(Debug, Clone, Deserialize, Default)]
pub struct RawArchive {
    #[serde(default)]
    pub games: Vec<RawGame>,
}

/// One game payload as the provider ships it. Every field is optional;
/// validation happens once in the normalizer, nowhere else.
#[derive(Debug, Clone, Deserialize)]
pub struct RawGame {
    pub uuid: Option<String>,
    pub url: Option<String>,
    pub white: Option<RawSide>,
    pub black: Option<RawSide>,
    pub time_class: Option<String>,
    pub time_control: Option<String>,
    pub rules: Option<String>,
    pub pgn: Option<String>,
    pub end_time: Option<i64>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct RawSide {
    pub username: Option<String>,
    pub rating: Option<i64>,
    pub result: Option<String>,
    #[serde(rename = "@id")]
    pub profile: Option<String>,
}

/// One fetched archive month. `from_cache` tells the orchestrator
/// whether the fetch cost a network round trip.
#[derive(Debug, Clone)]
pub struct FetchedArchive {
    pub games: Vec<RawGame>,
    pub from_cache: bool,
}

/// Seam between the orchestrator and the remote archive API. The real
/// implementation talks HTTP; tests substitute a canned fake.
pub trait ArchiveSource {
    /// Ordered archive endpoint URLs for a player. An empty list means
    /// the player has no recorded games.
    fn archive_urls(&self, player: &str) -> Result<Vec<String>>;

    /// Raw game list for one archive URL.
    fn fetch_archive(&self, player: &str, url: &str) -> Result<FetchedArchive>;
}

/// HTTP-backed source with a disk cache in front. Archives for elapsed
/// months are immutable, so a cache hit skips the network entirely.
pub struct HttpArchiveSource<'a> {
    client: &'a Client,
    cache: ArchiveCache,
    min_interval: Duration,
    last_request: Cell<Option<Instant>>,
}

impl<'a> HttpArchiveSource<'a> {
    pub fn new(client: &'a Client, cache: ArchiveCache) -> Self {
        Self {
            client,
            cache,
            min_interval: MIN_REQUEST_INTERVAL,
            last_request: Cell::new(None),
        }
    }

    pub fn with_min_interval(mut self, min_interval: Duration) -> Self {
        self.min_interval = min_interval;
        self
    }

    /// Sleeps until at least `min_interval` has passed since the last
    /// network request. Called immediately before each GET and never on
    /// the cache path.
    fn throttle(&self) {
        if let Some(last) = self.last_request.get() {
            let elapsed = last.elapsed();
            if elapsed < self.min_interval {
                std::thread::sleep(self.min_interval - elapsed);
            }
        }
        self.last_request.set(Some(Instant::now()));
    }

    fn get_text(&self, url: &str) -> Result<String> {
        self.throttle();
        let resp = self
            .client
            .get(url)
            .header(USER_AGENT, USER_AGENT_VALUE)
            .send()
            .with_context(|| format!("request failed: {url}"))?;
        let status = resp.status();
        let body = resp.text().context("failed reading response body")?;
        if !status.is_success() {
            return Err(anyhow!("http {status} from {url}"));
        }
        Ok(body)
    }
}

impl ArchiveSource for HttpArchiveSource<'_> {
    fn archive_urls(&self, player: &str) -> Result<Vec<String>> {
        let url = format!("{API_BASE}/player/{player}/games/archives");
        let body = self.get_text(&url)?;
        let urls = parse_archive_index_json(&body)?;
        info!(player, archives = urls.len(), "located archives");
        Ok(urls)
    }

    fn fetch_archive(&self, player: &str, url: &str) -> Result<FetchedArchive> {
        let month = ArchiveMonth::from_archive_url(url)
            .ok_or_else(|| anyhow!("archive url has no year/month suffix: {url}"))?;

        if let Some(cached) = self.cache.load(player, &month) {
            debug!(player, url, "archive served from cache");
            return Ok(FetchedArchive {
                games: parse_archive_json(&cached)?,
                from_cache: true,
            });
        }

        let body = self.get_text(url)?;
        let games = parse_archive_json(&body)?;
        // Persist before returning so a crash after a successful fetch
        // does not force a re-fetch on the next run. An unwritable cache
        // only costs a re-download later.
        if let Err(err) = self.cache.save(player, &month, &body) {
            warn!(url, %err, "failed to cache archive payload");
        }
        Ok(FetchedArchive {
            games,
            from_cache: false,
        })
    }
}

pub fn parse_archive_index_json(raw: &str) -> Result<Vec<String>> {
    let index =
        serde_json::from_str::<RawArchiveIndex>(raw.trim()).context("invalid archive index json")?;
    Ok(index.archives)
}

pub fn parse_archive_json(raw: &str) -> Result<Vec<RawGame>> {
    let archive =
        serde_json::from_str::<RawArchive>(raw.trim()).context("invalid archive json")?;
    Ok(archive.games)
}
