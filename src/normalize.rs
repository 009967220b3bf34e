use std::collections::HashSet;

use chrono::{DateTime, NaiveDate};
use once_cell::sync::Lazy;
use regex::Regex;
use tracing::warn;

use crate::chesscom::RawGame;

/// Placeholder stored when no reliable played-date can be extracted
/// from the PGN. Downstream consumers must treat it as "unknown", never
/// as a real date.
pub const SENTINEL_DATE_STR: &str = "1900-01-01";

/// Rating recorded when the provider omits one. A stored `0` therefore
/// means "unknown", not a real rating.
pub const MISSING_RATING: i64 = 0;

/// Provider token marking the winning side's result field.
const WIN_RESULT: &str = "win";

static DATE_TAG: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r#"(?i)\[Date\s+"(\d{4}\.\d{1,2}\.\d{1,2})""#).expect("date tag pattern is valid")
});

pub fn sentinel_date() -> NaiveDate {
    NaiveDate::from_ymd_opt(1900, 1, 1).expect("sentinel date is valid")
}

/// Canonical game row, fully typed and validated once at the ingestion
/// boundary.
#[derive(Debug, Clone, PartialEq)]
pub struct GameRecord {
    pub game_id: String,
    pub white_player_id: String,
    pub black_player_id: String,
    pub white_rating: i64,
    pub black_rating: i64,
    pub time_class: String,
    pub time_control: String,
    pub rules: String,
    pub pgn: String,
    /// Wall-clock end of game formatted `YYYY-MM-DD HH:MM:SS`, absent
    /// when the provider gave no epoch value.
    pub start_time: Option<String>,
    /// Identifier of the winning player; `None` covers draws and every
    /// other outcome where neither side reports a win.
    pub winner: Option<String>,
    pub date_time: NaiveDate,
}

/// Player snapshot observed while normalizing a game. Ratings here are
/// taken at first sight and not kept current.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct PlayerRecord {
    pub player_id: String,
    pub username: String,
    pub rating: i64,
}

/// A fully normalized game plus the player snapshots observed on both
/// sides of it.
#[derive(Debug, Clone)]
pub struct NormalizedGame {
    pub record: GameRecord,
    pub players: [PlayerRecord; 2],
}

/// Outcome of normalizing one raw payload. Skips are expected flow, not
/// errors; a malformed record never aborts its archive.
#[derive(Debug, Clone)]
pub enum Normalized {
    Game(Box<NormalizedGame>),
    /// No embedded transcript; the record carries no reliable date or
    /// move data and is excluded entirely.
    SkipNoPgn,
    /// `game_id` already persisted in a previous run or archive.
    SkipDuplicate,
    /// A structurally required field is missing.
    SkipMalformed(&'static str),
}

pub fn normalize_game(raw: &RawGame, existing_ids: &HashSet<String>) -> Normalized {
    let Some(pgn) = raw.pgn.as_deref() else {
        return Normalized::SkipNoPgn;
    };

    let Some(game_id) = derive_game_id(raw) else {
        return Normalized::SkipMalformed("uuid/url");
    };
    if existing_ids.contains(&game_id) {
        return Normalized::SkipDuplicate;
    }

    let Some(white) = raw.white.as_ref() else {
        return Normalized::SkipMalformed("white");
    };
    let Some(black) = raw.black.as_ref() else {
        return Normalized::SkipMalformed("black");
    };
    let Some(white_name) = white.username.as_deref() else {
        return Normalized::SkipMalformed("white.username");
    };
    let Some(black_name) = black.username.as_deref() else {
        return Normalized::SkipMalformed("black.username");
    };
    let Some(time_class) = raw.time_class.as_deref() else {
        return Normalized::SkipMalformed("time_class");
    };
    let Some(time_control) = raw.time_control.as_deref() else {
        return Normalized::SkipMalformed("time_control");
    };
    let Some(rules) = raw.rules.as_deref() else {
        return Normalized::SkipMalformed("rules");
    };

    // Player ids are canonical lowercase handles; the display-cased
    // username only lives on the player row.
    let white_id = white_name.to_lowercase();
    let black_id = black_name.to_lowercase();
    let white_rating = white.rating.unwrap_or(MISSING_RATING);
    let black_rating = black.rating.unwrap_or(MISSING_RATING);

    let winner = derive_winner(
        white.result.as_deref(),
        black.result.as_deref(),
        &white_id,
        &black_id,
    );

    let start_time = raw.end_time.and_then(format_epoch_seconds);

    let record = GameRecord {
        game_id,
        white_player_id: white_id.clone(),
        black_player_id: black_id.clone(),
        white_rating,
        black_rating,
        time_class: time_class.to_string(),
        time_control: time_control.to_string(),
        rules: rules.to_string(),
        pgn: pgn.to_string(),
        start_time,
        winner,
        date_time: extract_date_from_pgn(pgn),
    };
    let players = [
        PlayerRecord {
            player_id: white_id,
            username: white_name.to_string(),
            rating: white_rating,
        },
        PlayerRecord {
            player_id: black_id,
            username: black_name.to_string(),
            rating: black_rating,
        },
    ];

    Normalized::Game(Box::new(NormalizedGame { record, players }))
}

/// Prefers the provider-issued uuid, falling back to the trailing path
/// segment of the game's canonical URL.
pub fn derive_game_id(raw: &RawGame) -> Option<String> {
    if let Some(uuid) = raw.uuid.as_deref()
        && !uuid.trim().is_empty()
    {
        return Some(uuid.trim().to_string());
    }
    let url = raw.url.as_deref()?;
    let tail = url.trim_end_matches('/').rsplit('/').next()?;
    if tail.is_empty() {
        return None;
    }
    Some(tail.to_string())
}

/// The winner is whichever side's result equals the provider's "win"
/// token. Neither side winning (draw, abandonment, timeout vocabulary)
/// collapses to `None`; the provider data cannot tell those apart.
fn derive_winner(
    white_result: Option<&str>,
    black_result: Option<&str>,
    white_id: &str,
    black_id: &str,
) -> Option<String> {
    if white_result == Some(WIN_RESULT) {
        Some(white_id.to_string())
    } else if black_result == Some(WIN_RESULT) {
        Some(black_id.to_string())
    } else {
        None
    }
}

/// Extracts the calendar date from the PGN's `[Date "YYYY.M.D"]` tag.
/// Absent or unparseable dates fall back to the sentinel; date quality
/// is secondary to completeness of the games table.
pub fn extract_date_from_pgn(pgn: &str) -> NaiveDate {
    let Some(caps) = DATE_TAG.captures(pgn) else {
        return sentinel_date();
    };
    let raw = &caps[1];
    match NaiveDate::parse_from_str(raw, "%Y.%m.%d") {
        Ok(date) => date,
        Err(err) => {
            warn!(date = raw, %err, "invalid Date tag in pgn, using sentinel");
            sentinel_date()
        }
    }
}

fn format_epoch_seconds(epoch: i64) -> Option<String> {
    let ts = DateTime::from_timestamp(epoch, 0)?;
    Some(ts.format("%Y-%m-%d %H:%M:%S").to_string())
}
