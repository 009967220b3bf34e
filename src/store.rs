use std::collections::HashSet;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use rusqlite::{Connection, params};
use tracing::{info, warn};

use crate::normalize::{GameRecord, PlayerRecord};

pub fn default_db_path() -> Option<PathBuf> {
    crate::archive_cache::ArchiveCache::default_root().map(|dir| dir.join("chess_games.sqlite"))
}

/// Opens (creating if needed) the game store and applies the schema.
/// Failure here is the one fatal condition of an ingestion run.
pub fn open_db(path: &Path) -> Result<Connection> {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent).ok();
    }
    let conn =
        Connection::open(path).with_context(|| format!("open sqlite db {}", path.display()))?;
    init_schema(&conn)?;
    Ok(conn)
}

pub fn init_schema(conn: &Connection) -> Result<()> {
    conn.execute_batch(
        r#"
        PRAGMA journal_mode = WAL;
        CREATE TABLE IF NOT EXISTS players (
            player_id TEXT PRIMARY KEY,
            username TEXT NOT NULL,
            rating INTEGER NOT NULL
        );
        CREATE TABLE IF NOT EXISTS games (
            game_id TEXT PRIMARY KEY,
            white_player_id TEXT NOT NULL,
            black_player_id TEXT NOT NULL,
            white_rating INTEGER NOT NULL,
            black_rating INTEGER NOT NULL,
            time_class TEXT NOT NULL,
            time_control TEXT NOT NULL,
            rules TEXT NOT NULL,
            pgn TEXT NOT NULL,
            start_time TEXT NULL,
            winner TEXT NULL,
            date_time TEXT NULL
        );
        CREATE INDEX IF NOT EXISTS idx_games_white ON games(white_player_id);
        CREATE INDEX IF NOT EXISTS idx_games_black ON games(black_player_id);
        CREATE INDEX IF NOT EXISTS idx_games_date_time ON games(date_time);
        "#,
    )
    .context("create sqlite schema")?;
    Ok(())
}

/// Adds the derived `date_time` column to a `games` table created
/// before it existed. Safe to call on every run.
pub fn ensure_date_time_column(conn: &Connection) -> Result<()> {
    let mut stmt = conn
        .prepare("PRAGMA table_info(games)")
        .context("inspect games table")?;
    let mut has_column = false;
    let mut rows = stmt.query([]).context("query games table info")?;
    while let Some(row) = rows.next().context("read games table info")? {
        let name: String = row.get(1).context("decode column name")?;
        if name == "date_time" {
            has_column = true;
            break;
        }
    }
    if !has_column {
        conn.execute("ALTER TABLE games ADD COLUMN date_time TEXT NULL", [])
            .context("add date_time column")?;
        info!("added date_time column to games table");
    }
    Ok(())
}

/// Loads the full set of persisted game ids. Done once per ingestion
/// run; later normalization consults the in-memory set.
pub fn existing_game_ids(conn: &Connection) -> Result<HashSet<String>> {
    let mut stmt = conn
        .prepare("SELECT game_id FROM games")
        .context("prepare existing ids query")?;
    let rows = stmt
        .query_map([], |row| row.get::<_, String>(0))
        .context("query existing ids")?;
    let mut ids = HashSet::new();
    for row in rows {
        ids.insert(row.context("decode game id")?);
    }
    Ok(ids)
}

/// Counts reported by one batch load.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct LoadCounts {
    pub attempted: usize,
    pub inserted: usize,
    pub duplicates: usize,
    pub failed: usize,
}

/// Writes one batch of novel games and the player snapshots observed
/// with them, inside a single transaction. Rows violating uniqueness
/// are skipped and logged; the remainder of the batch still commits.
pub fn load_batch(
    conn: &mut Connection,
    games: &[GameRecord],
    players: &[PlayerRecord],
) -> Result<LoadCounts> {
    let tx = conn.transaction().context("begin load transaction")?;

    // Ratings here are a snapshot taken at first sight, by design.
    for player in players {
        let res = tx.execute(
            "INSERT OR IGNORE INTO players (player_id, username, rating) VALUES (?1, ?2, ?3)",
            params![player.player_id, player.username, player.rating],
        );
        if let Err(err) = res {
            warn!(player = %player.player_id, %err, "failed to insert player row");
        }
    }

    let mut counts = LoadCounts::default();
    for game in games {
        counts.attempted += 1;
        let res = tx.execute(
            r#"
            INSERT OR IGNORE INTO games (
                game_id, white_player_id, black_player_id,
                white_rating, black_rating,
                time_class, time_control, rules, pgn,
                start_time, winner, date_time
            ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12)
            "#,
            params![
                game.game_id,
                game.white_player_id,
                game.black_player_id,
                game.white_rating,
                game.black_rating,
                game.time_class,
                game.time_control,
                game.rules,
                game.pgn,
                game.start_time,
                game.winner,
                game.date_time.format("%Y-%m-%d").to_string(),
            ],
        );
        match res {
            Ok(0) => {
                // Lost the race to a concurrent run; the store's
                // uniqueness constraint is authoritative.
                warn!(game_id = %game.game_id, "duplicate game id at load time, skipping");
                counts.duplicates += 1;
            }
            Ok(_) => counts.inserted += 1,
            Err(err) => {
                warn!(game_id = %game.game_id, %err, "failed to insert game row");
                counts.failed += 1;
            }
        }
    }

    tx.commit().context("commit load transaction")?;
    Ok(counts)
}
