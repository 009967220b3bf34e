use std::collections::HashMap;

use anyhow::Result;
use rusqlite::Connection;
use tracing::{error, info, warn};

use crate::chesscom::ArchiveSource;
use crate::normalize::{Normalized, NormalizedGame, normalize_game};
use crate::store;

/// Aggregate outcome of one ingestion run for one player.
#[derive(Debug, Clone, Default)]
pub struct IngestReport {
    pub player: String,
    pub archives_total: usize,
    pub archives_processed: usize,
    pub archives_failed: usize,
    pub games_seen: usize,
    pub games_inserted: usize,
    pub games_skipped_duplicate: usize,
    pub games_skipped_no_pgn: usize,
    pub games_skipped_malformed: usize,
    pub games_failed: usize,
    pub errors: Vec<String>,
}

impl IngestReport {
    pub fn games_skipped(&self) -> usize {
        self.games_skipped_duplicate + self.games_skipped_no_pgn + self.games_skipped_malformed
    }
}

/// Runs the full pipeline for one player: locate archives, fetch each
/// in chronological order, normalize, and load, one batch per archive.
///
/// Per-archive and per-record failures are absorbed and counted; the
/// run only errors when the store itself is unusable.
pub fn ingest_player(
    source: &impl ArchiveSource,
    conn: &mut Connection,
    player: &str,
) -> Result<IngestReport> {
    let player = player.trim().to_lowercase();
    info!(%player, "starting ingestion");

    store::ensure_date_time_column(conn)?;
    let mut existing_ids = store::existing_game_ids(conn)?;
    info!(known_games = existing_ids.len(), "loaded existing game ids");

    let mut report = IngestReport {
        player: player.clone(),
        ..IngestReport::default()
    };

    let urls = match source.archive_urls(&player) {
        Ok(urls) => urls,
        Err(err) => {
            error!(%player, %err, "failed to locate archives");
            report.errors.push(format!("locate archives: {err}"));
            Vec::new()
        }
    };
    report.archives_total = urls.len();
    if urls.is_empty() {
        info!(%player, "no archives located, nothing to ingest");
        return Ok(report);
    }

    for url in &urls {
        let fetched = match source.fetch_archive(&player, url) {
            Ok(fetched) => fetched,
            Err(err) => {
                error!(url, %err, "failed to fetch archive, skipping");
                report.archives_failed += 1;
                report.errors.push(format!("{url}: {err}"));
                continue;
            }
        };

        let mut games = Vec::new();
        // First sighting of each handle in the batch wins.
        let mut players_seen = HashMap::new();
        for raw in &fetched.games {
            report.games_seen += 1;
            match normalize_game(raw, &existing_ids) {
                Normalized::Game(normalized) => {
                    let NormalizedGame { record, players } = *normalized;
                    // Claim the id now so overlapping archives in the
                    // same run cannot propose it twice.
                    existing_ids.insert(record.game_id.clone());
                    for player_row in players {
                        players_seen
                            .entry(player_row.player_id.clone())
                            .or_insert(player_row);
                    }
                    games.push(record);
                }
                Normalized::SkipDuplicate => report.games_skipped_duplicate += 1,
                Normalized::SkipNoPgn => {
                    warn!(url, "game without pgn, skipping");
                    report.games_skipped_no_pgn += 1;
                }
                Normalized::SkipMalformed(field) => {
                    warn!(url, field, "malformed game payload, skipping");
                    report.games_skipped_malformed += 1;
                }
            }
        }

        let players = players_seen.into_values().collect::<Vec<_>>();
        let counts = store::load_batch(conn, &games, &players)?;
        report.games_inserted += counts.inserted;
        report.games_skipped_duplicate += counts.duplicates;
        report.games_failed += counts.failed;
        report.archives_processed += 1;
        info!(
            url,
            from_cache = fetched.from_cache,
            inserted = counts.inserted,
            "archive loaded"
        );
    }

    info!(
        player = %report.player,
        archives = report.archives_processed,
        inserted = report.games_inserted,
        skipped = report.games_skipped(),
        failed = report.games_failed,
        "ingestion complete"
    );
    Ok(report)
}
