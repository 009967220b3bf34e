use std::path::PathBuf;
use std::time::Duration;

use anyhow::{Context, Result, anyhow};
use tracing_subscriber::EnvFilter;

use chess_archive::archive_cache::ArchiveCache;
use chess_archive::chesscom::HttpArchiveSource;
use chess_archive::http_client::build_client;
use chess_archive::{ingest, store};

fn main() -> Result<()> {
    dotenvy::dotenv().ok();
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let player = parse_player_arg()
        .or_else(|| std::env::var("CHESS_ARCHIVE_PLAYER").ok())
        .ok_or_else(|| anyhow!("usage: chess_archive <username> [--db PATH] [--cache-dir PATH]"))?;

    let db_path = parse_path_arg("--db")
        .or_else(|| std::env::var("CHESS_ARCHIVE_DB").ok().map(PathBuf::from))
        .or_else(store::default_db_path)
        .context("unable to resolve sqlite path")?;
    let cache_root = parse_path_arg("--cache-dir")
        .or_else(|| {
            std::env::var("CHESS_ARCHIVE_CACHE_DIR")
                .ok()
                .map(PathBuf::from)
        })
        .or_else(ArchiveCache::default_root)
        .context("unable to resolve cache directory")?;

    // Store unreachable is the only fatal condition of a run.
    let mut conn = store::open_db(&db_path)?;

    let client = build_client()?;
    let mut source = HttpArchiveSource::new(&client, ArchiveCache::new(cache_root));
    if let Some(millis) = std::env::var("CHESS_ARCHIVE_MIN_INTERVAL_MS")
        .ok()
        .and_then(|raw| raw.trim().parse::<u64>().ok())
    {
        source = source.with_min_interval(Duration::from_millis(millis.max(1000)));
    }

    let report = ingest::ingest_player(&source, &mut conn, &player)?;

    println!("Ingestion complete for {}", report.player);
    println!("DB: {}", db_path.display());
    println!(
        "Archives: {}/{} processed, {} failed",
        report.archives_processed, report.archives_total, report.archives_failed
    );
    println!(
        "Games: {} seen, {} inserted, {} skipped ({} duplicate, {} no pgn, {} malformed), {} failed",
        report.games_seen,
        report.games_inserted,
        report.games_skipped(),
        report.games_skipped_duplicate,
        report.games_skipped_no_pgn,
        report.games_skipped_malformed,
        report.games_failed
    );
    if report.archives_total == 0 {
        println!("Nothing to do: no archives located for {}", report.player);
    }
    if !report.errors.is_empty() {
        println!("Errors: {}", report.errors.len());
        for err in report.errors.iter().take(6) {
            println!(" - {err}");
        }
    }

    Ok(())
}

fn parse_player_arg() -> Option<String> {
    let args = std::env::args().skip(1).collect::<Vec<_>>();
    let mut skip_next = false;
    for arg in &args {
        if skip_next {
            skip_next = false;
            continue;
        }
        if arg == "--db" || arg == "--cache-dir" {
            skip_next = true;
            continue;
        }
        if arg.starts_with("--") {
            continue;
        }
        let trimmed = arg.trim();
        if !trimmed.is_empty() {
            return Some(trimmed.to_string());
        }
    }
    None
}

fn parse_path_arg(flag: &str) -> Option<PathBuf> {
    let args = std::env::args().skip(1).collect::<Vec<_>>();
    let prefix = format!("{flag}=");
    for (idx, arg) in args.iter().enumerate() {
        if let Some(path) = arg.strip_prefix(&prefix) {
            let trimmed = path.trim();
            if !trimmed.is_empty() {
                return Some(PathBuf::from(trimmed));
            }
        }
        if arg == flag
            && let Some(next) = args.get(idx + 1)
            && !next.trim().is_empty()
        {
            return Some(PathBuf::from(next));
        }
    }
    None
}
