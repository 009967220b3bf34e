use chrono::NaiveDate;
use rusqlite::Connection;

use chess_archive::normalize::{GameRecord, PlayerRecord};
use chess_archive::store::{
    ensure_date_time_column, existing_game_ids, init_schema, load_batch,
};

fn open_test_db() -> Connection {
    let conn = Connection::open_in_memory().expect("in-memory db should open");
    init_schema(&conn).expect("schema should apply");
    conn
}

fn game(id: &str) -> GameRecord {
    GameRecord {
        game_id: id.to_string(),
        white_player_id: "alice".to_string(),
        black_player_id: "bob".to_string(),
        white_rating: 1500,
        black_rating: 1400,
        time_class: "rapid".to_string(),
        time_control: "600".to_string(),
        rules: "chess".to_string(),
        pgn: "1. e4 e5".to_string(),
        start_time: Some("2022-01-01 10:00:00".to_string()),
        winner: Some("alice".to_string()),
        date_time: NaiveDate::from_ymd_opt(2022, 1, 1).unwrap(),
    }
}

fn player(id: &str, rating: i64) -> PlayerRecord {
    PlayerRecord {
        player_id: id.to_string(),
        username: id.to_string(),
        rating,
    }
}

#[test]
fn schema_init_is_idempotent() {
    let conn = open_test_db();
    init_schema(&conn).expect("second init should not fail");
}

#[test]
fn migration_adds_date_time_to_legacy_table() {
    let conn = Connection::open_in_memory().unwrap();
    conn.execute_batch(
        r#"
        CREATE TABLE games (
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
            winner TEXT NULL
        );
        "#,
    )
    .unwrap();

    ensure_date_time_column(&conn).expect("migration should add the column");
    conn.execute("UPDATE games SET date_time = '1900-01-01'", [])
        .expect("column should now exist");

    // Running it again must not raise or duplicate the column.
    ensure_date_time_column(&conn).expect("migration should be idempotent");
}

#[test]
fn migration_on_current_schema_is_a_no_op() {
    let conn = open_test_db();
    ensure_date_time_column(&conn).expect("should not fail on current schema");
    ensure_date_time_column(&conn).expect("should not fail when repeated");
}

#[test]
fn load_batch_inserts_and_counts() {
    let mut conn = open_test_db();
    let games = vec![game("g1"), game("g2")];
    let players = vec![player("alice", 1500), player("bob", 1400)];

    let counts = load_batch(&mut conn, &games, &players).expect("batch should load");
    assert_eq!(counts.attempted, 2);
    assert_eq!(counts.inserted, 2);
    assert_eq!(counts.duplicates, 0);
    assert_eq!(counts.failed, 0);

    let ids = existing_game_ids(&conn).unwrap();
    assert!(ids.contains("g1") && ids.contains("g2"));
}

#[test]
fn duplicate_game_id_is_skipped_not_fatal() {
    let mut conn = open_test_db();
    load_batch(&mut conn, &[game("g1")], &[]).unwrap();

    let counts = load_batch(&mut conn, &[game("g1"), game("g3")], &[]).unwrap();
    assert_eq!(counts.attempted, 2);
    assert_eq!(counts.inserted, 1);
    assert_eq!(counts.duplicates, 1);

    let total: i64 = conn
        .query_row("SELECT COUNT(*) FROM games", [], |row| row.get(0))
        .unwrap();
    assert_eq!(total, 2);
}

#[test]
fn player_rating_is_first_sight_snapshot() {
    let mut conn = open_test_db();
    load_batch(&mut conn, &[], &[player("alice", 1500)]).unwrap();
    load_batch(&mut conn, &[], &[player("alice", 1650)]).unwrap();

    let rating: i64 = conn
        .query_row(
            "SELECT rating FROM players WHERE player_id = 'alice'",
            [],
            |row| row.get(0),
        )
        .unwrap();
    assert_eq!(rating, 1500);
}

#[test]
fn winner_null_round_trips() {
    let mut conn = open_test_db();
    let mut drawn = game("g9");
    drawn.winner = None;
    load_batch(&mut conn, &[drawn], &[]).unwrap();

    let winner: Option<String> = conn
        .query_row("SELECT winner FROM games WHERE game_id = 'g9'", [], |row| {
            row.get(0)
        })
        .unwrap();
    assert_eq!(winner, None);
}
