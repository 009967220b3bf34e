pub mod archive_cache;
pub mod chesscom;
pub mod http_client;
pub mod ingest;
pub mod normalize;
pub mod store;
