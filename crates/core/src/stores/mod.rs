pub mod sqlite;

pub use sqlite::SqliteChunkIndex;
