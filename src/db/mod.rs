pub mod preferences;

pub use preferences::SqliteSessionStore;
