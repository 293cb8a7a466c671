pub mod connection;
pub mod error;
pub mod readiness;

// Re-export the core types to provide a clean public API.
pub use connection::{close, connect};
pub use error::DbError;
pub use readiness::wait_for_database;
