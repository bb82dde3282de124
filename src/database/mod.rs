pub mod manager;
pub mod models;
pub mod pagination;

pub use manager::{DatabaseError, DatabaseManager};
