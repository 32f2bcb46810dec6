pub mod manager;
pub mod postgres;
pub mod store;

pub use manager::DatabaseError;
pub use postgres::PgStore;
pub use store::Store;
