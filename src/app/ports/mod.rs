pub mod connection_registry;
pub mod database;
pub mod reporter;
pub mod result_store;

pub use connection_registry::{ConnectionRegistry, RegistryError};
pub use database::{DatabaseSession, DbError, SessionFactory, SqlExecutor};
pub use reporter::Reporter;
pub use result_store::{RETURN_VALUE_KEY, ResultStore, ResultStoreError};
