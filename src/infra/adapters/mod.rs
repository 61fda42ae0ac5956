pub mod json_result_store;
pub mod psql;
pub mod toml_registry;
pub mod writer_reporter;

pub use json_result_store::JsonResultStore;
pub use psql::{PsqlConfig, PsqlExecutor, PsqlSession, PsqlSessionFactory};
pub use toml_registry::TomlConnectionRegistry;
pub use writer_reporter::WriterReporter;
