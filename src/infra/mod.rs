pub use pgprobe_app as app;
pub use pgprobe_domain as domain;

pub mod adapters;
pub mod config;
