pub use pgprobe_app as app;
pub use pgprobe_domain as domain;
pub use pgprobe_infra as infra;

pub mod cli;
pub mod error;
pub mod report;
