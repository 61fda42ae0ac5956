pub use pgprobe_domain as domain;

pub mod connection_error;
pub mod dag;
pub mod error;
pub mod pipeline;
pub mod ports;
pub mod runner;
pub mod tasks;

#[cfg(any(test, feature = "test-support"))]
pub mod test_support;
