pub mod connection_uri;
pub mod dirs;
pub mod registry_file;
