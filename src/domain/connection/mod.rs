mod id;
mod profile;
mod ssl_mode;

pub use id::{ConnectionId, ConnectionIdError};
pub use profile::{ConnectionProfile, DEFAULT_PORT};
pub use ssl_mode::{SslMode, UnknownSslMode};
