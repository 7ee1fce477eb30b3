pub mod connection;
pub mod error;
pub mod mock;
pub mod pool;

pub use connection::{NntpConnector, NntpSession, RealNntpConnector, ServerConfig};
pub use error::NntpError;
pub use pool::FetchPool;
