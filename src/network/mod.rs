pub mod api;
pub mod frame;
pub mod transport;

pub use api::{ApiError, HttpMessageApi, MessageApi};
pub use transport::{ConnectionState, Socket, SocketConfig};
