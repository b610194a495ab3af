pub mod app;
pub mod http;
pub mod messages;
pub mod router;
pub mod server;
pub mod subsystems;
pub mod transport;

pub use app::{App, AppDeps, GeneratorFactory};
pub use transport::{GatewayTransport, InboundMessage, Transport, TransportError};
