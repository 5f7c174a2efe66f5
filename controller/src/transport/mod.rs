pub mod memory;
pub mod tcp;
pub mod traits;

pub use tcp::{TcpConnector, TcpTransportStream};
pub use traits::{TransportConnector, TransportStream};
