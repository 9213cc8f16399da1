pub mod client;
pub mod framing;
pub mod hub;
pub mod protocol;
pub mod tls;
pub mod transport;
