pub mod http_transport;
pub mod local_transport;

pub use http_transport::HttpEnhancementTransport;
pub use local_transport::LocalEnhancementTransport;
