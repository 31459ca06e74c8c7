pub mod builders;
pub mod dns_server_mock;
pub mod tls_mock;

pub use builders::*;
pub use dns_server_mock::{encode, reply, MockBehavior, MockUpstream, SeenOver, MOCK_NSID};
pub use tls_mock::MockTlsUpstream;
