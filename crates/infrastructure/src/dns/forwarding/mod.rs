pub mod forward_stage;
pub mod forwarder;
pub mod message_builder;
pub mod response_parser;

pub use forward_stage::ForwardStage;
pub use forwarder::{ExchangeResult, Forwarder};
pub use message_builder::{EdnsPolicy, MessageBuilder};
pub use response_parser::ResponseParser;
