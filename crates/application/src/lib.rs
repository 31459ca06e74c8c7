//! Ferrous Forward Application Layer
pub mod context;
pub mod ports;
pub mod use_cases;

pub use context::RequestContext;
