mod mock_stages;

pub use mock_stages::{build_query, MockStage};
