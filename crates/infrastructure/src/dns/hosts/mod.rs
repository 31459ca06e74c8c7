pub mod hosts_file;
pub mod stage;

pub use hosts_file::{HostsFile, HostsMap};
pub use stage::HostsStage;
