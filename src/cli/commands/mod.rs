//! CLI command implementations

pub mod cache;
pub mod config;
pub mod probe;
pub mod serve;
pub mod status;

pub use cache::execute as cache;
pub use config::execute as config;
pub use probe::execute as probe;
pub use serve::execute as serve;
pub use status::execute as status;
