pub mod config;
pub mod fetch;
pub mod http;
pub mod merge;
pub mod model;
pub mod overrides;
pub mod sheets;
