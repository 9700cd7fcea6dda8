pub mod config;
pub mod datasets;
pub mod fetch;
pub mod grouper;
pub mod loader;
pub mod output;
