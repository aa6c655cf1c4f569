pub mod byte_size;
pub mod config;
pub mod context;
pub mod credential;
pub mod logging;
