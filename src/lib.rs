pub mod commands;
pub mod error;
pub mod http;
pub mod install;
pub mod lock;
pub mod manifest;
pub mod registry;
pub mod resolver;
pub mod runtime;
pub mod version;

pub use error::Error;
