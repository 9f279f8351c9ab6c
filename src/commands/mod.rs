pub mod config;
mod install;

pub use install::{InstallOptions, InstallReport, install, run};
