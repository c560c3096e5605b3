pub mod config;
pub mod module;
pub mod modules;
pub mod supervisor;
pub mod utils;
