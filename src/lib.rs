pub mod config;
pub mod errors;
pub mod hooks;
pub mod rotation;
