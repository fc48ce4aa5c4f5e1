// Template rendering pipeline
pub mod directive;
pub mod functions;
pub mod response;
pub mod source;
pub mod template;

// Application layer
pub mod config;
pub mod error;
pub mod server;
