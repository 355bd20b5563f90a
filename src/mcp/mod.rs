/// Router Core Module
///
/// This module contains the request router and its surroundings:
/// - registry.rs / schema.rs: tool definitions and argument validation
/// - executor.rs: validated tool invocation
/// - dispatcher.rs: `{method, params}` envelope routing
/// - server.rs: HTTP and STDIO transports
/// - config.rs / error.rs: configuration and error types

pub mod config;
pub mod dispatcher;
pub mod error;
pub mod executor;
pub mod registry;
pub mod schema;
pub mod server;
