pub mod catalog;
pub mod config;
pub mod http;
pub mod mcp_server;
pub mod search;
