//! JSON-RPC stdio server exposing the Anvil workspace as MCP tools.
//!
//! One JSON object per line on stdin/stdout; logging goes to stderr so the
//! protocol stream stays clean. Tool calls stamp an activity clock and an
//! idle supervisor shuts the server down after a configurable quiet period.

pub mod protocol;
pub mod server;
pub mod tools;

pub use server::Server;
