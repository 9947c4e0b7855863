//! MCP protocol implementation
//!
//! JSON-RPC message types exchanged on the command channel and the event
//! stream, plus the method and event names.

pub mod methods;
pub mod types;

// Re-export commonly used types and constants
pub use types::*;

pub use methods::{
    EVENT_CONNECTED, EVENT_ERROR, EVENT_HEARTBEAT, EVENT_MESSAGE, INITIALIZE, PROMPTS_GET,
    PROMPTS_LIST, RESOURCES_LIST, RESOURCES_READ, SHUTDOWN, TOOLS_CALL, TOOLS_LIST,
};
