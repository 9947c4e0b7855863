// ! MCP Protocol Method Constants
// !
// ! Module contains the method names sent over the command channel and the
// ! event names emitted on the session stream.

// Core protocol methods
pub const INITIALIZE: &str = "initialize";
pub const SHUTDOWN: &str = "shutdown";

// Tool-related methods
pub const TOOLS_LIST: &str = "tools/list";
pub const TOOLS_CALL: &str = "tools/call";

// Resource-related methods
pub const RESOURCES_LIST: &str = "resources/list";
pub const RESOURCES_READ: &str = "resources/read";

// Prompt-related methods
pub const PROMPTS_LIST: &str = "prompts/list";
pub const PROMPTS_GET: &str = "prompts/get";

// Stream event names
pub const EVENT_CONNECTED: &str = "connected";
pub const EVENT_MESSAGE: &str = "message";
pub const EVENT_HEARTBEAT: &str = "heartbeat";
pub const EVENT_ERROR: &str = "error";
