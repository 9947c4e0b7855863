//! Transport layer for the streamed session
//!
//! Two channels share one session: [`http::CommandTransport`] posts commands,
//! and [`stream::StreamManager`] keeps the server-sent event stream open and
//! dispatches what arrives on it.

pub mod http;
pub mod sse;
pub mod stream;

pub use http::{COMMAND_PATH, CommandResponse, CommandTransport, SESSION_ID_HEADER};
pub use sse::{ParsedFrame, SseDecoder, SseFrame, StreamEvent};
pub use stream::{
    EventDispatcher, ReconnectPolicy, STREAM_PATH, StreamHandle, StreamManager, StreamStats,
};

use url::Url;

use crate::core::error::{McpError, McpResult};

/// Append `path` to `base`, keeping any path prefix and query the base
/// already has
pub(crate) fn endpoint_url(base: &Url, path: &str) -> McpResult<Url> {
    let mut url = base.clone();
    url.path_segments_mut()
        .map_err(|_| McpError::validation(format!("base URL {base} cannot carry a path")))?
        .pop_if_empty()
        .extend(path.split('/').filter(|segment| !segment.is_empty()));
    Ok(url)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_endpoint_url_keeps_prefix() {
        let base = Url::parse("https://mcp.example.com/api/").unwrap();
        assert_eq!(
            endpoint_url(&base, COMMAND_PATH).unwrap().as_str(),
            "https://mcp.example.com/api/mcp/command"
        );

        let base = Url::parse("http://localhost:7071").unwrap();
        assert_eq!(
            endpoint_url(&base, STREAM_PATH).unwrap().as_str(),
            "http://localhost:7071/mcp/stream"
        );
    }

    #[test]
    fn test_endpoint_url_keeps_query() {
        let base = Url::parse("https://func.example.com/api?code=x").unwrap();
        assert_eq!(
            endpoint_url(&base, COMMAND_PATH).unwrap().as_str(),
            "https://func.example.com/api/mcp/command?code=x"
        );
        assert_eq!(
            endpoint_url(&base, STREAM_PATH).unwrap().as_str(),
            "https://func.example.com/api/mcp/stream?code=x"
        );
    }

    #[test]
    fn test_endpoint_url_rejects_opaque_base() {
        let base = Url::parse("mailto:ops@example.com").unwrap();
        assert!(matches!(endpoint_url(&base, COMMAND_PATH), Err(McpError::Validation(_))));
    }
}
