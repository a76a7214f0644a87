//! Response shapes written back to the client.

use serde::Serialize;
use serde_json::Value as JsonValue;

#[derive(Clone, Debug, Serialize)]
#[serde(tag = "status")]
pub enum Response {
    #[serde(rename = "success")]
    Ack {
        message: String,
        #[serde(skip_serializing_if = "Option::is_none")]
        affected_rows: Option<u64>,
    },
    #[serde(rename = "success")]
    Rows { results: Vec<JsonValue>, count: usize },
    #[serde(rename = "error")]
    Err { message: String },
}

impl Response {
    pub fn ack(message: impl Into<String>) -> Self {
        Response::Ack {
            message: message.into(),
            affected_rows: None,
        }
    }

    pub fn affected(message: impl Into<String>, affected_rows: u64) -> Self {
        Response::Ack {
            message: message.into(),
            affected_rows: Some(affected_rows),
        }
    }

    pub fn rows(results: Vec<JsonValue>) -> Self {
        let count = results.len();
        Response::Rows { results, count }
    }

    pub fn error(message: impl Into<String>) -> Self {
        Response::Err { message: message.into() }
    }

    /// Renders the response as one newline-terminated JSON line.
    pub fn to_frame(&self) -> String {
        let mut s = serde_json::to_string(self).unwrap_or_else(|_| {
            r#"{"status":"error","message":"failed to encode response"}"#.to_string()
        });
        s.push('\n');
        s
    }
}

/// The outcome of executing one statement: the response to send, and
/// whether the connection should close afterward (the `meta exit`
/// command).
pub struct Outcome {
    pub response: Response,
    pub close: bool,
}

impl Outcome {
    pub fn reply(response: Response) -> Self {
        Self { response, close: false }
    }

    pub fn reply_and_close(response: Response) -> Self {
        Self { response, close: true }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ack_serializes_without_affected_rows_when_absent() {
        let line = Response::ack("ok").to_frame();
        assert_eq!(line, "{\"status\":\"success\",\"message\":\"ok\"}\n");
    }

    #[test]
    fn affected_includes_count() {
        let line = Response::affected("inserted", 1).to_frame();
        assert_eq!(line, "{\"status\":\"success\",\"message\":\"inserted\",\"affected_rows\":1}\n");
    }

    #[test]
    fn error_uses_error_status() {
        let line = Response::error("boom").to_frame();
        assert_eq!(line, "{\"status\":\"error\",\"message\":\"boom\"}\n");
    }
}
