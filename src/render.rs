//! Page responses.
//!
//! Templates live with the front end; the server answers with the template
//! name, the context it would be rendered with and any pending messages.

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::Serialize;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Level {
    Success,
    Error,
}

/// One-shot notification shown with the next rendered page.
#[derive(Debug, Clone, Serialize)]
pub struct Message {
    pub level: Level,
    pub text: String,
}

#[derive(Debug, Serialize)]
pub struct Page {
    #[serde(skip)]
    status: StatusCode,
    template: &'static str,
    context: serde_json::Value,
    messages: Vec<Message>,
}

impl Page {
    pub fn new(template: &'static str, context: serde_json::Value) -> Self {
        Self {
            status: StatusCode::OK,
            template,
            context,
            messages: Vec::new(),
        }
    }

    pub fn with_status(mut self, status: StatusCode) -> Self {
        self.status = status;
        self
    }

    pub fn success(&mut self, text: impl Into<String>) {
        self.push(Level::Success, text);
    }

    pub fn error(&mut self, text: impl Into<String>) {
        self.push(Level::Error, text);
    }

    fn push(&mut self, level: Level, text: impl Into<String>) {
        self.messages.push(Message {
            level,
            text: text.into(),
        });
    }
}

impl IntoResponse for Page {
    fn into_response(self) -> Response {
        (self.status, Json(self)).into_response()
    }
}
