//! Protocol response wrapping.
//!
//! [`RenderResponse`] is the protocol-neutral shape HTTP, edge-function and
//! CLI adapters translate into their own response types. It is produced by
//! [`Runtime::render_to_response`](crate::Runtime::render_to_response), or by
//! [`RenderResponse::from_error`] when a render fails.

use serde::Serialize;

use crate::error::Error;

/// Content type used when none is given.
pub const DEFAULT_CONTENT_TYPE: &str = "text/html; charset=utf-8";

/// Content type of error responses.
pub const TEXT_CONTENT_TYPE: &str = "text/plain; charset=utf-8";

const CONTENT_TYPE: &str = "content-type";

/// Options for [`RenderResponse::new`].
///
/// Header names are compared case-insensitively. An explicit
/// [`content_type`](Self::content_type) always wins over a `Content-Type`
/// entry in [`headers`](Self::headers).
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ResponseOptions {
    pub status: Option<u16>,
    pub content_type: Option<String>,
    pub headers: Vec<(String, String)>,
}

impl ResponseOptions {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn status(mut self, status: u16) -> Self {
        self.status = Some(status);
        self
    }

    pub fn content_type(mut self, content_type: impl Into<String>) -> Self {
        self.content_type = Some(content_type.into());
        self
    }

    pub fn header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.push((name.into(), value.into()));
        self
    }
}

/// A rendered body plus status and headers.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RenderResponse {
    pub status: u16,
    pub headers: Vec<(String, String)>,
    pub body: String,
}

impl RenderResponse {
    /// Wraps `body` using `options`.
    ///
    /// Defaults: status 200, `text/html; charset=utf-8`. The content type is,
    /// in order of preference, `options.content_type`, a `Content-Type` entry
    /// in `options.headers`, the default. Later headers with the same name
    /// replace earlier ones.
    pub fn new(body: impl Into<String>, options: ResponseOptions) -> Self {
        let ResponseOptions {
            status,
            content_type,
            headers,
        } = options;

        let mut response = Self {
            status: status.unwrap_or(200),
            headers: vec![(CONTENT_TYPE.to_string(), DEFAULT_CONTENT_TYPE.to_string())],
            body: body.into(),
        };
        for (name, value) in headers {
            response.set_header(name, value);
        }
        if let Some(content_type) = content_type {
            response.set_header(CONTENT_TYPE, content_type);
        }
        response
    }

    /// The response an adapter sends when a render fails: 404 for unknown
    /// components or services, 500 otherwise, with the error message as a
    /// plain-text body.
    pub fn from_error(err: &Error) -> Self {
        Self::new(
            err.to_string(),
            ResponseOptions::new()
                .status(err.status_code())
                .content_type(TEXT_CONTENT_TYPE),
        )
    }

    /// Looks up a header, ignoring case.
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers
            .iter()
            .find(|(n, _)| n.eq_ignore_ascii_case(name))
            .map(|(_, v)| v.as_str())
    }

    pub fn content_type(&self) -> Option<&str> {
        self.header(CONTENT_TYPE)
    }

    /// Sets a header, replacing any existing header with the same name.
    pub fn set_header(&mut self, name: impl Into<String>, value: impl Into<String>) {
        let name = name.into();
        let value = value.into();
        match self
            .headers
            .iter_mut()
            .find(|(n, _)| n.eq_ignore_ascii_case(&name))
        {
            Some(existing) => existing.1 = value,
            None => self.headers.push((name, value)),
        }
    }

    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status)
    }
}
