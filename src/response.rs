//! Buffered response writer owned by a [`Context`](crate::Context).
//!
//! Handlers write status, headers and body into the buffer; the app converts
//! it into one `http::Response` once the chain finishes. Writing the body
//! commits the status: later `write_header` calls are ignored.

use std::fmt;

use bytes::{Bytes, BytesMut};
use http::header::{self, HeaderMap, HeaderName, HeaderValue};
use http::StatusCode;
use http_body_util::Full;

/// Content-type values set by the renderers and file writer.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ContentType {
    Json,
    Xml,
    Text,
    Html,
    Css,
    Javascript,
    Csv,
    Svg,
    Png,
    Pdf,
    OctetStream,
}

impl ContentType {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Json => "application/json; charset=utf-8",
            Self::Xml => "application/xml; charset=utf-8",
            Self::Text => "text/plain; charset=utf-8",
            Self::Html => "text/html; charset=utf-8",
            Self::Css => "text/css; charset=utf-8",
            Self::Javascript => "text/javascript; charset=utf-8",
            Self::Csv => "text/csv; charset=utf-8",
            Self::Svg => "image/svg+xml",
            Self::Png => "image/png",
            Self::Pdf => "application/pdf",
            Self::OctetStream => "application/octet-stream",
        }
    }

    /// Guesses the type served by [`Context::write_file`](crate::Context::write_file)
    /// from a file extension.
    pub fn from_extension(ext: &str) -> Self {
        let ext = ext.to_ascii_lowercase();
        match ext.as_str() {
            "json" => Self::Json,
            "xml" => Self::Xml,
            "txt" | "log" => Self::Text,
            "html" | "htm" => Self::Html,
            "css" => Self::Css,
            "js" | "mjs" => Self::Javascript,
            "csv" => Self::Csv,
            "svg" => Self::Svg,
            "png" => Self::Png,
            "pdf" => Self::Pdf,
            _ => Self::OctetStream,
        }
    }
}

// ── SetCookie ─────────────────────────────────────────────────────────────────

/// `SameSite` cookie attribute.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum SameSite {
    Strict,
    Lax,
    None,
}

/// A `Set-Cookie` header value.
///
/// ```rust
/// use torii::SetCookie;
///
/// let cookie = SetCookie::new("sid", "abc").path("/").max_age(3600).http_only(true);
/// assert_eq!(cookie.to_string(), "sid=abc; Path=/; Max-Age=3600; HttpOnly");
/// ```
#[derive(Clone, Debug, Default)]
pub struct SetCookie {
    name: String,
    value: String,
    path: Option<String>,
    domain: Option<String>,
    max_age: Option<i64>,
    secure: bool,
    http_only: bool,
    same_site: Option<SameSite>,
}

impl SetCookie {
    pub fn new(name: impl Into<String>, value: impl Into<String>) -> Self {
        Self { name: name.into(), value: value.into(), ..Self::default() }
    }

    pub fn path(mut self, path: impl Into<String>) -> Self {
        self.path = Some(path.into());
        self
    }

    pub fn domain(mut self, domain: impl Into<String>) -> Self {
        self.domain = Some(domain.into());
        self
    }

    /// Seconds until expiry; a negative value deletes the cookie.
    pub fn max_age(mut self, seconds: i64) -> Self {
        self.max_age = Some(seconds);
        self
    }

    pub fn secure(mut self, secure: bool) -> Self {
        self.secure = secure;
        self
    }

    pub fn http_only(mut self, http_only: bool) -> Self {
        self.http_only = http_only;
        self
    }

    pub fn same_site(mut self, same_site: SameSite) -> Self {
        self.same_site = Some(same_site);
        self
    }
}

impl fmt::Display for SetCookie {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}={}", self.name, self.value)?;
        if let Some(path) = &self.path {
            write!(f, "; Path={path}")?;
        }
        if let Some(domain) = &self.domain {
            write!(f, "; Domain={domain}")?;
        }
        match self.max_age {
            Some(age) if age < 0 => f.write_str("; Max-Age=0")?,
            Some(age) => write!(f, "; Max-Age={age}")?,
            None => {}
        }
        if self.secure {
            f.write_str("; Secure")?;
        }
        if self.http_only {
            f.write_str("; HttpOnly")?;
        }
        match self.same_site {
            Some(SameSite::Strict) => f.write_str("; SameSite=Strict")?,
            Some(SameSite::Lax) => f.write_str("; SameSite=Lax")?,
            Some(SameSite::None) => f.write_str("; SameSite=None")?,
            None => {}
        }
        Ok(())
    }
}

// ── ResponseWriter ────────────────────────────────────────────────────────────

/// Status, headers and body buffered for one request.
#[derive(Debug)]
pub struct ResponseWriter {
    status: StatusCode,
    headers: HeaderMap,
    body: BytesMut,
    committed: bool,
}

impl ResponseWriter {
    pub(crate) fn new() -> Self {
        Self {
            status: StatusCode::OK,
            headers: HeaderMap::new(),
            body: BytesMut::new(),
            committed: false,
        }
    }

    pub fn status(&self) -> StatusCode {
        self.status
    }

    pub fn headers(&self) -> &HeaderMap {
        &self.headers
    }

    pub fn headers_mut(&mut self) -> &mut HeaderMap {
        &mut self.headers
    }

    pub fn body(&self) -> &[u8] {
        &self.body
    }

    /// Bytes written so far.
    pub fn size(&self) -> usize {
        self.body.len()
    }

    /// True once any body bytes were written.
    pub fn is_committed(&self) -> bool {
        self.committed
    }

    /// Sets the status unless the body has already been written.
    pub fn write_header(&mut self, status: StatusCode) {
        if !self.committed {
            self.status = status;
        }
    }

    pub fn write(&mut self, data: &[u8]) {
        self.committed = true;
        self.body.extend_from_slice(data);
    }

    /// Replaces a header; invalid names or values are dropped.
    pub fn set_header(&mut self, name: &str, value: &str) -> bool {
        match (HeaderName::try_from(name), HeaderValue::try_from(value)) {
            (Ok(name), Ok(value)) => {
                self.headers.insert(name, value);
                true
            }
            _ => false,
        }
    }

    /// Appends a header value, keeping existing ones.
    pub fn add_header(&mut self, name: &str, value: &str) -> bool {
        match (HeaderName::try_from(name), HeaderValue::try_from(value)) {
            (Ok(name), Ok(value)) => {
                self.headers.append(name, value);
                true
            }
            _ => false,
        }
    }

    /// Sets `Content-Type` only if no handler has set one.
    pub(crate) fn default_content_type(&mut self, content_type: ContentType) {
        self.headers
            .entry(header::CONTENT_TYPE)
            .or_insert(HeaderValue::from_static(content_type.as_str()));
    }

    /// Drops everything written so far. Used when an error replaces the output.
    pub fn reset(&mut self) {
        self.status = StatusCode::OK;
        self.headers.clear();
        self.body.clear();
        self.committed = false;
    }

    /// Moves the buffered response out, leaving an empty writer behind.
    pub(crate) fn take(&mut self) -> http::Response<Full<Bytes>> {
        let body = self.body.split().freeze();
        let mut res = http::Response::new(Full::new(body));
        *res.status_mut() = self.status;
        *res.headers_mut() = std::mem::take(&mut self.headers);
        self.status = StatusCode::OK;
        self.committed = false;
        res
    }
}
