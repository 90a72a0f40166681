//! Incoming request state owned by a [`Context`](crate::Context).
//!
//! The request head is kept as [`http::request::Parts`]. The body stays
//! unread until a handler asks for it; the first read collects it (up to the
//! configured soft limit) and every later read returns the cached bytes.

use std::net::SocketAddr;
use std::sync::OnceLock;

use bytes::Bytes;
use futures_util::stream;
use http::header::{self, HeaderMap};
use http::uri::Scheme;
use http_body_util::combinators::UnsyncBoxBody;
use http_body_util::{BodyExt, Collected, Empty, Full, LengthLimitError, Limited};
use parking_lot::Mutex;

use crate::error::{BoxError, Error};
use crate::handler::BoxFuture;

/// The request body type handled by torii.
pub type Body = UnsyncBoxBody<Bytes, BoxError>;

/// A body holding `bytes`.
pub fn full(bytes: impl Into<Bytes>) -> Body {
    Full::new(bytes.into()).map_err(|never| match never {}).boxed_unsync()
}

/// A body with no data.
pub fn empty() -> Body {
    Empty::new().map_err(|never| match never {}).boxed_unsync()
}

/// A cookie sent by the client.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Cookie {
    pub name: String,
    pub value: String,
}

/// A file uploaded through a `multipart/form-data` body.
#[derive(Clone, Debug)]
pub struct FormFile {
    pub field: String,
    pub file_name: String,
    pub content_type: Option<String>,
    pub data: Bytes,
}

/// A parsed form body.
#[derive(Clone, Debug, Default)]
pub struct Form {
    pub values: Vec<(String, String)>,
    pub files: Vec<FormFile>,
}

impl Form {
    pub fn value(&self, key: &str) -> Option<&str> {
        self.values.iter().find(|(k, _)| k == key).map(|(_, v)| v.as_str())
    }

    pub fn file(&self, key: &str) -> Option<&FormFile> {
        self.files.iter().find(|f| f.field == key)
    }
}

/// Request head, lazily-read body and derived caches.
pub(crate) struct RequestState {
    parts: http::request::Parts,
    remote_addr: Option<SocketAddr>,
    // The body is `Send` but not `Sync`; the mutex makes the context `Sync`
    // and is only ever reached through `get_mut`.
    body: Mutex<Option<Body>>,
    cache: Option<Bytes>,
    failure: Option<BodyFailure>,
    form: Option<Form>,
    query: OnceLock<Vec<(String, String)>>,
}

impl RequestState {
    pub(crate) fn new() -> Self {
        Self {
            parts: blank_parts(),
            remote_addr: None,
            body: Mutex::new(None),
            cache: None,
            failure: None,
            form: None,
            query: OnceLock::new(),
        }
    }

    pub(crate) fn reset(&mut self, req: http::Request<Body>, remote_addr: Option<SocketAddr>) {
        let (parts, body) = req.into_parts();
        self.parts = parts;
        self.remote_addr = remote_addr;
        *self.body.get_mut() = Some(body);
        self.cache = None;
        self.failure = None;
        self.form = None;
        self.query.take();
    }

    pub(crate) fn clear(&mut self) {
        self.parts = blank_parts();
        self.remote_addr = None;
        *self.body.get_mut() = None;
        self.cache = None;
        self.failure = None;
        self.form = None;
        self.query.take();
    }

    pub(crate) fn parts(&self) -> &http::request::Parts {
        &self.parts
    }

    pub(crate) fn parts_mut(&mut self) -> &mut http::request::Parts {
        &mut self.parts
    }

    pub(crate) fn remote_addr(&self) -> Option<SocketAddr> {
        self.remote_addr
    }

    pub(crate) fn headers(&self) -> &HeaderMap {
        &self.parts.headers
    }

    /// First value of `name`, if present and valid UTF-8.
    pub(crate) fn header(&self, name: impl header::AsHeaderName) -> Option<&str> {
        self.parts.headers.get(name).and_then(|v| v.to_str().ok())
    }

    pub(crate) fn host(&self) -> &str {
        self.header(header::HOST)
            .or_else(|| self.parts.uri.authority().map(|a| a.as_str()))
            .unwrap_or("")
    }

    pub(crate) fn is_tls(&self) -> bool {
        self.parts.uri.scheme() == Some(&Scheme::HTTPS)
            || self
                .header("x-forwarded-proto")
                .is_some_and(|p| p.eq_ignore_ascii_case("https"))
    }

    /// `X-Real-IP`, then the first `X-Forwarded-For` hop, then the peer address.
    pub(crate) fn real_ip(&self) -> String {
        if let Some(ip) = self.header("x-real-ip").map(str::trim).filter(|ip| !ip.is_empty()) {
            return ip.to_owned();
        }
        if let Some(first) = self
            .header("x-forwarded-for")
            .and_then(|xff| xff.split(',').next())
            .map(str::trim)
            .filter(|ip| !ip.is_empty())
        {
            return first.to_owned();
        }
        self.remote_addr.map(|addr| addr.ip().to_string()).unwrap_or_default()
    }

    pub(crate) fn querys(&self) -> &[(String, String)] {
        self.query.get_or_init(|| match self.parts.uri.query() {
            Some(q) => url::form_urlencoded::parse(q.as_bytes()).into_owned().collect(),
            None => Vec::new(),
        })
    }

    pub(crate) fn cookies(&self) -> Vec<Cookie> {
        self.parts
            .headers
            .get_all(header::COOKIE)
            .iter()
            .filter_map(|v| v.to_str().ok())
            .flat_map(|line| line.split(';'))
            .filter_map(|pair| {
                let (name, value) = pair.trim().split_once('=')?;
                let value = value.trim_matches('"');
                Some(Cookie { name: name.to_owned(), value: value.to_owned() })
            })
            .collect()
    }

    pub(crate) fn cached_body(&self) -> &[u8] {
        self.cache.as_deref().unwrap_or_default()
    }

    pub(crate) fn is_body_read(&self) -> bool {
        self.cache.is_some()
    }

    /// Collects the body once; later calls return the cached bytes.
    ///
    /// A failed read is remembered: the body is gone, so every later call
    /// reports the same failure instead of an empty body.
    pub(crate) async fn read_body(&mut self, limit: usize) -> Result<Bytes, Error> {
        if let Some(cached) = &self.cache {
            return Ok(cached.clone());
        }
        if let Some(failure) = &self.failure {
            return Err(failure.to_error());
        }
        let bytes = match self.body.get_mut().take() {
            Some(body) => match collect_limited(body, limit).await {
                Ok(collected) => collected.to_bytes(),
                Err(e) => {
                    let failure = if e.downcast_ref::<LengthLimitError>().is_some() {
                        BodyFailure::TooLarge { limit }
                    } else {
                        BodyFailure::Broken(e.to_string())
                    };
                    let err = failure.to_error();
                    self.failure = Some(failure);
                    return Err(err);
                }
            },
            None => Bytes::new(),
        };
        self.cache = Some(bytes.clone());
        Ok(bytes)
    }

    pub(crate) fn form(&self) -> Option<&Form> {
        self.form.as_ref()
    }

    /// Parses an urlencoded or multipart body once.
    ///
    /// Other content types yield an empty form.
    pub(crate) async fn parse_form(&mut self, limit: usize) -> Result<&Form, Error> {
        if self.form.is_none() {
            let content_type = self.header(header::CONTENT_TYPE).unwrap_or("").to_owned();
            let body = self.read_body(limit).await?;
            let form = if content_type.starts_with("application/x-www-form-urlencoded") {
                Form {
                    values: url::form_urlencoded::parse(&body).into_owned().collect(),
                    files: Vec::new(),
                }
            } else if content_type.starts_with("multipart/form-data") {
                parse_multipart(&content_type, body).await?
            } else {
                Form::default()
            };
            self.form = Some(form);
        }
        Ok(self.form.get_or_insert_with(Form::default))
    }
}

/// Why the first body read failed.
enum BodyFailure {
    TooLarge { limit: usize },
    Broken(String),
}

impl BodyFailure {
    fn to_error(&self) -> Error {
        match self {
            Self::TooLarge { limit } => Error::BodyTooLarge { limit: *limit },
            Self::Broken(msg) => Error::Body(msg.clone().into()),
        }
    }
}

// Boxed with a concrete error type so the collect future stays `Send` inside
// handler futures; awaiting the generic `Collect` directly trips the
// auto-trait check on its `Into<BoxError>` bound.
fn collect_limited(body: Body, limit: usize) -> BoxFuture<'static, Result<Collected<Bytes>, BoxError>> {
    Box::pin(Limited::new(body, limit).collect())
}

async fn parse_multipart(content_type: &str, body: Bytes) -> Result<Form, Error> {
    let boundary = multer::parse_boundary(content_type).map_err(|e| Error::Bind(e.to_string()))?;
    let chunks = stream::once(async move { Ok::<_, std::convert::Infallible>(body) });
    let mut multipart = multer::Multipart::new(chunks, boundary);

    let mut form = Form::default();
    while let Some(field) = multipart.next_field().await.map_err(|e| Error::Bind(e.to_string()))? {
        let name = field.name().unwrap_or_default().to_owned();
        let file_name = field.file_name().map(str::to_owned);
        let content_type = field.content_type().map(|m| m.to_string());
        let data = field.bytes().await.map_err(|e| Error::Bind(e.to_string()))?;
        match file_name {
            Some(file_name) => form.files.push(FormFile { field: name, file_name, content_type, data }),
            None => form.values.push((name, String::from_utf8_lossy(&data).into_owned())),
        }
    }
    Ok(form)
}

fn blank_parts() -> http::request::Parts {
    http::Request::new(()).into_parts().0
}

#[cfg(test)]
mod tests {
    use super::*;

    fn state(req: http::Request<Body>, remote: Option<SocketAddr>) -> RequestState {
        let mut state = RequestState::new();
        state.reset(req, remote);
        state
    }

    #[test]
    fn real_ip_trust_chain() {
        let remote: SocketAddr = "10.0.0.9:5555".parse().unwrap();

        let req = http::Request::builder()
            .header("x-real-ip", "1.1.1.1")
            .header("x-forwarded-for", "2.2.2.2, 3.3.3.3")
            .body(empty())
            .unwrap();
        assert_eq!(state(req, Some(remote)).real_ip(), "1.1.1.1");

        let req = http::Request::builder()
            .header("x-forwarded-for", "2.2.2.2, 3.3.3.3")
            .body(empty())
            .unwrap();
        assert_eq!(state(req, Some(remote)).real_ip(), "2.2.2.2");

        let req = http::Request::builder().body(empty()).unwrap();
        assert_eq!(state(req, Some(remote)).real_ip(), "10.0.0.9");
    }

    #[test]
    fn cookies_are_split_per_pair() {
        let req = http::Request::builder()
            .header("cookie", "sid=abc; theme=\"dark\"")
            .header("cookie", "lang=en")
            .body(empty())
            .unwrap();
        let names: Vec<_> = state(req, None).cookies().into_iter().map(|c| (c.name, c.value)).collect();
        assert_eq!(
            names,
            [("sid".into(), "abc".into()), ("theme".into(), "dark".into()), ("lang".into(), "en".into())]
        );
    }

    #[tokio::test]
    async fn body_is_cached_after_first_read() {
        let req = http::Request::builder().body(full("hello")).unwrap();
        let mut st = state(req, None);
        assert!(st.cached_body().is_empty());
        assert_eq!(&st.read_body(1024).await.unwrap()[..], b"hello");
        assert_eq!(&st.read_body(1024).await.unwrap()[..], b"hello");
        assert_eq!(st.cached_body(), b"hello");
    }

    #[tokio::test]
    async fn body_over_limit_is_rejected() {
        let req = http::Request::builder().body(full("0123456789")).unwrap();
        let mut st = state(req, None);
        assert!(matches!(st.read_body(4).await, Err(Error::BodyTooLarge { limit: 4 })));
        // the body was consumed by the failed read; the failure sticks
        assert!(matches!(st.read_body(4).await, Err(Error::BodyTooLarge { limit: 4 })));
        assert!(!st.is_body_read());
    }

    #[tokio::test]
    async fn multipart_form_splits_values_and_files() {
        let body = "--XX\r\n\
            Content-Disposition: form-data; name=\"title\"\r\n\r\n\
            report\r\n\
            --XX\r\n\
            Content-Disposition: form-data; name=\"doc\"; filename=\"a.txt\"\r\n\
            Content-Type: text/plain\r\n\r\n\
            file body\r\n\
            --XX--\r\n";
        let req = http::Request::builder()
            .header("content-type", "multipart/form-data; boundary=XX")
            .body(full(body))
            .unwrap();
        let mut st = state(req, None);
        let form = st.parse_form(1 << 20).await.unwrap();
        assert_eq!(form.value("title"), Some("report"));
        let file = form.file("doc").unwrap();
        assert_eq!(file.file_name, "a.txt");
        assert_eq!(&file.data[..], b"file body");
    }
}
