//! Request binding, validation and response rendering.
//!
//! Binding picks a decoder from `Content-Type` (bodiless `GET`/`HEAD`
//! requests bind from the query string). Rendering picks an encoder from
//! `Accept`, unless the app pins one in [`ContextSettings`](super::ContextSettings).

use http::Method;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};

use crate::context::Context;
use crate::error::Error;
use crate::response::ContentType;

/// Response encoders.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Renderer {
    Json,
    Xml,
    Text,
    Html,
}

impl Renderer {
    /// Picks a renderer from an `Accept` header; the first recognised media
    /// type wins and anything else falls back to JSON.
    pub fn negotiate(accept: &str) -> Self {
        for item in accept.split(',') {
            let media = item.split(';').next().unwrap_or("").trim();
            match media {
                "application/json" | "*/*" | "application/*" => return Self::Json,
                "application/xml" | "text/xml" => return Self::Xml,
                "text/html" => return Self::Html,
                "text/plain" | "text/*" => return Self::Text,
                _ => {}
            }
        }
        Self::Json
    }
}

/// Request decoders.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Binder {
    Json,
    Xml,
    Form,
    Query,
    /// Header names (lowercase) map to fields; rename fields with
    /// `#[serde(rename = "x-request-id")]`.
    Header,
}

impl Binder {
    fn for_request(method: &Method, content_type: &str, body_empty: bool) -> Result<Self, Error> {
        let media = content_type.split(';').next().unwrap_or("").trim();
        match media {
            "" if body_empty || *method == Method::GET || *method == Method::HEAD => Ok(Self::Query),
            "application/json" => Ok(Self::Json),
            "application/xml" | "text/xml" => Ok(Self::Xml),
            "application/x-www-form-urlencoded" | "multipart/form-data" => Ok(Self::Form),
            _ => Err(Error::UnsupportedMediaType(content_type.to_owned())),
        }
    }
}

/// Checks a bound value.
pub trait Validate {
    fn validate(&self) -> Result<(), String>;
}

impl Context {
    /// Reads the body and decodes it according to `Content-Type`.
    pub async fn bind<T: DeserializeOwned>(&mut self) -> Result<T, Error> {
        self.prepare().await?;
        self.bind_cached()
    }

    /// Reads the body and decodes it with an explicit binder.
    pub async fn bind_with<T: DeserializeOwned>(&mut self, binder: Binder) -> Result<T, Error> {
        self.prepare().await?;
        self.bind_cached_with(binder)
    }

    /// Decodes the already-cached body according to `Content-Type`.
    pub fn bind_cached<T: DeserializeOwned>(&self) -> Result<T, Error> {
        let binder = Binder::for_request(&self.request().method, self.content_type(), self.body().is_empty())?;
        self.bind_cached_with(binder)
    }

    pub fn bind_cached_with<T: DeserializeOwned>(&self, binder: Binder) -> Result<T, Error> {
        match binder {
            Binder::Json => serde_json::from_slice(self.body()).map_err(|e| Error::Bind(e.to_string())),
            Binder::Xml => {
                let text = std::str::from_utf8(self.body()).map_err(|e| Error::Bind(e.to_string()))?;
                quick_xml::de::from_str(text).map_err(|e| Error::Bind(e.to_string()))
            }
            Binder::Form if self.content_type().starts_with("multipart/form-data") => {
                decode_pairs(self.form_values().iter().map(|(k, v)| (k.as_str(), v.as_str())))
            }
            Binder::Form => serde_urlencoded::from_bytes(self.body()).map_err(|e| Error::Bind(e.to_string())),
            Binder::Query => decode_pairs(self.querys().iter().map(|(k, v)| (k.as_str(), v.as_str()))),
            Binder::Header => decode_pairs(
                self.headers()
                    .iter()
                    .filter_map(|(name, value)| Some((name.as_str(), value.to_str().ok()?))),
            ),
        }
    }

    pub fn validate<T: Validate + ?Sized>(&self, value: &T) -> Result<(), Error> {
        value.validate().map_err(Error::Validate)
    }

    /// Encodes `data` with the pinned renderer, or the one `Accept` asks for.
    pub fn render<T: Serialize + ?Sized>(&mut self, data: &T) -> Result<(), Error> {
        let renderer = self
            .settings()
            .renderer
            .unwrap_or_else(|| Renderer::negotiate(self.get_header("accept").unwrap_or("")));
        self.render_with(renderer, data)
    }

    pub fn render_with<T: Serialize + ?Sized>(&mut self, renderer: Renderer, data: &T) -> Result<(), Error> {
        let (content_type, bytes) = match renderer {
            Renderer::Json => (
                ContentType::Json,
                serde_json::to_vec(data).map_err(|e| Error::Render(e.to_string()))?,
            ),
            Renderer::Xml => (
                ContentType::Xml,
                quick_xml::se::to_string(data).map_err(|e| Error::Render(e.to_string()))?.into_bytes(),
            ),
            Renderer::Text => (ContentType::Text, plain(data)?),
            Renderer::Html => (ContentType::Html, plain(data)?),
        };
        let response = self.response_mut();
        response.default_content_type(content_type);
        response.write(&bytes);
        Ok(())
    }
}

/// Strings render verbatim; anything else as its JSON text.
fn plain<T: Serialize + ?Sized>(data: &T) -> Result<Vec<u8>, Error> {
    match serde_json::to_value(data).map_err(|e| Error::Render(e.to_string()))? {
        serde_json::Value::String(s) => Ok(s.into_bytes()),
        other => Ok(other.to_string().into_bytes()),
    }
}

fn decode_pairs<'a, T: DeserializeOwned>(pairs: impl Iterator<Item = (&'a str, &'a str)>) -> Result<T, Error> {
    let encoded = url::form_urlencoded::Serializer::new(String::new()).extend_pairs(pairs).finish();
    serde_urlencoded::from_str(&encoded).map_err(|e| Error::Bind(e.to_string()))
}
