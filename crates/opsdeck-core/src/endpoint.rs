//! Streaming and API URLs derived from one base URL.
//!
//! The base is the API root the client talks to, e.g.
//! `https://ops.example.com/api/v1`. Streaming URLs reuse it with the
//! scheme upgraded: `http` becomes `ws` and `https` becomes `wss`.

use thiserror::Error;
use url::Url;

/// Endpoint error.
#[derive(Debug, Error)]
pub enum EndpointError {
    #[error("invalid base URL: {0}")]
    Parse(#[from] url::ParseError),
    #[error("unsupported URL scheme: {0}")]
    UnsupportedScheme(String),
    #[error("URL cannot carry a path: {0}")]
    NotABase(String),
}

/// Base URL for one server.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Endpoint {
    api: Url,
    stream: Url,
}

impl Endpoint {
    /// Parse a base URL. Accepts `http`, `https`, `ws` and `wss`.
    ///
    /// # Errors
    /// Returns error if the URL is malformed or uses another scheme.
    pub fn parse(base: &str) -> Result<Self, EndpointError> {
        let url = Url::parse(base)?;
        if url.cannot_be_a_base() {
            return Err(EndpointError::NotABase(base.to_owned()));
        }
        let (api_scheme, stream_scheme) = match url.scheme() {
            "http" | "ws" => ("http", "ws"),
            "https" | "wss" => ("https", "wss"),
            other => return Err(EndpointError::UnsupportedScheme(other.to_owned())),
        };

        let mut api = url.clone();
        let mut stream = url;
        for (target, scheme) in [(&mut api, api_scheme), (&mut stream, stream_scheme)] {
            target
                .set_scheme(scheme)
                .map_err(|()| EndpointError::UnsupportedScheme(scheme.to_owned()))?;
            target.set_query(None);
            target.set_fragment(None);
        }

        Ok(Self { api, stream })
    }

    /// Whether streams use a secure transport.
    #[must_use]
    pub fn is_secure(&self) -> bool {
        self.stream.scheme() == "wss"
    }

    /// `{base}/tasks/ws/{task_id}`
    #[must_use]
    pub fn task_stream(&self, task_id: &str) -> Url {
        self.stream_url(&["tasks", "ws", task_id])
    }

    /// `{base}/terminal/ws/{host}?cols={cols}&rows={rows}`
    #[must_use]
    pub fn terminal(&self, host: &str, cols: u16, rows: u16) -> Url {
        let mut url = self.stream_url(&["terminal", "ws", host]);
        url.query_pairs_mut()
            .append_pair("cols", &cols.to_string())
            .append_pair("rows", &rows.to_string());
        url
    }

    /// Join an API path such as `/deploy/run` onto the base.
    ///
    /// # Errors
    /// Returns error if the joined URL does not parse.
    pub fn api(&self, path: &str) -> Result<Url, EndpointError> {
        let base = self.api.as_str().trim_end_matches('/');
        let path = path.trim_start_matches('/');
        Ok(Url::parse(&format!("{base}/{path}"))?)
    }

    fn stream_url(&self, segments: &[&str]) -> Url {
        let mut url = self.stream.clone();
        // `parse` rejects cannot-be-a-base URLs, so segments are always available.
        if let Ok(mut path) = url.path_segments_mut() {
            path.pop_if_empty().extend(segments);
        }
        url
    }
}
