//! Thin HTTPS helper shared by every REST method group.
//!
//! Translates method/headers/body into a [`Response`] and maps the two
//! failure classes the rest of the crate cares about: transport errors
//! become [`Error::Request`], an HTTP 401 becomes [`Error::Authentication`].
//! No retry or backoff happens here.

use reqwest::header::HeaderMap;
use serde_json::Value;
use tracing::debug;

use crate::error::{Error, Result};

pub use reqwest::Method;

/// A fully-read HTTP response.
#[derive(Debug)]
pub struct Response {
    pub url: String,
    pub status_code: u16,
    pub text: String,
}

impl Response {
    /// Parses the body as JSON.
    pub fn json(&self) -> Result<Value> {
        serde_json::from_str(&self.text)
            .map_err(|e| Error::Request(format!("malformed response body from {}: {e}", self.url)))
    }
}

/// The HTTP side of the client, wrapping one connection-pooled
/// [`reqwest::Client`].
#[derive(Debug)]
pub struct Requester {
    client: reqwest::Client,
}

impl Requester {
    /// Builds the underlying HTTP client, routed through `proxy` if given.
    pub fn new(proxy: Option<&str>) -> Result<Self> {
        let mut builder = reqwest::Client::builder();
        if let Some(proxy) = proxy {
            let proxy = reqwest::Proxy::all(proxy)
                .map_err(|e| Error::InvalidArgument(format!("invalid proxy url: {e}")))?;
            builder = builder.proxy(proxy);
        }
        let client = builder
            .build()
            .map_err(|e| Error::Request(format!("cannot build http client: {e}")))?;
        Ok(Self { client })
    }

    /// Sends one request and reads the whole body.
    ///
    /// `body`, when present, is sent as JSON.
    pub async fn request(
        &self,
        method: Method,
        url: &str,
        headers: HeaderMap,
        body: Option<&Value>,
    ) -> Result<Response> {
        debug!(%method, url, "http request");

        let mut request = self.client.request(method, url).headers(headers);
        if let Some(body) = body {
            request = request.json(body);
        }

        let raw = request
            .send()
            .await
            .map_err(|e| Error::Request(format!("an error occurred while making the request: {e}")))?;

        let status_code = raw.status().as_u16();
        let text = raw
            .text()
            .await
            .map_err(|e| Error::Request(format!("an error occurred while reading the response: {e}")))?;

        if status_code == 401 {
            return Err(Error::Authentication("maybe your token is invalid?".into()));
        }

        Ok(Response {
            url: url.to_string(),
            status_code,
            text,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn response_json_parses_body() {
        let response = Response {
            url: "https://example.test/".into(),
            status_code: 200,
            text: r#"{"status": "OK"}"#.into(),
        };
        let value = response.json().unwrap();
        assert_eq!(value["status"], "OK");
    }

    #[test]
    fn response_json_rejects_garbage() {
        let response = Response {
            url: "https://example.test/".into(),
            status_code: 200,
            text: "<html>not json</html>".into(),
        };
        assert!(matches!(response.json(), Err(Error::Request(_))));
    }

    #[test]
    fn requester_rejects_invalid_proxy() {
        let err = Requester::new(Some("not a url")).unwrap_err();
        assert!(matches!(err, Error::InvalidArgument(_)));
    }
}
