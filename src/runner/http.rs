//! HTTP runner.
//!
//! Step payload:
//!
//! ```yaml
//! req:
//!   /users?page=1:
//!     post:
//!       headers:
//!         Authorization: "Bearer {{ vars.token }}"
//!       body:
//!         application/json:
//!           name: alice
//! ```
//!
//! The recorded value is `{res: {status, headers, body, raw_body}}`.

use std::collections::BTreeMap;
use std::time::Duration;

use reqwest::{Client, Method};
use serde_json::{Map, Value};

use crate::error::{Error, Result};

const DEFAULT_TIMEOUT_SECS: u64 = 30;

/// A parsed HTTP request.
#[derive(Debug, Clone, PartialEq)]
pub struct HttpRequest {
    pub path: String,
    pub method: Method,
    pub headers: BTreeMap<String, String>,
    pub body: Option<HttpBody>,
}

/// Request body with its media type.
#[derive(Debug, Clone, PartialEq)]
pub struct HttpBody {
    pub media_type: String,
    pub value: Value,
}

impl HttpRequest {
    /// Parse a `{<path>: {<method>: {headers?, body?}}}` payload.
    pub fn from_value(v: &Value) -> Result<Self> {
        let invalid = || Error::config(format!("invalid http request: {v}"));
        let outer = v.as_object().filter(|m| m.len() == 1).ok_or_else(invalid)?;
        let (path, inner) = outer.iter().next().ok_or_else(invalid)?;
        let inner = inner.as_object().filter(|m| m.len() == 1).ok_or_else(invalid)?;
        let (method, req) = inner.iter().next().ok_or_else(invalid)?;
        let method = Method::from_bytes(method.to_uppercase().as_bytes()).map_err(|_| invalid())?;

        let mut headers = BTreeMap::new();
        if let Some(h) = req.get("headers") {
            let h = h.as_object().ok_or_else(invalid)?;
            for (k, v) in h {
                let value = match v {
                    Value::String(s) => s.clone(),
                    other => other.to_string(),
                };
                headers.insert(k.clone(), value);
            }
        }

        let body = match req.get("body") {
            None | Some(Value::Null) => None,
            Some(Value::Object(b)) if b.len() == 1 => {
                b.iter().next().map(|(k, v)| HttpBody { media_type: k.clone(), value: v.clone() })
            }
            Some(_) => return Err(invalid()),
        };

        Ok(Self { path: path.clone(), method, headers, body })
    }
}

/// Sends requests relative to one endpoint.
#[derive(Debug, Clone)]
pub struct HttpRunner {
    name: String,
    endpoint: String,
    client: Client,
}

impl HttpRunner {
    /// Create a runner for an `http://` / `https://` endpoint.
    pub fn new(name: impl Into<String>, endpoint: impl Into<String>) -> Result<Self> {
        let endpoint = endpoint.into();
        if !endpoint.starts_with("http://") && !endpoint.starts_with("https://") {
            return Err(Error::config(format!("invalid http endpoint: {endpoint}")));
        }
        let client = Client::builder().timeout(Duration::from_secs(DEFAULT_TIMEOUT_SECS)).build()?;
        Ok(Self { name: name.into(), endpoint, client })
    }

    /// Runner name.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Full URL for a request path.
    pub fn url_for(&self, path: &str) -> String {
        format!("{}/{}", self.endpoint.trim_end_matches('/'), path.trim_start_matches('/'))
    }

    /// Send the request and return the value to record.
    pub async fn run(&self, req: &HttpRequest) -> Result<Value> {
        let url = self.url_for(&req.path);
        tracing::debug!(runner = %self.name, method = %req.method, url = %url, "Sending request");

        let mut builder = self.client.request(req.method.clone(), &url);
        for (k, v) in &req.headers {
            builder = builder.header(k, v);
        }
        if let Some(body) = &req.body {
            builder = builder.header(reqwest::header::CONTENT_TYPE, &body.media_type);
            builder = match (&body.value, body.media_type.as_str()) {
                (v, "application/json") => builder.body(serde_json::to_vec(v)?),
                (Value::String(s), _) => builder.body(s.clone()),
                (v, _) => builder.body(v.to_string()),
            };
        }

        let response = builder.send().await?;
        let status = response.status().as_u16();
        let mut headers = Map::new();
        for (name, value) in response.headers() {
            let entry =
                headers.entry(name.as_str().to_string()).or_insert_with(|| Value::Array(vec![]));
            if let Value::Array(values) = entry {
                values.push(Value::String(String::from_utf8_lossy(value.as_bytes()).into_owned()));
            }
        }
        let is_json = response
            .headers()
            .get(reqwest::header::CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .is_some_and(|ct| ct.contains("json"));
        let raw_body = response.text().await?;
        let body = if is_json {
            serde_json::from_str(&raw_body).unwrap_or_else(|_| Value::String(raw_body.clone()))
        } else {
            Value::String(raw_body.clone())
        };
        tracing::debug!(runner = %self.name, status, "Received response");

        let mut res = Map::new();
        res.insert("status".to_string(), Value::from(status));
        res.insert("headers".to_string(), Value::Object(headers));
        res.insert("body".to_string(), body);
        res.insert("raw_body".to_string(), Value::String(raw_body));

        let mut out = Map::new();
        out.insert("res".to_string(), Value::Object(res));
        Ok(Value::Object(out))
    }
}
