use crate::reporting::records::Payload;
use crate::task::supervise::join_error_message;
use http::Uri;
use httpdiff_client::client::CONTENT_TYPE_FORM;
use httpdiff_client::{ClientError, Headers, HttpClient, RequestBody};
use httpdiff_metrics::Stopwatch;
use serde_json::Value;
use slog::{debug, o, Logger};
use std::fmt;
use std::str::FromStr;
use std::sync::Arc;
use thiserror::Error;
use tokio::task::{JoinError, JoinHandle};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Method {
    Get,
    Post,
}

impl FromStr for Method {
    type Err = String;

    fn from_str(s: &str) -> Result<Method, String> {
        match s.trim().to_ascii_uppercase().as_str() {
            "GET" => Ok(Method::Get),
            "POST" => Ok(Method::Post),
            other => Err(format!("unsupported method: {}", other)),
        }
    }
}

impl fmt::Display for Method {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Method::Get => write!(f, "GET"),
            Method::Post => write!(f, "POST"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Side {
    A,
    B,
}

impl fmt::Display for Side {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Side::A => write!(f, "UrlA"),
            Side::B => write!(f, "UrlB"),
        }
    }
}

/// One side of a comparison, fixed for the lifetime of a task.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EndpointInfo {
    pub method: Method,
    pub url: String,
    pub content_type: String,
}

impl EndpointInfo {
    pub fn new<S: Into<String>>(method: Method, url: S, content_type: S) -> EndpointInfo {
        EndpointInfo {
            method,
            url: url.into(),
            content_type: content_type.into(),
        }
    }
}

#[derive(Debug, Error)]
pub enum RequestError {
    #[error("invalid url {url}: {message}")]
    InvalidUrl { url: String, message: String },
    #[error("invalid params: {0}")]
    Params(String),
    #[error("invalid headers: {0}")]
    Headers(#[source] serde_json::Error),
    #[error("invalid body: {0}")]
    Body(String),
    #[error(transparent)]
    Client(#[from] ClientError),
    #[error("failed to get response from {side}: {message}")]
    Crashed { side: Side, message: String },
}

fn query_pairs(s: &str) -> Result<Vec<(String, String)>, serde_urlencoded::de::Error> {
    serde_urlencoded::from_str(s)
}

/// Append the payload's query string to the endpoint URL's own query.
///
/// Pairs are sorted by key, keeping the relative order of repeated keys.
pub fn build_url(base: &str, params: &str) -> Result<String, RequestError> {
    let invalid = |message: String| RequestError::InvalidUrl {
        url: base.to_string(),
        message,
    };
    let uri: Uri = base.parse().map_err(|e: http::uri::InvalidUri| invalid(e.to_string()))?;
    if params.is_empty() {
        return Ok(base.to_string());
    }
    let (scheme, authority) = match (uri.scheme_str(), uri.authority()) {
        (Some(s), Some(a)) => (s, a),
        _ => return Err(invalid("missing scheme or host".into())),
    };

    let mut pairs =
        query_pairs(uri.query().unwrap_or("")).map_err(|e| invalid(e.to_string()))?;
    pairs.extend(query_pairs(params).map_err(|e| RequestError::Params(e.to_string()))?);
    pairs.sort_by(|a, b| a.0.cmp(&b.0));

    let query =
        serde_urlencoded::to_string(&pairs).map_err(|e| RequestError::Params(e.to_string()))?;
    Ok(format!("{}://{}{}?{}", scheme, authority, uri.path(), query))
}

/// Task content type first, then the payload's header map on top of it.
pub fn build_headers(content_type: &str, raw: &str) -> Result<Headers, RequestError> {
    let mut headers = Headers::new();
    if !content_type.is_empty() {
        headers.insert("Content-Type".into(), content_type.into());
    }
    if !raw.is_empty() {
        let extra: Headers = serde_json::from_str(raw).map_err(RequestError::Headers)?;
        headers.extend(extra);
    }
    Ok(headers)
}

pub fn build_body(content_type: &str, raw: &str) -> Result<RequestBody, RequestError> {
    if raw.is_empty() {
        return Ok(RequestBody::Empty);
    }
    if content_type.starts_with(CONTENT_TYPE_FORM) {
        let form = query_pairs(raw).map_err(|e| RequestError::Body(e.to_string()))?;
        Ok(RequestBody::Form(form))
    } else {
        let doc: Value = serde_json::from_str(raw).map_err(|e| RequestError::Body(e.to_string()))?;
        Ok(RequestBody::Json(doc))
    }
}

/// Issues the requests for one payload through the injected HTTP capability.
#[derive(Clone)]
pub struct RequestExecutor {
    client: Arc<dyn HttpClient>,
    logger: Logger,
}

impl RequestExecutor {
    pub fn new(client: Arc<dyn HttpClient>, logger: &Logger) -> RequestExecutor {
        RequestExecutor {
            client,
            logger: logger.new(o!("component" => "request")),
        }
    }

    pub async fn execute(
        &self,
        endpoint: &EndpointInfo,
        payload: &Payload,
    ) -> Result<Value, RequestError> {
        let url = build_url(&endpoint.url, &payload.params)?;
        let headers = build_headers(&endpoint.content_type, &payload.headers)?;
        let timer = Stopwatch::new();
        let res = match endpoint.method {
            Method::Get => self.client.get(&url, &headers).await,
            Method::Post => {
                let body = build_body(&endpoint.content_type, &payload.body)?;
                self.client.post(&url, body, &headers).await
            }
        };
        debug!(self.logger, "request finished";
            "method" => %endpoint.method,
            "url" => &url,
            "elapsed_ms" => timer.elapsed_millis(),
            "ok" => res.is_ok());
        Ok(res?)
    }

    fn spawn_side(
        &self,
        endpoint: &Arc<EndpointInfo>,
        payload: &Arc<Payload>,
    ) -> JoinHandle<Result<Value, RequestError>> {
        let executor = self.clone();
        let endpoint = endpoint.clone();
        let payload = payload.clone();
        tokio::spawn(async move { executor.execute(&endpoint, &payload).await })
    }

    /// Run both sides concurrently and wait for both, whatever either returns.
    pub async fn execute_pair(
        &self,
        a: &Arc<EndpointInfo>,
        b: &Arc<EndpointInfo>,
        payload: &Arc<Payload>,
    ) -> (Result<Value, RequestError>, Result<Value, RequestError>) {
        let (ra, rb) =
            futures::future::join(self.spawn_side(a, payload), self.spawn_side(b, payload)).await;
        (settle(Side::A, ra), settle(Side::B, rb))
    }
}

fn settle(
    side: Side,
    joined: Result<Result<Value, RequestError>, JoinError>,
) -> Result<Value, RequestError> {
    joined.unwrap_or_else(|e| {
        Err(RequestError::Crashed {
            side,
            message: join_error_message(e),
        })
    })
}
