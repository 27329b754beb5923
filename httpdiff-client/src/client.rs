use crate::connector::https_connector;
use crate::error::ClientError;
use crate::FutureResponse;
use futures::future;
use futures::prelude::*;
use http::header::CONTENT_TYPE;
use http::{Method, Request, Response, StatusCode, Uri};
use hyper::body::HttpBody;
use hyper::client::HttpConnector;
use hyper::client::Client as HyperClient;
use hyper::Body;
use hyper_rustls::HttpsConnector;
use serde_json::Value;
use std::collections::BTreeMap;
use std::time::Duration;

pub const CONTENT_TYPE_JSON: &str = "application/json";
pub const CONTENT_TYPE_FORM: &str = "application/x-www-form-urlencoded";

pub type Headers = BTreeMap<String, String>;

/// Get/Post capability consumed by the comparison pipeline.
///
/// Only a `200 OK` response counts as success, and its body must decode as JSON. The
/// returned futures own everything they need, so callers may spawn them.
pub trait HttpClient: Send + Sync {
    fn get(&self, url: &str, headers: &Headers) -> FutureResponse<Value, ClientError>;

    fn post(
        &self,
        url: &str,
        body: RequestBody,
        headers: &Headers,
    ) -> FutureResponse<Value, ClientError>;
}

#[derive(Debug, Clone, PartialEq)]
pub enum RequestBody {
    Empty,
    Json(Value),
    Form(Vec<(String, String)>),
}

impl RequestBody {
    fn content_type(&self) -> Option<&'static str> {
        match self {
            RequestBody::Empty => None,
            RequestBody::Json(_) => Some(CONTENT_TYPE_JSON),
            RequestBody::Form(_) => Some(CONTENT_TYPE_FORM),
        }
    }

    fn encode(self) -> Result<Body, ClientError> {
        let body = match self {
            RequestBody::Empty => Body::empty(),
            RequestBody::Json(v) => Body::from(serde_json::to_vec(&v)?),
            RequestBody::Form(pairs) => Body::from(serde_urlencoded::to_string(&pairs)?),
        };
        Ok(body)
    }
}

#[derive(Debug, Clone)]
pub struct ClientConfig {
    /// Deadline for one full exchange, from sending the request to the last body byte
    pub timeout: Option<Duration>,
    pub connect_timeout: Option<Duration>,
    pub max_idle_per_host: usize,
    pub max_response_body: usize,
    pub nodelay: bool,
}

impl Default for ClientConfig {
    fn default() -> ClientConfig {
        ClientConfig {
            timeout: Some(Duration::from_secs(30)),
            connect_timeout: Some(Duration::from_secs(5)),
            max_idle_per_host: 512,
            max_response_body: 10 * 1024 * 1024,
            nodelay: true,
        }
    }
}

#[derive(Clone)]
pub struct JsonClient {
    client: HyperClient<HttpsConnector<HttpConnector>, Body>,
    config: ClientConfig,
}

impl JsonClient {
    pub fn new(config: ClientConfig) -> JsonClient {
        let connector = https_connector(config.nodelay, config.connect_timeout);
        let client = HyperClient::builder()
            .pool_max_idle_per_host(config.max_idle_per_host)
            .build(connector);
        JsonClient { client, config }
    }

    fn send(&self, req: Request<Body>) -> FutureResponse<Value, ClientError> {
        let client = self.client.clone();
        let timeout = self.config.timeout;
        let limit = self.config.max_response_body;
        log::debug!("{} {}", req.method(), req.uri());
        async move {
            let exchange = async {
                let res = client.request(req).await?;
                read_json(res, limit).await
            };
            match timeout {
                Some(t) => tokio::time::timeout(t, exchange)
                    .await
                    .map_err(|_| ClientError::Timeout(t))?,
                None => exchange.await,
            }
        }
        .boxed()
    }
}

impl HttpClient for JsonClient {
    fn get(&self, url: &str, headers: &Headers) -> FutureResponse<Value, ClientError> {
        match build_request(Method::GET, url, headers, RequestBody::Empty) {
            Ok(req) => self.send(req),
            Err(e) => future::err(e).boxed(),
        }
    }

    fn post(
        &self,
        url: &str,
        body: RequestBody,
        headers: &Headers,
    ) -> FutureResponse<Value, ClientError> {
        match build_request(Method::POST, url, headers, body) {
            Ok(req) => self.send(req),
            Err(e) => future::err(e).boxed(),
        }
    }
}

fn build_request(
    method: Method,
    url: &str,
    headers: &Headers,
    body: RequestBody,
) -> Result<Request<Body>, ClientError> {
    let uri: Uri = url.parse()?;
    let mut builder = Request::builder().method(method).uri(uri);
    let has_content_type = headers
        .keys()
        .any(|k| k.eq_ignore_ascii_case(CONTENT_TYPE.as_str()));
    if !has_content_type {
        if let Some(ct) = body.content_type() {
            builder = builder.header(CONTENT_TYPE, ct);
        }
    }
    for (k, v) in headers.iter() {
        builder = builder.header(k.as_str(), v.as_str());
    }
    Ok(builder.body(body.encode()?)?)
}

async fn read_json(res: Response<Body>, limit: usize) -> Result<Value, ClientError> {
    if res.status() != StatusCode::OK {
        return Err(ClientError::Status(res.status().as_u16()));
    }
    let mut body = res.into_body();
    let mut buf = Vec::new();
    while let Some(chunk) = body.data().await {
        let chunk = chunk?;
        if buf.len() + chunk.len() > limit {
            return Err(ClientError::BodyTooLarge(limit));
        }
        buf.extend_from_slice(&chunk);
    }
    Ok(serde_json::from_slice(&buf)?)
}
