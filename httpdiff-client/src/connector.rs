use hyper::client::HttpConnector;
use hyper_rustls::{HttpsConnector, HttpsConnectorBuilder};
use std::time::Duration;

/// Build a connector that speaks plain HTTP and HTTPS (webpki roots) over one TCP dialer.
pub fn https_connector(
    nodelay: bool,
    connect_timeout: Option<Duration>,
) -> HttpsConnector<HttpConnector> {
    let mut http = HttpConnector::new();
    http.enforce_http(false);
    http.set_nodelay(nodelay);
    http.set_connect_timeout(connect_timeout);
    HttpsConnectorBuilder::new()
        .with_webpki_roots()
        .https_or_http()
        .enable_http1()
        .enable_http2()
        .wrap_connector(http)
}
