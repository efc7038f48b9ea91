// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Forwarding to per-deployment backends
//!
//! Each deployment runs behind an in-cluster service whose DNS name is
//! derived from the workspace and deployment ids.  The [`Forwarder`]
//! rewrites an incoming request onto that service: the gateway prefix
//! of the path is stripped, hop-by-hop headers are dropped, and the
//! `Host` header is rewritten to the backend's authority.  Backend
//! failures surface as 503s so callers can tell "your deployment is
//! down" apart from "you may not do that".

use crate::config::ProxyConfig;
use anyhow::Context;
use dropshot::Body;
use dropshot::WebsocketChannelResult;
use dropshot::WebsocketConnection;
use futures::SinkExt;
use futures::StreamExt;
use gangway_common::Error;
use http::HeaderMap;
use http::HeaderName;
use http::Method;
use http::Response;
use http::Uri;
use slog::debug;
use slog::warn;
use slog::Logger;
use slog_error_chain::InlineErrorChain;
use tokio::net::TcpStream;
use tokio_tungstenite::tungstenite::protocol::Role;
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::MaybeTlsStream;
use tokio_tungstenite::WebSocketStream;
use uuid::Uuid;

/// Route segment marking the plain HTTP proxy
const PROXY_SEGMENT: &str = "proxy";
/// Route segment marking the websocket proxy
const STREAM_SEGMENT: &str = "stream";

/// Headers that describe one connection rather than the request, per
/// RFC 9110 § 7.6.1.  These never cross the proxy in either direction.
const HOP_BY_HOP_HEADERS: [HeaderName; 8] = [
    http::header::CONNECTION,
    HeaderName::from_static("keep-alive"),
    http::header::PROXY_AUTHENTICATE,
    http::header::PROXY_AUTHORIZATION,
    http::header::TE,
    http::header::TRAILER,
    http::header::TRANSFER_ENCODING,
    http::header::UPGRADE,
];

fn is_hop_by_hop(name: &HeaderName) -> bool {
    HOP_BY_HOP_HEADERS.iter().any(|header| header == name)
}

/// Proxies requests to deployment backends
pub struct Forwarder {
    config: ProxyConfig,
    client: reqwest::Client,
}

impl Forwarder {
    pub fn new(config: ProxyConfig) -> Result<Forwarder, anyhow::Error> {
        // The backend sees redirects as responses to forward verbatim,
        // not as instructions for the proxy to follow.
        let client = reqwest::Client::builder()
            .redirect(reqwest::redirect::Policy::none())
            .build()
            .context("building backend HTTP client")?;
        Ok(Forwarder { config, client })
    }

    /// Returns the `host:port` this workspace's deployment listens on.
    fn backend_authority(
        &self,
        workspace_id: Uuid,
        deployment_id: Uuid,
    ) -> String {
        if let Some(addr) = self.config.backend_override {
            return addr.to_string();
        }
        format!(
            "{prefix}-{deployment}.{prefix}-{workspace}.{suffix}:{port}",
            prefix = self.config.service_prefix,
            deployment = deployment_id,
            workspace = workspace_id,
            suffix = self.config.domain_suffix,
            port = self.config.backend_port,
        )
    }

    /// Forwards one HTTP request and buffers the backend's response.
    pub async fn forward(
        &self,
        log: &Logger,
        method: Method,
        workspace_id: Uuid,
        deployment_id: Uuid,
        uri: &Uri,
        headers: &HeaderMap,
        body: Option<Vec<u8>>,
    ) -> Result<Response<Body>, Error> {
        let authority = self.backend_authority(workspace_id, deployment_id);
        let target = format!(
            "http://{}{}",
            authority,
            backend_path_and_query(
                uri,
                workspace_id,
                deployment_id,
                PROXY_SEGMENT
            )
        );
        debug!(
            log,
            "forwarding request to backend";
            "method" => %method,
            "target" => %target,
        );

        let mut request = self
            .client
            .request(method, &target)
            .headers(request_headers(headers));
        if let Some(body) = body {
            request = request.body(body);
        }

        let response = match request.send().await {
            Ok(response) => response,
            Err(error) => {
                warn!(
                    log,
                    "backend request failed";
                    "target" => %target,
                    "error" => InlineErrorChain::new(&error),
                );
                return Err(Error::unavail(&format!(
                    "error proxying to backend {}",
                    authority
                )));
            }
        };

        let status = response.status();
        let mut builder = Response::builder().status(status);
        if let Some(headers) = builder.headers_mut() {
            for (name, value) in response.headers() {
                if !is_hop_by_hop(name) {
                    headers.append(name.clone(), value.clone());
                }
            }
        }
        let body = match response.bytes().await {
            Ok(bytes) => bytes,
            Err(error) => {
                warn!(
                    log,
                    "reading backend response failed";
                    "target" => %target,
                    "error" => InlineErrorChain::new(&error),
                );
                return Err(Error::unavail(&format!(
                    "error reading response from backend {}",
                    authority
                )));
            }
        };
        builder.body(body.to_vec().into()).map_err(|error| {
            Error::internal_error(&format!(
                "assembling proxied response: {}",
                error
            ))
        })
    }

    /// Opens a websocket to the backend's corresponding stream path.
    ///
    /// Called before the client's own connection is upgraded so that an
    /// unreachable backend surfaces as an HTTP error rather than an
    /// abrupt close.
    pub async fn connect_websocket(
        &self,
        log: &Logger,
        workspace_id: Uuid,
        deployment_id: Uuid,
        uri: &Uri,
    ) -> Result<WebSocketStream<MaybeTlsStream<TcpStream>>, Error> {
        let authority = self.backend_authority(workspace_id, deployment_id);
        let target = format!(
            "ws://{}{}",
            authority,
            backend_path_and_query(
                uri,
                workspace_id,
                deployment_id,
                STREAM_SEGMENT
            )
        );
        debug!(log, "connecting websocket to backend"; "target" => %target);
        match tokio_tungstenite::connect_async(&target).await {
            Ok((stream, _response)) => Ok(stream),
            Err(error) => {
                warn!(
                    log,
                    "backend websocket connection failed";
                    "target" => %target,
                    "error" => InlineErrorChain::new(&error),
                );
                Err(Error::unavail(&format!(
                    "error connecting to backend {}",
                    authority
                )))
            }
        }
    }
}

/// Rewrites the request path for the backend by stripping the gateway
/// prefix, leaving whatever trails it (including the query string).
///
/// A request for exactly the prefix becomes `/`.
fn backend_path_and_query(
    uri: &Uri,
    workspace_id: Uuid,
    deployment_id: Uuid,
    segment: &str,
) -> String {
    let full = uri.path_and_query().map(|pq| pq.as_str()).unwrap_or("/");
    let marker = format!(
        "/workspaces/{}/deployments/{}/{}",
        workspace_id, deployment_id, segment
    );
    let stripped = full.replacen(&marker, "", 1);
    if stripped.is_empty() || stripped.starts_with('?') {
        format!("/{}", stripped)
    } else {
        stripped
    }
}

/// Copies client request headers for the backend, dropping hop-by-hop
/// headers plus `Host` (rewritten to the backend authority) and
/// `Content-Length` (recomputed for the forwarded body).
fn request_headers(headers: &HeaderMap) -> HeaderMap {
    let mut filtered = HeaderMap::new();
    for (name, value) in headers {
        if is_hop_by_hop(name)
            || name == http::header::HOST
            || name == http::header::CONTENT_LENGTH
        {
            continue;
        }
        filtered.append(name.clone(), value.clone());
    }
    filtered
}

/// Pumps messages between the client's upgraded connection and the
/// backend websocket until either side closes.
///
/// Close frames are forwarded so each side sees the other's close
/// reason.  Read errors tear the relay down without ceremony; the
/// hangup itself tells the peer everything we know.
pub async fn relay_websocket(
    conn: WebsocketConnection,
    backend: WebSocketStream<MaybeTlsStream<TcpStream>>,
    log: Logger,
) -> WebsocketChannelResult {
    let client = WebSocketStream::from_raw_socket(
        conn.into_inner(),
        Role::Server,
        None,
    )
    .await;
    let (mut client_tx, mut client_rx) = client.split();
    let (mut backend_tx, mut backend_rx) = backend.split();

    loop {
        tokio::select! {
            message = client_rx.next() => match message {
                Some(Ok(Message::Close(details))) => {
                    debug!(log, "client closed websocket");
                    backend_tx.send(Message::Close(details)).await?;
                    break;
                }
                Some(Ok(message)) => backend_tx.send(message).await?,
                Some(Err(error)) => {
                    debug!(
                        log,
                        "error reading from client websocket";
                        "error" => InlineErrorChain::new(&error),
                    );
                    break;
                }
                None => break,
            },
            message = backend_rx.next() => match message {
                Some(Ok(Message::Close(details))) => {
                    debug!(log, "backend closed websocket");
                    client_tx.send(Message::Close(details)).await?;
                    break;
                }
                Some(Ok(message)) => client_tx.send(message).await?,
                Some(Err(error)) => {
                    debug!(
                        log,
                        "error reading from backend websocket";
                        "error" => InlineErrorChain::new(&error),
                    );
                    break;
                }
                None => break,
            },
        }
    }
    Ok(())
}

#[cfg(test)]
mod test {
    use super::*;
    use http::HeaderValue;

    fn forwarder(config: ProxyConfig) -> Forwarder {
        Forwarder::new(config).unwrap()
    }

    #[test]
    fn test_backend_authority() {
        let workspace_id: Uuid =
            "11111111-2222-3333-4444-555555555555".parse().unwrap();
        let deployment_id: Uuid =
            "aaaaaaaa-bbbb-cccc-dddd-eeeeeeeeeeee".parse().unwrap();

        let fwd = forwarder(ProxyConfig::default());
        assert_eq!(
            fwd.backend_authority(workspace_id, deployment_id),
            "gw-aaaaaaaa-bbbb-cccc-dddd-eeeeeeeeeeee\
             .gw-11111111-2222-3333-4444-555555555555\
             .svc.cluster.local:80"
        );

        let fwd = forwarder(ProxyConfig {
            service_prefix: "app".to_string(),
            domain_suffix: "internal.example".to_string(),
            backend_port: 8080,
            backend_override: None,
        });
        assert_eq!(
            fwd.backend_authority(workspace_id, deployment_id),
            "app-aaaaaaaa-bbbb-cccc-dddd-eeeeeeeeeeee\
             .app-11111111-2222-3333-4444-555555555555\
             .internal.example:8080"
        );

        // The override wins regardless of the naming scheme.
        let fwd = forwarder(ProxyConfig {
            backend_override: Some("[::1]:12345".parse().unwrap()),
            ..ProxyConfig::default()
        });
        assert_eq!(
            fwd.backend_authority(workspace_id, deployment_id),
            "[::1]:12345"
        );
    }

    #[test]
    fn test_backend_path_rewrite() {
        let workspace_id = Uuid::nil();
        let deployment_id = Uuid::max();
        let prefix = format!(
            "/workspaces/{}/deployments/{}/proxy",
            workspace_id, deployment_id
        );
        let rewrite = |tail: &str| {
            let uri: Uri = format!("{}{}", prefix, tail).parse().unwrap();
            backend_path_and_query(
                &uri,
                workspace_id,
                deployment_id,
                PROXY_SEGMENT,
            )
        };

        assert_eq!(rewrite("/api/items"), "/api/items");
        assert_eq!(rewrite("/api/items?page=2&sort=asc"), "/api/items?page=2&sort=asc");
        // Bare prefix maps to the backend root.
        assert_eq!(rewrite(""), "/");
        assert_eq!(rewrite("/"), "/");
        assert_eq!(rewrite("?watch=true"), "/?watch=true");
        // Only the leading occurrence is stripped.
        assert_eq!(
            rewrite(&format!("/echo{}", prefix)),
            format!("/echo{}", prefix)
        );
    }

    #[test]
    fn test_request_headers_filtered() {
        let mut headers = HeaderMap::new();
        headers.insert(
            http::header::HOST,
            HeaderValue::from_static("gateway.example"),
        );
        headers.insert(
            http::header::CONTENT_LENGTH,
            HeaderValue::from_static("42"),
        );
        headers.insert(
            http::header::CONNECTION,
            HeaderValue::from_static("keep-alive"),
        );
        headers.insert(
            http::header::UPGRADE,
            HeaderValue::from_static("websocket"),
        );
        headers.insert(
            http::header::AUTHORIZATION,
            HeaderValue::from_static("Bearer gangway-spoof-whatever"),
        );
        headers.insert(
            http::header::ACCEPT,
            HeaderValue::from_static("application/json"),
        );
        headers.append(
            "x-custom",
            HeaderValue::from_static("one"),
        );
        headers.append(
            "x-custom",
            HeaderValue::from_static("two"),
        );

        let filtered = request_headers(&headers);
        assert!(!filtered.contains_key(http::header::HOST));
        assert!(!filtered.contains_key(http::header::CONTENT_LENGTH));
        assert!(!filtered.contains_key(http::header::CONNECTION));
        assert!(!filtered.contains_key(http::header::UPGRADE));
        assert_eq!(
            filtered.get(http::header::AUTHORIZATION).unwrap(),
            "Bearer gangway-spoof-whatever"
        );
        assert_eq!(
            filtered.get(http::header::ACCEPT).unwrap(),
            "application/json"
        );
        let customs: Vec<_> = filtered.get_all("x-custom").iter().collect();
        assert_eq!(customs, vec!["one", "two"]);
    }

    #[test]
    fn test_hop_by_hop_set() {
        assert!(is_hop_by_hop(&http::header::TRANSFER_ENCODING));
        assert!(is_hop_by_hop(&HeaderName::from_static("keep-alive")));
        assert!(!is_hop_by_hop(&http::header::CONTENT_TYPE));
        assert!(!is_hop_by_hop(&http::header::AUTHORIZATION));
    }
}
