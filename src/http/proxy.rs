//! Reverse proxy for every path outside the gateway route.
//!
//! Forwards method, headers, body, path and query to the backend base URL.
//! No retries; an unreachable backend yields 502.

use std::time::Instant;

use axum::{
    body::Body,
    extract::State,
    http::{header, Request, StatusCode, Uri, Version},
    response::{IntoResponse, Response},
};
use url::{Position, Url};

use crate::http::server::AppState;
use crate::observability::metrics;

pub async fn proxy_handler(State(state): State<AppState>, request: Request<Body>) -> Response {
    let started = Instant::now();
    let (mut parts, body) = request.into_parts();

    let uri = match upstream_uri(state.backend.base_url(), &parts.uri) {
        Some(uri) => uri,
        None => {
            tracing::warn!(uri = %parts.uri, "Cannot map request onto backend URL");
            metrics::record_proxy_request(StatusCode::BAD_GATEWAY.as_u16(), started);
            return (StatusCode::BAD_GATEWAY, "Upstream request failed").into_response();
        }
    };

    tracing::debug!(method = %parts.method, upstream = %uri, "Proxying request");
    parts.uri = uri;
    parts.version = Version::HTTP_11;
    parts.headers.remove(header::HOST);

    match state
        .proxy_client
        .request(Request::from_parts(parts, body))
        .await
    {
        Ok(response) => {
            metrics::record_proxy_request(response.status().as_u16(), started);
            let (parts, body) = response.into_parts();
            Response::from_parts(parts, Body::new(body))
        }
        Err(e) => {
            tracing::error!(error = %e, "Upstream error");
            metrics::record_proxy_request(StatusCode::BAD_GATEWAY.as_u16(), started);
            (StatusCode::BAD_GATEWAY, "Upstream request failed").into_response()
        }
    }
}

/// Rebase the request's path and query onto `base`, keeping any base path prefix.
fn upstream_uri(base: &Url, original: &Uri) -> Option<Uri> {
    let origin = &base[..Position::BeforePath];
    let prefix = base.path().trim_end_matches('/');
    let path_and_query = original
        .path_and_query()
        .map(|pq| pq.as_str())
        .unwrap_or("/");
    format!("{}{}{}", origin, prefix, path_and_query).parse().ok()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn rebase(base: &str, uri: &str) -> String {
        upstream_uri(&Url::parse(base).unwrap(), &uri.parse().unwrap())
            .unwrap()
            .to_string()
    }

    #[test]
    fn keeps_path_and_query() {
        assert_eq!(
            rebase("http://localhost:8000", "/api/cameras?limit=5"),
            "http://localhost:8000/api/cameras?limit=5"
        );
    }

    #[test]
    fn keeps_base_prefix() {
        assert_eq!(
            rebase("http://backend:8080/video/", "/live/list"),
            "http://backend:8080/video/live/list"
        );
    }

    #[test]
    fn root_request() {
        assert_eq!(rebase("http://localhost:8000", "/"), "http://localhost:8000/");
    }
}
