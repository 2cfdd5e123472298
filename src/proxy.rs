//! Pass-through relay for `/api/*`, so browser clients avoid CORS.

use anyhow::{Context, Result};
use axum::Router;
use axum::body::{Body, to_bytes};
use axum::extract::{Request, State};
use axum::http::{HeaderValue, Method, StatusCode, header};
use axum::response::{IntoResponse, Response};
use axum::routing::any;
use reqwest::Client;
use std::net::SocketAddr;
use tower_http::cors::CorsLayer;

pub const DEFAULT_UPSTREAM: &str = "https://web-production-1b15c.up.railway.app";
pub const DEFAULT_PROXY_PORT: u16 = 8765;

#[derive(Clone)]
struct ProxyState {
    client: Client,
    upstream: String,
}

/// Build the relay router forwarding to `upstream`.
pub fn router(upstream: &str) -> Result<Router> {
    let client = Client::builder()
        .build()
        .context("Failed to create HTTP client")?;
    let state = ProxyState {
        client,
        upstream: upstream.trim_end_matches('/').to_string(),
    };

    Ok(Router::new()
        .route("/api/{*path}", any(forward))
        .with_state(state)
        .layer(CorsLayer::permissive()))
}

/// Listen on `port` until Ctrl-C.
pub async fn serve(upstream: &str, port: u16) -> Result<()> {
    let app = router(upstream)?;
    let addr = SocketAddr::from(([127, 0, 0, 1], port));
    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .with_context(|| format!("Failed to bind {}", addr))?;

    tracing::info!(%addr, %upstream, "proxy listening");
    axum::serve(listener, app)
        .with_graceful_shutdown(async {
            if let Err(e) = tokio::signal::ctrl_c().await {
                tracing::error!(error = %e, "failed to listen for shutdown signal");
            }
        })
        .await
        .context("Proxy server failed")?;
    tracing::info!("proxy stopped");
    Ok(())
}

async fn forward(State(state): State<ProxyState>, request: Request) -> Response {
    let path_and_query = request
        .uri()
        .path_and_query()
        .map(|pq| pq.as_str().to_string())
        .unwrap_or_else(|| "/".to_string());
    let url = format!("{}{}", state.upstream, path_and_query);

    let (parts, body) = request.into_parts();
    let mut headers = parts.headers;
    headers.remove(header::HOST);
    headers.remove(header::CONTENT_LENGTH);

    let mut outbound = state.client.request(parts.method.clone(), &url).headers(headers);
    if parts.method != Method::GET && parts.method != Method::HEAD {
        match to_bytes(body, usize::MAX).await {
            Ok(bytes) => outbound = outbound.body(bytes),
            Err(e) => return proxy_error(e),
        }
    }

    tracing::debug!(method = %parts.method, %url, "forwarding");
    let upstream = match outbound.send().await {
        Ok(response) => response,
        Err(e) => return proxy_error(e),
    };

    let status = upstream.status();
    let mut headers = upstream.headers().clone();
    headers.remove(header::TRANSFER_ENCODING);
    headers.remove(header::CONNECTION);
    headers.remove(header::CONTENT_LENGTH);

    match upstream.bytes().await {
        Ok(bytes) => {
            let mut response = Response::new(Body::from(bytes));
            *response.status_mut() = status;
            *response.headers_mut() = headers;
            response
        }
        Err(e) => proxy_error(e),
    }
}

fn proxy_error(error: impl std::fmt::Display) -> Response {
    tracing::warn!(%error, "upstream request failed");
    (
        StatusCode::BAD_GATEWAY,
        [(header::CONTENT_TYPE, HeaderValue::from_static("text/plain"))],
        format!("Proxy error: {}", error),
    )
        .into_response()
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::Json;
    use serde_json::{Value, json};

    async fn spawn(router: Router) -> String {
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            axum::serve(listener, router).await.unwrap();
        });
        format!("http://{}", addr)
    }

    async fn echo(request: Request) -> Json<Value> {
        let (parts, body) = request.into_parts();
        let header = |name: &str| {
            parts
                .headers
                .get(name)
                .and_then(|v| v.to_str().ok())
                .map(str::to_string)
        };
        let body = to_bytes(body, usize::MAX).await.unwrap();
        Json(json!({
            "method": parts.method.as_str(),
            "uri": parts.uri.to_string(),
            "host": header("host"),
            "x_test": header("x-test"),
            "body": String::from_utf8_lossy(&body),
        }))
    }

    #[tokio::test]
    async fn test_forwards_path_query_and_body() {
        let upstream = spawn(Router::new().fallback(echo)).await;
        let proxy = spawn(router(&upstream).unwrap()).await;

        let response = Client::new()
            .post(format!("{}/api/price-performance?symbols=AAPL%2CMSFT", proxy))
            .header("x-test", "1")
            .header("origin", "http://localhost:3000")
            .body("payload")
            .send()
            .await
            .unwrap();

        assert_eq!(response.status(), 200);
        assert_eq!(
            response.headers().get("access-control-allow-origin").unwrap(),
            "*"
        );
        let echoed: Value = response.json().await.unwrap();
        assert_eq!(echoed["method"], "POST");
        assert_eq!(echoed["uri"], "/api/price-performance?symbols=AAPL%2CMSFT");
        assert_eq!(echoed["x_test"], "1");
        assert_eq!(echoed["body"], "payload");
        // The client's Host was dropped; the relay's own request names the upstream.
        assert_eq!(echoed["host"], upstream.trim_start_matches("http://"));
    }

    #[tokio::test]
    async fn test_passes_upstream_status_through() {
        let upstream = spawn(Router::new().fallback(|| async { (StatusCode::NOT_FOUND, "nope") })).await;
        let proxy = spawn(router(&upstream).unwrap()).await;

        let response = Client::new()
            .get(format!("{}/api/dashboard", proxy))
            .send()
            .await
            .unwrap();
        assert_eq!(response.status(), 404);
        assert_eq!(response.text().await.unwrap(), "nope");
    }

    #[tokio::test]
    async fn test_unreachable_upstream_is_bad_gateway() {
        let proxy = spawn(router("http://127.0.0.1:9").unwrap()).await;

        let response = Client::new()
            .get(format!("{}/api/dashboard", proxy))
            .send()
            .await
            .unwrap();
        assert_eq!(response.status(), 502);
        assert_eq!(response.headers().get("content-type").unwrap(), "text/plain");
        assert!(response.text().await.unwrap().starts_with("Proxy error:"));
    }
}
