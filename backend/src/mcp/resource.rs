//! Inline remote files into tool results.

use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use reqwest::header::CONTENT_TYPE;
use toolmux_types::ResourceContent;
use tracing::debug;

const DEFAULT_MIME_TYPE: &str = "application/octet-stream";

#[derive(Debug, thiserror::Error)]
pub enum ResourceError {
    #[error("failed to fetch resource: {0}")]
    Request(#[from] reqwest::Error),

    #[error("resource request returned HTTP {status}")]
    Status { status: u16 },
}

/// Download `url` and return it as a data URL resource named `uri`.
///
/// `url` is typically a short-lived signed link; `uri` is the stable name
/// the client sees.
pub async fn fetch_resource(
    client: &reqwest::Client,
    url: &str,
    uri: &str,
) -> Result<ResourceContent, ResourceError> {
    let response = client.get(url).send().await?;
    let status = response.status();
    if !status.is_success() {
        return Err(ResourceError::Status {
            status: status.as_u16(),
        });
    }

    let mime_type = response
        .headers()
        .get(CONTENT_TYPE)
        .and_then(|v| v.to_str().ok())
        .unwrap_or(DEFAULT_MIME_TYPE)
        .to_string();
    let bytes = response.bytes().await?;
    debug!("Fetched resource {} ({} bytes, {})", uri, bytes.len(), mime_type);

    Ok(ResourceContent {
        uri: uri.to_string(),
        data: format!("data:{};base64,{}", mime_type, STANDARD.encode(&bytes)),
        mime_type,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::{http::StatusCode, routing::get, Router};

    async fn serve(router: Router) -> String {
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            axum::serve(listener, router).await.unwrap();
        });
        format!("http://{}", addr)
    }

    #[tokio::test]
    async fn fetches_as_data_url() {
        let base = serve(Router::new().route(
            "/file",
            get(|| async { ([("content-type", "text/plain")], "hi") }),
        ))
        .await;

        let url = format!("{}/file", base);
        let resource = fetch_resource(&reqwest::Client::new(), &url, "file:///notes.txt")
            .await
            .unwrap();
        assert_eq!(resource.uri, "file:///notes.txt");
        assert_eq!(resource.mime_type, "text/plain");
        assert_eq!(resource.data, "data:text/plain;base64,aGk=");
    }

    #[tokio::test]
    async fn error_status_is_reported() {
        let base = serve(Router::new().route(
            "/missing",
            get(|| async { StatusCode::NOT_FOUND }),
        ))
        .await;

        let err = fetch_resource(&reqwest::Client::new(), &format!("{}/missing", base), "x")
            .await
            .unwrap_err();
        assert!(matches!(err, ResourceError::Status { status: 404 }));
    }
}
