use async_trait::async_trait;
use serde_json::{json, Value};
use toolmux_types::ToolResponse;

use crate::auth::CallContext;
use crate::mcp::resource::fetch_resource;
use crate::mcp::tools::object_schema;
use crate::mcp::{Emitter, Tool};

/// Downloads a file and returns it as an embedded resource.
#[derive(Default)]
pub struct Fetch {
    client: reqwest::Client,
}

impl Fetch {
    pub fn new(client: reqwest::Client) -> Self {
        Self { client }
    }
}

#[async_trait]
impl Tool for Fetch {
    fn name(&self) -> &str {
        "fetch"
    }

    fn description(&self) -> &str {
        "Download an http(s) URL and return its content as an embedded resource"
    }

    fn input_schema(&self) -> Value {
        object_schema(
            json!({
                "url": { "type": "string", "description": "Location to download" },
                "uri": {
                    "type": "string",
                    "description": "Name shown to the client (defaults to url)"
                }
            }),
            &["url"],
        )
    }

    async fn handle(
        &self,
        input: Value,
        _context: &CallContext,
        emit: &Emitter,
    ) -> anyhow::Result<ToolResponse> {
        let url = input
            .get("url")
            .and_then(Value::as_str)
            .ok_or_else(|| anyhow::anyhow!("url is required"))?;
        let parsed = reqwest::Url::parse(url)?;
        if !matches!(parsed.scheme(), "http" | "https") {
            anyhow::bail!("unsupported URL scheme: {}", parsed.scheme());
        }
        let uri = input.get("uri").and_then(Value::as_str).unwrap_or(url);

        emit.emit(format!("Fetching {}", uri), toolmux_types::LogLevel::Info);
        let resource = fetch_resource(&self.client, url, uri).await?;
        Ok(ToolResponse::default().with_resource(resource))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::{routing::get, Router};
    use toolmux_types::{ContentBlock, EmbeddedResource};

    #[tokio::test]
    async fn returns_resource_block() {
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let router = Router::new().route(
            "/report.csv",
            get(|| async { ([("content-type", "text/csv")], "a,b") }),
        );
        tokio::spawn(async move {
            axum::serve(listener, router).await.unwrap();
        });

        let url = format!("http://{}/report.csv", addr);
        let response = Fetch::default()
            .handle(
                json!({"url": url, "uri": "file:///report.csv"}),
                &CallContext::anonymous(),
                &Emitter::detached(),
            )
            .await
            .unwrap();

        assert_eq!(
            response.into_content(),
            vec![ContentBlock::Resource {
                resource: EmbeddedResource {
                    uri: "file:///report.csv".into(),
                    mime_type: "text/csv".into(),
                    blob: "data:text/csv;base64,YSxi".into(),
                },
            }]
        );
    }

    #[tokio::test]
    async fn refuses_non_http_urls() {
        let err = Fetch::default()
            .handle(
                json!({"url": "file:///etc/passwd"}),
                &CallContext::anonymous(),
                &Emitter::detached(),
            )
            .await
            .unwrap_err();
        assert!(err.to_string().contains("file"));
    }
}
