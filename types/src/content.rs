//! Tool results: the structured response a handler produces and the
//! content blocks that go on the wire.

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// One block of a `tools/call` result.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum ContentBlock {
    Text {
        text: String,
    },
    Image {
        data: String,
        #[serde(rename = "mimeType")]
        mime_type: String,
    },
    Resource {
        resource: EmbeddedResource,
    },
}

impl ContentBlock {
    pub fn text(text: impl Into<String>) -> Self {
        ContentBlock::Text { text: text.into() }
    }

    /// The text of a text block.
    pub fn as_text(&self) -> Option<&str> {
        match self {
            ContentBlock::Text { text } => Some(text),
            _ => None,
        }
    }
}

/// A resource embedded in a result block.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct EmbeddedResource {
    pub uri: String,
    #[serde(rename = "mimeType")]
    pub mime_type: String,
    pub blob: String,
}

/// Result of a `tools/call` invocation.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct CallToolResult {
    pub content: Vec<ContentBlock>,
    #[serde(rename = "isError", default, skip_serializing_if = "std::ops::Not::not")]
    pub is_error: bool,
}

impl CallToolResult {
    pub fn success(content: Vec<ContentBlock>) -> Self {
        Self {
            content,
            is_error: false,
        }
    }

    /// A handler failure: a single text block carrying the message.
    pub fn error_text(message: impl Into<String>) -> Self {
        Self {
            content: vec![ContentBlock::text(message)],
            is_error: true,
        }
    }
}

// ============================================================================
// Handler output
// ============================================================================

/// Base64-encoded inline image.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ImageContent {
    pub data: String,
    #[serde(rename = "mimeType")]
    pub mime_type: String,
}

/// Reference to an external resource, with its payload base64-encoded.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ResourceContent {
    pub uri: String,
    #[serde(rename = "mimeType")]
    pub mime_type: String,
    pub data: String,
}

/// What a tool handler returns. Each variant is independent; any
/// combination may be present.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct ToolResponse {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub json: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub text: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub image: Option<ImageContent>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub resource: Option<ResourceContent>,
}

impl ToolResponse {
    pub fn json(value: Value) -> Self {
        Self {
            json: Some(value),
            ..Self::default()
        }
    }

    pub fn text(text: impl Into<String>) -> Self {
        Self {
            text: Some(text.into()),
            ..Self::default()
        }
    }

    pub fn with_text(mut self, text: impl Into<String>) -> Self {
        self.text = Some(text.into());
        self
    }

    pub fn with_image(mut self, image: ImageContent) -> Self {
        self.image = Some(image);
        self
    }

    pub fn with_resource(mut self, resource: ResourceContent) -> Self {
        self.resource = Some(resource);
        self
    }

    /// Normalize into content blocks, always in the order
    /// JSON, text, image, resource.
    pub fn into_content(self) -> Vec<ContentBlock> {
        let mut content = Vec::new();
        if let Some(json) = self.json {
            content.push(ContentBlock::text(json.to_string()));
        }
        if let Some(text) = self.text {
            content.push(ContentBlock::Text { text });
        }
        if let Some(image) = self.image {
            content.push(ContentBlock::Image {
                data: image.data,
                mime_type: image.mime_type,
            });
        }
        if let Some(resource) = self.resource {
            content.push(ContentBlock::Resource {
                resource: EmbeddedResource {
                    uri: resource.uri,
                    mime_type: resource.mime_type,
                    blob: resource.data,
                },
            });
        }
        content
    }
}
