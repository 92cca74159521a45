//! Message and turn domain types.
//!
//! A [`Message`] is the value object that flows through the whole system:
//! the user sends one, memory stores it, the agent renders it into a
//! provider-facing [`Turn`], and the model's reply comes back as another one.

use base64::Engine;
use base64::engine::general_purpose::STANDARD as BASE64;
use serde::{Deserialize, Serialize};

/// Who authored a message from the conversation's point of view.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RoleType {
    /// The AI assistant
    Assistant,
    /// The end user
    User,
}

impl std::fmt::Display for RoleType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Assistant => write!(f, "assistant"),
            Self::User => write!(f, "user"),
        }
    }
}

/// The provider-facing classification of a stored message.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BackendRole {
    System,
    User,
    Assistant,
    /// Tool execution result
    Function,
}

/// How much resolution the model should spend on an attached image.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ImageDetail {
    #[default]
    Auto,
    Low,
    High,
}

/// An encoded image attached to a message.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Image {
    /// MIME type, e.g. `image/png`
    pub media_type: String,

    /// Raw encoded bytes (PNG, JPEG, ...)
    #[serde(with = "base64_bytes")]
    pub data: Vec<u8>,
}

impl Image {
    pub fn new(media_type: impl Into<String>, data: Vec<u8>) -> Self {
        Self {
            media_type: media_type.into(),
            data,
        }
    }

    pub fn png(data: Vec<u8>) -> Self {
        Self::new("image/png", data)
    }

    /// Render as a `data:` URL.
    pub fn to_data_url(&self) -> String {
        format!("data:{};base64,{}", self.media_type, BASE64.encode(&self.data))
    }
}

mod base64_bytes {
    use base64::Engine;
    use base64::engine::general_purpose::STANDARD as BASE64;
    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(bytes: &[u8], serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&BASE64.encode(bytes))
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Vec<u8>, D::Error> {
        let encoded = String::deserialize(deserializer)?;
        BASE64.decode(encoded).map_err(serde::de::Error::custom)
    }
}

/// A function call carried by a message.
///
/// On an assistant message this is the model's request (`result` is `None`);
/// on a function message it also carries the tool's output.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FunctionCallPayload {
    pub name: String,
    pub arguments: serde_json::Map<String, serde_json::Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub result: Option<serde_json::Value>,
}

/// A single message in a conversation. Immutable once built.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Message {
    role_name: String,
    role_type: RoleType,
    content: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    meta_dict: Option<serde_json::Map<String, serde_json::Value>>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    image_list: Vec<Image>,
    #[serde(default)]
    image_detail: ImageDetail,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    function_call: Option<FunctionCallPayload>,
}

impl Message {
    pub fn new(role_name: impl Into<String>, role_type: RoleType, content: impl Into<String>) -> Self {
        Self {
            role_name: role_name.into(),
            role_type,
            content: content.into(),
            meta_dict: None,
            image_list: Vec::new(),
            image_detail: ImageDetail::default(),
            function_call: None,
        }
    }

    /// Create a new user message.
    pub fn user(role_name: impl Into<String>, content: impl Into<String>) -> Self {
        Self::new(role_name, RoleType::User, content)
    }

    /// Create a new assistant message.
    pub fn assistant(role_name: impl Into<String>, content: impl Into<String>) -> Self {
        Self::new(role_name, RoleType::Assistant, content)
    }

    pub fn with_meta(mut self, meta: serde_json::Map<String, serde_json::Value>) -> Self {
        self.meta_dict = Some(meta);
        self
    }

    pub fn with_images(mut self, images: Vec<Image>, detail: ImageDetail) -> Self {
        self.image_list = images;
        self.image_detail = detail;
        self
    }

    pub fn with_function_call(mut self, payload: FunctionCallPayload) -> Self {
        self.function_call = Some(payload);
        self
    }

    /// A copy of this message with different content; everything else is kept.
    pub fn with_content(&self, content: impl Into<String>) -> Self {
        Self {
            content: content.into(),
            ..self.clone()
        }
    }

    pub fn role_name(&self) -> &str {
        &self.role_name
    }

    pub fn role_type(&self) -> RoleType {
        self.role_type
    }

    pub fn content(&self) -> &str {
        &self.content
    }

    pub fn meta_dict(&self) -> Option<&serde_json::Map<String, serde_json::Value>> {
        self.meta_dict.as_ref()
    }

    pub fn image_list(&self) -> &[Image] {
        &self.image_list
    }

    pub fn image_detail(&self) -> ImageDetail {
        self.image_detail
    }

    pub fn function_call(&self) -> Option<&FunctionCallPayload> {
        self.function_call.as_ref()
    }

    /// Render this message as a provider-facing turn for the given backend role.
    pub fn to_turn(&self, role: BackendRole) -> Turn {
        match role {
            BackendRole::System => Turn::text(role, &self.content),
            BackendRole::User => {
                if self.image_list.is_empty() {
                    return Turn::text(role, &self.content);
                }
                let mut parts = vec![ContentPart::Text {
                    text: self.content.clone(),
                }];
                parts.extend(self.image_list.iter().map(|image| ContentPart::ImageUrl {
                    image_url: ImageUrl {
                        url: image.to_data_url(),
                        detail: self.image_detail,
                    },
                }));
                Turn {
                    role,
                    name: None,
                    content: TurnContent::Parts(parts),
                    function_call: None,
                }
            }
            BackendRole::Assistant => match &self.function_call {
                Some(call) => Turn {
                    role,
                    name: None,
                    content: TurnContent::Text(self.content.clone()),
                    function_call: Some(TurnFunctionCall {
                        name: call.name.clone(),
                        arguments: serde_json::Value::Object(call.arguments.clone()).to_string(),
                    }),
                },
                None => Turn::text(role, &self.content),
            },
            BackendRole::Function => match &self.function_call {
                Some(call) => Turn {
                    role,
                    name: Some(call.name.clone()),
                    content: TurnContent::Text(
                        call.result.as_ref().map(value_to_text).unwrap_or_default(),
                    ),
                    function_call: None,
                },
                None => Turn::text(role, &self.content),
            },
        }
    }
}

/// Plain strings render without JSON quoting.
fn value_to_text(value: &serde_json::Value) -> String {
    match value {
        serde_json::Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

/// One rendered message unit as sent to the model.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Turn {
    pub role: BackendRole,

    /// Function name, only on function-result turns
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,

    pub content: TurnContent,

    /// Function call requested by the assistant
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub function_call: Option<TurnFunctionCall>,
}

impl Turn {
    fn text(role: BackendRole, content: &str) -> Self {
        Self {
            role,
            name: None,
            content: TurnContent::Text(content.to_string()),
            function_call: None,
        }
    }

    /// All textual content of the turn, for token counting.
    pub fn text_content(&self) -> String {
        let mut text = match &self.content {
            TurnContent::Text(s) => s.clone(),
            TurnContent::Parts(parts) => parts
                .iter()
                .filter_map(|p| match p {
                    ContentPart::Text { text } => Some(text.as_str()),
                    ContentPart::ImageUrl { .. } => None,
                })
                .collect::<Vec<_>>()
                .join("\n"),
        };
        if let Some(call) = &self.function_call {
            text.push_str(&call.name);
            text.push_str(&call.arguments);
        }
        text
    }

    /// Number of image parts in the turn.
    pub fn image_count(&self) -> usize {
        match &self.content {
            TurnContent::Text(_) => 0,
            TurnContent::Parts(parts) => parts
                .iter()
                .filter(|p| matches!(p, ContentPart::ImageUrl { .. }))
                .count(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum TurnContent {
    Text(String),
    Parts(Vec<ContentPart>),
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ContentPart {
    Text { text: String },
    ImageUrl { image_url: ImageUrl },
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ImageUrl {
    pub url: String,
    pub detail: ImageDetail,
}

/// A rendered function call; arguments are a JSON string as on the wire.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TurnFunctionCall {
    pub name: String,
    pub arguments: String,
}
