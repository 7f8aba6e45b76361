use serde::{Deserialize, Serialize};

/// Speaker of a log entry. The set is closed; anything else on the wire is
/// rejected while decoding.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    System,
    Question,
    User,
    Advice,
}

impl Role {
    pub fn as_str(self) -> &'static str {
        match self {
            Role::System => "system",
            Role::Question => "question",
            Role::User => "user",
            Role::Advice => "advice",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Message {
    pub role: Role,
    pub content: String,
    pub streaming: bool,
}

impl Message {
    pub fn finalized(role: Role, content: impl Into<String>) -> Self {
        Self {
            role,
            content: content.into(),
            streaming: false,
        }
    }
}

/// One frame pushed by the consultation server.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
pub struct InboundEvent {
    #[serde(rename = "type")]
    pub role: Role,
    pub content: String,
    #[serde(rename = "isTyping", default)]
    pub streaming: bool,
}

impl InboundEvent {
    pub fn new(role: Role, content: impl Into<String>, streaming: bool) -> Self {
        Self {
            role,
            content: content.into(),
            streaming,
        }
    }
}

/// Requests sent to the server, encoded as `{"symptom": ..}` or `{"answer": ..}`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OutboundMessage {
    Symptom(String),
    Answer(String),
}
