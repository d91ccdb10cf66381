use std::fmt;

/// Opaque identifier for a message in a conversation log.
#[derive(Clone, Copy, Debug, Eq, PartialEq, Hash, serde::Serialize, serde::Deserialize)]
pub struct MessageId(pub uuid::Uuid);

impl MessageId {
    /// Generates a fresh random identifier.
    pub fn new() -> Self {
        Self(uuid::Uuid::new_v4())
    }
}

impl Default for MessageId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for MessageId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

/// Author of a message.
#[derive(Clone, Copy, Debug, Eq, PartialEq, Hash, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    User,
    Assistant,
    System,
}

impl Role {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::User => "user",
            Self::Assistant => "assistant",
            Self::System => "system",
        }
    }
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A single entry of the conversation log.
#[derive(Clone, Debug, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub struct Message {
    pub id: MessageId,
    pub role: Role,
    pub content: String,
}

impl Message {
    /// Creates a message with a freshly generated id.
    pub fn new(role: Role, content: impl Into<String>) -> Self {
        Self {
            id: MessageId::new(),
            role,
            content: content.into(),
        }
    }

    pub fn user(content: impl Into<String>) -> Self {
        Self::new(Role::User, content)
    }

    pub fn system(content: impl Into<String>) -> Self {
        Self::new(Role::System, content)
    }

    /// Creates the empty assistant entry that streamed content is appended to.
    pub fn assistant_placeholder(id: MessageId) -> Self {
        Self {
            id,
            role: Role::Assistant,
            content: String::new(),
        }
    }
}

/// Ordered conversation log.
///
/// Messages keep their insertion order. The only mutation after insertion is
/// appending text to an existing entry.
#[derive(Clone, Debug, Default, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub struct Conversation {
    messages: Vec<Message>,
}

impl Conversation {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, message: Message) {
        self.messages.push(message);
    }

    /// Appends `text` to the content of the message with `id`.
    ///
    /// Returns `false` when no such message exists.
    pub fn append(&mut self, id: MessageId, text: &str) -> bool {
        match self.messages.iter_mut().find(|m| m.id == id) {
            Some(message) => {
                message.content.push_str(text);
                true
            }
            None => false,
        }
    }

    pub fn get(&self, id: MessageId) -> Option<&Message> {
        self.messages.iter().find(|m| m.id == id)
    }

    pub fn messages(&self) -> &[Message] {
        &self.messages
    }

    pub fn len(&self) -> usize {
        self.messages.len()
    }

    pub fn is_empty(&self) -> bool {
        self.messages.is_empty()
    }

    /// Drops every message, e.g. when the user starts a new chat.
    pub fn clear(&mut self) {
        self.messages.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn append_is_pure_and_preserves_whitespace() {
        let mut log = Conversation::new();
        let id = MessageId::new();
        log.push(Message::user("hi"));
        log.push(Message::assistant_placeholder(id));

        assert!(log.append(id, "  Hel"));
        assert!(log.append(id, "lo\n\t"));
        assert!(log.append(id, ""));

        assert_eq!(log.get(id).map(|m| m.content.as_str()), Some("  Hello\n\t"));
        assert_eq!(log.messages()[0].content, "hi");
    }

    #[test]
    fn append_to_unknown_id_reports_missing() {
        let mut log = Conversation::new();
        log.push(Message::user("hi"));
        assert!(!log.append(MessageId::new(), "x"));
        assert_eq!(log.messages()[0].content, "hi");
    }

    #[test]
    fn insertion_order_is_kept() {
        let mut log = Conversation::new();
        let a = Message::user("a");
        let b = Message::assistant_placeholder(MessageId::new());
        let c = Message::user("c");
        log.push(a.clone());
        log.push(b.clone());
        log.push(c.clone());
        let ids: Vec<_> = log.messages().iter().map(|m| m.id).collect();
        assert_eq!(ids, vec![a.id, b.id, c.id]);
    }

    #[test]
    fn role_serializes_lowercase() {
        assert_eq!(
            serde_json::to_value(Role::Assistant).expect("serialize"),
            serde_json::json!("assistant")
        );
    }
}
