//! Exported WhatsApp chat transcripts into conversation-pair documents.

use once_cell::sync::Lazy;
use regex::Regex;

use ppid_core::models::{RawDocument, SourceType};

// Matches both "[29/01/24 10.30.12] Name: text" and "29/01/24, 10.30 - Name: text",
// with optional AM/PM. The timestamp is anchored so it never leaks into the sender.
static HEADER: Lazy<Regex> = Lazy::new(|| {
    Regex::new(
        r"^\[?\d{1,4}[/.\-]\d{1,2}[/.\-]\d{1,4},?\s+\d{1,2}[.:]\d{2}(?:[.:]\d{2})?(?:\s?[AaPp]\.?[Mm]\.?)?\]?\s*(?:-\s*)?([^:]+?): (.*)$",
    )
    .expect("valid header regex")
});

const ENCRYPTION_NOTICE: &str = "Messages and calls are end-to-end encrypted";

#[derive(Debug, Clone, PartialEq)]
pub struct ChatMessage {
    pub sender: String,
    pub text: String,
}

/// Line-oriented parse: a header line starts a message, any other
/// non-blank line continues the current one.
pub fn parse_messages(content: &str) -> Vec<ChatMessage> {
    let mut messages = Vec::new();
    let mut current: Option<(String, Vec<String>)> = None;

    for line in content.lines() {
        if let Some(caps) = HEADER.captures(line) {
            if let Some((sender, lines)) = current.take() {
                messages.push(ChatMessage {
                    sender,
                    text: lines.join("\n"),
                });
            }
            let sender = caps.get(1).map(|m| m.as_str().trim()).unwrap_or_default();
            let text = caps.get(2).map(|m| m.as_str().trim()).unwrap_or_default();
            current = Some((sender.to_string(), vec![text.to_string()]));
        } else if let Some((_, lines)) = current.as_mut() {
            let trimmed = line.trim();
            if !trimmed.is_empty() {
                lines.push(trimmed.to_string());
            }
        }
    }

    if let Some((sender, lines)) = current {
        messages.push(ChatMessage {
            sender,
            text: lines.join("\n"),
        });
    }

    messages
}

/// One `chat-history` document per adjacent pair of messages from
/// different senders. A transcript with no recognisable messages yields
/// nothing and is logged, not treated as an error.
pub fn parse_chat(content: &str, source_id: &str) -> Vec<RawDocument> {
    let messages = parse_messages(content);
    if messages.is_empty() {
        tracing::warn!(source = source_id, "No messages parsed, format might be unsupported");
        return Vec::new();
    }

    let docs: Vec<RawDocument> = messages
        .windows(2)
        .filter(|pair| !pair[0].text.contains(ENCRYPTION_NOTICE))
        .filter(|pair| pair[0].sender != pair[1].sender)
        .map(|pair| RawDocument {
            content: format!("User: {}\nAssistant: {}", pair[0].text, pair[1].text),
            source_id: source_id.to_string(),
            source_type: SourceType::ChatHistory,
        })
        .collect();

    tracing::info!(source = source_id, pairs = docs.len(), "Parsed conversation pairs");
    docs
}
