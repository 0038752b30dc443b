// Copyright (c) 2025 Leonard Contributors
// Licensed under the MIT License. See LICENSE file for details.

//! Streaming chat consumption and the conversation turn log.
//!
//! [`ChatStream`] turns one server-sent event stream into an ordered
//! sequence of text fragments. [`Conversation`] owns the append-only turn
//! list and implements the placeholder contract for streamed replies: a
//! placeholder assistant turn is materialized before any fragment arrives,
//! grown in place as fragments come in, and removed wholesale if the stream
//! fails so no partial assistant turn stays visible.
//!
//! A stream is not restartable; a fresh call always opens a new exchange
//! from the beginning.

use chrono::{DateTime, Utc};
use futures_util::StreamExt;
use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;
use tokio_stream::wrappers::ReceiverStream;

use crate::api::{ApiClient, ApiError};

/// Reserved payload marking end-of-stream. Never emitted as content.
const DONE_SENTINEL: &str = "[DONE]";

/// Buffer depth for the fragment channel. Frames are small; this only
/// smooths bursts between the reader task and the consumer.
const FRAGMENT_CHANNEL_CAPACITY: usize = 64;

/// Role of a conversation turn.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TurnRole {
    User,
    Assistant,
}

impl TurnRole {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::User => "user",
            Self::Assistant => "assistant",
        }
    }
}

/// One turn in a conversation. Ordering is append-only and owned by the
/// [`Conversation`]; turns are never reordered.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConversationTurn {
    /// Locally assigned identifier, unique within the conversation.
    pub id: String,
    pub role: TurnRole,
    pub content: String,
    /// Which model produced the reply, when the backend reports it.
    pub model_used: Option<String>,
    pub model_name: Option<String>,
    pub routing_reason: Option<String>,
    pub created_at: DateTime<Utc>,
}

impl ConversationTurn {
    fn new(id: String, role: TurnRole, content: impl Into<String>) -> Self {
        Self {
            id,
            role,
            content: content.into(),
            model_used: None,
            model_name: None,
            routing_reason: None,
            created_at: Utc::now(),
        }
    }
}

/// Parsed event-stream frames.
#[derive(Debug, PartialEq)]
enum Frame {
    /// A text fragment, delivered verbatim.
    Data(String),
    /// The end-of-stream sentinel.
    Done,
}

/// Incremental parser for `data: <payload>` frames.
///
/// Network chunks do not align with frame boundaries, so raw bytes are
/// buffered and complete lines extracted as they form. Lines without the
/// `data:` prefix are ignored.
#[derive(Debug, Default)]
struct FrameParser {
    buffer: String,
}

impl FrameParser {
    fn push(&mut self, chunk: &str) -> Vec<Frame> {
        self.buffer.push_str(chunk);
        let mut frames = Vec::new();

        while let Some(pos) = self.buffer.find('\n') {
            let line: String = self.buffer.drain(..=pos).collect();
            let line = line.trim_end_matches(['\n', '\r']);
            if line.is_empty() {
                continue;
            }
            let payload = match line.strip_prefix("data: ") {
                Some(payload) => payload,
                None => match line.strip_prefix("data:") {
                    Some(payload) => payload,
                    None => continue,
                },
            };
            if payload == DONE_SENTINEL {
                frames.push(Frame::Done);
            } else {
                frames.push(Frame::Data(payload.to_string()));
            }
        }

        frames
    }
}

/// A live sequence of text fragments for one chat exchange.
///
/// Fragments arrive in server order; the sequence terminates either on the
/// end-of-stream sentinel, on a clean connection close after a well-formed
/// frame, or with one terminal error item. Fragments already delivered are
/// never retracted.
#[derive(Debug)]
pub struct ChatStream {
    rx: mpsc::Receiver<Result<String, ApiError>>,
}

impl ChatStream {
    /// Open a streaming chat exchange.
    ///
    /// A connection failure before any frame is read is reported here as
    /// `BackendUnreachable`; later transport failures surface as the final
    /// item of the sequence.
    pub async fn open(
        client: &ApiClient,
        message: &str,
        conversation_id: Option<&str>,
    ) -> Result<Self, ApiError> {
        let response = client.open_chat_stream(message, conversation_id).await?;
        let monitor = client.monitor();
        let (tx, rx) = mpsc::channel(FRAGMENT_CHANNEL_CAPACITY);

        tokio::spawn(async move {
            let mut body = response.bytes_stream();
            let mut parser = FrameParser::default();

            while let Some(chunk) = body.next().await {
                let chunk = match chunk {
                    Ok(bytes) => bytes,
                    Err(e) => {
                        // Terminal error; fragments already sent stay valid.
                        // A mid-stream connection loss counts against
                        // reachability the same as a failed exchange.
                        let error = ApiClient::classify(e);
                        if error.is_unreachable() {
                            monitor.record_unreachable();
                        }
                        let _ = tx.send(Err(error)).await;
                        return;
                    }
                };

                for frame in parser.push(&String::from_utf8_lossy(&chunk)) {
                    match frame {
                        Frame::Done => return,
                        Frame::Data(text) => {
                            if tx.send(Ok(text)).await.is_err() {
                                // Consumer dropped the stream.
                                return;
                            }
                        }
                    }
                }
            }
            // Clean connection close without a sentinel also ends the
            // sequence.
        });

        Ok(Self { rx })
    }

    /// Next fragment, or `None` once the stream has terminated.
    pub async fn next(&mut self) -> Option<Result<String, ApiError>> {
        self.rx.recv().await
    }

    /// Adapt into a `tokio_stream::Stream` of fragments.
    pub fn into_stream(self) -> ReceiverStream<Result<String, ApiError>> {
        ReceiverStream::new(self.rx)
    }
}

/// Append-only conversation turn log.
///
/// The log is mutated from a single owner; readers take cloned snapshots.
#[derive(Debug, Default)]
pub struct Conversation {
    /// Server-side conversation identifier, when one is in use.
    conversation_id: Option<String>,
    turns: Vec<ConversationTurn>,
    next_turn: u64,
}

impl Conversation {
    pub fn new() -> Self {
        Self::default()
    }

    /// Use a fixed server-side conversation identifier.
    pub fn with_id(conversation_id: impl Into<String>) -> Self {
        Self {
            conversation_id: Some(conversation_id.into()),
            ..Self::default()
        }
    }

    pub fn conversation_id(&self) -> Option<&str> {
        self.conversation_id.as_deref()
    }

    /// All turns, in order.
    pub fn turns(&self) -> &[ConversationTurn] {
        &self.turns
    }

    /// Cloned snapshot of the turn list.
    pub fn snapshot(&self) -> Vec<ConversationTurn> {
        self.turns.clone()
    }

    /// Discard the local history. Server-side state is cleared separately
    /// via [`ApiClient::clear_chat`].
    pub fn clear(&mut self) {
        self.turns.clear();
    }

    fn next_id(&mut self) -> String {
        let id = format!("turn_{}", self.next_turn);
        self.next_turn += 1;
        id
    }

    fn push_turn(&mut self, role: TurnRole, content: impl Into<String>) -> String {
        let id = self.next_id();
        self.turns
            .push(ConversationTurn::new(id.clone(), role, content));
        id
    }

    fn remove_turn(&mut self, id: &str) {
        self.turns.retain(|t| t.id != id);
    }

    fn turn_mut(&mut self, id: &str) -> Option<&mut ConversationTurn> {
        self.turns.iter_mut().find(|t| t.id == id)
    }

    /// Send a message without streaming. Appends the user turn and, on
    /// success, the assistant turn with routing provenance.
    pub async fn send(
        &mut self,
        client: &ApiClient,
        message: &str,
    ) -> Result<ConversationTurn, ApiError> {
        self.push_turn(TurnRole::User, message);

        let reply = client.chat(message, self.conversation_id()).await?;

        let id = self.push_turn(TurnRole::Assistant, reply.content);
        match self.turn_mut(&id) {
            Some(turn) => {
                turn.model_used = reply.model_used;
                turn.model_name = reply.model_name;
                turn.routing_reason = reply.routing_reason;
                Ok(turn.clone())
            }
            None => Err(ApiError::InvalidResponse(
                "assistant turn disappeared from the log".to_string(),
            )),
        }
    }

    /// Send a message and consume the streamed reply.
    ///
    /// A placeholder assistant turn is appended before the first fragment is
    /// read and grown in place as fragments arrive; on a stream error the
    /// placeholder is removed entirely so no partial assistant turn remains
    /// visible. Exactly one placeholder exists per in-flight request because
    /// this call holds `&mut self` for its duration.
    pub async fn stream_reply(
        &mut self,
        client: &ApiClient,
        message: &str,
    ) -> Result<ConversationTurn, ApiError> {
        self.stream_reply_with(client, message, |_| {}).await
    }

    /// Like [`Conversation::stream_reply`], invoking `on_fragment` for each
    /// fragment as it arrives.
    pub async fn stream_reply_with<F>(
        &mut self,
        client: &ApiClient,
        message: &str,
        mut on_fragment: F,
    ) -> Result<ConversationTurn, ApiError>
    where
        F: FnMut(&str),
    {
        self.push_turn(TurnRole::User, message);

        let conversation_id = self.conversation_id.clone();
        let mut stream = ChatStream::open(client, message, conversation_id.as_deref()).await?;

        let placeholder = self.push_turn(TurnRole::Assistant, "");

        while let Some(item) = stream.next().await {
            match item {
                Ok(fragment) => {
                    on_fragment(&fragment);
                    if let Some(turn) = self.turn_mut(&placeholder) {
                        turn.content.push_str(&fragment);
                    }
                }
                Err(e) => {
                    self.remove_turn(&placeholder);
                    return Err(e);
                }
            }
        }

        match self.turns.iter().rfind(|t| t.id == placeholder) {
            Some(turn) => Ok(turn.clone()),
            None => Err(ApiError::InvalidResponse(
                "assistant turn disappeared from the log".to_string(),
            )),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_frame_parser_whole_frames() {
        let mut parser = FrameParser::default();
        let frames = parser.push("data: Hel\n\ndata: lo\n\ndata: [DONE]\n\n");
        assert_eq!(
            frames,
            vec![
                Frame::Data("Hel".to_string()),
                Frame::Data("lo".to_string()),
                Frame::Done,
            ]
        );
    }

    #[test]
    fn test_frame_parser_split_across_chunks() {
        let mut parser = FrameParser::default();
        assert!(parser.push("data: Hel").is_empty());
        let frames = parser.push("lo\n\n");
        assert_eq!(frames, vec![Frame::Data("Hello".to_string())]);
    }

    #[test]
    fn test_frame_parser_ignores_non_data_lines() {
        let mut parser = FrameParser::default();
        let frames = parser.push(": keep-alive\n\ndata: hi\n\n");
        assert_eq!(frames, vec![Frame::Data("hi".to_string())]);
    }

    #[test]
    fn test_frame_parser_handles_crlf() {
        let mut parser = FrameParser::default();
        let frames = parser.push("data: hi\r\n\r\n");
        assert_eq!(frames, vec![Frame::Data("hi".to_string())]);
    }

    #[test]
    fn test_frame_parser_sentinel_not_emitted_as_content() {
        let mut parser = FrameParser::default();
        let frames = parser.push("data: [DONE]\n\n");
        assert_eq!(frames, vec![Frame::Done]);
    }

    #[test]
    fn test_conversation_turn_ids_are_unique() {
        let mut conversation = Conversation::new();
        let a = conversation.push_turn(TurnRole::User, "one");
        let b = conversation.push_turn(TurnRole::Assistant, "two");
        assert_ne!(a, b);
        assert_eq!(conversation.turns().len(), 2);
    }

    #[test]
    fn test_conversation_remove_turn() {
        let mut conversation = Conversation::new();
        let keep = conversation.push_turn(TurnRole::User, "keep");
        let drop = conversation.push_turn(TurnRole::Assistant, "partial");
        conversation.remove_turn(&drop);

        assert_eq!(conversation.turns().len(), 1);
        assert_eq!(conversation.turns()[0].id, keep);
    }

    #[test]
    fn test_conversation_clear() {
        let mut conversation = Conversation::with_id("conv-1");
        conversation.push_turn(TurnRole::User, "hi");
        conversation.clear();
        assert!(conversation.turns().is_empty());
        // The server-side identifier survives a local clear.
        assert_eq!(conversation.conversation_id(), Some("conv-1"));
    }

    #[test]
    fn test_turn_role_serialization() {
        assert_eq!(serde_json::to_string(&TurnRole::User).unwrap(), "\"user\"");
        assert_eq!(TurnRole::Assistant.as_str(), "assistant");
    }
}
