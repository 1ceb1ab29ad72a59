//! Multi-turn chat on top of the decode loop.
//!
//! A [`Conversation`] keeps the message history under an estimated token
//! budget and renders it with the Phi chat markers:
//!
//! ```text
//! <|system|>…<|end|><|user|>…<|end|><|assistant|>…<|end|>…<|assistant|>
//! ```

use std::fmt;

use tracing::debug;

use crate::error::Result;
use crate::runtime::{GenerateParams, Runtime};

pub const SYSTEM_TOKEN: &str = "<|system|>";
pub const USER_TOKEN: &str = "<|user|>";
pub const ASSISTANT_TOKEN: &str = "<|assistant|>";
pub const END_TOKEN: &str = "<|end|>";

/// System message used when none (or a blank one) is given.
pub const DEFAULT_SYSTEM_MESSAGE: &str = "Starting new chat session.";
/// Default history budget, in estimated tokens.
pub const DEFAULT_CONTEXT_TOKENS: usize = 128_000;

const CHARS_PER_TOKEN: usize = 4;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChatRole {
    System,
    User,
    Assistant,
}

impl ChatRole {
    fn marker(self) -> &'static str {
        match self {
            ChatRole::System => SYSTEM_TOKEN,
            ChatRole::User => USER_TOKEN,
            ChatRole::Assistant => ASSISTANT_TOKEN,
        }
    }
}

impl fmt::Display for ChatRole {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            ChatRole::System => "system",
            ChatRole::User => "user",
            ChatRole::Assistant => "assistant",
        };
        f.write_str(s)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChatMessage {
    pub role: ChatRole,
    pub content: String,
    estimated_tokens: usize,
}

impl ChatMessage {
    pub fn estimated_tokens(&self) -> usize {
        self.estimated_tokens
    }
}

/// Rough token count of `text`: one per four characters, plus one.
pub fn estimate_tokens(text: &str) -> usize {
    (text.chars().count() / CHARS_PER_TOKEN + 1).max(1)
}

/// Chat history headed by a system message.
#[derive(Debug, Clone)]
pub struct Conversation {
    messages: Vec<ChatMessage>,
    token_total: usize,
    context_tokens: usize,
}

impl Conversation {
    pub fn new(system_message: &str) -> Self {
        Self::with_budget(system_message, DEFAULT_CONTEXT_TOKENS)
    }

    /// A conversation that keeps at most `context_tokens` estimated tokens.
    pub fn with_budget(system_message: &str, context_tokens: usize) -> Self {
        let mut conversation = Self {
            messages: Vec::new(),
            token_total: 0,
            context_tokens,
        };
        conversation.reset(system_message);
        conversation
    }

    /// Drop all history and start over with `system_message`.
    pub fn reset(&mut self, system_message: &str) {
        let system = match system_message.trim() {
            "" => DEFAULT_SYSTEM_MESSAGE,
            s => s,
        };
        self.messages.clear();
        self.token_total = 0;
        self.push(ChatRole::System, system);
    }

    /// Append a message (trimmed), then drop the oldest non-system messages
    /// while the history is over budget.
    pub fn push(&mut self, role: ChatRole, content: &str) {
        let content = content.trim().to_string();
        let estimated_tokens = estimate_tokens(&content);
        self.token_total += estimated_tokens;
        self.messages.push(ChatMessage {
            role,
            content,
            estimated_tokens,
        });

        while self.token_total > self.context_tokens && self.messages.len() > 1 {
            let dropped = self.messages.remove(1);
            self.token_total -= dropped.estimated_tokens;
            debug!(role = %dropped.role, tokens = dropped.estimated_tokens, "trimmed chat history");
        }
    }

    pub fn messages(&self) -> &[ChatMessage] {
        &self.messages
    }

    pub fn token_total(&self) -> usize {
        self.token_total
    }

    pub fn system_message(&self) -> &str {
        self.messages
            .iter()
            .find(|m| m.role == ChatRole::System)
            .map_or("", |m| m.content.as_str())
    }

    /// Prompt text for the next assistant turn.
    pub fn render_prompt(&self) -> String {
        let mut prompt = String::new();
        prompt.push_str(SYSTEM_TOKEN);
        prompt.push_str(self.system_message());
        prompt.push_str(END_TOKEN);
        for message in self.messages.iter().filter(|m| m.role != ChatRole::System) {
            prompt.push_str(message.role.marker());
            prompt.push_str(&message.content);
            prompt.push_str(END_TOKEN);
        }
        prompt.push_str(ASSISTANT_TOKEN);
        prompt
    }
}

impl Default for Conversation {
    fn default() -> Self {
        Self::new(DEFAULT_SYSTEM_MESSAGE)
    }
}

/// Strip role markers from generated text and cut it at the first end marker.
pub fn clean_fragment(text: &str) -> String {
    let text = text
        .replace(SYSTEM_TOKEN, "")
        .replace(USER_TOKEN, "")
        .replace(ASSISTANT_TOKEN, "");
    match text.find(END_TOKEN) {
        Some(end) => text[..end].to_string(),
        None => text,
    }
}

impl Runtime {
    /// Answer `user_text` in `conversation` and record the reply.
    pub fn chat(
        &self,
        conversation: &mut Conversation,
        user_text: &str,
        params: &GenerateParams,
    ) -> Result<String> {
        self.chat_streaming(conversation, user_text, params, |_| {})
    }

    /// Like [`Runtime::chat`], passing each cleaned, non-empty fragment to
    /// `on_fragment` as it is generated.
    ///
    /// Without an explicit stop id, generation stops at the tokenizer's
    /// `<|end|>` token when it has one. It also stops when the model opens a
    /// new user or system turn.
    pub fn chat_streaming<F>(
        &self,
        conversation: &mut Conversation,
        user_text: &str,
        params: &GenerateParams,
        mut on_fragment: F,
    ) -> Result<String>
    where
        F: FnMut(&str),
    {
        if user_text.trim().is_empty() {
            return Ok(String::new());
        }
        conversation.push(ChatRole::User, user_text);
        let prompt = conversation.render_prompt();

        let tokenizer = self.tokenizer();
        let end = params
            .stop_token_id
            .or_else(|| tokenizer.token_to_id(END_TOKEN));
        let mut stop_ids: Vec<u32> = self.effective_stop_id(end).into_iter().collect();
        stop_ids.extend(
            [USER_TOKEN, SYSTEM_TOKEN]
                .iter()
                .filter_map(|marker| tokenizer.token_to_id(marker)),
        );

        let result = self.stream_until(&prompt, params, &stop_ids, |_, fragment| {
            let cleaned = clean_fragment(fragment);
            if !cleaned.is_empty() {
                on_fragment(&cleaned);
            }
        })?;

        let reply = self.decode_text(result.new_tokens(), true)?;
        let reply = clean_fragment(&reply).trim().to_string();
        if !reply.is_empty() {
            conversation.push(ChatRole::Assistant, &reply);
        }
        Ok(reply)
    }
}
