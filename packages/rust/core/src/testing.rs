//! Deterministic language model doubles for tests.

use std::collections::VecDeque;
use std::sync::Mutex;

use async_trait::async_trait;

use doki_shared::{DokiError, Result};

use crate::llm::{ChatMessage, LanguageModel, Role};

/// What [`EchoLlm`] answers when the context block is empty.
pub const NOT_FOUND_ANSWER: &str = "I couldn't find specific information in the documentation.";

/// Replays canned replies in order and records every request.
pub struct ScriptedLlm {
    replies: Mutex<VecDeque<String>>,
    calls: Mutex<Vec<Vec<ChatMessage>>>,
    fail: bool,
}

impl ScriptedLlm {
    pub fn new<I, S>(replies: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            replies: Mutex::new(replies.into_iter().map(Into::into).collect()),
            calls: Mutex::new(Vec::new()),
            fail: false,
        }
    }

    /// Every call fails with a generation error.
    pub fn failing() -> Self {
        Self {
            fail: true,
            ..Self::new(Vec::<String>::new())
        }
    }

    pub fn calls(&self) -> Vec<Vec<ChatMessage>> {
        self.calls.lock().unwrap().clone()
    }

    pub fn call_count(&self) -> usize {
        self.calls.lock().unwrap().len()
    }
}

#[async_trait]
impl LanguageModel for ScriptedLlm {
    fn model_id(&self) -> &str {
        "scripted"
    }

    async fn generate(&self, messages: &[ChatMessage]) -> Result<String> {
        self.calls.lock().unwrap().push(messages.to_vec());
        if self.fail {
            return Err(DokiError::Generation("scripted failure".into()));
        }
        self.replies
            .lock()
            .unwrap()
            .pop_front()
            .ok_or_else(|| DokiError::Generation("no scripted reply left".into()))
    }
}

/// Answers with the text of the `<context>` block of the last user message.
pub struct EchoLlm;

#[async_trait]
impl LanguageModel for EchoLlm {
    fn model_id(&self) -> &str {
        "echo"
    }

    async fn generate(&self, messages: &[ChatMessage]) -> Result<String> {
        let prompt = messages
            .iter()
            .rev()
            .find(|m| m.role == Role::User)
            .map(|m| m.content.as_str())
            .unwrap_or_default();

        let context = prompt
            .split_once("<context>")
            .and_then(|(_, rest)| rest.split_once("</context>"))
            .map(|(inner, _)| inner.trim())
            .unwrap_or_default();

        if context.is_empty() {
            Ok(NOT_FOUND_ANSWER.to_string())
        } else {
            Ok(context.to_string())
        }
    }
}

/// Rewrites the final question by replacing the pronoun "it" with the subject
/// of the first user turn ("What is X?" makes X the subject).
///
/// With no history between the system message and the question, the question
/// comes back unchanged.
pub struct RewritingLlm;

#[async_trait]
impl LanguageModel for RewritingLlm {
    fn model_id(&self) -> &str {
        "rewriter"
    }

    async fn generate(&self, messages: &[ChatMessage]) -> Result<String> {
        let Some((question, earlier)) = messages.split_last() else {
            return Err(DokiError::Generation("no messages".into()));
        };
        let history: Vec<&ChatMessage> = earlier.iter().filter(|m| m.role != Role::System).collect();

        let subject = history
            .iter()
            .find(|m| m.role == Role::User)
            .and_then(|m| m.content.split_whitespace().last())
            .map(|w| w.trim_matches(|c: char| !c.is_alphanumeric()).to_string());

        let Some(subject) = subject else {
            return Ok(question.content.clone());
        };

        let rewritten = question
            .content
            .split(' ')
            .map(|word| {
                let bare = word.trim_matches(|c: char| !c.is_alphanumeric());
                if bare.eq_ignore_ascii_case("it") {
                    word.replacen(bare, &subject, 1)
                } else {
                    word.to_string()
                }
            })
            .collect::<Vec<_>>()
            .join(" ");
        Ok(rewritten)
    }
}
