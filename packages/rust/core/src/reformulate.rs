//! History-aware query rewriting.

use tracing::debug;

use doki_shared::{ChatRole, ChatTurn, DokiError, Result};

use crate::llm::{ChatMessage, LanguageModel};

/// Instruction given to the model before the conversation history.
pub const REFORMULATE_INSTRUCTION: &str = "Given a chat history and the latest user question \
which might reference context in the chat history, formulate a standalone question which can be \
understood without the chat history. Do NOT answer the question, just reformulate it if needed \
and otherwise return it as is.";

/// Rewrite `question` into a standalone question using `history`.
///
/// With no history the question is returned unchanged and the model is not
/// called. Model failures propagate; there is no fallback to the raw question.
pub async fn reformulate(
    llm: &dyn LanguageModel,
    question: &str,
    history: &[ChatTurn],
) -> Result<String> {
    if history.is_empty() {
        return Ok(question.to_string());
    }

    let messages = reformulation_messages(question, history);
    let standalone = llm.generate(&messages).await?;
    let standalone = standalone.trim();
    if standalone.is_empty() {
        return Err(DokiError::Generation(
            "model returned an empty standalone question".into(),
        ));
    }

    debug!(original = question, standalone, turns = history.len(), "reformulated question");
    Ok(standalone.to_string())
}

/// System instruction, then the history in order, then the new question.
pub fn reformulation_messages(question: &str, history: &[ChatTurn]) -> Vec<ChatMessage> {
    let mut messages = Vec::with_capacity(history.len() + 2);
    messages.push(ChatMessage::system(REFORMULATE_INSTRUCTION));
    messages.extend(history.iter().map(|turn| match turn.role {
        ChatRole::Human => ChatMessage::user(turn.content.as_str()),
        ChatRole::Ai => ChatMessage::assistant(turn.content.as_str()),
    }));
    messages.push(ChatMessage::user(question));
    messages
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::llm::Role;
    use crate::testing::{RewritingLlm, ScriptedLlm};

    fn two_turns() -> Vec<ChatTurn> {
        vec![
            ChatTurn::human("What is RamanSpy?"),
            ChatTurn::ai("RamanSpy is a Python package for Raman spectroscopy."),
        ]
    }

    #[tokio::test]
    async fn empty_history_skips_the_model() {
        let llm = ScriptedLlm::new(["should not be used"]);
        let out = reformulate(&llm, "What file formats are supported?", &[])
            .await
            .unwrap();
        assert_eq!(out, "What file formats are supported?");
        assert_eq!(llm.call_count(), 0);
    }

    #[tokio::test]
    async fn empty_history_through_the_model_is_unchanged() {
        let llm = RewritingLlm;
        let question = "What file formats are supported?";
        let out = llm.generate(&reformulation_messages(question, &[])).await.unwrap();
        assert_eq!(out, question);
    }

    #[tokio::test]
    async fn resolves_coreference_from_history() {
        let llm = RewritingLlm;
        let out = reformulate(&llm, "What file formats does it support?", &two_turns())
            .await
            .unwrap();
        assert!(out.contains("RamanSpy"), "got {out}");
    }

    #[tokio::test]
    async fn sends_history_in_order() {
        let llm = ScriptedLlm::new(["What file formats does RamanSpy support?"]);
        reformulate(&llm, "What file formats does it support?", &two_turns())
            .await
            .unwrap();

        let calls = llm.calls();
        assert_eq!(calls.len(), 1);
        let roles: Vec<Role> = calls[0].iter().map(|m| m.role).collect();
        assert_eq!(roles, vec![Role::System, Role::User, Role::Assistant, Role::User]);
        assert!(calls[0][0].content.contains("Do NOT answer the question"));
        assert_eq!(calls[0][3].content, "What file formats does it support?");
    }

    #[tokio::test]
    async fn model_failure_propagates() {
        let llm = ScriptedLlm::failing();
        let err = reformulate(&llm, "And it?", &two_turns()).await.unwrap_err();
        assert!(err.is_generation());
    }

    #[tokio::test]
    async fn blank_rewrite_is_an_error() {
        let llm = ScriptedLlm::new(["   "]);
        let err = reformulate(&llm, "And it?", &two_turns()).await.unwrap_err();
        assert!(err.is_generation());
    }
}
