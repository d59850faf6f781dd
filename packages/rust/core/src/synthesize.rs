//! Grounding prompt assembly and answer generation.

use tracing::debug;

use doki_shared::{ChatRole, ChatTurn, Result, ScoredRecord};

use crate::llm::{ChatMessage, LanguageModel};

const INSTRUCTION: &str = "You are a helpful assistant. Your task is to answer the user's question \
based on the provided context. Synthesize a comprehensive answer from the context chunks given \
below. If the context does not contain the information needed to answer the question, state that \
you couldn't find specific information in the documentation. Do not make up information.";

/// Build the grounding prompt.
///
/// Chunk texts are joined with a blank line inside `<context>`. The history
/// block is omitted entirely when `history` is empty.
pub fn build_prompt(question: &str, results: &[ScoredRecord], history: &[ChatTurn]) -> String {
    let context = results
        .iter()
        .map(|r| r.text.as_str())
        .collect::<Vec<_>>()
        .join("\n\n");

    let mut prompt = format!("{INSTRUCTION}\n\n<context>\n{context}\n</context>\n\n");

    if !history.is_empty() {
        prompt.push_str("<chat_history>\n");
        for turn in history {
            let speaker = match turn.role {
                ChatRole::Human => "Human",
                ChatRole::Ai => "AI",
            };
            prompt.push_str(&format!("{speaker}: {}\n", turn.content));
        }
        prompt.push_str("</chat_history>\n\n");
    }

    prompt.push_str(&format!("Question: {question}"));
    prompt
}

/// Answer `question` from `results` with a single model call.
///
/// An empty result set still produces a call; the prompt tells the model to
/// say the documentation does not cover the question.
pub async fn synthesize(
    llm: &dyn LanguageModel,
    question: &str,
    results: &[ScoredRecord],
    history: &[ChatTurn],
) -> Result<String> {
    let prompt = build_prompt(question, results, history);
    debug!(chunks = results.len(), prompt_chars = prompt.len(), "synthesizing answer");
    let answer = llm.generate(&[ChatMessage::user(prompt)]).await?;
    Ok(answer.trim().to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{EchoLlm, NOT_FOUND_ANSWER, ScriptedLlm};
    use doki_shared::RecordMetadata;

    fn scored(text: &str, score: f32) -> ScoredRecord {
        ScoredRecord {
            text: text.into(),
            metadata: RecordMetadata {
                source: "preprocessing.html".into(),
                ordinal: 0,
            },
            score,
        }
    }

    #[test]
    fn prompt_joins_context_and_asks_the_question() {
        let results = [scored("Baseline correction.", 0.9), scored("Denoising.", 0.5)];
        let prompt = build_prompt("What preprocessing?", &results, &[]);

        assert!(prompt.contains("<context>\nBaseline correction.\n\nDenoising.\n</context>"));
        assert!(prompt.ends_with("Question: What preprocessing?"));
        assert!(prompt.contains("Do not make up information."));
        assert!(!prompt.contains("<chat_history>"));
    }

    #[test]
    fn prompt_includes_history_when_present() {
        let history = [ChatTurn::human("What is RamanSpy?"), ChatTurn::ai("A Python package.")];
        let prompt = build_prompt("Which formats?", &[], &history);
        assert!(prompt.contains("<chat_history>\nHuman: What is RamanSpy?\nAI: A Python package.\n</chat_history>"));
    }

    #[tokio::test]
    async fn single_call_with_one_user_message() {
        let llm = ScriptedLlm::new(["  It supports baseline correction.  "]);
        let answer = synthesize(&llm, "q", &[scored("Baseline correction.", 1.0)], &[])
            .await
            .unwrap();

        assert_eq!(answer, "It supports baseline correction.");
        let calls = llm.calls();
        assert_eq!(calls.len(), 1);
        assert_eq!(calls[0].len(), 1);
    }

    #[tokio::test]
    async fn empty_context_yields_not_found_answer() {
        let answer = synthesize(&EchoLlm, "What is the meaning of life?", &[], &[])
            .await
            .unwrap();
        assert_eq!(answer, NOT_FOUND_ANSWER);
    }

    #[tokio::test]
    async fn model_failure_propagates() {
        let err = synthesize(&ScriptedLlm::failing(), "q", &[], &[])
            .await
            .unwrap_err();
        assert!(err.is_generation());
    }
}
