//! Retrieval-augmented chat orchestration.
//!
//! One entry point, [`ChatOrchestrator::send_message`], drives the whole
//! protocol for a chat turn:
//!
//! 1. Verify the chat belongs to the bound account and persist the user
//!    message unconditionally, before any generation attempt — a later
//!    failure never loses the user's input.
//! 2. Try the managed-assistant path with recent history.
//! 3. If the assistant fails because the service terms are not accepted,
//!    run the vector-search fallback; any other assistant error skips
//!    straight to the failure path.
//! 4. Fallback: similarity-search the folder, build a context block, ask
//!    the completion gateway, and derive citations from the search hits.
//! 5. Failure path: persist a fixed apologetic reply — the conversation
//!    always ends with an assistant turn, and the caller still receives a
//!    structured result.
//!
//! The user message is always persisted strictly before the assistant
//! reply, whichever path produced it. The chat timestamp is only touched
//! on a successful (non-failure-path) completion.

use anyhow::{bail, Result};
use serde::Serialize;
use std::sync::Arc;

use crate::assistant::{AssistantError, AssistantErrorReason, AssistantService};
use crate::completion::CompletionGateway;
use crate::models::{ChatMessage, Citation, MessageRole};
use crate::store::MetaStore;
use crate::vector_index::{SearchOptions, VectorIndex};

/// Fixed reply persisted when both chat paths fail.
const FAILURE_MESSAGE: &str = "I'm sorry, there was an error processing your request. Please make \
sure your documents are indexed and try again. If the issue persists, the assistant service may \
need to be configured.";

/// Reply used when the assistant returns an empty body.
const EMPTY_RESPONSE_MESSAGE: &str =
    "I'm sorry, I couldn't generate a response based on your documents.";

/// Context sentinel when similarity search finds nothing relevant.
const NO_DOCUMENTS_CONTEXT: &str = "No relevant documents found in this folder.";

/// Marker returned in [`ChatReply::fallback`] when the vector path answered.
const FALLBACK_VECTOR_SEARCH: &str = "vector-search";

/// Structured result of one chat turn.
///
/// Always carries the reply text and the persisted message id. Citations
/// are present only on the fallback path; `usage` only on the assistant
/// path; `error` only on the failure path (a soft failure — the reply is
/// still a valid assistant turn).
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ChatReply {
    pub response: String,
    pub message_id: String,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub citations: Vec<Citation>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub usage: Option<serde_json::Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub fallback: Option<&'static str>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<&'static str>,
}

/// Tuning for the orchestrator, taken from `[retrieval]` config.
#[derive(Debug, Clone)]
pub struct ChatSettings {
    /// How many prior messages to replay as assistant history.
    pub history_limit: usize,
    /// Top-k for the fallback similarity search.
    pub chat_top_k: usize,
    /// Minimum similarity score for fallback context.
    pub min_score: f32,
}

impl Default for ChatSettings {
    fn default() -> Self {
        Self {
            history_limit: 10,
            chat_top_k: 5,
            min_score: 0.7,
        }
    }
}

/// The top-level chat protocol, bound to one account.
pub struct ChatOrchestrator {
    store: Arc<dyn MetaStore>,
    vector_index: Arc<VectorIndex>,
    completions: Arc<dyn CompletionGateway>,
    assistant: Arc<AssistantService>,
    user_id: String,
    settings: ChatSettings,
}

impl ChatOrchestrator {
    pub fn new(
        store: Arc<dyn MetaStore>,
        vector_index: Arc<VectorIndex>,
        completions: Arc<dyn CompletionGateway>,
        assistant: Arc<AssistantService>,
        user_id: String,
        settings: ChatSettings,
    ) -> Self {
        Self {
            store,
            vector_index,
            completions,
            assistant,
            user_id,
            settings,
        }
    }

    /// Run one chat turn. See the module docs for the full sequence.
    pub async fn send_message(
        &self,
        message: &str,
        folder_id: &str,
        chat_id: &str,
    ) -> Result<ChatReply> {
        // Verify the chat session and its binding to folder and account.
        let chat = match self.store.get_chat(chat_id).await? {
            Some(chat) if chat.folder_id == folder_id => chat,
            _ => bail!("Chat not found"),
        };
        let folder = match self.store.get_folder(&chat.folder_id).await? {
            Some(folder) if folder.user_id == self.user_id => folder,
            _ => bail!("Folder not found"),
        };

        // History covers prior turns only; fetch before persisting the
        // new user message.
        let history = self
            .store
            .recent_messages(chat_id, self.settings.history_limit)
            .await?;

        // The user's input survives whatever happens next.
        self.store
            .append_message(chat_id, MessageRole::User, message, &[])
            .await?;

        // Preferred path: the managed assistant.
        match self
            .assistant
            .chat_with_assistant(&self.user_id, message, &history)
            .await
        {
            Ok(response) => {
                let content = if response.content.trim().is_empty() {
                    EMPTY_RESPONSE_MESSAGE.to_string()
                } else {
                    response.content
                };

                let reply = self
                    .store
                    .append_message(chat_id, MessageRole::Assistant, &content, &[])
                    .await?;
                self.store.touch_chat(chat_id).await?;

                Ok(ChatReply {
                    response: content,
                    message_id: reply.id,
                    citations: Vec::new(),
                    usage: response.usage,
                    fallback: None,
                    error: None,
                })
            }
            Err(err) if is_terms_error(&err) => {
                match self.fallback_reply(message, &folder.name, folder_id, chat_id).await {
                    Ok(reply) => Ok(reply),
                    Err(fallback_err) => {
                        eprintln!("warning: fallback chat path failed: {}", fallback_err);
                        self.failure_reply(chat_id).await
                    }
                }
            }
            Err(err) => {
                eprintln!("warning: assistant chat failed: {}", err);
                self.failure_reply(chat_id).await
            }
        }
    }

    /// The vector-search + completion path.
    async fn fallback_reply(
        &self,
        message: &str,
        folder_name: &str,
        folder_id: &str,
        chat_id: &str,
    ) -> Result<ChatReply> {
        let results = self
            .vector_index
            .search_similar(
                message,
                &self.user_id,
                &SearchOptions {
                    folder_id: Some(folder_id.to_string()),
                    top_k: self.settings.chat_top_k,
                    min_score: self.settings.min_score,
                },
            )
            .await?;

        let context = if results.is_empty() {
            NO_DOCUMENTS_CONTEXT.to_string()
        } else {
            results
                .iter()
                .map(|r| format!("{}: {}", r.metadata.file_name, r.metadata.chunk_text))
                .collect::<Vec<_>>()
                .join("\n\n")
        };

        let system_prompt = build_fallback_prompt(folder_name, &context, message);
        let response = self.completions.complete(&system_prompt, message).await?;

        let citations: Vec<Citation> = results
            .iter()
            .map(|r| Citation {
                file_name: r.metadata.file_name.clone(),
                file_id: r.metadata.file_id.clone(),
                score: r.score,
                chunk_index: r.metadata.chunk_index,
            })
            .collect();

        let reply = self
            .store
            .append_message(chat_id, MessageRole::Assistant, &response, &citations)
            .await?;
        self.store.touch_chat(chat_id).await?;

        Ok(ChatReply {
            response,
            message_id: reply.id,
            citations,
            usage: None,
            fallback: Some(FALLBACK_VECTOR_SEARCH),
            error: None,
        })
    }

    /// The terminal path: persist the fixed apologetic reply.
    ///
    /// This is a soft failure — the caller gets a normal reply shape with
    /// an error marker, and the conversation keeps its assistant turn.
    /// The chat timestamp is deliberately not touched here.
    async fn failure_reply(&self, chat_id: &str) -> Result<ChatReply> {
        let reply = self
            .store
            .append_message(chat_id, MessageRole::Assistant, FAILURE_MESSAGE, &[])
            .await?;

        Ok(ChatReply {
            response: FAILURE_MESSAGE.to_string(),
            message_id: reply.id,
            citations: Vec::new(),
            usage: None,
            fallback: None,
            error: Some("assistant-error"),
        })
    }
}

/// Whether an assistant-path error is the terms-of-service case that the
/// fallback path recovers from.
fn is_terms_error(err: &anyhow::Error) -> bool {
    err.downcast_ref::<AssistantError>()
        .map(|e| e.reason == AssistantErrorReason::TermsNotAccepted)
        .unwrap_or(false)
}

/// System prompt for the fallback completion: folder-scoped framing, the
/// retrieved context, the user's question, and the instruction to name
/// source documents.
fn build_fallback_prompt(folder_name: &str, context: &str, message: &str) -> String {
    format!(
        "You are an AI assistant helping a user understand and work with the documents in their \
folder \"{}\".\n\n\
Based on the following context from the user's documents, answer their question. If the context \
does not contain relevant information, let them know and suggest they check that their documents \
have been indexed.\n\n\
Context from documents:\n{}\n\n\
User question: {}\n\n\
Provide a helpful response based on the context above. If you reference specific information, \
mention which document it came from.",
        folder_name, context, message
    )
}

/// Replay format used by external callers that list a chat's transcript.
pub fn format_transcript(messages: &[ChatMessage]) -> String {
    messages
        .iter()
        .map(|m| format!("{}: {}", m.role.as_str(), m.content))
        .collect::<Vec<_>>()
        .join("\n")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_fallback_prompt_embeds_context_and_question() {
        let prompt = build_fallback_prompt("Reports", "a.txt: alpha", "what is alpha?");
        assert!(prompt.contains("\"Reports\""));
        assert!(prompt.contains("a.txt: alpha"));
        assert!(prompt.contains("what is alpha?"));
    }

    #[test]
    fn test_terms_error_detection() {
        let terms: anyhow::Error =
            AssistantError::new(AssistantErrorReason::TermsNotAccepted, "nope").into();
        let other: anyhow::Error =
            AssistantError::new(AssistantErrorReason::Service, "boom").into();
        let plain = anyhow::anyhow!("unrelated");

        assert!(is_terms_error(&terms));
        assert!(!is_terms_error(&other));
        assert!(!is_terms_error(&plain));
    }
}
