//! Integration tests for the chat orchestration protocol.

mod common;

use common::*;

use foldertalk::models::{MessageRole, TextChunk};
use foldertalk::store::MetaStore;
use foldertalk::vector_index::FileContext;

fn chunk(index: i64, content: &str) -> TextChunk {
    TextChunk {
        content: content.to_string(),
        start_index: 0,
        end_index: content.len(),
        chunk_index: index,
    }
}

async fn index_sample_docs(h: &Harness, folder_id: &str) {
    h.vector_index
        .index_file_chunks(
            &FileContext {
                file_id: "f1".to_string(),
                file_name: "alpha.txt".to_string(),
                folder_id: folder_id.to_string(),
                folder_name: format!("Folder {}", folder_id),
                user_id: USER.to_string(),
                mime_type: "text/plain".to_string(),
            },
            &[chunk(0, "aaaa"), chunk(1, "aabb")],
        )
        .await
        .unwrap();
}

#[tokio::test]
async fn assistant_path_persists_reply_without_citations() {
    let h = harness(
        ChatBehavior::Succeed("From your documents: alpha.".to_string()),
        MockCompletions::answering("unused"),
    );
    let chat = seed_folder_and_chat(&h.store, "d1").await;

    let reply = h
        .orchestrator
        .send_message("what is alpha?", "d1", &chat.id)
        .await
        .unwrap();

    assert_eq!(reply.response, "From your documents: alpha.");
    assert!(reply.citations.is_empty());
    assert!(reply.usage.is_some());
    assert!(reply.fallback.is_none());
    assert!(reply.error.is_none());

    let messages = h.store.messages_for(&chat.id);
    assert_eq!(messages.len(), 2);
    assert_eq!(messages[0].role, MessageRole::User);
    assert_eq!(messages[1].role, MessageRole::Assistant);
}

#[tokio::test]
async fn user_message_persisted_strictly_before_reply_on_every_path() {
    for behavior in [
        ChatBehavior::Succeed("ok".to_string()),
        ChatBehavior::FailTerms,
        ChatBehavior::FailService,
    ] {
        let h = harness(behavior, MockCompletions::answering("grounded"));
        let chat = seed_folder_and_chat(&h.store, "d1").await;

        h.orchestrator
            .send_message("question", "d1", &chat.id)
            .await
            .unwrap();

        let messages = h.store.messages_for(&chat.id);
        assert_eq!(messages.len(), 2);
        assert_eq!(messages[0].role, MessageRole::User);
        assert_eq!(messages[1].role, MessageRole::Assistant);
        assert!(
            messages[0].created_at < messages[1].created_at,
            "user turn must be persisted strictly earlier"
        );
    }
}

#[tokio::test]
async fn terms_error_routes_to_fallback_with_citations() {
    let h = harness(
        ChatBehavior::FailTerms,
        MockCompletions::answering("Grounded answer from alpha.txt."),
    );
    let chat = seed_folder_and_chat(&h.store, "d1").await;
    index_sample_docs(&h, "d1").await;

    let reply = h
        .orchestrator
        .send_message("aaaa", "d1", &chat.id)
        .await
        .unwrap();

    assert_eq!(reply.fallback, Some("vector-search"));
    assert!(reply.error.is_none());
    assert!(!reply.citations.is_empty());
    assert_eq!(reply.citations[0].file_name, "alpha.txt");
    assert!(reply.citations[0].score >= 0.7);

    // The context block reached the completion prompt.
    let prompt = h.completions.last_prompt().unwrap();
    assert!(prompt.contains("alpha.txt: aaaa"));

    // Citations are persisted with the reply.
    let messages = h.store.messages_for(&chat.id);
    assert_eq!(messages[1].citations.len(), reply.citations.len());
}

#[tokio::test]
async fn generic_assistant_error_skips_fallback() {
    let h = harness(
        ChatBehavior::FailService,
        MockCompletions::answering("should never be called"),
    );
    let chat = seed_folder_and_chat(&h.store, "d1").await;
    index_sample_docs(&h, "d1").await;

    let reply = h
        .orchestrator
        .send_message("aaaa", "d1", &chat.id)
        .await
        .unwrap();

    assert_eq!(reply.error, Some("assistant-error"));
    assert!(reply.fallback.is_none());
    assert!(reply.citations.is_empty());
    assert!(reply.response.contains("I'm sorry"));

    // The completion gateway was never consulted.
    assert!(h.completions.last_prompt().is_none());
}

#[tokio::test]
async fn fallback_with_no_matches_uses_sentinel_context() {
    let h = harness(
        ChatBehavior::FailTerms,
        MockCompletions::answering("Nothing indexed yet."),
    );
    let chat = seed_folder_and_chat(&h.store, "d1").await;

    let reply = h
        .orchestrator
        .send_message("zzzz", "d1", &chat.id)
        .await
        .unwrap();

    assert_eq!(reply.fallback, Some("vector-search"));
    assert!(reply.citations.is_empty());

    let prompt = h.completions.last_prompt().unwrap();
    assert!(prompt.contains("No relevant documents found in this folder."));
}

#[tokio::test]
async fn fallback_failure_degrades_to_fixed_reply() {
    let h = harness(ChatBehavior::FailTerms, MockCompletions::failing());
    let chat = seed_folder_and_chat(&h.store, "d1").await;

    let reply = h
        .orchestrator
        .send_message("question", "d1", &chat.id)
        .await
        .unwrap();

    assert_eq!(reply.error, Some("assistant-error"));
    assert!(reply.response.contains("I'm sorry"));

    // Even the terminal path leaves an assistant turn behind.
    let messages = h.store.messages_for(&chat.id);
    assert_eq!(messages.len(), 2);
    assert_eq!(messages[1].role, MessageRole::Assistant);
}

#[tokio::test]
async fn chat_timestamp_touched_only_on_success() {
    // Success path bumps updated_at.
    let h = harness(
        ChatBehavior::Succeed("ok".to_string()),
        MockCompletions::answering("unused"),
    );
    let chat = seed_folder_and_chat(&h.store, "d1").await;
    let before = h.store.get_chat(&chat.id).await.unwrap().unwrap().updated_at;
    tokio::time::sleep(std::time::Duration::from_millis(5)).await;

    h.orchestrator
        .send_message("question", "d1", &chat.id)
        .await
        .unwrap();
    let after = h.store.get_chat(&chat.id).await.unwrap().unwrap().updated_at;
    assert!(after > before);

    // Failure path leaves updated_at alone.
    let h = harness(
        ChatBehavior::FailService,
        MockCompletions::answering("unused"),
    );
    let chat = seed_folder_and_chat(&h.store, "d1").await;
    let before = h.store.get_chat(&chat.id).await.unwrap().unwrap().updated_at;

    h.orchestrator
        .send_message("question", "d1", &chat.id)
        .await
        .unwrap();
    let after = h.store.get_chat(&chat.id).await.unwrap().unwrap().updated_at;
    assert_eq!(after, before);
}

#[tokio::test]
async fn history_is_replayed_before_the_new_turn() {
    let h = harness(
        ChatBehavior::Succeed("ok".to_string()),
        MockCompletions::answering("unused"),
    );
    let chat = seed_folder_and_chat(&h.store, "d1").await;

    // First turn: no history, one message (the new user turn).
    h.orchestrator
        .send_message("first", "d1", &chat.id)
        .await
        .unwrap();
    // Second turn: two prior messages plus the new one.
    h.orchestrator
        .send_message("second", "d1", &chat.id)
        .await
        .unwrap();

    let counts = h.assistant_api.chat_turn_counts.lock().unwrap().clone();
    assert_eq!(counts, vec![1, 3]);
}

#[tokio::test]
async fn unknown_chat_is_rejected() {
    let h = harness(
        ChatBehavior::Succeed("ok".to_string()),
        MockCompletions::answering("unused"),
    );
    seed_folder_and_chat(&h.store, "d1").await;

    let err = h
        .orchestrator
        .send_message("question", "d1", "no-such-chat")
        .await
        .unwrap_err();
    assert!(err.to_string().contains("not found"));
}

#[tokio::test]
async fn single_file_upload_carries_file_metadata() {
    let h = harness(
        ChatBehavior::Succeed("ok".to_string()),
        MockCompletions::answering("unused"),
    );

    h.assistant
        .upload_file_content(USER, "d1", "report body", "report.txt")
        .await
        .unwrap();

    let files = h.assistant_api.files.lock().unwrap().clone();
    assert_eq!(files.len(), 1);
    assert_eq!(files[0].name, "report.txt");
    let metadata = files[0].metadata.as_ref().unwrap();
    assert_eq!(metadata.folder_id, "d1");
    assert_eq!(metadata.file_name.as_deref(), Some("report.txt"));
    assert!(metadata.batch_file_name.is_none());
}

#[tokio::test]
async fn create_or_get_assistant_is_idempotent() {
    let h = harness(
        ChatBehavior::Succeed("ok".to_string()),
        MockCompletions::answering("unused"),
    );

    let first = h.assistant.create_or_get_assistant(USER).await.unwrap();
    assert!(!first.existed);

    let second = h.assistant.create_or_get_assistant(USER).await.unwrap();
    assert!(second.existed);
    assert_eq!(first.assistant_name, second.assistant_name);

    // Exactly one remote assistant was created.
    assert_eq!(h.assistant_api.created.lock().unwrap().len(), 1);
}
