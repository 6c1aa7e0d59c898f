//! Session manager tests
//!
//! Store scoping, reset behavior and concurrent sessions.

use async_trait::async_trait;
use std::sync::Arc;
use veil_core::{
    Completion, Conversation, ModelGateway, RedactionCodec, RedactionConfig, Result, Role,
    Session, SessionManager, StoreScope, ToolCatalog, ToolDescriptor, ToolInvoker, ToolResult,
};

/// Answers with the last user message, as the model saw it
struct EchoGateway;

#[async_trait]
impl ModelGateway for EchoGateway {
    async fn complete(&self, conversation: &Conversation, _catalog: &ToolCatalog) -> Result<Completion> {
        let text = conversation
            .messages()
            .iter()
            .rev()
            .find(|m| m.role == Role::User)
            .and_then(|m| m.text())
            .unwrap_or_default();
        Ok(Completion::FinalAnswer(format!("you said: {}", text)))
    }
}

struct NoTools;

#[async_trait]
impl ToolInvoker for NoTools {
    async fn list_tools(&self) -> Result<Vec<ToolDescriptor>> {
        Ok(Vec::new())
    }

    async fn invoke(&self, name: &str, _arguments: serde_json::Value) -> ToolResult {
        ToolResult::failed(format!("Unknown tool: {}", name))
    }
}

fn manager(scope: StoreScope) -> SessionManager {
    let redaction = RedactionConfig {
        scope,
        ..Default::default()
    };
    let gateway: Arc<dyn ModelGateway> = Arc::new(EchoGateway);
    let invoker: Arc<dyn ToolInvoker> = Arc::new(NoTools);
    SessionManager::new(redaction, move |codec: RedactionCodec| {
        Session::new(gateway.clone(), invoker.clone(), codec)
    })
}

fn alice_token() -> String {
    let codec = RedactionCodec::new(Default::default(), RedactionConfig::default().salt);
    codec.token_for("alice@example.com")
}

mod lifecycle_tests {
    use super::*;

    #[tokio::test]
    async fn test_sessions_are_created_on_first_use() {
        let manager = manager(StoreScope::Session);
        assert_eq!(manager.session_count().await, 0);

        manager.run_turn("b", "hello").await.unwrap();
        manager.run_turn("a", "hello").await.unwrap();
        manager.run_turn("a", "again").await.unwrap();

        assert_eq!(manager.list_sessions().await, vec!["a", "b"]);
        let session = manager.session("a").await;
        let session = session.lock().await;
        assert_eq!(session.id(), "a");
        assert_eq!(session.history().len(), 4);
    }

    #[tokio::test]
    async fn test_remove_session() {
        let manager = manager(StoreScope::Session);
        manager.run_turn("a", "hello").await.unwrap();

        assert!(manager.remove_session("a").await);
        assert!(!manager.remove_session("a").await);
        assert!(!manager.has_session("a").await);
    }

    #[tokio::test]
    async fn test_answer_restores_emails() {
        let manager = manager(StoreScope::Session);
        let outcome = manager
            .run_turn("a", "tickets for alice@example.com")
            .await
            .unwrap();
        assert_eq!(outcome.answer, "you said: tickets for alice@example.com");

        let session = manager.session("a").await;
        let session = session.lock().await;
        let history = serde_json::to_string(session.history()).unwrap();
        assert!(history.contains(&alice_token()));
        assert!(!history.contains("alice@example.com"));
    }
}

mod scope_tests {
    use super::*;

    #[tokio::test]
    async fn test_session_scope_isolates_stores() {
        let manager = manager(StoreScope::Session);
        assert!(manager.process_store().is_none());

        manager.run_turn("a", "mail alice@example.com").await.unwrap();

        // Session b never saw the address, so the token stays opaque there
        let token = alice_token();
        let outcome = manager
            .run_turn("b", &format!("who is {}?", token))
            .await
            .unwrap();
        assert_eq!(outcome.answer, format!("you said: who is {}?", token));

        let a = manager.session("a").await;
        let b = manager.session("b").await;
        let (a, b) = (a.lock().await, b.lock().await);
        assert!(!a.codec().store().shares_with(b.codec().store()));
        assert_eq!(a.codec().store().len(), 1);
        assert!(b.codec().store().is_empty());
    }

    #[tokio::test]
    async fn test_process_scope_shares_one_store() {
        let manager = manager(StoreScope::Process);
        manager.run_turn("a", "mail alice@example.com").await.unwrap();

        let outcome = manager
            .run_turn("b", &format!("who is {}?", alice_token()))
            .await
            .unwrap();
        assert_eq!(outcome.answer, "you said: who is alice@example.com?");

        let store = manager.process_store().unwrap();
        let b = manager.session("b").await;
        assert!(b.lock().await.codec().store().shares_with(store));
        assert_eq!(store.len(), 1);
    }

    #[tokio::test]
    async fn test_reset_with_session_scope_empties_the_store() {
        let manager = manager(StoreScope::Session);
        manager.run_turn("a", "mail alice@example.com").await.unwrap();

        manager.reset_session("a").await;

        let session = manager.session("a").await;
        let session = session.lock().await;
        assert!(session.history().is_empty());
        assert!(session.codec().store().is_empty());
    }

    #[tokio::test]
    async fn test_reset_with_process_scope_keeps_the_store() {
        let manager = manager(StoreScope::Process);
        manager.run_turn("a", "mail alice@example.com").await.unwrap();
        manager.run_turn("b", "mail bob@example.org").await.unwrap();

        manager.reset_session("a").await;

        let session = manager.session("a").await;
        assert!(session.lock().await.history().is_empty());
        assert_eq!(manager.process_store().unwrap().len(), 2);
    }

    #[tokio::test]
    async fn test_concurrent_sessions_share_safely() {
        let manager = Arc::new(manager(StoreScope::Process));

        let turns: Vec<_> = (0..8)
            .map(|i| {
                let manager = manager.clone();
                tokio::spawn(async move {
                    manager
                        .run_turn(&format!("s{}", i), &format!("mail user{}@example.com", i))
                        .await
                })
            })
            .collect();

        for (i, turn) in turns.into_iter().enumerate() {
            let outcome = turn.await.unwrap().unwrap();
            assert_eq!(outcome.answer, format!("you said: mail user{}@example.com", i));
        }

        assert_eq!(manager.session_count().await, 8);
        assert_eq!(manager.process_store().unwrap().len(), 8);
    }
}
