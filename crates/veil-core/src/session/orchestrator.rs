//! The orchestration loop
//!
//! One `Session` turns a user query into a final answer:
//!
//! 1. redact the query and append it to a working copy of the history
//! 2. ask the model; a final answer ends the turn
//! 3. otherwise record the requested calls, then for each call restore the
//!    emails in its arguments, invoke the tool, redact the result and append
//!    it as a tool message
//! 4. go back to 2, at most `max_round_trips` times
//!
//! The working copy replaces the committed history only when the turn
//! succeeds. A failed or cancelled turn keeps its partial conversation
//! aside, see [`Session::take_failed_turn`].

use futures::future::join_all;
use serde_json::Value;
use std::sync::Arc;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use super::types::{trace_line, LoopState, SessionId, TurnEvent, TurnOutcome};
use crate::catalog::ToolCatalog;
use crate::config::OrchestrationConfig;
use crate::conversation::{Conversation, ToolCall};
use crate::error::{Error, Result, ToolError};
use crate::gateway::{Completion, ModelGateway};
use crate::invoker::{ToolInvoker, ToolResult};
use crate::redaction::RedactionCodec;

/// A conversation with a model, its tools and its redaction codec
pub struct Session {
    id: SessionId,
    gateway: Arc<dyn ModelGateway>,
    invoker: Arc<dyn ToolInvoker>,
    codec: RedactionCodec,
    config: OrchestrationConfig,
    history: Conversation,
    failed_turn: Option<Conversation>,
    events: Option<mpsc::Sender<TurnEvent>>,
}

impl Session {
    pub fn new(
        gateway: Arc<dyn ModelGateway>,
        invoker: Arc<dyn ToolInvoker>,
        codec: RedactionCodec,
    ) -> Self {
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            gateway,
            invoker,
            codec,
            config: OrchestrationConfig::default(),
            history: Conversation::new(),
            failed_turn: None,
            events: None,
        }
    }

    pub fn with_id(mut self, id: impl Into<SessionId>) -> Self {
        self.id = id.into();
        self
    }

    pub fn with_config(mut self, config: OrchestrationConfig) -> Self {
        self.config = config;
        self
    }

    /// Send progress events to `events`
    pub fn with_events(mut self, events: mpsc::Sender<TurnEvent>) -> Self {
        self.events = Some(events);
        self
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn config(&self) -> &OrchestrationConfig {
        &self.config
    }

    pub fn codec(&self) -> &RedactionCodec {
        &self.codec
    }

    /// Committed history. Holds redacted text only.
    pub fn history(&self) -> &Conversation {
        &self.history
    }

    /// Partial conversation of the last failed turn, if any
    pub fn take_failed_turn(&mut self) -> Option<Conversation> {
        self.failed_turn.take()
    }

    /// Forget the history. The redaction store is left alone.
    pub fn clear_history(&mut self) {
        self.history.clear();
        self.failed_turn = None;
    }

    /// Forget the history and empty the redaction store
    pub fn reset(&mut self) {
        self.clear_history();
        self.codec.store().reset();
    }

    /// Run one turn to completion
    pub async fn run_turn(&mut self, query: &str) -> Result<TurnOutcome> {
        self.run_turn_with_cancel(query, CancellationToken::new()).await
    }

    /// Run one turn, aborting with `Error::Cancelled` when `cancel` fires.
    ///
    /// Cancellation lands between appends, so the partial conversation is
    /// always well formed.
    pub async fn run_turn_with_cancel(
        &mut self,
        query: &str,
        cancel: CancellationToken,
    ) -> Result<TurnOutcome> {
        let mut working = self.history.clone();

        let result = tokio::select! {
            biased;
            _ = cancel.cancelled() => Err(Error::Cancelled),
            result = self.drive(query, &mut working) => result,
        };

        match result {
            Ok(outcome) => {
                info!(
                    session_id = %self.id,
                    round_trips = outcome.round_trips,
                    "Turn completed"
                );
                self.history = working;
                self.failed_turn = None;
                Ok(outcome)
            }
            Err(e) => {
                warn!(session_id = %self.id, error = %e, "Turn failed");
                self.emit(TurnEvent::failed(e.to_string())).await;
                self.failed_turn = Some(working);
                Err(e)
            }
        }
    }

    async fn drive(&self, query: &str, working: &mut Conversation) -> Result<TurnOutcome> {
        let mut state = LoopState::Start;

        working.push_user(self.codec.redact_text(query)?);

        let catalog = ToolCatalog::new(self.invoker.list_tools().await?);
        debug!(session_id = %self.id, tools = ?catalog.names(), "Tool catalog loaded");

        let mut tool_trace = Vec::new();
        let mut round_trips = 0;

        loop {
            self.transition(&mut state, LoopState::AwaitingModel).await;

            match self.gateway.complete(working, &catalog).await? {
                Completion::FinalAnswer(text) => {
                    self.transition(&mut state, LoopState::FinalAnswer).await;
                    let answer = self.codec.reconstruct_text(&text);
                    working.push_assistant(text);
                    self.transition(&mut state, LoopState::Done).await;

                    return Ok(TurnOutcome {
                        answer,
                        tool_trace,
                        round_trips,
                    });
                }
                Completion::ToolCallsRequested(calls) => {
                    round_trips += 1;
                    if round_trips > self.config.max_round_trips {
                        return Err(Error::ToolCallLoopExceeded {
                            limit: self.config.max_round_trips,
                        });
                    }

                    self.transition(&mut state, LoopState::InvokingTools).await;
                    debug!(
                        session_id = %self.id,
                        round_trip = round_trips,
                        calls = calls.len(),
                        "Model requested tools"
                    );
                    working.push_tool_calls(calls.clone());

                    if self.config.parallel_tool_calls && calls.len() > 1 {
                        let results =
                            join_all(calls.iter().map(|call| self.invoke_call(call, &catalog)))
                                .await;
                        // Append in request order, not completion order
                        for (call, (result, arguments)) in calls.iter().zip(results) {
                            self.record(working, call, result, &arguments, &mut tool_trace)?;
                        }
                    } else {
                        for call in &calls {
                            let (result, arguments) = self.invoke_call(call, &catalog).await;
                            self.record(working, call, result, &arguments, &mut tool_trace)?;
                        }
                    }
                }
            }
        }
    }

    /// Invoke one call with its emails restored. Returns the result and the
    /// arguments actually sent.
    async fn invoke_call(&self, call: &ToolCall, catalog: &ToolCatalog) -> (ToolResult, Value) {
        self.emit(TurnEvent::tool_started(&call.id, &call.name)).await;
        let arguments = self.codec.reconstruct_value(&call.arguments);

        let result = if catalog.contains(&call.name) {
            debug!(session_id = %self.id, tool = %call.name, call_id = %call.id, "Invoking tool");
            self.invoker.invoke(&call.name, arguments.clone()).await
        } else {
            warn!(session_id = %self.id, tool = %call.name, "Model requested unknown tool");
            ToolError::UnknownTool(call.name.clone()).into()
        };

        self.emit(TurnEvent::tool_finished(&call.id, &call.name, result.is_error))
            .await;
        (result, arguments)
    }

    /// Redact a tool result and append it to the conversation
    fn record(
        &self,
        working: &mut Conversation,
        call: &ToolCall,
        result: ToolResult,
        arguments: &Value,
        tool_trace: &mut Vec<String>,
    ) -> Result<()> {
        let content = self.codec.redact(&result.content)?;
        working.push_tool_result(&call.id, &call.name, content, result.is_error)?;

        if self.config.tool_trace {
            tool_trace.push(trace_line(&call.name, arguments));
        }
        Ok(())
    }

    async fn transition(&self, state: &mut LoopState, next: LoopState) {
        debug_assert!(state.can_transition_to(next), "{} -> {}", state, next);
        debug!(session_id = %self.id, from = %state, to = %next, "Loop state");
        *state = next;
        self.emit(TurnEvent::state(next)).await;
    }

    async fn emit(&self, event: TurnEvent) {
        if let Some(events) = &self.events {
            // A dropped receiver only means nobody is watching
            let _ = events.send(event).await;
        }
    }
}
