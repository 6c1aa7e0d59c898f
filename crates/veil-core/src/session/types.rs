//! Session types
//!
//! State names, progress events and turn results shared by the
//! orchestration loop and its frontends.

use serde::{Deserialize, Serialize};

/// Unique identifier for a session
pub type SessionId = String;

/// Orchestration loop state
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LoopState {
    Start,
    AwaitingModel,
    InvokingTools,
    FinalAnswer,
    Done,
}

impl LoopState {
    pub fn as_str(&self) -> &'static str {
        match self {
            LoopState::Start => "start",
            LoopState::AwaitingModel => "awaiting_model",
            LoopState::InvokingTools => "invoking_tools",
            LoopState::FinalAnswer => "final_answer",
            LoopState::Done => "done",
        }
    }

    /// Whether `next` may follow `self`
    pub fn can_transition_to(&self, next: LoopState) -> bool {
        matches!(
            (self, next),
            (LoopState::Start, LoopState::AwaitingModel)
                | (LoopState::AwaitingModel, LoopState::FinalAnswer)
                | (LoopState::AwaitingModel, LoopState::InvokingTools)
                | (LoopState::InvokingTools, LoopState::AwaitingModel)
                | (LoopState::FinalAnswer, LoopState::Done)
        )
    }
}

impl std::fmt::Display for LoopState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Progress notifications sent while a turn runs.
///
/// Events never carry argument or result payloads, only names and ids.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum TurnEvent {
    StateChanged { state: LoopState },
    ToolStarted { call_id: String, name: String },
    ToolFinished { call_id: String, name: String, is_error: bool },
    /// The turn ended with an error
    Failed { message: String },
}

impl TurnEvent {
    pub fn state(state: LoopState) -> Self {
        Self::StateChanged { state }
    }

    pub fn tool_started(call_id: impl Into<String>, name: impl Into<String>) -> Self {
        Self::ToolStarted {
            call_id: call_id.into(),
            name: name.into(),
        }
    }

    pub fn tool_finished(call_id: impl Into<String>, name: impl Into<String>, is_error: bool) -> Self {
        Self::ToolFinished {
            call_id: call_id.into(),
            name: name.into(),
            is_error,
        }
    }

    pub fn failed(message: impl Into<String>) -> Self {
        Self::Failed {
            message: message.into(),
        }
    }
}

/// Result of one successful turn
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TurnOutcome {
    /// Final answer with emails restored
    pub answer: String,
    /// `[Calling tool ... with args ...]` lines, with emails restored.
    /// Local display only; never sent to the model.
    pub tool_trace: Vec<String>,
    /// Model/tool round trips used
    pub round_trips: usize,
}

impl TurnOutcome {
    /// Trace lines followed by the answer, one per line
    pub fn render(&self) -> String {
        self.tool_trace
            .iter()
            .map(String::as_str)
            .chain(std::iter::once(self.answer.as_str()))
            .collect::<Vec<_>>()
            .join("\n")
    }
}

/// Format one tool trace line
pub(crate) fn trace_line(name: &str, arguments: &serde_json::Value) -> String {
    format!("[Calling tool {} with args {}]", name, arguments)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_transitions() {
        use LoopState::*;
        assert!(Start.can_transition_to(AwaitingModel));
        assert!(AwaitingModel.can_transition_to(InvokingTools));
        assert!(InvokingTools.can_transition_to(AwaitingModel));
        assert!(FinalAnswer.can_transition_to(Done));
        assert!(!InvokingTools.can_transition_to(Done));
        assert!(!Start.can_transition_to(Done));
        assert!(!Done.can_transition_to(AwaitingModel));
    }

    #[test]
    fn test_event_serialization() {
        let json = serde_json::to_value(TurnEvent::state(LoopState::AwaitingModel)).unwrap();
        assert_eq!(json["type"], "state_changed");
        assert_eq!(json["state"], "awaiting_model");

        let json = serde_json::to_value(TurnEvent::tool_finished("c1", "lookup", true)).unwrap();
        assert_eq!(json["type"], "tool_finished");
        assert_eq!(json["is_error"], true);
    }

    #[test]
    fn test_render() {
        let outcome = TurnOutcome {
            answer: "Alice has 2 tickets".into(),
            tool_trace: vec![trace_line("lookup", &serde_json::json!({ "user": "a@b.io" }))],
            round_trips: 1,
        };
        assert_eq!(
            outcome.render(),
            "[Calling tool lookup with args {\"user\":\"a@b.io\"}]\nAlice has 2 tickets"
        );
    }
}
