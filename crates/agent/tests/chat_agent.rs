//! End-to-end behaviour of the chat agent against scripted and stub models.

use std::sync::{Arc, Mutex};
use async_trait::async_trait;
use parley_agent::{ChatAgent, ResponseWordsTerminator, TerminationReason};
use parley_core::error::{Error, ProviderError, ToolError};
use parley_core::event::{DomainEvent, EventBus};
use parley_core::message::{BackendRole, Image, ImageDetail, Message, TurnContent};
use parley_core::model::{
    Choice, ModelBackend, ModelConfig, ModelRequest, ModelResponse, StubModel, Usage,
};
use parley_core::token::{HeuristicTokenCounter, TokenCounter};
use parley_memory::{ContextWindow, MemoryRecord};

const SYSTEM: &str = "You are a help assistant.";

fn system() -> Message {
    Message::assistant("assistant", SYSTEM)
}

fn user(content: &str) -> Message {
    Message::user("User", content)
}

/// Replays scripted responses in order and keeps every request.
struct ScriptedModel {
    responses: Mutex<Vec<ModelResponse>>,
    requests: Mutex<Vec<ModelRequest>>,
}

impl ScriptedModel {
    fn new(mut responses: Vec<ModelResponse>) -> Arc<Self> {
        responses.reverse();
        Arc::new(Self {
            responses: Mutex::new(responses),
            requests: Mutex::new(Vec::new()),
        })
    }

    fn requests(&self) -> Vec<ModelRequest> {
        self.requests.lock().unwrap().clone()
    }
}

#[async_trait]
impl ModelBackend for ScriptedModel {
    fn name(&self) -> &str {
        "scripted"
    }

    async fn complete(&self, request: ModelRequest) -> Result<ModelResponse, ProviderError> {
        self.requests.lock().unwrap().push(request);
        Ok(self
            .responses
            .lock()
            .unwrap()
            .pop()
            .expect("ScriptedModel: no more responses"))
    }
}

fn text(content: &str) -> ModelResponse {
    ModelResponse {
        id: "resp-text".into(),
        model: "scripted".into(),
        choices: vec![Choice::text(0, content)],
        usage: Some(Usage::new(20, 3)),
    }
}

fn call(name: &str, arguments: serde_json::Value) -> ModelResponse {
    ModelResponse {
        id: "resp-call".into(),
        model: "scripted".into(),
        choices: vec![Choice::call(0, name, arguments)],
        usage: Some(Usage::new(20, 3)),
    }
}

// ── Memory window ──

#[test]
fn message_window_keeps_system_and_last_records() {
    for window in 1..4 {
        let mut agent = ChatAgent::new(system(), Arc::new(StubModel)).with_message_window(window);
        assert_eq!(agent.memory().window(), ContextWindow::Messages(window));
        for i in 0..6 {
            agent.update_memory(user(&format!("Tell me joke {i}.")), BackendRole::User);
        }
        let (turns, _) = agent.memory().get_context();
        assert_eq!(turns.len(), window + 1);
        assert_eq!(turns[0].text_content(), SYSTEM);
        assert_eq!(turns.last().unwrap().text_content(), "Tell me joke 5.");
    }
}

#[test]
fn default_window_is_bounded_by_tokens() {
    let agent = ChatAgent::new(system(), Arc::new(StubModel)).with_token_limit(512);
    assert_eq!(agent.memory().window(), ContextWindow::Tokens(512));
    assert_eq!(agent.token_limit(), 512);
}

// ── Output language ──

#[test]
fn output_language_set_repeatedly_keeps_one_directive() {
    let mut agent = ChatAgent::new(system(), Arc::new(StubModel));
    for language in ["French", "Spanish", "Arabic"] {
        agent.set_output_language(language);
    }
    let content = agent.system_message().content();
    assert!(content.starts_with(SYSTEM));
    assert_eq!(content.matches("Regardless of the input language").count(), 1);
    assert!(content.ends_with("you must output text in Arabic."));
    assert_eq!(agent.memory().system_record().message.content(), content);
}

// ── Termination ──

#[test]
fn one_token_ceiling_ends_step_without_calling_model() {
    // An empty script panics if the model is consulted.
    let model = ScriptedModel::new(vec![]);
    let mut agent = ChatAgent::new(system(), model.clone()).with_token_limit(1);

    let response = agent.step(user("Hello!")).unwrap();

    assert!(response.msgs.is_empty());
    assert!(response.terminated);
    assert!(agent.terminated());
    assert_eq!(
        response.info.termination_reasons,
        [TerminationReason::MaxTokensExceeded]
    );
    let system_tokens =
        HeuristicTokenCounter.count_turn(&agent.memory().system_record().to_turn());
    assert_eq!(response.info.num_tokens, system_tokens);
    assert!(model.requests().is_empty());
}

#[test]
fn step_token_exceed_info_shape() {
    let agent = ChatAgent::new(system(), Arc::new(StubModel));
    let response = agent.step_token_exceed(1000, vec![], TerminationReason::MaxTokensExceeded);
    assert!(response.msgs.is_empty());
    assert!(response.terminated);
    assert_eq!(
        serde_json::Value::Object(response.info.to_map().unwrap()),
        serde_json::json!({
            "id": null,
            "usage": null,
            "termination_reasons": ["max_tokens_exceeded"],
            "num_tokens": 1000,
            "tool_calls": [],
            "finish_reasons": [],
        })
    );
}

#[test]
fn word_trigger_keeps_content() {
    let model = ScriptedModel::new(vec![text("It was nice talking to you, goodbye.")]);
    let mut agent = ChatAgent::new(system(), model).with_terminator(Box::new(
        ResponseWordsTerminator::new([("goodbye", 1)]).unwrap(),
    ));

    let response = agent.step(user("I have to go.")).unwrap();

    assert!(response.terminated);
    assert!(response.info.termination_reasons[0].to_string().contains("goodbye"));
    assert_eq!(
        response.msg().unwrap().content(),
        "It was nice talking to you, goodbye."
    );
    // the reply is still remembered
    assert_eq!(
        agent.memory().records().last().unwrap().message.content(),
        "It was nice talking to you, goodbye."
    );
}

#[test]
fn reset_restores_system_record_only() {
    let mut agent = ChatAgent::new(system(), Arc::new(StubModel)).with_terminator(Box::new(
        ResponseWordsTerminator::new([("Lorem", 1)]).unwrap(),
    ));
    agent.step(user("Hi")).unwrap();
    assert!(agent.terminated());
    assert_eq!(agent.memory().len(), 3);

    agent.reset();

    assert!(!agent.terminated());
    assert_eq!(agent.memory().len(), 1);
    let (turns, _) = agent.memory().get_context();
    assert_eq!(turns.len(), 1);
    assert_eq!(turns[0].text_content(), SYSTEM);
}

// ── Tools ──

#[test]
fn mul_call_is_recorded_in_memory_and_info() {
    let model = ScriptedModel::new(vec![
        call("mul", serde_json::json!({"a": 2, "b": 8})),
        text("2 times 8 is 16."),
    ]);
    let mut agent = ChatAgent::new(system(), model.clone())
        .with_tools(parley_tools::math_tools())
        .unwrap();
    assert!(agent.is_tools_added());
    assert_eq!(agent.tool_names(), ["add", "sub", "mul"]);

    let response = agent.step(user("What is 2 * 8?")).unwrap();

    assert_eq!(response.msg().unwrap().content(), "2 times 8 is 16.");
    let record = &response.info.tool_calls[0];
    assert_eq!(record.func_name, "mul");
    assert_eq!(
        serde_json::Value::Object(record.args.clone()),
        serde_json::json!({"a": 2, "b": 8})
    );
    assert_eq!(record.result, 16);

    let function_records: Vec<&MemoryRecord> = agent
        .memory()
        .records()
        .iter()
        .filter(|r| r.backend_role == BackendRole::Function)
        .collect();
    assert_eq!(function_records.len(), 1);
    let payload = function_records[0].message.function_call().unwrap();
    assert_eq!(payload.name, "mul");
    assert_eq!(payload.result, Some(serde_json::json!(16)));

    // the second request sees the call and its result
    let requests = model.requests();
    assert_eq!(requests.len(), 2);
    assert_eq!(requests[1].turns.len(), 4);
    assert_eq!(requests[1].turns[3].role, BackendRole::Function);
    assert_eq!(requests[1].turns[3].text_content(), "16");
}

#[test]
fn unknown_tool_is_surfaced() {
    let model = ScriptedModel::new(vec![call("div", serde_json::json!({"a": 1, "b": 1}))]);
    let mut agent = ChatAgent::new(system(), model)
        .with_tools(parley_tools::math_tools())
        .unwrap();
    let err = agent.step(user("1 / 1?")).unwrap_err();
    assert!(matches!(err, Error::Tool(ToolError::NotFound(name)) if name == "div"));
}

#[test]
fn failed_dispatch_leaves_no_unanswered_call() {
    let model = ScriptedModel::new(vec![
        call("div", serde_json::json!({"a": 1, "b": 1})),
        text("I cannot divide, sorry."),
    ]);
    let mut agent = ChatAgent::new(system(), model.clone())
        .with_tools(parley_tools::math_tools())
        .unwrap();
    assert!(agent.step(user("1 / 1?")).is_err());

    let roles: Vec<_> = agent.memory().records().iter().map(|r| r.backend_role).collect();
    assert_eq!(roles, [BackendRole::User]);

    agent.step(user("Never mind.")).unwrap();
    let requests = model.requests();
    let turns = &requests[1].turns;
    assert!(turns.iter().all(|t| t.function_call.is_none()));
    let roles: Vec<_> = turns.iter().map(|t| t.role).collect();
    assert_eq!(
        roles,
        [BackendRole::System, BackendRole::User, BackendRole::User]
    );
}

#[test]
fn oversized_input_terminates_instead_of_being_dropped() {
    // An empty script panics if the model is consulted.
    let model = ScriptedModel::new(vec![]);
    let mut agent = ChatAgent::new(system(), model.clone()).with_token_limit(30);

    let question = "x".repeat(400);
    let response = agent.step(user(&question)).unwrap();

    assert!(response.terminated);
    assert!(response.msgs.is_empty());
    assert_eq!(
        response.info.termination_reasons,
        [TerminationReason::MaxTokensExceeded]
    );
    let counter = HeuristicTokenCounter;
    let expected = counter.count_turn(&agent.memory().system_record().to_turn())
        + counter.count_turn(&agent.memory().records()[0].to_turn());
    assert_eq!(response.info.num_tokens, expected);
    assert!(response.info.num_tokens > 30);
    assert!(model.requests().is_empty());
}

#[test]
fn failing_tool_result_goes_back_to_model() {
    let model = ScriptedModel::new(vec![
        call("mul", serde_json::json!({"a": i64::MAX, "b": 2})),
        text("That overflowed."),
    ]);
    let mut agent = ChatAgent::new(system(), model)
        .with_tools(parley_tools::math_tools())
        .unwrap();
    let response = agent.step(user("Big numbers")).unwrap();
    let result = response.info.tool_calls[0].result.as_str().unwrap();
    assert!(result.starts_with("Error: "));
}

#[tokio::test(start_paused = true)]
async fn async_step_awaits_async_tool() {
    let model = ScriptedModel::new(vec![call("sleep", serde_json::json!({"second": 2})), text("Done.")]);
    let mut agent = ChatAgent::new(system(), model)
        .with_tools(parley_tools::default_tools())
        .unwrap();

    let started = tokio::time::Instant::now();
    let response = agent.step_async(user("Take a nap.")).await.unwrap();

    assert!(started.elapsed() >= std::time::Duration::from_secs(2));
    assert_eq!(response.info.tool_calls[0].result, 2);
    assert_eq!(response.msg().unwrap().content(), "Done.");
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn blocking_and_async_steps_record_the_same_call() {
    let script = || {
        vec![
            call("sleep", serde_json::json!({"second": 0})),
            call("mul", serde_json::json!({"a": 3, "b": 7})),
            text("21"),
        ]
    };

    let mut blocking = ChatAgent::new(system(), ScriptedModel::new(script()))
        .with_tools(parley_tools::default_tools())
        .unwrap();
    let mut awaiting = ChatAgent::new(system(), ScriptedModel::new(script()))
        .with_tools(parley_tools::default_tools())
        .unwrap();

    let from_blocking = blocking.step(user("go")).unwrap();
    let from_async = awaiting.step_async(user("go")).await.unwrap();

    assert_eq!(from_blocking.info.tool_calls, from_async.info.tool_calls);
    assert_eq!(from_blocking.info.tool_calls.len(), 2);
    assert_eq!(from_blocking.info.tool_calls[1].result, 21);
}

#[tokio::test]
async fn blocking_step_refused_on_current_thread_runtime() {
    let mut agent = ChatAgent::new(system(), Arc::new(StubModel));
    let err = agent.step(user("Hi")).unwrap_err();
    assert!(matches!(err, Error::Runtime(_)));

    // the async entry point works on the same runtime
    let response = agent.step_async(user("Hi again")).await.unwrap();
    assert_eq!(response.msg().unwrap().content(), StubModel::REPLY);
}

// ── Candidates, vision, streaming ──

#[test]
fn several_candidates_are_all_returned_and_remembered() {
    let mut agent = ChatAgent::new(system(), Arc::new(StubModel)).with_model_config(ModelConfig {
        n: 3,
        ..ModelConfig::default()
    });

    let response = agent.step(user("Hello!")).unwrap();

    assert_eq!(response.msgs.len(), 3);
    assert!(response.msgs.iter().all(|m| m.content() == StubModel::REPLY));
    assert_eq!(response.info.finish_reasons, ["stop", "stop", "stop"]);
    assert!(matches!(
        response.msg(),
        Err(Error::SingleMessageExpected { count: 3 })
    ));
    // user + three candidates
    assert_eq!(agent.memory().records().len(), 4);
}

#[test]
fn image_input_reaches_model_as_parts() {
    let model = ScriptedModel::new(vec![text("A red square.")]);
    let mut agent = ChatAgent::new(system(), model.clone());
    let input = user("What is in this picture?")
        .with_images(vec![Image::png(vec![0x89, 0x50, 0x4e, 0x47])], ImageDetail::Low);

    agent.step(input).unwrap();

    let requests = model.requests();
    let turn = &requests[0].turns[1];
    assert_eq!(turn.image_count(), 1);
    match &turn.content {
        TurnContent::Parts(parts) => assert_eq!(parts.len(), 2),
        TurnContent::Text(_) => panic!("image turn rendered as plain text"),
    }
}

#[test]
fn streamed_response_without_usage_is_counted() {
    let model = ScriptedModel::new(vec![ModelResponse {
        id: "resp-stream".into(),
        model: "scripted".into(),
        choices: vec![Choice::text(0, "abcdefgh")],
        usage: None,
    }]);
    let mut agent = ChatAgent::new(system(), model).with_model_config(ModelConfig {
        stream: true,
        ..ModelConfig::default()
    });

    let response = agent.step(user("Hello!")).unwrap();

    let usage = response.info.usage.unwrap();
    assert_eq!(usage.completion_tokens, 2);
    assert_eq!(usage.total_tokens, usage.prompt_tokens + 2);
    assert_eq!(response.info.num_tokens, usage.total_tokens);
    assert_eq!(response.info.id.as_deref(), Some("resp-stream"));
    assert_eq!(response.msg().unwrap().content(), "abcdefgh");
}

// ── Events ──

#[tokio::test]
async fn step_publishes_events() {
    let bus = Arc::new(EventBus::new(16));
    let mut rx = bus.subscribe();
    let model = ScriptedModel::new(vec![call("add", serde_json::json!({"a": 1, "b": 2})), text("3")]);
    let mut agent = ChatAgent::new(system(), model)
        .with_tools(parley_tools::math_tools())
        .unwrap()
        .with_event_bus(Arc::clone(&bus));

    agent.step_async(user("1 + 2?")).await.unwrap();
    agent.reset();

    let mut kinds = Vec::new();
    while let Ok(event) = rx.try_recv() {
        kinds.push(match event.as_ref() {
            DomainEvent::ResponseGenerated { .. } => "response",
            DomainEvent::ToolExecuted { .. } => "tool",
            DomainEvent::StepTerminated { .. } => "terminated",
            DomainEvent::MemoryReset { .. } => "reset",
        });
    }
    assert_eq!(kinds, ["response", "tool", "response", "reset"]);
}
