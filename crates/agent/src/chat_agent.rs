//! The chat agent: one conversation with a model, its memory and its tools.

use std::fmt;
use std::sync::Arc;
use crate::completion::{self, Completion};
use crate::dispatcher::{self, FunctionCallingRecord, ToolDispatcher};
use crate::response::{AgentResponse, StepInfo};
use crate::termination::{TerminationContext, TerminationReason, Terminator, TokenLimitTerminator};
use parley_core::blocking;
use parley_core::error::Result;
use parley_core::event::{DomainEvent, EventBus};
use parley_core::message::{BackendRole, FunctionCallPayload, Message};
use parley_core::model::{FunctionCallRequest, ModelBackend, ModelConfig, ModelRequest};
use parley_core::token::{HeuristicTokenCounter, TokenCounter};
use parley_core::tool::{Tool, ToolRegistry};
use parley_memory::{ChatHistoryMemory, ContextWindow, MemoryRecord};
use tracing::{debug, info, warn};

/// Tool round-trips allowed in one step before the model must answer in text.
pub const DEFAULT_MAX_TOOL_DEPTH: usize = 25;

/// What the step needs next.
enum Next {
    Model(ModelRequest),
    Tool(FunctionCallRequest),
    Done(AgentResponse),
}

/// Per-step bookkeeping.
#[derive(Default)]
struct StepState {
    prompt_tokens: usize,
    depth: usize,
    tool_calls: Vec<FunctionCallingRecord>,
    /// The assistant's function-call message, committed with its result.
    pending_call: Option<Message>,
}

/// A conversational agent.
///
/// Each [`step`](Self::step) takes one input message, consults the model
/// (running any tools it asks for along the way) and returns the candidate
/// replies. Everything exchanged is kept in memory and replayed, within the
/// context window, on the next step.
pub struct ChatAgent {
    /// System message as given, without any output-language directive
    orig_system_message: Message,

    /// System message currently in effect
    system_message: Message,

    output_language: Option<String>,

    model: Arc<dyn ModelBackend>,

    model_config: ModelConfig,

    memory: ChatHistoryMemory,

    counter: Arc<dyn TokenCounter>,

    dispatcher: ToolDispatcher,

    /// Always evaluated first
    token_limit: TokenLimitTerminator,

    /// Additional rules, evaluated in registration order
    terminators: Vec<Box<dyn Terminator>>,

    message_window_size: Option<usize>,

    max_tool_depth: usize,

    terminated: bool,

    event_bus: Option<Arc<EventBus>>,
}

impl ChatAgent {
    /// Create an agent with no tools, the model's own token limit and a
    /// token-bounded context window.
    pub fn new(system_message: Message, model: Arc<dyn ModelBackend>) -> Self {
        let token_limit = model.token_limit();
        let counter: Arc<dyn TokenCounter> = Arc::new(HeuristicTokenCounter);
        Self {
            memory: ChatHistoryMemory::new(
                system_message.clone(),
                ContextWindow::Tokens(token_limit),
                Arc::clone(&counter),
            ),
            orig_system_message: system_message.clone(),
            system_message,
            output_language: None,
            model,
            model_config: ModelConfig::default(),
            counter,
            dispatcher: ToolDispatcher::new(ToolRegistry::new()),
            token_limit: TokenLimitTerminator::new(token_limit),
            terminators: Vec::new(),
            message_window_size: None,
            max_tool_depth: DEFAULT_MAX_TOOL_DEPTH,
            terminated: false,
            event_bus: None,
        }
    }

    pub fn with_model_config(mut self, config: ModelConfig) -> Self {
        self.model_config = config;
        self
    }

    /// Override the token ceiling (defaults to the model's limit).
    pub fn with_token_limit(mut self, token_limit: usize) -> Self {
        self.token_limit = TokenLimitTerminator::new(token_limit.max(1));
        self.memory.set_window(self.context_window());
        self
    }

    /// Keep only the last `size` records in the context instead of bounding
    /// it by tokens.
    pub fn with_message_window(mut self, size: usize) -> Self {
        self.message_window_size = Some(size.max(1));
        self.memory.set_window(self.context_window());
        self
    }

    /// Register tools. Fails if two tools share a name.
    pub fn with_tools(mut self, tools: impl IntoIterator<Item = Box<dyn Tool>>) -> Result<Self> {
        for tool in tools {
            self.dispatcher.register(tool)?;
        }
        Ok(self)
    }

    /// Add a termination rule after the built-in token limit.
    pub fn with_terminator(mut self, terminator: Box<dyn Terminator>) -> Self {
        self.terminators.push(terminator);
        self
    }

    pub fn with_max_tool_depth(mut self, depth: usize) -> Self {
        self.max_tool_depth = depth.max(1);
        self
    }

    /// Replace the token counter. Records already in memory are dropped.
    pub fn with_token_counter(mut self, counter: Arc<dyn TokenCounter>) -> Self {
        self.memory = ChatHistoryMemory::new(
            self.system_message.clone(),
            self.context_window(),
            Arc::clone(&counter),
        );
        self.counter = counter;
        self
    }

    pub fn with_event_bus(mut self, event_bus: Arc<EventBus>) -> Self {
        self.dispatcher.set_event_bus(Arc::clone(&event_bus));
        self.event_bus = Some(event_bus);
        self
    }

    pub fn with_output_language(mut self, language: impl Into<String>) -> Self {
        self.set_output_language(language);
        self
    }

    fn context_window(&self) -> ContextWindow {
        match self.message_window_size {
            Some(size) => ContextWindow::Messages(size),
            None => ContextWindow::Tokens(self.token_limit.token_limit()),
        }
    }

    fn publish(&self, event: DomainEvent) {
        if let Some(bus) = &self.event_bus {
            bus.publish(event);
        }
    }

    // ── Accessors ──

    pub fn system_message(&self) -> &Message {
        &self.system_message
    }

    pub fn output_language(&self) -> Option<&str> {
        self.output_language.as_deref()
    }

    /// Whether a termination rule has fired since the last reset.
    pub fn terminated(&self) -> bool {
        self.terminated
    }

    pub fn memory(&self) -> &ChatHistoryMemory {
        &self.memory
    }

    pub fn memory_mut(&mut self) -> &mut ChatHistoryMemory {
        &mut self.memory
    }

    pub fn model_config(&self) -> &ModelConfig {
        &self.model_config
    }

    pub fn token_limit(&self) -> usize {
        self.token_limit.token_limit()
    }

    pub fn max_tool_depth(&self) -> usize {
        self.max_tool_depth
    }

    pub fn is_tools_added(&self) -> bool {
        !self.dispatcher.is_empty()
    }

    pub fn tool_names(&self) -> Vec<&str> {
        self.dispatcher.names()
    }

    // ── Conversation state ──

    /// Return memory to just the system message and clear `terminated`.
    ///
    /// Termination rules forget their counters but stay registered.
    pub fn reset(&mut self) {
        self.terminated = false;
        self.memory.clear();
        self.memory.set_system_message(self.system_message.clone());
        self.token_limit.reset();
        for terminator in &mut self.terminators {
            terminator.reset();
        }
        self.publish(DomainEvent::MemoryReset {
            timestamp: chrono::Utc::now(),
        });
    }

    /// Ask the model to answer in `language` from now on.
    ///
    /// The directive is appended to the original system message, so calling
    /// this again replaces the language rather than stacking directives.
    pub fn set_output_language(&mut self, language: impl Into<String>) -> &Message {
        let language = language.into();
        let content = format!(
            "{}\nRegardless of the input language, you must output text in {language}.",
            self.orig_system_message.content()
        );
        self.system_message = self.orig_system_message.with_content(content);
        self.memory.set_system_message(self.system_message.clone());
        self.output_language = Some(language);
        &self.system_message
    }

    /// Append a message to memory under the given backend role.
    pub fn update_memory(&mut self, message: Message, role: BackendRole) {
        self.memory.write_record(MemoryRecord::new(message, role));
    }

    /// Record a message chosen from a step's candidates as the assistant's
    /// reply.
    pub fn record_message(&mut self, message: Message) {
        self.update_memory(message, BackendRole::Assistant);
    }

    /// The response for a step whose token count hit the ceiling: no
    /// messages, terminated, and the reason.
    pub fn step_token_exceed(
        &self,
        num_tokens: usize,
        tool_calls: Vec<FunctionCallingRecord>,
        reason: TerminationReason,
    ) -> AgentResponse {
        Self::withheld(num_tokens, tool_calls, vec![reason])
    }

    fn withheld(
        num_tokens: usize,
        tool_calls: Vec<FunctionCallingRecord>,
        termination_reasons: Vec<TerminationReason>,
    ) -> AgentResponse {
        AgentResponse {
            msgs: Vec::new(),
            terminated: true,
            info: StepInfo {
                id: None,
                usage: None,
                termination_reasons,
                num_tokens,
                tool_calls,
                finish_reasons: Vec::new(),
            },
        }
    }

    // ── Stepping ──

    /// Run one step, blocking the calling thread.
    ///
    /// Works outside any runtime and inside a multi-threaded tokio runtime.
    /// From a current-thread runtime use [`step_async`](Self::step_async).
    pub fn step(&mut self, input: Message) -> Result<AgentResponse> {
        let mut state = StepState::default();
        let mut next = self.begin_step(input, &mut state);
        loop {
            next = match next {
                Next::Done(response) => return Ok(response),
                Next::Model(request) => {
                    let model = Arc::clone(&self.model);
                    let counter = Arc::clone(&self.counter);
                    let completion = blocking::block_on(completion::fetch(
                        model.as_ref(),
                        request,
                        state.prompt_tokens,
                        counter.as_ref(),
                    ))??;
                    self.on_completion(&mut state, completion)
                }
                Next::Tool(call) => {
                    let record = self.dispatcher.dispatch(&call)?;
                    self.on_tool_record(&mut state, record)
                }
            };
        }
    }

    /// Run one step, awaiting the model and any asynchronous tools.
    pub async fn step_async(&mut self, input: Message) -> Result<AgentResponse> {
        let mut state = StepState::default();
        let mut next = self.begin_step(input, &mut state);
        loop {
            next = match next {
                Next::Done(response) => return Ok(response),
                Next::Model(request) => {
                    let model = Arc::clone(&self.model);
                    let counter = Arc::clone(&self.counter);
                    let completion = completion::fetch(
                        model.as_ref(),
                        request,
                        state.prompt_tokens,
                        counter.as_ref(),
                    )
                    .await?;
                    self.on_completion(&mut state, completion)
                }
                Next::Tool(call) => {
                    let record = self.dispatcher.dispatch_async(&call).await?;
                    self.on_tool_record(&mut state, record)
                }
            };
        }
    }

    fn begin_step(&mut self, input: Message, state: &mut StepState) -> Next {
        info!(
            role = %self.system_message.role_name(),
            records = self.memory.len(),
            "Processing step"
        );
        self.update_memory(input, BackendRole::User);
        self.next_request(state)
    }

    /// Assemble the context and either build the next model request or end
    /// the step because the context alone is over the ceiling.
    fn next_request(&mut self, state: &mut StepState) -> Next {
        let assembled = self.memory.assemble_context();
        let num_tokens = assembled.total_tokens;
        state.prompt_tokens = num_tokens;

        let ctx = TerminationContext {
            messages: &[],
            num_tokens,
        };
        if let Some(reason) = self.token_limit.check(&ctx) {
            warn!(num_tokens, limit = self.token_limit.token_limit(), "Context exceeds token limit");
            return Next::Done(self.terminate_withheld(
                num_tokens,
                std::mem::take(&mut state.tool_calls),
                vec![reason],
            ));
        }

        // The newest record is this step's input or the tool result the model
        // is waiting for; without it there is nothing to answer.
        if assembled.omits_newest() {
            let needed = num_tokens
                + self
                    .memory
                    .records()
                    .last()
                    .map_or(0, |record| self.counter.count_turn(&record.to_turn()));
            warn!(
                num_tokens = needed,
                limit = self.token_limit.token_limit(),
                "Newest record does not fit in the token limit"
            );
            return Next::Done(self.terminate_withheld(
                needed,
                std::mem::take(&mut state.tool_calls),
                vec![TerminationReason::MaxTokensExceeded],
            ));
        }
        let turns = assembled.turns;

        let tools = if state.depth < self.max_tool_depth {
            self.dispatcher.schemas()
        } else {
            Vec::new()
        };

        debug!(
            depth = state.depth,
            turns = turns.len(),
            tokens = num_tokens,
            tools = tools.len(),
            "Requesting completion"
        );

        Next::Model(ModelRequest {
            turns,
            tools,
            config: self.model_config.clone(),
        })
    }

    fn on_completion(&mut self, state: &mut StepState, completion: Completion) -> Next {
        self.publish(DomainEvent::ResponseGenerated {
            response_id: completion.id.clone(),
            model: completion.model.clone(),
            tokens_used: completion.usage.total_tokens,
            timestamp: chrono::Utc::now(),
        });

        let call = completion
            .choices
            .iter()
            .find_map(|choice| choice.function_call.as_ref().map(|call| (choice, call)));

        match call {
            Some((choice, call)) if state.depth < self.max_tool_depth => {
                let request = Message::new(
                    self.system_message.role_name(),
                    self.system_message.role_type(),
                    choice.content.clone().unwrap_or_default(),
                )
                .with_function_call(FunctionCallPayload {
                    name: call.name.clone(),
                    arguments: dispatcher::parse_arguments(&call.arguments).unwrap_or_default(),
                    result: None,
                });
                state.pending_call = Some(request);
                Next::Tool(call.clone())
            }
            Some((_, call)) => {
                warn!(
                    tool = %call.name,
                    max_tool_depth = self.max_tool_depth,
                    "Max tool depth reached, ignoring function call"
                );
                Next::Done(self.finish_step(state, completion))
            }
            None => Next::Done(self.finish_step(state, completion)),
        }
    }

    fn on_tool_record(&mut self, state: &mut StepState, record: FunctionCallingRecord) -> Next {
        let result = Message::new(
            self.system_message.role_name(),
            self.system_message.role_type(),
            "",
        )
        .with_function_call(FunctionCallPayload {
            name: record.func_name.clone(),
            arguments: record.args.clone(),
            result: Some(record.result.clone()),
        });
        if let Some(request) = state.pending_call.take() {
            self.update_memory(request, BackendRole::Assistant);
        }
        self.update_memory(result, BackendRole::Function);

        state.tool_calls.push(record);
        state.depth += 1;
        self.next_request(state)
    }

    fn finish_step(&mut self, state: &mut StepState, completion: Completion) -> AgentResponse {
        let msgs: Vec<Message> = completion
            .choices
            .iter()
            .map(|choice| {
                Message::new(
                    self.system_message.role_name(),
                    self.system_message.role_type(),
                    choice.content.clone().unwrap_or_default(),
                )
                .with_meta(serde_json::Map::new())
            })
            .collect();

        let num_tokens = state.prompt_tokens + completion.usage.completion_tokens;
        let reasons = self.evaluate(&msgs, num_tokens);
        let tool_calls = std::mem::take(&mut state.tool_calls);

        if reasons.iter().any(TerminationReason::discards_content) {
            return self.terminate_withheld(num_tokens, tool_calls, reasons);
        }

        if !reasons.is_empty() {
            self.mark_terminated(&reasons, num_tokens);
        }

        for msg in &msgs {
            self.update_memory(msg.clone(), BackendRole::Assistant);
        }

        AgentResponse {
            msgs,
            terminated: self.terminated,
            info: StepInfo {
                id: Some(completion.id),
                usage: Some(completion.usage),
                termination_reasons: reasons,
                num_tokens,
                tool_calls,
                finish_reasons: completion
                    .choices
                    .into_iter()
                    .map(|c| c.finish_reason.unwrap_or_default())
                    .collect(),
            },
        }
    }

    fn evaluate(&mut self, msgs: &[Message], num_tokens: usize) -> Vec<TerminationReason> {
        let ctx = TerminationContext {
            messages: msgs,
            num_tokens,
        };
        std::iter::once(self.token_limit.check(&ctx))
            .chain(self.terminators.iter_mut().map(|t| {
                let reason = t.check(&ctx);
                if let Some(reason) = &reason {
                    debug!(rule = t.name(), %reason, "Termination rule fired");
                }
                reason
            }))
            .flatten()
            .collect()
    }

    fn terminate_withheld(
        &mut self,
        num_tokens: usize,
        tool_calls: Vec<FunctionCallingRecord>,
        reasons: Vec<TerminationReason>,
    ) -> AgentResponse {
        self.mark_terminated(&reasons, num_tokens);
        Self::withheld(num_tokens, tool_calls, reasons)
    }

    fn mark_terminated(&mut self, reasons: &[TerminationReason], num_tokens: usize) {
        self.terminated = true;
        info!(
            reasons = ?reasons.iter().map(ToString::to_string).collect::<Vec<_>>(),
            num_tokens,
            "Conversation terminated"
        );
        self.publish(DomainEvent::StepTerminated {
            reasons: reasons.iter().map(ToString::to_string).collect(),
            num_tokens,
            timestamp: chrono::Utc::now(),
        });
    }
}

impl fmt::Display for ChatAgent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "ChatAgent({}, {}, {})",
            self.system_message.role_name(),
            self.system_message.role_type(),
            self.model.name()
        )
    }
}

impl fmt::Debug for ChatAgent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ChatAgent")
            .field("system_message", &self.system_message)
            .field("model", &self.model.name())
            .field("memory", &self.memory)
            .field("dispatcher", &self.dispatcher)
            .field("max_tool_depth", &self.max_tool_depth)
            .field("terminated", &self.terminated)
            .finish()
    }
}
