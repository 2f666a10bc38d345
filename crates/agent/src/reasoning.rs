//! The bounded reasoning loop.
//!
//! Each iteration:
//!
//! 1. runs the command chosen in the previous iteration and appends its
//!    output to the conversation
//! 2. asks the model whether the task is already complete
//! 3. otherwise asks for the next step as a JSON object and records it
//!
//! The loop ends on `TaskComplete`, on `Ask`, or after `max_iterations`
//! with [`TaskOutcome::Unable`].

use crate::request::{RequestChannel, RequestError};
use chrono::Utc;
use daisy_commands::{CommandCandidate, CommandMatcher, ExampleIndex, MatchOutcome};
use daisy_config::ReasoningConfig;
use daisy_core::error::ToolError;
use daisy_core::event::{DomainEvent, EventBus};
use daisy_core::message::{Conversation, Message};
use daisy_core::provider::{ChatRequest, EmbeddingProvider};
use daisy_core::store::ConversationStore;
use daisy_core::tool::ToolRegistry;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fmt;
use std::sync::Arc;
use std::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

/// Pseudo-command: the task is done, the argument is the answer.
pub const TASK_COMPLETE: &str = "TaskComplete";

/// Pseudo-command: the user must clarify, the argument is the question.
pub const ASK: &str = "Ask";

/// One step chosen by the model.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReasoningStep {
    pub thought: String,
    pub command: String,
    pub argument: String,
}

impl ReasoningStep {
    /// The step in the shape the model is asked to answer with.
    pub fn to_json(&self) -> String {
        serde_json::json!({ "thoughts": self }).to_string()
    }

    /// Parse a model reply into a step.
    ///
    /// Accepts text around the JSON object, the `{"thoughts": {...}}`
    /// envelope or a bare step object, and non-string arguments.
    pub fn parse(reply: &str) -> Option<Self> {
        let value = json_object(reply)?;
        let step = match value.get("thoughts") {
            Some(inner) if inner.is_object() => inner,
            _ => &value,
        };

        let command = step.get("command")?.as_str()?.trim();
        if command.is_empty() {
            return None;
        }

        let text = |key: &str| match step.get(key) {
            None | Some(Value::Null) => String::new(),
            Some(Value::String(s)) => s.trim().to_string(),
            Some(other) => other.to_string(),
        };

        Some(Self {
            thought: text("thought"),
            command: command.to_string(),
            argument: text("argument"),
        })
    }
}

/// The outermost `{...}` of a model reply, parsed as JSON.
pub(crate) fn json_object(reply: &str) -> Option<Value> {
    let start = reply.find('{')?;
    let end = reply.rfind('}')?;
    if end < start {
        return None;
    }
    serde_json::from_str(&reply[start..=end]).ok()
}

/// How a reasoning run ended.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TaskOutcome {
    /// There was nothing to do
    Idle,
    Complete(String),
    AskUser(String),
    /// The loop gave up; the text says why
    Unable(String),
    Cancelled,
}

impl TaskOutcome {
    pub fn label(&self) -> &'static str {
        match self {
            Self::Idle => "idle",
            Self::Complete(_) => "complete",
            Self::AskUser(_) => "ask_user",
            Self::Unable(_) => "unable",
            Self::Cancelled => "cancelled",
        }
    }

    /// Instructions for the model that phrases the final answer.
    ///
    /// `None` when there is nothing to pass on.
    pub fn render(&self) -> Option<String> {
        match self {
            Self::Idle | Self::Cancelled => None,
            Self::Complete(answer) => Some(format!(
                "The task has been carried out. Answer the user using only this information, \
                 with no extraneous content:\n{answer}"
            )),
            Self::AskUser(question) => Some(format!(
                "More information is needed before the task can continue. \
                 Ask the user this clarifying question and nothing else:\n{question}"
            )),
            Self::Unable(reason) => Some(format!(
                "The task could not be completed ({reason}). \
                 Tell the user plainly that you were unable to complete it."
            )),
        }
    }
}

impl fmt::Display for TaskOutcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Idle => write!(f, "nothing to do"),
            Self::Complete(answer) => write!(f, "complete: {answer}"),
            Self::AskUser(question) => write!(f, "needs input: {question}"),
            Self::Unable(reason) => write!(f, "could not complete the task: {reason}"),
            Self::Cancelled => write!(f, "cancelled"),
        }
    }
}

/// Chooses and runs tools until a task is done.
pub struct ReasoningLoop {
    channel: Arc<RequestChannel>,
    tools: ToolRegistry,
    model: String,
    config: ReasoningConfig,
    embedder: Option<Arc<dyn EmbeddingProvider>>,
    examples: Arc<ExampleIndex>,
    store: Option<Arc<dyn ConversationStore>>,
    event_bus: Option<Arc<EventBus>>,
}

impl ReasoningLoop {
    pub fn new(channel: Arc<RequestChannel>, tools: ToolRegistry, model: impl Into<String>) -> Self {
        Self {
            channel,
            tools,
            model: model.into(),
            config: ReasoningConfig::default(),
            embedder: None,
            examples: Arc::new(ExampleIndex::new()),
            store: None,
            event_bus: None,
        }
    }

    pub fn with_config(mut self, config: ReasoningConfig) -> Self {
        self.config = config;
        self
    }

    pub fn with_max_iterations(mut self, max: usize) -> Self {
        self.config.max_iterations = max.max(1);
        self
    }

    /// Enable command suggestions from example embeddings.
    pub fn with_matcher(mut self, embedder: Arc<dyn EmbeddingProvider>, examples: Arc<ExampleIndex>) -> Self {
        self.embedder = Some(embedder);
        self.examples = examples;
        self
    }

    /// Persist every message the loop adds.
    pub fn with_store(mut self, store: Arc<dyn ConversationStore>) -> Self {
        self.store = Some(store);
        self
    }

    pub fn with_event_bus(mut self, bus: Arc<EventBus>) -> Self {
        self.event_bus = Some(bus);
        self
    }

    pub fn tools(&self) -> &ToolRegistry {
        &self.tools
    }

    fn publish(&self, event: DomainEvent) {
        if let Some(bus) = &self.event_bus {
            bus.publish(event);
        }
    }

    /// Work on the last user message of `conversation` until a terminal state.
    ///
    /// Tool outputs and chosen steps are appended to `conversation`.
    pub async fn run(&self, conversation: &mut Conversation, cancel: &CancellationToken) -> TaskOutcome {
        let Some(task) = conversation
            .last_user_message()
            .map(|m| m.content.trim().to_string())
            .filter(|t| !t.is_empty())
        else {
            debug!("No user task, reasoning loop idle");
            return TaskOutcome::Idle;
        };

        info!(task = %task, tools = self.tools.len(), "Reasoning started");
        self.publish(DomainEvent::TaskStarted {
            task: task.clone(),
            timestamp: Utc::now(),
        });

        let candidates = CommandCandidate::from_registry(&self.tools, &self.examples);
        let suggestion = self.suggest(&task, &candidates).await;

        let (outcome, iterations) = self
            .iterate(conversation, &task, &candidates, suggestion.as_deref(), cancel)
            .await;

        info!(outcome = outcome.label(), iterations, "Reasoning finished");
        self.publish(DomainEvent::TaskFinished {
            outcome: outcome.label().to_string(),
            iterations,
            timestamp: Utc::now(),
        });
        outcome
    }

    async fn iterate(
        &self,
        conversation: &mut Conversation,
        task: &str,
        candidates: &[CommandCandidate],
        suggestion: Option<&str>,
        cancel: &CancellationToken,
    ) -> (TaskOutcome, usize) {
        let mut pending: Option<ReasoningStep> = None;

        for iteration in 1..=self.config.max_iterations {
            debug!(iteration, "Reasoning iteration");

            if let Some(step) = pending.take() {
                let Some(output) = self.run_command(&step, cancel).await else {
                    return (TaskOutcome::Cancelled, iteration);
                };
                self.record(conversation, Message::user(output)).await;
            }

            match self.completion_check(conversation, task, cancel).await {
                Ok(None) => {}
                Ok(Some(summary)) => return (TaskOutcome::Complete(summary), iteration),
                Err(e) => return (failure(e), iteration),
            }

            conversation.truncate_user_messages(self.config.truncate_over, self.config.truncate_keep);

            let prompt = validity_prompt(task, candidates, suggestion);
            let reply = match self.ask(conversation, prompt, None, cancel).await {
                Ok(reply) => reply,
                Err(e) => return (failure(e), iteration),
            };

            let Some(step) = ReasoningStep::parse(&reply) else {
                warn!(iteration, reply = %reply, "Could not parse a step from the reply");
                continue;
            };

            debug!(iteration, command = %step.command, thought = %step.thought, "Step chosen");
            match step.command.as_str() {
                TASK_COMPLETE => return (TaskOutcome::Complete(step.argument), iteration),
                ASK => return (TaskOutcome::AskUser(step.argument), iteration),
                _ => {
                    self.publish(DomainEvent::StepPlanned {
                        iteration,
                        thought: step.thought.clone(),
                        command: step.command.clone(),
                        argument: step.argument.clone(),
                        timestamp: Utc::now(),
                    });
                    self.record(conversation, Message::assistant(step.to_json())).await;
                    pending = Some(step);
                }
            }
        }

        warn!(max_iterations = self.config.max_iterations, "Iteration limit reached");
        (
            TaskOutcome::Unable(format!(
                "no answer after {} reasoning steps",
                self.config.max_iterations
            )),
            self.config.max_iterations,
        )
    }

    /// The best matching command, when it clears the threshold.
    async fn suggest(&self, task: &str, candidates: &[CommandCandidate]) -> Option<String> {
        let embedder = self.embedder.clone()?;
        let matcher = CommandMatcher::new(embedder, candidates.to_vec(), self.config.match_threshold);

        match matcher.determine_command(task).await {
            Ok(MatchOutcome::Matched(result)) => {
                debug!(command = %result.best.name, confidence = result.best.confidence, "Suggesting command");
                Some(format!(
                    "Suggested command: {} (confidence {:.0}%)",
                    result.best.name, result.best.confidence
                ))
            }
            Ok(MatchOutcome::BelowThreshold(result)) => {
                debug!(best = %result.best.name, confidence = result.best.confidence, "No command above threshold");
                None
            }
            Ok(MatchOutcome::NoCommands) => None,
            Err(e) => {
                warn!(error = %e, "Command matching failed, continuing without a suggestion");
                None
            }
        }
    }

    /// Run a chosen command. Failures become the output text; `None` means cancelled.
    async fn run_command(&self, step: &ReasoningStep, cancel: &CancellationToken) -> Option<String> {
        let started = Instant::now();
        let result = self.tools.execute(&step.command, &step.argument, cancel).await;
        let duration_ms = u64::try_from(started.elapsed().as_millis()).unwrap_or(u64::MAX);

        self.publish(DomainEvent::ToolExecuted {
            tool_name: step.command.clone(),
            success: result.is_ok(),
            duration_ms,
            timestamp: Utc::now(),
        });

        let output = match result {
            Ok(output) => output,
            Err(ToolError::Cancelled(_)) if cancel.is_cancelled() => return None,
            Err(e) => {
                warn!(tool = %step.command, error = %e, "Command failed");
                format!("Error: {e}")
            }
        };
        debug!(tool = %step.command, duration_ms, "Command finished");
        Some(format!("Output of {} {}:\n{output}", step.command, step.argument))
    }

    /// `Some(summary)` when the model says the task is already done.
    async fn completion_check(
        &self,
        conversation: &Conversation,
        task: &str,
        cancel: &CancellationToken,
    ) -> Result<Option<String>, RequestError> {
        let question = format!(
            "Task: {task}\n\
             Is the task complete given this conversation? Answer only \"yes\" or \"no\"."
        );
        let answer = self
            .ask(conversation, question, Some(self.config.completion_check_tokens), cancel)
            .await?;
        if !is_yes(&answer) {
            return Ok(None);
        }

        let summary = self
            .ask(
                conversation,
                format!("Task: {task}\nDescribe in one sentence what was accomplished."),
                Some(self.config.summary_tokens),
                cancel,
            )
            .await?;
        Ok(Some(summary.trim().to_string()))
    }

    /// One round trip: the latest messages plus a trailing prompt.
    async fn ask(
        &self,
        conversation: &Conversation,
        prompt: String,
        max_tokens: Option<u32>,
        cancel: &CancellationToken,
    ) -> Result<String, RequestError> {
        let mut messages = conversation.recent(self.config.context_messages).to_vec();
        messages.push(Message::user(prompt));

        let request = ChatRequest::new(self.model.clone(), messages)
            .with_temperature(self.config.temperature)
            .with_max_tokens(max_tokens);
        let completion = self.channel.request(request, cancel).await?;
        if completion.partial {
            return Err(RequestError::Cancelled);
        }
        Ok(completion.text)
    }

    async fn record(&self, conversation: &mut Conversation, message: Message) {
        if let Some(store) = &self.store
            && let Err(e) = store.append(&message).await
        {
            warn!(error = %e, "Failed to persist reasoning message");
        }
        conversation.push(message);
    }
}

fn failure(error: RequestError) -> TaskOutcome {
    match error {
        RequestError::Cancelled => TaskOutcome::Cancelled,
        other => {
            warn!(error = %other, "Reasoning request failed");
            TaskOutcome::Unable(other.to_string())
        }
    }
}

fn is_yes(answer: &str) -> bool {
    answer
        .trim_start_matches(|c: char| !c.is_alphanumeric())
        .to_lowercase()
        .starts_with("yes")
}

/// The prompt asking for the next step.
fn validity_prompt(task: &str, candidates: &[CommandCandidate], suggestion: Option<&str>) -> String {
    let mut prompt = format!("Task: {task}\n\n");
    prompt.push_str("Choose the next command that moves this task forward.\n\nCommands:\n");

    for (i, candidate) in candidates.iter().enumerate() {
        prompt.push_str(&format!(
            "{}. {}: {} Argument: {}\n",
            i + 1,
            candidate.name,
            candidate.description,
            candidate.argument_format
        ));
    }
    let n = candidates.len();
    prompt.push_str(&format!(
        "{}. {TASK_COMPLETE}: The task is done. Argument: <the complete answer for the user>\n",
        n + 1
    ));
    prompt.push_str(&format!(
        "{}. {ASK}: Information only the user can give is missing. Argument: <the question to ask>\n",
        n + 2
    ));

    if let Some(suggestion) = suggestion {
        prompt.push_str(&format!("\n{suggestion}\n"));
    }

    prompt.push_str(
        "\nRespond with exactly one JSON object and nothing else, in this shape:\n\
         {\"thoughts\": {\"thought\": \"<your reasoning>\", \"command\": \"<command name>\", \"argument\": \"<argument>\"}}\n",
    );
    prompt
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_helpers::{Scripted, ScriptedProvider, StaticTool};
    use daisy_core::error::ProviderError;
    use daisy_core::message::{Role, TRUNCATION_MARKER};
    use daisy_memory::InMemoryStore;
    use std::time::Duration;

    fn step(command: &str, argument: &str) -> String {
        ReasoningStep {
            thought: "next".into(),
            command: command.into(),
            argument: argument.into(),
        }
        .to_json()
    }

    fn reasoning(provider: Arc<ScriptedProvider>, tools: ToolRegistry) -> ReasoningLoop {
        let channel = RequestChannel::new(provider).with_retry_delay(Duration::from_millis(1));
        ReasoningLoop::new(Arc::new(channel), tools, "test-model")
    }

    fn conversation(task: &str) -> Conversation {
        let mut c = Conversation::new();
        c.push(Message::user(task));
        c
    }

    #[tokio::test]
    async fn joke_completes_in_one_iteration_without_tools() {
        let provider = Arc::new(ScriptedProvider::replies(&[
            "no",
            step(TASK_COMPLETE, "Why did the robot cross the road? It was programmed to.").as_str(),
        ]));
        let mut convo = conversation("tell me a joke");

        let outcome = reasoning(provider.clone(), ToolRegistry::new())
            .run(&mut convo, &CancellationToken::new())
            .await;

        assert_eq!(
            outcome,
            TaskOutcome::Complete("Why did the robot cross the road? It was programmed to.".into())
        );
        assert_eq!(provider.call_count(), 2);
    }

    #[tokio::test]
    async fn completion_check_yes_asks_for_summary() {
        let provider = Arc::new(ScriptedProvider::replies(&["Yes.", "Told the user a joke."]));
        let mut convo = conversation("tell me a joke");

        let outcome = reasoning(provider.clone(), ToolRegistry::new())
            .run(&mut convo, &CancellationToken::new())
            .await;

        assert_eq!(outcome, TaskOutcome::Complete("Told the user a joke.".into()));
        let requests = provider.requests();
        assert_eq!(requests[0].max_tokens, Some(10));
        assert_eq!(requests[1].max_tokens, Some(200));
    }

    #[tokio::test]
    async fn runs_chosen_tool_then_completes() {
        let weather = Arc::new(StaticTool::ok("Weather", "Rome: sunny, 24°C"));
        let mut tools = ToolRegistry::new();
        tools.register(weather.clone());
        let store = Arc::new(InMemoryStore::new());

        let provider = Arc::new(ScriptedProvider::replies(&[
            "no",
            step("Weather", "Rome").as_str(),
            "yes",
            "Reported sunny weather in Rome.",
        ]));
        let mut convo = conversation("What's the weather in Rome tomorrow");

        let outcome = reasoning(provider.clone(), tools)
            .with_store(store.clone())
            .run(&mut convo, &CancellationToken::new())
            .await;

        assert_eq!(outcome, TaskOutcome::Complete("Reported sunny weather in Rome.".into()));
        assert_eq!(weather.calls(), 1);

        // step, then tool output
        let added = &convo.messages[1..];
        assert_eq!(added.len(), 2);
        assert_eq!(added[0].role, Role::Assistant);
        assert!(added[0].content.contains("\"command\":\"Weather\""));
        assert_eq!(added[1].role, Role::User);
        assert!(added[1].content.contains("Rome: sunny, 24°C"));
        assert_eq!(store.snapshot().await.len(), 2);

        // The tool output reaches the completion check
        let third = &provider.requests()[2];
        assert!(third.messages.iter().any(|m| m.content.contains("Rome: sunny")));
    }

    #[tokio::test]
    async fn long_conversations_send_only_recent_messages() {
        let provider = Arc::new(ScriptedProvider::replies(&["no", step(TASK_COMPLETE, "done").as_str()]));
        let mut convo = Conversation::new();
        for i in 0..30 {
            convo.push(Message::user(format!("old question {i}")));
            convo.push(Message::assistant(format!("old answer {i}")));
        }
        convo.push(Message::user("what time is it"));

        let config = ReasoningConfig {
            context_messages: 4,
            ..ReasoningConfig::default()
        };
        let outcome = reasoning(provider.clone(), ToolRegistry::new())
            .with_config(config)
            .run(&mut convo, &CancellationToken::new())
            .await;
        assert_eq!(outcome, TaskOutcome::Complete("done".into()));

        for request in provider.requests() {
            assert_eq!(request.messages.len(), 5);
            assert!(request.messages.iter().all(|m| !m.content.contains("old question 0")));
            assert_eq!(request.messages[0].content, "old answer 28");
            assert_eq!(request.messages[3].content, "what time is it");
            assert!(request.messages[4].content.contains("Task: what time is it"));
        }
    }

    #[tokio::test]
    async fn ask_pseudo_command() {
        let provider = Arc::new(ScriptedProvider::replies(&["no", step(ASK, "Which city?").as_str()]));
        let mut convo = conversation("what's the weather");
        let outcome = reasoning(provider, ToolRegistry::new())
            .run(&mut convo, &CancellationToken::new())
            .await;
        assert_eq!(outcome, TaskOutcome::AskUser("Which city?".into()));
    }

    #[tokio::test]
    async fn inconclusive_tool_hits_the_iteration_limit() {
        let search = Arc::new(StaticTool::ok("Search", "nothing conclusive"));
        let mut tools = ToolRegistry::new();
        tools.register(search.clone());

        let mut script = Vec::new();
        for _ in 0..3 {
            script.push("no".to_string());
            script.push(step("Search", "meaning of life"));
        }
        let replies: Vec<&str> = script.iter().map(String::as_str).collect();
        let provider = Arc::new(ScriptedProvider::replies(&replies));
        let mut convo = conversation("find the meaning of life");

        let outcome = reasoning(provider.clone(), tools)
            .with_max_iterations(3)
            .run(&mut convo, &CancellationToken::new())
            .await;

        assert!(matches!(outcome, TaskOutcome::Unable(_)));
        assert_eq!(provider.call_count(), 6);
        assert_eq!(search.calls(), 2);
    }

    #[tokio::test]
    async fn unparseable_reply_consumes_an_iteration() {
        let provider = Arc::new(ScriptedProvider::replies(&[
            "no",
            "I think we should check the weather",
            "no",
            step(TASK_COMPLETE, "done").as_str(),
        ]));
        let mut convo = conversation("something");
        let outcome = reasoning(provider.clone(), ToolRegistry::new())
            .with_max_iterations(2)
            .run(&mut convo, &CancellationToken::new())
            .await;
        assert_eq!(outcome, TaskOutcome::Complete("done".into()));
        assert_eq!(convo.messages.len(), 1);
    }

    #[tokio::test]
    async fn tool_error_becomes_output() {
        let mut tools = ToolRegistry::new();
        tools.register(Arc::new(StaticTool::failing("Calculator", "division by zero")));

        let provider = Arc::new(ScriptedProvider::replies(&[
            "no",
            step("Calculator", "1 / 0").as_str(),
            "no",
            step("Missing", "x").as_str(),
            "no",
            step(TASK_COMPLETE, "cannot divide by zero").as_str(),
        ]));
        let mut convo = conversation("divide 1 by 0");
        let outcome = reasoning(provider, tools)
            .run(&mut convo, &CancellationToken::new())
            .await;

        assert_eq!(outcome, TaskOutcome::Complete("cannot divide by zero".into()));
        let outputs: Vec<&Message> = convo.messages.iter().filter(|m| m.role == Role::User).skip(1).collect();
        assert!(outputs[0].content.contains("Error: Tool execution failed: Calculator: division by zero"));
        assert!(outputs[1].content.contains("Error: Tool not found: Missing"));
    }

    #[tokio::test]
    async fn long_user_messages_are_truncated_before_sending() {
        let long = "a".repeat(1200);
        let provider = Arc::new(ScriptedProvider::replies(&["no", step(TASK_COMPLETE, "ok").as_str()]));
        let mut convo = Conversation::new();
        convo.push(Message::user(long.clone()));
        convo.push(Message::assistant("b".repeat(1200)));
        convo.push(Message::user("summarise that"));

        reasoning(provider.clone(), ToolRegistry::new())
            .run(&mut convo, &CancellationToken::new())
            .await;

        let first = &convo.messages[0].content;
        assert_eq!(first.chars().count(), 975 + TRUNCATION_MARKER.len());
        assert_eq!(first.chars().count(), 997);
        assert!(first.ends_with(TRUNCATION_MARKER));
        assert_eq!(convo.messages[1].content.len(), 1200);

        // The step request saw the truncated history
        let sent = &provider.requests()[1];
        assert!(sent.messages[0].content.ends_with(TRUNCATION_MARKER));
    }

    #[tokio::test]
    async fn no_task_is_idle() {
        let provider = Arc::new(ScriptedProvider::replies(&[]));
        let mut convo = Conversation::new();
        convo.push(Message::assistant("hi there"));
        let outcome = reasoning(provider.clone(), ToolRegistry::new())
            .run(&mut convo, &CancellationToken::new())
            .await;
        assert_eq!(outcome, TaskOutcome::Idle);
        assert_eq!(provider.call_count(), 0);
    }

    #[tokio::test]
    async fn request_failure_is_unable() {
        let provider = Arc::new(ScriptedProvider::new(vec![Scripted::Error(
            ProviderError::ModelNotFound("nope".into()),
        )]));
        let mut convo = conversation("anything");
        let outcome = reasoning(provider, ToolRegistry::new())
            .run(&mut convo, &CancellationToken::new())
            .await;
        let TaskOutcome::Unable(reason) = outcome else {
            panic!("expected Unable, got {outcome:?}");
        };
        assert!(reason.contains("Model not found"));
    }

    #[tokio::test]
    async fn cancelled_before_start() {
        let provider = Arc::new(ScriptedProvider::replies(&["no"]));
        let cancel = CancellationToken::new();
        cancel.cancel();
        let mut convo = conversation("anything");
        let outcome = reasoning(provider, ToolRegistry::new()).run(&mut convo, &cancel).await;
        assert_eq!(outcome, TaskOutcome::Cancelled);
    }

    #[test]
    fn prompt_lists_tools_in_registration_order() {
        let candidate = |name: &str| CommandCandidate {
            name: name.into(),
            description: format!("{name} things."),
            argument_format: "<x>".into(),
            example_embeddings: vec![],
        };
        let prompt = validity_prompt(
            "task here",
            &[candidate("Weather"), candidate("Calculator")],
            Some("Suggested command: Weather (confidence 91%)"),
        );
        let weather = prompt.find("1. Weather").unwrap();
        let calc = prompt.find("2. Calculator").unwrap();
        assert!(weather < calc);
        assert!(prompt.contains("3. TaskComplete"));
        assert!(prompt.contains("4. Ask"));
        assert!(prompt.contains("Suggested command: Weather"));
        assert!(prompt.contains(r#"{"thoughts": {"thought""#));
    }

    #[test]
    fn tolerant_step_parsing() {
        let wrapped = "Sure! Here you go:\n```json\n{\"thoughts\": {\"thought\": \"t\", \"command\": \"Weather\", \"argument\": \"Rome\"}}\n```";
        assert_eq!(
            ReasoningStep::parse(wrapped).unwrap(),
            ReasoningStep {
                thought: "t".into(),
                command: "Weather".into(),
                argument: "Rome".into(),
            }
        );

        let bare = r#"{"command": "Calculator", "argument": 42}"#;
        let parsed = ReasoningStep::parse(bare).unwrap();
        assert_eq!(parsed.argument, "42");
        assert_eq!(parsed.thought, "");

        assert!(ReasoningStep::parse("no json here").is_none());
        assert!(ReasoningStep::parse(r#"{"thoughts": {"thought": "x"}}"#).is_none());
        assert!(ReasoningStep::parse(r#"{"command": ""}"#).is_none());
        assert!(ReasoningStep::parse("} backwards {").is_none());
    }

    #[test]
    fn yes_detection() {
        assert!(is_yes("Yes"));
        assert!(is_yes("  \"yes.\""));
        assert!(!is_yes("No, not yet"));
        assert!(!is_yes(""));
    }

    #[test]
    fn rendered_outcomes_are_distinct() {
        let complete = TaskOutcome::Complete("42".into()).render().unwrap();
        let ask = TaskOutcome::AskUser("Which city?".into()).render().unwrap();
        let unable = TaskOutcome::Unable("limit".into()).render().unwrap();
        assert!(complete.contains("using only this information"));
        assert!(ask.contains("Which city?"));
        assert!(unable.contains("unable to complete"));
        assert!(TaskOutcome::Idle.render().is_none());
        assert!(TaskOutcome::Cancelled.render().is_none());
    }
}
