//! The conversation orchestrator: one query in, one finalized response out.
//!
//! A single explicit state machine drives every query through the same
//! stages: parse → (search) → (vision) → assemble → generate, with a loop
//! edge from tool-call resolution back into assembly. Each stage is a
//! transform over [`ConversationState`]; the interpreter here only decides
//! what runs next.
//!
//! Failures never cross this boundary as errors. Whatever goes wrong,
//! be it model construction, provider trouble, or a panic in a stage, the caller
//! receives a response string, possibly a `⚠️`-prefixed one.

use super::assembler::MessageAssembler;
use super::context;
use super::postprocess::postprocess;
use super::state::{ConversationState, Stage};
use crate::config::OrchestratorConfig;
use crate::db::TranscriptStore;
use crate::messaging::StreamSender;
use crate::model::detect::{default_detectors, detect_tool_call, ToolCallDetector};
use crate::model::{ChatModel, Chunk, Completion, ModelError, ModelFactory, Turn};
use crate::search::{SearchContext, SearchResolver};
use crate::session::SessionRegistry;
use crate::tools::confirm::ConfirmationBus;
use crate::tools::coordinator::ToolCoordinator;
use crate::vision::VisionDescriber;
use futures::{FutureExt, StreamExt};
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use tokio::sync::Mutex;
use tracing::{debug, error, info, warn};

/// Per-query options supplied by the caller.
#[derive(Clone, Default)]
pub struct QueryOptions {
    /// Session whose history frames this query; empty means `"default"`.
    pub session_id: String,
    /// Explicit model override.
    pub model: Option<String>,
    /// Base64 image captured alongside the query.
    pub image_data: Option<String>,
    /// Where to publish partial responses; `None` runs single-shot.
    pub stream: Option<StreamSender>,
}

impl QueryOptions {
    pub fn session(session_id: impl Into<String>) -> Self {
        Self {
            session_id: session_id.into(),
            ..Default::default()
        }
    }
}

/// Terminal result of a pipeline run.
#[derive(Debug, Clone, PartialEq)]
pub struct PipelineOutput {
    pub response: String,
    /// Fence language captured by compose-mode postprocessing.
    pub detected_language: Option<String>,
}

/// How a generation pass ended.
enum Generation {
    ToolCall,
    Completed,
    Failed,
}

/// The top-level pipeline.
pub struct Orchestrator {
    config: OrchestratorConfig,
    models: Arc<dyn ModelFactory>,
    search: Arc<dyn SearchResolver>,
    vision: Arc<dyn VisionDescriber>,
    history: Arc<dyn TranscriptStore>,
    coordinator: ToolCoordinator,
    detectors: Vec<Box<dyn ToolCallDetector>>,
    /// Cached model handle keyed by its id. Requesting a different id
    /// rebuilds the handle; the mutex serializes rebuilds against any
    /// in-flight lookup.
    model_cache: Mutex<Option<(String, Arc<dyn ChatModel>)>>,
    sessions: SessionRegistry,
}

impl Orchestrator {
    pub fn new(
        config: OrchestratorConfig,
        models: Arc<dyn ModelFactory>,
        search: Arc<dyn SearchResolver>,
        vision: Arc<dyn VisionDescriber>,
        history: Arc<dyn TranscriptStore>,
        confirmations: Arc<ConfirmationBus>,
    ) -> Self {
        let coordinator =
            ToolCoordinator::new(confirmations).with_timeout(config.confirm_timeout);
        Self {
            config,
            models,
            search,
            vision,
            history,
            coordinator,
            detectors: default_detectors(),
            model_cache: Mutex::new(None),
            sessions: SessionRegistry::new(),
        }
    }

    pub fn config(&self) -> &OrchestratorConfig {
        &self.config
    }

    /// Run one query to a terminal response.
    pub async fn respond(&self, query: &str, opts: QueryOptions) -> PipelineOutput {
        let session_id = if opts.session_id.is_empty() {
            "default".to_string()
        } else {
            opts.session_id.clone()
        };

        let mut state = ConversationState::new(query, &session_id);
        state.model_name = opts.model.clone();
        state.image_data = opts.image_data.clone();

        let run = self.run(state, opts.stream.as_ref());
        let state = match AssertUnwindSafe(run).catch_unwind().await {
            Ok(state) => state,
            Err(panic) => {
                let msg = panic
                    .downcast_ref::<&str>()
                    .map(|s| s.to_string())
                    .or_else(|| panic.downcast_ref::<String>().cloned())
                    .unwrap_or_else(|| "unexpected pipeline failure".to_string());
                error!(panic = %msg, "pipeline panicked");
                let mut state = ConversationState::new(query, &session_id);
                state.response = format!("⚠️ Error: {msg}");
                if let Some(sender) = opts.stream.as_ref() {
                    sender.delta(state.response.clone());
                    sender.complete();
                }
                state
            }
        };

        self.sessions
            .set_detected_language(&session_id, state.detected_language.clone());

        PipelineOutput {
            response: state.response,
            detected_language: state.detected_language,
        }
    }

    /// Clear a session's transcript and bookkeeping.
    pub fn clear_history(&self, session_id: &str) {
        if let Err(e) = self.history.clear(session_id) {
            warn!(error = %e, session_id, "failed to clear session history");
        }
        self.sessions.clear(session_id);
    }

    /// Suggest a filename for saved content, using the most recent query
    /// and any compose-mode language detected this session.
    pub async fn suggest_filename(&self, content: &str, session_id: &str) -> String {
        let language = self.sessions.take_detected_language(session_id);
        let model = match self.model_handle(None).await {
            Ok(model) => model,
            Err(e) => {
                warn!(error = %e, "no model for filename suggestion, using fallback");
                return crate::filename::fallback_filename(language.as_deref());
            }
        };
        let recent_query = self
            .history
            .get(session_id)
            .ok()
            .and_then(|turns| {
                turns.iter().rev().find_map(|t| match t {
                    Turn::User { content } => Some(content.text().to_string()),
                    _ => None,
                })
            })
            .unwrap_or_default();

        crate::filename::suggest_filename(
            model.as_ref(),
            &self.config,
            &recent_query,
            content,
            language.as_deref(),
        )
        .await
    }

    /// The stage interpreter.
    async fn run(
        &self,
        mut state: ConversationState,
        stream: Option<&StreamSender>,
    ) -> ConversationState {
        let model = match self.model_handle(state.model_name.as_deref()).await {
            Ok(model) => model,
            Err(e) => {
                state.response = e.user_message();
                if let Some(sender) = stream {
                    sender.delta(state.response.clone());
                    sender.complete();
                }
                return state;
            }
        };

        let mut stage = Stage::Parse;
        let mut generation_failed = false;
        while stage != Stage::Done {
            debug!(?stage, "entering stage");
            stage = match stage {
                Stage::Parse => {
                    self.parse_stage(&mut state);
                    if state.use_web_search {
                        Stage::Search
                    } else if state.use_vision && state.image_data.is_some() {
                        Stage::Vision
                    } else {
                        Stage::Assemble
                    }
                }
                Stage::Search => {
                    self.search_stage(&mut state).await;
                    if state.use_vision && state.image_data.is_some() {
                        Stage::Vision
                    } else {
                        Stage::Assemble
                    }
                }
                Stage::Vision => {
                    self.vision_stage(&mut state).await;
                    Stage::Assemble
                }
                Stage::Assemble => {
                    let assembler = MessageAssembler::new(&self.config, self.history.as_ref());
                    state = assembler.assemble(std::mem::take(&mut state));
                    Stage::Generate
                }
                Stage::Generate => {
                    match self.generate_stage(&mut state, model.as_ref(), stream).await {
                        Generation::ToolCall => Stage::ToolCall,
                        Generation::Completed => Stage::Finalize,
                        Generation::Failed => {
                            generation_failed = true;
                            Stage::Finalize
                        }
                    }
                }
                Stage::ToolCall => {
                    self.tool_stage(&mut state, stream).await;
                    Stage::Assemble
                }
                Stage::Finalize => {
                    self.finalize_stage(&mut state, generation_failed, stream);
                    Stage::Done
                }
                Stage::Done => Stage::Done,
            };
        }
        state
    }

    /// Envelope extraction plus search classification over the raw query.
    fn parse_stage(&self, state: &mut ConversationState) {
        let parsed = context::parse(&state.query);
        state.query = parsed.query;
        if state.selected_text.is_none() {
            state.selected_text = parsed.selected_text;
        }
        if state.image_data.is_none() {
            state.image_data = parsed.image_data;
        }
        if let Some(mode) = parsed.mode {
            state.mode = mode;
        }
        state.web_search_requested = parsed.web_search;
        state.use_vision = state.image_data.is_some();

        let ctx = SearchContext {
            selected_text: state.selected_text.clone(),
            web_search: state.web_search_requested,
            link_to_scrape: None,
        };
        let plan = self.search.classify(&state.query, &ctx);
        state.web_search_query = Some(plan.query.clone());
        if plan.mode.is_active() {
            info!(mode = ?plan.mode, "web search triggered");
            state.use_web_search = true;
            // Keep the original query in place; the search stage re-derives
            // the plan from it.
        } else {
            state.use_web_search = false;
            state.query = plan.query;
        }
    }

    /// Execute the search/scrape the classification asked for.
    async fn search_stage(&self, state: &mut ConversationState) {
        if !state.use_web_search {
            state.use_web_search = false;
            return;
        }

        // Re-classify from the unmodified original query so the executed
        // plan (mode, URL) is derived from what the user actually typed.
        let ctx = SearchContext {
            selected_text: state.selected_text.clone(),
            web_search: state.web_search_requested,
            link_to_scrape: None,
        };
        let plan = self.search.classify(&state.query, &ctx);
        if !plan.mode.is_active() {
            warn!("search stage reached but classification says no search, skipping");
            state.use_web_search = false;
            return;
        }

        info!(mode = ?plan.mode, "executing search");
        let outcome = self
            .search
            .execute(&plan, state.selected_text.as_deref())
            .await;
        state.web_search_results = Some(outcome);
    }

    /// Ask the vision collaborator for a description, when one is configured.
    async fn vision_stage(&self, state: &mut ConversationState) {
        let Some(image_data) = state.image_data.clone() else {
            state.use_vision = false;
            return;
        };
        if !state.use_vision {
            return;
        }

        state.vision_configured = self.vision.is_configured();
        if !state.vision_configured {
            // The raw image rides along to the (presumably multimodal)
            // main model.
            return;
        }

        match self.vision.describe(&image_data, Some(&state.query)).await {
            Some(description) => {
                info!("vision description generated");
                state.vision_description = Some(description);
            }
            None => {
                // Soft failure; the assembler appends the failure note.
                warn!("configured vision model returned no description");
            }
        }
    }

    /// One model call, streamed or single-shot, with tool-call detection.
    async fn generate_stage(
        &self,
        state: &mut ConversationState,
        model: &dyn ChatModel,
        stream: Option<&StreamSender>,
    ) -> Generation {
        let completion = match self.complete(state, model, stream).await {
            Ok(completion) => completion,
            Err(e) => {
                error!(error = %e, "model invocation failed");
                state.response = e.user_message();
                return Generation::Failed;
            }
        };

        if let Some(detection) = detect_tool_call(&self.detectors, &completion) {
            state.response = detection
                .cleaned_content
                .unwrap_or_else(|| completion.content.trim().to_string());
            state.pending_tool_call = Some(detection.request);
            return Generation::ToolCall;
        }

        state.response = completion.content.trim().to_string();
        Generation::Completed
    }

    async fn complete(
        &self,
        state: &ConversationState,
        model: &dyn ChatModel,
        stream: Option<&StreamSender>,
    ) -> Result<Completion, ModelError> {
        let Some(sender) = stream else {
            return model.invoke(&state.messages).await;
        };

        let mut chunks = model.stream(&state.messages).await?;
        let mut accumulated = String::new();
        let mut completion = None;
        while let Some(chunk) = chunks.next().await {
            match chunk? {
                Chunk::Delta(text) => {
                    accumulated.push_str(&text);
                    sender.delta(accumulated.clone());
                }
                Chunk::Final(c) => completion = Some(c),
            }
        }
        Ok(completion.unwrap_or_else(|| Completion::text(accumulated)))
    }

    /// Suspend on the pending tool call and fold the decision into state.
    async fn tool_stage(&self, state: &mut ConversationState, stream: Option<&StreamSender>) {
        let Some(request) = state.pending_tool_call.take() else {
            warn!("tool stage reached without a pending tool call");
            return;
        };

        let outcome = self
            .coordinator
            .resolve(&request, stream.map(|s| (s, state.response.as_str())))
            .await;
        state.tool_call_result = Some(outcome);
    }

    /// Postprocess and commit a terminal completion.
    fn finalize_stage(
        &self,
        state: &mut ConversationState,
        generation_failed: bool,
        stream: Option<&StreamSender>,
    ) {
        if !generation_failed {
            let (content, language) = postprocess(state.mode, &state.response);
            state.response = content;
            state.detected_language = language;

            // The user/assistant pair is appended exactly once, and only on
            // a terminal (non-suspended) completion.
            if let Some(user_turn) = state.messages.last() {
                if let Err(e) = self.history.append(&state.session_id, user_turn) {
                    warn!(error = %e, "failed to append user turn to history");
                }
            }
            if let Err(e) = self
                .history
                .append(&state.session_id, &Turn::assistant(&state.response))
            {
                warn!(error = %e, "failed to append assistant turn to history");
            }
        }

        if let Some(sender) = stream {
            sender.delta(state.response.clone());
            sender.complete();
        }
    }

    /// Cached model handle; rebuilds when a different id is requested.
    async fn model_handle(
        &self,
        requested: Option<&str>,
    ) -> Result<Arc<dyn ChatModel>, ModelError> {
        let mut cache = self.model_cache.lock().await;

        if let Some((cached_id, handle)) = cache.as_ref() {
            match requested {
                Some(id) if id != cached_id => {
                    info!(current = %cached_id, requested = id, "switching model");
                }
                _ => return Ok(handle.clone()),
            }
        }

        // Fall back to the configured default only when actually building a
        // handle; an already-active model is kept for default requests.
        let requested = requested.or(self.config.default_model.as_deref());
        let handle = self.models.create(requested, self.config.temperature)?;
        *cache = Some((handle.model_id().to_string(), handle.clone()));
        Ok(handle)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::MemoryTranscripts;
    use crate::messaging::{StreamBus, StreamEvent};
    use crate::model::UserContent;
    use crate::search::{SearchMode, SearchOutcome, SearchPlan};
    use crate::tools::ToolCallOutcome;
    use crate::vision::NoVision;
    use async_trait::async_trait;
    use serde_json::json;
    use std::collections::VecDeque;
    use std::sync::Mutex as StdMutex;

    /// Model returning scripted completions in order, recording every call.
    struct ScriptedModel {
        completions: StdMutex<VecDeque<Completion>>,
        calls: StdMutex<Vec<Vec<Turn>>>,
    }

    impl ScriptedModel {
        fn new(completions: Vec<Completion>) -> Arc<Self> {
            Arc::new(Self {
                completions: StdMutex::new(completions.into()),
                calls: StdMutex::new(Vec::new()),
            })
        }

        fn calls(&self) -> Vec<Vec<Turn>> {
            self.calls.lock().unwrap().clone()
        }
    }

    #[async_trait]
    impl ChatModel for ScriptedModel {
        fn model_id(&self) -> &str {
            "scripted-model"
        }

        async fn invoke(&self, turns: &[Turn]) -> Result<Completion, ModelError> {
            self.calls.lock().unwrap().push(turns.to_vec());
            self.completions
                .lock()
                .unwrap()
                .pop_front()
                .ok_or_else(|| ModelError::Provider("script exhausted".into()))
        }
    }

    struct ScriptedFactory(Arc<ScriptedModel>);

    impl ModelFactory for ScriptedFactory {
        fn create(
            &self,
            _model_id: Option<&str>,
            _temperature: f32,
        ) -> Result<Arc<dyn ChatModel>, ModelError> {
            Ok(self.0.clone())
        }
    }

    struct FailingFactory;

    impl ModelFactory for FailingFactory {
        fn create(
            &self,
            _model_id: Option<&str>,
            _temperature: f32,
        ) -> Result<Arc<dyn ChatModel>, ModelError> {
            Err(ModelError::NotConfigured)
        }
    }

    /// Search that embeds stub results into the formatted query.
    struct FormattingSearch;

    #[async_trait]
    impl SearchResolver for FormattingSearch {
        async fn execute(
            &self,
            plan: &SearchPlan,
            _selected_text: Option<&str>,
        ) -> SearchOutcome {
            SearchOutcome::success(
                plan.mode,
                format!("{}\n\nSearch results:\n1. stub result", plan.query),
                Some("incorporate the search results".to_string()),
            )
        }
    }

    /// Search that always fails at execution.
    struct BrokenSearch;

    #[async_trait]
    impl SearchResolver for BrokenSearch {
        async fn execute(
            &self,
            _plan: &SearchPlan,
            _selected_text: Option<&str>,
        ) -> SearchOutcome {
            SearchOutcome::failure(SearchMode::WebSearch, "provider unreachable")
        }
    }

    struct Harness {
        orchestrator: Orchestrator,
        model: Arc<ScriptedModel>,
        history: Arc<MemoryTranscripts>,
        confirmations: Arc<ConfirmationBus>,
    }

    fn harness_with(completions: Vec<Completion>, search: Arc<dyn SearchResolver>) -> Harness {
        // RUST_LOG=debug surfaces stage traces when a test misbehaves.
        let _ = tracing_subscriber::fmt()
            .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
            .try_init();
        let model = ScriptedModel::new(completions);
        let history = Arc::new(MemoryTranscripts::new());
        let confirmations = Arc::new(ConfirmationBus::new());
        let config = OrchestratorConfig {
            // Tests never want a two-minute hang if something is wrong.
            confirm_timeout: std::time::Duration::from_secs(2),
            ..Default::default()
        };
        let orchestrator = Orchestrator::new(
            config,
            Arc::new(ScriptedFactory(model.clone())),
            search,
            Arc::new(NoVision),
            history.clone(),
            confirmations.clone(),
        );
        Harness {
            orchestrator,
            model,
            history,
            confirmations,
        }
    }

    fn harness(completions: Vec<Completion>) -> Harness {
        harness_with(completions, Arc::new(FormattingSearch))
    }

    /// Accept every published tool call with the given outcome.
    fn auto_confirm(h: &Harness, outcome: ToolCallOutcome) {
        let mut requests = h.confirmations.subscribe_requests();
        let responder = h.confirmations.responder();
        tokio::spawn(async move {
            while requests.recv().await.is_ok() {
                if responder.deliver(outcome.clone()).is_err() {
                    break;
                }
            }
        });
    }

    #[tokio::test]
    async fn test_scenario_a_plain_chat_query() {
        let h = harness(vec![Completion::text("4")]);
        let output = h
            .orchestrator
            .respond("What's 2+2?", QueryOptions::default())
            .await;

        assert_eq!(output.response, "4");
        assert!(output.detected_language.is_none());

        let calls = h.model.calls();
        assert_eq!(calls.len(), 1);
        let messages = &calls[0];
        assert!(matches!(messages[0], Turn::System { .. }));
        assert!(matches!(messages[1], Turn::System { .. }));
        assert_eq!(
            messages[2],
            Turn::User {
                content: UserContent::Text("What's 2+2?".into())
            }
        );
        assert_eq!(messages.len(), 3);

        // Terminal completion appended the user/assistant pair once.
        let history = h.history.get("default").unwrap();
        assert_eq!(history.len(), 2);
        assert_eq!(history[1], Turn::assistant("4"));
    }

    #[tokio::test]
    async fn test_scenario_b_web_search_success() {
        let h = harness(vec![Completion::text("Rust 1.80 is out")]);
        let output = h
            .orchestrator
            .respond("#web latest Rust release", QueryOptions::default())
            .await;

        assert_eq!(output.response, "Rust 1.80 is out");

        let calls = h.model.calls();
        let messages = &calls[0];
        let user = messages.last().unwrap();
        assert!(user.text().starts_with("latest Rust release"));
        assert!(user.text().contains("Search results:"));
        // The search system instruction sits right before the user turn.
        let instruction = &messages[messages.len() - 2];
        assert_eq!(instruction.text(), "incorporate the search results");
    }

    #[tokio::test]
    async fn test_search_error_degrades_to_plain_answer() {
        let h = harness_with(
            vec![Completion::text("best effort answer")],
            Arc::new(BrokenSearch),
        );
        let output = h
            .orchestrator
            .respond("#web latest Rust release", QueryOptions::default())
            .await;

        assert_eq!(output.response, "best effort answer");
        let calls = h.model.calls();
        let user = calls[0].last().unwrap().text().to_string();
        assert!(user.contains("encountered an error: provider unreachable"));
        assert!(user.contains("without the web results"));
    }

    #[tokio::test]
    async fn test_scenario_c_image_without_vision_model_goes_multimodal() {
        let h = harness(vec![Completion::text("a screenshot of code")]);
        let opts = QueryOptions {
            image_data: Some("iVBORw0KGgo=".to_string()),
            ..Default::default()
        };
        let output = h.orchestrator.respond("what is this?", opts).await;
        assert_eq!(output.response, "a screenshot of code");

        let calls = h.model.calls();
        match calls[0].last().unwrap() {
            Turn::User {
                content: UserContent::Blocks(blocks),
            } => {
                assert_eq!(blocks.len(), 2);
            }
            other => panic!("expected multimodal user turn, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_scenario_d_tool_call_suspends_and_resumes() {
        let h = harness(vec![
            Completion::text("Checking. <<TOOL: web_search {\"query\":\"x\"}>>"),
            Completion::text("final answer with tool data"),
        ]);

        // Capture the published request to learn the generated id.
        let mut requests = h.confirmations.subscribe_requests();
        let responder = h.confirmations.responder();
        tokio::spawn(async move {
            let request = requests.recv().await.unwrap();
            assert_eq!(request.tool, "web_search");
            assert_eq!(request.args, json!({"query": "x"}));
            responder
                .deliver(
                    ToolCallOutcome::success("web_search", json!("tool data"))
                        .with_id("ui-internal-3"),
                )
                .unwrap();
        });

        let output = h
            .orchestrator
            .respond("look this up", QueryOptions::default())
            .await;
        assert_eq!(output.response, "final answer with tool data");

        let calls = h.model.calls();
        assert_eq!(calls.len(), 2);
        // Second call carries the tool result with the model's id, not the
        // channel's internal one.
        let tool_turn = calls[1]
            .iter()
            .find(|t| matches!(t, Turn::ToolResult { .. }))
            .expect("tool result turn present");
        match tool_turn {
            Turn::ToolResult {
                content,
                tool_call_id,
            } => {
                assert_eq!(content, "tool data");
                let id = tool_call_id.as_deref().unwrap();
                assert!(id.starts_with("call_"));
                assert_ne!(id, "ui-internal-3");
            }
            _ => unreachable!(),
        }

        // Only the terminal pair lands in history.
        let history = h.history.get("default").unwrap();
        assert_eq!(history.len(), 2);
        assert_eq!(history[1], Turn::assistant("final answer with tool data"));
    }

    #[tokio::test]
    async fn test_scenario_e_rejected_tool_call() {
        let h = harness(vec![
            Completion::text("<<TOOL: terminal_command {\"cmd\":\"rm -rf /\"}>>"),
            Completion::text("understood, not running it"),
        ]);
        auto_confirm(&h, ToolCallOutcome::rejected("terminal_command"));

        let output = h
            .orchestrator
            .respond("clean my disk", QueryOptions::default())
            .await;
        assert_eq!(output.response, "understood, not running it");

        let calls = h.model.calls();
        let tool_turn = calls[1]
            .iter()
            .find(|t| matches!(t, Turn::ToolResult { .. }))
            .unwrap();
        match tool_turn {
            Turn::ToolResult {
                content,
                tool_call_id,
            } => {
                assert!(content.contains("rejected this tool call"));
                assert!(tool_call_id.as_deref().unwrap().starts_with("call_"));
            }
            _ => unreachable!(),
        }
    }

    #[tokio::test]
    async fn test_chained_tool_calls_loop_until_plain_completion() {
        let h = harness(vec![
            Completion::text("<<TOOL: web_search {\"query\":\"first\"}>>"),
            Completion::text("<<TOOL: web_search {\"query\":\"second\"}>>"),
            Completion::text("done after two tools"),
        ]);
        auto_confirm(&h, ToolCallOutcome::success("web_search", json!("data")));

        let output = h
            .orchestrator
            .respond("dig deep", QueryOptions::default())
            .await;
        assert_eq!(output.response, "done after two tools");
        assert_eq!(h.model.calls().len(), 3);
    }

    #[tokio::test(start_paused = true)]
    async fn test_unconfirmed_tool_call_times_out_into_error_result() {
        let h = harness(vec![
            Completion::text("<<TOOL: web_search {\"query\":\"x\"}>>"),
            Completion::text("answered without the tool"),
        ]);
        // Nobody attends the confirmation prompt; harness timeout is 2 s.
        let output = h
            .orchestrator
            .respond("look this up", QueryOptions::default())
            .await;
        assert_eq!(output.response, "answered without the tool");

        let calls = h.model.calls();
        let tool_turn = calls[1]
            .iter()
            .find(|t| matches!(t, Turn::ToolResult { .. }))
            .unwrap();
        assert!(tool_turn.text().contains("Timeout waiting for user confirmation"));
    }

    #[tokio::test]
    async fn test_compose_mode_unwraps_fence_and_reports_language() {
        let h = harness(vec![Completion::text("```rust\nfn main() {}\n```")]);
        let raw = "Context:\n=====MODE=====<user selected mode>\ncompose\n=======================\n\nQuery:\nwrite a main function";
        let output = h.orchestrator.respond(raw, QueryOptions::default()).await;

        assert_eq!(output.response, "fn main() {}");
        assert_eq!(output.detected_language.as_deref(), Some("rust"));

        // Compose history stores the unwrapped content.
        let history = h.history.get("default").unwrap();
        assert_eq!(history[1], Turn::assistant("fn main() {}"));
    }

    #[tokio::test]
    async fn test_model_construction_failure_yields_error_string() {
        let history = Arc::new(MemoryTranscripts::new());
        let orchestrator = Orchestrator::new(
            OrchestratorConfig::default(),
            Arc::new(FailingFactory),
            Arc::new(FormattingSearch),
            Arc::new(NoVision),
            history.clone(),
            Arc::new(ConfirmationBus::new()),
        );

        let output = orchestrator.respond("hi", QueryOptions::default()).await;
        assert!(output.response.starts_with("⚠️"));
        // Nothing reached history.
        assert!(history.get("default").unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_provider_error_classified_not_propagated() {
        let h = harness(vec![]);
        // Script exhausted -> Provider("script exhausted").
        let output = h.orchestrator.respond("hi", QueryOptions::default()).await;
        assert_eq!(output.response, "⚠️ Error: script exhausted");
        assert!(h.history.get("default").unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_streaming_emits_deltas_then_complete() {
        let h = harness(vec![Completion::text("streamed answer")]);
        let bus = StreamBus::new();
        let mut receiver = bus.subscribe();
        let opts = QueryOptions {
            stream: Some(bus.sender()),
            ..Default::default()
        };

        let output = h.orchestrator.respond("hello", opts).await;
        assert_eq!(output.response, "streamed answer");

        let mut events = Vec::new();
        while let Ok(Some(event)) = receiver.try_recv() {
            events.push(event);
        }
        assert!(matches!(events.last().unwrap(), StreamEvent::Complete));
        assert!(events
            .iter()
            .any(|e| matches!(e, StreamEvent::Delta { text } if text == "streamed answer")));
    }

    #[tokio::test]
    async fn test_history_window_bounds_context() {
        let h = harness(vec![Completion::text("ok")]);
        for i in 0..40 {
            h.history
                .append("default", &Turn::user(format!("old {i}")))
                .unwrap();
        }

        h.orchestrator
            .respond("newest", QueryOptions::default())
            .await;
        let calls = h.model.calls();
        // 2 system + 20 (limit) history + 1 user
        assert_eq!(calls[0].len(), 23);
        assert_eq!(calls[0][2].text(), "old 20");
    }

    #[tokio::test]
    async fn test_model_switch_rebuilds_handle() {
        struct CountingFactory(StdMutex<Vec<String>>);
        impl ModelFactory for CountingFactory {
            fn create(
                &self,
                model_id: Option<&str>,
                _temperature: f32,
            ) -> Result<Arc<dyn ChatModel>, ModelError> {
                let id = model_id.unwrap_or("default-model").to_string();
                self.0.lock().unwrap().push(id.clone());
                struct Named(String);
                #[async_trait]
                impl ChatModel for Named {
                    fn model_id(&self) -> &str {
                        &self.0
                    }
                    async fn invoke(&self, _: &[Turn]) -> Result<Completion, ModelError> {
                        Ok(Completion::text("ok"))
                    }
                }
                Ok(Arc::new(Named(id)))
            }
        }

        let factory = Arc::new(CountingFactory(StdMutex::new(Vec::new())));
        let orchestrator = Orchestrator::new(
            OrchestratorConfig::default(),
            factory.clone(),
            Arc::new(FormattingSearch),
            Arc::new(NoVision),
            Arc::new(MemoryTranscripts::new()),
            Arc::new(ConfirmationBus::new()),
        );

        let opts_a = QueryOptions {
            model: Some("model-a".into()),
            ..Default::default()
        };
        orchestrator.respond("1", opts_a.clone()).await;
        // Same model: cached handle reused.
        orchestrator.respond("2", opts_a).await;
        // No explicit model: cached handle reused.
        orchestrator.respond("3", QueryOptions::default()).await;
        // Different model: rebuilt.
        let opts_b = QueryOptions {
            model: Some("model-b".into()),
            ..Default::default()
        };
        orchestrator.respond("4", opts_b).await;

        let created = factory.0.lock().unwrap().clone();
        assert_eq!(created, vec!["model-a".to_string(), "model-b".to_string()]);
    }

    #[tokio::test]
    async fn test_selected_text_from_envelope_reaches_model() {
        let h = harness(vec![Completion::text("explained")]);
        let raw = "Context:\n=====SELECTED_TEXT=====<text selected by the user>\nlet x = 1;\n=======================\n\nQuery:\nexplain this";
        h.orchestrator.respond(raw, QueryOptions::default()).await;

        let calls = h.model.calls();
        let user = calls[0].last().unwrap().text().to_string();
        assert!(user.starts_with("explain this"));
        assert!(user.contains("let x = 1;"));
    }
}
