//! Sidekick: conversation orchestration core for a desktop copilot.
//!
//! A host application (popup UI, hotkey listener, provider adapters) embeds
//! this crate and supplies the collaborators; the crate owns the pipeline
//! that turns a raw query plus context into a finalized response, including
//! the suspend/resume protocol for human-confirmed tool calls.
//!
//! ## Main Components
//!
//! - [`pipeline`] - The orchestrator and its stages (parse, assemble,
//!   generate, tool loop, postprocess)
//! - [`model`] - Conversation turns, completions, and the model collaborator
//!   traits, plus tool-call detection
//! - [`tools`] - Tool-call types, the confirmation channel, and the
//!   suspend/resume coordinator
//! - [`search`] - Search collaborator contract and query classification
//! - [`vision`] - Vision collaborator contract
//! - [`db`] - SQLite persistence: transcripts, response cache, settings
//! - [`session`] - Session registry and the control-prefix front door
//! - [`messaging`] - Streaming events between the pipeline and the UI
//!
//! ## Quick Start
//!
//! ```ignore
//! use sidekick::{
//!     ConfirmationBus, Database, Orchestrator, OrchestratorConfig, QueryOptions,
//!     SqliteTranscripts,
//! };
//! use std::sync::Arc;
//!
//! let db = Arc::new(Database::open()?);
//! db.migrate()?;
//! let confirmations = Arc::new(ConfirmationBus::new());
//! let orchestrator = Orchestrator::new(
//!     OrchestratorConfig::default(),
//!     my_model_factory,
//!     my_search_resolver,
//!     my_vision_backend,
//!     Arc::new(SqliteTranscripts::new(db.clone())),
//!     confirmations.clone(),
//! );
//! let output = orchestrator.respond("What's 2+2?", QueryOptions::default()).await;
//! ```

pub mod config;
pub mod db;
pub mod filename;
pub mod messaging;
pub mod model;
pub mod pipeline;
pub mod prompts;
pub mod search;
pub mod session;
pub mod tools;
pub mod vision;

// Re-export commonly used types
pub use config::{OrchestratorConfig, Settings, SettingsError, XdgDirs};
pub use db::{
    Database, MemoryTranscripts, ResponseCache, SqliteTranscripts, TranscriptError,
    TranscriptStore,
};
pub use messaging::{StreamBus, StreamEvent, StreamReceiver, StreamSender};
pub use model::{
    ChatModel, Chunk, ChunkStream, Completion, ContentBlock, ImageUrl, ModelError, ModelFactory,
    Turn, UserContent,
};
pub use pipeline::{
    ConversationState, Mode, Orchestrator, PipelineOutput, QueryOptions, Stage,
};
pub use search::{
    classify_query, SearchContext, SearchMode, SearchOutcome, SearchPlan, SearchResolver,
    SearchStatus,
};
pub use session::{DispatchOutcome, Dispatcher, InsertMethod, SessionContext, SessionRegistry};
pub use tools::confirm::{ConfirmError, ConfirmationBus, ConfirmationResponder};
pub use tools::coordinator::{ToolCoordinator, DEFAULT_CONFIRM_TIMEOUT};
pub use tools::{OutcomeStatus, ToolCallOutcome, ToolCallRequest, ToolResultPayload};
pub use vision::{NoVision, VisionDescriber};
