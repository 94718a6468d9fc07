//! Workflow engine: definitions and the job state machines that run them.
//!
//! # Architecture
//!
//! ```text
//! Scheduler ──► Poller ──► SequentialHandler ─┐
//!                    ├──► ParallelHandler ────┼──► AgentLauncher / PromptSender
//!                    └──► ParallelChildHandler┘    FallbackExecutor / TimeoutTracker
//!                                                  extractor (fan-out)
//!                                                        │
//!                                                  AgentService (remote)
//! ```

pub mod content;
pub mod expression;
pub mod extractor;
pub mod fallback;
pub mod launcher;
pub mod parallel;
pub mod parallel_child;
pub mod parser;
pub mod poller;
pub mod prompt_sender;
pub mod schema;
pub mod sequential;
pub mod submission;
pub mod timeout;

pub use extractor::ExtractionResult;
pub use fallback::FallbackExecutor;
pub use launcher::AgentLauncher;
pub use parallel::ParallelHandler;
pub use parallel_child::ParallelChildHandler;
pub use parser::{determine_shape, parse_file, parse_str};
pub use poller::{PollSummary, Poller, Scheduler, SchedulerHandle};
pub use prompt_sender::PromptSender;
pub use schema::{BranchDefinition, ContentType, DefinitionError, FanOutBlock, PromptInfo, WorkflowDefinition};
pub use sequential::SequentialHandler;
pub use submission::{submit_workflow, SubmitOverrides};
pub use timeout::{TimeoutCheck, TimeoutTracker};
