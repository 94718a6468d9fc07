pub mod job_store;
pub mod prompt_store;

pub use job_store::JobStore;
pub use prompt_store::PromptStore;
