pub mod job;
pub mod prompt;

pub use job::*;
pub use prompt::*;
