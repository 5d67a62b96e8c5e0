pub mod events;
pub mod formatter;
pub mod knowledge;
pub mod orchestrator;
pub mod prompt;
pub mod thinking_filter;

pub use events::StreamEvent;
pub use formatter::{Section, format_response};
pub use orchestrator::{AskPipeline, Orchestrator, build_messages, finalize_answer};
