pub mod batch;
pub mod llm;

pub use batch::{RunSummary, analyze_channel, format_transcript, group_by_channel, run_analysis};
pub use llm::{ChannelAnalyst, LlmClient};
