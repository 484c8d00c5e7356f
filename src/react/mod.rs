//! 编排层：单轮状态机、工作对话、提示词与工具调用主循环

pub mod events;
pub mod loop_;
pub mod prompt;
pub mod state;
pub mod transcript;

pub use events::TurnEvent;
pub use loop_::{run_turn, TurnOutcome, TurnSession, TurnStatus, FALLBACK_MESSAGE};
pub use prompt::{load_system_prompt, UserProfile, DEFAULT_SYSTEM_PROMPT};
pub use state::{TurnMachine, TurnState};
pub use transcript::WorkingTranscript;
