//! Device session (prompt automaton) and per-family prompt sets.

pub mod prompts;
pub mod session;

pub use prompts::PromptSet;
pub use session::{ConfigExit, DeviceSession, SessionState};
