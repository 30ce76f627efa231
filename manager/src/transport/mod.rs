//! Terminal transport: telnet and ssh channels, hop chains and the expect engine.

pub mod channel;
pub mod session_log;
pub mod ssh;
pub mod telnet;
pub mod terminal;
pub mod url;

pub use channel::{Dialer, NetworkDialer, TerminalChannel};
pub use session_log::SessionLog;
pub use terminal::{describe_chain, ExpectMatch, LoginPatterns, Terminal};
pub use url::{hop_chains, HopUrl, HopUrlError};
