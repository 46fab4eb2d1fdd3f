//! CLI command handlers.

pub mod proxy;
pub mod tunnel;

/// Shared context for all commands.
#[derive(Debug, Clone)]
pub struct Context {
    /// Verbose output enabled.
    pub verbose: bool,
    /// Suppress the startup banner.
    pub quiet: bool,
}
