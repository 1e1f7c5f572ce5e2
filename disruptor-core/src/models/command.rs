//! The per-pod exec/cleanup argv pair produced by a command builder

/// A pair of argv vectors: the agent invocation to run, and how to clean it up on failure
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct VisitCommand {
    /// The argv to exec inside the agent's ephemeral container
    pub exec: Vec<String>,
    /// The argv used to revert `exec`'s effects on a best-effort basis
    pub cleanup: Vec<String>,
}

impl VisitCommand {
    /// Build a command pair
    ///
    /// # Arguments
    ///
    /// * `exec` - The argv to run
    /// * `cleanup` - The argv to run if `exec` fails
    #[must_use]
    pub fn new(exec: Vec<String>, cleanup: Vec<String>) -> Self {
        VisitCommand { exec, cleanup }
    }
}
