//! End-to-end cause-effect chains.

/// An ordered sequence of tasks with an end-to-end response budget.
///
/// The response of a chain runs from the release of its first task to the
/// finish of its last one. A response longer than `budget` is an overrun.
#[derive(Debug, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct Chain {
    name: String,
    budget: u64,
    priority: u32,
    runnables: Vec<String>,
}

impl Chain {
    pub fn new<I, S>(name: impl Into<String>, budget: u64, priority: u32, runnables: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            name: name.into(),
            budget,
            priority,
            runnables: runnables.into_iter().map(Into::into).collect(),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Longest acceptable end-to-end response.
    pub fn budget(&self) -> u64 {
        self.budget
    }

    /// Higher is more important. Carried through to reports.
    pub fn priority(&self) -> u32 {
        self.priority
    }

    /// Task ids in flow order.
    pub fn runnables(&self) -> &[String] {
        &self.runnables
    }
}
