#[derive(Debug, Eq, PartialEq)]
pub enum SortError<Node> {
    /// Nodes left over once every node without pending dependencies was emitted.
    CycleDetected { unresolved: Vec<Node> },
}

impl<Node: std::fmt::Debug> std::error::Error for SortError<Node> {}

impl<Node: std::fmt::Debug> std::fmt::Display for SortError<Node> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            SortError::CycleDetected { unresolved } => {
                writeln!(f, "Cycle detected between the following nodes:")?;
                for node in unresolved {
                    writeln!(f, "  {:?}", node)?;
                }
                Ok(())
            }
        }
    }
}
