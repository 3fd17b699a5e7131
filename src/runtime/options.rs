/// Agent configuration.
#[derive(Debug, Clone)]
pub struct AgentOptions {
    /// Execution contexts allowed on the stack before a call terminates.
    pub max_execution_context_depth: usize,
    /// Log the layout of every compiled eval body at `debug` level.
    pub dump_executables: bool,
}

impl Default for AgentOptions {
    fn default() -> Self {
        Self {
            max_execution_context_depth: 1024,
            dump_executables: false,
        }
    }
}

impl AgentOptions {
    pub fn with_max_execution_context_depth(mut self, depth: usize) -> Self {
        self.max_execution_context_depth = depth;
        self
    }

    pub fn with_dump_executables(mut self, dump: bool) -> Self {
        self.dump_executables = dump;
        self
    }
}
