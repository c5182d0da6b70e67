//! Runtime configuration.

use serde::{Deserialize, Serialize};

/// Limits and options applied when a [`crate::ScriptContext`] is created.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct RuntimeConfig {
    /// Heap limit in bytes (None = unlimited)
    pub memory_limit: Option<usize>,

    /// Maximum native stack size in bytes (None = engine default)
    pub max_stack_size: Option<usize>,

    /// Allocation threshold that triggers a GC cycle
    pub gc_threshold: Option<usize>,

    /// Install the `console` global
    #[serde(default = "default_console")]
    pub console: bool,
}

fn default_console() -> bool {
    true
}

impl Default for RuntimeConfig {
    fn default() -> Self {
        Self {
            memory_limit: None,
            max_stack_size: None,
            gc_threshold: None,
            console: default_console(),
        }
    }
}

impl RuntimeConfig {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_memory_limit(mut self, bytes: usize) -> Self {
        self.memory_limit = Some(bytes);
        self
    }

    pub fn with_max_stack_size(mut self, bytes: usize) -> Self {
        self.max_stack_size = Some(bytes);
        self
    }

    pub fn with_gc_threshold(mut self, bytes: usize) -> Self {
        self.gc_threshold = Some(bytes);
        self
    }

    pub fn without_console(mut self) -> Self {
        self.console = false;
        self
    }
}
