//! Configuration for the interpreter.

/// Configuration for a [`crate::Vm`].
///
/// Controls stack sizing, fragment validation and instruction tracing.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct VmConfig {
    /// Minimum operand-stack reservation; a fragment's computed maximum depth
    /// is added on top.
    pub initial_stack_capacity: usize,

    /// Check that every frame and label of a fragment is resolved before
    /// running it.
    pub validate_fragments: bool,

    /// Emit a `trace!` event for every executed instruction.
    pub trace_instructions: bool,

    /// Maximum nesting of lambda invocations.
    pub max_lambda_depth: usize,
}

impl Default for VmConfig {
    fn default() -> Self {
        Self {
            initial_stack_capacity: 256,
            validate_fragments: cfg!(debug_assertions),
            trace_instructions: false,
            max_lambda_depth: 1024,
        }
    }
}

impl VmConfig {
    /// Creates the default configuration.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a configuration for debugging: validation and tracing on.
    #[must_use]
    pub fn debug() -> Self {
        Self {
            validate_fragments: true,
            trace_instructions: true,
            ..Self::default()
        }
    }

    /// Creates a configuration for production: no validation, no tracing.
    #[must_use]
    pub fn release() -> Self {
        Self {
            validate_fragments: false,
            trace_instructions: false,
            ..Self::default()
        }
    }

    /// Builder method to set the initial stack capacity.
    #[must_use]
    pub fn with_initial_stack_capacity(mut self, capacity: usize) -> Self {
        self.initial_stack_capacity = capacity;
        self
    }

    /// Builder method to toggle fragment validation.
    #[must_use]
    pub fn with_validate_fragments(mut self, validate: bool) -> Self {
        self.validate_fragments = validate;
        self
    }

    /// Builder method to toggle instruction tracing.
    #[must_use]
    pub fn with_trace_instructions(mut self, trace: bool) -> Self {
        self.trace_instructions = trace;
        self
    }

    /// Builder method to set the lambda nesting limit.
    #[must_use]
    pub fn with_max_lambda_depth(mut self, depth: usize) -> Self {
        self.max_lambda_depth = depth;
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn presets() {
        assert!(VmConfig::debug().validate_fragments);
        assert!(VmConfig::debug().trace_instructions);
        assert!(!VmConfig::release().validate_fragments);
        assert_eq!(VmConfig::new().max_lambda_depth, 1024);
    }

    #[test]
    fn builders() {
        let config = VmConfig::release()
            .with_initial_stack_capacity(8)
            .with_max_lambda_depth(4)
            .with_trace_instructions(true);
        assert_eq!(config.initial_stack_capacity, 8);
        assert_eq!(config.max_lambda_depth, 4);
        assert!(config.trace_instructions);
        assert!(!config.validate_fragments);
    }
}
