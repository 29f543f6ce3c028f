//! Failure injection for the mock orchestrator
//!
//! Lets tests make any single operation answer with a service error or a
//! transport failure, optionally only for the first N calls.

use std::collections::HashMap;

use pipeline_protocol::{ErrorCode, Operation, ServiceError};

use crate::store::StoreError;

/// What an injected failure looks like to the caller
#[derive(Debug, Clone, PartialEq)]
pub enum InjectedFailure {
    /// The service answers with this error
    Service { code: ErrorCode, message: String },
    /// The call never reaches the service
    Transport(String),
}

/// Failure configuration for an operation
#[derive(Debug, Clone)]
pub struct FailureConfig {
    pub failure: InjectedFailure,
    /// Number of times to fail before succeeding (None = always fail)
    pub fail_count: Option<u32>,
}

impl FailureConfig {
    /// Create a config that returns a service error
    pub fn error(code: ErrorCode, message: impl Into<String>) -> Self {
        Self {
            failure: InjectedFailure::Service {
                code,
                message: message.into(),
            },
            fail_count: None,
        }
    }

    /// Create a config that fails before reaching the service
    pub fn transport(message: impl Into<String>) -> Self {
        Self {
            failure: InjectedFailure::Transport(message.into()),
            fail_count: None,
        }
    }

    /// Set the number of times to fail before succeeding
    pub fn with_fail_count(mut self, count: u32) -> Self {
        self.fail_count = Some(count);
        self
    }

    pub fn to_error(&self) -> StoreError {
        match &self.failure {
            InjectedFailure::Service { code, message } => {
                StoreError::Service(ServiceError::new(*code, message.clone()))
            }
            InjectedFailure::Transport(message) => StoreError::Transport(message.clone()),
        }
    }
}

/// Per-operation failure injector
#[derive(Debug, Default)]
pub struct FailureInjector {
    configs: HashMap<Operation, FailureConfig>,
    /// Call counts per operation (for fail_count tracking)
    call_counts: HashMap<Operation, u32>,
}

impl FailureInjector {
    pub fn new() -> Self {
        Self::default()
    }

    /// Inject a failure for an operation
    pub fn inject(&mut self, op: Operation, config: FailureConfig) {
        self.configs.insert(op, config);
        self.call_counts.insert(op, 0);
    }

    /// Inject a service error for an operation
    pub fn inject_error(&mut self, op: Operation, code: ErrorCode, message: impl Into<String>) {
        self.inject(op, FailureConfig::error(code, message));
    }

    /// Clear all failure injections
    pub fn clear(&mut self) {
        self.configs.clear();
        self.call_counts.clear();
    }

    /// Clear failure injection for a specific operation
    pub fn clear_op(&mut self, op: Operation) {
        self.configs.remove(&op);
        self.call_counts.remove(&op);
    }

    /// Returns the error to answer with, if this call should fail
    pub fn check(&mut self, op: Operation) -> Option<StoreError> {
        let config = self.configs.get(&op)?;
        let count = self.call_counts.entry(op).or_insert(0);
        *count += 1;

        if let Some(fail_limit) = config.fail_count {
            if *count > fail_limit {
                return None;
            }
        }

        Some(config.to_error())
    }
}
