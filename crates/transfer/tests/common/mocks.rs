use async_trait::async_trait;
use std::sync::Mutex;
use std::sync::atomic::{AtomicUsize, Ordering};
use vaultlift_transfer::error::{TransferError, TransferResult};
use vaultlift_transfer::signal::WorkflowSignaler;

#[allow(dead_code)]
#[derive(Clone, Debug, PartialEq)]
pub enum SignalCall {
    Success {
        token: String,
        output: String,
    },
    Failure {
        token: String,
        error: String,
        cause: String,
    },
}

/// Signaler that records every callback. The first `failures` callbacks
/// fail as if the workflow service were unreachable.
#[allow(dead_code)]
#[derive(Default)]
pub struct RecordingSignaler {
    calls: Mutex<Vec<SignalCall>>,
    failures: AtomicUsize,
}

#[allow(dead_code)]
impl RecordingSignaler {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn failing_first(failures: usize) -> Self {
        Self {
            calls: Mutex::new(Vec::new()),
            failures: AtomicUsize::new(failures),
        }
    }

    pub fn calls(&self) -> Vec<SignalCall> {
        self.calls.lock().unwrap().clone()
    }

    fn record(&self, call: SignalCall) -> TransferResult<()> {
        self.calls.lock().unwrap().push(call);
        let failing = self
            .failures
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |left| left.checked_sub(1))
            .is_ok();
        if failing {
            return Err(TransferError::Signal("workflow service unavailable".to_string()));
        }
        Ok(())
    }
}

#[async_trait]
impl WorkflowSignaler for RecordingSignaler {
    async fn signal_success(&self, task_token: &str, output: &str) -> TransferResult<()> {
        self.record(SignalCall::Success {
            token: task_token.to_string(),
            output: output.to_string(),
        })
    }

    async fn signal_failure(
        &self,
        task_token: &str,
        error: &str,
        cause: &str,
    ) -> TransferResult<()> {
        self.record(SignalCall::Failure {
            token: task_token.to_string(),
            error: error.to_string(),
            cause: cause.to_string(),
        })
    }
}
