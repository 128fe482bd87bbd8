//! Waking the workflow that waits on a vault job.

use crate::error::{TransferError, TransferResult};
use async_trait::async_trait;
use aws_config::BehaviorVersion;
use aws_sdk_sfn::Client;
use aws_sdk_sfn::error::DisplayErrorContext;
use tracing::{debug, instrument};
use vaultlift_core::CompletionSignal;
use vaultlift_core::config::WorkflowConfig;
use vaultlift_storage::backends::credentials::{
    DEFAULT_REGION, LazyDefaultCredentialsProvider, normalize_endpoint,
};

/// Workflow engine callbacks keyed by task token.
#[async_trait]
pub trait WorkflowSignaler: Send + Sync + 'static {
    async fn signal_success(&self, task_token: &str, output: &str) -> TransferResult<()>;

    async fn signal_failure(&self, task_token: &str, error: &str, cause: &str)
    -> TransferResult<()>;
}

/// Send `signal` through `signaler`.
pub async fn deliver(
    signaler: &dyn WorkflowSignaler,
    task_token: &str,
    signal: &CompletionSignal,
) -> TransferResult<()> {
    match signal {
        CompletionSignal::Success { output } => signaler.signal_success(task_token, output).await,
        CompletionSignal::Failure { error, cause } => {
            signaler.signal_failure(task_token, error, cause).await
        }
    }
}

/// Step Functions task-token callbacks.
pub struct SfnSignaler {
    client: Client,
}

impl std::fmt::Debug for SfnSignaler {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SfnSignaler").finish_non_exhaustive()
    }
}

impl SfnSignaler {
    pub fn new(config: &WorkflowConfig) -> Self {
        let region = config
            .region
            .clone()
            .unwrap_or_else(|| DEFAULT_REGION.to_string());
        let mut builder = aws_sdk_sfn::config::Builder::new()
            .behavior_version(BehaviorVersion::latest())
            .region(aws_config::Region::new(region.clone()))
            .credentials_provider(LazyDefaultCredentialsProvider::new(region));

        if let Some(endpoint) = config.endpoint.as_deref() {
            builder = builder.endpoint_url(normalize_endpoint(endpoint));
        }

        Self {
            client: Client::from_conf(builder.build()),
        }
    }
}

#[async_trait]
impl WorkflowSignaler for SfnSignaler {
    #[instrument(skip(self, task_token, output), fields(backend = "sfn"))]
    async fn signal_success(&self, task_token: &str, output: &str) -> TransferResult<()> {
        self.client
            .send_task_success()
            .task_token(task_token)
            .output(output)
            .send()
            .await
            .map_err(|e| TransferError::Signal(DisplayErrorContext(&e).to_string()))?;
        debug!("sent task success");
        Ok(())
    }

    #[instrument(skip(self, task_token), fields(backend = "sfn"))]
    async fn signal_failure(
        &self,
        task_token: &str,
        error: &str,
        cause: &str,
    ) -> TransferResult<()> {
        self.client
            .send_task_failure()
            .task_token(task_token)
            .error(error)
            .cause(cause)
            .send()
            .await
            .map_err(|e| TransferError::Signal(DisplayErrorContext(&e).to_string()))?;
        debug!("sent task failure");
        Ok(())
    }
}
