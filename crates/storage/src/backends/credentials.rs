//! Shared AWS client plumbing: lazy default credentials, endpoint
//! normalization and SDK error mapping.

use crate::error::StorageError;
use aws_config::default_provider::credentials::DefaultCredentialsChain;
use aws_credential_types::provider::ProvideCredentials;
use aws_credential_types::provider::error::CredentialsError;
use aws_credential_types::provider::future::ProvideCredentials as ProvideCredentialsFuture;
use tokio::sync::OnceCell;

/// Region used when none is configured.
pub const DEFAULT_REGION: &str = "us-east-1";

/// Marker included in lazy-credentials errors so they can be mapped to
/// configuration errors instead of generic transport failures.
const CREDENTIALS_INIT_ERROR_MARKER: &str = "vaultlift-lazy-credentials-init";
const CREDENTIALS_RESOLVE_ERROR_MARKER: &str = "vaultlift-lazy-credentials-resolve";

/// Initializes the AWS default credentials chain on the first signed request
/// instead of at client construction.
#[derive(Debug)]
pub struct LazyDefaultCredentialsProvider {
    region: String,
    chain: OnceCell<DefaultCredentialsChain>,
}

impl LazyDefaultCredentialsProvider {
    pub fn new(region: impl Into<String>) -> Self {
        Self {
            region: region.into(),
            chain: OnceCell::new(),
        }
    }

    async fn init_chain(&self) -> Result<DefaultCredentialsChain, CredentialsError> {
        let region = aws_config::Region::new(self.region.clone());
        // Chain construction queries IMDS and profile files; keep it off the
        // caller's task.
        let built = tokio::task::spawn(async move {
            DefaultCredentialsChain::builder().region(region).build().await
        })
        .await;
        built.map_err(|e| {
            CredentialsError::provider_error(format!(
                "{CREDENTIALS_INIT_ERROR_MARKER}: could not build the default credentials chain: {e}"
            ))
        })
    }

    async fn resolve(&self) -> aws_credential_types::provider::Result {
        let chain = self.chain.get_or_try_init(|| self.init_chain()).await?;
        chain.provide_credentials().await.map_err(|e| {
            CredentialsError::provider_error(format!(
                "{CREDENTIALS_RESOLVE_ERROR_MARKER}: no credentials from the default chain: {e}"
            ))
        })
    }
}

impl ProvideCredentials for LazyDefaultCredentialsProvider {
    fn provide_credentials<'a>(&'a self) -> ProvideCredentialsFuture<'a>
    where
        Self: 'a,
    {
        ProvideCredentialsFuture::new(self.resolve())
    }
}

/// Reject half-configured static credentials.
pub fn check_credential_pair(
    access_key_id: &Option<String>,
    secret_access_key: &Option<String>,
) -> Result<(), StorageError> {
    if access_key_id.is_some() ^ secret_access_key.is_some() {
        return Err(StorageError::Config(
            "static credentials require both access_key_id and secret_access_key when either is set"
                .to_string(),
        ));
    }
    Ok(())
}

/// Prepend `http://` to bare `host:port` endpoints.
pub fn normalize_endpoint(endpoint: &str) -> String {
    let lower = endpoint.to_ascii_lowercase();
    if ["http://", "https://"].iter().any(|scheme| lower.starts_with(scheme)) {
        return endpoint.to_string();
    }
    format!("http://{endpoint}")
}

/// Classify a failed SDK call. `status` is the HTTP status of the raw
/// response, when there was one; 404 becomes [`StorageError::NotFound`].
pub(crate) fn map_operation_error(
    err: Box<dyn std::error::Error + Send + Sync>,
    status: Option<u16>,
    what: &str,
) -> StorageError {
    if status == Some(404) {
        return StorageError::NotFound(what.to_string());
    }

    let rendered = format!("{err} {err:?}");
    if [CREDENTIALS_INIT_ERROR_MARKER, CREDENTIALS_RESOLVE_ERROR_MARKER]
        .iter()
        .any(|marker| rendered.contains(marker))
    {
        return StorageError::Config(format!(
            "no AWS credentials available for {what}; set access_key_id and secret_access_key or provide ambient credentials"
        ));
    }

    StorageError::Upstream(err)
}
