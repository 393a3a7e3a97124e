use crate::error::RegistryError;
use crate::model::PackageMetadata;
use async_trait::async_trait;

/// Network side of the registry client.
///
/// The [`RegistryClient`](crate::registry::RegistryClient) owns caching, rate
/// limiting and timeouts; a source only knows how to fetch one package.
#[async_trait]
pub trait RegistrySource: Send + Sync {
    /// Returns the registry ID this source talks to (e.g., "pypi").
    fn registry_id(&self) -> &str;

    /// Fetches metadata for an already-normalized package name.
    async fn fetch(&self, name: &str) -> Result<PackageMetadata, RegistryError>;
}
