use std::sync::Arc;

use async_trait::async_trait;

use crate::error::ProviderError;

/// Opaque user-management primitives of the identity provider.
///
/// Implementations report a missing user, login profile or group binding as
/// [`ProviderErrorKind::NotFound`](crate::error::ProviderErrorKind::NotFound).
#[async_trait]
pub trait IdentityProvider: Send + Sync {
    /// Returns `Ok(false)` when the user does not exist.
    async fn user_exists(&self, username: &str) -> Result<bool, ProviderError>;
    async fn create_user(&self, username: &str) -> Result<(), ProviderError>;
    async fn create_login_profile(&self, username: &str, password: &str)
    -> Result<(), ProviderError>;
    async fn add_user_to_group(&self, username: &str, group: &str) -> Result<(), ProviderError>;

    async fn delete_login_profile(&self, username: &str) -> Result<(), ProviderError>;
    async fn list_groups_for_user(&self, username: &str) -> Result<Vec<String>, ProviderError>;
    async fn remove_user_from_group(&self, username: &str, group: &str)
    -> Result<(), ProviderError>;
    async fn list_access_keys(&self, username: &str) -> Result<Vec<String>, ProviderError>;
    async fn delete_access_key(&self, username: &str, key_id: &str) -> Result<(), ProviderError>;
    async fn list_ssh_public_keys(&self, username: &str) -> Result<Vec<String>, ProviderError>;
    async fn delete_ssh_public_key(&self, username: &str, key_id: &str)
    -> Result<(), ProviderError>;
    async fn list_service_specific_credentials(
        &self,
        username: &str,
    ) -> Result<Vec<String>, ProviderError>;
    async fn delete_service_specific_credential(
        &self,
        username: &str,
        credential_id: &str,
    ) -> Result<(), ProviderError>;
    async fn delete_user(&self, username: &str) -> Result<(), ProviderError>;
}

pub type DynIdentityProvider = Arc<dyn IdentityProvider>;

/// Grants elevated access to the workshop environment.
///
/// Each call yields a fresh, time-limited session; the returned provider is
/// only used for the batch that asked for it.
#[async_trait]
pub trait IdentityAccess: Send + Sync {
    async fn acquire(&self) -> Result<DynIdentityProvider, ProviderError>;
}
