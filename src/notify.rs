use std::sync::Arc;

use async_trait::async_trait;
use serde::Serialize;

use crate::error::ProviderError;
use crate::workshop::Account;

#[derive(Clone, Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AccountsNotice {
    pub workshop_name: String,
    pub login_url: String,
    pub accounts: Vec<Account>,
}

#[derive(Clone, Debug)]
pub struct Notification {
    pub template: String,
    pub recipient: String,
    pub data: AccountsNotice,
}

impl Notification {
    pub fn template_data(&self) -> Result<String, ProviderError> {
        serde_json::to_string(&self.data)
            .map_err(|err| ProviderError::service("SendTemplatedEmail", err.to_string()))
    }
}

/// Delivers the created-accounts notice to the workshop's responsible contact.
#[async_trait]
pub trait Notifier: Send + Sync {
    async fn notify(&self, notification: &Notification) -> Result<(), ProviderError>;
}

pub type DynNotifier = Arc<dyn Notifier>;
