use async_trait::async_trait;
use aws_sdk_ses::Client;
use aws_sdk_ses::types::Destination;

use crate::aws::classify;
use crate::error::ProviderError;
use crate::notify::{Notification, Notifier};

/// Templated email through SES.
pub struct SesNotifier {
    client: Client,
    sender: String,
}

impl SesNotifier {
    pub fn new(client: Client, sender: String) -> Self {
        Self { client, sender }
    }
}

#[async_trait]
impl Notifier for SesNotifier {
    async fn notify(&self, notification: &Notification) -> Result<(), ProviderError> {
        let destination = Destination::builder()
            .to_addresses(&notification.recipient)
            .build();
        self.client
            .send_templated_email()
            .source(&self.sender)
            .destination(destination)
            .template(&notification.template)
            .template_data(notification.template_data()?)
            .send()
            .await
            .map_err(|err| classify("SendTemplatedEmail", err))?;
        Ok(())
    }
}
