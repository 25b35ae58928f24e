use async_trait::async_trait;
use aws_sdk_eventbridge::Client;
use aws_sdk_eventbridge::types::{RuleState, Target};

use crate::aws::classify;
use crate::error::ProviderError;
use crate::schedule::{RuleTarget, TriggerStore};

pub struct EventBridgeTriggerStore {
    client: Client,
}

impl EventBridgeTriggerStore {
    pub fn new(client: Client) -> Self {
        Self { client }
    }
}

#[async_trait]
impl TriggerStore for EventBridgeTriggerStore {
    async fn put_rule(&self, name: &str, schedule_expression: &str) -> Result<(), ProviderError> {
        self.client
            .put_rule()
            .name(name)
            .schedule_expression(schedule_expression)
            .state(RuleState::Enabled)
            .send()
            .await
            .map_err(|err| classify("PutRule", err))?;
        Ok(())
    }

    async fn put_target(&self, rule: &str, target: &RuleTarget) -> Result<(), ProviderError> {
        let target = Target::builder()
            .id(&target.id)
            .arn(&target.arn)
            .input(&target.input)
            .build()
            .map_err(|err| ProviderError::service("PutTargets", err.to_string()))?;
        let output = self
            .client
            .put_targets()
            .rule(rule)
            .targets(target)
            .send()
            .await
            .map_err(|err| classify("PutTargets", err))?;
        if let Some(failed) = output.failed_entries().first() {
            return Err(ProviderError::service(
                "PutTargets",
                format!(
                    "target {} rejected: {} {}",
                    failed.target_id().unwrap_or("?"),
                    failed.error_code().unwrap_or_default(),
                    failed.error_message().unwrap_or_default()
                ),
            ));
        }
        Ok(())
    }

    async fn describe_rule(&self, name: &str) -> Result<Option<String>, ProviderError> {
        match self.client.describe_rule().name(name).send().await {
            Ok(output) => Ok(Some(
                output.schedule_expression().unwrap_or_default().to_string(),
            )),
            Err(err) => {
                let err = classify("DescribeRule", err);
                if err.is_not_found() { Ok(None) } else { Err(err) }
            }
        }
    }

    async fn remove_target(&self, rule: &str, target_id: &str) -> Result<(), ProviderError> {
        self.client
            .remove_targets()
            .rule(rule)
            .ids(target_id)
            .send()
            .await
            .map_err(|err| classify("RemoveTargets", err))?;
        Ok(())
    }

    async fn delete_rule(&self, name: &str) -> Result<(), ProviderError> {
        self.client
            .delete_rule()
            .name(name)
            .send()
            .await
            .map_err(|err| classify("DeleteRule", err))?;
        Ok(())
    }
}
