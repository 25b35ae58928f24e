//! One-shot deletion rules in the trigger store.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Datelike, Timelike, Utc};

use crate::error::{ProviderError, ignore_not_found, with_deadline};
use crate::operator_log;
use crate::workshop::DeleteRequest;

/// The single target every deletion rule carries.
pub const DELETE_TARGET_ID: &str = "1";

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct RuleTarget {
    pub id: String,
    pub arn: String,
    /// Serialized [`DeleteRequest`].
    pub input: String,
}

/// Scheduled-rule registry keyed by rule name.
#[async_trait]
pub trait TriggerStore: Send + Sync {
    async fn put_rule(&self, name: &str, schedule_expression: &str) -> Result<(), ProviderError>;
    async fn put_target(&self, rule: &str, target: &RuleTarget) -> Result<(), ProviderError>;
    /// Schedule expression of the rule, `None` when no such rule exists.
    async fn describe_rule(&self, name: &str) -> Result<Option<String>, ProviderError>;
    async fn remove_target(&self, rule: &str, target_id: &str) -> Result<(), ProviderError>;
    async fn delete_rule(&self, name: &str) -> Result<(), ProviderError>;
}

pub type DynTriggerStore = Arc<dyn TriggerStore>;

pub fn rule_name(workshop_name: &str) -> String {
    format!("workshop-{workshop_name}-user-delete")
}

/// `cron(minute hour day month ? year)` firing once, all fields in UTC.
pub fn cron_expression(at: DateTime<Utc>) -> String {
    format!(
        "cron({} {} {} {} ? {})",
        at.minute(),
        at.hour(),
        at.day(),
        at.month(),
        at.year()
    )
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum RuleRemoval {
    Removed,
    AlreadyAbsent,
    /// The rule could not be looked up; nothing was deleted.
    Skipped,
}

#[derive(Clone)]
pub struct ScheduleRuleManager {
    store: DynTriggerStore,
    target_arn: String,
    call_timeout: Duration,
}

impl ScheduleRuleManager {
    pub fn new(store: DynTriggerStore, target_arn: impl Into<String>, call_timeout: Duration) -> Self {
        Self {
            store,
            target_arn: target_arn.into(),
            call_timeout,
        }
    }

    /// Installs the rule and its deletion target. Returns the rule name.
    pub async fn install(
        &self,
        workshop_name: &str,
        usernames: &[String],
        delete_at: DateTime<Utc>,
    ) -> Result<String, ProviderError> {
        let name = rule_name(workshop_name);
        let expression = cron_expression(delete_at);
        with_deadline(
            "PutRule",
            self.call_timeout,
            self.store.put_rule(&name, &expression),
        )
        .await
        .inspect_err(|err| {
            operator_log::error(
                module_path!(),
                format!("error creating schedule rule {name}: {err}"),
            );
        })?;
        operator_log::info(
            module_path!(),
            format!("schedule rule {name} is created with {expression}"),
        );

        let payload = DeleteRequest::new(workshop_name, usernames.to_vec());
        let input = serde_json::to_string(&payload)
            .map_err(|err| ProviderError::service("PutTargets", err.to_string()))?;
        let target = RuleTarget {
            id: DELETE_TARGET_ID.to_string(),
            arn: self.target_arn.clone(),
            input,
        };
        with_deadline(
            "PutTargets",
            self.call_timeout,
            self.store.put_target(&name, &target),
        )
        .await
        .inspect_err(|err| {
            operator_log::error(
                module_path!(),
                format!("error setting target on schedule rule {name}: {err}"),
            );
        })?;
        operator_log::info(
            module_path!(),
            format!("target {} is set on schedule rule {name}", target.arn),
        );
        Ok(name)
    }

    /// Detaches the target and deletes the rule. Absence counts as done; a
    /// failed lookup is logged and leaves the rule alone.
    pub async fn remove(&self, workshop_name: &str) -> Result<RuleRemoval, ProviderError> {
        let name = rule_name(workshop_name);
        let described = with_deadline(
            "DescribeRule",
            self.call_timeout,
            self.store.describe_rule(&name),
        )
        .await;
        match described {
            Ok(Some(_)) => {}
            Ok(None) => {
                operator_log::info(
                    module_path!(),
                    format!("schedule rule {name} does not exist"),
                );
                return Ok(RuleRemoval::AlreadyAbsent);
            }
            Err(err) if err.is_not_found() => return Ok(RuleRemoval::AlreadyAbsent),
            Err(err) => {
                operator_log::error(
                    module_path!(),
                    format!("error reading schedule rule {name}: {err}"),
                );
                return Ok(RuleRemoval::Skipped);
            }
        }

        operator_log::info(module_path!(), format!("delete schedule rule {name}"));
        ignore_not_found(
            with_deadline(
                "RemoveTargets",
                self.call_timeout,
                self.store.remove_target(&name, DELETE_TARGET_ID),
            )
            .await,
        )?;
        ignore_not_found(
            with_deadline(
                "DeleteRule",
                self.call_timeout,
                self.store.delete_rule(&name),
            )
            .await,
        )?;
        Ok(RuleRemoval::Removed)
    }
}
