//! Batch creation and deletion of workshop accounts.
//!
//! Every account of a batch is processed concurrently, up to
//! [`BatchPolicy::max_concurrency`] at a time, and the batch waits for all of
//! them before touching the trigger store. Creation failures are recorded on
//! the returned [`Account`]; deletion failures on the returned
//! [`AccountDeletion`]. Neither aborts sibling accounts.

use std::sync::Arc;
use std::time::Duration;

use futures::future::join_all;
use tokio::sync::Semaphore;

use crate::error::{LifecycleError, ProviderError, ignore_not_found, with_deadline};
use crate::identity::{DynIdentityProvider, IdentityAccess, IdentityProvider};
use crate::notify::{AccountsNotice, DynNotifier, Notification};
use crate::operator_log;
use crate::password;
use crate::schedule::{RuleRemoval, ScheduleRuleManager, rule_name};
use crate::workshop::{
    Account, AccountDeletion, DEFAULT_MAX_ACCOUNTS, DeleteRequest, Workshop, WorkshopRequest,
};

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct BatchPolicy {
    pub max_concurrency: usize,
    pub call_timeout: Duration,
    /// Largest `accountCount` a single batch may ask for.
    pub max_accounts: u32,
}

impl Default for BatchPolicy {
    fn default() -> Self {
        Self {
            max_concurrency: 10,
            call_timeout: Duration::from_secs(30),
            max_accounts: DEFAULT_MAX_ACCOUNTS,
        }
    }
}

#[derive(Clone, Debug, Default)]
pub struct NoticeSettings {
    pub template: String,
    pub login_url: String,
}

pub struct AccountLifecycle {
    access: Arc<dyn IdentityAccess>,
    rules: ScheduleRuleManager,
    notifier: DynNotifier,
    notice: NoticeSettings,
    policy: BatchPolicy,
}

impl AccountLifecycle {
    pub fn new(
        access: Arc<dyn IdentityAccess>,
        rules: ScheduleRuleManager,
        notifier: DynNotifier,
        notice: NoticeSettings,
        policy: BatchPolicy,
    ) -> Self {
        Self {
            access,
            rules,
            notifier,
            notice,
            policy,
        }
    }

    pub fn policy(&self) -> BatchPolicy {
        self.policy
    }

    /// Creates `accountCount` accounts, registers their deletion rule and
    /// notifies the responsible contact.
    ///
    /// The result holds one entry per derived username whatever happened to
    /// it; callers inspect `creation_error` per entry.
    pub async fn create_batch(
        &self,
        request: &WorkshopRequest,
    ) -> Result<Vec<Account>, LifecycleError> {
        let workshop = request.validate(self.policy.max_accounts).inspect_err(|err| {
            operator_log::error(module_path!(), format!("create batch rejected: {err}"));
        })?;
        operator_log::info(
            module_path!(),
            format!(
                "create batch workshop={} accounts={} delete_at={} group={}",
                workshop.name,
                workshop.account_count,
                workshop.delete_at.to_rfc3339(),
                workshop.group_name.as_deref().unwrap_or("none"),
            ),
        );

        let identity = self.acquire().await?;
        let usernames = workshop.usernames();
        let accounts = self
            .for_each_account(&usernames, |username| {
                let identity = identity.clone();
                let group = workshop.group_name.clone();
                let window = self.policy.call_timeout;
                async move {
                    AccountTask::new(identity.as_ref(), &username, window)
                        .create(group.as_deref())
                        .await
                }
            })
            .await;
        let failed = accounts.iter().filter(|account| !account.is_created()).count();
        operator_log::info(
            module_path!(),
            format!(
                "created users workshop={} ok={} failed={}",
                workshop.name,
                accounts.len() - failed,
                failed
            ),
        );

        // Every derived username goes into the rule: deleting one that was
        // never created is a no-op.
        if let Err(source) = self
            .rules
            .install(&workshop.name, &usernames, workshop.delete_at)
            .await
        {
            return Err(LifecycleError::Schedule {
                rule: rule_name(&workshop.name),
                accounts,
                source,
            });
        }

        self.send_notice(&workshop, &accounts).await;
        Ok(accounts)
    }

    /// Deletes every listed user that still exists, then removes the
    /// workshop's schedule rule. Safe to run again on the same payload.
    pub async fn delete_batch(
        &self,
        request: &DeleteRequest,
    ) -> Result<Vec<AccountDeletion>, LifecycleError> {
        let (workshop_name, usernames) = request.validate().inspect_err(|err| {
            operator_log::error(module_path!(), format!("delete batch rejected: {err}"));
        })?;
        operator_log::info(
            module_path!(),
            format!(
                "delete batch workshop={} users={}",
                workshop_name,
                usernames.join(",")
            ),
        );

        let identity = self.acquire().await?;
        let deletions = self
            .for_each_account(usernames, |username| {
                let identity = identity.clone();
                let window = self.policy.call_timeout;
                async move {
                    AccountTask::new(identity.as_ref(), &username, window)
                        .delete()
                        .await
                }
            })
            .await;
        let failed = deletions.iter().filter(|item| !item.is_deleted()).count();
        if failed > 0 {
            operator_log::error(
                module_path!(),
                format!("deleted users workshop={workshop_name} with {failed} failure(s)"),
            );
        } else {
            operator_log::info(
                module_path!(),
                format!(
                    "deleted users workshop={} count={}",
                    workshop_name,
                    deletions.len()
                ),
            );
        }

        match self.rules.remove(workshop_name).await? {
            RuleRemoval::Removed | RuleRemoval::AlreadyAbsent => {}
            RuleRemoval::Skipped => operator_log::warn(
                module_path!(),
                format!("schedule rule for workshop {workshop_name} left in place"),
            ),
        }
        Ok(deletions)
    }

    async fn acquire(&self) -> Result<DynIdentityProvider, LifecycleError> {
        with_deadline("AssumeRole", self.policy.call_timeout, self.access.acquire())
            .await
            .map_err(|err| {
                operator_log::error(module_path!(), format!("elevated access refused: {err}"));
                LifecycleError::Access(err)
            })
    }

    /// Runs `task` for every username under the concurrency bound and returns
    /// the results in username order.
    async fn for_each_account<T, F, Fut>(&self, usernames: &[String], task: F) -> Vec<T>
    where
        F: Fn(String) -> Fut,
        Fut: Future<Output = T>,
    {
        let permits = Semaphore::new(self.policy.max_concurrency.max(1));
        let permits = &permits;
        let runs = usernames.iter().map(|username| {
            let run = task(username.clone());
            async move {
                let _permit = permits.acquire().await.ok();
                run.await
            }
        });
        join_all(runs).await
    }

    async fn send_notice(&self, workshop: &Workshop, accounts: &[Account]) {
        let Some(recipient) = workshop.responsible_contact.clone() else {
            operator_log::info(
                module_path!(),
                format!("no responsible contact for workshop {}, skip email", workshop.name),
            );
            return;
        };
        let notification = Notification {
            template: self.notice.template.clone(),
            recipient,
            data: AccountsNotice {
                workshop_name: workshop.name.clone(),
                login_url: self.notice.login_url.clone(),
                accounts: accounts.to_vec(),
            },
        };
        operator_log::info(
            module_path!(),
            format!("send email to {}", notification.recipient),
        );
        let sent = with_deadline(
            "SendTemplatedEmail",
            self.policy.call_timeout,
            self.notifier.notify(&notification),
        )
        .await;
        match sent {
            Ok(()) => operator_log::debug(
                module_path!(),
                format!(
                    "email sent to {} template={}",
                    notification.recipient, notification.template
                ),
            ),
            Err(err) => operator_log::error(
                module_path!(),
                format!(
                    "error when sending email to {} template={}: {err}",
                    notification.recipient, notification.template
                ),
            ),
        }
    }
}

/// The ordered per-account sequence, run under one elevated session.
struct AccountTask<'a> {
    identity: &'a dyn IdentityProvider,
    username: &'a str,
    window: Duration,
}

impl<'a> AccountTask<'a> {
    fn new(identity: &'a dyn IdentityProvider, username: &'a str, window: Duration) -> Self {
        Self {
            identity,
            username,
            window,
        }
    }

    async fn create(&self, group: Option<&str>) -> Account {
        match self.try_create(group).await {
            Ok(password) => Account::created(self.username, password),
            Err(err) => {
                operator_log::error(
                    module_path!(),
                    format!("error creating user {}: {err}", self.username),
                );
                Account::failed(self.username, err)
            }
        }
    }

    // Steps already done stay done when a later one fails.
    async fn try_create(&self, group: Option<&str>) -> Result<String, ProviderError> {
        let user = self.username;
        operator_log::debug(module_path!(), format!("create user {user}"));
        with_deadline("CreateUser", self.window, self.identity.create_user(user)).await?;

        let password = password::generate();
        operator_log::trace(
            module_path!(),
            format!("create login profile for {user} with password {password}"),
        );
        with_deadline(
            "CreateLoginProfile",
            self.window,
            self.identity.create_login_profile(user, &password),
        )
        .await?;

        match group {
            Some(group) => {
                operator_log::debug(module_path!(), format!("add user {user} to group {group}"));
                with_deadline(
                    "AddUserToGroup",
                    self.window,
                    self.identity.add_user_to_group(user, group),
                )
                .await?;
            }
            None => operator_log::warn(
                module_path!(),
                format!("no group requested, user {user} is left without group"),
            ),
        }
        Ok(password)
    }

    async fn delete(&self) -> AccountDeletion {
        let user = self.username;
        let exists =
            with_deadline("GetUser", self.window, self.identity.user_exists(user)).await;
        let outcome = match exists {
            Ok(false) => {
                operator_log::info(module_path!(), format!("user {user} is already deleted"));
                return AccountDeletion {
                    username: user.to_string(),
                    existed: false,
                    error: None,
                };
            }
            Ok(true) => self.try_delete().await,
            Err(err) => Err(err),
        };
        if let Err(err) = &outcome {
            operator_log::error(module_path!(), format!("error deleting user {user}: {err}"));
        }
        AccountDeletion {
            username: user.to_string(),
            existed: true,
            error: outcome.err(),
        }
    }

    async fn try_delete(&self) -> Result<(), ProviderError> {
        let user = self.username;
        let id = self.identity;
        operator_log::debug(module_path!(), format!("delete user {user}"));

        match with_deadline("DeleteLoginProfile", self.window, id.delete_login_profile(user)).await
        {
            Err(err) if err.is_not_found() => operator_log::info(
                module_path!(),
                format!("login profile for {user} doesn't exist"),
            ),
            other => other?,
        }

        let groups =
            with_deadline("ListGroupsForUser", self.window, id.list_groups_for_user(user)).await?;
        for group in &groups {
            ignore_not_found(
                with_deadline(
                    "RemoveUserFromGroup",
                    self.window,
                    id.remove_user_from_group(user, group),
                )
                .await,
            )?;
        }

        let keys = with_deadline("ListAccessKeys", self.window, id.list_access_keys(user)).await?;
        for key in &keys {
            ignore_not_found(
                with_deadline(
                    "DeleteAccessKey",
                    self.window,
                    id.delete_access_key(user, key),
                )
                .await,
            )?;
        }

        let ssh_keys =
            with_deadline("ListSSHPublicKeys", self.window, id.list_ssh_public_keys(user)).await?;
        for key in &ssh_keys {
            ignore_not_found(
                with_deadline(
                    "DeleteSSHPublicKey",
                    self.window,
                    id.delete_ssh_public_key(user, key),
                )
                .await,
            )?;
        }

        let credentials = with_deadline(
            "ListServiceSpecificCredentials",
            self.window,
            id.list_service_specific_credentials(user),
        )
        .await?;
        for credential in &credentials {
            ignore_not_found(
                with_deadline(
                    "DeleteServiceSpecificCredential",
                    self.window,
                    id.delete_service_specific_credential(user, credential),
                )
                .await,
            )?;
        }

        ignore_not_found(with_deadline("DeleteUser", self.window, id.delete_user(user)).await)?;
        operator_log::debug(
            module_path!(),
            format!(
                "user {user} deleted groups={} access_keys={} ssh_keys={} credentials={}",
                groups.len(),
                keys.len(),
                ssh_keys.len(),
                credentials.len()
            ),
        );
        Ok(())
    }
}
