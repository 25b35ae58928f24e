#![allow(dead_code)]

use std::collections::{BTreeMap, HashMap};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use workshop_operator::error::ProviderError;
use workshop_operator::identity::{DynIdentityProvider, IdentityAccess, IdentityProvider};
use workshop_operator::lifecycle::{AccountLifecycle, BatchPolicy, NoticeSettings};
use workshop_operator::notify::{Notification, Notifier};
use workshop_operator::schedule::{RuleTarget, ScheduleRuleManager, TriggerStore};

pub const DELETE_ARN: &str = "arn:aws:lambda:eu-west-1:123456789012:function:delete-users";
pub const TEMPLATE: &str = "workshop-accounts";
pub const LOGIN_URL: &str = "https://signin.example/console";

#[derive(Clone, Debug, Default)]
pub struct FakeUser {
    pub password: Option<String>,
    pub groups: Vec<String>,
    pub access_keys: Vec<String>,
    pub ssh_keys: Vec<String>,
    pub service_credentials: Vec<String>,
}

#[derive(Default)]
struct IdentityState {
    users: BTreeMap<String, FakeUser>,
    failures: Vec<(&'static str, String)>,
    delays: HashMap<&'static str, Duration>,
}

/// In-memory identity provider recording `Operation:username` per call.
#[derive(Clone, Default)]
pub struct FakeIdentity {
    state: Arc<Mutex<IdentityState>>,
    calls: Arc<Mutex<Vec<String>>>,
    in_flight: Arc<AtomicUsize>,
    peak: Arc<AtomicUsize>,
}

impl FakeIdentity {
    pub fn fail(&self, operation: &'static str, username: &str) {
        self.state
            .lock()
            .unwrap()
            .failures
            .push((operation, username.to_string()));
    }

    pub fn delay(&self, operation: &'static str, delay: Duration) {
        self.state.lock().unwrap().delays.insert(operation, delay);
    }

    pub fn insert_user(&self, username: &str, user: FakeUser) {
        self.state
            .lock()
            .unwrap()
            .users
            .insert(username.to_string(), user);
    }

    pub fn user(&self, username: &str) -> Option<FakeUser> {
        self.state.lock().unwrap().users.get(username).cloned()
    }

    pub fn usernames(&self) -> Vec<String> {
        self.state.lock().unwrap().users.keys().cloned().collect()
    }

    pub fn calls(&self) -> Vec<String> {
        self.calls.lock().unwrap().clone()
    }

    pub fn clear_calls(&self) {
        self.calls.lock().unwrap().clear();
    }

    pub fn peak_in_flight(&self) -> usize {
        self.peak.load(Ordering::SeqCst)
    }

    async fn enter(&self, operation: &'static str, username: &str) -> Result<(), ProviderError> {
        self.calls
            .lock()
            .unwrap()
            .push(format!("{operation}:{username}"));
        let (delay, fail) = {
            let state = self.state.lock().unwrap();
            (
                state.delays.get(operation).copied(),
                state
                    .failures
                    .iter()
                    .any(|(op, user)| *op == operation && user == username),
            )
        };
        let now = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        self.peak.fetch_max(now, Ordering::SeqCst);
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }
        self.in_flight.fetch_sub(1, Ordering::SeqCst);
        if fail {
            return Err(ProviderError::service(operation, "injected failure"));
        }
        Ok(())
    }

    fn with_user<T>(
        &self,
        operation: &'static str,
        username: &str,
        update: impl FnOnce(&mut FakeUser) -> Result<T, ProviderError>,
    ) -> Result<T, ProviderError> {
        let mut state = self.state.lock().unwrap();
        let user = state.users.get_mut(username).ok_or_else(|| {
            ProviderError::not_found(operation, format!("user {username} does not exist"))
        })?;
        update(user)
    }
}

fn remove_item(
    items: &mut Vec<String>,
    operation: &'static str,
    item: &str,
) -> Result<(), ProviderError> {
    let before = items.len();
    items.retain(|existing| existing != item);
    if items.len() == before {
        return Err(ProviderError::not_found(operation, format!("{item} not found")));
    }
    Ok(())
}

#[async_trait]
impl IdentityProvider for FakeIdentity {
    async fn user_exists(&self, username: &str) -> Result<bool, ProviderError> {
        self.enter("GetUser", username).await?;
        Ok(self.state.lock().unwrap().users.contains_key(username))
    }

    async fn create_user(&self, username: &str) -> Result<(), ProviderError> {
        self.enter("CreateUser", username).await?;
        let mut state = self.state.lock().unwrap();
        if state.users.contains_key(username) {
            return Err(ProviderError::service(
                "CreateUser",
                format!("EntityAlreadyExists: {username}"),
            ));
        }
        state.users.insert(username.to_string(), FakeUser::default());
        Ok(())
    }

    async fn create_login_profile(
        &self,
        username: &str,
        password: &str,
    ) -> Result<(), ProviderError> {
        self.enter("CreateLoginProfile", username).await?;
        self.with_user("CreateLoginProfile", username, |user| {
            user.password = Some(password.to_string());
            Ok(())
        })
    }

    async fn add_user_to_group(&self, username: &str, group: &str) -> Result<(), ProviderError> {
        self.enter("AddUserToGroup", username).await?;
        self.with_user("AddUserToGroup", username, |user| {
            user.groups.push(group.to_string());
            Ok(())
        })
    }

    async fn delete_login_profile(&self, username: &str) -> Result<(), ProviderError> {
        self.enter("DeleteLoginProfile", username).await?;
        self.with_user("DeleteLoginProfile", username, |user| {
            user.password.take().map(|_| ()).ok_or_else(|| {
                ProviderError::not_found("DeleteLoginProfile", "login profile not found")
            })
        })
    }

    async fn list_groups_for_user(&self, username: &str) -> Result<Vec<String>, ProviderError> {
        self.enter("ListGroupsForUser", username).await?;
        self.with_user("ListGroupsForUser", username, |user| Ok(user.groups.clone()))
    }

    async fn remove_user_from_group(
        &self,
        username: &str,
        group: &str,
    ) -> Result<(), ProviderError> {
        self.enter("RemoveUserFromGroup", username).await?;
        self.with_user("RemoveUserFromGroup", username, |user| {
            remove_item(&mut user.groups, "RemoveUserFromGroup", group)
        })
    }

    async fn list_access_keys(&self, username: &str) -> Result<Vec<String>, ProviderError> {
        self.enter("ListAccessKeys", username).await?;
        self.with_user("ListAccessKeys", username, |user| Ok(user.access_keys.clone()))
    }

    async fn delete_access_key(&self, username: &str, key_id: &str) -> Result<(), ProviderError> {
        self.enter("DeleteAccessKey", username).await?;
        self.with_user("DeleteAccessKey", username, |user| {
            remove_item(&mut user.access_keys, "DeleteAccessKey", key_id)
        })
    }

    async fn list_ssh_public_keys(&self, username: &str) -> Result<Vec<String>, ProviderError> {
        self.enter("ListSSHPublicKeys", username).await?;
        self.with_user("ListSSHPublicKeys", username, |user| Ok(user.ssh_keys.clone()))
    }

    async fn delete_ssh_public_key(
        &self,
        username: &str,
        key_id: &str,
    ) -> Result<(), ProviderError> {
        self.enter("DeleteSSHPublicKey", username).await?;
        self.with_user("DeleteSSHPublicKey", username, |user| {
            remove_item(&mut user.ssh_keys, "DeleteSSHPublicKey", key_id)
        })
    }

    async fn list_service_specific_credentials(
        &self,
        username: &str,
    ) -> Result<Vec<String>, ProviderError> {
        self.enter("ListServiceSpecificCredentials", username).await?;
        self.with_user("ListServiceSpecificCredentials", username, |user| {
            Ok(user.service_credentials.clone())
        })
    }

    async fn delete_service_specific_credential(
        &self,
        username: &str,
        credential_id: &str,
    ) -> Result<(), ProviderError> {
        self.enter("DeleteServiceSpecificCredential", username).await?;
        self.with_user("DeleteServiceSpecificCredential", username, |user| {
            remove_item(
                &mut user.service_credentials,
                "DeleteServiceSpecificCredential",
                credential_id,
            )
        })
    }

    async fn delete_user(&self, username: &str) -> Result<(), ProviderError> {
        self.enter("DeleteUser", username).await?;
        let mut state = self.state.lock().unwrap();
        let user = state.users.get(username).ok_or_else(|| {
            ProviderError::not_found("DeleteUser", format!("user {username} does not exist"))
        })?;
        let attached = user.password.is_some()
            || !user.groups.is_empty()
            || !user.access_keys.is_empty()
            || !user.ssh_keys.is_empty()
            || !user.service_credentials.is_empty();
        if attached {
            return Err(ProviderError::service(
                "DeleteUser",
                format!("DeleteConflict: {username} still has attached entities"),
            ));
        }
        state.users.remove(username);
        Ok(())
    }
}

/// Hands out the shared fake identity, or refuses like a denied AssumeRole.
#[derive(Clone, Default)]
pub struct FakeAccess {
    pub identity: FakeIdentity,
    refuse: bool,
    acquisitions: Arc<AtomicUsize>,
}

impl FakeAccess {
    pub fn new(identity: FakeIdentity) -> Self {
        Self {
            identity,
            ..Default::default()
        }
    }

    pub fn refusing() -> Self {
        Self {
            refuse: true,
            ..Default::default()
        }
    }

    pub fn acquisitions(&self) -> usize {
        self.acquisitions.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl IdentityAccess for FakeAccess {
    async fn acquire(&self) -> Result<DynIdentityProvider, ProviderError> {
        self.acquisitions.fetch_add(1, Ordering::SeqCst);
        if self.refuse {
            return Err(ProviderError::service("AssumeRole", "AccessDenied"));
        }
        Ok(Arc::new(self.identity.clone()))
    }
}

#[derive(Clone, Debug, Default)]
pub struct FakeRule {
    pub expression: String,
    pub targets: Vec<RuleTarget>,
}

/// In-memory trigger store recording `Operation:rule` per call.
#[derive(Clone, Default)]
pub struct FakeTriggerStore {
    rules: Arc<Mutex<BTreeMap<String, FakeRule>>>,
    failures: Arc<Mutex<Vec<&'static str>>>,
    calls: Arc<Mutex<Vec<String>>>,
}

impl FakeTriggerStore {
    pub fn fail(&self, operation: &'static str) {
        self.failures.lock().unwrap().push(operation);
    }

    pub fn rule(&self, name: &str) -> Option<FakeRule> {
        self.rules.lock().unwrap().get(name).cloned()
    }

    pub fn calls(&self) -> Vec<String> {
        self.calls.lock().unwrap().clone()
    }

    pub fn clear_calls(&self) {
        self.calls.lock().unwrap().clear();
    }

    fn enter(&self, operation: &'static str, rule: &str) -> Result<(), ProviderError> {
        self.calls.lock().unwrap().push(format!("{operation}:{rule}"));
        if self.failures.lock().unwrap().contains(&operation) {
            return Err(ProviderError::service(operation, "injected failure"));
        }
        Ok(())
    }

    fn missing(operation: &'static str, rule: &str) -> ProviderError {
        ProviderError::not_found(operation, format!("Rule {rule} does not exist"))
    }
}

#[async_trait]
impl TriggerStore for FakeTriggerStore {
    async fn put_rule(&self, name: &str, schedule_expression: &str) -> Result<(), ProviderError> {
        self.enter("PutRule", name)?;
        self.rules
            .lock()
            .unwrap()
            .entry(name.to_string())
            .or_default()
            .expression = schedule_expression.to_string();
        Ok(())
    }

    async fn put_target(&self, rule: &str, target: &RuleTarget) -> Result<(), ProviderError> {
        self.enter("PutTargets", rule)?;
        let mut rules = self.rules.lock().unwrap();
        let entry = rules
            .get_mut(rule)
            .ok_or_else(|| Self::missing("PutTargets", rule))?;
        entry.targets.retain(|existing| existing.id != target.id);
        entry.targets.push(target.clone());
        Ok(())
    }

    async fn describe_rule(&self, name: &str) -> Result<Option<String>, ProviderError> {
        self.enter("DescribeRule", name)?;
        Ok(self
            .rules
            .lock()
            .unwrap()
            .get(name)
            .map(|rule| rule.expression.clone()))
    }

    async fn remove_target(&self, rule: &str, target_id: &str) -> Result<(), ProviderError> {
        self.enter("RemoveTargets", rule)?;
        let mut rules = self.rules.lock().unwrap();
        let entry = rules
            .get_mut(rule)
            .ok_or_else(|| Self::missing("RemoveTargets", rule))?;
        entry.targets.retain(|existing| existing.id != target_id);
        Ok(())
    }

    async fn delete_rule(&self, name: &str) -> Result<(), ProviderError> {
        self.enter("DeleteRule", name)?;
        let mut rules = self.rules.lock().unwrap();
        let entry = rules
            .get(name)
            .ok_or_else(|| Self::missing("DeleteRule", name))?;
        if !entry.targets.is_empty() {
            return Err(ProviderError::service(
                "DeleteRule",
                "rule can't be deleted since it has targets",
            ));
        }
        rules.remove(name);
        Ok(())
    }
}

#[derive(Clone, Default)]
pub struct FakeNotifier {
    sent: Arc<Mutex<Vec<Notification>>>,
    refuse: bool,
}

impl FakeNotifier {
    pub fn refusing() -> Self {
        Self {
            refuse: true,
            ..Default::default()
        }
    }

    pub fn sent(&self) -> Vec<Notification> {
        self.sent.lock().unwrap().clone()
    }
}

#[async_trait]
impl Notifier for FakeNotifier {
    async fn notify(&self, notification: &Notification) -> Result<(), ProviderError> {
        self.sent.lock().unwrap().push(notification.clone());
        if self.refuse {
            return Err(ProviderError::service(
                "SendTemplatedEmail",
                "MessageRejected: email address is not verified",
            ));
        }
        Ok(())
    }
}

pub struct Harness {
    pub access: FakeAccess,
    pub identity: FakeIdentity,
    pub store: FakeTriggerStore,
    pub notifier: FakeNotifier,
    pub lifecycle: Arc<AccountLifecycle>,
}

impl Harness {
    pub fn new() -> Self {
        Self::with(FakeAccess::default(), FakeNotifier::default(), BatchPolicy::default())
    }

    pub fn with(access: FakeAccess, notifier: FakeNotifier, policy: BatchPolicy) -> Self {
        let store = FakeTriggerStore::default();
        let rules = ScheduleRuleManager::new(
            Arc::new(store.clone()),
            DELETE_ARN,
            policy.call_timeout,
        );
        let lifecycle = AccountLifecycle::new(
            Arc::new(access.clone()),
            rules,
            Arc::new(notifier.clone()),
            NoticeSettings {
                template: TEMPLATE.to_string(),
                login_url: LOGIN_URL.to_string(),
            },
            policy,
        );
        Self {
            identity: access.identity.clone(),
            access,
            store,
            notifier,
            lifecycle: Arc::new(lifecycle),
        }
    }
}
