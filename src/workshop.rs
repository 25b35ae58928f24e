//! Workshop batch data model and the trigger payloads that carry it.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize, Serializer};

use crate::error::{LifecycleError, ProviderError};

/// Creation request as received from the conversational flow, the CLI or a
/// direct trigger. Nothing is checked until [`WorkshopRequest::validate`].
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WorkshopRequest {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub workshop_name: Option<String>,
    #[serde(default, alias = "nbUsersToCreate", skip_serializing_if = "Option::is_none")]
    pub account_count: Option<u32>,
    /// ISO-8601 timestamp.
    #[serde(default, alias = "dateToDelete", skip_serializing_if = "Option::is_none")]
    pub delete_at: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub group_name: Option<String>,
    #[serde(default, alias = "responsableEmail", skip_serializing_if = "Option::is_none")]
    pub responsible_contact: Option<String>,
}

/// A creation request whose mandatory fields are present and parsed.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Workshop {
    pub name: String,
    pub account_count: u32,
    pub delete_at: DateTime<Utc>,
    pub group_name: Option<String>,
    pub responsible_contact: Option<String>,
}

/// Upper bound on `accountCount` unless configured otherwise.
pub const DEFAULT_MAX_ACCOUNTS: u32 = 100;

impl WorkshopRequest {
    /// Checks mandatory fields and bounds `accountCount` to `1..=max_accounts`.
    pub fn validate(&self, max_accounts: u32) -> Result<Workshop, LifecycleError> {
        let name = self
            .workshop_name
            .as_deref()
            .map(str::trim)
            .filter(|value| !value.is_empty())
            .ok_or_else(|| missing("workshopName"))?;
        let raw_delete_at = self
            .delete_at
            .as_deref()
            .map(str::trim)
            .filter(|value| !value.is_empty())
            .ok_or_else(|| missing("deleteAt"))?;
        let delete_at = DateTime::parse_from_rfc3339(raw_delete_at)
            .map(|value| value.with_timezone(&Utc))
            .map_err(|err| {
                LifecycleError::Validation(format!(
                    "deleteAt is not an ISO-8601 timestamp ({raw_delete_at}): {err}"
                ))
            })?;
        let account_count = self.account_count.unwrap_or(1);
        if account_count == 0 {
            return Err(LifecycleError::Validation(
                "accountCount must be at least 1".to_string(),
            ));
        }
        if account_count > max_accounts {
            return Err(LifecycleError::Validation(format!(
                "accountCount {account_count} exceeds the limit of {max_accounts}"
            )));
        }
        Ok(Workshop {
            name: name.to_string(),
            account_count,
            delete_at,
            group_name: non_blank(self.group_name.as_deref()),
            responsible_contact: non_blank(self.responsible_contact.as_deref()),
        })
    }
}

impl Workshop {
    pub fn usernames(&self) -> Vec<String> {
        usernames_for(&self.name, self.account_count)
    }
}

/// `{workshop}-1 ..= {workshop}-{count}`. Deletion relies on this being stable.
pub fn usernames_for(workshop_name: &str, count: u32) -> Vec<String> {
    (1..=count)
        .map(|index| format!("{workshop_name}-{index}"))
        .collect()
}

/// Deletion request, usually the payload the trigger store replays at the
/// scheduled time.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DeleteRequest {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub workshop_name: Option<String>,
    #[serde(default, alias = "usersToDelete", skip_serializing_if = "Option::is_none")]
    pub usernames: Option<Vec<String>>,
}

impl DeleteRequest {
    pub fn new(workshop_name: impl Into<String>, usernames: Vec<String>) -> Self {
        Self {
            workshop_name: Some(workshop_name.into()),
            usernames: Some(usernames),
        }
    }

    pub fn validate(&self) -> Result<(&str, &[String]), LifecycleError> {
        let name = self
            .workshop_name
            .as_deref()
            .filter(|value| !value.trim().is_empty())
            .ok_or_else(|| missing("workshopName"))?;
        let usernames = self.usernames.as_deref().ok_or_else(|| missing("usernames"))?;
        Ok((name, usernames))
    }
}

/// Outcome of one account creation. Exactly one of `password` and
/// `creation_error` is set.
#[derive(Clone, Debug, Serialize)]
pub struct Account {
    pub username: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub password: Option<String>,
    #[serde(
        rename = "error",
        skip_serializing_if = "Option::is_none",
        serialize_with = "serialize_provider_error"
    )]
    pub creation_error: Option<ProviderError>,
}

impl Account {
    pub fn created(username: impl Into<String>, password: String) -> Self {
        Self {
            username: username.into(),
            password: Some(password),
            creation_error: None,
        }
    }

    pub fn failed(username: impl Into<String>, error: ProviderError) -> Self {
        Self {
            username: username.into(),
            password: None,
            creation_error: Some(error),
        }
    }

    pub fn is_created(&self) -> bool {
        self.creation_error.is_none()
    }
}

#[derive(Clone, Debug, Serialize)]
pub struct AccountDeletion {
    pub username: String,
    /// False when the identity was already absent.
    pub existed: bool,
    #[serde(skip_serializing_if = "Option::is_none", serialize_with = "serialize_provider_error")]
    pub error: Option<ProviderError>,
}

impl AccountDeletion {
    pub fn is_deleted(&self) -> bool {
        self.error.is_none()
    }
}

fn serialize_provider_error<S: Serializer>(
    error: &Option<ProviderError>,
    serializer: S,
) -> Result<S::Ok, S::Error> {
    match error {
        Some(error) => serializer.serialize_str(&error.to_string()),
        None => serializer.serialize_none(),
    }
}

fn missing(field: &str) -> LifecycleError {
    LifecycleError::Validation(format!("{field} is mandatory"))
}

fn non_blank(value: Option<&str>) -> Option<String> {
    value
        .map(str::trim)
        .filter(|value| !value.is_empty())
        .map(str::to_string)
}
