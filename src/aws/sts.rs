use std::sync::Arc;
use std::time::SystemTime;

use async_trait::async_trait;
use aws_config::SdkConfig;

use crate::aws::{IamIdentityProvider, classify};
use crate::error::ProviderError;
use crate::identity::{DynIdentityProvider, IdentityAccess};
use crate::operator_log;

/// Elevated access through STS AssumeRole. Without a role the process
/// credentials are used as they are.
pub struct AssumedRoleAccess {
    base: SdkConfig,
    sts: aws_sdk_sts::Client,
    role_arn: Option<String>,
    session_name: String,
    duration_seconds: i32,
}

impl AssumedRoleAccess {
    pub fn new(
        base: &SdkConfig,
        role_arn: Option<String>,
        session_name: String,
        duration_seconds: i32,
    ) -> Self {
        Self {
            base: base.clone(),
            sts: aws_sdk_sts::Client::new(base),
            role_arn,
            session_name,
            duration_seconds,
        }
    }
}

#[async_trait]
impl IdentityAccess for AssumedRoleAccess {
    async fn acquire(&self) -> Result<DynIdentityProvider, ProviderError> {
        let Some(role_arn) = self.role_arn.as_deref() else {
            operator_log::debug(module_path!(), "no role to assume, using process credentials");
            return Ok(Arc::new(IamIdentityProvider::new(aws_sdk_iam::Client::new(
                &self.base,
            ))));
        };
        let output = self
            .sts
            .assume_role()
            .role_arn(role_arn)
            .role_session_name(&self.session_name)
            .duration_seconds(self.duration_seconds)
            .send()
            .await
            .map_err(|err| classify("AssumeRole", err))?;
        let granted = output
            .credentials()
            .ok_or_else(|| ProviderError::service("AssumeRole", "no credentials returned"))?;
        let expires_after = SystemTime::try_from(*granted.expiration()).ok();
        let credentials = aws_sdk_iam::config::Credentials::new(
            granted.access_key_id(),
            granted.secret_access_key(),
            Some(granted.session_token().to_string()),
            expires_after,
            "workshop-assumed-role",
        );
        let iam_config = aws_sdk_iam::config::Builder::from(&self.base)
            .credentials_provider(credentials)
            .build();
        operator_log::debug(
            module_path!(),
            format!(
                "assumed role {role_arn} session={} for {}s",
                self.session_name, self.duration_seconds
            ),
        );
        Ok(Arc::new(IamIdentityProvider::new(
            aws_sdk_iam::Client::from_conf(iam_config),
        )))
    }
}
