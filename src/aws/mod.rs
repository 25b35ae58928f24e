//! AWS implementations of the identity, trigger store and notification seams.

use std::sync::Arc;

use aws_config::{BehaviorVersion, Region, SdkConfig};
use aws_sdk_iam::error::{DisplayErrorContext, ProvideErrorMetadata, SdkError};

use crate::config::OperatorConfig;
use crate::error::ProviderError;
use crate::identity::IdentityAccess;
use crate::notify::DynNotifier;
use crate::schedule::DynTriggerStore;

pub mod eventbridge;
pub mod iam;
pub mod ses;
pub mod sts;

pub use eventbridge::EventBridgeTriggerStore;
pub use iam::IamIdentityProvider;
pub use ses::SesNotifier;
pub use sts::AssumedRoleAccess;

/// Error codes the services use for a missing resource.
const NOT_FOUND_CODES: &[&str] = &["NoSuchEntity", "ResourceNotFoundException"];

pub struct AwsServices {
    pub access: Arc<dyn IdentityAccess>,
    pub triggers: DynTriggerStore,
    pub notifier: DynNotifier,
}

impl AwsServices {
    /// Loads the process credentials once. Only identity calls run under the
    /// assumed role; rules and emails use the process credentials.
    pub async fn connect(config: &OperatorConfig) -> Self {
        let sdk_config = load_sdk_config(&config.region).await;
        let access = AssumedRoleAccess::new(
            &sdk_config,
            config.role_to_assume.clone(),
            config.role_session_name.clone(),
            config.session_duration_seconds,
        );
        Self {
            access: Arc::new(access),
            triggers: Arc::new(EventBridgeTriggerStore::new(aws_sdk_eventbridge::Client::new(
                &sdk_config,
            ))),
            notifier: Arc::new(SesNotifier::new(
                aws_sdk_ses::Client::new(&sdk_config),
                config.notification_sender.clone(),
            )),
        }
    }
}

pub async fn load_sdk_config(region: &str) -> SdkConfig {
    aws_config::defaults(BehaviorVersion::latest())
        .region(Region::new(region.to_string()))
        .load()
        .await
}

/// Maps an SDK failure to a [`ProviderError`], recognising missing resources.
pub(crate) fn classify<E, R>(operation: &'static str, err: SdkError<E, R>) -> ProviderError
where
    E: ProvideErrorMetadata + std::error::Error + 'static,
    R: std::fmt::Debug,
{
    let not_found = err
        .code()
        .is_some_and(|code| NOT_FOUND_CODES.contains(&code));
    let message = DisplayErrorContext(&err).to_string();
    if not_found {
        ProviderError::not_found(operation, message)
    } else {
        ProviderError::service(operation, message)
    }
}
