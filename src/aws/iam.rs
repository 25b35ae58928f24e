use async_trait::async_trait;
use aws_sdk_iam::Client;

use crate::aws::classify;
use crate::error::ProviderError;
use crate::identity::IdentityProvider;

pub struct IamIdentityProvider {
    client: Client,
}

impl IamIdentityProvider {
    pub fn new(client: Client) -> Self {
        Self { client }
    }
}

#[async_trait]
impl IdentityProvider for IamIdentityProvider {
    async fn user_exists(&self, username: &str) -> Result<bool, ProviderError> {
        match self.client.get_user().user_name(username).send().await {
            Ok(_) => Ok(true),
            Err(err) => {
                let err = classify("GetUser", err);
                if err.is_not_found() { Ok(false) } else { Err(err) }
            }
        }
    }

    async fn create_user(&self, username: &str) -> Result<(), ProviderError> {
        self.client
            .create_user()
            .user_name(username)
            .send()
            .await
            .map_err(|err| classify("CreateUser", err))?;
        Ok(())
    }

    async fn create_login_profile(
        &self,
        username: &str,
        password: &str,
    ) -> Result<(), ProviderError> {
        self.client
            .create_login_profile()
            .user_name(username)
            .password(password)
            .send()
            .await
            .map_err(|err| classify("CreateLoginProfile", err))?;
        Ok(())
    }

    async fn add_user_to_group(&self, username: &str, group: &str) -> Result<(), ProviderError> {
        self.client
            .add_user_to_group()
            .user_name(username)
            .group_name(group)
            .send()
            .await
            .map_err(|err| classify("AddUserToGroup", err))?;
        Ok(())
    }

    async fn delete_login_profile(&self, username: &str) -> Result<(), ProviderError> {
        self.client
            .delete_login_profile()
            .user_name(username)
            .send()
            .await
            .map_err(|err| classify("DeleteLoginProfile", err))?;
        Ok(())
    }

    async fn list_groups_for_user(&self, username: &str) -> Result<Vec<String>, ProviderError> {
        let output = self
            .client
            .list_groups_for_user()
            .user_name(username)
            .send()
            .await
            .map_err(|err| classify("ListGroupsForUser", err))?;
        Ok(output
            .groups()
            .iter()
            .map(|group| group.group_name().to_string())
            .collect())
    }

    async fn remove_user_from_group(
        &self,
        username: &str,
        group: &str,
    ) -> Result<(), ProviderError> {
        self.client
            .remove_user_from_group()
            .user_name(username)
            .group_name(group)
            .send()
            .await
            .map_err(|err| classify("RemoveUserFromGroup", err))?;
        Ok(())
    }

    async fn list_access_keys(&self, username: &str) -> Result<Vec<String>, ProviderError> {
        let output = self
            .client
            .list_access_keys()
            .user_name(username)
            .send()
            .await
            .map_err(|err| classify("ListAccessKeys", err))?;
        Ok(output
            .access_key_metadata()
            .iter()
            .filter_map(|key| key.access_key_id())
            .map(str::to_string)
            .collect())
    }

    async fn delete_access_key(&self, username: &str, key_id: &str) -> Result<(), ProviderError> {
        self.client
            .delete_access_key()
            .user_name(username)
            .access_key_id(key_id)
            .send()
            .await
            .map_err(|err| classify("DeleteAccessKey", err))?;
        Ok(())
    }

    async fn list_ssh_public_keys(&self, username: &str) -> Result<Vec<String>, ProviderError> {
        let output = self
            .client
            .list_ssh_public_keys()
            .user_name(username)
            .send()
            .await
            .map_err(|err| classify("ListSSHPublicKeys", err))?;
        Ok(output
            .ssh_public_keys()
            .iter()
            .map(|key| key.ssh_public_key_id().to_string())
            .collect())
    }

    async fn delete_ssh_public_key(
        &self,
        username: &str,
        key_id: &str,
    ) -> Result<(), ProviderError> {
        self.client
            .delete_ssh_public_key()
            .user_name(username)
            .ssh_public_key_id(key_id)
            .send()
            .await
            .map_err(|err| classify("DeleteSSHPublicKey", err))?;
        Ok(())
    }

    async fn list_service_specific_credentials(
        &self,
        username: &str,
    ) -> Result<Vec<String>, ProviderError> {
        let output = self
            .client
            .list_service_specific_credentials()
            .user_name(username)
            .send()
            .await
            .map_err(|err| classify("ListServiceSpecificCredentials", err))?;
        Ok(output
            .service_specific_credentials()
            .iter()
            .map(|credential| credential.service_specific_credential_id().to_string())
            .collect())
    }

    async fn delete_service_specific_credential(
        &self,
        username: &str,
        credential_id: &str,
    ) -> Result<(), ProviderError> {
        self.client
            .delete_service_specific_credential()
            .user_name(username)
            .service_specific_credential_id(credential_id)
            .send()
            .await
            .map_err(|err| classify("DeleteServiceSpecificCredential", err))?;
        Ok(())
    }

    async fn delete_user(&self, username: &str) -> Result<(), ProviderError> {
        self.client
            .delete_user()
            .user_name(username)
            .send()
            .await
            .map_err(|err| classify("DeleteUser", err))?;
        Ok(())
    }
}
