//! IAM API: login, users, groups, permissions and SAML providers.

use reqwest::Method;
use serde::{Deserialize, Serialize};

use super::{ClientError, DcosClient};

const IAM: [&str; 3] = ["acs", "api", "v1"];

/// Login request; exactly one of `password` or `token` is set.
#[derive(Debug, Clone, Default, Serialize)]
pub struct IamLogin {
    /// User id.
    pub uid: String,
    /// Password for password logins.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub password: Option<String>,
    /// Existing token to exchange.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub token: Option<String>,
}

/// Token returned by a successful login.
#[derive(Debug, Clone, Deserialize)]
pub struct AuthToken {
    /// The ACS token.
    pub token: String,
}

/// Body for creating a user or service account.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct IamUserCreate {
    /// Free text description.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    /// Password (regular users).
    #[serde(skip_serializing_if = "Option::is_none")]
    pub password: Option<String>,
    /// Public key (service accounts).
    #[serde(skip_serializing_if = "Option::is_none")]
    pub public_key: Option<String>,
}

/// Body for updating a user.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct IamUserUpdate {
    /// New description.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    /// New password.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub password: Option<String>,
}

/// A user or service account as returned by the cluster.
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
pub struct IamUser {
    /// User id.
    #[serde(default)]
    pub uid: String,
    /// Description.
    #[serde(default)]
    pub description: String,
    /// Public key for service accounts.
    #[serde(default)]
    pub public_key: Option<String>,
    /// Whether the account is a service account.
    #[serde(default)]
    pub is_service: bool,
}

/// Body for creating or updating a group.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct IamGroupUpdate {
    /// Group description.
    pub description: String,
}

/// A group as returned by the cluster.
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
pub struct IamGroup {
    /// Group id.
    #[serde(default)]
    pub gid: String,
    /// Description.
    #[serde(default)]
    pub description: String,
}

#[derive(Debug, Deserialize)]
struct GroupUsers {
    #[serde(default)]
    array: Vec<GroupUserEntry>,
}

#[derive(Debug, Deserialize)]
struct GroupUserEntry {
    user: IamUser,
}

#[derive(Debug, Serialize)]
struct AclDescription<'a> {
    description: &'a str,
}

#[derive(Debug, Deserialize)]
struct ActionAllowed {
    allowed: bool,
}

/// SAML provider configuration.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SamlProviderConfig {
    /// Description shown on the login page.
    #[serde(default)]
    pub description: String,
    /// Identity provider metadata XML.
    #[serde(default)]
    pub idp_metadata: String,
    /// Service provider base URL.
    #[serde(default)]
    pub sp_base_url: String,
}

#[derive(Debug, Deserialize)]
struct CallbackUrl {
    #[serde(rename = "acs-callback-url")]
    url: String,
}

/// IAM calls.
pub struct IamApi<'a> {
    client: &'a DcosClient,
}

impl<'a> IamApi<'a> {
    pub(crate) fn new(client: &'a DcosClient) -> Self {
        Self { client }
    }

    fn url(&self, tail: &[&str]) -> Result<reqwest::Url, ClientError> {
        let segments: Vec<&str> = IAM.iter().copied().chain(tail.iter().copied()).collect();
        self.client.url(&segments)
    }

    /// Log in and obtain an ACS token.
    pub async fn login(&self, login: &IamLogin) -> Result<AuthToken, ClientError> {
        let url = self.url(&["auth", "login"])?;
        self.client
            .send_json(Method::POST, url, login, None)
            .await
    }

    /// Create a user or service account.
    pub async fn create_user(&self, uid: &str, user: &IamUserCreate) -> Result<(), ClientError> {
        let url = self.url(&["users", uid])?;
        self.client
            .send(Method::PUT, url, Some(user), None)
            .await
            .map(drop)
    }

    /// Fetch a user or service account.
    pub async fn get_user(&self, uid: &str) -> Result<IamUser, ClientError> {
        self.client.get_json(self.url(&["users", uid])?).await
    }

    /// Update a user's mutable fields.
    pub async fn update_user(&self, uid: &str, update: &IamUserUpdate) -> Result<(), ClientError> {
        let url = self.url(&["users", uid])?;
        self.client
            .send(Method::PATCH, url, Some(update), None)
            .await
            .map(drop)
    }

    /// Delete a user or service account.
    pub async fn delete_user(&self, uid: &str) -> Result<(), ClientError> {
        let url = self.url(&["users", uid])?;
        self.client
            .send::<()>(Method::DELETE, url, None, None)
            .await
            .map(drop)
    }

    /// Create a group.
    pub async fn create_group(&self, gid: &str, group: &IamGroupUpdate) -> Result<(), ClientError> {
        let url = self.url(&["groups", gid])?;
        self.client
            .send(Method::PUT, url, Some(group), None)
            .await
            .map(drop)
    }

    /// Fetch a group.
    pub async fn get_group(&self, gid: &str) -> Result<IamGroup, ClientError> {
        self.client.get_json(self.url(&["groups", gid])?).await
    }

    /// Update a group's description.
    pub async fn update_group(&self, gid: &str, group: &IamGroupUpdate) -> Result<(), ClientError> {
        let url = self.url(&["groups", gid])?;
        self.client
            .send(Method::PATCH, url, Some(group), None)
            .await
            .map(drop)
    }

    /// Delete a group.
    pub async fn delete_group(&self, gid: &str) -> Result<(), ClientError> {
        let url = self.url(&["groups", gid])?;
        self.client
            .send::<()>(Method::DELETE, url, None, None)
            .await
            .map(drop)
    }

    /// Add a user to a group.
    pub async fn add_group_member(&self, gid: &str, uid: &str) -> Result<(), ClientError> {
        let url = self.url(&["groups", gid, "users", uid])?;
        self.client
            .send::<()>(Method::PUT, url, None, None)
            .await
            .map(drop)
    }

    /// List the members of a group.
    pub async fn list_group_members(&self, gid: &str) -> Result<Vec<IamUser>, ClientError> {
        let users: GroupUsers = self
            .client
            .get_json(self.url(&["groups", gid, "users"])?)
            .await?;
        Ok(users.array.into_iter().map(|e| e.user).collect())
    }

    /// Remove a user from a group.
    pub async fn remove_group_member(&self, gid: &str, uid: &str) -> Result<(), ClientError> {
        let url = self.url(&["groups", gid, "users", uid])?;
        self.client
            .send::<()>(Method::DELETE, url, None, None)
            .await
            .map(drop)
    }

    /// Create an ACL for a resource id.
    pub async fn create_acl(&self, rid: &str, description: &str) -> Result<(), ClientError> {
        let url = self.url(&["acls", rid])?;
        self.client
            .send(Method::PUT, url, Some(&AclDescription { description }), None)
            .await
            .map(drop)
    }

    /// Change the description of an existing ACL.
    pub async fn update_acl(&self, rid: &str, description: &str) -> Result<(), ClientError> {
        let url = self.url(&["acls", rid])?;
        self.client
            .send(Method::PATCH, url, Some(&AclDescription { description }), None)
            .await
            .map(drop)
    }

    /// Permit `action` on `rid` for `uid`.
    pub async fn grant_user_action(
        &self,
        rid: &str,
        uid: &str,
        action: &str,
    ) -> Result<(), ClientError> {
        let url = self.url(&["acls", rid, "users", uid, action])?;
        self.client
            .send::<()>(Method::PUT, url, None, None)
            .await
            .map(drop)
    }

    /// Whether `uid` may perform `action` on `rid`.
    pub async fn user_action_allowed(
        &self,
        rid: &str,
        uid: &str,
        action: &str,
    ) -> Result<bool, ClientError> {
        let allowed: ActionAllowed = self
            .client
            .get_json(self.url(&["acls", rid, "users", uid, action])?)
            .await?;
        Ok(allowed.allowed)
    }

    /// Revoke `action` on `rid` from `uid`.
    pub async fn revoke_user_action(
        &self,
        rid: &str,
        uid: &str,
        action: &str,
    ) -> Result<(), ClientError> {
        let url = self.url(&["acls", rid, "users", uid, action])?;
        self.client
            .send::<()>(Method::DELETE, url, None, None)
            .await
            .map(drop)
    }

    /// Create a SAML provider.
    pub async fn create_saml_provider(
        &self,
        provider_id: &str,
        config: &SamlProviderConfig,
    ) -> Result<(), ClientError> {
        let url = self.url(&["auth", "saml", "providers", provider_id])?;
        self.client
            .send(Method::PUT, url, Some(config), None)
            .await
            .map(drop)
    }

    /// Fetch a SAML provider.
    pub async fn get_saml_provider(
        &self,
        provider_id: &str,
    ) -> Result<SamlProviderConfig, ClientError> {
        self.client
            .get_json(self.url(&["auth", "saml", "providers", provider_id])?)
            .await
    }

    /// Update a SAML provider.
    pub async fn update_saml_provider(
        &self,
        provider_id: &str,
        config: &SamlProviderConfig,
    ) -> Result<(), ClientError> {
        let url = self.url(&["auth", "saml", "providers", provider_id])?;
        self.client
            .send(Method::PATCH, url, Some(config), None)
            .await
            .map(drop)
    }

    /// Delete a SAML provider.
    pub async fn delete_saml_provider(&self, provider_id: &str) -> Result<(), ClientError> {
        let url = self.url(&["auth", "saml", "providers", provider_id])?;
        self.client
            .send::<()>(Method::DELETE, url, None, None)
            .await
            .map(drop)
    }

    /// The assertion consumer service URL the IdP must call back.
    pub async fn saml_callback_url(&self, provider_id: &str) -> Result<String, ClientError> {
        let callback: CallbackUrl = self
            .client
            .get_json(self.url(&["auth", "saml", "providers", provider_id, "acs-callback-url"])?)
            .await?;
        Ok(callback.url)
    }

    /// Service provider metadata XML for registering with the IdP.
    pub async fn saml_sp_metadata(&self, provider_id: &str) -> Result<String, ClientError> {
        self.client
            .get_text(self.url(&["auth", "saml", "providers", provider_id, "sp-metadata"])?)
            .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::ClusterConfig;
    use crate::testing::FakeCluster;
    use std::sync::Arc;

    fn client() -> (Arc<FakeCluster>, DcosClient) {
        let fake = Arc::new(FakeCluster::new());
        let client =
            DcosClient::with_transport(ClusterConfig::new("https://cluster"), fake.clone())
                .unwrap();
        (fake, client)
    }

    #[tokio::test]
    async fn test_login_posts_credentials() {
        let (fake, client) = client();
        let token = client
            .iam()
            .login(&IamLogin {
                uid: "alice".into(),
                password: Some("x".into()),
                token: None,
            })
            .await
            .unwrap();

        assert_eq!(token.token, "token-for-alice");
        let requests = fake.requests();
        assert_eq!(requests[0].url.path(), "/acs/api/v1/auth/login");
        let body = requests[0].json_body();
        assert_eq!(body["uid"], "alice");
        assert_eq!(body["password"], "x");
        assert!(body.get("token").is_none());
    }

    #[tokio::test]
    async fn test_user_crud() {
        let (_, client) = client();
        let iam = client.iam();

        iam.create_user(
            "alice",
            &IamUserCreate {
                description: Some("Alice".into()),
                password: Some("secret".into()),
                public_key: None,
            },
        )
        .await
        .unwrap();
        assert_eq!(iam.get_user("alice").await.unwrap().description, "Alice");

        iam.update_user(
            "alice",
            &IamUserUpdate {
                description: Some("Alice B.".into()),
                password: None,
            },
        )
        .await
        .unwrap();
        assert_eq!(iam.get_user("alice").await.unwrap().description, "Alice B.");

        iam.delete_user("alice").await.unwrap();
        assert!(iam.get_user("alice").await.unwrap_err().is_not_found());
    }

    #[tokio::test]
    async fn test_group_membership() {
        let (_, client) = client();
        let iam = client.iam();

        iam.create_group(
            "ops",
            &IamGroupUpdate {
                description: "Operators".into(),
            },
        )
        .await
        .unwrap();
        iam.create_user("bob", &IamUserCreate::default()).await.unwrap();
        iam.add_group_member("ops", "bob").await.unwrap();

        let members = iam.list_group_members("ops").await.unwrap();
        assert_eq!(members.len(), 1);
        assert_eq!(members[0].uid, "bob");

        iam.remove_group_member("ops", "bob").await.unwrap();
        assert!(iam.list_group_members("ops").await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_acl_grants() {
        let (_, client) = client();
        let iam = client.iam();
        let rid = "dcos:adminrouter:service:marathon";

        iam.create_acl(rid, "Marathon").await.unwrap();
        assert!(!iam.user_action_allowed(rid, "alice", "full").await.unwrap());

        iam.grant_user_action(rid, "alice", "full").await.unwrap();
        assert!(iam.user_action_allowed(rid, "alice", "full").await.unwrap());

        iam.revoke_user_action(rid, "alice", "full").await.unwrap();
        assert!(!iam.user_action_allowed(rid, "alice", "full").await.unwrap());
    }
}
