//! Static user directory backed by configuration

use approval_types::UserId;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeSet, HashMap};

use crate::error::Result;
use crate::workflow::traits::RoleDirectory;

/// A known user: display name plus the roles they hold
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UserProfile {
    pub name: String,
    pub roles: BTreeSet<String>,
}

impl UserProfile {
    pub fn new<I, S>(name: &str, roles: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            name: name.to_string(),
            roles: roles.into_iter().map(Into::into).collect(),
        }
    }
}

/// Role lookup over a fixed set of users
#[derive(Debug, Clone, Default)]
pub struct StaticRoleDirectory {
    users: HashMap<UserId, UserProfile>,
}

impl StaticRoleDirectory {
    pub fn new(users: HashMap<UserId, UserProfile>) -> Self {
        Self { users }
    }

    pub fn with_user(mut self, user_id: &str, profile: UserProfile) -> Self {
        self.users.insert(UserId::new(user_id), profile);
        self
    }

    pub fn profile(&self, user_id: &UserId) -> Option<&UserProfile> {
        self.users.get(user_id)
    }

    /// Configured display name, falling back to the raw id
    pub fn display_name(&self, user_id: &UserId) -> String {
        self.profile(user_id)
            .map(|p| p.name.clone())
            .unwrap_or_else(|| user_id.to_string())
    }
}

#[async_trait]
impl RoleDirectory for StaticRoleDirectory {
    async fn user_roles(&self, user_id: &UserId) -> Result<BTreeSet<String>> {
        Ok(self
            .users
            .get(user_id)
            .map(|p| p.roles.clone())
            .unwrap_or_default())
    }
}
