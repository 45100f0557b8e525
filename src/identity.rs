//! Identity resolution: privacy-safe user and group identifiers.
//!
//! With the override switch on, every user in an instance reports as the
//! instance itself. That trades per-user resolution for a lower count of
//! billed unique users.

use crate::config::Config;
use crate::model::{Context, GroupId, UserId};

#[derive(Debug, Clone, Copy, Default)]
pub struct IdentityResolver {
    collapse_users: bool,
}

impl IdentityResolver {
    pub fn new(collapse_users: bool) -> Self {
        Self { collapse_users }
    }

    pub fn from_config(config: &Config) -> Self {
        Self::new(config.user_id_override)
    }

    /// The individual account id, or the group id when collapsed.
    pub fn resolve_user_id(&self, context: &Context) -> UserId {
        if self.collapse_users {
            UserId(self.resolve_group_id(context).0)
        } else {
            UserId(context.account_id.clone())
        }
    }

    pub fn resolve_group_id(&self, context: &Context) -> GroupId {
        GroupId(context.cloud_id.clone())
    }
}
