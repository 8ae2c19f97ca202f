//! Role-based access policy
//!
//! The policy is loaded once at startup and shared read-only. It answers two
//! questions for a caller's role set: may the caller read every tenant's
//! partitions, and does any role grant `<resource>:<action>`.

use crate::search::document::EntityType;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Action required to see sensitive fields
pub const READ_SENSITIVE: &str = "read_sensitive";

const WILDCARD: &str = "*";

/// A `resource:action` grant; either side may be `*`
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Permission {
    pub resource: String,
    pub action: String,
}

impl Permission {
    pub fn new(resource: impl Into<String>, action: impl Into<String>) -> Self {
        Self {
            resource: resource.into(),
            action: action.into(),
        }
    }

    /// Parse `resource:action`; returns `None` for malformed grants
    pub fn parse(raw: &str) -> Option<Self> {
        let (resource, action) = raw.trim().split_once(':')?;
        if resource.is_empty() || action.is_empty() {
            return None;
        }
        Some(Self::new(resource.to_lowercase(), action.to_lowercase()))
    }

    pub fn allows(&self, resource: &str, action: &str) -> bool {
        (self.resource == WILDCARD || self.resource == resource)
            && (self.action == WILDCARD || self.action == action)
    }
}

/// What a single role grants
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RoleGrant {
    /// Read access to every tenant's partitions
    pub global_read: bool,

    /// Grants in `resource:action` form
    pub permissions: Vec<String>,
}

impl RoleGrant {
    fn allows(&self, resource: &str, action: &str) -> bool {
        self.permissions
            .iter()
            .filter_map(|raw| Permission::parse(raw))
            .any(|p| p.allows(resource, action))
    }
}

/// Immutable role → grant table
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AccessPolicy {
    pub roles: BTreeMap<String, RoleGrant>,
}

impl AccessPolicy {
    pub fn empty() -> Self {
        Self {
            roles: BTreeMap::new(),
        }
    }

    pub fn with_role(mut self, role: impl Into<String>, grant: RoleGrant) -> Self {
        self.roles.insert(role.into().to_lowercase(), grant);
        self
    }

    fn grants<'a>(&'a self, roles: &'a [String]) -> impl Iterator<Item = &'a RoleGrant> + 'a {
        roles
            .iter()
            .filter_map(move |role| self.roles.get(&role.trim().to_lowercase()))
    }

    /// Whether any role may read across all tenants
    pub fn has_global_read(&self, roles: &[String]) -> bool {
        self.grants(roles).any(|g| g.global_read)
    }

    /// Whether any role grants `resource:action`
    pub fn permits(&self, roles: &[String], resource: &str, action: &str) -> bool {
        self.grants(roles).any(|g| g.allows(resource, action))
    }

    /// Whether any role grants sensitive read on the type's resource
    pub fn can_read_sensitive(&self, roles: &[String], entity_type: EntityType) -> bool {
        self.permits(roles, entity_type.resource(), READ_SENSITIVE)
    }
}

impl Default for AccessPolicy {
    fn default() -> Self {
        let sensitive = |resource: &str| RoleGrant {
            global_read: false,
            permissions: vec![format!("{}:{}", resource, READ_SENSITIVE)],
        };
        let superuser = RoleGrant {
            global_read: true,
            permissions: vec!["*:*".to_string()],
        };

        AccessPolicy::empty()
            .with_role("super_admin", superuser.clone())
            .with_role("admin", superuser)
            .with_role("catalog_admin", sensitive("catalog"))
            .with_role("equipment_manager", sensitive("equipment"))
            .with_role("company_admin", sensitive("company"))
            .with_role("supplier", sensitive("marketplace"))
            .with_role("procurement_manager", sensitive("marketplace"))
            .with_role("buyer", RoleGrant::default())
    }
}
