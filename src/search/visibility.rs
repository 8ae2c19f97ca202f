//! Caller-driven visibility: tenant scope, sensitive-field redaction and the
//! guest page cap
//!
//! Tenant isolation is enforced twice. The index store only scans partitions
//! the caller's [`TenantScope`] admits, and the [`VisibilityFilter`] re-checks
//! every document before it leaves the engine. A document that fails the
//! second check is dropped and logged as an invariant violation.

use crate::search::document::{
    Document, EntityType, FieldValue, PRICE_DISPLAY_FIELD, PRICE_FIELD,
};
use crate::search::index::PartitionScope;
use crate::search::metrics::SEARCH_METRICS;
use crate::search::policy::AccessPolicy;
use crate::search::ranking::ScoredDocument;
use crate::search::schema::PRICE_BUCKET_FIELD;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashSet};
use tracing::error;

/// Fields hidden together when a restricted price is redacted
const RESTRICTED_PRICE_FIELDS: [&str; 2] = [PRICE_FIELD, PRICE_BUCKET_FIELD];

/// Identity of the caller making a request
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CallerContext {
    pub user_id: Option<String>,
    pub tenant_id: Option<String>,
    #[serde(default)]
    pub roles: Vec<String>,
}

impl CallerContext {
    pub fn guest() -> Self {
        Self::default()
    }

    pub fn authenticated(
        user_id: impl Into<String>,
        tenant_id: impl Into<String>,
        roles: &[&str],
    ) -> Self {
        Self {
            user_id: Some(user_id.into()),
            tenant_id: Some(tenant_id.into()),
            roles: roles.iter().map(|r| r.to_string()).collect(),
        }
    }

    /// A caller without a user id is a guest, whatever else it carries
    pub fn is_guest(&self) -> bool {
        self.user_id
            .as_deref()
            .map(|u| u.trim().is_empty())
            .unwrap_or(true)
    }

    pub fn state(&self) -> CallerState {
        if self.is_guest() {
            CallerState::Guest
        } else {
            CallerState::Authenticated
        }
    }
}

/// Resolved caller state
#[derive(Debug, Clone, Copy, PartialEq, Eq, strum::Display, strum::AsRefStr)]
#[strum(serialize_all = "snake_case")]
pub enum CallerState {
    Guest,
    Authenticated,
}

/// Which tenant partitions a caller may read
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum TenantScope {
    /// Every partition of every tenant
    Unrestricted,
    /// Global and public partitions, plus the tenant's own when present
    Restricted { tenant_id: Option<String> },
}

impl TenantScope {
    pub fn admits_partition(&self, scope: &PartitionScope) -> bool {
        match (self, scope) {
            (TenantScope::Unrestricted, _) => true,
            (_, PartitionScope::Global) | (_, PartitionScope::Public) => true,
            (TenantScope::Restricted { tenant_id }, PartitionScope::Tenant(owner)) => {
                tenant_id.as_deref() == Some(owner.as_str())
            }
        }
    }

    pub fn admits(&self, doc: &Document) -> bool {
        self.admits_partition(&PartitionScope::for_document(doc))
    }

    /// Stable string used in cache keys
    pub fn cache_key(&self) -> String {
        match self {
            TenantScope::Unrestricted => "*".to_string(),
            TenantScope::Restricted { tenant_id: None } => "public".to_string(),
            TenantScope::Restricted {
                tenant_id: Some(tenant),
            } => format!("tenant:{}", tenant),
        }
    }
}

/// Caller permissions resolved against the access policy for one request
#[derive(Debug, Clone)]
pub struct AccessView {
    caller: CallerContext,
    scope: TenantScope,
    sensitive_types: HashSet<EntityType>,
}

impl AccessView {
    pub fn resolve(caller: &CallerContext, policy: &AccessPolicy) -> Self {
        if caller.is_guest() {
            return Self {
                caller: caller.clone(),
                scope: TenantScope::Restricted { tenant_id: None },
                sensitive_types: HashSet::new(),
            };
        }

        let scope = if policy.has_global_read(&caller.roles) {
            TenantScope::Unrestricted
        } else {
            TenantScope::Restricted {
                tenant_id: caller.tenant_id.clone().filter(|t| !t.trim().is_empty()),
            }
        };
        let sensitive_types = EntityType::all()
            .into_iter()
            .filter(|t| policy.can_read_sensitive(&caller.roles, *t))
            .collect();

        Self {
            caller: caller.clone(),
            scope,
            sensitive_types,
        }
    }

    pub fn caller(&self) -> &CallerContext {
        &self.caller
    }

    pub fn scope(&self) -> &TenantScope {
        &self.scope
    }

    pub fn is_guest(&self) -> bool {
        self.caller.is_guest()
    }

    /// Whether the caller may read sensitive fields of some document of this type
    pub fn can_read_sensitive_type(&self, entity_type: EntityType) -> bool {
        !self.is_guest() && self.sensitive_types.contains(&entity_type)
    }

    /// Tenant match plus the type's sensitive-read permission
    pub fn can_read_sensitive(&self, doc: &Document) -> bool {
        let tenant = self
            .caller
            .tenant_id
            .as_deref()
            .filter(|t| !t.trim().is_empty());
        self.can_read_sensitive_type(doc.entity_type) && tenant == doc.tenant_id.as_deref()
    }

    /// Whether the field is hidden from this caller on this document
    pub fn is_hidden(&self, doc: &Document, field: &str) -> bool {
        let restricted = doc.sensitive_fields.contains(field)
            || (doc.price_restricted() && RESTRICTED_PRICE_FIELDS.contains(&field));
        restricted && !self.can_read_sensitive(doc)
    }

    /// Field value as this caller is allowed to see it
    pub fn visible_value<'a>(&self, doc: &'a Document, field: &str) -> Option<&'a FieldValue> {
        if self.is_hidden(doc, field) {
            None
        } else {
            doc.field(field)
        }
    }
}

/// A result as returned to the caller
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SearchHit {
    #[serde(rename = "type")]
    pub entity_type: EntityType,
    pub id: String,
    pub tenant_id: Option<String>,
    pub title: String,
    pub description: String,
    pub fields: BTreeMap<String, FieldValue>,
    pub score: f64,
}

/// Applies scope checks, redaction and the guest page cap
#[derive(Debug, Clone)]
pub struct VisibilityFilter {
    guest_page_cap: usize,
    price_placeholder: String,
}

impl VisibilityFilter {
    pub fn new(guest_page_cap: usize, price_placeholder: impl Into<String>) -> Self {
        Self {
            guest_page_cap,
            price_placeholder: price_placeholder.into(),
        }
    }

    /// Guests get `min(requested, cap)`; authenticated callers keep the request
    pub fn effective_page_size(&self, view: &AccessView, requested: usize) -> usize {
        if view.is_guest() {
            requested.min(self.guest_page_cap)
        } else {
            requested
        }
    }

    /// Redact a page of ranked documents for the caller
    pub fn apply(&self, view: &AccessView, page: &[ScoredDocument]) -> Vec<SearchHit> {
        page.iter()
            .filter(|scored| self.in_scope(view, &scored.document))
            .map(|scored| SearchHit {
                entity_type: scored.document.entity_type,
                id: scored.document.id.clone(),
                tenant_id: scored.document.tenant_id.clone(),
                title: scored.document.title.clone(),
                description: scored.document.description.clone(),
                fields: self.redact(view, &scored.document),
                score: scored.score,
            })
            .collect()
    }

    fn in_scope(&self, view: &AccessView, doc: &Document) -> bool {
        if view.scope().admits(doc) {
            return true;
        }
        SEARCH_METRICS
            .visibility_violations
            .with_label_values(&[doc.entity_type.as_ref()])
            .inc();
        error!(
            entity_type = %doc.entity_type,
            document_id = %doc.id,
            document_tenant = ?doc.tenant_id,
            caller_tenant = ?view.caller().tenant_id,
            "Visibility invariant violation: out-of-scope document dropped"
        );
        false
    }

    /// Visible field map for one document
    pub fn redact(&self, view: &AccessView, doc: &Document) -> BTreeMap<String, FieldValue> {
        if view.can_read_sensitive(doc) {
            return doc.fields.clone();
        }

        let mut fields: BTreeMap<String, FieldValue> = doc
            .fields
            .iter()
            .filter(|(name, _)| !doc.sensitive_fields.contains(*name))
            .map(|(name, value)| (name.clone(), value.clone()))
            .collect();

        if doc.price_restricted() {
            fields.remove(PRICE_BUCKET_FIELD);
            let has_price = doc
                .field(PRICE_FIELD)
                .map(|v| !v.is_null())
                .unwrap_or(false);
            if has_price {
                fields.insert(PRICE_FIELD.to_string(), FieldValue::Null);
                fields.insert(
                    PRICE_DISPLAY_FIELD.to_string(),
                    FieldValue::Text(self.price_placeholder.clone()),
                );
            }
        }
        fields
    }
}
