//! Canonical document model every entity type is normalized into

use crate::search::error::{SearchError, SearchResult};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};
use std::fmt;
use std::str::FromStr;

/// Field holding the restricted-pricing flag on listings and services
pub const PRICE_RESTRICTED_FIELD: &str = "price_restricted";

/// Numeric price field
pub const PRICE_FIELD: &str = "price";

/// Placeholder field added when a restricted price is hidden
pub const PRICE_DISPLAY_FIELD: &str = "price_display";

/// Entity types the engine indexes
#[derive(
    Debug,
    Clone,
    Copy,
    PartialEq,
    Eq,
    Hash,
    PartialOrd,
    Ord,
    Serialize,
    Deserialize,
    strum::Display,
    strum::EnumString,
    strum::EnumIter,
    strum::AsRefStr,
)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case", ascii_case_insensitive)]
pub enum EntityType {
    Part,
    Equipment,
    Company,
    Listing,
    Service,
}

impl EntityType {
    /// All entity types in declaration order
    pub fn all() -> Vec<EntityType> {
        use strum::IntoEnumIterator;
        EntityType::iter().collect()
    }

    /// Parse a type filter: empty or `all` expands to every type
    pub fn parse_filter(raw: Option<&str>) -> SearchResult<Vec<EntityType>> {
        match raw.map(str::trim) {
            None | Some("") => Ok(Self::all()),
            Some(value) if value.eq_ignore_ascii_case("all") => Ok(Self::all()),
            Some(value) => EntityType::from_str(value)
                .map(|t| vec![t])
                .map_err(|_| SearchError::UnknownEntityType(value.to_string())),
        }
    }

    /// Permission resource guarding this type's sensitive fields
    pub fn resource(&self) -> &'static str {
        match self {
            EntityType::Part => "catalog",
            EntityType::Equipment => "equipment",
            EntityType::Company => "company",
            EntityType::Listing | EntityType::Service => "marketplace",
        }
    }
}

/// Whether a tenant-owned document is listed publicly
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Visibility {
    /// Published and approved; readable by every caller
    Public,
    /// Readable by the owning tenant and global readers only
    #[default]
    Private,
}

/// Typed field value
///
/// Untagged JSON strings always decode as `Text`; timestamps are only
/// produced by schema-aware normalization.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum FieldValue {
    Null,
    Bool(bool),
    Number(f64),
    Text(String),
    Timestamp(DateTime<Utc>),
}

impl FieldValue {
    pub fn as_f64(&self) -> Option<f64> {
        match self {
            FieldValue::Number(n) => Some(*n),
            _ => None,
        }
    }

    pub fn as_bool(&self) -> Option<bool> {
        match self {
            FieldValue::Bool(b) => Some(*b),
            _ => None,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            FieldValue::Text(s) => Some(s),
            _ => None,
        }
    }

    pub fn is_null(&self) -> bool {
        matches!(self, FieldValue::Null)
    }

    /// Discrete string form used for facet buckets
    pub fn facet_value(&self) -> Option<String> {
        match self {
            FieldValue::Null => None,
            FieldValue::Bool(b) => Some(b.to_string()),
            FieldValue::Number(n) => Some(format_number(*n)),
            FieldValue::Timestamp(ts) => Some(ts.to_rfc3339()),
            FieldValue::Text(s) if s.is_empty() => None,
            FieldValue::Text(s) => Some(s.clone()),
        }
    }

    /// Equality against a raw filter value, interpreted by this value's type
    pub fn matches_filter(&self, raw: &str) -> bool {
        let raw = raw.trim();
        match self {
            FieldValue::Null => false,
            FieldValue::Text(s) => s.eq_ignore_ascii_case(raw),
            FieldValue::Bool(b) => raw.parse::<bool>().map(|v| v == *b).unwrap_or(false),
            FieldValue::Number(n) => raw
                .parse::<f64>()
                .map(|v| (v - n).abs() < f64::EPSILON)
                .unwrap_or(false),
            FieldValue::Timestamp(ts) => DateTime::parse_from_rfc3339(raw)
                .map(|v| v.with_timezone(&Utc) == *ts)
                .unwrap_or(false),
        }
    }
}

fn format_number(n: f64) -> String {
    if n.fract() == 0.0 && n.abs() < 1e15 {
        format!("{}", n as i64)
    } else {
        n.to_string()
    }
}

impl From<&str> for FieldValue {
    fn from(value: &str) -> Self {
        FieldValue::Text(value.to_string())
    }
}

impl From<String> for FieldValue {
    fn from(value: String) -> Self {
        FieldValue::Text(value)
    }
}

impl From<f64> for FieldValue {
    fn from(value: f64) -> Self {
        FieldValue::Number(value)
    }
}

impl From<bool> for FieldValue {
    fn from(value: bool) -> Self {
        FieldValue::Bool(value)
    }
}

impl From<DateTime<Utc>> for FieldValue {
    fn from(value: DateTime<Utc>) -> Self {
        FieldValue::Timestamp(value)
    }
}

/// Unique identity of a document: `(tenant_id, type, id)`
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct DocumentKey {
    pub tenant_id: Option<String>,
    pub entity_type: EntityType,
    pub id: String,
}

impl DocumentKey {
    pub fn new(tenant_id: Option<&str>, entity_type: EntityType, id: impl Into<String>) -> Self {
        Self {
            tenant_id: normalize_tenant(tenant_id.map(str::to_string)),
            entity_type,
            id: id.into(),
        }
    }
}

impl fmt::Display for DocumentKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}/{}/{}",
            self.tenant_id.as_deref().unwrap_or("-"),
            self.entity_type,
            self.id
        )
    }
}

/// Empty tenant ids mean "global"
pub(crate) fn normalize_tenant(tenant_id: Option<String>) -> Option<String> {
    tenant_id.filter(|t| !t.trim().is_empty())
}

/// Unit of indexing
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Document {
    /// Entity type discriminator
    #[serde(rename = "type")]
    pub entity_type: EntityType,

    /// Identifier, unique within `(tenant_id, type)`
    pub id: String,

    /// Owning tenant; `None` for globally visible documents
    pub tenant_id: Option<String>,

    /// Primary text, weighted highest
    pub title: String,

    /// Secondary text
    pub description: String,

    /// Typed attributes; a superset across entity types
    pub fields: BTreeMap<String, FieldValue>,

    /// Names of facetable fields
    pub facet_fields: BTreeSet<String>,

    /// Names of restricted fields
    pub sensitive_fields: BTreeSet<String>,

    /// Normalized tokens used for matching and autocomplete
    pub keywords: BTreeSet<String>,

    /// Public listing flag for tenant-owned documents
    #[serde(default)]
    pub visibility: Visibility,

    /// Logical version; last writer wins
    pub updated_at: DateTime<Utc>,
}

impl Document {
    /// Create a document with empty fields
    pub fn new(entity_type: EntityType, id: impl Into<String>, title: impl Into<String>) -> Self {
        Self {
            entity_type,
            id: id.into(),
            tenant_id: None,
            title: title.into(),
            description: String::new(),
            fields: BTreeMap::new(),
            facet_fields: BTreeSet::new(),
            sensitive_fields: BTreeSet::new(),
            keywords: BTreeSet::new(),
            visibility: Visibility::default(),
            updated_at: Utc::now(),
        }
    }

    pub fn with_tenant(mut self, tenant_id: impl Into<String>) -> Self {
        self.tenant_id = normalize_tenant(Some(tenant_id.into()));
        self
    }

    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = description.into();
        self
    }

    pub fn with_field(mut self, name: impl Into<String>, value: impl Into<FieldValue>) -> Self {
        self.fields.insert(name.into(), value.into());
        self
    }

    /// Add a field and mark it facetable
    pub fn with_facet(mut self, name: impl Into<String>, value: impl Into<FieldValue>) -> Self {
        let name = name.into();
        self.facet_fields.insert(name.clone());
        self.fields.insert(name, value.into());
        self
    }

    /// Add a field and mark it sensitive
    pub fn with_sensitive(mut self, name: impl Into<String>, value: impl Into<FieldValue>) -> Self {
        let name = name.into();
        self.sensitive_fields.insert(name.clone());
        self.fields.insert(name, value.into());
        self
    }

    pub fn with_keyword(mut self, keyword: impl Into<String>) -> Self {
        self.keywords.insert(keyword.into());
        self
    }

    pub fn with_visibility(mut self, visibility: Visibility) -> Self {
        self.visibility = visibility;
        self
    }

    pub fn with_updated_at(mut self, updated_at: DateTime<Utc>) -> Self {
        self.updated_at = updated_at;
        self
    }

    pub fn key(&self) -> DocumentKey {
        DocumentKey {
            tenant_id: self.tenant_id.clone(),
            entity_type: self.entity_type,
            id: self.id.clone(),
        }
    }

    pub fn field(&self, name: &str) -> Option<&FieldValue> {
        self.fields.get(name)
    }

    pub fn is_global(&self) -> bool {
        self.tenant_id.is_none()
    }

    /// Whether the numeric price must be hidden from callers without sensitive read
    pub fn price_restricted(&self) -> bool {
        self.field(PRICE_RESTRICTED_FIELD)
            .and_then(FieldValue::as_bool)
            .unwrap_or(false)
    }

    /// Check the structural invariants required before indexing
    pub fn validate(&self) -> SearchResult<()> {
        if self.id.trim().is_empty() {
            return Err(SearchError::InvalidDocument(format!(
                "{} document has an empty id",
                self.entity_type
            )));
        }
        if let Some(name) = self.facet_fields.iter().find(|f| !self.fields.contains_key(*f)) {
            return Err(SearchError::InvalidDocument(format!(
                "facet field '{}' of {} is not present in fields",
                name,
                self.key()
            )));
        }
        if let Some(name) = self
            .sensitive_fields
            .iter()
            .find(|f| !self.fields.contains_key(*f))
        {
            return Err(SearchError::InvalidDocument(format!(
                "sensitive field '{}' of {} is not present in fields",
                name,
                self.key()
            )));
        }
        Ok(())
    }
}
