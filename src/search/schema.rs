//! Declared field schemas for each entity type
//!
//! A schema lists every field a type may carry, how the field is typed,
//! whether it feeds keyword matching, whether it is sensitive, and which
//! facet domain (if any) it aggregates into. The planner validates filters
//! against it, the normalizer builds documents from it and the facet
//! aggregator reads its domains.

use crate::search::document::EntityType;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// Derived numeric bucket field for prices
pub const PRICE_BUCKET_FIELD: &str = "price_bucket";

/// Lower bounds of the price buckets
pub const PRICE_BUCKET_BOUNDS: [f64; 6] = [0.0, 50.0, 100.0, 500.0, 1000.0, 5000.0];

/// Workflow states a tenant-owned record can be in
const STATUS_VALUES: [&str; 5] = ["draft", "pending", "approved", "rejected", "archived"];

/// Storage kind of a field
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FieldKind {
    Text,
    Keyword,
    Number,
    Boolean,
    Timestamp,
}

/// Domain of a facetable field
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FacetDomain {
    /// Enumerated values; anything else counts as `other`
    Values(Vec<String>),
    /// Every distinct value is its own bucket
    Open,
    /// Label derived from a numeric source field
    Buckets { source: String, bounds: Vec<f64> },
}

impl FacetDomain {
    /// Whether a raw facet value belongs to this domain
    pub fn admits(&self, value: &str) -> bool {
        match self {
            FacetDomain::Values(values) => values.iter().any(|v| v == value),
            FacetDomain::Open => true,
            FacetDomain::Buckets { bounds, .. } => {
                bounds.iter().enumerate().any(|(i, _)| bucket_label(bounds, i) == value)
            }
        }
    }
}

fn bucket_label(bounds: &[f64], index: usize) -> String {
    let lower = format_bound(bounds[index]);
    match bounds.get(index + 1) {
        Some(upper) => format!("{}-{}", lower, format_bound(*upper)),
        None => format!("{}+", lower),
    }
}

fn format_bound(bound: f64) -> String {
    if bound.fract() == 0.0 {
        format!("{}", bound as i64)
    } else {
        bound.to_string()
    }
}

/// Label of the bucket `value` falls into; lower bounds are inclusive
pub fn bucket_for(bounds: &[f64], value: f64) -> Option<String> {
    if !value.is_finite() {
        return None;
    }
    bounds
        .iter()
        .rposition(|lower| value >= *lower)
        .map(|index| bucket_label(bounds, index))
}

/// One declared field
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FieldSpec {
    pub name: String,
    pub kind: FieldKind,

    /// Contributes normalized tokens to the document keywords
    pub searchable: bool,

    /// Stripped for callers without sensitive read
    pub sensitive: bool,

    /// Facet domain when the field is facetable
    pub facet: Option<FacetDomain>,
}

impl FieldSpec {
    fn new(name: &str, kind: FieldKind) -> Self {
        Self {
            name: name.to_string(),
            kind,
            searchable: false,
            sensitive: false,
            facet: None,
        }
    }

    pub fn text(name: &str) -> Self {
        Self::new(name, FieldKind::Text)
    }

    pub fn keyword(name: &str) -> Self {
        Self::new(name, FieldKind::Keyword)
    }

    pub fn number(name: &str) -> Self {
        Self::new(name, FieldKind::Number)
    }

    pub fn boolean(name: &str) -> Self {
        Self::new(name, FieldKind::Boolean)
    }

    pub fn timestamp(name: &str) -> Self {
        Self::new(name, FieldKind::Timestamp)
    }

    pub fn searchable(mut self) -> Self {
        self.searchable = true;
        self
    }

    pub fn sensitive(mut self) -> Self {
        self.sensitive = true;
        self
    }

    pub fn facet(mut self, domain: FacetDomain) -> Self {
        self.facet = Some(domain);
        self
    }

    pub fn is_facet(&self) -> bool {
        self.facet.is_some()
    }
}

/// Schema of one entity type
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EntitySchema {
    pub entity_type: EntityType,

    /// Payload fields tried in order to produce the title
    pub title_fields: Vec<String>,

    pub fields: Vec<FieldSpec>,
}

impl EntitySchema {
    pub fn new(entity_type: EntityType, title_fields: &[&str]) -> Self {
        Self {
            entity_type,
            title_fields: title_fields.iter().map(|f| f.to_string()).collect(),
            fields: Vec::new(),
        }
    }

    pub fn with_field(mut self, field: FieldSpec) -> Self {
        self.fields.push(field);
        self
    }

    /// Add the visibility and approval fields every tenant-owned record carries
    fn with_listing_state(self) -> Self {
        let statuses: Vec<String> = STATUS_VALUES.iter().map(|s| s.to_string()).collect();
        self.with_field(FieldSpec::keyword("visibility"))
            .with_field(FieldSpec::keyword("status").facet(FacetDomain::Values(statuses)))
            .with_field(FieldSpec::keyword("company_status"))
    }

    fn with_pricing(self) -> Self {
        self.with_field(FieldSpec::number("price"))
            .with_field(FieldSpec::keyword(PRICE_BUCKET_FIELD).facet(FacetDomain::Buckets {
                source: "price".to_string(),
                bounds: PRICE_BUCKET_BOUNDS.to_vec(),
            }))
            .with_field(FieldSpec::keyword("currency").facet(FacetDomain::Open))
    }

    pub fn field(&self, name: &str) -> Option<&FieldSpec> {
        self.fields.iter().find(|f| f.name == name)
    }

    pub fn declares(&self, name: &str) -> bool {
        self.field(name).is_some()
    }

    pub fn is_sensitive(&self, name: &str) -> bool {
        self.field(name).map(|f| f.sensitive).unwrap_or(false)
    }

    pub fn facet_fields(&self) -> impl Iterator<Item = &FieldSpec> {
        self.fields.iter().filter(|f| f.is_facet())
    }
}

/// Schemas for every entity type
#[derive(Debug, Clone)]
pub struct SchemaRegistry {
    schemas: HashMap<EntityType, EntitySchema>,
}

impl SchemaRegistry {
    /// Registry with the marketplace catalog schemas
    pub fn standard() -> Self {
        let part = EntitySchema::new(EntityType::Part, &["name", "part_number"])
            .with_field(FieldSpec::text("name"))
            .with_field(FieldSpec::keyword("part_number").searchable())
            .with_field(FieldSpec::keyword("manufacturer_code").searchable())
            .with_field(FieldSpec::keyword("manufacturer").searchable().facet(FacetDomain::Open))
            .with_field(FieldSpec::keyword("manufacturer_id"))
            .with_field(FieldSpec::keyword("category").facet(FacetDomain::Open))
            .with_listing_state()
            .with_pricing()
            .with_field(FieldSpec::number("stock").sensitive())
            .with_field(FieldSpec::number("rating"))
            .with_field(FieldSpec::text("internal_notes").sensitive());

        let equipment = EntitySchema::new(EntityType::Equipment, &["model", "name"])
            .with_field(FieldSpec::text("name"))
            .with_field(FieldSpec::keyword("model").searchable())
            .with_field(FieldSpec::keyword("series").searchable())
            .with_field(FieldSpec::keyword("manufacturer").searchable().facet(FacetDomain::Open))
            .with_field(FieldSpec::keyword("manufacturer_id"))
            .with_field(FieldSpec::keyword("category").facet(FacetDomain::Open))
            .with_listing_state()
            .with_pricing()
            .with_field(FieldSpec::number("rating"))
            .with_field(FieldSpec::number("eta"))
            .with_field(FieldSpec::text("internal_notes").sensitive());

        let company = EntitySchema::new(EntityType::Company, &["name"])
            .with_field(FieldSpec::text("name"))
            .with_field(FieldSpec::keyword("subdomain").searchable())
            .with_listing_state()
            .with_field(FieldSpec::number("rating"))
            .with_field(FieldSpec::keyword("email").sensitive())
            .with_field(FieldSpec::keyword("phone").sensitive())
            .with_field(FieldSpec::text("internal_notes").sensitive());

        let listing = EntitySchema::new(EntityType::Listing, &["title", "name"])
            .with_field(FieldSpec::text("title"))
            .with_field(FieldSpec::text("name"))
            .with_field(FieldSpec::keyword("sku").searchable())
            .with_field(FieldSpec::keyword("brand").searchable().facet(FacetDomain::Open))
            .with_field(FieldSpec::keyword("category").facet(FacetDomain::Open))
            .with_field(FieldSpec::keyword("supplier_id"))
            .with_listing_state()
            .with_pricing()
            .with_field(FieldSpec::boolean("price_restricted"))
            .with_field(FieldSpec::number("stock").sensitive())
            .with_field(FieldSpec::number("rating"))
            .with_field(FieldSpec::number("eta"))
            .with_field(FieldSpec::text("internal_notes").sensitive());

        let service = EntitySchema::new(EntityType::Service, &["title", "name"])
            .with_field(FieldSpec::text("title"))
            .with_field(FieldSpec::text("name"))
            .with_field(FieldSpec::keyword("category").searchable().facet(FacetDomain::Open))
            .with_field(FieldSpec::keyword("supplier_id"))
            .with_listing_state()
            .with_pricing()
            .with_field(FieldSpec::boolean("price_restricted"))
            .with_field(FieldSpec::number("rating"))
            .with_field(FieldSpec::number("eta"))
            .with_field(FieldSpec::text("internal_notes").sensitive());

        Self::from_schemas(vec![part, equipment, company, listing, service])
    }

    pub fn from_schemas(schemas: Vec<EntitySchema>) -> Self {
        Self {
            schemas: schemas.into_iter().map(|s| (s.entity_type, s)).collect(),
        }
    }

    pub fn schema(&self, entity_type: EntityType) -> Option<&EntitySchema> {
        self.schemas.get(&entity_type)
    }

    /// Whether any of `types` declares the field
    pub fn declares_any(&self, types: &[EntityType], field: &str) -> bool {
        types
            .iter()
            .filter_map(|t| self.schema(*t))
            .any(|s| s.declares(field))
    }

    pub fn is_sensitive(&self, entity_type: EntityType, field: &str) -> bool {
        self.schema(entity_type)
            .map(|s| s.is_sensitive(field))
            .unwrap_or(false)
    }

    /// Facet fields declared by `types`, in first-declared order without duplicates
    pub fn facet_fields(&self, types: &[EntityType]) -> Vec<(String, FacetDomain)> {
        let mut facets: Vec<(String, FacetDomain)> = Vec::new();
        for schema in types.iter().filter_map(|t| self.schema(*t)) {
            for spec in schema.facet_fields() {
                if facets.iter().any(|(name, _)| name == &spec.name) {
                    continue;
                }
                if let Some(domain) = &spec.facet {
                    facets.push((spec.name.clone(), domain.clone()));
                }
            }
        }
        facets
    }
}

impl Default for SchemaRegistry {
    fn default() -> Self {
        Self::standard()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_price_buckets() {
        let bounds = PRICE_BUCKET_BOUNDS;
        assert_eq!(bucket_for(&bounds, 0.0).as_deref(), Some("0-50"));
        assert_eq!(bucket_for(&bounds, 49.99).as_deref(), Some("0-50"));
        assert_eq!(bucket_for(&bounds, 50.0).as_deref(), Some("50-100"));
        assert_eq!(bucket_for(&bounds, 750.0).as_deref(), Some("500-1000"));
        assert_eq!(bucket_for(&bounds, 12_000.0).as_deref(), Some("5000+"));
        assert_eq!(bucket_for(&bounds, -1.0), None);
    }

    #[test]
    fn test_domains() {
        let buckets = FacetDomain::Buckets {
            source: "price".to_string(),
            bounds: PRICE_BUCKET_BOUNDS.to_vec(),
        };
        assert!(buckets.admits("100-500"));
        assert!(!buckets.admits("cheap"));

        let values = FacetDomain::Values(vec!["approved".to_string()]);
        assert!(values.admits("approved"));
        assert!(!values.admits("banana"));
        assert!(FacetDomain::Open.admits("anything"));
    }

    #[test]
    fn test_standard_schemas() {
        let registry = SchemaRegistry::standard();
        let part = registry.schema(EntityType::Part).unwrap();
        assert_eq!(part.title_fields, vec!["name", "part_number"]);
        assert!(part.is_sensitive("stock"));
        assert!(!part.is_sensitive("category"));
        assert!(registry.is_sensitive(EntityType::Company, "email"));
        assert!(!registry.declares_any(&[EntityType::Company], "sku"));
        assert!(registry.declares_any(&EntityType::all(), "sku"));
    }

    #[test]
    fn test_facet_fields_are_deduplicated() {
        let registry = SchemaRegistry::standard();
        let facets = registry.facet_fields(&[EntityType::Part, EntityType::Listing]);
        let names: Vec<&str> = facets.iter().map(|(n, _)| n.as_str()).collect();
        assert_eq!(names.iter().filter(|n| **n == "category").count(), 1);
        assert!(names.contains(&"brand"));
        assert!(names.contains(&PRICE_BUCKET_FIELD));
    }
}
