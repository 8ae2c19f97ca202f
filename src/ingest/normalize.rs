//! Payload → document normalization

use crate::ingest::event::ChangeEvent;
use crate::search::schema::{bucket_for, FacetDomain, FieldKind, FieldSpec, SchemaRegistry, PRICE_BUCKET_FIELD};
use crate::search::tokenizer::Tokenizer;
use crate::search::{Document, FieldValue, SearchError, SearchResult, Visibility};
use chrono::{DateTime, Utc};
use serde_json::{Map, Value};
use std::sync::Arc;

const UNTITLED: &str = "Untitled";
const APPROVED: &str = "approved";

/// Builds indexable documents from change-event payloads
#[derive(Debug, Clone)]
pub struct DocumentNormalizer {
    schemas: Arc<SchemaRegistry>,
    tokenizer: Tokenizer,
}

impl DocumentNormalizer {
    pub fn new(schemas: Arc<SchemaRegistry>, tokenizer: Tokenizer) -> Self {
        Self { schemas, tokenizer }
    }

    /// Normalize an upsert event into a document
    pub fn normalize(&self, event: &ChangeEvent) -> SearchResult<Document> {
        if event.id.trim().is_empty() {
            return Err(SearchError::InvalidDocument(format!(
                "{} event {} has an empty id",
                event.entity_type, event.event_id
            )));
        }
        let schema = self.schemas.schema(event.entity_type).ok_or_else(|| {
            SearchError::InvalidDocument(format!("no schema declared for {}", event.entity_type))
        })?;
        let payload = &event.payload;

        let title = schema
            .title_fields
            .iter()
            .filter_map(|f| payload.get(f).and_then(Value::as_str))
            .map(str::trim)
            .find(|t| !t.is_empty())
            .unwrap_or(UNTITLED);
        let description = payload
            .get("description")
            .and_then(Value::as_str)
            .unwrap_or_default();

        let key = event.key();
        let mut doc = Document::new(key.entity_type, key.id, title)
            .with_description(description)
            .with_updated_at(event.updated_at);
        if let Some(tenant) = &event.tenant_id {
            doc = doc.with_tenant(tenant.clone());
        }

        for spec in &schema.fields {
            if matches!(spec.facet, Some(FacetDomain::Buckets { .. })) {
                continue;
            }
            let Some(raw) = payload.get(&spec.name) else {
                continue;
            };
            let value = convert(spec, raw).map_err(|reason| {
                SearchError::InvalidDocument(format!("{}: {}", doc.key(), reason))
            })?;

            if spec.searchable {
                if let Some(text) = value.as_str() {
                    doc.keywords.extend(self.tokenizer.tokenize(text));
                }
            }
            if spec.sensitive {
                doc.sensitive_fields.insert(spec.name.clone());
            }
            if spec.is_facet() {
                doc.facet_fields.insert(spec.name.clone());
            }
            doc.fields.insert(spec.name.clone(), value);
        }

        for spec in &schema.fields {
            if let Some(FacetDomain::Buckets { source, bounds }) = &spec.facet {
                let bucket = doc
                    .field(source)
                    .and_then(FieldValue::as_f64)
                    .and_then(|v| bucket_for(bounds, v));
                if let Some(label) = bucket {
                    doc = doc.with_facet(spec.name.clone(), label);
                }
            }
        }

        if doc.price_restricted() && doc.fields.contains_key(PRICE_BUCKET_FIELD) {
            doc.sensitive_fields.insert(PRICE_BUCKET_FIELD.to_string());
        }
        doc.visibility = listing_visibility(payload);
        Ok(doc)
    }
}

/// Public only when published and every present approval state is `approved`
fn listing_visibility(payload: &Map<String, Value>) -> Visibility {
    let text = |key: &str| payload.get(key).and_then(Value::as_str).map(str::trim);
    let approved = |key: &str| text(key).map_or(true, |v| v.eq_ignore_ascii_case(APPROVED));

    let published = text("visibility").is_some_and(|v| v.eq_ignore_ascii_case("public"));
    if published && approved("status") && approved("company_status") {
        Visibility::Public
    } else {
        Visibility::Private
    }
}

fn convert(spec: &FieldSpec, raw: &Value) -> Result<FieldValue, String> {
    if raw.is_null() {
        return Ok(FieldValue::Null);
    }
    let invalid = || format!("field '{}' is not a valid {:?}", spec.name, spec.kind);

    match spec.kind {
        FieldKind::Text | FieldKind::Keyword => match raw {
            Value::String(s) => Ok(FieldValue::Text(s.trim().to_string())),
            Value::Number(n) => Ok(FieldValue::Text(n.to_string())),
            Value::Bool(b) => Ok(FieldValue::Text(b.to_string())),
            _ => Err(invalid()),
        },
        FieldKind::Number => match raw {
            Value::Number(n) => n.as_f64().map(FieldValue::Number).ok_or_else(invalid),
            Value::String(s) => s.trim().parse::<f64>().map(FieldValue::Number).map_err(|_| invalid()),
            _ => Err(invalid()),
        },
        FieldKind::Boolean => match raw {
            Value::Bool(b) => Ok(FieldValue::Bool(*b)),
            Value::String(s) => s.trim().parse::<bool>().map(FieldValue::Bool).map_err(|_| invalid()),
            _ => Err(invalid()),
        },
        FieldKind::Timestamp => match raw {
            Value::String(s) => DateTime::parse_from_rfc3339(s.trim())
                .map(|ts| FieldValue::Timestamp(ts.with_timezone(&Utc)))
                .map_err(|_| invalid()),
            _ => Err(invalid()),
        },
    }
}
