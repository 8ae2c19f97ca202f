//! End-to-end tests for the search coordinator

use chrono::{DateTime, TimeZone, Utc};
use unified_search::search::*;

/// Helper to create a coordinator with the default policy
fn create_test_coordinator() -> SearchCoordinator {
    SearchCoordinator::new(SearchConfig::default(), AccessPolicy::default())
}

fn at(secs: i64) -> DateTime<Utc> {
    Utc.timestamp_opt(1_700_000_000 + secs, 0).unwrap()
}

/// Helper to create a public part owned by `tenant`
fn create_test_part(tenant: &str, id: &str, title: &str, category: &str) -> Document {
    Document::new(EntityType::Part, id, title)
        .with_tenant(tenant)
        .with_facet("category", category)
        .with_sensitive("stock", 12.0)
        .with_sensitive("internal_notes", "reorder from Acme")
        .with_visibility(Visibility::Public)
        .with_updated_at(at(0))
}

fn create_test_listing(id: &str, title: &str, price: FieldValue) -> Document {
    Document::new(EntityType::Listing, id, title)
        .with_tenant("T1")
        .with_field(PRICE_FIELD, price)
        .with_visibility(Visibility::Public)
        .with_updated_at(at(0))
}

fn tenant_user(tenant: &str) -> CallerContext {
    CallerContext::authenticated("u-1", tenant, &["catalog_admin"])
}

fn ids(response: &SearchResponse) -> Vec<&str> {
    response.results.iter().map(|hit| hit.id.as_str()).collect()
}

fn index_brake_pads(coordinator: &SearchCoordinator) {
    for (id, title) in [("p-a", "Brake Pad A"), ("p-b", "Brake Pad B"), ("p-c", "Brake Pad C")] {
        coordinator
            .index_document(create_test_part("T1", id, title, "brakes"))
            .unwrap();
    }
}

#[tokio::test]
async fn test_tenant_search_pages_in_rank_order() {
    let coordinator = create_test_coordinator();
    index_brake_pads(&coordinator);

    let request = SearchRequest::new("brake").with_page_size(2);
    let response = coordinator.search(request, tenant_user("T1")).await.unwrap();

    assert_eq!(response.total, 3);
    assert_eq!(response.page, 1);
    assert_eq!(response.page_size, 2);
    assert_eq!(ids(&response), vec!["p-a", "p-b"]);
    assert!(response.results[0].fields.contains_key("stock"));
}

#[tokio::test]
async fn test_guest_gets_same_page_without_sensitive_fields() {
    let coordinator = create_test_coordinator();
    index_brake_pads(&coordinator);

    let request = SearchRequest::new("brake").with_page_size(2);
    let response = coordinator.search(request, CallerContext::guest()).await.unwrap();

    assert_eq!(response.total, 3);
    assert_eq!(response.results.len(), 2);
    for hit in &response.results {
        assert!(!hit.fields.contains_key("stock"));
        assert!(!hit.fields.contains_key("internal_notes"));
        assert!(hit.fields.contains_key("category"));
    }
}

#[tokio::test]
async fn test_guest_page_size_is_capped() {
    let coordinator = create_test_coordinator();
    for i in 0..15 {
        coordinator
            .index_document(create_test_part("T1", &format!("p-{:02}", i), "Brake Pad", "brakes"))
            .unwrap();
    }

    let guest = coordinator
        .search(SearchRequest::new("brake").with_page_size(50), CallerContext::guest())
        .await
        .unwrap();
    assert_eq!(guest.page_size, 10);
    assert_eq!(guest.results.len(), 10);
    assert_eq!(guest.total, 15);

    let member = coordinator
        .search(SearchRequest::new("brake").with_page_size(50), tenant_user("T1"))
        .await
        .unwrap();
    assert_eq!(member.page_size, 50);
    assert_eq!(member.results.len(), 15);
}

#[tokio::test]
async fn test_facets_cover_every_match_not_just_the_page() {
    let coordinator = create_test_coordinator();
    let categories = ["brakes", "brakes", "brakes", "filters", "filters"];
    for (i, category) in categories.iter().enumerate() {
        coordinator
            .index_document(create_test_part("T1", &format!("p-{}", i), "Brake Pad", category))
            .unwrap();
    }

    let request = SearchRequest::new("pad").with_page(3).with_page_size(2);
    let response = coordinator.search(request, tenant_user("T1")).await.unwrap();

    assert_eq!(response.results.len(), 1);
    assert_eq!(response.total, 5);

    let category = response.facets.iter().find(|f| f.field == "category").unwrap();
    assert_eq!(category.count("brakes"), 3);
    assert_eq!(category.count("filters"), 2);
    assert_eq!(category.buckets[0].value, "brakes");

    for facet in &response.facets {
        assert_eq!(facet.total(), response.total, "facet {} does not sum", facet.field);
    }
    let types = response.facets.iter().find(|f| f.field == TYPE_FACET).unwrap();
    assert_eq!(types.count("part"), 5);
}

#[tokio::test]
async fn test_price_sort_puts_missing_prices_last() {
    let coordinator = create_test_coordinator();
    coordinator
        .index_document(create_test_listing("l-50", "Hydraulic Pump", FieldValue::Number(50.0)))
        .unwrap();
    coordinator
        .index_document(create_test_listing("l-null", "Hydraulic Pump", FieldValue::Null))
        .unwrap();
    coordinator
        .index_document(create_test_listing("l-10", "Hydraulic Pump", FieldValue::Number(10.0)))
        .unwrap();

    let request = SearchRequest::new("pump").with_type("listing").with_sort("price");
    let response = coordinator.search(request, tenant_user("T1")).await.unwrap();

    assert_eq!(ids(&response), vec!["l-10", "l-50", "l-null"]);
}

#[tokio::test]
async fn test_title_matches_outrank_description_matches() {
    let coordinator = create_test_coordinator();
    coordinator
        .index_document(
            Document::new(EntityType::Part, "desc", "Rotor Kit")
                .with_description("fits any brake caliper")
                .with_updated_at(at(5)),
        )
        .unwrap();
    coordinator
        .index_document(Document::new(EntityType::Part, "title", "Brake Caliper").with_updated_at(at(0)))
        .unwrap();

    let response = coordinator
        .search(SearchRequest::new("brake caliper"), CallerContext::guest())
        .await
        .unwrap();

    assert_eq!(ids(&response), vec!["title", "desc"]);
    assert!(response.results[0].score > response.results[1].score);
}

#[tokio::test]
async fn test_updates_and_deletes_are_reflected() {
    let coordinator = create_test_coordinator();
    let caller = tenant_user("T1");
    coordinator
        .index_document(create_test_part("T1", "p-1", "Brake Pad", "brakes"))
        .unwrap();

    let renamed = create_test_part("T1", "p-1", "Clutch Plate", "clutch").with_updated_at(at(10));
    assert_eq!(coordinator.index_document(renamed).unwrap(), UpsertOutcome::Updated);

    let old = coordinator.search(SearchRequest::new("brake"), caller.clone()).await.unwrap();
    assert_eq!(old.total, 0);
    let new = coordinator.search(SearchRequest::new("clutch"), caller.clone()).await.unwrap();
    assert_eq!(ids(&new), vec!["p-1"]);

    let key = DocumentKey::new(Some("T1"), EntityType::Part, "p-1");
    assert_eq!(coordinator.remove_document(&key, at(20)).unwrap(), DeleteOutcome::Removed);
    let gone = coordinator.search(SearchRequest::new("clutch"), caller).await.unwrap();
    assert_eq!(gone.total, 0);
}

#[tokio::test]
async fn test_stale_writes_are_ignored() {
    let coordinator = create_test_coordinator();
    let current = create_test_part("T1", "p-1", "Brake Pad", "brakes").with_updated_at(at(10));
    coordinator.index_document(current).unwrap();

    let stale = create_test_part("T1", "p-1", "Old Title", "brakes").with_updated_at(at(5));
    assert_eq!(
        coordinator.index_document(stale).unwrap(),
        UpsertOutcome::StaleWriteIgnored
    );

    let key = DocumentKey::new(Some("T1"), EntityType::Part, "p-1");
    assert_eq!(
        coordinator.remove_document(&key, at(1)).unwrap(),
        DeleteOutcome::StaleWriteIgnored
    );

    let doc = coordinator.store().get(&key).unwrap().unwrap();
    assert_eq!(doc.title, "Brake Pad");
}

#[tokio::test]
async fn test_page_and_page_size_are_clamped() {
    let coordinator = create_test_coordinator();
    index_brake_pads(&coordinator);

    let low = SearchRequest::new("brake").with_page(0).with_page_size(-5);
    let response = coordinator.search(low, tenant_user("T1")).await.unwrap();
    assert_eq!(response.page, 1);
    assert_eq!(response.page_size, 10);

    let high = SearchRequest::new("brake").with_page_size(10_000);
    let response = coordinator.search(high, tenant_user("T1")).await.unwrap();
    assert_eq!(response.page_size, 100);

    let beyond = SearchRequest::new("brake").with_page(9);
    let response = coordinator.search(beyond, tenant_user("T1")).await.unwrap();
    assert!(response.results.is_empty());
    assert_eq!(response.total, 3);
}

#[tokio::test]
async fn test_request_validation_errors() {
    let coordinator = create_test_coordinator();
    let guest = CallerContext::guest();

    let err = coordinator.search(SearchRequest::new("   "), guest.clone()).await.unwrap_err();
    assert_eq!(err.kind(), ErrorKind::EmptyQuery);

    let err = coordinator
        .search(SearchRequest::new("pump").with_type("widget"), guest.clone())
        .await
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::UnknownEntityType);

    let err = coordinator
        .search(SearchRequest::new("pump").with_sort("newest"), guest.clone())
        .await
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::UnknownSortMode);

    let err = coordinator
        .search(
            SearchRequest::new("pump").with_type("company").with_filter("sku", "X1"),
            guest.clone(),
        )
        .await
        .unwrap_err();
    assert_eq!(
        err,
        SearchError::UnknownFilterField {
            entity_type: "company".to_string(),
            field: "sku".to_string(),
        }
    );

    let err = coordinator
        .search(SearchRequest::new("pad").with_filter("stock", "12"), guest)
        .await
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::RestrictedFilterField);
    assert!(err.kind().is_client_error());
}

#[tokio::test]
async fn test_filters_narrow_results() {
    let coordinator = create_test_coordinator();
    coordinator
        .index_document(create_test_part("T1", "p-1", "Brake Pad", "brakes"))
        .unwrap();
    coordinator
        .index_document(create_test_part("T1", "p-2", "Brake Pad", "Filters"))
        .unwrap();

    let request = SearchRequest::new("pad").with_filter("category", "filters");
    let response = coordinator.search(request, tenant_user("T1")).await.unwrap();
    assert_eq!(ids(&response), vec!["p-2"]);
}

#[tokio::test]
async fn test_unavailable_index_is_reported() {
    let coordinator = create_test_coordinator();
    coordinator.store().set_available(false);

    let err = coordinator
        .search(SearchRequest::new("brake"), CallerContext::guest())
        .await
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::IndexUnavailable);
    assert!(!coordinator.health().healthy);
}

#[test]
fn test_autocomplete_min_chars_and_deduplication() {
    let coordinator = create_test_coordinator();
    index_brake_pads(&coordinator);
    let guest = CallerContext::guest();

    let short = coordinator
        .autocomplete(&AutocompleteRequest::new("b"), &guest)
        .unwrap();
    assert!(short.suggestions.is_empty());

    let response = coordinator
        .autocomplete(&AutocompleteRequest::new("br"), &guest)
        .unwrap();
    assert_eq!(response.suggestions, vec!["brake"]);

    let err = coordinator
        .autocomplete(&AutocompleteRequest::new("  "), &guest)
        .unwrap_err();
    assert_eq!(err, SearchError::EmptyQuery);
}

#[test]
fn test_autocomplete_limit_and_type_filter() {
    let coordinator = create_test_coordinator();
    for (i, title) in ["Pad", "Pump", "Panel", "Pipe"].iter().enumerate() {
        coordinator
            .index_document(Document::new(EntityType::Part, format!("p-{}", i), *title))
            .unwrap();
    }
    coordinator
        .index_document(Document::new(EntityType::Service, "s-1", "Painting"))
        .unwrap();
    let guest = CallerContext::guest();

    let limited = coordinator
        .autocomplete(&AutocompleteRequest::new("pa").with_limit(1), &guest)
        .unwrap();
    assert_eq!(limited.suggestions.len(), 1);

    let parts = coordinator
        .autocomplete(&AutocompleteRequest::new("pa").with_type("part"), &guest)
        .unwrap();
    assert_eq!(parts.suggestions, vec!["pad", "panel"]);

    let err = coordinator
        .autocomplete(&AutocompleteRequest::new("pa").with_type("widget"), &guest)
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::UnknownEntityType);
}
