//! Tenant isolation and sensitive-field redaction across every read path

use unified_search::search::*;

fn create_test_coordinator() -> SearchCoordinator {
    SearchCoordinator::new(SearchConfig::default(), AccessPolicy::default())
}

/// A private part per tenant plus one public part and one global reference part
fn seed(coordinator: &SearchCoordinator) {
    let docs = vec![
        Document::new(EntityType::Part, "t1-gasket", "Gasket Alpha")
            .with_tenant("T1")
            .with_facet("category", "seals")
            .with_sensitive("stock", 40.0),
        Document::new(EntityType::Part, "t2-gasket", "Gasket Bravo")
            .with_tenant("T2")
            .with_facet("category", "secret-seals")
            .with_sensitive("stock", 7.0),
        Document::new(EntityType::Part, "t2-public", "Gasket Charlie")
            .with_tenant("T2")
            .with_facet("category", "seals")
            .with_sensitive("stock", 3.0)
            .with_visibility(Visibility::Public),
        Document::new(EntityType::Part, "global", "Gasket Reference").with_facet("category", "seals"),
    ];
    for doc in docs {
        coordinator.index_document(doc).unwrap();
    }
}

fn restricted_listing() -> Document {
    Document::new(EntityType::Listing, "l-1", "Hydraulic Pump")
        .with_tenant("T1")
        .with_field(PRICE_FIELD, 199.99)
        .with_field(PRICE_RESTRICTED_FIELD, true)
        .with_facet(unified_search::search::schema::PRICE_BUCKET_FIELD, "100-500")
        .with_visibility(Visibility::Public)
}

fn sorted_ids(response: &SearchResponse) -> Vec<String> {
    let mut ids: Vec<String> = response.results.iter().map(|h| h.id.clone()).collect();
    ids.sort();
    ids
}

#[tokio::test]
async fn test_tenant_never_sees_other_tenants_private_documents() {
    let coordinator = create_test_coordinator();
    seed(&coordinator);
    let t1 = CallerContext::authenticated("u-1", "T1", &["buyer"]);

    let response = coordinator.search(SearchRequest::new("gasket"), t1).await.unwrap();

    assert_eq!(sorted_ids(&response), vec!["global", "t1-gasket", "t2-public"]);
    assert_eq!(response.total, 3);
}

#[tokio::test]
async fn test_guest_sees_only_global_and_public_documents() {
    let coordinator = create_test_coordinator();
    seed(&coordinator);

    let response = coordinator
        .search(SearchRequest::new("gasket"), CallerContext::guest())
        .await
        .unwrap();

    assert_eq!(sorted_ids(&response), vec!["global", "t2-public"]);
    for hit in &response.results {
        assert!(!hit.fields.contains_key("stock"));
    }
}

#[tokio::test]
async fn test_caller_without_user_id_is_a_guest() {
    let coordinator = create_test_coordinator();
    seed(&coordinator);
    let partial = CallerContext {
        user_id: None,
        tenant_id: Some("T2".to_string()),
        roles: vec!["admin".to_string()],
    };

    let response = coordinator.search(SearchRequest::new("gasket"), partial).await.unwrap();

    assert_eq!(sorted_ids(&response), vec!["global", "t2-public"]);
    assert!(response.results.iter().all(|h| !h.fields.contains_key("stock")));
}

#[tokio::test]
async fn test_global_read_role_sees_every_tenant() {
    let coordinator = create_test_coordinator();
    seed(&coordinator);
    let admin = CallerContext::authenticated("root", "T1", &["admin"]);

    let response = coordinator.search(SearchRequest::new("gasket"), admin).await.unwrap();

    assert_eq!(response.total, 4);
}

#[tokio::test]
async fn test_facets_do_not_leak_other_tenants() {
    let coordinator = create_test_coordinator();
    seed(&coordinator);
    let t1 = CallerContext::authenticated("u-1", "T1", &["buyer"]);

    let response = coordinator.search(SearchRequest::new("gasket"), t1).await.unwrap();
    let category = response.facets.iter().find(|f| f.field == "category").unwrap();

    assert_eq!(category.count("seals"), 3);
    assert_eq!(category.count("secret-seals"), 0);
    assert_eq!(category.total(), 3);
}

#[tokio::test]
async fn test_sensitive_fields_need_matching_tenant_and_permission() {
    let coordinator = create_test_coordinator();
    seed(&coordinator);

    let own_admin = CallerContext::authenticated("u-1", "T1", &["catalog_admin"]);
    let response = coordinator
        .search(SearchRequest::new("alpha"), own_admin)
        .await
        .unwrap();
    assert_eq!(response.results[0].fields.get("stock"), Some(&FieldValue::Number(40.0)));

    let other_admin = CallerContext::authenticated("u-2", "T1", &["catalog_admin"]);
    let response = coordinator
        .search(SearchRequest::new("charlie"), other_admin)
        .await
        .unwrap();
    assert_eq!(response.results[0].id, "t2-public");
    assert!(!response.results[0].fields.contains_key("stock"));
}

#[test]
fn test_autocomplete_is_tenant_scoped() {
    let coordinator = create_test_coordinator();
    coordinator
        .index_document(Document::new(EntityType::Part, "t2", "Secretgear").with_tenant("T2"))
        .unwrap();
    coordinator
        .index_document(Document::new(EntityType::Part, "t1", "Sealant").with_tenant("T1"))
        .unwrap();

    let t1 = CallerContext::authenticated("u-1", "T1", &["buyer"]);
    let response = coordinator
        .autocomplete(&AutocompleteRequest::new("se"), &t1)
        .unwrap();
    assert_eq!(response.suggestions, vec!["sealant"]);

    let guest = coordinator
        .autocomplete(&AutocompleteRequest::new("se"), &CallerContext::guest())
        .unwrap();
    assert!(guest.suggestions.is_empty());

    let t2 = CallerContext::authenticated("u-2", "T2", &["buyer"]);
    let response = coordinator
        .autocomplete(&AutocompleteRequest::new("se"), &t2)
        .unwrap();
    assert_eq!(response.suggestions, vec!["secretgear"]);
}

#[tokio::test]
async fn test_restricted_price_is_redacted_for_guests_and_buyers() {
    let coordinator = create_test_coordinator();
    coordinator.index_document(restricted_listing()).unwrap();

    let callers = [
        CallerContext::guest(),
        CallerContext::authenticated("u-1", "T1", &["buyer"]),
        CallerContext::authenticated("u-2", "T2", &["supplier"]),
    ];
    for caller in callers {
        let response = coordinator
            .search(SearchRequest::new("pump"), caller.clone())
            .await
            .unwrap();
        let fields = &response.results[0].fields;

        assert_eq!(fields.get(PRICE_FIELD), Some(&FieldValue::Null), "caller {:?}", caller);
        assert_eq!(
            fields.get(PRICE_DISPLAY_FIELD),
            Some(&FieldValue::Text("Contact for pricing".to_string()))
        );
        assert!(!fields.contains_key("price_bucket"));
    }
}

#[tokio::test]
async fn test_restricted_price_is_visible_with_permission() {
    let coordinator = create_test_coordinator();
    coordinator.index_document(restricted_listing()).unwrap();
    let supplier = CallerContext::authenticated("u-1", "T1", &["supplier"]);

    let response = coordinator.search(SearchRequest::new("pump"), supplier).await.unwrap();
    let fields = &response.results[0].fields;

    assert_eq!(fields.get(PRICE_FIELD), Some(&FieldValue::Number(199.99)));
    assert!(!fields.contains_key(PRICE_DISPLAY_FIELD));
}

#[tokio::test]
async fn test_restricted_price_cannot_be_sorted_or_faceted_by_guests() {
    let coordinator = create_test_coordinator();
    coordinator.index_document(restricted_listing()).unwrap();
    coordinator
        .index_document(
            Document::new(EntityType::Listing, "l-2", "Hydraulic Pump")
                .with_tenant("T1")
                .with_field(PRICE_FIELD, 500.0)
                .with_visibility(Visibility::Public),
        )
        .unwrap();

    let request = SearchRequest::new("pump").with_type("listing").with_sort("price");
    let response = coordinator.search(request, CallerContext::guest()).await.unwrap();

    let ids: Vec<&str> = response.results.iter().map(|h| h.id.as_str()).collect();
    assert_eq!(ids, vec!["l-2", "l-1"]);

    let bucket = response.facets.iter().find(|f| f.field == "price_bucket").unwrap();
    assert_eq!(bucket.count("100-500"), 0);
    assert_eq!(bucket.other, 2);
}
