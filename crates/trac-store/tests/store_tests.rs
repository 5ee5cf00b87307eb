// SPDX-License-Identifier: Apache-2.0
//! Store-level behavior: versioning invariants, selector resolution,
//! preallocation, search semantics and same-id write races.

use std::collections::BTreeMap;

use chrono::{Duration, Utc};
use trac_error::ErrorKind;
use trac_metadata::identifiers::{ObjectCriteria, TagCriteria, TagHeader, TagSelector};
use trac_metadata::object::{
    ConfigDefinition, FieldSchema, ObjectDefinition, ObjectType, SchemaDefinition, SchemaType,
    TableSchema,
};
use trac_metadata::search::{SearchExpression, SearchOperator, SearchParameters};
use trac_metadata::tag::Tag;
use trac_metadata::typesystem::BasicType;
use trac_metadata::value::Value;
use trac_metadata::truncate_to_micros;
use trac_store::MetadataStore;
use uuid::Uuid;

const TENANT: &str = "ACME";

async fn store() -> MetadataStore {
    let store = MetadataStore::open(":memory:", 1).unwrap();
    store.create_tenant(TENANT, "ACME Corp").await.unwrap();
    store
}

fn schema_definition() -> ObjectDefinition {
    ObjectDefinition::Schema(SchemaDefinition {
        schema_type: SchemaType::Table,
        table: TableSchema {
            fields: vec![FieldSchema {
                field_name: "field_1".to_string(),
                field_type: BasicType::String,
                label: None,
                business_key: false,
                categorical: false,
                not_null: false,
            }],
        },
    })
}

fn config_definition() -> ObjectDefinition {
    ObjectDefinition::Config(ConfigDefinition {
        config_class: "settings".to_string(),
        properties: BTreeMap::new(),
    })
}

fn header(
    object_type: ObjectType,
    object_id: Uuid,
    object_version: u32,
    tag_version: u32,
) -> TagHeader {
    let now = truncate_to_micros(Utc::now());
    TagHeader {
        object_type,
        object_id,
        object_version,
        object_timestamp: now,
        is_latest_object: true,
        tag_version,
        tag_timestamp: now,
        is_latest_tag: true,
    }
}

fn tag_with_attrs(
    definition: ObjectDefinition,
    object_id: Uuid,
    attrs: &[(&str, Value)],
) -> Tag {
    Tag {
        header: header(definition.object_type(), object_id, 1, 1),
        definition: Some(definition),
        attributes: attrs
            .iter()
            .map(|(k, v)| (k.to_string(), v.clone()))
            .collect(),
    }
}

fn next_version(prior: &Tag, definition: ObjectDefinition) -> Tag {
    let mut header = prior.header.clone();
    header.object_version += 1;
    header.tag_version = 1;
    header.object_timestamp = truncate_to_micros(Utc::now());
    header.tag_timestamp = header.object_timestamp;
    Tag {
        header,
        definition: Some(definition),
        attributes: prior.attributes.clone(),
    }
}

fn next_tag(prior: &Tag, attrs: &[(&str, Value)]) -> Tag {
    let mut header = prior.header.clone();
    header.tag_version += 1;
    header.tag_timestamp = truncate_to_micros(Utc::now() + Duration::microseconds(1));
    Tag {
        header,
        definition: None,
        attributes: attrs
            .iter()
            .map(|(k, v)| (k.to_string(), v.clone()))
            .collect(),
    }
}

// ---------------------------------------------------------------------------
// Round trips and invariants
// ---------------------------------------------------------------------------

#[tokio::test]
async fn save_then_load_roundtrips_the_tag() {
    let store = store().await;
    let id = Uuid::new_v4();
    let tag = tag_with_attrs(
        schema_definition(),
        id,
        &[
            ("region", Value::String("Scotland".into())),
            ("rows", Value::Integer(42)),
        ],
    );
    store.save_new_objects(TENANT, vec![tag.clone()]).await.unwrap();

    let loaded = store
        .load_object(TENANT, TagSelector::latest(ObjectType::Schema, id))
        .await
        .unwrap();
    assert_eq!(loaded, tag);
}

#[tokio::test]
async fn array_attrs_roundtrip_in_order() {
    let store = store().await;
    let id = Uuid::new_v4();
    let regions = Value::Array(vec![
        Value::String("Scotland".into()),
        Value::String("Wales".into()),
    ]);
    let tag = tag_with_attrs(schema_definition(), id, &[("regions", regions.clone())]);
    store.save_new_objects(TENANT, vec![tag]).await.unwrap();

    let loaded = store
        .load_object(TENANT, TagSelector::latest(ObjectType::Schema, id))
        .await
        .unwrap();
    assert_eq!(loaded.attributes["regions"], regions);
}

#[tokio::test]
async fn duplicate_object_id_is_rejected() {
    let store = store().await;
    let id = Uuid::new_v4();
    let tag = tag_with_attrs(schema_definition(), id, &[]);
    store.save_new_objects(TENANT, vec![tag.clone()]).await.unwrap();

    let err = store.save_new_objects(TENANT, vec![tag]).await.unwrap_err();
    assert_eq!(err.kind, ErrorKind::Duplicate);
}

#[tokio::test]
async fn unknown_tenant_is_not_found() {
    let store = store().await;
    let tag = tag_with_attrs(schema_definition(), Uuid::new_v4(), &[]);
    let err = store
        .save_new_objects("NOWHERE", vec![tag])
        .await
        .unwrap_err();
    assert_eq!(err.kind, ErrorKind::NotFound);
}

#[tokio::test]
async fn version_history_keeps_exactly_one_latest() {
    let store = store().await;
    let id = Uuid::new_v4();
    let v1 = tag_with_attrs(config_definition(), id, &[]);
    store.save_new_objects(TENANT, vec![v1.clone()]).await.unwrap();
    let v2 = next_version(&v1, config_definition());
    store.save_new_versions(TENANT, vec![v2.clone()]).await.unwrap();
    let v3 = next_version(&v2, config_definition());
    store.save_new_versions(TENANT, vec![v3]).await.unwrap();

    let latest = store
        .load_object(TENANT, TagSelector::latest(ObjectType::Config, id))
        .await
        .unwrap();
    assert_eq!(latest.header.object_version, 3);
    assert!(latest.header.is_latest_object);

    for version in 1..=2u32 {
        let old = store
            .load_object(
                TENANT,
                TagSelector::for_version(ObjectType::Config, id, version),
            )
            .await
            .unwrap();
        assert_eq!(old.header.object_version, version);
        assert!(!old.header.is_latest_object);
    }
}

#[tokio::test]
async fn new_version_requires_the_prior_version() {
    let store = store().await;
    let id = Uuid::new_v4();
    let v1 = tag_with_attrs(config_definition(), id, &[]);

    // v1 was never committed, so v2 has nothing to build on.
    let orphan = next_version(&v1, config_definition());
    let err = store
        .save_new_versions(TENANT, vec![orphan])
        .await
        .unwrap_err();
    assert_eq!(err.kind, ErrorKind::NotFound);
}

#[tokio::test]
async fn object_type_is_stable_across_selectors() {
    let store = store().await;
    let id = Uuid::new_v4();
    store
        .save_new_objects(TENANT, vec![tag_with_attrs(schema_definition(), id, &[])])
        .await
        .unwrap();

    let err = store
        .load_object(TENANT, TagSelector::latest(ObjectType::Data, id))
        .await
        .unwrap_err();
    assert_eq!(err.kind, ErrorKind::WrongType);
}

// ---------------------------------------------------------------------------
// Same-id write races
// ---------------------------------------------------------------------------

#[tokio::test]
async fn second_tag_writer_on_the_same_version_is_superseded() {
    let store = store().await;
    let id = Uuid::new_v4();
    let v1 = tag_with_attrs(config_definition(), id, &[("stage", Value::String("dev".into()))]);
    store.save_new_objects(TENANT, vec![v1.clone()]).await.unwrap();

    // Two writers both observed t=1 and built t=2.
    let first = next_tag(&v1, &[("stage", Value::String("test".into()))]);
    let second = next_tag(&v1, &[("stage", Value::String("prod".into()))]);

    store.save_new_tags(TENANT, vec![first]).await.unwrap();
    let err = store.save_new_tags(TENANT, vec![second]).await.unwrap_err();
    assert_eq!(err.kind, ErrorKind::Duplicate);

    let latest = store
        .load_object(TENANT, TagSelector::latest(ObjectType::Config, id))
        .await
        .unwrap();
    assert_eq!(latest.header.tag_version, 2);
    assert_eq!(latest.attributes["stage"], Value::String("test".into()));
}

#[tokio::test]
async fn second_version_writer_is_superseded() {
    let store = store().await;
    let id = Uuid::new_v4();
    let v1 = tag_with_attrs(config_definition(), id, &[]);
    store.save_new_objects(TENANT, vec![v1.clone()]).await.unwrap();

    let first = next_version(&v1, config_definition());
    let second = next_version(&v1, config_definition());

    store.save_new_versions(TENANT, vec![first]).await.unwrap();
    let err = store
        .save_new_versions(TENANT, vec![second])
        .await
        .unwrap_err();
    assert_eq!(err.kind, ErrorKind::Duplicate);
}

#[tokio::test]
async fn failed_batch_leaves_no_partial_state() {
    let store = store().await;
    let good = Uuid::new_v4();
    let duplicate = Uuid::new_v4();
    store
        .save_new_objects(
            TENANT,
            vec![tag_with_attrs(schema_definition(), duplicate, &[])],
        )
        .await
        .unwrap();

    let batch = trac_store::WriteBatch {
        new_objects: vec![
            tag_with_attrs(schema_definition(), good, &[]),
            tag_with_attrs(schema_definition(), duplicate, &[]),
        ],
        ..Default::default()
    };
    let err = store.write_batch(TENANT, batch).await.unwrap_err();
    assert_eq!(err.kind, ErrorKind::Duplicate);

    // The first entry of the failed batch must not be visible.
    let err = store
        .load_object(TENANT, TagSelector::latest(ObjectType::Schema, good))
        .await
        .unwrap_err();
    assert_eq!(err.kind, ErrorKind::NotFound);
}

// ---------------------------------------------------------------------------
// Preallocation
// ---------------------------------------------------------------------------

#[tokio::test]
async fn preallocated_id_promotes_exactly_once() {
    let store = store().await;
    let ids = store
        .preallocate_object_ids(TENANT, vec![ObjectType::Schema])
        .await
        .unwrap();
    assert_eq!(ids.len(), 1);

    // Reserved but not yet promoted: reads miss.
    let err = store
        .load_object(TENANT, TagSelector::latest(ObjectType::Schema, ids[0]))
        .await
        .unwrap_err();
    assert_eq!(err.kind, ErrorKind::NotFound);

    let tag = tag_with_attrs(schema_definition(), ids[0], &[]);
    store
        .save_preallocated_objects(TENANT, vec![tag.clone()])
        .await
        .unwrap();

    let loaded = store
        .load_object(TENANT, TagSelector::latest(ObjectType::Schema, ids[0]))
        .await
        .unwrap();
    assert_eq!(loaded.header.object_version, 1);

    // A second promotion fails: the reservation is gone.
    let err = store
        .save_preallocated_objects(TENANT, vec![tag])
        .await
        .unwrap_err();
    assert_eq!(err.kind, ErrorKind::NotFound);
}

#[tokio::test]
async fn promotion_without_reservation_is_not_found() {
    let store = store().await;
    let tag = tag_with_attrs(schema_definition(), Uuid::new_v4(), &[]);
    let err = store
        .save_preallocated_objects(TENANT, vec![tag])
        .await
        .unwrap_err();
    assert_eq!(err.kind, ErrorKind::NotFound);
}

#[tokio::test]
async fn promotion_with_the_wrong_type_is_rejected() {
    let store = store().await;
    let ids = store
        .preallocate_object_ids(TENANT, vec![ObjectType::Data])
        .await
        .unwrap();
    let tag = tag_with_attrs(schema_definition(), ids[0], &[]);
    let err = store
        .save_preallocated_objects(TENANT, vec![tag])
        .await
        .unwrap_err();
    assert_eq!(err.kind, ErrorKind::WrongType);
}

// ---------------------------------------------------------------------------
// Selector resolution
// ---------------------------------------------------------------------------

#[tokio::test]
async fn as_of_before_v1_is_not_found() {
    let store = store().await;
    let id = Uuid::new_v4();
    let tag = tag_with_attrs(config_definition(), id, &[]);
    let before = tag.header.object_timestamp - Duration::seconds(10);
    store.save_new_objects(TENANT, vec![tag]).await.unwrap();

    let selector = TagSelector {
        object_type: ObjectType::Config,
        object_id: id,
        object_criteria: ObjectCriteria::ObjectAsOf(before),
        tag_criteria: TagCriteria::LatestTag,
    };
    let err = store.load_object(TENANT, selector).await.unwrap_err();
    assert_eq!(err.kind, ErrorKind::NotFound);
}

#[tokio::test]
async fn tag_as_of_exactly_at_the_timestamp_matches() {
    let store = store().await;
    let id = Uuid::new_v4();
    let tag = tag_with_attrs(config_definition(), id, &[]);
    let exact = tag.header.tag_timestamp;
    store.save_new_objects(TENANT, vec![tag]).await.unwrap();

    let selector = TagSelector {
        object_type: ObjectType::Config,
        object_id: id,
        object_criteria: ObjectCriteria::LatestObject,
        tag_criteria: TagCriteria::TagAsOf(exact),
    };
    let loaded = store.load_object(TENANT, selector).await.unwrap();
    assert_eq!(loaded.header.tag_version, 1);
}

#[tokio::test]
async fn explicit_version_with_latest_tag_combines() {
    let store = store().await;
    let id = Uuid::new_v4();
    let v1 = tag_with_attrs(config_definition(), id, &[]);
    store.save_new_objects(TENANT, vec![v1.clone()]).await.unwrap();
    let v1_t2 = next_tag(&v1, &[("note", Value::String("amended".into()))]);
    store.save_new_tags(TENANT, vec![v1_t2]).await.unwrap();
    let v2 = next_version(&v1, config_definition());
    store.save_new_versions(TENANT, vec![v2]).await.unwrap();

    let loaded = store
        .load_object(TENANT, TagSelector::for_version(ObjectType::Config, id, 1))
        .await
        .unwrap();
    assert_eq!(loaded.header.object_version, 1);
    assert_eq!(loaded.header.tag_version, 2);
    assert!(loaded.header.is_latest_tag);
    assert!(!loaded.header.is_latest_object);
}

#[tokio::test]
async fn batch_load_preserves_order_and_fails_whole() {
    let store = store().await;
    let a = Uuid::new_v4();
    let b = Uuid::new_v4();
    store
        .save_new_objects(
            TENANT,
            vec![
                tag_with_attrs(schema_definition(), a, &[]),
                tag_with_attrs(schema_definition(), b, &[]),
            ],
        )
        .await
        .unwrap();

    let tags = store
        .load_objects(
            TENANT,
            vec![
                TagSelector::latest(ObjectType::Schema, b),
                TagSelector::latest(ObjectType::Schema, a),
            ],
        )
        .await
        .unwrap();
    assert_eq!(tags[0].header.object_id, b);
    assert_eq!(tags[1].header.object_id, a);

    let err = store
        .load_objects(
            TENANT,
            vec![
                TagSelector::latest(ObjectType::Schema, a),
                TagSelector::latest(ObjectType::Schema, Uuid::new_v4()),
            ],
        )
        .await
        .unwrap_err();
    assert_eq!(err.kind, ErrorKind::NotFound);
}

// ---------------------------------------------------------------------------
// Search
// ---------------------------------------------------------------------------

async fn seed_regions(store: &MetadataStore) -> (Uuid, Uuid, Uuid) {
    let (a, b, c) = (Uuid::new_v4(), Uuid::new_v4(), Uuid::new_v4());
    store
        .save_new_objects(
            TENANT,
            vec![
                tag_with_attrs(
                    config_definition(),
                    a,
                    &[("region", Value::String("Scotland".into()))],
                ),
                tag_with_attrs(
                    config_definition(),
                    b,
                    &[("region", Value::String("Scotland".into()))],
                ),
                tag_with_attrs(
                    config_definition(),
                    c,
                    &[("region", Value::String("Wales".into()))],
                ),
            ],
        )
        .await
        .unwrap();
    (a, b, c)
}

fn region_search(value: &str) -> SearchParameters {
    SearchParameters::new(
        ObjectType::Config,
        SearchExpression::term(
            "region",
            BasicType::String,
            SearchOperator::Eq,
            Value::String(value.into()),
        ),
    )
}

#[tokio::test]
async fn equality_search_finds_matching_tags_in_order() {
    let store = store().await;
    let (a, b, _) = seed_regions(&store).await;

    let results = store.search(TENANT, region_search("Scotland")).await.unwrap();
    assert_eq!(results.len(), 2);

    let mut expected = vec![a, b];
    expected.sort_by_key(|id| id.to_string());
    let found: Vec<Uuid> = results.iter().map(|t| t.header.object_id).collect();
    assert_eq!(found, expected);
    assert!(results.iter().all(|t| t.definition.is_none()));
}

#[tokio::test]
async fn search_sees_only_latest_tags_by_default() {
    let store = store().await;
    let id = Uuid::new_v4();
    let v1 = tag_with_attrs(
        config_definition(),
        id,
        &[("region", Value::String("Scotland".into()))],
    );
    store.save_new_objects(TENANT, vec![v1.clone()]).await.unwrap();
    let retagged = next_tag(&v1, &[("region", Value::String("Wales".into()))]);
    store.save_new_tags(TENANT, vec![retagged]).await.unwrap();

    assert!(store.search(TENANT, region_search("Scotland")).await.unwrap().is_empty());
    assert_eq!(store.search(TENANT, region_search("Wales")).await.unwrap().len(), 1);

    let mut with_prior = region_search("Scotland");
    with_prior.prior_tags = true;
    assert_eq!(store.search(TENANT, with_prior).await.unwrap().len(), 1);
}

#[tokio::test]
async fn ne_matches_absent_and_multivalued_misses_ordered() {
    let store = store().await;
    let plain = Uuid::new_v4();
    let multi = Uuid::new_v4();
    store
        .save_new_objects(
            TENANT,
            vec![
                tag_with_attrs(config_definition(), plain, &[]),
                tag_with_attrs(
                    config_definition(),
                    multi,
                    &[(
                        "rows",
                        Value::Array(vec![Value::Integer(5), Value::Integer(50)]),
                    )],
                ),
            ],
        )
        .await
        .unwrap();

    // NE against an attribute neither object carries as a single value:
    // the attribute-absent object matches.
    let ne = SearchParameters::new(
        ObjectType::Config,
        SearchExpression::term(
            "region",
            BasicType::String,
            SearchOperator::Ne,
            Value::String("Scotland".into()),
        ),
    );
    let results = store.search(TENANT, ne).await.unwrap();
    assert_eq!(results.len(), 2);

    // EQ on a multi-valued attribute matches when any element matches.
    let eq = SearchParameters::new(
        ObjectType::Config,
        SearchExpression::term(
            "rows",
            BasicType::Integer,
            SearchOperator::Eq,
            Value::Integer(50),
        ),
    );
    assert_eq!(store.search(TENANT, eq).await.unwrap().len(), 1);

    // Ordered comparison never matches a multi-valued attribute.
    let gt = SearchParameters::new(
        ObjectType::Config,
        SearchExpression::term(
            "rows",
            BasicType::Integer,
            SearchOperator::Gt,
            Value::Integer(1),
        ),
    );
    assert!(store.search(TENANT, gt).await.unwrap().is_empty());
}

#[tokio::test]
async fn ordered_search_requires_exact_type_agreement() {
    let store = store().await;
    let id = Uuid::new_v4();
    store
        .save_new_objects(
            TENANT,
            vec![tag_with_attrs(
                config_definition(),
                id,
                &[("rows", Value::Integer(100))],
            )],
        )
        .await
        .unwrap();

    // A FLOAT comparison does not see the INTEGER attribute.
    let float_gt = SearchParameters::new(
        ObjectType::Config,
        SearchExpression::term(
            "rows",
            BasicType::Float,
            SearchOperator::Gt,
            Value::Float(1.0),
        ),
    );
    assert!(store.search(TENANT, float_gt).await.unwrap().is_empty());

    let int_gt = SearchParameters::new(
        ObjectType::Config,
        SearchExpression::term(
            "rows",
            BasicType::Integer,
            SearchOperator::Gt,
            Value::Integer(99),
        ),
    );
    assert_eq!(store.search(TENANT, int_gt).await.unwrap().len(), 1);
}

#[tokio::test]
async fn search_as_of_before_creation_is_empty() {
    let store = store().await;
    let long_ago = Utc::now() - Duration::days(365);
    seed_regions(&store).await;

    let mut params = region_search("Scotland");
    params.search_as_of = Some(long_ago);
    params.prior_versions = true;
    params.prior_tags = true;
    assert!(store.search(TENANT, params).await.unwrap().is_empty());
}

#[tokio::test]
async fn search_as_of_recomputes_latest_within_the_window() {
    let store = store().await;
    let id = Uuid::new_v4();
    let v1 = tag_with_attrs(
        config_definition(),
        id,
        &[("region", Value::String("Scotland".into()))],
    );
    store.save_new_objects(TENANT, vec![v1.clone()]).await.unwrap();
    let cutoff = v1.header.tag_timestamp + Duration::seconds(1);

    // Later the tag moves to Wales, after the cutoff.
    let mut retagged = next_tag(&v1, &[("region", Value::String("Wales".into()))]);
    retagged.header.tag_timestamp = cutoff + Duration::seconds(10);
    store.save_new_tags(TENANT, vec![retagged]).await.unwrap();

    // Now, Scotland is gone.
    assert!(store.search(TENANT, region_search("Scotland")).await.unwrap().is_empty());

    // As of the cutoff, t=1 was the latest tag and still matches.
    let mut as_of = region_search("Scotland");
    as_of.search_as_of = Some(cutoff);
    let results = store.search(TENANT, as_of).await.unwrap();
    assert_eq!(results.len(), 1);
    assert_eq!(results[0].header.tag_version, 1);
}

#[tokio::test]
async fn logical_expressions_compose_in_search() {
    let store = store().await;
    seed_regions(&store).await;

    let scotland_or_wales = SearchParameters::new(
        ObjectType::Config,
        SearchExpression::or(vec![
            SearchExpression::term(
                "region",
                BasicType::String,
                SearchOperator::Eq,
                Value::String("Scotland".into()),
            ),
            SearchExpression::term(
                "region",
                BasicType::String,
                SearchOperator::Eq,
                Value::String("Wales".into()),
            ),
        ]),
    );
    assert_eq!(store.search(TENANT, scotland_or_wales).await.unwrap().len(), 3);

    let not_scotland = SearchParameters::new(
        ObjectType::Config,
        SearchExpression::not(SearchExpression::term(
            "region",
            BasicType::String,
            SearchOperator::Eq,
            Value::String("Scotland".into()),
        )),
    );
    assert_eq!(store.search(TENANT, not_scotland).await.unwrap().len(), 1);

    let in_list = SearchParameters::new(
        ObjectType::Config,
        SearchExpression::term(
            "region",
            BasicType::String,
            SearchOperator::In,
            Value::Array(vec![
                Value::String("Wales".into()),
                Value::String("Cornwall".into()),
            ]),
        ),
    );
    assert_eq!(store.search(TENANT, in_list).await.unwrap().len(), 1);
}

// ---------------------------------------------------------------------------
// Tenants
// ---------------------------------------------------------------------------

#[tokio::test]
async fn tenants_list_in_code_order() {
    let store = store().await;
    store.create_tenant("ZETA", "Last").await.unwrap();
    store.create_tenant("ALPHA", "First").await.unwrap();

    let tenants = store.list_tenants().await.unwrap();
    let codes: Vec<&str> = tenants.iter().map(|t| t.tenant_code.as_str()).collect();
    assert_eq!(codes, vec!["ACME", "ALPHA", "ZETA"]);
}

#[tokio::test]
async fn duplicate_tenant_is_rejected() {
    let store = store().await;
    let err = store.create_tenant(TENANT, "again").await.unwrap_err();
    assert_eq!(err.kind, ErrorKind::Duplicate);
}
