// SPDX-License-Identifier: Apache-2.0
//! End-to-end write/read scenarios over a real in-memory store.

use std::collections::BTreeMap;

use chrono::{Duration, Utc};
use trac_config::PlatformConfig;
use trac_error::ErrorKind;
use trac_metadata::api::{
    MetadataReadRequest, MetadataSearchRequest, MetadataWriteRequest,
    UniversalMetadataWriteBatchRequest, UserInfo,
};
use trac_metadata::attrs;
use trac_metadata::identifiers::{ObjectCriteria, TagCriteria, TagSelector};
use trac_metadata::object::{
    DataDefinition, FieldSchema, FlowDefinition, FlowEdge, FlowNode, FlowNodeType, FlowSocket,
    ObjectDefinition, ObjectType, SchemaDefinition, SchemaSpec, SchemaType, StorageCopy,
    StorageDefinition, StorageIncarnation, StorageItem, TableSchema,
};
use trac_metadata::search::{SearchExpression, SearchOperator, SearchParameters};
use trac_metadata::tag::TagUpdate;
use trac_metadata::typesystem::BasicType;
use trac_metadata::value::Value;
use trac_services::{MetadataReadService, MetadataWriteService};
use trac_store::MetadataStore;
use uuid::Uuid;

const TENANT: &str = "ACME";

fn jane() -> UserInfo {
    UserInfo {
        user_id: "jane.doe".to_string(),
        user_name: "Jane Doe".to_string(),
    }
}

async fn services() -> (MetadataWriteService, MetadataReadService) {
    let store = MetadataStore::open(":memory:", 1).unwrap();
    store.create_tenant(TENANT, "ACME Corp").await.unwrap();
    let write = MetadataWriteService::new(store.clone());
    let read = MetadataReadService::new(store, &PlatformConfig::default());
    (write, read)
}

fn create_request(definition: ObjectDefinition, tag_updates: Vec<TagUpdate>) -> MetadataWriteRequest {
    MetadataWriteRequest {
        tenant: TENANT.to_string(),
        object_type: definition.object_type(),
        prior_version: None,
        definition: Some(definition),
        tag_updates,
    }
}

fn table_schema(fields: &[(&str, BasicType)]) -> SchemaDefinition {
    SchemaDefinition {
        schema_type: SchemaType::Table,
        table: TableSchema {
            fields: fields
                .iter()
                .map(|(name, ty)| FieldSchema {
                    field_name: (*name).to_string(),
                    field_type: *ty,
                    label: None,
                    business_key: false,
                    categorical: false,
                    not_null: false,
                })
                .collect(),
        },
    }
}

fn storage_definition() -> ObjectDefinition {
    let mut data_items = BTreeMap::new();
    data_items.insert(
        "part-root".to_string(),
        StorageItem {
            incarnations: vec![StorageIncarnation {
                incarnation_index: 0,
                incarnation_timestamp: Utc::now(),
                status: trac_metadata::object::IncarnationStatus::IncarnationAvailable,
                copies: vec![StorageCopy {
                    storage_key: "default_bucket".to_string(),
                    storage_path: "data/part-root".to_string(),
                    storage_format: "parquet".to_string(),
                    copy_status: trac_metadata::object::CopyStatus::CopyAvailable,
                    copy_timestamp: Utc::now(),
                }],
            }],
        },
    );
    ObjectDefinition::Storage(StorageDefinition { data_items })
}

fn basic_flow() -> ObjectDefinition {
    let mut nodes = BTreeMap::new();
    let plain = |node_type| FlowNode {
        node_type,
        parameters: Vec::new(),
        inputs: Vec::new(),
        outputs: Vec::new(),
        label: None,
    };
    nodes.insert("input_1".to_string(), plain(FlowNodeType::Input));
    nodes.insert("input_2".to_string(), plain(FlowNodeType::Input));
    nodes.insert(
        "model_1".to_string(),
        FlowNode {
            node_type: FlowNodeType::Model,
            parameters: Vec::new(),
            inputs: vec!["in_a".to_string(), "in_b".to_string()],
            outputs: vec!["out_1".to_string()],
            label: None,
        },
    );
    nodes.insert("output_1".to_string(), plain(FlowNodeType::Output));

    let socket = |node: &str, sock: Option<&str>| FlowSocket {
        node: node.to_string(),
        socket: sock.map(String::from),
    };
    let edges = vec![
        FlowEdge {
            source: socket("input_1", None),
            target: socket("model_1", Some("in_a")),
        },
        FlowEdge {
            source: socket("input_2", None),
            target: socket("model_1", Some("in_b")),
        },
        FlowEdge {
            source: socket("model_1", Some("out_1")),
            target: socket("output_1", None),
        },
    ];

    ObjectDefinition::Flow(FlowDefinition {
        nodes,
        edges,
        parameters: BTreeMap::new(),
        inputs: BTreeMap::new(),
        outputs: BTreeMap::new(),
    })
}

// ---------------------------------------------------------------------------
// Scenario: flow creation with controlled attributes
// ---------------------------------------------------------------------------

#[tokio::test]
async fn creating_a_flow_stamps_the_creating_user() {
    let (write, read) = services().await;

    let header = write
        .create_object(&jane(), create_request(basic_flow(), Vec::new()))
        .await
        .unwrap();
    assert_eq!(header.object_version, 1);
    assert_eq!(header.tag_version, 1);

    let tag = read
        .read_object(MetadataReadRequest {
            tenant: TENANT.to_string(),
            selector: header.to_selector(),
        })
        .await
        .unwrap();
    assert_eq!(
        tag.attributes[attrs::ATTR_CREATE_USER_ID],
        Value::String("jane.doe".to_string())
    );
    assert_eq!(
        tag.attributes[attrs::ATTR_UPDATE_USER_ID],
        Value::String("jane.doe".to_string())
    );
    assert!(tag.attributes.contains_key(attrs::ATTR_CREATE_TIME));
}

// ---------------------------------------------------------------------------
// Scenario: preallocated schema consumed in a batch with a data object
// ---------------------------------------------------------------------------

#[tokio::test]
async fn preallocated_schema_is_fixed_into_the_data_object() {
    let (write, read) = services().await;

    let storage_header = write
        .create_object(&jane(), create_request(storage_definition(), Vec::new()))
        .await
        .unwrap();

    let reserved = write
        .preallocate_id(
            &jane(),
            MetadataWriteRequest {
                tenant: TENANT.to_string(),
                object_type: ObjectType::Schema,
                prior_version: None,
                definition: None,
                tag_updates: Vec::new(),
            },
        )
        .await
        .unwrap();
    assert_eq!(reserved.object_version, 0);

    // One batch: promote the reserved schema and create a data object that
    // references it by latest-object.
    let mut batch = UniversalMetadataWriteBatchRequest::for_tenant(TENANT);
    batch.create_objects.push(MetadataWriteRequest {
        tenant: TENANT.to_string(),
        object_type: ObjectType::Schema,
        prior_version: Some(TagSelector {
            object_type: ObjectType::Schema,
            object_id: reserved.object_id,
            object_criteria: ObjectCriteria::ObjectVersion(0),
            tag_criteria: TagCriteria::LatestTag,
        }),
        definition: Some(ObjectDefinition::Schema(table_schema(&[
            ("field_1", BasicType::String),
        ]))),
        tag_updates: Vec::new(),
    });
    batch.create_objects.push(create_request(
        ObjectDefinition::Data(DataDefinition {
            schema: SchemaSpec::SchemaId(TagSelector::latest(
                ObjectType::Schema,
                reserved.object_id,
            )),
            storage_id: TagSelector::latest(ObjectType::Storage, storage_header.object_id),
        }),
        Vec::new(),
    ));

    let response = write.write_batch(&jane(), batch).await.unwrap();
    assert_eq!(response.create_objects.len(), 2);
    let data_header = &response.create_objects[1];

    let data_tag = read
        .read_object(MetadataReadRequest {
            tenant: TENANT.to_string(),
            selector: data_header.to_selector(),
        })
        .await
        .unwrap();
    let Some(ObjectDefinition::Data(stored)) = data_tag.definition else {
        panic!("expected a data definition");
    };
    let SchemaSpec::SchemaId(schema_id) = stored.schema else {
        panic!("expected a schema reference");
    };
    assert_eq!(schema_id.object_id, reserved.object_id);
    assert_eq!(
        schema_id.object_criteria,
        ObjectCriteria::ObjectVersion(1),
        "stored references are normalised to fixed form"
    );
    assert_eq!(
        stored.storage_id.object_criteria,
        ObjectCriteria::ObjectVersion(1)
    );
}

// ---------------------------------------------------------------------------
// Scenario: schema evolution across data versions
// ---------------------------------------------------------------------------

#[tokio::test]
async fn schema_fields_may_be_added_but_not_removed() {
    let (write, _) = services().await;

    let storage_header = write
        .create_object(&jane(), create_request(storage_definition(), Vec::new()))
        .await
        .unwrap();
    let storage_ref = TagSelector::latest(ObjectType::Storage, storage_header.object_id);

    let data = |fields: &[(&str, BasicType)]| {
        ObjectDefinition::Data(DataDefinition {
            schema: SchemaSpec::Schema(table_schema(fields)),
            storage_id: storage_ref.clone(),
        })
    };

    let v1 = write
        .create_object(
            &jane(),
            create_request(
                data(&[("field_1", BasicType::String), ("field_2", BasicType::Float)]),
                Vec::new(),
            ),
        )
        .await
        .unwrap();

    // Adding field_3 is a compatible change.
    let v2 = write
        .update_object(
            &jane(),
            MetadataWriteRequest {
                tenant: TENANT.to_string(),
                object_type: ObjectType::Data,
                prior_version: Some(v1.to_selector()),
                definition: Some(data(&[
                    ("field_1", BasicType::String),
                    ("field_2", BasicType::Float),
                    ("field_3", BasicType::Integer),
                ])),
                tag_updates: Vec::new(),
            },
        )
        .await
        .unwrap();
    assert_eq!(v2.object_version, 2);

    // Removing field_2 is not.
    let err = write
        .update_object(
            &jane(),
            MetadataWriteRequest {
                tenant: TENANT.to_string(),
                object_type: ObjectType::Data,
                prior_version: Some(v2.to_selector()),
                definition: Some(data(&[
                    ("field_1", BasicType::String),
                    ("field_3", BasicType::Integer),
                ])),
                tag_updates: Vec::new(),
            },
        )
        .await
        .unwrap_err();
    assert_eq!(err.kind, ErrorKind::VersionValidation);
    assert!(
        err.details.iter().any(|d| d.message
            == "Field [field_2] from the prior schema version has been removed"),
        "{:?}",
        err.details
    );
}

// ---------------------------------------------------------------------------
// Scenario: attribute search
// ---------------------------------------------------------------------------

#[tokio::test]
async fn region_search_returns_matching_tags_in_order() {
    let (write, read) = services().await;

    let storage_header = write
        .create_object(&jane(), create_request(storage_definition(), Vec::new()))
        .await
        .unwrap();
    let storage_ref = TagSelector::latest(ObjectType::Storage, storage_header.object_id);

    let region = |name: &str| vec![TagUpdate::put("region", Value::String(name.to_string()))];
    for value in ["Scotland", "Scotland", "Wales"] {
        write
            .create_object(
                &jane(),
                create_request(
                    ObjectDefinition::Data(DataDefinition {
                        schema: SchemaSpec::Schema(table_schema(&[("f", BasicType::String)])),
                        storage_id: storage_ref.clone(),
                    }),
                    region(value),
                ),
            )
            .await
            .unwrap();
    }

    let response = read
        .search(MetadataSearchRequest {
            tenant: TENANT.to_string(),
            search_params: SearchParameters::new(
                ObjectType::Data,
                SearchExpression::term(
                    "region",
                    BasicType::String,
                    SearchOperator::Eq,
                    Value::String("Scotland".into()),
                ),
            ),
        })
        .await
        .unwrap();

    assert_eq!(response.search_results.len(), 2);
    let ids: Vec<String> = response
        .search_results
        .iter()
        .map(|t| t.header.object_id.to_string())
        .collect();
    let mut sorted = ids.clone();
    sorted.sort();
    assert_eq!(ids, sorted, "results are ordered by object id");
}

// ---------------------------------------------------------------------------
// Scenario: concurrent tag updates on one version
// ---------------------------------------------------------------------------

#[tokio::test]
async fn second_tag_update_on_the_same_tag_is_superseded() {
    let (write, _) = services().await;

    let v1 = write
        .create_object(&jane(), create_request(basic_flow(), Vec::new()))
        .await
        .unwrap();
    let t2 = write
        .update_tag(
            &jane(),
            MetadataWriteRequest {
                tenant: TENANT.to_string(),
                object_type: ObjectType::Flow,
                prior_version: Some(v1.to_selector()),
                definition: None,
                tag_updates: vec![TagUpdate::put("stage", Value::String("dev".into()))],
            },
        )
        .await
        .unwrap();
    assert_eq!(t2.tag_version, 2);

    // Two writers both build on t=2.
    let pinned = t2.to_selector();
    let update = |stage: &str| MetadataWriteRequest {
        tenant: TENANT.to_string(),
        object_type: ObjectType::Flow,
        prior_version: Some(pinned.clone()),
        definition: None,
        tag_updates: vec![TagUpdate::put("stage", Value::String(stage.to_string()))],
    };

    let winner = write.update_tag(&jane(), update("test")).await.unwrap();
    assert_eq!(winner.tag_version, 3);

    let err = write.update_tag(&jane(), update("prod")).await.unwrap_err();
    assert_eq!(err.kind, ErrorKind::Duplicate);
}

// ---------------------------------------------------------------------------
// Scenario: historical search before creation
// ---------------------------------------------------------------------------

#[tokio::test]
async fn search_as_of_before_creation_finds_nothing() {
    let (write, read) = services().await;
    write
        .create_object(
            &jane(),
            create_request(
                basic_flow(),
                vec![TagUpdate::put("region", Value::String("Scotland".into()))],
            ),
        )
        .await
        .unwrap();

    let mut params = SearchParameters::new(
        ObjectType::Flow,
        SearchExpression::term(
            "region",
            BasicType::String,
            SearchOperator::Eq,
            Value::String("Scotland".into()),
        ),
    );
    params.search_as_of = Some(Utc::now() - Duration::days(30));
    params.prior_versions = true;
    params.prior_tags = true;

    let response = read
        .search(MetadataSearchRequest {
            tenant: TENANT.to_string(),
            search_params: params,
        })
        .await
        .unwrap();
    assert!(response.search_results.is_empty());
}

// ---------------------------------------------------------------------------
// Controlled attributes and batch integrity
// ---------------------------------------------------------------------------

#[tokio::test]
async fn tag_updates_cannot_displace_controlled_attributes() {
    let (write, read) = services().await;

    let created = write
        .create_object(&jane(), create_request(basic_flow(), Vec::new()))
        .await
        .unwrap();

    let sam = UserInfo {
        user_id: "sam.smith".to_string(),
        user_name: "Sam Smith".to_string(),
    };
    let retagged = write
        .update_tag(
            &sam,
            MetadataWriteRequest {
                tenant: TENANT.to_string(),
                object_type: ObjectType::Flow,
                prior_version: Some(created.to_selector()),
                definition: None,
                tag_updates: vec![TagUpdate::put("note", Value::String("reviewed".into()))],
            },
        )
        .await
        .unwrap();

    let tag = read
        .read_object(MetadataReadRequest {
            tenant: TENANT.to_string(),
            selector: retagged.to_selector(),
        })
        .await
        .unwrap();

    // Creation attribution survives; update attribution moves.
    assert_eq!(
        tag.attributes[attrs::ATTR_CREATE_USER_ID],
        Value::String("jane.doe".to_string())
    );
    assert_eq!(
        tag.attributes[attrs::ATTR_UPDATE_USER_ID],
        Value::String("sam.smith".to_string())
    );
    assert_eq!(tag.attributes["note"], Value::String("reviewed".into()));
}

#[tokio::test]
async fn cyclic_batch_references_are_rejected() {
    let (write, _) = services().await;

    // Two jobs referencing each other's ids in one batch. Jobs are the
    // only objects that can reference arbitrary ids before they exist.
    let a = Uuid::new_v4();
    let b = Uuid::new_v4();

    let job = |own: Uuid, other: Uuid| {
        let mut inputs = BTreeMap::new();
        inputs.insert(
            "input_1".to_string(),
            TagSelector::latest(ObjectType::Data, other),
        );
        MetadataWriteRequest {
            tenant: TENANT.to_string(),
            object_type: ObjectType::Job,
            prior_version: Some(TagSelector {
                object_type: ObjectType::Job,
                object_id: own,
                object_criteria: ObjectCriteria::ObjectVersion(0),
                tag_criteria: TagCriteria::LatestTag,
            }),
            definition: Some(ObjectDefinition::Job(
                trac_metadata::object::JobDefinition::RunModel(
                    trac_metadata::object::RunModelJob {
                        model: TagSelector::latest(ObjectType::Data, other),
                        parameters: BTreeMap::new(),
                        inputs,
                        prior_outputs: BTreeMap::new(),
                    },
                ),
            )),
            tag_updates: Vec::new(),
        }
    };

    let mut batch = UniversalMetadataWriteBatchRequest::for_tenant(TENANT);
    batch.create_objects.push(job(a, b));
    batch.create_objects.push(job(b, a));

    let err = write.write_batch(&jane(), batch).await.unwrap_err();
    assert_eq!(err.kind, ErrorKind::ConsistencyValidation);
    assert!(err.details[0].message.contains("cycle"));
}

#[tokio::test]
async fn batch_with_a_bad_reference_commits_nothing() {
    let (write, read) = services().await;

    let mut batch = UniversalMetadataWriteBatchRequest::for_tenant(TENANT);
    batch.create_objects.push(create_request(basic_flow(), Vec::new()));
    batch.create_objects.push(create_request(
        ObjectDefinition::Data(DataDefinition {
            schema: SchemaSpec::Schema(table_schema(&[("f", BasicType::String)])),
            // Never created.
            storage_id: TagSelector::latest(ObjectType::Storage, Uuid::new_v4()),
        }),
        Vec::new(),
    ));

    let err = write.write_batch(&jane(), batch).await.unwrap_err();
    assert_eq!(err.kind, ErrorKind::ConsistencyValidation);

    // The flow from the failed batch is not visible.
    let response = read
        .search(MetadataSearchRequest {
            tenant: TENANT.to_string(),
            search_params: SearchParameters::new(
                ObjectType::Flow,
                SearchExpression::term(
                    attrs::ATTR_CREATE_USER_ID,
                    BasicType::String,
                    SearchOperator::Eq,
                    Value::String("jane.doe".into()),
                ),
            ),
        })
        .await
        .unwrap();
    assert!(response.search_results.is_empty());
}
