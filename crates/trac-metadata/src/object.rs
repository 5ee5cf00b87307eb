// SPDX-License-Identifier: Apache-2.0
//! Object definitions: the tagged union over object kinds.
//!
//! The catalog treats payloads as opaque apart from reference extraction:
//! [`ObjectDefinition::embedded_selectors`] is a per-variant table of the
//! selectors a payload carries, used for reference integrity and selector
//! normalisation. It is not a recursive payload walk; adding a variant means
//! adding its row to the table.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

use crate::identifiers::TagSelector;
use crate::typesystem::{BasicType, TypeDescriptor};
use crate::value::Value;

// ---------------------------------------------------------------------------
// ObjectType
// ---------------------------------------------------------------------------

/// Object kinds known to the catalog.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ObjectType {
    /// A data set: schema handle plus storage handle.
    Data,
    /// An executable model with declared parameters, inputs and outputs.
    Model,
    /// A calculation flow: node map and edge list.
    Flow,
    /// A job: references to the model or flow it runs and its inputs.
    Job,
    /// A stored file.
    File,
    /// A standalone schema.
    Schema,
    /// A storage handle: data items, incarnations and copies.
    Storage,
    /// Third-party payload with a client-owned schema.
    Custom,
    /// Platform configuration object.
    Config,
    /// Platform resource definition.
    Resource,
}

impl ObjectType {
    /// Stable wire name, e.g. `"SCHEMA"`.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Data => "DATA",
            Self::Model => "MODEL",
            Self::Flow => "FLOW",
            Self::Job => "JOB",
            Self::File => "FILE",
            Self::Schema => "SCHEMA",
            Self::Storage => "STORAGE",
            Self::Custom => "CUSTOM",
            Self::Config => "CONFIG",
            Self::Resource => "RESOURCE",
        }
    }

    /// All object types, for registries and exhaustive tests.
    pub const ALL: &'static [ObjectType] = &[
        Self::Data,
        Self::Model,
        Self::Flow,
        Self::Job,
        Self::File,
        Self::Schema,
        Self::Storage,
        Self::Custom,
        Self::Config,
        Self::Resource,
    ];
}

impl fmt::Display for ObjectType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for ObjectType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .iter()
            .find(|t| t.as_str() == s)
            .copied()
            .ok_or_else(|| format!("unknown object type [{s}]"))
    }
}

// ---------------------------------------------------------------------------
// Schema payloads
// ---------------------------------------------------------------------------

/// Kinds of schema the platform understands.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum SchemaType {
    /// A flat table of named, typed fields.
    Table,
}

/// One field of a table schema.
///
/// Field order is the position in the containing list; version compatibility
/// rules compare fields positionally.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FieldSchema {
    /// Field name; an ASCII identifier.
    pub field_name: String,
    /// Field value type; must be a primitive kind.
    pub field_type: BasicType,
    /// Optional human-readable label.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub label: Option<String>,
    /// Part of the business key.
    #[serde(default)]
    pub business_key: bool,
    /// Categorical dimension flag.
    #[serde(default)]
    pub categorical: bool,
    /// NOT NULL constraint flag.
    #[serde(default)]
    pub not_null: bool,
}

/// An ordered list of fields.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TableSchema {
    /// Fields in declaration order.
    pub fields: Vec<FieldSchema>,
}

/// A standalone schema object.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SchemaDefinition {
    /// The schema kind.
    pub schema_type: SchemaType,
    /// Table payload.
    pub table: TableSchema,
}

// ---------------------------------------------------------------------------
// Data payloads
// ---------------------------------------------------------------------------

/// The schema handle of a data set: a reference to a SCHEMA object or an
/// embedded schema definition.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum SchemaSpec {
    /// Reference to a SCHEMA object.
    SchemaId(TagSelector),
    /// Schema embedded directly in the data definition.
    Schema(SchemaDefinition),
}

/// A data set.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DataDefinition {
    /// Schema handle.
    #[serde(flatten)]
    pub schema: SchemaSpec,
    /// Storage handle; fixed across versions of one data object.
    pub storage_id: TagSelector,
}

// ---------------------------------------------------------------------------
// Model payloads
// ---------------------------------------------------------------------------

/// A declared model or flow parameter.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ModelParameter {
    /// Parameter value type.
    pub param_type: TypeDescriptor,
    /// Optional human-readable label.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub label: Option<String>,
}

/// A declared model or flow input.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ModelInputSchema {
    /// Expected input schema.
    pub schema: SchemaDefinition,
    /// Whether the input may be omitted at run time.
    #[serde(default)]
    pub optional: bool,
}

/// A declared model or flow output.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ModelOutputSchema {
    /// Produced output schema.
    pub schema: SchemaDefinition,
    /// Whether the output may be absent after a run.
    #[serde(default)]
    pub optional: bool,
}

/// An executable model.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ModelDefinition {
    /// Implementation language tag, e.g. `"python"`.
    pub language: String,
    /// Name of the model repository resource holding the code.
    pub repository: String,
    /// Path inside the repository.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub path: Option<String>,
    /// Entry point, e.g. a module-qualified class name.
    pub entry_point: String,
    /// Source version (commit, tag or package version).
    pub version: String,
    /// Declared parameters.
    #[serde(default)]
    pub parameters: BTreeMap<String, ModelParameter>,
    /// Declared inputs.
    #[serde(default)]
    pub inputs: BTreeMap<String, ModelInputSchema>,
    /// Declared outputs.
    #[serde(default)]
    pub outputs: BTreeMap<String, ModelOutputSchema>,
}

// ---------------------------------------------------------------------------
// Flow payloads
// ---------------------------------------------------------------------------

/// Kind of a flow node.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum FlowNodeType {
    /// An external input feeding the flow.
    Input,
    /// A terminal output of the flow.
    Output,
    /// A model execution step.
    Model,
    /// A parameter supplied at run time.
    Parameter,
}

/// One node in a flow graph.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FlowNode {
    /// Node kind.
    pub node_type: FlowNodeType,
    /// Parameter sockets (model nodes only).
    #[serde(default)]
    pub parameters: Vec<String>,
    /// Input sockets (model nodes only).
    #[serde(default)]
    pub inputs: Vec<String>,
    /// Output sockets (model nodes only).
    #[serde(default)]
    pub outputs: Vec<String>,
    /// Optional display label.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub label: Option<String>,
}

/// One endpoint of a flow edge: a node and, for model nodes, a socket.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FlowSocket {
    /// Node name.
    pub node: String,
    /// Socket name; absent for input / output / parameter nodes.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub socket: Option<String>,
}

impl fmt::Display for FlowSocket {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.socket {
            Some(socket) => write!(f, "{}.{}", self.node, socket),
            None => f.write_str(&self.node),
        }
    }
}

/// A directed connection between two flow sockets.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FlowEdge {
    /// Where the data comes from.
    pub source: FlowSocket,
    /// Where the data goes.
    pub target: FlowSocket,
}

/// A calculation flow.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FlowDefinition {
    /// Named nodes.
    pub nodes: BTreeMap<String, FlowNode>,
    /// Directed edges between node sockets.
    pub edges: Vec<FlowEdge>,
    /// Optional declared parameters.
    #[serde(default)]
    pub parameters: BTreeMap<String, ModelParameter>,
    /// Optional declared inputs.
    #[serde(default)]
    pub inputs: BTreeMap<String, ModelInputSchema>,
    /// Optional declared outputs.
    #[serde(default)]
    pub outputs: BTreeMap<String, ModelOutputSchema>,
}

// ---------------------------------------------------------------------------
// Job payloads
// ---------------------------------------------------------------------------

/// A model run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RunModelJob {
    /// The model to run.
    pub model: TagSelector,
    /// Parameter values keyed by declared parameter name.
    #[serde(default)]
    pub parameters: BTreeMap<String, Value>,
    /// Input data sets keyed by declared input name.
    #[serde(default)]
    pub inputs: BTreeMap<String, TagSelector>,
    /// Prior outputs to version over, keyed by declared output name.
    #[serde(default)]
    pub prior_outputs: BTreeMap<String, TagSelector>,
}

/// A flow run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RunFlowJob {
    /// The flow to run.
    pub flow: TagSelector,
    /// Models bound to the flow's model nodes.
    #[serde(default)]
    pub models: BTreeMap<String, TagSelector>,
    /// Parameter values keyed by declared parameter name.
    #[serde(default)]
    pub parameters: BTreeMap<String, Value>,
    /// Input data sets keyed by declared input name.
    #[serde(default)]
    pub inputs: BTreeMap<String, TagSelector>,
    /// Prior outputs to version over, keyed by declared output name.
    #[serde(default)]
    pub prior_outputs: BTreeMap<String, TagSelector>,
}

/// A model import from a repository resource.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ImportModelJob {
    /// Implementation language tag.
    pub language: String,
    /// Name of the model repository resource.
    pub repository: String,
    /// Path inside the repository.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub path: Option<String>,
    /// Entry point to import.
    pub entry_point: String,
    /// Source version to import.
    pub version: String,
}

/// A job definition, discriminated by job type.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "jobType")]
pub enum JobDefinition {
    /// Run a single model.
    #[serde(rename = "RUN_MODEL")]
    RunModel(RunModelJob),
    /// Run a flow.
    #[serde(rename = "RUN_FLOW")]
    RunFlow(RunFlowJob),
    /// Import a model from a repository.
    #[serde(rename = "IMPORT_MODEL")]
    ImportModel(ImportModelJob),
}

// ---------------------------------------------------------------------------
// File payloads
// ---------------------------------------------------------------------------

/// A stored file.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FileDefinition {
    /// Display name including extension.
    pub name: String,
    /// File extension without the leading dot; fixed across versions.
    pub extension: String,
    /// Declared MIME type.
    pub mime_type: String,
    /// Size in bytes.
    pub size: u64,
    /// Storage handle; fixed across versions of one file object.
    pub storage_id: TagSelector,
    /// The storage data item holding the file content.
    pub data_item: String,
}

// ---------------------------------------------------------------------------
// Storage payloads
// ---------------------------------------------------------------------------

/// Lifecycle status of a storage incarnation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum IncarnationStatus {
    /// Data is present and readable.
    IncarnationAvailable,
    /// Data has been expunged; this is terminal.
    IncarnationExpunged,
}

/// Lifecycle status of one physical copy.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum CopyStatus {
    /// Copy is present and readable.
    CopyAvailable,
    /// Copy has been expunged; this is terminal.
    CopyExpunged,
}

/// One physical copy of an incarnation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StorageCopy {
    /// Storage resource key the copy lives in.
    pub storage_key: String,
    /// Path within the storage resource.
    pub storage_path: String,
    /// Physical format tag.
    pub storage_format: String,
    /// Copy lifecycle status.
    pub copy_status: CopyStatus,
    /// When the copy reached its current status.
    pub copy_timestamp: DateTime<Utc>,
}

/// One incarnation of a data item.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StorageIncarnation {
    /// Monotonic incarnation index, starting at 0.
    pub incarnation_index: u32,
    /// When the incarnation was created.
    pub incarnation_timestamp: DateTime<Utc>,
    /// Incarnation lifecycle status.
    pub status: IncarnationStatus,
    /// Physical copies of this incarnation.
    pub copies: Vec<StorageCopy>,
}

/// All incarnations of one logical data item.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StorageItem {
    /// Incarnations in index order.
    pub incarnations: Vec<StorageIncarnation>,
}

/// A storage handle.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StorageDefinition {
    /// Data items keyed by item name.
    pub data_items: BTreeMap<String, StorageItem>,
}

// ---------------------------------------------------------------------------
// Custom / config / resource payloads
// ---------------------------------------------------------------------------

/// Third-party payload with a client-owned schema.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CustomDefinition {
    /// Client-owned schema type tag.
    pub custom_schema_type: String,
    /// Client-owned schema version.
    pub custom_schema_version: u32,
    /// Opaque payload.
    pub custom_data: serde_json::Value,
}

/// A platform configuration object.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ConfigDefinition {
    /// Configuration class tag.
    pub config_class: String,
    /// Configuration properties.
    #[serde(default)]
    pub properties: BTreeMap<String, String>,
}

/// Kinds of platform resource.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ResourceType {
    /// A source repository models are imported from.
    ModelRepository,
    /// A storage bucket managed by the platform.
    InternalStorage,
}

/// A platform resource definition.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ResourceDefinition {
    /// Resource kind.
    pub resource_type: ResourceType,
    /// Access protocol, e.g. `"git"` or `"s3"`.
    pub protocol: String,
    /// Backend properties (not exposed through public introspection).
    #[serde(default)]
    pub properties: BTreeMap<String, String>,
    /// Properties safe to expose to any client.
    #[serde(default)]
    pub public_properties: BTreeMap<String, String>,
    /// Secret references, resolved by name through the secret store.
    /// Values are aliases, never secret material.
    #[serde(default)]
    pub secrets: BTreeMap<String, String>,
}

// ---------------------------------------------------------------------------
// ObjectDefinition
// ---------------------------------------------------------------------------

/// The tagged union over object kinds; the discriminant is the object type.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "objectType")]
pub enum ObjectDefinition {
    /// A data set.
    #[serde(rename = "DATA")]
    Data(DataDefinition),
    /// An executable model.
    #[serde(rename = "MODEL")]
    Model(ModelDefinition),
    /// A calculation flow.
    #[serde(rename = "FLOW")]
    Flow(FlowDefinition),
    /// A job.
    #[serde(rename = "JOB")]
    Job(JobDefinition),
    /// A stored file.
    #[serde(rename = "FILE")]
    File(FileDefinition),
    /// A standalone schema.
    #[serde(rename = "SCHEMA")]
    Schema(SchemaDefinition),
    /// A storage handle.
    #[serde(rename = "STORAGE")]
    Storage(StorageDefinition),
    /// Third-party payload.
    #[serde(rename = "CUSTOM")]
    Custom(CustomDefinition),
    /// Platform configuration.
    #[serde(rename = "CONFIG")]
    Config(ConfigDefinition),
    /// Platform resource.
    #[serde(rename = "RESOURCE")]
    Resource(ResourceDefinition),
}

impl ObjectDefinition {
    /// The discriminant of this definition.
    pub fn object_type(&self) -> ObjectType {
        match self {
            Self::Data(_) => ObjectType::Data,
            Self::Model(_) => ObjectType::Model,
            Self::Flow(_) => ObjectType::Flow,
            Self::Job(_) => ObjectType::Job,
            Self::File(_) => ObjectType::File,
            Self::Schema(_) => ObjectType::Schema,
            Self::Storage(_) => ObjectType::Storage,
            Self::Custom(_) => ObjectType::Custom,
            Self::Config(_) => ObjectType::Config,
            Self::Resource(_) => ObjectType::Resource,
        }
    }

    /// Per-variant table of the selectors embedded in the payload.
    ///
    /// Variants with no references return an empty list.
    pub fn embedded_selectors(&self) -> Vec<&TagSelector> {
        match self {
            Self::Data(data) => {
                let mut refs = Vec::new();
                if let SchemaSpec::SchemaId(schema_id) = &data.schema {
                    refs.push(schema_id);
                }
                refs.push(&data.storage_id);
                refs
            }
            Self::File(file) => vec![&file.storage_id],
            Self::Job(job) => match job {
                JobDefinition::RunModel(run) => std::iter::once(&run.model)
                    .chain(run.inputs.values())
                    .chain(run.prior_outputs.values())
                    .collect(),
                JobDefinition::RunFlow(run) => std::iter::once(&run.flow)
                    .chain(run.models.values())
                    .chain(run.inputs.values())
                    .chain(run.prior_outputs.values())
                    .collect(),
                JobDefinition::ImportModel(_) => Vec::new(),
            },
            Self::Model(_)
            | Self::Flow(_)
            | Self::Schema(_)
            | Self::Storage(_)
            | Self::Custom(_)
            | Self::Config(_)
            | Self::Resource(_) => Vec::new(),
        }
    }

    /// Mutable access to the same per-variant reference table, used by the
    /// write path to normalise embedded selectors to fixed form.
    pub fn embedded_selectors_mut(&mut self) -> Vec<&mut TagSelector> {
        match self {
            Self::Data(data) => {
                let mut refs = Vec::new();
                if let SchemaSpec::SchemaId(schema_id) = &mut data.schema {
                    refs.push(schema_id);
                }
                refs.push(&mut data.storage_id);
                refs
            }
            Self::File(file) => vec![&mut file.storage_id],
            Self::Job(job) => match job {
                JobDefinition::RunModel(run) => std::iter::once(&mut run.model)
                    .chain(run.inputs.values_mut())
                    .chain(run.prior_outputs.values_mut())
                    .collect(),
                JobDefinition::RunFlow(run) => std::iter::once(&mut run.flow)
                    .chain(run.models.values_mut())
                    .chain(run.inputs.values_mut())
                    .chain(run.prior_outputs.values_mut())
                    .collect(),
                JobDefinition::ImportModel(_) => Vec::new(),
            },
            Self::Model(_)
            | Self::Flow(_)
            | Self::Schema(_)
            | Self::Storage(_)
            | Self::Custom(_)
            | Self::Config(_)
            | Self::Resource(_) => Vec::new(),
        }
    }
}
