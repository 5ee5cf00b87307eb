// SPDX-License-Identifier: Apache-2.0
//! Static validation of object definitions, one validator per variant.
//!
//! These run inside request validation, after the definition has been
//! matched against the declared object type. They check the shape of a
//! single payload; nothing here touches stored state.

use std::collections::{BTreeMap, HashMap, HashSet};

use trac_metadata::identifiers::TagSelector;
use trac_metadata::object::{
    ConfigDefinition, CustomDefinition, DataDefinition, FileDefinition, FlowDefinition,
    FlowNodeType, ImportModelJob, JobDefinition, ModelDefinition, ObjectDefinition, ObjectType,
    ResourceDefinition, RunFlowJob, RunModelJob, SchemaDefinition, SchemaSpec, StorageDefinition,
};

use crate::checks;
use crate::context::ValidationContext;

/// Validate a definition against the declared object type, then dispatch to
/// the variant's validator.
pub fn object_definition(
    ctx: &mut ValidationContext,
    declared: ObjectType,
    definition: &ObjectDefinition,
) {
    if definition.object_type() != declared {
        ctx.error(format!(
            "definition is of type {} but the request declares {}",
            definition.object_type(),
            declared
        ));
        return;
    }

    match definition {
        ObjectDefinition::Data(data) => data_definition(ctx, data),
        ObjectDefinition::Model(model) => model_definition(ctx, model),
        ObjectDefinition::Flow(flow) => flow_definition(ctx, flow),
        ObjectDefinition::Job(job) => job_definition(ctx, job),
        ObjectDefinition::File(file) => file_definition(ctx, file),
        ObjectDefinition::Schema(schema) => schema_definition(ctx, schema),
        ObjectDefinition::Storage(storage) => storage_definition(ctx, storage),
        ObjectDefinition::Custom(custom) => custom_definition(ctx, custom),
        ObjectDefinition::Config(config) => config_definition(ctx, config),
        ObjectDefinition::Resource(resource) => resource_definition(ctx, resource),
    }
}

/// Shape checks for selectors embedded in definitions and requests.
pub fn tag_selector(ctx: &mut ValidationContext, selector: &TagSelector) {
    use trac_metadata::identifiers::{ObjectCriteria, TagCriteria};

    if selector.object_id.is_nil() {
        ctx.push("objectId");
        ctx.error("object id must not be the nil UUID");
        ctx.pop();
    }
    if let ObjectCriteria::ObjectVersion(0) = selector.object_criteria {
        ctx.push("objectVersion");
        ctx.error("object version must be at least 1");
        ctx.pop();
    }
    if let TagCriteria::TagVersion(0) = selector.tag_criteria {
        ctx.push("tagVersion");
        ctx.error("tag version must be at least 1");
        ctx.pop();
    }
}

fn typed_selector(
    ctx: &mut ValidationContext,
    field: &str,
    expected: ObjectType,
    selector: &TagSelector,
) {
    ctx.push(field);
    ctx.apply(tag_selector, selector);
    if ctx.is_active() && selector.object_type != expected {
        ctx.error(format!(
            "selector must reference a {expected} object, not {}",
            selector.object_type
        ));
    }
    ctx.pop();
}

// ---------------------------------------------------------------------------
// SCHEMA
// ---------------------------------------------------------------------------

/// Field lists must be non-empty, names unique case-insensitively, types
/// primitive.
pub fn schema_definition(ctx: &mut ValidationContext, schema: &SchemaDefinition) {
    ctx.push("table");
    ctx.push("fields");
    ctx.apply(checks::list_not_empty, schema.table.fields.as_slice());
    ctx.apply(
        |ctx, fields: &[trac_metadata::object::FieldSchema]| {
            checks::case_insensitive_duplicates(ctx, fields.iter().map(|f| f.field_name.as_str()));
        },
        schema.table.fields.as_slice(),
    );

    for (index, field) in schema.table.fields.iter().enumerate() {
        ctx.push_index(index);

        ctx.push("fieldName");
        ctx.apply(checks::non_empty, field.field_name.as_str());
        ctx.apply(checks::identifier, field.field_name.as_str());
        ctx.pop();

        ctx.push("fieldType");
        if ctx.is_active() && !field.field_type.is_primitive() {
            ctx.error(format!("field type {} is not primitive", field.field_type));
        }
        ctx.pop();

        if let Some(label) = &field.label {
            ctx.apply_at("label", checks::label_length_limit, label.as_str());
        }

        ctx.pop();
    }

    ctx.pop();
    ctx.pop();
}

// ---------------------------------------------------------------------------
// DATA
// ---------------------------------------------------------------------------

fn data_definition(ctx: &mut ValidationContext, data: &DataDefinition) {
    match &data.schema {
        SchemaSpec::SchemaId(schema_id) => {
            typed_selector(ctx, "schemaId", ObjectType::Schema, schema_id);
        }
        SchemaSpec::Schema(embedded) => {
            ctx.push("schema");
            ctx.apply(schema_definition, embedded);
            ctx.pop();
        }
    }
    typed_selector(ctx, "storageId", ObjectType::Storage, &data.storage_id);
}

// ---------------------------------------------------------------------------
// MODEL
// ---------------------------------------------------------------------------

fn model_definition(ctx: &mut ValidationContext, model: &ModelDefinition) {
    ctx.apply_at("language", checks::non_empty, model.language.as_str());
    ctx.apply_at("repository", checks::non_empty, model.repository.as_str());
    ctx.apply_at("entryPoint", checks::non_empty, model.entry_point.as_str());
    ctx.apply_at("version", checks::non_empty, model.version.as_str());
    if let Some(path) = &model.path {
        ctx.apply_at("path", checks::relative_path, path.as_str());
    }

    // One namespace across parameters, inputs and outputs.
    let names = model
        .parameters
        .keys()
        .chain(model.inputs.keys())
        .chain(model.outputs.keys());
    checks::case_insensitive_duplicates(ctx, names.map(String::as_str));

    ctx.push("parameters");
    for (name, parameter) in &model.parameters {
        ctx.push_map_key(name);
        ctx.apply(checks::identifier, name.as_str());
        ctx.apply(checks::not_trac_reserved, name.as_str());
        ctx.apply_at("paramType", checks::primitive_type, &parameter.param_type);
        if let Some(label) = &parameter.label {
            ctx.apply_at("label", checks::label_length_limit, label.as_str());
        }
        ctx.pop();
    }
    ctx.pop();

    ctx.push("inputs");
    for (name, input) in &model.inputs {
        ctx.push_map_key(name);
        ctx.apply(checks::identifier, name.as_str());
        ctx.apply(checks::not_trac_reserved, name.as_str());
        ctx.apply_at("schema", schema_definition, &input.schema);
        ctx.pop();
    }
    ctx.pop();

    ctx.push("outputs");
    for (name, output) in &model.outputs {
        ctx.push_map_key(name);
        ctx.apply(checks::identifier, name.as_str());
        ctx.apply(checks::not_trac_reserved, name.as_str());
        ctx.apply_at("schema", schema_definition, &output.schema);
        ctx.pop();
    }
    ctx.pop();
}

// ---------------------------------------------------------------------------
// FLOW
// ---------------------------------------------------------------------------

/// Full semantic validation of a flow graph.
///
/// Checks, in order: node shape; edge endpoints (dangling nodes and
/// sockets); wiring (each model input and parameter wired exactly once,
/// each output node fed exactly once); liveness (no unused inputs, every
/// model output consumed); acyclicity; and consistency between the node map
/// and any declared input / output / parameter lists.
pub fn flow_definition(ctx: &mut ValidationContext, flow: &FlowDefinition) {
    let failures_before = ctx.failures().len();

    ctx.push("nodes");
    ctx.apply(checks::map_not_empty, &flow.nodes);
    for (name, node) in &flow.nodes {
        ctx.push_map_key(name);
        ctx.apply(checks::identifier, name.as_str());
        match node.node_type {
            FlowNodeType::Model => {
                let sockets = node
                    .parameters
                    .iter()
                    .chain(&node.inputs)
                    .chain(&node.outputs);
                checks::case_insensitive_duplicates(ctx, sockets.map(String::as_str));
                if ctx.is_active() && node.outputs.is_empty() {
                    ctx.error("model node must declare at least one output");
                }
            }
            _ => {
                if ctx.is_active()
                    && !(node.parameters.is_empty()
                        && node.inputs.is_empty()
                        && node.outputs.is_empty())
                {
                    ctx.error("only model nodes declare sockets");
                }
            }
        }
        ctx.pop();
    }
    ctx.pop();

    // Graph analysis below assumes structurally sound nodes.
    if ctx.failures().len() > failures_before {
        return;
    }

    flow_edges(ctx, flow);
    flow_consistency(ctx, flow);
}

fn flow_edges(ctx: &mut ValidationContext, flow: &FlowDefinition) {
    use trac_metadata::object::FlowSocket;

    // target socket -> how many edges feed it
    let mut fed: HashMap<(String, Option<String>), usize> = HashMap::new();
    // nodes (and model output sockets) with at least one outgoing edge
    let mut consumed_sources: HashSet<(String, Option<String>)> = HashSet::new();
    let mut node_edges: Vec<(String, String)> = Vec::new();

    let socket_key = |s: &FlowSocket| (s.node.clone(), s.socket.clone());

    ctx.push("edges");
    for (index, edge) in flow.edges.iter().enumerate() {
        ctx.push_index(index);

        let source_ok = flow_socket(ctx, "source", flow, &edge.source, SocketSide::Source);
        let target_ok = flow_socket(ctx, "target", flow, &edge.target, SocketSide::Target);

        if source_ok && target_ok {
            if edge.source.node == edge.target.node {
                ctx.error(format!(
                    "edge connects node [{}] to itself",
                    edge.source.node
                ));
            } else {
                *fed.entry(socket_key(&edge.target)).or_insert(0) += 1;
                consumed_sources.insert(socket_key(&edge.source));
                node_edges.push((edge.source.node.clone(), edge.target.node.clone()));
            }
        }

        ctx.pop();
    }

    for ((node, socket), count) in &fed {
        if *count > 1 {
            let target = match socket {
                Some(socket) => format!("{node}.{socket}"),
                None => node.clone(),
            };
            ctx.error(format!("[{target}] is supplied by more than one edge"));
        }
    }
    ctx.pop();

    // Wiring and liveness, per node.
    ctx.push("nodes");
    for (name, node) in &flow.nodes {
        ctx.push_map_key(name);
        match node.node_type {
            FlowNodeType::Input => {
                if !consumed_sources.contains(&(name.clone(), None)) {
                    ctx.error(format!("input node [{name}] is not used by any edge"));
                }
            }
            FlowNodeType::Parameter => {
                if !consumed_sources.contains(&(name.clone(), None)) {
                    ctx.error(format!("parameter node [{name}] is not used by any edge"));
                }
            }
            FlowNodeType::Output => {
                if !fed.contains_key(&(name.clone(), None)) {
                    ctx.error(format!("output node [{name}] is not supplied by any edge"));
                }
            }
            FlowNodeType::Model => {
                for socket in node.inputs.iter().chain(&node.parameters) {
                    if !fed.contains_key(&(name.clone(), Some(socket.clone()))) {
                        ctx.error(format!("model input [{name}.{socket}] is not connected"));
                    }
                }
                for socket in &node.outputs {
                    if !consumed_sources.contains(&(name.clone(), Some(socket.clone()))) {
                        ctx.error(format!("model output [{name}.{socket}] is not used"));
                    }
                }
            }
        }
        ctx.pop();
    }
    ctx.pop();

    flow_cycles(ctx, flow, &node_edges);
}

enum SocketSide {
    Source,
    Target,
}

fn flow_socket(
    ctx: &mut ValidationContext,
    field: &str,
    flow: &FlowDefinition,
    socket: &trac_metadata::object::FlowSocket,
    side: SocketSide,
) -> bool {
    ctx.push(field);
    let before = ctx.failures().len();

    match flow.nodes.get(&socket.node) {
        None => {
            ctx.error(format!("edge references missing node [{}]", socket.node));
        }
        Some(node) => match (node.node_type, &side) {
            (FlowNodeType::Input | FlowNodeType::Parameter, SocketSide::Source)
            | (FlowNodeType::Output, SocketSide::Target) => {
                if socket.socket.is_some() {
                    ctx.error(format!(
                        "node [{}] does not have named sockets",
                        socket.node
                    ));
                }
            }
            (FlowNodeType::Input | FlowNodeType::Parameter, SocketSide::Target) => {
                ctx.error(format!(
                    "node [{}] cannot be the target of an edge",
                    socket.node
                ));
            }
            (FlowNodeType::Output, SocketSide::Source) => {
                ctx.error(format!(
                    "node [{}] cannot be the source of an edge",
                    socket.node
                ));
            }
            (FlowNodeType::Model, side) => {
                let declared = match side {
                    SocketSide::Source => &node.outputs,
                    SocketSide::Target => {
                        // Model targets are inputs or parameters.
                        match &socket.socket {
                            Some(name) if node.parameters.contains(name) => &node.parameters,
                            _ => &node.inputs,
                        }
                    }
                };
                match &socket.socket {
                    None => {
                        ctx.error(format!(
                            "edges to and from model node [{}] must name a socket",
                            socket.node
                        ));
                    }
                    Some(name) if !declared.contains(name) => {
                        ctx.error(format!(
                            "node [{}] has no socket named [{name}]",
                            socket.node
                        ));
                    }
                    Some(_) => {}
                }
            }
        },
    }

    let ok = ctx.failures().len() == before;
    ctx.pop();
    ok
}

/// Kahn's algorithm over the node-level graph; anything left unprocessed
/// sits on a cycle.
fn flow_cycles(ctx: &mut ValidationContext, flow: &FlowDefinition, edges: &[(String, String)]) {
    let mut in_degree: BTreeMap<&str, usize> =
        flow.nodes.keys().map(|name| (name.as_str(), 0)).collect();
    let mut adjacency: BTreeMap<&str, Vec<&str>> = BTreeMap::new();

    for (source, target) in edges {
        adjacency.entry(source.as_str()).or_default().push(target);
        *in_degree.entry(target.as_str()).or_insert(0) += 1;
    }

    let mut queue: Vec<&str> = in_degree
        .iter()
        .filter(|(_, d)| **d == 0)
        .map(|(n, _)| *n)
        .collect();
    let mut processed = 0usize;

    while let Some(node) = queue.pop() {
        processed += 1;
        for next in adjacency.get(node).into_iter().flatten() {
            let degree = in_degree.get_mut(next).expect("edge endpoints verified");
            *degree -= 1;
            if *degree == 0 {
                queue.push(next);
            }
        }
    }

    if processed < flow.nodes.len() {
        let mut cyclic: Vec<&str> = in_degree
            .iter()
            .filter(|(_, d)| **d > 0)
            .map(|(n, _)| *n)
            .collect();
        cyclic.sort_unstable();
        ctx.push("edges");
        ctx.error(format!(
            "flow contains a cycle involving [{}]",
            cyclic.join(", ")
        ));
        ctx.pop();
    }
}

/// Declared inputs / outputs / parameters must line up with the node map,
/// when declared at all.
fn flow_consistency(ctx: &mut ValidationContext, flow: &FlowDefinition) {
    let nodes_of = |wanted: FlowNodeType| -> HashSet<&str> {
        flow.nodes
            .iter()
            .filter(|(_, n)| n.node_type == wanted)
            .map(|(name, _)| name.as_str())
            .collect()
    };

    let mut check = |field: &str, declared: HashSet<&str>, actual: HashSet<&str>, kind: &str| {
        if declared.is_empty() {
            return;
        }
        ctx.push(field);
        for name in declared.difference(&actual) {
            ctx.error(format!("declared {kind} [{name}] has no matching node"));
        }
        for name in actual.difference(&declared) {
            ctx.error(format!("{kind} node [{name}] is not declared"));
        }
        ctx.pop();
    };

    check(
        "inputs",
        flow.inputs.keys().map(String::as_str).collect(),
        nodes_of(FlowNodeType::Input),
        "input",
    );
    check(
        "outputs",
        flow.outputs.keys().map(String::as_str).collect(),
        nodes_of(FlowNodeType::Output),
        "output",
    );
    check(
        "parameters",
        flow.parameters.keys().map(String::as_str).collect(),
        nodes_of(FlowNodeType::Parameter),
        "parameter",
    );
}

// ---------------------------------------------------------------------------
// JOB
// ---------------------------------------------------------------------------

fn job_definition(ctx: &mut ValidationContext, job: &JobDefinition) {
    match job {
        JobDefinition::RunModel(run) => run_model_job(ctx, run),
        JobDefinition::RunFlow(run) => run_flow_job(ctx, run),
        JobDefinition::ImportModel(import) => import_model_job(ctx, import),
    }
}

fn job_parameters(
    ctx: &mut ValidationContext,
    parameters: &BTreeMap<String, trac_metadata::Value>,
) {
    ctx.push("parameters");
    for (name, value) in parameters {
        ctx.push_map_key(name);
        ctx.apply(checks::identifier, name.as_str());
        ctx.apply(checks::primitive_value, value);
        ctx.pop();
    }
    ctx.pop();
}

fn selector_map(
    ctx: &mut ValidationContext,
    field: &str,
    expected: ObjectType,
    selectors: &BTreeMap<String, TagSelector>,
) {
    ctx.push(field);
    for (name, selector) in selectors {
        ctx.push_map_key(name);
        ctx.apply(checks::identifier, name.as_str());
        if ctx.is_active() && selector.object_type != expected {
            ctx.error(format!(
                "selector must reference a {expected} object, not {}",
                selector.object_type
            ));
        }
        ctx.apply(tag_selector, selector);
        ctx.pop();
    }
    ctx.pop();
}

fn run_model_job(ctx: &mut ValidationContext, run: &RunModelJob) {
    typed_selector(ctx, "model", ObjectType::Model, &run.model);
    job_parameters(ctx, &run.parameters);
    selector_map(ctx, "inputs", ObjectType::Data, &run.inputs);
    selector_map(ctx, "priorOutputs", ObjectType::Data, &run.prior_outputs);
}

fn run_flow_job(ctx: &mut ValidationContext, run: &RunFlowJob) {
    typed_selector(ctx, "flow", ObjectType::Flow, &run.flow);
    selector_map(ctx, "models", ObjectType::Model, &run.models);
    job_parameters(ctx, &run.parameters);
    selector_map(ctx, "inputs", ObjectType::Data, &run.inputs);
    selector_map(ctx, "priorOutputs", ObjectType::Data, &run.prior_outputs);
}

fn import_model_job(ctx: &mut ValidationContext, import: &ImportModelJob) {
    ctx.apply_at("language", checks::non_empty, import.language.as_str());
    ctx.apply_at("repository", checks::non_empty, import.repository.as_str());
    ctx.apply_at("entryPoint", checks::non_empty, import.entry_point.as_str());
    ctx.apply_at("version", checks::non_empty, import.version.as_str());
    if let Some(path) = &import.path {
        ctx.apply_at("path", checks::relative_path, path.as_str());
    }
}

// ---------------------------------------------------------------------------
// FILE
// ---------------------------------------------------------------------------

fn file_definition(ctx: &mut ValidationContext, file: &FileDefinition) {
    ctx.apply_at("name", checks::file_name, file.name.as_str());
    ctx.push("extension");
    ctx.apply(checks::non_empty, file.extension.as_str());
    if ctx.is_active() && !file.name.ends_with(&format!(".{}", file.extension)) {
        ctx.error(format!(
            "extension [{}] does not match the file name [{}]",
            file.extension, file.name
        ));
    }
    ctx.pop();
    ctx.apply_at("mimeType", checks::mime_type, file.mime_type.as_str());
    typed_selector(ctx, "storageId", ObjectType::Storage, &file.storage_id);
    ctx.apply_at("dataItem", checks::non_empty, file.data_item.as_str());
}

// ---------------------------------------------------------------------------
// STORAGE
// ---------------------------------------------------------------------------

fn storage_definition(ctx: &mut ValidationContext, storage: &StorageDefinition) {
    ctx.push("dataItems");
    for (item_name, item) in &storage.data_items {
        ctx.push_map_key(item_name);
        ctx.apply(checks::non_empty, item_name.as_str());
        ctx.push("incarnations");
        ctx.apply(checks::list_not_empty, item.incarnations.as_slice());
        for (index, incarnation) in item.incarnations.iter().enumerate() {
            ctx.push_index(index);
            if ctx.is_active() && incarnation.incarnation_index as usize != index {
                ctx.error(format!(
                    "incarnation index {} is out of sequence",
                    incarnation.incarnation_index
                ));
            }
            ctx.push("copies");
            ctx.apply(checks::list_not_empty, incarnation.copies.as_slice());
            for (copy_index, copy) in incarnation.copies.iter().enumerate() {
                ctx.push_index(copy_index);
                ctx.apply_at("storageKey", checks::non_empty, copy.storage_key.as_str());
                ctx.apply_at(
                    "storagePath",
                    checks::relative_path,
                    copy.storage_path.as_str(),
                );
                ctx.apply_at(
                    "storageFormat",
                    checks::non_empty,
                    copy.storage_format.as_str(),
                );
                ctx.pop();
            }
            ctx.pop();
            ctx.pop();
        }
        ctx.pop();
        ctx.pop();
    }
    ctx.pop();
}

// ---------------------------------------------------------------------------
// CUSTOM / CONFIG / RESOURCE
// ---------------------------------------------------------------------------

fn custom_definition(ctx: &mut ValidationContext, custom: &CustomDefinition) {
    ctx.apply_at(
        "customSchemaType",
        checks::non_empty,
        custom.custom_schema_type.as_str(),
    );
    ctx.push("customSchemaVersion");
    if ctx.is_active() && custom.custom_schema_version == 0 {
        ctx.error("custom schema version must be at least 1");
    }
    ctx.pop();
}

fn config_definition(ctx: &mut ValidationContext, config: &ConfigDefinition) {
    ctx.apply_at("configClass", checks::non_empty, config.config_class.as_str());
    ctx.push("properties");
    for key in config.properties.keys() {
        ctx.push_map_key(key);
        ctx.apply(checks::identifier, key.as_str());
        ctx.pop();
    }
    ctx.pop();
}

fn resource_definition(ctx: &mut ValidationContext, resource: &ResourceDefinition) {
    ctx.apply_at("protocol", checks::non_empty, resource.protocol.as_str());
    ctx.push("secrets");
    for (name, alias) in &resource.secrets {
        ctx.push_map_key(name);
        ctx.apply(checks::identifier, name.as_str());
        ctx.apply(checks::non_empty, alias.as_str());
        ctx.pop();
    }
    ctx.pop();
}
