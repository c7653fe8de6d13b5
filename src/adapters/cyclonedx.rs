//! CycloneDX Adapter
//!
//! Components, external references, the dependency tree and vulnerabilities
//! become nodes. Containment and dependency edges match by node id;
//! `AFFECTS` matches components through their `bom-ref` property.

use super::{
    keyed_batches, merge_into, object_at, records_at, rename, DocumentContext, EdgeLabel, NodeLabel,
    SbomAdapter,
};
use crate::batch_writer::{EdgeBatch, EdgeRow, NodeBatch};
use crate::error::{IngestError, IngestResult};
use crate::format::SbomFormat;
use crate::identity::{key_text, node_id};
use crate::sanitizer::Record;
use serde_json::Value;
use std::collections::HashSet;

#[derive(Debug, Clone, Copy, Default)]
pub struct CycloneDxAdapter;

/// A component found anywhere in the `components` tree.
struct ComponentEntry {
    record: Record,
    /// `None` for top-level components.
    parent_name: Option<Value>,
    nested: bool,
}

fn key_of<'a>(record: &'a Record, field: &str) -> Option<&'a Value> {
    record.get(field).filter(|value| !value.is_null())
}

fn flatten_components(
    components: Vec<Record>,
    parent: Option<&Value>,
    out: &mut Vec<ComponentEntry>,
) -> IngestResult<()> {
    for component in components {
        let children = records_at(&component, "components")?;
        let name = key_of(&component, "name").cloned();
        out.push(ComponentEntry {
            record: component,
            parent_name: parent.cloned(),
            nested: parent.is_some(),
        });
        if !children.is_empty() {
            // Children of an unnamed parent still get nodes, just no PART_OF.
            let orphan = Value::Null;
            flatten_components(children, Some(name.as_ref().unwrap_or(&orphan)), out)?;
        }
    }
    Ok(())
}

fn all_components(document: &Record) -> IngestResult<Vec<ComponentEntry>> {
    let mut entries = Vec::new();
    flatten_components(records_at(document, "components")?, None, &mut entries)?;
    Ok(entries)
}

fn described_component(document: &Record) -> IngestResult<Option<&Record>> {
    match object_at(document, "metadata")? {
        Some(metadata) => object_at(metadata, "component"),
        None => Ok(None),
    }
}

fn depends_on(dependency: &Record) -> IngestResult<Vec<Value>> {
    match dependency.get("dependsOn") {
        None | Some(Value::Null) => Ok(Vec::new()),
        Some(Value::Array(targets)) => Ok(targets.clone()),
        Some(other) => Err(IngestError::InvalidDocument(format!(
            "'dependsOn' must be an array, found {}",
            other
        ))),
    }
}

impl CycloneDxAdapter {
    /// Document fields flattened with `metadata` and the described component.
    fn document_record(&self, document: &Record, ctx: &DocumentContext) -> IngestResult<Record> {
        let mut record = document.clone();
        if let Some(metadata) = object_at(document, "metadata")? {
            merge_into(&mut record, metadata);
            if let Some(component) = object_at(metadata, "component")? {
                merge_into(&mut record, component);
            }
        }
        rename(&mut record, "bomFormat", "format");
        rename(&mut record, "specVersion", "spec_version");
        rename(&mut record, "timestamp", "created_at");
        record.insert("ingested_at".to_string(), Value::String(ctx.ingested_at.to_rfc3339()));
        Ok(record)
    }

    fn dependency_stubs(&self, dependencies: &[Record]) -> IngestResult<Vec<Record>> {
        let mut seen = HashSet::new();
        let mut stubs = Vec::new();
        for dependency in dependencies {
            for target in depends_on(dependency)? {
                if seen.insert(key_text(&target)) {
                    let mut stub = Record::new();
                    stub.insert("ref".to_string(), target);
                    stubs.push(stub);
                }
            }
        }
        Ok(stubs)
    }
}

impl SbomAdapter for CycloneDxAdapter {
    fn format(&self) -> SbomFormat {
        SbomFormat::CycloneDx
    }

    fn node_batches(&self, document: &Record, ctx: &DocumentContext) -> IngestResult<Vec<NodeBatch>> {
        let component = NodeLabel::Component.as_str();
        let dependency = NodeLabel::Dependency.as_str();

        let mut batches = vec![NodeBatch::fixed(
            NodeLabel::Document.as_str(),
            &ctx.document_id,
            self.document_record(document, ctx)?,
        )];

        if let Some(subject) = described_component(document)? {
            batches.push(NodeBatch::keyed(component, "name", vec![subject.clone()]));
        }

        let components = all_components(document)?;
        let mut references = Vec::new();
        for entry in &components {
            references.extend(records_at(&entry.record, "externalReferences")?);
        }
        batches.extend(keyed_batches(
            component,
            "name",
            components.into_iter().map(|entry| entry.record).collect(),
        ));
        batches.extend(keyed_batches(NodeLabel::ExternalReference.as_str(), "url", references));

        let dependencies = records_at(document, "dependencies")?;
        let stubs = self.dependency_stubs(&dependencies)?;
        batches.extend(keyed_batches(dependency, "ref", dependencies));
        batches.extend(keyed_batches(dependency, "ref", stubs));

        batches.extend(keyed_batches(
            NodeLabel::Vulnerability.as_str(),
            "id",
            records_at(document, "vulnerabilities")?,
        ));

        Ok(batches)
    }

    fn edge_batches(&self, document: &Record, ctx: &DocumentContext) -> IngestResult<Vec<EdgeBatch>> {
        let component = NodeLabel::Component.as_str();
        let dependency = NodeLabel::Dependency.as_str();
        let document_id = ctx.document_id.as_str();

        let mut describes = Vec::new();
        if let Some(name) = described_component(document)?.and_then(|subject| key_of(subject, "name")) {
            describes.push(EdgeRow::new(document_id, node_id(component, name)));
        }

        let mut part_of = Vec::new();
        let mut refers_to = Vec::new();
        for entry in all_components(document)? {
            let Some(name) = key_of(&entry.record, "name") else { continue };
            let component_id = node_id(component, name);

            match (&entry.parent_name, entry.nested) {
                (None, false) => part_of.push(EdgeRow::new(document_id, component_id.clone())),
                (Some(parent), true) if !parent.is_null() => {
                    part_of.push(EdgeRow::new(node_id(component, parent), component_id.clone()))
                }
                _ => {}
            }

            for reference in records_at(&entry.record, "externalReferences")? {
                if let Some(url) = key_of(&reference, "url") {
                    refers_to.push(EdgeRow::new(
                        component_id.clone(),
                        node_id(NodeLabel::ExternalReference.as_str(), url),
                    ));
                }
            }
        }

        let mut uses = Vec::new();
        let mut depends = Vec::new();
        for dep in records_at(document, "dependencies")? {
            let Some(reference) = key_of(&dep, "ref") else { continue };
            let dependency_id = node_id(dependency, reference);
            uses.push(EdgeRow::new(document_id, dependency_id.clone()));
            for target in depends_on(&dep)? {
                depends.push(EdgeRow::new(dependency_id.clone(), node_id(dependency, &target)));
            }
        }

        let mut affects = Vec::new();
        for vulnerability in records_at(document, "vulnerabilities")? {
            let Some(id) = key_of(&vulnerability, "id") else { continue };
            for affected in records_at(&vulnerability, "affects")? {
                if let Some(reference) = key_of(&affected, "ref") {
                    affects.push(EdgeRow::new(id.clone(), reference.clone()));
                }
            }
        }

        Ok(vec![
            EdgeBatch::by_id(EdgeLabel::Describes.as_str(), describes),
            EdgeBatch::by_id(EdgeLabel::PartOf.as_str(), part_of),
            EdgeBatch::by_id(EdgeLabel::RefersTo.as_str(), refers_to),
            EdgeBatch::by_id(EdgeLabel::Uses.as_str(), uses),
            EdgeBatch::by_id(EdgeLabel::DependsOn.as_str(), depends),
            EdgeBatch::by_property(EdgeLabel::Affects.as_str(), "id", "bom-ref", affects),
        ])
    }
}
