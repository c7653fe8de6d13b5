//! SPDX Adapter
//!
//! Packages become `component` nodes with the same shape and key as
//! CycloneDX components. Relationships reference elements by `SPDXID`, so
//! `DESCRIBES` edges match the target by that property and the document by
//! its `` `~id` `` property.

use super::{
    keyed_batches, merge_into, object_at, records_at, rename, DocumentContext, EdgeLabel, NodeLabel,
    SbomAdapter,
};
use crate::batch_writer::{EdgeBatch, EdgeRow, NodeBatch, ID_PROPERTY};
use crate::error::IngestResult;
use crate::format::SbomFormat;
use crate::identity::node_id;
use crate::sanitizer::Record;
use serde_json::Value;

pub const SPDX_ELEMENT_PROPERTY: &str = "SPDXID";

#[derive(Debug, Clone, Copy, Default)]
pub struct SpdxAdapter;

impl SpdxAdapter {
    fn document_record(&self, document: &Record, ctx: &DocumentContext) -> IngestResult<Record> {
        let mut record = document.clone();
        if let Some(creation_info) = object_at(document, "creationInfo")? {
            merge_into(&mut record, creation_info);
        }
        rename(&mut record, "spdxVersion", "spec_version");
        rename(&mut record, "created", "created_at");
        record.insert("format".to_string(), Value::String(SbomFormat::Spdx.as_str().to_string()));
        record.insert("ingested_at".to_string(), Value::String(ctx.ingested_at.to_rfc3339()));
        Ok(record)
    }

    /// A package in the component shape shared with CycloneDX.
    fn component_record(&self, package: &Record) -> Record {
        let mut record = package.clone();
        rename(&mut record, "versionInfo", "version");
        rename(&mut record, "primaryPackagePurpose", "type");
        record
    }
}

impl SbomAdapter for SpdxAdapter {
    fn format(&self) -> SbomFormat {
        SbomFormat::Spdx
    }

    fn node_batches(&self, document: &Record, ctx: &DocumentContext) -> IngestResult<Vec<NodeBatch>> {
        let packages = records_at(document, "packages")?;
        let mut references = Vec::new();
        for package in &packages {
            references.extend(records_at(package, "externalRefs")?);
        }

        let components = packages.iter().map(|package| self.component_record(package)).collect();

        let mut batches = vec![NodeBatch::fixed(
            NodeLabel::Document.as_str(),
            &ctx.document_id,
            self.document_record(document, ctx)?,
        )];
        batches.extend(keyed_batches(NodeLabel::Component.as_str(), "name", components));
        batches.extend(keyed_batches(
            NodeLabel::ExternalReference.as_str(),
            "referenceLocator",
            references,
        ));
        Ok(batches)
    }

    fn edge_batches(&self, document: &Record, ctx: &DocumentContext) -> IngestResult<Vec<EdgeBatch>> {
        let component = NodeLabel::Component.as_str();

        let mut refers_to = Vec::new();
        for package in records_at(document, "packages")? {
            let Some(name) = package.get("name").filter(|v| !v.is_null()) else { continue };
            let component_id = node_id(component, name);
            for reference in records_at(&package, "externalRefs")? {
                if let Some(locator) = reference.get("referenceLocator").filter(|v| !v.is_null()) {
                    refers_to.push(EdgeRow::new(
                        component_id.clone(),
                        node_id(NodeLabel::ExternalReference.as_str(), locator),
                    ));
                }
            }
        }

        let describes: Vec<EdgeRow> = records_at(document, "relationships")?
            .iter()
            .filter_map(|relationship| relationship.get("relatedSpdxElement"))
            .filter(|element| !element.is_null())
            .map(|element| EdgeRow::new(ctx.document_id.as_str(), element.clone()))
            .collect();

        Ok(vec![
            EdgeBatch::by_id(EdgeLabel::RefersTo.as_str(), refers_to),
            EdgeBatch::by_property(
                EdgeLabel::Describes.as_str(),
                ID_PROPERTY,
                SPDX_ELEMENT_PROPERTY,
                describes,
            ),
        ])
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::batch_writer::EndpointMatch;
    use serde_json::json;

    fn ctx() -> DocumentContext {
        DocumentContext {
            document_id: "document_spdx".to_string(),
            ingested_at: chrono::Utc::now(),
        }
    }

    fn sample() -> Record {
        json!({
            "spdxVersion": "SPDX-2.3",
            "dataLicense": "CC0-1.0",
            "SPDXID": "SPDXRef-DOCUMENT",
            "name": "alpine-3.19",
            "documentNamespace": "https://anchore.com/syft/image/alpine-3.19",
            "creationInfo": {
                "created": "2024-01-10T10:00:00Z",
                "creators": ["Tool: syft-0.99.0"],
                "licenseListVersion": "3.22"
            },
            "packages": [
                {
                    "name": "musl",
                    "SPDXID": "SPDXRef-Package-apk-musl",
                    "versionInfo": "1.2.4-r2",
                    "primaryPackagePurpose": "LIBRARY",
                    "externalRefs": [
                        {
                            "referenceCategory": "PACKAGE-MANAGER",
                            "referenceType": "purl",
                            "referenceLocator": "pkg:apk/alpine/musl@1.2.4-r2"
                        }
                    ]
                },
                {
                    "name": "busybox",
                    "SPDXID": "SPDXRef-Package-apk-busybox",
                    "versionInfo": "1.36.1-r15",
                    "primaryPackagePurpose": "LIBRARY"
                }
            ],
            "relationships": [
                {
                    "spdxElementId": "SPDXRef-DOCUMENT",
                    "relationshipType": "DESCRIBES",
                    "relatedSpdxElement": "SPDXRef-Package-apk-musl"
                },
                {
                    "spdxElementId": "SPDXRef-DOCUMENT",
                    "relationshipType": "DESCRIBES",
                    "relatedSpdxElement": "SPDXRef-Package-apk-busybox"
                }
            ]
        })
        .as_object()
        .cloned()
        .unwrap()
    }

    #[test]
    fn test_document_record_uses_generic_names() {
        let batches = SpdxAdapter.node_batches(&sample(), &ctx()).unwrap();
        let record = &batches[0].records[0];

        assert_eq!(batches[0].identity.fixed_id.as_deref(), Some("document_spdx"));
        assert_eq!(record.get("format"), Some(&json!("SPDX")));
        assert_eq!(record.get("spec_version"), Some(&json!("SPDX-2.3")));
        assert_eq!(record.get("created_at"), Some(&json!("2024-01-10T10:00:00Z")));
        assert_eq!(record.get("licenseListVersion"), Some(&json!("3.22")));
        assert!(record.get("spdxVersion").is_none());
    }

    #[test]
    fn test_packages_become_components() {
        let batches = SpdxAdapter.node_batches(&sample(), &ctx()).unwrap();

        assert_eq!(batches[1].label, "component");
        assert_eq!(batches[1].key_field.as_deref(), Some("name"));
        assert_eq!(batches[1].records.len(), 2);
        assert_eq!(batches[2].label, "externalReference");
        assert_eq!(batches[2].key_field.as_deref(), Some("referenceLocator"));
        assert_eq!(batches[2].records.len(), 1);

        let musl = &batches[1].records[0];
        assert_eq!(musl.get("version"), Some(&json!("1.2.4-r2")));
        assert_eq!(musl.get("type"), Some(&json!("LIBRARY")));
        assert!(musl.get("versionInfo").is_none());
        assert!(musl.get("primaryPackagePurpose").is_none());
    }

    #[test]
    fn test_packages_with_different_fields_get_separate_batches() {
        let doc = json!({
            "spdxVersion": "SPDX-2.3",
            "packages": [
                {"name": "zlib"},
                {"name": "openssl", "versionInfo": "3.1.4", "SPDXID": "SPDXRef-Package-openssl"}
            ]
        });

        let batches = SpdxAdapter.node_batches(doc.as_object().unwrap(), &ctx()).unwrap();
        let components: Vec<&NodeBatch> = batches.iter().filter(|b| b.label == "component").collect();

        assert_eq!(components.len(), 2);
        assert_eq!(components[1].records[0].get("version"), Some(&json!("3.1.4")));
        assert!(batches.iter().all(|b| b.label != "externalReference"));
    }

    #[test]
    fn test_edges() {
        let batches = SpdxAdapter.edge_batches(&sample(), &ctx()).unwrap();

        assert_eq!(
            batches[0].edges,
            vec![EdgeRow::new(
                "component_musl",
                "externalReference_pkg:apk/alpine/musl@1.2.4-r2"
            )]
        );

        let describes = &batches[1];
        assert_eq!(describes.label, "DESCRIBES");
        assert_eq!(describes.endpoints, EndpointMatch::by_property("~id", "SPDXID"));
        assert_eq!(
            describes.edges,
            vec![
                EdgeRow::new("document_spdx", "SPDXRef-Package-apk-musl"),
                EdgeRow::new("document_spdx", "SPDXRef-Package-apk-busybox"),
            ]
        );
    }

    #[test]
    fn test_relationship_without_target_is_skipped() {
        let doc = json!({
            "spdxVersion": "SPDX-2.3",
            "relationships": [{"spdxElementId": "SPDXRef-DOCUMENT", "relationshipType": "DESCRIBES"}]
        });

        let batches = SpdxAdapter
            .edge_batches(doc.as_object().unwrap(), &ctx())
            .unwrap();

        assert!(batches[1].edges.is_empty());
    }
}
