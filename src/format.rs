use serde::Serialize;
use serde_json::Value;
use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub enum SbomFormat {
    CycloneDx,
    Spdx,
    Unknown,
}

impl SbomFormat {
    /// Classifies a decoded document by its top-level marker field.
    pub fn detect(document: &Value) -> Self {
        match document.as_object() {
            Some(root) if root.contains_key("spdxVersion") => SbomFormat::Spdx,
            Some(root) if root.contains_key("bomFormat") => SbomFormat::CycloneDx,
            _ => SbomFormat::Unknown,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            SbomFormat::CycloneDx => "CycloneDX",
            SbomFormat::Spdx => "SPDX",
            SbomFormat::Unknown => "unknown",
        }
    }
}

impl fmt::Display for SbomFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}
