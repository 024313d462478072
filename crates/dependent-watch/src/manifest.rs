//! Release manifest decoding
//!
//! A rendered release manifest is a stream of YAML documents separated by
//! `---` lines. Each document is one object, or a `List` whose `items` are
//! objects. Decoding turns the text into [`ObjectDescriptor`]s in manifest
//! order, with list items taking the place of their list.

use crate::error::WatchError;
use crate::mapper::KindKey;
use crate::strategy::RetentionPolicy;
use serde::Deserialize;
use std::collections::BTreeMap;

/// Kind of the generic aggregate document whose items are expanded in place
pub const LIST_KIND: &str = "List";

/// The parts of a manifest object the registrar cares about
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct ObjectDescriptor {
    /// `apiVersion`, e.g. `apps/v1`
    pub api_version: String,
    /// `kind`, e.g. `ReplicaSet`
    pub kind: String,
    /// `metadata.namespace`, empty when absent
    pub namespace: String,
    /// `metadata.name`
    pub name: String,
    /// `metadata.annotations`
    pub annotations: BTreeMap<String, String>,
}

impl ObjectDescriptor {
    /// Create a descriptor with no annotations
    pub fn new(
        api_version: impl Into<String>,
        kind: impl Into<String>,
        namespace: impl Into<String>,
        name: impl Into<String>,
    ) -> Self {
        Self {
            api_version: api_version.into(),
            kind: kind.into(),
            namespace: namespace.into(),
            name: name.into(),
            annotations: BTreeMap::new(),
        }
    }

    /// Add an annotation
    #[must_use]
    pub fn with_annotation(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.annotations.insert(key.into(), value.into());
        self
    }

    /// Group/version/kind of this object
    #[must_use]
    pub fn kind_key(&self) -> KindKey {
        KindKey::from_api_version(&self.api_version, &self.kind)
    }

    /// Retention policy declared on this particular object
    #[must_use]
    pub fn retention_policy(&self) -> RetentionPolicy {
        RetentionPolicy::from_annotations(&self.annotations)
    }
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
struct RawMetadata {
    #[serde(default)]
    name: Option<String>,
    #[serde(default)]
    namespace: Option<String>,
    #[serde(default)]
    annotations: Option<BTreeMap<String, String>>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct RawObject {
    api_version: String,
    kind: String,
    #[serde(default)]
    metadata: Option<RawMetadata>,
    #[serde(default)]
    items: Option<Vec<serde_yaml::Value>>,
}

impl From<RawObject> for ObjectDescriptor {
    fn from(raw: RawObject) -> Self {
        let metadata = raw.metadata.unwrap_or_default();
        Self {
            api_version: raw.api_version,
            kind: raw.kind,
            namespace: metadata.namespace.unwrap_or_default(),
            name: metadata.name.unwrap_or_default(),
            annotations: metadata.annotations.unwrap_or_default(),
        }
    }
}

/// True for a line that separates two documents
fn is_separator(line: &str) -> bool {
    match line.strip_prefix("---") {
        Some(rest) => rest.trim().is_empty() || rest.trim_start().starts_with('#'),
        None => false,
    }
}

/// True for a document with nothing but whitespace and comments
fn is_blank(document: &str) -> bool {
    document.lines().all(|line| {
        let line = line.trim();
        line.is_empty() || line.starts_with('#')
    })
}

/// Split manifest text into its non-blank YAML documents
fn split_documents(manifest: &str) -> Vec<String> {
    let mut documents = Vec::new();
    let mut current = String::new();
    for line in manifest.lines() {
        if is_separator(line) {
            documents.push(std::mem::take(&mut current));
        } else {
            current.push_str(line);
            current.push('\n');
        }
    }
    documents.push(current);
    documents.retain(|d| !is_blank(d));
    documents
}

fn decode_document(index: usize, document: &str) -> Result<Vec<ObjectDescriptor>, WatchError> {
    let parse_error = |reason: String| WatchError::ManifestParse { document: index, reason };

    let mut raw: RawObject = serde_yaml::from_str(document).map_err(|e| parse_error(e.to_string()))?;
    if raw.kind != LIST_KIND {
        return Ok(vec![raw.into()]);
    }

    raw.items
        .take()
        .unwrap_or_default()
        .into_iter()
        .enumerate()
        .map(|(i, item)| {
            serde_yaml::from_value::<RawObject>(item)
                .map(ObjectDescriptor::from)
                .map_err(|e| parse_error(format!("list item {i}: {e}")))
        })
        .collect()
}

/// Lazy decoder over the documents of a manifest
///
/// Yields one result per document; a `List` document yields all of its items
/// at once. Prefer [`decode`] unless documents must be processed as they are
/// read.
#[derive(Debug)]
pub struct Documents {
    documents: std::vec::IntoIter<String>,
    index: usize,
}

impl Iterator for Documents {
    type Item = Result<Vec<ObjectDescriptor>, WatchError>;

    fn next(&mut self) -> Option<Self::Item> {
        let document = self.documents.next()?;
        let index = self.index;
        self.index += 1;
        Some(decode_document(index, &document))
    }
}

/// Start lazily decoding a manifest
#[must_use]
pub fn documents(manifest: &str) -> Documents {
    Documents {
        documents: split_documents(manifest).into_iter(),
        index: 0,
    }
}

/// Decode a whole manifest.
///
/// All-or-nothing: the first undecodable document or list item fails the
/// call with [`WatchError::ManifestParse`] and nothing is returned.
pub fn decode(manifest: &str) -> Result<Vec<ObjectDescriptor>, WatchError> {
    let mut objects = Vec::new();
    for decoded in documents(manifest) {
        objects.extend(decoded?);
    }
    Ok(objects)
}
