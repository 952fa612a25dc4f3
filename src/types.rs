//! Core metadata types for the a3s-metadata engine
//!
//! Tag keys are namespaced (`<namespace>:<field>`, e.g. `ID3:Title`),
//! values are loosely-typed scalars, and payloads are immutable byte
//! buffers tagged with a MIME type.

use bytes::Bytes;
use serde::{Deserialize, Serialize};
use std::borrow::Borrow;
use std::collections::{BTreeMap, HashSet};
use std::fmt;
use std::path::Path;

/// MIME type used when a payload carries none and sniffing fails
pub const OCTET_STREAM: &str = "application/octet-stream";

/// Namespaced tag identifier, e.g. `EXIF:ImageHeight`
///
/// The namespace names the originating format family. Keys without a
/// namespace are allowed (mappings with `ignorePrefix` produce them).
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct TagKey(String);

impl TagKey {
    /// Create a key from its full textual form
    pub fn new(key: impl Into<String>) -> Self {
        Self(key.into())
    }

    /// Create a key from a namespace and a field name
    pub fn namespaced(namespace: &str, field: &str) -> Self {
        Self(format!("{}:{}", namespace, field))
    }

    /// Full key text
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Namespace part (`ID3` for `ID3:Title`), if any
    pub fn namespace(&self) -> Option<&str> {
        self.0.split_once(':').map(|(ns, _)| ns)
    }

    /// Field part (`Title` for `ID3:Title`); the whole key when un-namespaced
    pub fn field(&self) -> &str {
        self.0.split_once(':').map(|(_, f)| f).unwrap_or(&self.0)
    }

    /// Same key without its namespace
    pub fn strip_namespace(&self) -> TagKey {
        TagKey(self.field().to_string())
    }
}

impl fmt::Display for TagKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl Borrow<str> for TagKey {
    fn borrow(&self) -> &str {
        &self.0
    }
}

impl AsRef<str> for TagKey {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

impl From<&str> for TagKey {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

impl From<String> for TagKey {
    fn from(s: String) -> Self {
        Self(s)
    }
}

/// A single tag value
///
/// Values are opaque to the engine: it only copies and compares them.
/// Serialized untagged, so JSON `200`, `"Nuxeo"` and `[1, 2]` map directly.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum TagValue {
    Bool(bool),
    Integer(i64),
    Float(f64),
    Text(String),
    List(Vec<TagValue>),
}

impl TagValue {
    /// Integer view of the value (integers and integral text)
    pub fn as_i64(&self) -> Option<i64> {
        match self {
            TagValue::Integer(i) => Some(*i),
            TagValue::Text(s) => s.trim().parse().ok(),
            _ => None,
        }
    }

    /// Borrow the text if this is a `Text` value
    pub fn as_str(&self) -> Option<&str> {
        match self {
            TagValue::Text(s) => Some(s),
            _ => None,
        }
    }

    /// Convert a JSON value; `null` and empty containers have no tag value
    pub fn from_json(value: &serde_json::Value) -> Option<TagValue> {
        match value {
            serde_json::Value::Null => None,
            serde_json::Value::Bool(b) => Some(TagValue::Bool(*b)),
            serde_json::Value::Number(n) => match n.as_i64() {
                Some(i) => Some(TagValue::Integer(i)),
                None => n.as_f64().map(TagValue::Float),
            },
            serde_json::Value::String(s) => Some(TagValue::Text(s.clone())),
            serde_json::Value::Array(items) => {
                let items: Vec<TagValue> = items.iter().filter_map(TagValue::from_json).collect();
                if items.is_empty() {
                    None
                } else {
                    Some(TagValue::List(items))
                }
            }
            serde_json::Value::Object(_) => Some(TagValue::Text(value.to_string())),
        }
    }
}

impl fmt::Display for TagValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TagValue::Bool(b) => write!(f, "{}", b),
            TagValue::Integer(i) => write!(f, "{}", i),
            TagValue::Float(x) => write!(f, "{}", x),
            TagValue::Text(s) => f.write_str(s),
            TagValue::List(items) => {
                for (i, item) in items.iter().enumerate() {
                    if i > 0 {
                        f.write_str(", ")?;
                    }
                    write!(f, "{}", item)?;
                }
                Ok(())
            }
        }
    }
}

impl From<bool> for TagValue {
    fn from(v: bool) -> Self {
        TagValue::Bool(v)
    }
}

impl From<i64> for TagValue {
    fn from(v: i64) -> Self {
        TagValue::Integer(v)
    }
}

impl From<i32> for TagValue {
    fn from(v: i32) -> Self {
        TagValue::Integer(v as i64)
    }
}

impl From<u32> for TagValue {
    fn from(v: u32) -> Self {
        TagValue::Integer(v as i64)
    }
}

impl From<f64> for TagValue {
    fn from(v: f64) -> Self {
        TagValue::Float(v)
    }
}

impl From<&str> for TagValue {
    fn from(v: &str) -> Self {
        TagValue::Text(v.to_string())
    }
}

impl From<String> for TagValue {
    fn from(v: String) -> Self {
        TagValue::Text(v)
    }
}

/// Tag key → value map produced by one extraction
///
/// Keys are unique; iteration is ordered by key. Deserializing skips
/// `null` values and empty lists instead of rejecting the document.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
#[serde(transparent)]
pub struct TagMap {
    tags: BTreeMap<TagKey, TagValue>,
}

impl TagMap {
    /// Create an empty map
    pub fn new() -> Self {
        Self::default()
    }

    /// Look up a value by its full key text
    pub fn get(&self, key: &str) -> Option<&TagValue> {
        self.tags.get(key)
    }

    /// Whether the key is present
    pub fn contains_key(&self, key: &str) -> bool {
        self.tags.contains_key(key)
    }

    /// Insert or replace a value, returning the previous one
    pub fn insert(&mut self, key: impl Into<TagKey>, value: impl Into<TagValue>) -> Option<TagValue> {
        self.tags.insert(key.into(), value.into())
    }

    /// Remove a key, returning its value
    pub fn remove(&mut self, key: &str) -> Option<TagValue> {
        self.tags.remove(key)
    }

    /// Number of tags
    pub fn len(&self) -> usize {
        self.tags.len()
    }

    /// Whether the map holds no tags
    pub fn is_empty(&self) -> bool {
        self.tags.is_empty()
    }

    /// Iterate over tags in key order
    pub fn iter(&self) -> impl Iterator<Item = (&TagKey, &TagValue)> {
        self.tags.iter()
    }

    /// Iterate over keys in order
    pub fn keys(&self) -> impl Iterator<Item = &TagKey> {
        self.tags.keys()
    }

    /// Copy of this map restricted to the requested keys
    ///
    /// Requested keys missing from the map are silently omitted.
    pub fn retain_keys<K: AsRef<str>>(&self, keys: &[K]) -> TagMap {
        let wanted: HashSet<&str> = keys.iter().map(|k| k.as_ref()).collect();
        self.tags
            .iter()
            .filter(|(k, _)| wanted.contains(k.as_str()))
            .map(|(k, v)| (k.clone(), v.clone()))
            .collect()
    }

    /// Copy of this map with every key's namespace removed
    ///
    /// When several namespaces share a field name, the first key in key
    /// order wins (`PDF:Producer` over `XMP:Producer`), matching
    /// [`resolve_field`](Self::resolve_field).
    pub fn without_namespaces(&self) -> TagMap {
        let mut bare = TagMap::new();
        for (key, value) in &self.tags {
            bare.tags
                .entry(key.strip_namespace())
                .or_insert_with(|| value.clone());
        }
        bare
    }

    /// Full key of the first tag whose field part is `field`
    pub fn resolve_field(&self, field: &str) -> Option<&TagKey> {
        self.tags.keys().find(|k| k.field() == field)
    }
}

impl<'de> Deserialize<'de> for TagMap {
    fn deserialize<D>(deserializer: D) -> std::result::Result<Self, D::Error>
    where
        D: serde::Deserializer<'de>,
    {
        let raw = BTreeMap::<TagKey, serde_json::Value>::deserialize(deserializer)?;
        Ok(raw
            .into_iter()
            .filter_map(|(key, value)| TagValue::from_json(&value).map(|value| (key, value)))
            .collect())
    }
}

impl<K: Into<TagKey>, V: Into<TagValue>> FromIterator<(K, V)> for TagMap {
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        Self {
            tags: iter.into_iter().map(|(k, v)| (k.into(), v.into())).collect(),
        }
    }
}

impl IntoIterator for TagMap {
    type Item = (TagKey, TagValue);
    type IntoIter = std::collections::btree_map::IntoIter<TagKey, TagValue>;

    fn into_iter(self) -> Self::IntoIter {
        self.tags.into_iter()
    }
}

impl<'a> IntoIterator for &'a TagMap {
    type Item = (&'a TagKey, &'a TagValue);
    type IntoIter = std::collections::btree_map::Iter<'a, TagKey, TagValue>;

    fn into_iter(self) -> Self::IntoIter {
        self.tags.iter()
    }
}

/// What a matcher sees of a payload: its MIME type and format kind
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PayloadDescriptor {
    /// Lowercase MIME type (e.g. `audio/mpeg`)
    pub mime_type: String,

    /// Lowercase format kind, taken from the filename extension (e.g. `mp3`)
    pub format: Option<String>,
}

impl PayloadDescriptor {
    /// Build a descriptor; both parts are normalized to lowercase
    pub fn new(mime_type: impl AsRef<str>, format: Option<&str>) -> Self {
        Self {
            mime_type: mime_type.as_ref().trim().to_ascii_lowercase(),
            format: format.map(|f| f.trim_start_matches('.').to_ascii_lowercase()),
        }
    }
}

/// A binary payload carrying embedded metadata
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Blob {
    /// Declared MIME type; empty means "sniff from content"
    pub mime_type: String,

    /// Original filename, used for the format kind
    pub filename: Option<String>,

    /// Payload bytes
    pub data: Bytes,
}

impl Blob {
    /// Create a payload with an explicit MIME type
    pub fn new(mime_type: impl Into<String>, data: impl Into<Bytes>) -> Self {
        Self {
            mime_type: mime_type.into(),
            filename: None,
            data: data.into(),
        }
    }

    /// Create a payload whose MIME type is sniffed from its bytes
    pub fn sniffed(data: impl Into<Bytes>) -> Self {
        Self::new(String::new(), data)
    }

    /// Read a payload from disk, keeping its filename
    pub fn from_path(path: impl AsRef<Path>) -> crate::Result<Self> {
        let path = path.as_ref();
        let data = std::fs::read(path)?;
        let filename = path
            .file_name()
            .map(|name| name.to_string_lossy().into_owned());
        Ok(Self {
            mime_type: String::new(),
            filename,
            data: Bytes::from(data),
        })
    }

    /// Attach a filename
    pub fn with_filename(mut self, filename: impl Into<String>) -> Self {
        self.filename = Some(filename.into());
        self
    }

    /// Payload size in bytes
    pub fn len(&self) -> usize {
        self.data.len()
    }

    /// Whether the payload is empty
    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    /// Describe this payload for matchers and introspector selection
    ///
    /// Falls back to magic-byte sniffing when no MIME type or filename
    /// extension is known.
    pub fn descriptor(&self) -> PayloadDescriptor {
        let sniffed = if self.mime_type.trim().is_empty() || self.extension().is_none() {
            infer::get(&self.data)
        } else {
            None
        };

        let mime_type = if self.mime_type.trim().is_empty() {
            sniffed
                .as_ref()
                .map(|kind| kind.mime_type().to_string())
                .unwrap_or_else(|| OCTET_STREAM.to_string())
        } else {
            self.mime_type.clone()
        };

        let format = self
            .extension()
            .or_else(|| sniffed.as_ref().map(|kind| kind.extension().to_string()));

        PayloadDescriptor::new(mime_type, format.as_deref())
    }

    fn extension(&self) -> Option<String> {
        let name = self.filename.as_deref()?;
        Path::new(name)
            .extension()
            .map(|ext| ext.to_string_lossy().into_owned())
    }
}

/// Result of merging tags into a payload
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MergeOutcome {
    /// The payload was rewritten; these are its new bytes
    Rewritten(Bytes),

    /// The write ran but could not persist the change
    Unchanged { reason: String },
}
