// ./domain/src/lib.rs
use chrono::{DateTime, NaiveDate, NaiveDateTime, Utc};
use serde::{Deserialize, Serialize}; // For post records & snapshot shape
use serde_json::{Map, Value}; // To represent arbitrary post fields
use std::cmp::Reverse;
use std::fmt;
use thiserror::Error; // For domain-specific errors

/// Field name -> JSON value map, the shape every stored document has.
pub type Fields = Map<String, Value>;

// --- Domain Errors ---
#[derive(Error, Debug, PartialEq)]
pub enum DomainError {
    #[error("Invalid field value for field '{field}': {reason}")]
    InvalidFieldValue { field: String, reason: String },
}

// --- Post ID ---
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct PostId(String);

impl PostId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }
    pub fn as_str(&self) -> &str {
        &self.0
    }
}
impl From<String> for PostId {
    fn from(id: String) -> Self {
        Self::new(id)
    }
}
impl From<&str> for PostId {
    fn from(id: &str) -> Self {
        Self::new(id)
    }
}
impl fmt::Display for PostId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

// --- Post ---

/// A blog post as read back from the store.
///
/// The identifier lives beside the field map rather than inside it, so a
/// stored field called `id` never shadows the store-assigned identifier.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct Post {
    id: PostId,
    /// Post data stored as field name -> JSON Value pairs.
    fields: Fields,
}

impl Post {
    pub const TITLE_FIELD: &'static str = "title";
    pub const CONTENT_FIELD: &'static str = "content";
    pub const DATE_FIELD: &'static str = "date";

    pub fn new(id: PostId, fields: Fields) -> Self {
        Self { id, fields }
    }

    pub fn id(&self) -> &PostId {
        &self.id
    }

    pub fn fields(&self) -> &Fields {
        &self.fields
    }

    /// Gets a specific field's value.
    pub fn get_field_value(&self, field_name: &str) -> Option<&Value> {
        self.fields.get(field_name)
    }

    pub fn title(&self) -> Option<&str> {
        self.get_field_value(Self::TITLE_FIELD)
            .and_then(Value::as_str)
    }

    pub fn content(&self) -> Option<&str> {
        self.get_field_value(Self::CONTENT_FIELD)
            .and_then(Value::as_str)
    }

    /// The raw `date` field, in whatever representation the store holds.
    pub fn date(&self) -> Option<&Value> {
        self.get_field_value(Self::DATE_FIELD)
    }

    /// The `date` field normalized to a comparable instant.
    pub fn published_at(&self) -> Option<DateTime<Utc>> {
        self.date().and_then(normalize_date)
    }
}

/// A post about to be written. Snapshot entries may carry their own id, in
/// which case the store keeps it instead of assigning a new one.
#[derive(Debug, Clone, PartialEq)]
pub struct NewPost {
    pub id: Option<PostId>,
    pub fields: Fields,
}

impl NewPost {
    /// Splits an `id` entry (string or number) off a snapshot post.
    /// A blank string counts as no id at all.
    pub fn from_snapshot_entry(mut fields: Fields) -> Result<Self, DomainError> {
        let id = match fields.remove("id") {
            None | Some(Value::Null) => None,
            Some(Value::String(id)) if id.trim().is_empty() => None,
            Some(Value::String(id)) => Some(PostId::new(id)),
            Some(Value::Number(n)) => Some(PostId::new(n.to_string())),
            Some(other) => {
                return Err(DomainError::InvalidFieldValue {
                    field: "id".to_string(),
                    reason: format!("Expected a string or number, got {}", other),
                });
            }
        };
        Ok(Self { id, fields })
    }
}

// --- Dates ---

/// Converts a stored `date` value into a UTC instant.
///
/// Accepted representations:
/// - store-native timestamps `{"seconds": .., "nanoseconds": ..}` (or the
///   underscore-prefixed `_seconds`/`_nanoseconds` export form)
/// - numbers, read as milliseconds since the Unix epoch
/// - RFC 3339 strings, naive `YYYY-MM-DD[T ]HH:MM:SS[.fff]` strings (read as
///   UTC) and plain `YYYY-MM-DD` dates (UTC midnight)
///
/// Anything else yields `None`.
pub fn normalize_date(value: &Value) -> Option<DateTime<Utc>> {
    match value {
        Value::Object(map) => timestamp_from_object(map),
        Value::Number(n) => {
            let millis = match n.as_i64() {
                Some(ms) => ms,
                None => {
                    let ms = n.as_f64()?;
                    if !ms.is_finite() {
                        return None;
                    }
                    ms.trunc() as i64
                }
            };
            DateTime::from_timestamp_millis(millis)
        }
        Value::String(s) => parse_date_str(s),
        _ => None,
    }
}

fn timestamp_from_object(map: &Fields) -> Option<DateTime<Utc>> {
    let seconds = map
        .get("seconds")
        .or_else(|| map.get("_seconds"))
        .and_then(Value::as_i64)?;
    let nanos = match map.get("nanoseconds").or_else(|| map.get("_nanoseconds")) {
        Some(v) => u32::try_from(v.as_u64()?).ok()?,
        None => 0,
    };
    DateTime::from_timestamp(seconds, nanos)
}

fn parse_date_str(raw: &str) -> Option<DateTime<Utc>> {
    let s = raw.trim();
    if let Ok(dt) = DateTime::parse_from_rfc3339(s) {
        return Some(dt.with_timezone(&Utc));
    }
    for format in ["%Y-%m-%dT%H:%M:%S%.f", "%Y-%m-%d %H:%M:%S%.f", "%Y-%m-%dT%H:%M"] {
        if let Ok(naive) = NaiveDateTime::parse_from_str(s, format) {
            return Some(naive.and_utc());
        }
    }
    NaiveDate::parse_from_str(s, "%Y-%m-%d")
        .ok()
        .and_then(|d| d.and_hms_opt(0, 0, 0))
        .map(|naive| naive.and_utc())
}

// --- Adjacent posts ---

/// Neighbours of a post in newest-first order. `next` is the newer post,
/// `prev` the older one.
#[derive(Serialize, Debug, Clone, Default, PartialEq)]
pub struct AdjacentPosts {
    pub prev: Option<Post>,
    pub next: Option<Post>,
}

/// Sorts `posts` newest first and returns the neighbours of `current`.
///
/// The sort is stable, so posts sharing an instant keep store order. Posts
/// whose date cannot be normalized sort after every dated post.
pub fn adjacent_posts(mut posts: Vec<Post>, current: &PostId) -> AdjacentPosts {
    posts.sort_by_cached_key(|post| {
        let instant = post.published_at();
        (instant.is_none(), Reverse(instant))
    });

    let Some(index) = posts.iter().position(|post| post.id() == current) else {
        return AdjacentPosts::default();
    };

    AdjacentPosts {
        prev: posts.get(index + 1).cloned(),
        next: index.checked_sub(1).map(|i| posts[i].clone()),
    }
}

// --- Categories ---

/// Ordered list of category names held in the single category document.
#[derive(Serialize, Deserialize, Debug, Clone, Default, PartialEq, Eq)]
#[serde(transparent)]
pub struct CategoryList(Vec<String>);

impl CategoryList {
    pub fn new() -> Self {
        Self(Vec::new())
    }

    /// Builds a list keeping only the first occurrence of each name.
    pub fn deduplicated<I>(names: I) -> Self
    where
        I: IntoIterator<Item = String>,
    {
        let mut list = Self::new();
        for name in names {
            list.add(&name);
        }
        list
    }

    /// Appends `name` unless already present. Returns whether it was added.
    pub fn add(&mut self, name: &str) -> bool {
        if self.contains(name) {
            return false;
        }
        self.0.push(name.to_string());
        true
    }

    /// Removes the first entry equal to `name`. Returns whether one was removed.
    pub fn remove(&mut self, name: &str) -> bool {
        match self.0.iter().position(|existing| existing == name) {
            Some(index) => {
                self.0.remove(index);
                true
            }
            None => false,
        }
    }

    pub fn contains(&self, name: &str) -> bool {
        self.0.iter().any(|existing| existing == name)
    }

    pub fn names(&self) -> &[String] {
        &self.0
    }

    pub fn into_names(self) -> Vec<String> {
        self.0
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl From<Vec<String>> for CategoryList {
    fn from(names: Vec<String>) -> Self {
        Self(names)
    }
}

// --- Snapshot ---

/// The static JSON file migrated into the store once.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct Snapshot {
    pub posts: Vec<Fields>,
    pub categories: Vec<String>,
}
