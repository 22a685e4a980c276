use super::{read_envelope, ContentStore};
use crate::error::{CairnError, Result};
use crate::filter::Filter;
use crate::registry::CollectionRef;
use crate::util::{get_path, SortKey};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::cmp::Reverse;
use std::path::PathBuf;

/// Page size used when no limit is given.
pub const DEFAULT_LIMIT: usize = 1000;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SortDirection {
    #[default]
    Asc,
    Desc,
}

/// Options for [`ContentStore::get_entries`].
///
/// Deserializes from the JSON form used by callers:
/// `{ "filters": {...}, "sort": [["createdAt", "desc"]], "limit": 10, "offset": 0,
///    "include": ["author"], "includeCount": true }`
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct ListOptions {
    pub filters: Option<Filter>,
    /// Applied as successive stable passes in order, so the last key is the most
    /// significant one.
    pub sort: Vec<(String, SortDirection)>,
    pub limit: Option<usize>,
    pub offset: Option<usize>,
    pub include: Vec<String>,
    pub include_count: bool,
}

impl ListOptions {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn filter(mut self, filter: impl Into<Filter>) -> Self {
        self.filters = Some(filter.into());
        self
    }

    pub fn sort_by(mut self, field: &str, direction: SortDirection) -> Self {
        self.sort.push((field.to_string(), direction));
        self
    }

    pub fn limit(mut self, limit: usize) -> Self {
        self.limit = Some(limit);
        self
    }

    pub fn offset(mut self, offset: usize) -> Self {
        self.offset = Some(offset);
        self
    }

    pub fn include(mut self, field: &str) -> Self {
        self.include.push(field.to_string());
        self
    }

    pub fn with_count(mut self) -> Self {
        self.include_count = true;
        self
    }
}

/// One page of entries
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct EntryList {
    pub entries: Vec<Value>,
    pub limit: usize,
    pub offset: usize,
    /// Number of entries that passed the filter, before pagination. Only set when
    /// requested with `include_count`.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub count: Option<usize>,
}

impl ContentStore {
    /// List a collection: scan, filter, paginate, sort, then resolve references.
    ///
    /// Sorting applies to the page, after `offset` and `limit` have been taken
    /// from the filtered scan (which is in file-name order).
    pub fn get_entries(
        &self,
        collection: impl Into<CollectionRef>,
        options: &ListOptions,
    ) -> Result<EntryList> {
        let collection = self.registry.resolve_collection(collection)?;
        let limit = options.limit.unwrap_or(DEFAULT_LIMIT);
        let offset = options.offset.unwrap_or(0);

        let mut entries: Vec<Value> = Vec::new();
        for (id, entry) in self.scan_collection(collection.name())? {
            match entry {
                Ok(entry) => entries.push(entry),
                Err(e) => log::warn!("Skipping unreadable entry {}/{}: {e}", collection.name(), id),
            }
        }

        if let Some(filter) = &options.filters {
            entries.retain(|entry| filter.matches(entry));
        }
        let total_count = entries.len();

        let mut page: Vec<Value> = entries.into_iter().skip(offset).take(limit).collect();

        sort_entries(&mut page, &options.sort);

        if !options.include.is_empty() {
            let include: Vec<&str> = options.include.iter().map(String::as_str).collect();
            for entry in &mut page {
                self.resolve_references(entry, &include);
            }
        }

        Ok(EntryList {
            entries: page,
            limit,
            offset,
            count: options.include_count.then_some(total_count),
        })
    }

    /// Read every `*.json` document in a collection directory, in file-name order.
    /// A missing directory is an empty collection.
    pub(crate) fn scan_collection(&self, name: &str) -> Result<Vec<(String, Result<Value>)>> {
        let dir = self.root.join(name);
        if !dir.is_dir() {
            return Ok(Vec::new());
        }

        let pattern = format!(
            "{}/*.json",
            glob::Pattern::escape(&dir.to_string_lossy())
        );
        let files: Vec<PathBuf> = glob::glob(&pattern)
            .map_err(|e| CairnError::Io(std::io::Error::new(std::io::ErrorKind::InvalidInput, e)))?
            .filter_map(|r| r.ok())
            .filter(|p| p.is_file())
            .collect();

        Ok(files
            .into_iter()
            .map(|path| {
                let id = path
                    .file_stem()
                    .map(|s| s.to_string_lossy().into_owned())
                    .unwrap_or_default();
                (id, read_envelope(&path))
            })
            .collect())
    }
}

/// Sort with one stable pass per key, in the order given.
pub(crate) fn sort_entries(entries: &mut [Value], keys: &[(String, SortDirection)]) {
    for (field, direction) in keys {
        match direction {
            SortDirection::Asc => {
                entries.sort_by_cached_key(|entry| SortKey::of(get_path(entry, field)))
            }
            SortDirection::Desc => {
                entries.sort_by_cached_key(|entry| Reverse(SortKey::of(get_path(entry, field))))
            }
        }
    }
}
