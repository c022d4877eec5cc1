use crate::collection::Collection;
use crate::errors::DbError;
use crate::types::Document;
use serde_json::Value;
use std::sync::Arc;

use super::eval::compare_docs;
use super::parse::parse_sort;
use super::types::{Filter, FindOptions, SortSpec};

/// Lazy, chainable view over the documents matching a filter.
///
/// The match set is fetched from storage on the first terminal call
/// (`to_array`, `first`, `count`) and cached; later terminal calls on the
/// same cursor re-apply the current sort/skip/limit to that cached set
/// without scanning again. Setting a modifier twice keeps the last value.
pub struct Cursor {
    collection: Arc<Collection>,
    filter: Filter,
    sort: Option<Vec<SortSpec>>,
    skip: Option<usize>,
    limit: Option<usize>,
    docs: Option<Vec<Document>>,
}

impl Cursor {
    pub(crate) fn new(collection: Arc<Collection>, filter: Filter, opts: FindOptions) -> Self {
        Self { collection, filter, sort: opts.sort, skip: opts.skip, limit: opts.limit, docs: None }
    }

    #[must_use]
    pub fn sort(mut self, spec: Vec<SortSpec>) -> Self {
        self.sort = Some(spec);
        self
    }

    /// Sort by an ordered `{field: 1 | -1}` mapping.
    ///
    /// # Errors
    /// Returns `MalformedQuery` if the spec is not a mapping of `1`/`-1`.
    pub fn sort_json(self, spec: &Value) -> Result<Self, DbError> {
        Ok(self.sort(parse_sort(spec)?))
    }

    #[must_use]
    pub fn skip(mut self, n: usize) -> Self {
        self.skip = Some(n);
        self
    }

    #[must_use]
    pub fn limit(mut self, n: usize) -> Self {
        self.limit = Some(n);
        self
    }

    /// Whether the match set has been fetched.
    #[must_use]
    pub fn is_executed(&self) -> bool {
        self.docs.is_some()
    }

    async fn execute(&mut self) -> Result<&[Document], DbError> {
        if self.docs.is_none() {
            let docs = self.collection.scan_matching(&self.filter).await?;
            self.docs = Some(docs);
        }
        Ok(self.docs.as_deref().unwrap_or_default())
    }

    fn window(&self, docs: &[Document], cap: usize) -> Vec<Document> {
        let mut view: Vec<&Document> = docs.iter().collect();
        if let Some(sort) = &self.sort {
            // stable: equal keys keep their fetched order
            view.sort_by(|a, b| compare_docs(a, b, sort));
        }
        view.into_iter()
            .skip(self.skip.unwrap_or(0))
            .take(self.limit.unwrap_or(usize::MAX).min(cap))
            .cloned()
            .collect()
    }

    /// Sorted, skipped and limited documents.
    ///
    /// # Errors
    /// Propagates storage and decode failures from the first fetch.
    pub async fn to_array(&mut self) -> Result<Vec<Document>, DbError> {
        self.execute().await?;
        let docs = self.docs.as_deref().unwrap_or_default();
        Ok(self.window(docs, usize::MAX))
    }

    /// The first document of the current page, if any.
    ///
    /// # Errors
    /// Propagates storage and decode failures from the first fetch.
    pub async fn first(&mut self) -> Result<Option<Document>, DbError> {
        self.execute().await?;
        let docs = self.docs.as_deref().unwrap_or_default();
        Ok(self.window(docs, 1).into_iter().next())
    }

    /// Number of matching documents. Skip and limit are ignored.
    ///
    /// # Errors
    /// Propagates storage and decode failures from the first fetch.
    pub async fn count(&mut self) -> Result<usize, DbError> {
        Ok(self.execute().await?.len())
    }
}

impl std::fmt::Debug for Cursor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Cursor")
            .field("collection", &self.collection.name())
            .field("sort", &self.sort)
            .field("skip", &self.skip)
            .field("limit", &self.limit)
            .field("executed", &self.is_executed())
            .finish()
    }
}
