//! Translated query values.

use std::fmt;
use std::sync::Arc;

/// A query as seen by the wire: the opaque filter string produced by the
/// query translator plus any pagination modifiers.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct WireQuery {
    /// Opaque filter expression, already in the service's wire syntax.
    pub filter: Option<String>,
    /// Number of matching entities to skip.
    pub skip: Option<u64>,
    /// Maximum number of entities to return.
    pub limit: Option<u64>,
}

impl WireQuery {
    /// Returns true if the query carries pagination modifiers.
    #[must_use]
    pub fn is_paged(&self) -> bool {
        self.skip.is_some() || self.limit.is_some()
    }
}

/// A translated query over entities of type `T`.
///
/// Query translation happens upstream of this core: the translator maps a
/// language-native expression to an opaque wire filter string plus a
/// predicate the cache can evaluate. Both halves must describe the same
/// set of entities; the engine never inspects the wire string.
pub struct Query<T> {
    filter: Option<String>,
    predicate: Option<Arc<dyn Fn(&T) -> bool + Send + Sync>>,
    skip: Option<u64>,
    limit: Option<u64>,
}

impl<T> Query<T> {
    /// Creates a query matching every entity in the collection.
    #[must_use]
    pub fn all() -> Self {
        Self {
            filter: None,
            predicate: None,
            skip: None,
            limit: None,
        }
    }

    /// Sets the opaque wire filter string.
    #[must_use]
    pub fn with_filter(mut self, filter: impl Into<String>) -> Self {
        self.filter = Some(filter.into());
        self
    }

    /// Sets the cache-evaluable predicate.
    #[must_use]
    pub fn with_predicate(mut self, predicate: impl Fn(&T) -> bool + Send + Sync + 'static) -> Self {
        self.predicate = Some(Arc::new(predicate));
        self
    }

    /// Skips the first `n` matching entities.
    #[must_use]
    pub fn skip(mut self, n: u64) -> Self {
        self.skip = Some(n);
        self
    }

    /// Limits the result to `n` entities.
    #[must_use]
    pub fn limit(mut self, n: u64) -> Self {
        self.limit = Some(n);
        self
    }

    /// Returns the wire form of this query.
    #[must_use]
    pub fn wire(&self) -> WireQuery {
        WireQuery {
            filter: self.filter.clone(),
            skip: self.skip,
            limit: self.limit,
        }
    }

    /// Returns true if the query carries pagination modifiers.
    ///
    /// Paged queries are never served by the delta-set protocol.
    #[must_use]
    pub fn is_paged(&self) -> bool {
        self.skip.is_some() || self.limit.is_some()
    }

    /// Evaluates the predicate against one entity.
    ///
    /// A query without a predicate matches everything.
    pub fn matches(&self, entity: &T) -> bool {
        match &self.predicate {
            Some(predicate) => predicate(entity),
            None => true,
        }
    }

    /// The stable signature keying delta checkpoints.
    ///
    /// Two queries with the same signature describe the same wire request,
    /// so a checkpoint captured under one is valid for the other.
    #[must_use]
    pub fn signature(&self) -> String {
        format!(
            "f={};s={};l={}",
            self.filter.as_deref().unwrap_or(""),
            self.skip.map(|n| n.to_string()).unwrap_or_default(),
            self.limit.map(|n| n.to_string()).unwrap_or_default(),
        )
    }

    /// Applies skip/limit to an already-filtered entity list.
    #[must_use]
    pub fn paginate(&self, entities: Vec<T>) -> Vec<T> {
        let skip = self.skip.unwrap_or(0) as usize;
        let mut page: Vec<T> = entities.into_iter().skip(skip).collect();
        if let Some(limit) = self.limit {
            page.truncate(limit as usize);
        }
        page
    }
}

impl<T> Default for Query<T> {
    fn default() -> Self {
        Self::all()
    }
}

impl<T> Clone for Query<T> {
    fn clone(&self) -> Self {
        Self {
            filter: self.filter.clone(),
            predicate: self.predicate.clone(),
            skip: self.skip,
            limit: self.limit,
        }
    }
}

impl<T> fmt::Debug for Query<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Query")
            .field("filter", &self.filter)
            .field("predicate", &self.predicate.as_ref().map(|_| ".."))
            .field("skip", &self.skip)
            .field("limit", &self.limit)
            .finish()
    }
}
