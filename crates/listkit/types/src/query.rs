use serde::{Deserialize, Serialize};

use crate::filter::Filter;

/// Sort direction for [`OrderBy`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum SortDirection {
    #[default]
    Asc,
    Desc,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OrderBy {
    pub field: String,
    #[serde(default)]
    pub direction: SortDirection,
}

/// Arguments of `itemsQuery` / `itemsQueryMeta`.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct QueryArgs {
    #[serde(rename = "where", default)]
    pub where_: Filter,
    #[serde(default)]
    pub search: Option<String>,
    #[serde(default)]
    pub order_by: Option<OrderBy>,
    #[serde(default)]
    pub first: Option<usize>,
    #[serde(default)]
    pub skip: usize,
}

impl QueryArgs {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_where(mut self, filter: Filter) -> Self {
        self.where_ = filter;
        self
    }

    pub fn with_search(mut self, search: impl Into<String>) -> Self {
        self.search = Some(search.into());
        self
    }

    pub fn with_order_by(mut self, field: impl Into<String>, direction: SortDirection) -> Self {
        self.order_by = Some(OrderBy {
            field: field.into(),
            direction,
        });
        self
    }

    pub fn with_first(mut self, first: usize) -> Self {
        self.first = Some(first);
        self
    }

    pub fn with_skip(mut self, skip: usize) -> Self {
        self.skip = skip;
        self
    }
}

/// Result of `itemsQueryMeta`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct QueryMeta {
    pub count: usize,
}
