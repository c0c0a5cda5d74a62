//! Search criteria and result types.

use serde::Serialize;

/// Default hit-list cap.
const DEFAULT_TOP_N: usize = 1000;

/// Default page size.
const DEFAULT_ITEMS_PER_PAGE: usize = 10;

/// What to run against a collection.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SearchCriteria {
    /// Query string; empty means match-all.
    pub query: String,
    /// Sort specification (`a:asc,b:desc` or a signed single field).
    pub sort_by_fields: Option<String>,
    /// Maximum hits to gather before paginating.
    pub top_n: usize,
    /// Page size.
    pub items_per_page: usize,
    /// 1-based page to return.
    pub page_number: usize,
    /// Attach highlighted fragments to the returned page.
    pub include_highlight: bool,
    /// Facets to count; empty means every known facet.
    pub facets_to_return: Vec<String>,
    /// Drill-down filters, `Name:path/under/name` each.
    pub facet_filters: Vec<String>,
    /// Facet values to return per facet; 0 disables facet counting.
    pub top_n_facets: usize,
    /// Fields to project per hit from the grouping columns; `["*"]` selects
    /// everything projectable, empty skips projection.
    pub select_fields: Vec<String>,
}

impl Default for SearchCriteria {
    fn default() -> Self {
        Self {
            query: String::new(),
            sort_by_fields: None,
            top_n: DEFAULT_TOP_N,
            items_per_page: DEFAULT_ITEMS_PER_PAGE,
            page_number: 1,
            include_highlight: false,
            facets_to_return: Vec::new(),
            facet_filters: Vec::new(),
            top_n_facets: 0,
            select_fields: Vec::new(),
        }
    }
}

impl SearchCriteria {
    /// Creates criteria for a query string with defaults everywhere else.
    pub fn for_query(query: impl Into<String>) -> Self {
        Self {
            query: query.into(),
            ..Self::default()
        }
    }

    /// Sets the sort specification.
    pub fn sorted_by(mut self, spec: impl Into<String>) -> Self {
        self.sort_by_fields = Some(spec.into());
        self
    }

    /// Sets the hit-list cap.
    pub fn top(mut self, top_n: usize) -> Self {
        self.top_n = top_n;
        self
    }

    /// Sets the page size and number.
    pub fn page(mut self, items_per_page: usize, page_number: usize) -> Self {
        self.items_per_page = items_per_page;
        self.page_number = page_number;
        self
    }

    /// Enables the highlight pass.
    pub fn highlighted(mut self) -> Self {
        self.include_highlight = true;
        self
    }

    /// Enables facet counting for the top `n` values per facet.
    pub fn with_facets(mut self, n: usize) -> Self {
        self.top_n_facets = n;
        self
    }

    /// Adds a drill-down filter.
    pub fn drill(mut self, filter: impl Into<String>) -> Self {
        self.facet_filters.push(filter.into());
        self
    }

    /// Projects the named fields onto each returned hit.
    pub fn select(mut self, fields: &[&str]) -> Self {
        self.select_fields = fields.iter().map(|f| f.to_string()).collect();
        self
    }

    /// Checks the numeric knobs; zero or negative paging is meaningless.
    pub fn validate(&self) -> Result<(), String> {
        if self.top_n == 0 {
            return Err("topN must be positive".to_string());
        }
        if self.items_per_page == 0 {
            return Err("itemsPerPage must be positive".to_string());
        }
        if self.page_number == 0 {
            return Err("pageNumber must be positive".to_string());
        }
        Ok(())
    }
}

/// One returned hit.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SearchHit {
    /// Document guid, canonical lowercase form.
    pub id: String,
    /// Highlighted fragments when the highlight pass ran for this hit.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub highlight: Option<String>,
    /// Projected field values when the criteria selected fields.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub document: Option<serde_json::Value>,
}

/// A facet value with its count and (for hierarchical facets) children.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct FacetValue {
    /// Segment name (facet name at the root).
    pub name: String,
    /// Documents carrying this value.
    pub count: u64,
    /// Child values, outer-to-inner.
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub values: Vec<FacetValue>,
}

impl FacetValue {
    /// Creates a leaf value.
    pub fn leaf(name: impl Into<String>, count: u64) -> Self {
        Self {
            name: name.into(),
            count,
            values: Vec::new(),
        }
    }

    /// Finds a direct child by name.
    pub fn child(&self, name: &str) -> Option<&FacetValue> {
        self.values.iter().find(|v| v.name == name)
    }
}

/// The answer to a search.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SearchResult {
    /// The query as given.
    pub query: String,
    /// The sort specification as given.
    pub sort_by_fields: Option<String>,
    /// The hit-list cap that applied.
    pub top_n: usize,
    /// Hits gathered (min of `top_n` and `total_hits`).
    pub item_count: usize,
    /// Documents matching the query overall.
    pub total_hits: usize,
    /// Pages available under the current page size.
    pub page_count: usize,
    /// The returned page, 1-based.
    pub page_number: usize,
    /// Page size that applied.
    pub items_per_page: usize,
    /// Whether the highlight pass ran.
    pub include_highlight: bool,
    /// The returned page of hits.
    pub items: Vec<SearchHit>,
    /// Facet counts, one root per counted facet.
    pub facets: Vec<FacetValue>,
    /// The drill-down filters as given.
    pub facet_filters: Vec<String>,
    /// Facet values requested per facet.
    pub top_n_facets: usize,
}
