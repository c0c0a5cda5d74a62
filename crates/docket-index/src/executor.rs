//! Search execution.
//!
//! Runs one search end to end against an acquired point-in-time searcher:
//! validate the criteria, resolve facet filters, compile the query, wrap it
//! in a drill-down when filters apply, gather counted-and-sorted hits,
//! compute facet counts with drill-sideways semantics, slice the requested
//! page, project ids, and optionally run the highlight pass over the page.
//!
//! Drill-sideways: facets other than the drilled one are counted on the
//! query *without* the drill, so their counts stay comparable; the drilled
//! facet is counted on the drilled query and expanded under each prefix of
//! the drilled path so the response reveals the selected sub-hierarchy.

use docket_document::Schema;
use docket_query::QueryError;
use tantivy::{
    DocAddress, Searcher, TantivyDocument, Term,
    collector::{Count, FacetCollector, FacetCounts, TopDocs},
    query::{BooleanQuery, Occur, Query, TermQuery},
    schema::{Facet, IndexRecordOption, Value as _},
    tokenizer::TextAnalyzer,
};
use tracing::warn;
use uuid::Uuid;

use crate::{
    IndexError,
    collector::TopHitsCollector,
    criteria::{FacetValue, SearchCriteria, SearchHit, SearchResult},
    docvalues::DocValuesReader,
    facets,
    highlight::highlight_page,
    query::{QueryCompiler, compile_sorts, parse_sort_spec},
    schema::{FACETS_COLUMN, IndexSchema},
};

/// One resolved drill-down filter.
struct DrillFilter {
    /// Facet name.
    name: String,
    /// Path segments below the facet name.
    segments: Vec<String>,
    /// The facet the filter selects.
    facet: Facet,
}

/// Executes searches against one acquired searcher.
pub struct SearchExecutor<'a> {
    /// The borrowed point-in-time view.
    searcher: &'a Searcher,
    /// Collection schema.
    schema: &'a Schema,
    /// Index field handles.
    index_schema: &'a IndexSchema,
    /// Full-text analyzer for query compilation.
    analyzer: TextAnalyzer,
    /// Null-token spelling.
    null_token: &'a str,
}

impl<'a> SearchExecutor<'a> {
    /// Creates an executor.
    pub fn new(
        searcher: &'a Searcher,
        schema: &'a Schema,
        index_schema: &'a IndexSchema,
        analyzer: TextAnalyzer,
        null_token: &'a str,
    ) -> Self {
        Self {
            searcher,
            schema,
            index_schema,
            analyzer,
            null_token,
        }
    }

    /// Runs a full search.
    pub fn search(&self, criteria: &SearchCriteria) -> Result<SearchResult, IndexError> {
        criteria.validate().map_err(IndexError::InvalidCriteria)?;

        let filters = self.resolve_filters(&criteria.facet_filters)?;
        let base = self.compile(&criteria.query)?;
        let drilled = self.drill_down(&*base, &filters);

        let sorts = match criteria.sort_by_fields.as_deref() {
            Some(spec) => compile_sorts(&parse_sort_spec(spec)?, self.schema)?,
            None => Vec::new(),
        };

        let collected = self
            .searcher
            .search(&*drilled, &TopHitsCollector::new(criteria.top_n, sorts))
            .map_err(|e| IndexError::Write(e.to_string()))?;

        let facets = if criteria.top_n_facets > 0 {
            self.count_facets(criteria, &*base, &*drilled, &filters)?
        } else {
            Vec::new()
        };

        let item_count = collected.hits.len();
        let page_start = (criteria.page_number - 1) * criteria.items_per_page;
        let page_addresses: Vec<DocAddress> = collected
            .hits
            .iter()
            .skip(page_start)
            .take(criteria.items_per_page)
            .map(|hit| hit.address)
            .collect();

        let mut page = Vec::with_capacity(page_addresses.len());
        for address in &page_addresses {
            page.push(self.stored_id_and_text(*address)?);
        }

        let mut highlights = std::collections::HashMap::new();
        if criteria.include_highlight && !page.is_empty() {
            match docket_query::parse(&criteria.query) {
                Ok(Some(expr)) => {
                    match highlight_page(&expr, self.analyzer.clone(), &page) {
                        Ok(found) => highlights = found,
                        Err(e) => warn!(error = %e, "highlight pass failed, returning hits unhighlighted"),
                    }
                }
                Ok(None) => {}
                Err(e) => warn!(error = %e, "highlight pass failed, returning hits unhighlighted"),
            }
        }

        let mut items = Vec::with_capacity(page.len());
        for (address, (id, _)) in page_addresses.iter().zip(page.into_iter()) {
            let highlight = highlights.remove(&id);
            let document = if criteria.select_fields.is_empty() {
                None
            } else {
                let reader = DocValuesReader::new(self.searcher, self.schema);
                Some(reader.read(*address, &criteria.select_fields)?.to_json())
            };
            items.push(SearchHit {
                id,
                highlight,
                document,
            });
        }

        Ok(SearchResult {
            query: criteria.query.clone(),
            sort_by_fields: criteria.sort_by_fields.clone(),
            top_n: criteria.top_n,
            item_count,
            total_hits: collected.total,
            page_count: item_count.div_ceil(criteria.items_per_page),
            page_number: criteria.page_number,
            items_per_page: criteria.items_per_page,
            include_highlight: criteria.include_highlight,
            items,
            facets,
            facet_filters: criteria.facet_filters.clone(),
            top_n_facets: criteria.top_n_facets,
        })
    }

    /// Counts matches without materializing anything.
    pub fn count(&self, query: &str) -> Result<usize, IndexError> {
        let compiled = self.compile(query)?;
        self.searcher
            .search(&*compiled, &Count)
            .map_err(|e| IndexError::Write(e.to_string()))
    }

    /// Finds the address of the live document with the given id.
    pub fn find_by_id(&self, id: Uuid) -> Result<Option<DocAddress>, IndexError> {
        let term = Term::from_field_text(self.index_schema.id, &id.as_hyphenated().to_string());
        let query = TermQuery::new(term, IndexRecordOption::Basic);
        let top = self
            .searcher
            .search(&query, &TopDocs::with_limit(1))
            .map_err(|e| IndexError::Write(e.to_string()))?;
        Ok(top.first().map(|(_, address)| *address))
    }

    /// Gathers the addresses of every match, best-first, up to `limit`.
    pub fn matching_addresses(
        &self,
        query: &str,
        limit: usize,
    ) -> Result<Vec<DocAddress>, IndexError> {
        let compiled = self.compile(query)?;
        let collected = self
            .searcher
            .search(&*compiled, &TopHitsCollector::new(limit, Vec::new()))
            .map_err(|e| IndexError::Write(e.to_string()))?;
        Ok(collected.hits.into_iter().map(|hit| hit.address).collect())
    }

    /// Compiles a query string against the collection schema.
    fn compile(&self, query: &str) -> Result<Box<dyn Query>, IndexError> {
        let mut compiler = QueryCompiler::new(
            self.index_schema,
            self.schema,
            self.analyzer.clone(),
            self.null_token,
        );
        Ok(compiler.compile_str(query)?)
    }

    /// Parses and validates drill-down filters against the known facets.
    ///
    /// The facet name resolves first so the path can split on that facet's
    /// configured hierarchy separator, matching the labels the builder
    /// wrote.
    fn resolve_filters(&self, specs: &[String]) -> Result<Vec<DrillFilter>, IndexError> {
        specs
            .iter()
            .map(|spec| {
                let (name, path) = facets::split_filter(spec).ok_or_else(|| {
                    QueryError::compile(format!("invalid facet filter: {spec:?}"))
                })?;
                let Some((_, settings)) = self.schema.find_facet(name) else {
                    return Err(QueryError::compile(format!("unknown facet: {name}")).into());
                };
                let segments = facets::split_hierarchy(path, &settings.hierarchy_separator);
                let facet = facets::filter_facet(name, &segments);
                Ok(DrillFilter {
                    name: name.to_string(),
                    segments,
                    facet,
                })
            })
            .collect()
    }

    /// Wraps the base query in a conjunction over the drill filters.
    ///
    /// Filters on the same facet OR together; filters on different facets
    /// AND together.
    fn drill_down(&self, base: &dyn Query, filters: &[DrillFilter]) -> Box<dyn Query> {
        if filters.is_empty() {
            return base.box_clone();
        }

        let mut clauses: Vec<(Occur, Box<dyn Query>)> = vec![(Occur::Must, base.box_clone())];

        let mut grouped: Vec<(&str, Vec<&DrillFilter>)> = Vec::new();
        for filter in filters {
            match grouped.iter_mut().find(|(name, _)| *name == filter.name) {
                Some((_, group)) => group.push(filter),
                None => grouped.push((&filter.name, vec![filter])),
            }
        }

        for (_, group) in grouped {
            let terms: Vec<(Occur, Box<dyn Query>)> = group
                .iter()
                .map(|filter| {
                    let term = Term::from_facet(self.index_schema.facets, &filter.facet);
                    (
                        Occur::Should,
                        Box::new(TermQuery::new(term, IndexRecordOption::Basic))
                            as Box<dyn Query>,
                    )
                })
                .collect();
            if terms.len() == 1 {
                clauses.push((Occur::Must, terms.into_iter().next().unwrap().1));
            } else {
                clauses.push((Occur::Must, Box::new(BooleanQuery::new(terms))));
            }
        }

        Box::new(BooleanQuery::new(clauses))
    }

    /// Computes facet counts with drill-sideways semantics.
    fn count_facets(
        &self,
        criteria: &SearchCriteria,
        base: &dyn Query,
        drilled: &dyn Query,
        filters: &[DrillFilter],
    ) -> Result<Vec<FacetValue>, IndexError> {
        let names: Vec<String> = if criteria.facets_to_return.is_empty() {
            self.schema
                .facet_fields()
                .into_iter()
                .filter_map(|f| f.facet_settings.map(|s| s.facet_name))
                .collect()
        } else {
            for name in &criteria.facets_to_return {
                if self.schema.find_facet(name).is_none() {
                    return Err(QueryError::compile(format!("unknown facet: {name}")).into());
                }
            }
            criteria.facets_to_return.clone()
        };

        let mut out = Vec::with_capacity(names.len());
        for name in names {
            let drill = filters.iter().find(|f| f.name == name);

            let mut collector = FacetCollector::for_field(FACETS_COLUMN);
            let mut prefixes = vec![Facet::from_path([name.as_str()])];
            if let Some(drill) = drill {
                let mut path = vec![name.clone()];
                for segment in &drill.segments {
                    path.push(segment.clone());
                    prefixes.push(Facet::from_path(path.clone()));
                }
            }
            for prefix in &prefixes {
                collector.add_facet(prefix.clone());
            }

            // The drilled facet reflects its own filter; all others are
            // counted as if no drill happened.
            let query: &dyn Query = if drill.is_some() { drilled } else { base };
            let counts = self
                .searcher
                .search(query, &collector)
                .map_err(|e| IndexError::Write(e.to_string()))?;

            out.push(build_facet_tree(
                &name,
                drill.map(|d| d.segments.as_slice()).unwrap_or(&[]),
                &counts,
                criteria.top_n_facets,
            ));
        }
        Ok(out)
    }

    /// Reads the stored id and full-text projection of one hit.
    fn stored_id_and_text(&self, address: DocAddress) -> Result<(String, String), IndexError> {
        let doc: TantivyDocument = self
            .searcher
            .doc(address)
            .map_err(|e| IndexError::Write(e.to_string()))?;
        let id = doc
            .get_first(self.index_schema.id)
            .and_then(|v| v.as_str())
            .unwrap_or_default()
            .to_string();
        let full_text = doc
            .get_first(self.index_schema.full_text)
            .and_then(|v| v.as_str())
            .unwrap_or_default()
            .to_string();
        Ok((id, full_text))
    }
}

/// Assembles the count tree for one facet.
///
/// Without a drill this is the top `k` immediate children of the facet.
/// With a drill, each prefix of the drilled path is expanded so the
/// response shows the hierarchy down to (and below) the selected path.
fn build_facet_tree(
    name: &str,
    drill_segments: &[String],
    counts: &FacetCounts,
    k: usize,
) -> FacetValue {
    let root_facet = Facet::from_path([name]);
    let mut root = FacetValue::leaf(name, 0);
    root.values = facet_children(counts, &root_facet, k);
    root.count = root.values.iter().map(|v| v.count).sum();

    // Expand the drilled chain: walk down the path, attaching each level's
    // children to the matching node.
    let mut path = vec![name.to_string()];
    for segment in drill_segments {
        path.push(segment.clone());
        let prefix = Facet::from_path(path.clone());
        let children = facet_children(counts, &prefix, k);

        if let Some(node) = find_node_mut(&mut root, &path[1..]) {
            node.values = children;
        }
    }
    root
}

/// The top `k` children directly below a facet prefix.
fn facet_children(counts: &FacetCounts, prefix: &Facet, k: usize) -> Vec<FacetValue> {
    let prefix_str = prefix.to_path_string();
    counts
        .top_k(prefix_str.as_str(), k)
        .into_iter()
        .map(|(facet, count)| {
            let full = facet.to_path_string();
            let segment = full
                .strip_prefix(prefix_str.as_str())
                .unwrap_or(&full)
                .trim_start_matches('/')
                .replace("\\/", "/");
            FacetValue::leaf(segment, count)
        })
        .collect()
}

/// Finds the node at a segment path below the root, if it was counted.
fn find_node_mut<'a>(root: &'a mut FacetValue, segments: &[String]) -> Option<&'a mut FacetValue> {
    let mut node = root;
    for segment in segments {
        node = node.values.iter_mut().find(|v| v.name == *segment)?;
    }
    Some(node)
}
