//! Lazy iteration over matching documents.

use docket_document::Document;
use tantivy::{DocAddress, Searcher};

use crate::{IndexError, docvalues::DocValuesReader};

/// A lazy, finite sequence of matching document ids.
///
/// The cursor owns the searcher it was created from, so the point-in-time
/// view stays pinned for as long as the cursor lives and is released when
/// it drops. A cursor cannot be rewound; re-issue the search for a fresh
/// one.
pub struct SearchCursor {
    /// The owned point-in-time view.
    searcher: Searcher,
    /// Addresses of every match, best first.
    addresses: Vec<DocAddress>,
    /// Collection schema snapshot for projections.
    schema: docket_document::Schema,
    /// Next address to yield.
    position: usize,
}

impl SearchCursor {
    /// Creates a cursor over pre-gathered addresses.
    pub(crate) fn new(
        searcher: Searcher,
        addresses: Vec<DocAddress>,
        schema: docket_document::Schema,
    ) -> Self {
        Self {
            searcher,
            addresses,
            schema,
            position: 0,
        }
    }

    /// Number of matches remaining.
    pub fn remaining(&self) -> usize {
        self.addresses.len() - self.position
    }

    /// Projects the next match through the doc-values reader, or `None`
    /// when exhausted.
    pub fn next_selected(&mut self, fields: &[String]) -> Option<Result<Document, IndexError>> {
        let address = *self.addresses.get(self.position)?;
        self.position += 1;
        let reader = DocValuesReader::new(&self.searcher, &self.schema);
        Some(reader.read(address, fields))
    }
}

impl Iterator for SearchCursor {
    type Item = Result<String, IndexError>;

    /// Yields the id of the next matching document.
    fn next(&mut self) -> Option<Self::Item> {
        let address = *self.addresses.get(self.position)?;
        self.position += 1;
        let reader = DocValuesReader::new(&self.searcher, &self.schema);
        Some(reader.read_id(address).map(|id| {
            id.map(|guid| guid.as_hyphenated().to_string())
                .unwrap_or_default()
        }))
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        let remaining = self.remaining();
        (remaining, Some(remaining))
    }
}
