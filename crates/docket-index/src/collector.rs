//! Hit collection with total counting and sort-column ordering.
//!
//! [`TopHitsCollector`] walks every match once, counting the total and
//! keeping the top N hits ordered by the compiled sort descriptors (score
//! order when none are given). Sort keys are read from the fast columns the
//! mapper emitted; a document without a value in some sort column compares
//! as larger than every present value, which puts it last ascending and
//! first descending. Hits with identical keys stay in score order.

use std::cmp::Ordering;

use tantivy::{
    DocAddress, DocId, Score, SegmentOrdinal, SegmentReader,
    collector::{Collector, SegmentCollector},
    columnar::{Column, StrColumn},
};

use crate::query::{CompiledSort, SortKind};

/// One sort key component read from a fast column.
#[derive(Debug, Clone, PartialEq)]
pub enum SortValue {
    /// Unsigned integer column (booleans, ticks).
    U64(u64),
    /// Double column.
    F64(f64),
    /// Byte-string column (already lowercased/truncated at index time).
    Bytes(Vec<u8>),
    /// The document has no value in this column.
    Missing,
}

impl SortValue {
    /// Compares two key components of the same kind; missing sorts after
    /// everything.
    fn cmp_same_kind(&self, other: &Self) -> Ordering {
        match (self, other) {
            (Self::Missing, Self::Missing) => Ordering::Equal,
            (Self::Missing, _) => Ordering::Greater,
            (_, Self::Missing) => Ordering::Less,
            (Self::U64(a), Self::U64(b)) => a.cmp(b),
            (Self::F64(a), Self::F64(b)) => a.total_cmp(b),
            (Self::Bytes(a), Self::Bytes(b)) => a.cmp(b),
            // Kinds never mix within one column; treat as equal if they do.
            _ => Ordering::Equal,
        }
    }
}

/// A collected hit with its sort keys.
#[derive(Debug, Clone)]
pub struct Hit {
    /// Where the document lives.
    pub address: DocAddress,
    /// BM25 score.
    pub score: Score,
    /// One key per sort descriptor.
    keys: Vec<SortValue>,
}

/// The collector's fruit: total match count plus the ordered top hits.
pub struct CollectedHits {
    /// Number of documents that matched the query.
    pub total: usize,
    /// Top hits in final order.
    pub hits: Vec<Hit>,
}

/// Orders two hits under the given descriptors.
fn compare_hits(sorts: &[CompiledSort], a: &Hit, b: &Hit) -> Ordering {
    for (index, sort) in sorts.iter().enumerate() {
        let mut ordering = a.keys[index].cmp_same_kind(&b.keys[index]);
        if sort.descending {
            ordering = ordering.reverse();
        }
        if ordering != Ordering::Equal {
            return ordering;
        }
    }
    // Identical keys (or no sort at all): best score first, then a stable
    // address order.
    b.score
        .total_cmp(&a.score)
        .then_with(|| a.address.cmp(&b.address))
}

/// Collects the total hit count and the sorted top N matches.
pub struct TopHitsCollector {
    /// Maximum number of hits to keep.
    limit: usize,
    /// Sort descriptors, outermost first.
    sorts: Vec<CompiledSort>,
}

impl TopHitsCollector {
    /// Creates a collector keeping `limit` hits under `sorts`.
    pub fn new(limit: usize, sorts: Vec<CompiledSort>) -> Self {
        Self { limit, sorts }
    }
}

impl Collector for TopHitsCollector {
    type Fruit = CollectedHits;
    type Child = TopHitsSegmentCollector;

    fn for_segment(
        &self,
        segment_local_id: SegmentOrdinal,
        segment: &SegmentReader,
    ) -> tantivy::Result<Self::Child> {
        let readers = self
            .sorts
            .iter()
            .map(|sort| ColumnReader::open(segment, sort))
            .collect();

        Ok(TopHitsSegmentCollector {
            segment_ord: segment_local_id,
            limit: self.limit,
            sorts: self.sorts.clone(),
            readers,
            total: 0,
            hits: Vec::new(),
        })
    }

    fn requires_scoring(&self) -> bool {
        true
    }

    fn merge_fruits(&self, segment_fruits: Vec<CollectedHits>) -> tantivy::Result<CollectedHits> {
        let mut total = 0;
        let mut hits = Vec::new();
        for fruit in segment_fruits {
            total += fruit.total;
            hits.extend(fruit.hits);
        }
        hits.sort_by(|a, b| compare_hits(&self.sorts, a, b));
        hits.truncate(self.limit);
        Ok(CollectedHits { total, hits })
    }
}

/// Per-sort fast-column accessor for one segment.
enum ColumnReader {
    /// u64 column (booleans, ticks).
    U64(Option<Column<u64>>),
    /// f64 column (numbers).
    F64(Option<Column<f64>>),
    /// String dictionary column (text, guids).
    Str(Option<StrColumn>),
}

impl ColumnReader {
    /// Opens the column a descriptor points at; a segment without the
    /// column yields all-missing keys.
    fn open(segment: &SegmentReader, sort: &CompiledSort) -> Self {
        let fast_fields = segment.fast_fields();
        match sort.kind {
            SortKind::U64 => Self::U64(fast_fields.u64(&sort.column).ok()),
            SortKind::F64 => Self::F64(fast_fields.f64(&sort.column).ok()),
            SortKind::Str => Self::Str(fast_fields.str(&sort.column).ok().flatten()),
        }
    }

    /// Reads the key component for one document.
    fn read(&self, doc: DocId) -> SortValue {
        match self {
            Self::U64(Some(column)) => column
                .first(doc)
                .map_or(SortValue::Missing, SortValue::U64),
            Self::F64(Some(column)) => column
                .first(doc)
                .map_or(SortValue::Missing, SortValue::F64),
            Self::Str(Some(column)) => {
                let Some(ord) = column.term_ords(doc).next() else {
                    return SortValue::Missing;
                };
                let mut bytes = Vec::new();
                if column.ord_to_bytes(ord, &mut bytes).is_ok() {
                    SortValue::Bytes(bytes)
                } else {
                    SortValue::Missing
                }
            }
            Self::U64(None) | Self::F64(None) | Self::Str(None) => SortValue::Missing,
        }
    }
}

/// Segment-level worker for [`TopHitsCollector`].
pub struct TopHitsSegmentCollector {
    /// Ordinal of the segment being collected.
    segment_ord: SegmentOrdinal,
    /// Maximum hits to keep per segment.
    limit: usize,
    /// Sort descriptors (shared with the parent).
    sorts: Vec<CompiledSort>,
    /// Column accessors, one per descriptor.
    readers: Vec<ColumnReader>,
    /// Matches seen in this segment.
    total: usize,
    /// Hits gathered so far.
    hits: Vec<Hit>,
}

impl SegmentCollector for TopHitsSegmentCollector {
    type Fruit = CollectedHits;

    fn collect(&mut self, doc: DocId, score: Score) {
        self.total += 1;
        let keys = self.readers.iter().map(|r| r.read(doc)).collect();
        self.hits.push(Hit {
            address: DocAddress::new(self.segment_ord, doc),
            score,
            keys,
        });
    }

    fn harvest(mut self) -> CollectedHits {
        self.hits.sort_by(|a, b| compare_hits(&self.sorts, a, b));
        self.hits.truncate(self.limit);
        CollectedHits {
            total: self.total,
            hits: self.hits,
        }
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::query::{CompiledSort, SortKind};

    fn hit(keys: Vec<SortValue>, score: f32, doc: u32) -> Hit {
        Hit {
            address: DocAddress::new(0, doc),
            score,
            keys,
        }
    }

    fn asc(column: &str, kind: SortKind) -> CompiledSort {
        CompiledSort {
            column: column.to_string(),
            kind,
            descending: false,
        }
    }

    fn desc(column: &str, kind: SortKind) -> CompiledSort {
        CompiledSort {
            column: column.to_string(),
            kind,
            descending: true,
        }
    }

    #[test]
    fn no_sort_orders_by_score() {
        let sorts = vec![];
        let a = hit(vec![], 0.5, 1);
        let b = hit(vec![], 0.9, 2);
        assert_eq!(compare_hits(&sorts, &b, &a), Ordering::Less);
    }

    #[test]
    fn ascending_numbers() {
        let sorts = vec![asc("c", SortKind::F64)];
        let low = hit(vec![SortValue::F64(1.0)], 0.0, 1);
        let high = hit(vec![SortValue::F64(2.0)], 0.0, 2);
        assert_eq!(compare_hits(&sorts, &low, &high), Ordering::Less);
    }

    #[test]
    fn descending_reverses() {
        let sorts = vec![desc("c", SortKind::F64)];
        let low = hit(vec![SortValue::F64(1.0)], 0.0, 1);
        let high = hit(vec![SortValue::F64(2.0)], 0.0, 2);
        assert_eq!(compare_hits(&sorts, &high, &low), Ordering::Less);
    }

    #[test]
    fn missing_sorts_last_ascending() {
        let sorts = vec![asc("c", SortKind::F64)];
        let present = hit(vec![SortValue::F64(99.0)], 0.0, 1);
        let missing = hit(vec![SortValue::Missing], 0.0, 2);
        assert_eq!(compare_hits(&sorts, &present, &missing), Ordering::Less);
    }

    #[test]
    fn missing_sorts_first_descending() {
        let sorts = vec![desc("c", SortKind::F64)];
        let present = hit(vec![SortValue::F64(99.0)], 0.0, 1);
        let missing = hit(vec![SortValue::Missing], 0.0, 2);
        assert_eq!(compare_hits(&sorts, &missing, &present), Ordering::Less);
    }

    #[test]
    fn byte_keys_compare_lexicographically() {
        let sorts = vec![asc("c", SortKind::Str)];
        let a = hit(vec![SortValue::Bytes(b"apple".to_vec())], 0.0, 1);
        let b = hit(vec![SortValue::Bytes(b"banana".to_vec())], 0.0, 2);
        assert_eq!(compare_hits(&sorts, &a, &b), Ordering::Less);
    }

    #[test]
    fn secondary_key_breaks_ties() {
        let sorts = vec![asc("c1", SortKind::U64), desc("c2", SortKind::U64)];
        let a = hit(vec![SortValue::U64(1), SortValue::U64(5)], 0.0, 1);
        let b = hit(vec![SortValue::U64(1), SortValue::U64(9)], 0.0, 2);
        // Same first key; second key descending puts the 9 first.
        assert_eq!(compare_hits(&sorts, &b, &a), Ordering::Less);
    }

    #[test]
    fn equal_keys_fall_back_to_score() {
        let sorts = vec![asc("c", SortKind::U64)];
        let weak = hit(vec![SortValue::U64(7)], 0.1, 1);
        let strong = hit(vec![SortValue::U64(7)], 0.9, 2);
        assert_eq!(compare_hits(&sorts, &strong, &weak), Ordering::Less);
    }
}
