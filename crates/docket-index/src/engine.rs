//! The per-collection index engine.
//!
//! One [`CollectionEngine`] owns everything a collection needs: the live
//! schema, the tantivy index and its writer, the searcher manager, and the
//! background refresh tick. Writes are serialized through the writer and
//! each returns after its commit is durable; a committed write becomes
//! visible to searches after the next refresh tick (about one second) or
//! an explicit [`CollectionEngine::refresh`].
//!
//! Lifecycle: `open → (serving) → close`/`drop_collection`. Operations
//! issued after close fail with [`IndexError::EngineClosed`]. The refresh
//! tick is tied to the engine and stops on close.

use std::{
    fs,
    path::{Path, PathBuf},
    sync::{
        Mutex, MutexGuard,
        atomic::{AtomicU8, Ordering},
    },
    time::Duration,
};

use docket_document::{
    CREATED_FIELD, Document, FULL_TEXT_FIELD, FacetSettings, ID_FIELD, MODIFIED_FIELD, Schema,
    SchemaError, SchemaField, Value,
};
use tantivy::tokenizer::TextAnalyzer;
use tokio::{sync::watch, task::JoinHandle};
use tracing::{debug, info};
use uuid::Uuid;

use crate::{
    IndexError,
    analyzer::build_full_text_analyzer,
    criteria::{SearchCriteria, SearchResult},
    cursor::SearchCursor,
    docvalues::DocValuesReader,
    executor::SearchExecutor,
    mapper::DocumentMapper,
    reader::SearcherManager,
    schema::IndexSchema,
    settings::IndexSettings,
    store::{FileSchemaStore, SchemaStore},
    writer::{IndexWriter, delete_index_files, open_index},
};

/// Engine is serving requests.
const STATE_OPEN: u8 = 0;

/// Engine is shutting down or shut down; requests are refused.
const STATE_CLOSED: u8 = 1;

/// Subdirectory holding the tantivy index.
const INDEX_DIR: &str = "index";

/// The search/indexing engine of one collection.
pub struct CollectionEngine {
    /// Collection name.
    name: String,
    /// Collection directory (index subdirectory plus schema file).
    dir: PathBuf,
    /// Engine settings.
    settings: IndexSettings,
    /// The live, growing schema.
    schema: Schema,
    /// Index field handles.
    index_schema: IndexSchema,
    /// Document-to-index lowering.
    mapper: DocumentMapper,
    /// Full-text analyzer shared with compilation and highlighting.
    analyzer: TextAnalyzer,
    /// The single writer; `None` once closed.
    writer: Mutex<Option<IndexWriter>>,
    /// Searcher publication.
    reader: SearcherManager,
    /// Schema persistence.
    store: Box<dyn SchemaStore>,
    /// Lifecycle state.
    state: AtomicU8,
    /// Signals the refresh task to stop.
    shutdown: watch::Sender<bool>,
    /// The refresh task, joined on close.
    refresh_task: Mutex<Option<JoinHandle<()>>>,
}

impl CollectionEngine {
    /// Opens (or creates) the engine for a collection directory.
    ///
    /// A persisted schema is hydrated before the index is opened; a new
    /// collection starts from the default schema holding only the reserved
    /// fields. Must run inside a tokio runtime (the refresh tick is
    /// spawned here).
    pub fn open(
        dir: impl Into<PathBuf>,
        name: impl Into<String>,
        settings: IndexSettings,
    ) -> Result<Self, IndexError> {
        let dir = dir.into();
        let name = name.into();
        fs::create_dir_all(&dir)?;

        let store = FileSchemaStore::in_dir(&dir);
        let schema = match store.load()? {
            Some(mut persisted) => {
                persisted.set_auto_facet(settings.auto_facet);
                persisted
            }
            None => Schema::with_defaults(name.clone(), settings.auto_facet),
        };

        let index_schema = IndexSchema::new();
        let index = open_index(&dir.join(INDEX_DIR), &index_schema, &settings)?;
        let writer = IndexWriter::new(&index, index_schema.clone(), settings.writer_heap_bytes)?;
        let reader = SearcherManager::new(&index)?;
        let analyzer = build_full_text_analyzer(settings.lowercase, settings.stemming);
        let mapper = DocumentMapper::new(index_schema.clone(), settings.auto_facet);

        let (shutdown, shutdown_rx) = watch::channel(false);
        let refresh_task = tokio::spawn(refresh_loop(
            reader.clone(),
            settings.refresh_interval,
            shutdown_rx,
        ));

        info!(collection = %name, dir = %dir.display(), "collection engine opened");

        Ok(Self {
            name,
            dir,
            settings,
            schema,
            index_schema,
            mapper,
            analyzer,
            writer: Mutex::new(Some(writer)),
            reader,
            store: Box::new(store),
            state: AtomicU8::new(STATE_OPEN),
            shutdown,
            refresh_task: Mutex::new(Some(refresh_task)),
        })
    }

    /// Collection name.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// A consistent snapshot of the live schema.
    pub fn schema(&self) -> Vec<SchemaField> {
        self.schema.snapshot()
    }

    /// Configures a facet on a field and persists the schema.
    pub fn configure_facet(
        &self,
        field: &str,
        settings: FacetSettings,
    ) -> Result<(), IndexError> {
        self.check_open()?;
        self.schema.configure_facet(field, settings);
        self.store.save(&self.schema)
    }

    /// Inserts a JSON document, minting an id when absent.
    ///
    /// Returns the document id once the write is committed.
    pub async fn insert_json(&self, json: serde_json::Value) -> Result<Uuid, IndexError> {
        self.insert(Document::from_json(json)?).await
    }

    /// Inserts a document, minting an id when absent.
    pub async fn insert(&self, mut doc: Document) -> Result<Uuid, IndexError> {
        self.check_open()?;
        doc.remove(FULL_TEXT_FIELD);
        let id = doc.ensure_id()?;
        doc.touch(true);
        self.write(&doc, false)?;
        Ok(id)
    }

    /// Replaces the document with the same id (delete-by-term plus add in
    /// one commit).
    ///
    /// The write stamps are engine-owned: a payload carrying
    /// `_createdTimestamp` or `_modifiedTimestamp` is rejected, and `_id`
    /// must be a guid.
    pub async fn update(&self, mut doc: Document) -> Result<Uuid, IndexError> {
        self.check_open()?;
        let id = match doc.get(ID_FIELD) {
            Some(Value::Guid(guid)) => *guid,
            Some(other) => return Err(SchemaError::InvalidId(other.data_type()).into()),
            None => return Err(SchemaError::MissingId.into()),
        };
        for reserved in [CREATED_FIELD, MODIFIED_FIELD] {
            if doc.get(reserved).is_some() {
                return Err(SchemaError::ReservedField(reserved.to_string()).into());
            }
        }
        doc.remove(FULL_TEXT_FIELD);
        doc.touch(false);
        self.write(&doc, true)?;
        Ok(id)
    }

    /// Deletes the document with the given id.
    pub async fn delete(&self, id: Uuid) -> Result<(), IndexError> {
        self.check_open()?;
        let mut guard = self.lock_writer()?;
        let writer = guard.as_mut().ok_or(IndexError::EngineClosed)?;
        writer.delete_by_id(id);
        writer.commit()
    }

    /// Runs a search.
    pub async fn search(&self, criteria: &SearchCriteria) -> Result<SearchResult, IndexError> {
        self.check_open()?;
        let searcher = self.reader.acquire();
        let executor = SearchExecutor::new(
            &searcher,
            &self.schema,
            &self.index_schema,
            self.analyzer.clone(),
            &self.settings.null_token,
        );
        executor.search(criteria)
    }

    /// Counts matches without materializing documents.
    pub async fn count(&self, query: &str) -> Result<usize, IndexError> {
        self.check_open()?;
        let searcher = self.reader.acquire();
        let executor = SearchExecutor::new(
            &searcher,
            &self.schema,
            &self.index_schema,
            self.analyzer.clone(),
            &self.settings.null_token,
        );
        executor.count(query)
    }

    /// Projects one document's fields from the index columns.
    ///
    /// `fields` of `["*"]` selects everything projectable. Returns `None`
    /// when no live document carries the id.
    pub async fn select(
        &self,
        id: Uuid,
        fields: &[String],
    ) -> Result<Option<Document>, IndexError> {
        self.check_open()?;
        let searcher = self.reader.acquire();
        let executor = SearchExecutor::new(
            &searcher,
            &self.schema,
            &self.index_schema,
            self.analyzer.clone(),
            &self.settings.null_token,
        );
        let Some(address) = executor.find_by_id(id)? else {
            return Ok(None);
        };
        let reader = DocValuesReader::new(&searcher, &self.schema);
        reader.read(address, fields).map(Some)
    }

    /// Opens a cursor over every match of a query, best first.
    ///
    /// The cursor owns its point-in-time view; restarting means re-issuing
    /// the search.
    pub async fn cursor(&self, query: &str, limit: usize) -> Result<SearchCursor, IndexError> {
        self.check_open()?;
        let searcher = self.reader.acquire();
        let addresses = {
            let executor = SearchExecutor::new(
                &searcher,
                &self.schema,
                &self.index_schema,
                self.analyzer.clone(),
                &self.settings.null_token,
            );
            executor.matching_addresses(query, limit)?
        };
        Ok(SearchCursor::new(searcher, addresses, self.schema.clone()))
    }

    /// Publishes a searcher view including every commit so far. Use this
    /// for read-your-own-writes; otherwise the background tick gets there
    /// within about a second.
    pub fn refresh(&self) -> Result<(), IndexError> {
        self.reader.refresh()
    }

    /// Stops the refresh tick and shuts the writer down. Further
    /// operations fail with [`IndexError::EngineClosed`].
    pub async fn close(&self) -> Result<(), IndexError> {
        if self.state.swap(STATE_CLOSED, Ordering::SeqCst) == STATE_CLOSED {
            return Ok(());
        }
        let _ = self.shutdown.send(true);

        let task = self.refresh_task.lock().ok().and_then(|mut t| t.take());
        if let Some(task) = task {
            let _ = task.await;
        }

        let writer = self.lock_writer()?.take();
        if let Some(writer) = writer {
            writer.close()?;
        }

        info!(collection = %self.name, "collection engine closed");
        Ok(())
    }

    /// Closes the engine and deletes the index and schema records.
    pub async fn drop_collection(&self) -> Result<(), IndexError> {
        self.close().await?;
        delete_index_files(&self.dir.join(INDEX_DIR))?;
        self.store.delete()?;
        info!(collection = %self.name, "collection dropped");
        Ok(())
    }

    /// Maps, writes, and commits one document, persisting the schema when
    /// the mapping extended it.
    fn write(&self, doc: &Document, replace: bool) -> Result<(), IndexError> {
        // Schema extension happens inside the mapper, before the index
        // write it belongs to.
        let mapped = self.mapper.map(doc, &self.schema)?;

        {
            let mut guard = self.lock_writer()?;
            let writer = guard.as_mut().ok_or(IndexError::EngineClosed)?;
            if replace {
                if let Some(id) = doc.id() {
                    writer.delete_by_id(id);
                }
            }
            writer.add_document(mapped.doc)?;
            writer.commit()?;
        }

        if mapped.schema_changed {
            self.store.save(&self.schema)?;
        }
        Ok(())
    }

    /// Acquires the writer slot.
    fn lock_writer(&self) -> Result<MutexGuard<'_, Option<IndexWriter>>, IndexError> {
        self.writer
            .lock()
            .map_err(|_| IndexError::Write("index writer lock poisoned".to_string()))
    }

    /// Refuses work once the engine is closed.
    fn check_open(&self) -> Result<(), IndexError> {
        if self.state.load(Ordering::SeqCst) == STATE_OPEN {
            Ok(())
        } else {
            Err(IndexError::EngineClosed)
        }
    }
}

/// Ticks about once a second, republishing a fresh searcher. Errors are
/// swallowed (logged at debug); the loop ends when the engine closes.
async fn refresh_loop(
    manager: SearcherManager,
    interval: Duration,
    mut shutdown: watch::Receiver<bool>,
) {
    let mut ticker = tokio::time::interval(interval);
    ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
    // The first tick fires immediately; skip it.
    ticker.tick().await;

    loop {
        tokio::select! {
            _ = ticker.tick() => {
                if let Err(e) = manager.refresh() {
                    debug!(error = %e, "searcher refresh failed");
                }
            }
            _ = shutdown.changed() => break,
        }
    }
}

/// Convenience for hosts that already have the collection directory.
pub fn collection_path(root: &Path, name: &str) -> PathBuf {
    root.join(name)
}
