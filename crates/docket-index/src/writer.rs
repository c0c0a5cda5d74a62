//! Index writer for collection documents.

use std::{fs, path::Path};

use tantivy::{Index, IndexWriter as TantivyIndexWriter, TantivyDocument, Term, directory::MmapDirectory};
use uuid::Uuid;

use crate::{IndexError, analyzer::FULL_TEXT_TOKENIZER, analyzer::build_full_text_analyzer, schema::IndexSchema, settings::IndexSettings};

/// Opens (or creates) the tantivy index for a collection directory and
/// registers the full-text tokenizer built from the settings.
pub fn open_index(path: &Path, index_schema: &IndexSchema, settings: &IndexSettings) -> Result<Index, IndexError> {
    fs::create_dir_all(path)?;

    let dir = MmapDirectory::open(path).map_err(|e| {
        let err: tantivy::TantivyError = e.into();
        IndexError::open_index(path.to_path_buf(), &err)
    })?;

    let index = Index::open_or_create(dir, index_schema.schema().clone())
        .map_err(|e| IndexError::open_index(path.to_path_buf(), &e))?;

    index.tokenizers().register(
        FULL_TEXT_TOKENIZER,
        build_full_text_analyzer(settings.lowercase, settings.stemming),
    );

    Ok(index)
}

/// Writes documents into a collection's index.
///
/// There is one writer per collection; tantivy serializes the actual
/// segment writes internally, and every mutation here is followed by a
/// commit so a returned write is durable.
pub struct IndexWriter {
    /// The underlying tantivy writer.
    writer: TantivyIndexWriter,
    /// Schema with field handles.
    index_schema: IndexSchema,
}

impl IndexWriter {
    /// Creates a writer over an opened index.
    pub fn new(index: &Index, index_schema: IndexSchema, heap_bytes: usize) -> Result<Self, IndexError> {
        let writer = index.writer(heap_bytes).map_err(|e| IndexError::write(&e))?;
        Ok(Self {
            writer,
            index_schema,
        })
    }

    /// Stages a mapped document for writing.
    pub fn add_document(&mut self, doc: TantivyDocument) -> Result<(), IndexError> {
        self.writer
            .add_document(doc)
            .map_err(|e| IndexError::write(&e))?;
        Ok(())
    }

    /// Stages the deletion of every document with the given id.
    pub fn delete_by_id(&mut self, id: Uuid) {
        let term = Term::from_field_text(
            self.index_schema.id,
            &id.as_hyphenated().to_string(),
        );
        self.writer.delete_term(term);
    }

    /// Commits all staged changes, making them durable and visible to the
    /// next refreshed searcher.
    pub fn commit(&mut self) -> Result<(), IndexError> {
        self.writer.commit().map_err(|e| IndexError::commit(&e))?;
        Ok(())
    }

    /// Rolls back uncommitted changes.
    pub fn rollback(&mut self) -> Result<(), IndexError> {
        self.writer.rollback().map_err(|e| IndexError::commit(&e))?;
        Ok(())
    }

    /// Waits for background merge threads and consumes the writer. Called
    /// on engine shutdown.
    pub fn close(self) -> Result<(), IndexError> {
        self.writer
            .wait_merging_threads()
            .map_err(|e| IndexError::write(&e))?;
        Ok(())
    }
}

/// Deletes a collection's index directory.
pub fn delete_index_files(path: &Path) -> Result<(), IndexError> {
    if path.exists() {
        fs::remove_dir_all(path)?;
    }
    Ok(())
}

#[cfg(test)]
mod test {
    use docket_document::{Document, Schema};
    use tempfile::TempDir;

    use super::*;
    use crate::mapper::DocumentMapper;

    fn map_one(schema: &Schema, json: serde_json::Value) -> (TantivyDocument, Uuid) {
        let mut doc = Document::from_json(json).unwrap();
        let id = doc.ensure_id().unwrap();
        doc.touch(true);
        let mapper = DocumentMapper::new(IndexSchema::new(), false);
        (mapper.map(&doc, schema).unwrap().doc, id)
    }

    fn num_docs(index: &Index) -> u64 {
        index.reader().unwrap().searcher().num_docs()
    }

    #[test]
    fn creates_index_in_empty_directory() {
        let temp = TempDir::new().unwrap();
        let index_schema = IndexSchema::new();
        let index = open_index(temp.path(), &index_schema, &IndexSettings::default()).unwrap();
        drop(index);
        assert!(temp.path().join("meta.json").exists());
    }

    #[test]
    fn adds_and_commits_documents() {
        let temp = TempDir::new().unwrap();
        let index_schema = IndexSchema::new();
        let index = open_index(temp.path(), &index_schema, &IndexSettings::default()).unwrap();
        let mut writer = IndexWriter::new(&index, index_schema, 15_000_000).unwrap();

        let schema = Schema::with_defaults("books", false);
        let (doc, _) = map_one(&schema, serde_json::json!({"Title": "Mostly Harmless"}));
        writer.add_document(doc).unwrap();
        writer.commit().unwrap();

        assert_eq!(num_docs(&index), 1);
    }

    #[test]
    fn delete_by_id_removes_the_document() {
        let temp = TempDir::new().unwrap();
        let index_schema = IndexSchema::new();
        let index = open_index(temp.path(), &index_schema, &IndexSettings::default()).unwrap();
        let mut writer = IndexWriter::new(&index, index_schema, 15_000_000).unwrap();

        let schema = Schema::with_defaults("books", false);
        let (doc, id) = map_one(&schema, serde_json::json!({"Title": "Mostly Harmless"}));
        writer.add_document(doc).unwrap();
        writer.commit().unwrap();
        assert_eq!(num_docs(&index), 1);

        writer.delete_by_id(id);
        writer.commit().unwrap();
        assert_eq!(num_docs(&index), 0);
    }

    #[test]
    fn rollback_discards_staged_documents() {
        let temp = TempDir::new().unwrap();
        let index_schema = IndexSchema::new();
        let index = open_index(temp.path(), &index_schema, &IndexSettings::default()).unwrap();
        let mut writer = IndexWriter::new(&index, index_schema, 15_000_000).unwrap();

        let schema = Schema::with_defaults("books", false);
        let (doc, _) = map_one(&schema, serde_json::json!({"Title": "Mostly Harmless"}));
        writer.add_document(doc).unwrap();
        writer.rollback().unwrap();
        writer.commit().unwrap();

        assert_eq!(num_docs(&index), 0);
    }

    #[test]
    fn reopens_existing_index() {
        let temp = TempDir::new().unwrap();
        let index_schema = IndexSchema::new();
        {
            let index = open_index(temp.path(), &index_schema, &IndexSettings::default()).unwrap();
            let mut writer = IndexWriter::new(&index, index_schema.clone(), 15_000_000).unwrap();
            let schema = Schema::with_defaults("books", false);
            let (doc, _) = map_one(&schema, serde_json::json!({"Title": "x"}));
            writer.add_document(doc).unwrap();
            writer.commit().unwrap();
        }
        let index = open_index(temp.path(), &index_schema, &IndexSettings::default()).unwrap();
        assert_eq!(num_docs(&index), 1);
    }

    #[test]
    fn delete_index_files_removes_directory() {
        let temp = TempDir::new().unwrap();
        let inner = temp.path().join("index");
        let index_schema = IndexSchema::new();
        let _ = open_index(&inner, &index_schema, &IndexSettings::default()).unwrap();
        assert!(inner.exists());
        delete_index_files(&inner).unwrap();
        assert!(!inner.exists());
    }
}
