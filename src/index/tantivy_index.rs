//! Tantivy-backed index backend, one on-disk index per space

use crate::index::error::{IndexError, IndexResult};
use crate::index::query::{wildcard_to_regex, Clause, Field as QueryField};
use crate::index::{document_match, IndexBackend, IndexHits, IndexQuery};
use crate::models::{
    make_relative_path, timestamp_from_secs, Document, DocumentBody, ResourceId, ResourceType,
    SpaceId,
};
use async_trait::async_trait;
use std::path::Path;
use std::sync::Arc;
use tantivy::collector::{Count, TopDocs};
use tantivy::query::{
    AllQuery, BooleanQuery, BoostQuery, Occur, PhraseQuery, Query, RangeQuery, RegexQuery,
    TermQuery,
};
use tantivy::schema::{Field, IndexRecordOption, Schema, Value, FAST, INDEXED, STORED, STRING, TEXT};
use tantivy::{Index, IndexReader, IndexWriter, ReloadPolicy, TantivyDocument, Term};
use tokio::sync::RwLock;

const NAME_BOOST: f32 = 2.0;

/// Schema fields, resolved once
#[derive(Clone, Copy)]
struct Fields {
    id: Field,
    root: Field,
    parent: Field,
    path: Field,
    name: Field,
    name_key: Field,
    title: Field,
    content: Field,
    tags: Field,
    size: Field,
    mtime: Field,
    mime: Field,
    kind: Field,
}

/// Build the schema for resource documents
fn build_schema() -> (Schema, Fields) {
    let mut builder = Schema::builder();

    let fields = Fields {
        // Identity and location, matched exactly
        id: builder.add_text_field("id", STRING | STORED),
        root: builder.add_text_field("root", STRING | STORED),
        parent: builder.add_text_field("parent", STRING | STORED),
        path: builder.add_text_field("path", STRING | STORED),

        // Full text
        name: builder.add_text_field("name", TEXT | STORED),
        name_key: builder.add_text_field("name_key", STRING),
        title: builder.add_text_field("title", STORED),
        content: builder.add_text_field("content", TEXT | STORED),
        tags: builder.add_text_field("tags", TEXT | STORED),

        // Range filters
        size: builder.add_u64_field("size", INDEXED | STORED | FAST),
        mtime: builder.add_u64_field("mtime", INDEXED | STORED | FAST),

        mime: builder.add_text_field("mime", STRING | STORED),
        kind: builder.add_text_field("kind", STRING | STORED),
    };

    (builder.build(), fields)
}

/// Lowercased alphanumeric tokens, the same split the default tokenizer applies
fn tokenize(text: &str) -> Vec<String> {
    text.split(|c: char| !c.is_alphanumeric())
        .filter(|token| !token.is_empty())
        .map(str::to_lowercase)
        .collect()
}

/// Index partition stored in a Tantivy directory
pub struct TantivyIndex {
    fields: Fields,
    writer: Arc<RwLock<IndexWriter>>,
    reader: IndexReader,
}

impl TantivyIndex {
    /// Open the index at `path`, creating it when missing
    pub async fn open(path: &Path, writer_heap_size: usize) -> IndexResult<Self> {
        std::fs::create_dir_all(path).map_err(|e| {
            IndexError::InitFailed(format!("Failed to create index directory: {}", e))
        })?;

        let (schema, fields) = build_schema();

        let index = if path.join("meta.json").exists() {
            Index::open_in_dir(path).map_err(|e| {
                IndexError::InitFailed(format!("Failed to open existing index: {}", e))
            })?
        } else {
            Index::create_in_dir(path, schema).map_err(|e| {
                IndexError::InitFailed(format!("Failed to create new index: {}", e))
            })?
        };

        let writer: IndexWriter = index
            .writer_with_num_threads(1, writer_heap_size)
            .map_err(|e| IndexError::InitFailed(format!("Failed to create writer: {}", e)))?;

        let reader: IndexReader = index
            .reader_builder()
            .reload_policy(ReloadPolicy::Manual)
            .try_into()
            .map_err(|e| IndexError::InitFailed(format!("Failed to create reader: {}", e)))?;

        tracing::debug!(path = %path.display(), "Tantivy index opened");

        Ok(Self {
            fields,
            writer: Arc::new(RwLock::new(writer)),
            reader,
        })
    }

    /// Commit and make the changes visible to the next search
    fn commit(&self, writer: &mut IndexWriter) -> IndexResult<()> {
        writer
            .commit()
            .map_err(|e| IndexError::IndexingFailed(format!("Failed to commit: {}", e)))?;
        self.reader.reload()?;
        Ok(())
    }

    fn id_term(&self, id: &ResourceId) -> Term {
        Term::from_field_text(self.fields.id, &id.to_string())
    }

    /// Every document strictly below `path`
    fn subtree_query(&self, path: &str) -> IndexResult<RegexQuery> {
        let pattern = format!("{}/.*", regex::escape(&make_relative_path(path)));
        RegexQuery::from_pattern(&pattern, self.fields.path)
            .map_err(|e| IndexError::InvalidQuery(e.to_string()))
    }

    fn regex_query(&self, pattern: &str, field: Field) -> IndexResult<Box<dyn Query>> {
        let query = RegexQuery::from_pattern(&wildcard_to_regex(pattern), field)
            .map_err(|e| IndexError::InvalidQuery(e.to_string()))?;
        Ok(Box::new(query))
    }

    fn tokens_query(&self, field: Field, tokens: &[String]) -> Box<dyn Query> {
        let terms: Vec<Term> = tokens
            .iter()
            .map(|token| Term::from_field_text(field, token))
            .collect();
        match terms.len() {
            0 => Box::new(AllQuery),
            1 => Box::new(TermQuery::new(
                terms[0].clone(),
                IndexRecordOption::WithFreqs,
            )),
            _ => Box::new(PhraseQuery::new(terms)),
        }
    }

    fn clause_query(&self, clause: &Clause) -> IndexResult<Box<dyn Query>> {
        let fields = self.fields;
        match clause {
            Clause::Text(text) if text.contains('*') => self.regex_query(text, fields.name_key),
            Clause::Text(text) => {
                let tokens = tokenize(text);
                let name = BoostQuery::new(self.tokens_query(fields.name, &tokens), NAME_BOOST);
                let content = self.tokens_query(fields.content, &tokens);
                Ok(Box::new(BooleanQuery::new(vec![
                    (Occur::Should, Box::new(name) as Box<dyn Query>),
                    (Occur::Should, content),
                ])))
            }
            Clause::Pattern { field, pattern } => match field {
                QueryField::Name => self.regex_query(pattern, fields.name_key),
                QueryField::MimeType => self.regex_query(pattern, fields.mime),
                QueryField::Path => self.regex_query(pattern, fields.path),
                other => Err(IndexError::InvalidQuery(format!(
                    "field {} does not take a pattern",
                    other
                ))),
            },
            Clause::Term { field, value } => match field {
                QueryField::Id if value.contains('$') => Ok(Box::new(TermQuery::new(
                    Term::from_field_text(fields.id, value),
                    IndexRecordOption::Basic,
                ))),
                QueryField::Id => {
                    let pattern = format!(".*!{}", regex::escape(value));
                    RegexQuery::from_pattern(&pattern, fields.id)
                        .map(|q| Box::new(q) as Box<dyn Query>)
                        .map_err(|e| IndexError::InvalidQuery(e.to_string()))
                }
                QueryField::Content => Ok(self.tokens_query(fields.content, &tokenize(value))),
                QueryField::Tags => Ok(self.tokens_query(fields.tags, &tokenize(value))),
                other => Err(IndexError::InvalidQuery(format!(
                    "field {} does not take a term",
                    other
                ))),
            },
            Clause::Range { field, op, value } => {
                let name = match field {
                    QueryField::Size => "size",
                    QueryField::Mtime => "mtime",
                    other => {
                        return Err(IndexError::InvalidQuery(format!(
                            "field {} does not take a range",
                            other
                        )))
                    }
                };
                let (lower, upper) = op.bounds(*value);
                Ok(Box::new(RangeQuery::new_u64_bounds(
                    name.to_string(),
                    lower,
                    upper,
                )))
            }
            Clause::Kind(resource_type) => Ok(Box::new(TermQuery::new(
                Term::from_field_text(fields.kind, &resource_type.to_string()),
                IndexRecordOption::Basic,
            ))),
        }
    }

    fn build_query(&self, query: &IndexQuery) -> IndexResult<BooleanQuery> {
        let mut subqueries: Vec<(Occur, Box<dyn Query>)> = Vec::new();

        for clause in &query.expr.clauses {
            subqueries.push((Occur::Must, self.clause_query(clause)?));
        }

        if let Some(scope) = &query.scope_path {
            let scope = make_relative_path(scope);
            if scope != "." {
                subqueries.push((Occur::Must, Box::new(self.subtree_query(&scope)?)));
            }
        }

        Ok(BooleanQuery::new(subqueries))
    }

    fn to_tantivy_doc(&self, document: &Document) -> TantivyDocument {
        let fields = self.fields;
        let mut doc = TantivyDocument::new();

        doc.add_text(fields.id, document.id.to_string());
        doc.add_text(fields.root, document.root.to_string());
        if let Some(parent) = &document.parent_id {
            doc.add_text(fields.parent, parent.to_string());
        }
        doc.add_text(fields.path, &document.path);
        doc.add_text(fields.name, &document.name);
        doc.add_text(fields.name_key, document.name.to_lowercase());
        if let Some(title) = &document.body.title {
            doc.add_text(fields.title, title);
        }
        doc.add_text(fields.content, &document.body.content);
        for tag in &document.body.tags {
            doc.add_text(fields.tags, tag);
        }
        doc.add_u64(fields.size, document.size);
        doc.add_u64(fields.mtime, u64::try_from(document.mtime_secs()).unwrap_or(0));
        doc.add_text(fields.mime, document.body.mime_type.to_lowercase());
        doc.add_text(fields.kind, document.resource_type.to_string());

        doc
    }

    fn from_tantivy_doc(&self, doc: &TantivyDocument) -> IndexResult<Document> {
        let fields = self.fields;
        let text = |field: Field| -> Option<String> {
            doc.get_first(field)
                .and_then(|value| value.as_str())
                .map(str::to_string)
        };
        let number = |field: Field| -> u64 {
            doc.get_first(field)
                .and_then(|value| value.as_u64())
                .unwrap_or(0)
        };

        let id = parse_resource_id(&text(fields.id).unwrap_or_default())?;
        let root = parse_resource_id(&text(fields.root).unwrap_or_default())?;
        let parent_id = text(fields.parent)
            .map(|raw| parse_resource_id(&raw))
            .transpose()?;

        Ok(Document {
            id,
            root,
            parent_id,
            path: text(fields.path).unwrap_or_else(|| ".".to_string()),
            name: text(fields.name).unwrap_or_default(),
            size: number(fields.size),
            mtime: timestamp_from_secs(i64::try_from(number(fields.mtime)).unwrap_or(0)),
            resource_type: text(fields.kind)
                .and_then(|kind| kind.parse::<ResourceType>().ok())
                .unwrap_or_default(),
            body: DocumentBody {
                title: text(fields.title),
                content: text(fields.content).unwrap_or_default(),
                mime_type: text(fields.mime).unwrap_or_default(),
                tags: doc
                    .get_all(fields.tags)
                    .filter_map(|value| value.as_str())
                    .map(str::to_string)
                    .collect(),
            },
        })
    }
}

fn parse_resource_id(raw: &str) -> IndexResult<ResourceId> {
    raw.parse::<SpaceId>()
        .map(|id| id.root())
        .map_err(|e| IndexError::SearchFailed(format!("Stored id is corrupt: {}", e)))
}

#[async_trait]
impl IndexBackend for TantivyIndex {
    async fn search(&self, query: &IndexQuery) -> IndexResult<IndexHits> {
        let tantivy_query = self.build_query(query)?;
        let searcher = self.reader.searcher();

        let limit = query
            .limit
            .unwrap_or(searcher.num_docs() as usize)
            .max(1);

        let (top_docs, total) = searcher
            .search(&tantivy_query, &(TopDocs::with_limit(limit), Count))
            .map_err(|e| IndexError::SearchFailed(format!("Search execution failed: {}", e)))?;

        let mut matches = Vec::with_capacity(top_docs.len());
        for (score, address) in top_docs {
            let doc: TantivyDocument = searcher
                .doc(address)
                .map_err(|e| IndexError::SearchFailed(format!("Failed to load document: {}", e)))?;
            let document = self.from_tantivy_doc(&doc)?;
            matches.push(document_match(&document, score));
        }

        Ok(IndexHits {
            matches,
            total_matches: total as u64,
        })
    }

    async fn upsert(&self, document: Document) -> IndexResult<()> {
        self.upsert_many(vec![document]).await
    }

    /// One commit for the whole batch
    async fn upsert_many(&self, documents: Vec<Document>) -> IndexResult<()> {
        if documents.is_empty() {
            return Ok(());
        }

        let mut writer = self.writer.write().await;
        for document in &documents {
            writer.delete_term(self.id_term(&document.id));
            writer
                .add_document(self.to_tantivy_doc(document))
                .map_err(|e| IndexError::IndexingFailed(format!("Failed to add document: {}", e)))?;
        }

        self.commit(&mut writer)
    }

    async fn remove(&self, id: &ResourceId) -> IndexResult<usize> {
        let existing = match self.lookup(id).await? {
            Some(document) => document,
            None => return Ok(0),
        };

        let subtree = self.subtree_query(&existing.path)?;
        let descendants = self
            .reader
            .searcher()
            .search(&subtree, &Count)
            .map_err(|e| IndexError::SearchFailed(format!("Failed to count subtree: {}", e)))?;

        let mut writer = self.writer.write().await;
        writer.delete_term(self.id_term(id));
        writer
            .delete_query(Box::new(subtree))
            .map_err(|e| IndexError::IndexingFailed(format!("Failed to delete subtree: {}", e)))?;
        self.commit(&mut writer)?;

        Ok(1 + descendants)
    }

    async fn doc_count(&self) -> IndexResult<u64> {
        Ok(self.reader.searcher().num_docs())
    }

    async fn lookup(&self, id: &ResourceId) -> IndexResult<Option<Document>> {
        let searcher = self.reader.searcher();
        let query = TermQuery::new(self.id_term(id), IndexRecordOption::Basic);

        let top_docs = searcher
            .search(&query, &TopDocs::with_limit(1))
            .map_err(|e| IndexError::SearchFailed(format!("Lookup failed: {}", e)))?;

        match top_docs.into_iter().next() {
            Some((_, address)) => {
                let doc: TantivyDocument = searcher.doc(address)?;
                self.from_tantivy_doc(&doc).map(Some)
            }
            None => Ok(None),
        }
    }

    async fn clear(&self) -> IndexResult<()> {
        let mut writer = self.writer.write().await;
        writer
            .delete_all_documents()
            .map_err(|e| IndexError::IndexingFailed(format!("Failed to clear index: {}", e)))?;
        self.commit(&mut writer)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    const HEAP: usize = 20_000_000;

    fn root() -> ResourceId {
        ResourceId::new("storageid", "spaceid", "spaceid")
    }

    fn doc(opaque: &str, path: &str, content: &str, size: u64) -> Document {
        let name = path.rsplit('/').next().unwrap_or(path).to_string();
        Document {
            id: ResourceId::new("storageid", "spaceid", opaque),
            root: root(),
            parent_id: Some(root()),
            path: path.to_string(),
            name,
            size,
            mtime: timestamp_from_secs(1_700_000_000),
            resource_type: ResourceType::File,
            body: DocumentBody {
                title: Some("title".to_string()),
                content: content.to_string(),
                mime_type: "application/pdf".to_string(),
                tags: vec!["finance".to_string()],
            },
        }
    }

    async fn seeded(dir: &TempDir) -> TantivyIndex {
        let index = TantivyIndex::open(dir.path(), HEAP).await.unwrap();
        index.upsert(doc("foo", "./Foo.pdf", "", 12)).await.unwrap();
        index
            .upsert(doc("shared", "./grant/path/to/Shared.pdf", "foo bar", 5))
            .await
            .unwrap();
        index
            .upsert(doc("other", "./other/Notes.pdf", "nothing here", 100))
            .await
            .unwrap();
        index
    }

    #[tokio::test]
    async fn test_index_creation() {
        let dir = TempDir::new().unwrap();
        let index = TantivyIndex::open(dir.path(), HEAP).await.unwrap();
        assert_eq!(index.doc_count().await.unwrap(), 0);
    }

    #[tokio::test]
    async fn test_free_text_search() {
        let dir = TempDir::new().unwrap();
        let index = seeded(&dir).await;

        let hits = index
            .search(&IndexQuery::parse("foo", root()).unwrap())
            .await
            .unwrap();
        assert_eq!(hits.total_matches, 2);
        assert!(hits.matches.iter().all(|m| m.reference.resource_id == root()));
        assert!(hits.matches[0].score >= hits.matches[1].score);
    }

    #[tokio::test]
    async fn test_lookup_roundtrip() {
        let dir = TempDir::new().unwrap();
        let index = seeded(&dir).await;

        let original = doc("foo", "./Foo.pdf", "", 12);
        let stored = index.lookup(&original.id).await.unwrap().unwrap();
        assert_eq!(stored, original);
    }

    #[tokio::test]
    async fn test_filters_and_scope() {
        let dir = TempDir::new().unwrap();
        let index = seeded(&dir).await;

        let small = index
            .search(&IndexQuery::parse("Size:<10", root()).unwrap())
            .await
            .unwrap();
        assert_eq!(small.total_matches, 1);
        assert_eq!(small.matches[0].name, "Shared.pdf");

        let scoped = index
            .search(
                &IndexQuery::parse("name:*.pdf", root())
                    .unwrap()
                    .with_scope_path("./grant/path"),
            )
            .await
            .unwrap();
        assert_eq!(scoped.total_matches, 1);
        assert_eq!(scoped.matches[0].reference.path, "./grant/path/to/Shared.pdf");
    }

    #[tokio::test]
    async fn test_upsert_and_remove_subtree() {
        let dir = TempDir::new().unwrap();
        let index = seeded(&dir).await;

        index.upsert(doc("foo", "./Foo.pdf", "new", 1)).await.unwrap();
        assert_eq!(index.doc_count().await.unwrap(), 3);

        let mut folder = doc("grant", "./grant", "", 0);
        folder.resource_type = ResourceType::Folder;
        index.upsert(folder).await.unwrap();

        let removed = index
            .remove(&ResourceId::new("storageid", "spaceid", "grant"))
            .await
            .unwrap();
        assert_eq!(removed, 2);
        assert_eq!(index.doc_count().await.unwrap(), 2);

        index.clear().await.unwrap();
        assert_eq!(index.doc_count().await.unwrap(), 0);
    }

    #[tokio::test]
    async fn test_batch_upsert_commits_once() {
        let dir = TempDir::new().unwrap();
        let index = TantivyIndex::open(dir.path(), HEAP).await.unwrap();

        index
            .upsert_many(vec![
                doc("foo", "./Foo.pdf", "", 12),
                doc("shared", "./grant/path/to/Shared.pdf", "foo bar", 5),
                doc("other", "./other/Notes.pdf", "nothing here", 100),
            ])
            .await
            .unwrap();

        assert_eq!(index.doc_count().await.unwrap(), 3);
        assert_eq!(index.reader.searcher().segment_readers().len(), 1);

        // Replacing inside a batch keeps one document per id
        index
            .upsert_many(vec![
                doc("foo", "./Foo.pdf", "first", 1),
                doc("foo", "./Foo.pdf", "second", 2),
            ])
            .await
            .unwrap();
        assert_eq!(index.doc_count().await.unwrap(), 3);
        let stored = index
            .lookup(&ResourceId::new("storageid", "spaceid", "foo"))
            .await
            .unwrap()
            .unwrap();
        assert_eq!(stored.body.content, "second");
    }

    #[tokio::test]
    async fn test_reopen_keeps_documents() {
        let dir = TempDir::new().unwrap();
        {
            let index = seeded(&dir).await;
            assert_eq!(index.doc_count().await.unwrap(), 3);
        }
        let reopened = TantivyIndex::open(dir.path(), HEAP).await.unwrap();
        assert_eq!(reopened.doc_count().await.unwrap(), 3);
    }
}
