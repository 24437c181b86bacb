//! In-memory index backend

use crate::index::error::{IndexError, IndexResult};
use crate::index::query::{wildcard_to_regex, Clause, Field};
use crate::index::{document_match, IndexBackend, IndexHits, IndexQuery};
use crate::models::{is_within, make_relative_path, Document, ResourceId};
use async_trait::async_trait;
use parking_lot::RwLock;
use regex::Regex;
use std::collections::HashMap;

const NAME_WEIGHT: f32 = 2.0;
const CONTENT_WEIGHT: f32 = 1.0;
const FIELD_WEIGHT: f32 = 1.0;
const MAX_COUNTED_OCCURRENCES: usize = 5;

/// Index partition held entirely in process memory
#[derive(Default)]
pub struct MemoryIndex {
    documents: RwLock<HashMap<ResourceId, Document>>,
}

impl MemoryIndex {
    pub fn new() -> Self {
        Self::default()
    }
}

/// A clause with its wildcard pattern compiled once per search
struct CompiledClause<'a> {
    clause: &'a Clause,
    pattern: Option<Regex>,
}

impl<'a> CompiledClause<'a> {
    fn compile(clause: &'a Clause) -> IndexResult<Self> {
        let source = match clause {
            Clause::Pattern { pattern, .. } => Some(pattern.as_str()),
            Clause::Text(text) if text.contains('*') => Some(text.as_str()),
            _ => None,
        };
        let pattern = source
            .map(|p| Regex::new(&format!("^{}$", wildcard_to_regex(p))))
            .transpose()
            .map_err(|e| IndexError::InvalidQuery(e.to_string()))?;
        Ok(Self { clause, pattern })
    }

    /// Score contribution of this clause, `None` when the document does not match
    fn score(&self, doc: &Document) -> Option<f32> {
        match self.clause {
            Clause::Text(text) => {
                let name = doc.name.to_lowercase();
                if let Some(pattern) = &self.pattern {
                    return pattern.is_match(&name).then_some(NAME_WEIGHT);
                }
                let name_hit = name.contains(text.as_str());
                let occurrences = doc
                    .body
                    .content
                    .to_lowercase()
                    .matches(text.as_str())
                    .count()
                    .min(MAX_COUNTED_OCCURRENCES);
                if !name_hit && occurrences == 0 {
                    return None;
                }
                let name_score = if name_hit { NAME_WEIGHT } else { 0.0 };
                Some(name_score + CONTENT_WEIGHT * occurrences as f32)
            }
            Clause::Pattern { field, .. } => {
                let value = match field {
                    Field::Name => doc.name.to_lowercase(),
                    Field::MimeType => doc.body.mime_type.to_lowercase(),
                    Field::Path => doc.path.clone(),
                    _ => return None,
                };
                let hit = self.pattern.as_ref()?.is_match(&value);
                let weight = if *field == Field::Name { FIELD_WEIGHT } else { 0.0 };
                hit.then_some(weight)
            }
            Clause::Term { field, value } => match field {
                Field::Id => {
                    (doc.id.to_string() == *value || doc.id.opaque_id == *value).then_some(0.0)
                }
                Field::Content => doc
                    .body
                    .content
                    .to_lowercase()
                    .contains(value.as_str())
                    .then_some(FIELD_WEIGHT),
                Field::Tags => doc
                    .body
                    .tags
                    .iter()
                    .any(|tag| tag.to_lowercase() == *value)
                    .then_some(FIELD_WEIGHT),
                _ => None,
            },
            Clause::Range { field, op, value } => {
                let actual = match field {
                    Field::Size => doc.size,
                    Field::Mtime => u64::try_from(doc.mtime_secs()).unwrap_or(0),
                    _ => return None,
                };
                op.holds(actual, *value).then_some(0.0)
            }
            Clause::Kind(resource_type) => (doc.resource_type == *resource_type).then_some(0.0),
        }
    }
}

fn in_scope(doc: &Document, scope_path: Option<&str>) -> bool {
    match scope_path {
        None => true,
        Some(scope) => {
            let scope = make_relative_path(scope);
            doc.path != scope && is_within(&doc.path, &scope)
        }
    }
}

#[async_trait]
impl IndexBackend for MemoryIndex {
    async fn search(&self, query: &IndexQuery) -> IndexResult<IndexHits> {
        let compiled = query
            .expr
            .clauses
            .iter()
            .map(CompiledClause::compile)
            .collect::<IndexResult<Vec<_>>>()?;

        let mut scored: Vec<(f32, &Document)> = Vec::new();
        let documents = self.documents.read();
        for doc in documents.values() {
            if !in_scope(doc, query.scope_path.as_deref()) {
                continue;
            }
            let score = compiled
                .iter()
                .map(|clause| clause.score(doc))
                .sum::<Option<f32>>();
            if let Some(score) = score {
                scored.push((score, doc));
            }
        }

        scored.sort_by(|a, b| b.0.total_cmp(&a.0).then_with(|| a.1.path.cmp(&b.1.path)));

        let total_matches = scored.len() as u64;
        if let Some(limit) = query.limit {
            scored.truncate(limit);
        }

        Ok(IndexHits {
            matches: scored
                .into_iter()
                .map(|(score, doc)| document_match(doc, score))
                .collect(),
            total_matches,
        })
    }

    async fn upsert(&self, document: Document) -> IndexResult<()> {
        self.documents.write().insert(document.id.clone(), document);
        Ok(())
    }

    async fn upsert_many(&self, documents: Vec<Document>) -> IndexResult<()> {
        self.documents
            .write()
            .extend(documents.into_iter().map(|document| (document.id.clone(), document)));
        Ok(())
    }

    async fn remove(&self, id: &ResourceId) -> IndexResult<usize> {
        let mut documents = self.documents.write();
        let path = match documents.get(id) {
            Some(doc) => doc.path.clone(),
            None => return Ok(0),
        };

        let before = documents.len();
        documents.retain(|key, doc| key != id && !is_within(&doc.path, &path));
        Ok(before - documents.len())
    }

    async fn doc_count(&self) -> IndexResult<u64> {
        Ok(self.documents.read().len() as u64)
    }

    async fn lookup(&self, id: &ResourceId) -> IndexResult<Option<Document>> {
        Ok(self.documents.read().get(id).cloned())
    }

    async fn clear(&self) -> IndexResult<()> {
        self.documents.write().clear();
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{timestamp_from_secs, DocumentBody, ResourceType};

    fn root() -> ResourceId {
        ResourceId::new("storageid", "spaceid", "spaceid")
    }

    fn doc(opaque: &str, path: &str, content: &str, size: u64) -> Document {
        let name = path.rsplit('/').next().unwrap_or(path).to_string();
        Document {
            id: ResourceId::new("storageid", "spaceid", opaque),
            root: root(),
            parent_id: None,
            path: path.to_string(),
            name,
            size,
            mtime: timestamp_from_secs(1_700_000_000),
            resource_type: ResourceType::File,
            body: DocumentBody {
                content: content.to_string(),
                mime_type: "application/pdf".to_string(),
                ..Default::default()
            },
        }
    }

    async fn seeded() -> MemoryIndex {
        let index = MemoryIndex::new();
        index.upsert(doc("foo", "./Foo.pdf", "", 12)).await.unwrap();
        index
            .upsert(doc("shared", "./grant/path/to/Shared.pdf", "foo foo", 5))
            .await
            .unwrap();
        index
            .upsert(doc("other", "./other/Notes.pdf", "nothing here", 100))
            .await
            .unwrap();
        index
    }

    #[tokio::test]
    async fn test_free_text_ranking() {
        let index = seeded().await;
        let query = IndexQuery::parse("foo", root()).unwrap();
        let hits = index.search(&query).await.unwrap();

        assert_eq!(hits.total_matches, 2);
        assert_eq!(hits.matches[0].name, "Foo.pdf");
        assert_eq!(hits.matches[0].score, 2.0);
        assert_eq!(hits.matches[1].name, "Shared.pdf");
        assert_eq!(hits.matches[1].score, 2.0);
        assert_eq!(hits.matches[1].reference.path, "./grant/path/to/Shared.pdf");
        assert_eq!(hits.matches[1].reference.resource_id, root());
    }

    #[tokio::test]
    async fn test_limit_keeps_total() {
        let index = seeded().await;
        let query = IndexQuery::parse("MimeType:application/*", root())
            .unwrap()
            .with_limit(Some(1));
        let hits = index.search(&query).await.unwrap();

        assert_eq!(hits.matches.len(), 1);
        assert_eq!(hits.total_matches, 3);
    }

    #[tokio::test]
    async fn test_scope_path_excludes_outside_and_self() {
        let index = seeded().await;
        let query = IndexQuery::parse("Name:*", root())
            .unwrap()
            .with_scope_path("./grant/path");
        let hits = index.search(&query).await.unwrap();

        assert_eq!(hits.total_matches, 1);
        assert_eq!(hits.matches[0].name, "Shared.pdf");
    }

    #[tokio::test]
    async fn test_size_range() {
        let index = seeded().await;
        let query = IndexQuery::parse("Size:<10", root()).unwrap();
        let hits = index.search(&query).await.unwrap();

        assert_eq!(hits.total_matches, 1);
        assert_eq!(hits.matches[0].name, "Shared.pdf");
    }

    #[tokio::test]
    async fn test_upsert_replaces() {
        let index = seeded().await;
        index.upsert(doc("foo", "./Foo.pdf", "changed", 1)).await.unwrap();

        assert_eq!(index.doc_count().await.unwrap(), 3);
        let stored = index
            .lookup(&ResourceId::new("storageid", "spaceid", "foo"))
            .await
            .unwrap()
            .unwrap();
        assert_eq!(stored.body.content, "changed");
    }

    #[tokio::test]
    async fn test_remove_includes_descendants() {
        let index = seeded().await;
        let mut folder = doc("grant", "./grant", "", 0);
        folder.resource_type = ResourceType::Folder;
        index.upsert(folder).await.unwrap();

        let removed = index
            .remove(&ResourceId::new("storageid", "spaceid", "grant"))
            .await
            .unwrap();
        assert_eq!(removed, 2);
        assert_eq!(index.doc_count().await.unwrap(), 2);

        let missing = index
            .remove(&ResourceId::new("storageid", "spaceid", "nope"))
            .await
            .unwrap();
        assert_eq!(missing, 0);
    }

    #[tokio::test]
    async fn test_clear() {
        let index = seeded().await;
        index.clear().await.unwrap();
        assert_eq!(index.doc_count().await.unwrap(), 0);
    }
}
