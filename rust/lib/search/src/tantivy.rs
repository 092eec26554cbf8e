use std::cmp::Reverse;
use std::collections::HashMap;
use std::ops::Bound;
use std::path::{Path, PathBuf};
use std::sync::{Mutex, RwLock, RwLockReadGuard};

use tantivy::collector::{Count, TopDocs};
use tantivy::directory::MmapDirectory;
use tantivy::query::{
    AllQuery, BooleanQuery, Occur, Query as TantivyQuery, RangeQuery, RegexQuery, TermQuery,
};
use tantivy::schema::Value as TantivyValue;
use tantivy::schema::{
    Field, IndexRecordOption, Schema, TextFieldIndexing, TextOptions, FAST, INDEXED, STORED,
    STRING,
};
use tantivy::tokenizer::{LowerCaser, RawTokenizer, TextAnalyzer, TokenStream};
use tantivy::{
    DocAddress, DocId, Index, IndexReader, IndexWriter, ReloadPolicy, Searcher, SegmentReader,
    TantivyDocument, Term,
};
use tracing::{debug, warn};

use crate::document::{Document, FieldValue};
use crate::error::SearchError;
use crate::mapping::{self, Case, FieldKind, FieldMapping};
use crate::query::{Page, Query, SearchPage};
use crate::traits::SearchEngine;

const ID_FIELD: &str = "_id";
/// Whole value as one lowercased token.
const LOWERCASE_RAW: &str = "lowercase_raw";
const WRITER_HEAP_BYTES: usize = 15_000_000;

/// Index fields backing one mapped document field.
struct IndexedField {
    mapping: FieldMapping,
    /// STORED copy used to rebuild the document on the read path.
    stored: Field,
    exact: Option<(Field, Case)>,
    substring: Option<Field>,
}

impl IndexedField {
    fn add_text(&self, doc: &mut TantivyDocument, text: &str) {
        doc.add_text(self.stored, text);
        if let Some((field, _)) = self.exact {
            doc.add_text(field, text);
        }
        if let Some(field) = self.substring {
            doc.add_text(field, text);
        }
    }
}

/// Per-collection index state.
struct CollectionIndex {
    mappings: &'static [FieldMapping],
    reader: IndexReader,
    writer: Mutex<IndexWriter>,
    id_field: Field,
    fields: Vec<IndexedField>,
    /// The `lowercase_raw` analyzer, applied to query text of case-insensitive matchers.
    analyzer: TextAnalyzer,
}

impl CollectionIndex {
    fn field(&self, name: &str) -> Result<&IndexedField, SearchError> {
        self.fields
            .iter()
            .find(|f| f.mapping.name == name)
            .ok_or_else(|| SearchError::Query(format!("unknown field '{}'", name)))
    }

    fn to_tantivy(&self, doc: &Document) -> Result<TantivyDocument, SearchError> {
        if doc.id.is_empty() {
            return Err(SearchError::Index("document id is empty".into()));
        }
        let mut out = TantivyDocument::default();
        out.add_text(self.id_field, &doc.id);

        for (name, value) in &doc.fields {
            let field = self
                .field(name)
                .map_err(|_| SearchError::Index(format!("unmapped field '{}'", name)))?;
            match (field.mapping.kind, value) {
                (FieldKind::Flag, FieldValue::Flag(b)) => out.add_bool(field.stored, *b),
                (FieldKind::Text, FieldValue::Text(s)) => field.add_text(&mut out, s),
                (FieldKind::TextList, FieldValue::TextList(values)) => {
                    for s in values {
                        field.add_text(&mut out, s);
                    }
                }
                _ => {
                    return Err(SearchError::Index(format!(
                        "field '{}' of document {} does not match its mapping",
                        name, doc.id
                    )));
                }
            }
        }
        Ok(out)
    }

    fn from_tantivy(&self, doc: &TantivyDocument) -> Document {
        let id = doc
            .get_first(self.id_field)
            .and_then(|v| v.as_str())
            .unwrap_or_default();
        let mut out = Document::new(id);

        for field in &self.fields {
            let value = match field.mapping.kind {
                FieldKind::Flag => doc
                    .get_first(field.stored)
                    .and_then(|v| v.as_bool())
                    .map(FieldValue::Flag),
                FieldKind::Text => doc
                    .get_first(field.stored)
                    .and_then(|v| v.as_str())
                    .map(|s| FieldValue::Text(s.to_string())),
                FieldKind::TextList => Some(FieldValue::TextList(
                    doc.get_all(field.stored)
                        .filter_map(|v| v.as_str())
                        .map(str::to_string)
                        .collect(),
                )),
            };
            if let Some(value) = value {
                out.fields.insert(field.mapping.name.to_string(), value);
            }
        }
        out
    }

    fn compile(&self, query: &Query) -> Result<Box<dyn TantivyQuery>, SearchError> {
        let compiled: Box<dyn TantivyQuery> = match query {
            Query::All => Box::new(AllQuery),
            Query::Term { field, value } => {
                let (index_field, case) = self.field(field)?.exact.ok_or_else(|| {
                    SearchError::Query(format!("field '{}' has no exact matcher", field))
                })?;
                let text = match case {
                    Case::Sensitive => value.clone(),
                    Case::Insensitive => self.fold_case(value),
                };
                Box::new(TermQuery::new(
                    Term::from_field_text(index_field, &text),
                    IndexRecordOption::Basic,
                ))
            }
            Query::Contains { field, value } => {
                let index_field = self.field(field)?.substring.ok_or_else(|| {
                    SearchError::Query(format!("field '{}' has no substring matcher", field))
                })?;
                // Terms are whole lowercased values, so containment is a regex over the term dictionary.
                let pattern = format!(".*{}.*", regex::escape(&self.fold_case(value)));
                let regex = RegexQuery::from_pattern(&pattern, index_field)
                    .map_err(|e| SearchError::Query(e.to_string()))?;
                Box::new(regex)
            }
            Query::Flag { field, value } => {
                let f = self.field(field)?;
                if f.mapping.kind != FieldKind::Flag {
                    return Err(SearchError::Query(format!("field '{}' is not a flag", field)));
                }
                Box::new(TermQuery::new(
                    Term::from_field_bool(f.stored, *value),
                    IndexRecordOption::Basic,
                ))
            }
            Query::And(parts) if parts.is_empty() => Box::new(AllQuery),
            Query::And(parts) => Box::new(BooleanQuery::new(self.clauses(Occur::Must, parts)?)),
            Query::Or(parts) => Box::new(BooleanQuery::new(self.clauses(Occur::Should, parts)?)),
        };
        Ok(compiled)
    }

    /// Lowercase `text` exactly as the `lowercase_raw` fields were indexed.
    fn fold_case(&self, text: &str) -> String {
        let mut analyzer = self.analyzer.clone();
        let mut stream = analyzer.token_stream(text);
        let mut folded = String::with_capacity(text.len());
        while stream.advance() {
            folded.push_str(&stream.token().text);
        }
        folded
    }

    fn clauses(
        &self,
        occur: Occur,
        parts: &[Query],
    ) -> Result<Vec<(Occur, Box<dyn TantivyQuery>)>, SearchError> {
        parts
            .iter()
            .map(|q| Ok((occur, self.compile(q)?)))
            .collect()
    }

    /// Run write operations under the writer lock and commit them together.
    /// Any failure rolls back everything queued by `ops`.
    fn write<F>(&self, ops: F) -> Result<(), SearchError>
    where
        F: FnOnce(&mut IndexWriter) -> Result<(), SearchError>,
    {
        let mut writer = self
            .writer
            .lock()
            .map_err(|e| SearchError::Index(e.to_string()))?;

        let result = ops(&mut *writer).and_then(|_| {
            writer
                .commit()
                .map(|_| ())
                .map_err(|e| SearchError::Index(e.to_string()))
        });
        if let Err(e) = result {
            if let Err(rollback) = writer.rollback() {
                warn!("rollback after failed write did not complete: {}", rollback);
            }
            return Err(e);
        }

        // Make the commit visible before returning to the caller.
        self.reader
            .reload()
            .map_err(|e| SearchError::Index(e.to_string()))
    }

    /// Count the matches of `query` and return the `limit` hits after
    /// `offset` in id order. Ids come from the `_id` fast field, so only the
    /// requested window is held and no stored document is read.
    fn ordered(
        &self,
        searcher: &Searcher,
        query: &dyn TantivyQuery,
        offset: usize,
        limit: usize,
    ) -> Result<(usize, Vec<(String, DocAddress)>), SearchError> {
        if limit == 0 {
            let total = searcher
                .search(query, &Count)
                .map_err(|e| SearchError::Query(e.to_string()))?;
            return Ok((total, Vec::new()));
        }

        let by_id = TopDocs::with_limit(limit)
            .and_offset(offset)
            .custom_score(|segment: &SegmentReader| {
                let ids = segment.fast_fields().str(ID_FIELD).ok().flatten();
                move |doc: DocId| {
                    let mut id = String::new();
                    if let Some(column) = &ids {
                        if let Some(ord) = column.term_ords(doc).next() {
                            if column.ord_to_str(ord, &mut id).is_err() {
                                id.clear();
                            }
                        }
                    }
                    // Highest score first, so reverse for ascending ids.
                    Reverse(id)
                }
            });
        let (total, hits) = searcher
            .search(query, &(Count, by_id))
            .map_err(|e| SearchError::Query(e.to_string()))?;

        let hits = hits
            .into_iter()
            .map(|(Reverse(id), address)| (id, address))
            .collect();
        Ok((total, hits))
    }

    fn load(
        &self,
        searcher: &Searcher,
        hits: Vec<(String, DocAddress)>,
    ) -> Result<Vec<Document>, SearchError> {
        hits.into_iter()
            .map(|(_, address)| {
                let doc: TantivyDocument = searcher
                    .doc(address)
                    .map_err(|e| SearchError::Query(e.to_string()))?;
                Ok(self.from_tantivy(&doc))
            })
            .collect()
    }
}

enum Storage {
    Disk(PathBuf),
    Memory,
}

/// TantivyEngine is a SearchEngine implementation backed by Tantivy.
///
/// Each collection gets its own Tantivy index (a subdirectory on disk, or RAM).
/// Every mapped field is STORED under its own name so documents can be read
/// back; matchers add hidden indexed fields:
/// - `{name}__exact`: untokenized value, lowercased for case-insensitive fields
/// - `{name}__sub`: untokenized lowercased value, matched with a regex
pub struct TantivyEngine {
    storage: Storage,
    collections: RwLock<HashMap<String, CollectionIndex>>,
}

impl TantivyEngine {
    /// Create a new TantivyEngine with indexes stored under `base_dir`.
    pub fn open(base_dir: &Path) -> Result<Self, SearchError> {
        std::fs::create_dir_all(base_dir).map_err(|e| SearchError::Index(e.to_string()))?;

        Ok(Self {
            storage: Storage::Disk(base_dir.to_path_buf()),
            collections: RwLock::new(HashMap::new()),
        })
    }

    /// Create a TantivyEngine keeping every index in RAM (useful for tests).
    pub fn open_in_memory() -> Self {
        Self {
            storage: Storage::Memory,
            collections: RwLock::new(HashMap::new()),
        }
    }

    fn collections(&self) -> Result<RwLockReadGuard<'_, HashMap<String, CollectionIndex>>, SearchError> {
        self.collections
            .read()
            .map_err(|e| SearchError::Index(e.to_string()))
    }

    fn with_collection<T>(
        &self,
        collection: &str,
        f: impl FnOnce(&CollectionIndex) -> Result<T, SearchError>,
    ) -> Result<T, SearchError> {
        let collections = self.collections()?;
        let col = collections
            .get(collection)
            .ok_or_else(|| SearchError::Schema(format!("collection not defined: {}", collection)))?;
        f(col)
    }

    fn build_collection(
        &self,
        collection: &str,
        mappings: &'static [FieldMapping],
    ) -> Result<CollectionIndex, SearchError> {
        mapping::validate(mappings)?;

        let lowercase_raw = TextOptions::default().set_indexing_options(
            TextFieldIndexing::default()
                .set_tokenizer(LOWERCASE_RAW)
                .set_index_option(IndexRecordOption::Basic),
        );

        let mut schema_builder = Schema::builder();
        let id_field = schema_builder.add_text_field(ID_FIELD, STRING | STORED | FAST);
        let mut fields = Vec::with_capacity(mappings.len());

        for m in mappings {
            if m.kind == FieldKind::Flag {
                fields.push(IndexedField {
                    mapping: *m,
                    stored: schema_builder.add_bool_field(m.name, INDEXED | STORED),
                    exact: None,
                    substring: None,
                });
                continue;
            }

            let stored = schema_builder.add_text_field(m.name, STORED);
            let exact = m.exact_case().map(|case| {
                let name = format!("{}__exact", m.name);
                let field = match case {
                    Case::Sensitive => schema_builder.add_text_field(&name, STRING),
                    Case::Insensitive => schema_builder.add_text_field(&name, lowercase_raw.clone()),
                };
                (field, case)
            });
            let substring = if m.has_substring() {
                let name = format!("{}__sub", m.name);
                Some(schema_builder.add_text_field(&name, lowercase_raw.clone()))
            } else {
                None
            };
            fields.push(IndexedField {
                mapping: *m,
                stored,
                exact,
                substring,
            });
        }
        let schema = schema_builder.build();

        let index = match &self.storage {
            Storage::Memory => Index::create_in_ram(schema),
            Storage::Disk(base_dir) => {
                let col_dir = base_dir.join(collection);
                std::fs::create_dir_all(&col_dir)
                    .map_err(|e| SearchError::Index(e.to_string()))?;
                let dir = MmapDirectory::open(&col_dir)
                    .map_err(|e| SearchError::Index(e.to_string()))?;
                Index::open_or_create(dir, schema)
                    .map_err(|e| SearchError::Schema(e.to_string()))?
            }
        };

        let analyzer = TextAnalyzer::builder(RawTokenizer::default())
            .filter(LowerCaser)
            .build();
        index.tokenizers().register(LOWERCASE_RAW, analyzer.clone());

        let writer: IndexWriter = index
            .writer(WRITER_HEAP_BYTES)
            .map_err(|e| SearchError::Index(e.to_string()))?;

        let reader = index
            .reader_builder()
            .reload_policy(ReloadPolicy::Manual)
            .try_into()
            .map_err(|e: tantivy::TantivyError| SearchError::Index(e.to_string()))?;

        Ok(CollectionIndex {
            mappings,
            reader,
            writer: Mutex::new(writer),
            id_field,
            fields,
            analyzer,
        })
    }
}

impl SearchEngine for TantivyEngine {
    fn define(&self, collection: &str, fields: &'static [FieldMapping]) -> Result<(), SearchError> {
        let mut collections = self
            .collections
            .write()
            .map_err(|e| SearchError::Index(e.to_string()))?;

        if let Some(existing) = collections.get(collection) {
            if existing.mappings != fields {
                return Err(SearchError::Schema(format!(
                    "collection {} already defined with another mapping",
                    collection
                )));
            }
            return Ok(());
        }

        let index = self.build_collection(collection, fields)?;
        debug!("defined search collection {} ({} fields)", collection, fields.len());
        collections.insert(collection.to_string(), index);
        Ok(())
    }

    fn put_documents(&self, collection: &str, docs: &[Document]) -> Result<(), SearchError> {
        self.with_collection(collection, |col| {
            // Convert up front so a malformed document rejects the whole batch.
            let converted = docs
                .iter()
                .map(|d| col.to_tantivy(d))
                .collect::<Result<Vec<_>, _>>()?;

            col.write(|writer| {
                for (doc, tdoc) in docs.iter().zip(converted) {
                    writer.delete_term(Term::from_field_text(col.id_field, &doc.id));
                    writer
                        .add_document(tdoc)
                        .map_err(|e| SearchError::Index(e.to_string()))?;
                }
                Ok(())
            })?;
            debug!("indexed {} documents into {}", docs.len(), collection);
            Ok(())
        })
    }

    fn delete_documents(&self, collection: &str, ids: &[String]) -> Result<(), SearchError> {
        self.with_collection(collection, |col| {
            col.write(|writer| {
                for id in ids {
                    writer.delete_term(Term::from_field_text(col.id_field, id));
                }
                Ok(())
            })?;
            debug!("deleted {} documents from {}", ids.len(), collection);
            Ok(())
        })
    }

    fn get_documents(&self, collection: &str) -> Result<Vec<Document>, SearchError> {
        self.with_collection(collection, |col| {
            let searcher = col.reader.searcher();
            let all = searcher.num_docs() as usize;
            let (_, hits) = col.ordered(&searcher, &AllQuery, 0, all)?;
            col.load(&searcher, hits)
        })
    }

    fn get_ids(
        &self,
        collection: &str,
        lower: Bound<&str>,
        upper: Bound<&str>,
        limit: usize,
    ) -> Result<Vec<String>, SearchError> {
        self.with_collection(collection, |col| {
            let searcher = col.reader.searcher();
            let range = RangeQuery::new_str_bounds(ID_FIELD.to_string(), lower, upper);
            let (_, hits) = col.ordered(&searcher, &range, 0, limit)?;
            Ok(hits.into_iter().map(|(id, _)| id).collect())
        })
    }

    fn count_documents(&self, collection: &str) -> Result<usize, SearchError> {
        self.with_collection(collection, |col| {
            Ok(col.reader.searcher().num_docs() as usize)
        })
    }

    fn search(
        &self,
        collection: &str,
        query: &Query,
        page: Page,
    ) -> Result<SearchPage, SearchError> {
        self.with_collection(collection, |col| {
            let compiled = col.compile(query)?;
            let searcher = col.reader.searcher();
            let (total, hits) = col.ordered(&searcher, compiled.as_ref(), page.offset, page.limit)?;
            let documents = col.load(&searcher, hits)?;
            Ok(SearchPage { documents, total })
        })
    }
}
