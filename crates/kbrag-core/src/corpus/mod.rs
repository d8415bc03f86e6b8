//! Corpus indexer.
//!
//! Reads a directory of markdown documents with YAML front matter, splits them
//! into section chunks and builds the alias index, the catalog entity index
//! and per-document theme metadata in one pass. Nothing is visible to callers
//! until `finish` has validated every cross-reference, so a query never sees a
//! half-built corpus.

mod document;
mod filter;

use std::collections::btree_map::Entry;
use std::collections::{BTreeMap, BTreeSet, HashMap, HashSet};
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use tracing::{debug, info, warn};

use crate::config::CorpusConfig;
use crate::error::{Error, Result};
use crate::normalize::{alias_key, slugify};
use crate::types::{
    AliasEntry, Chunk, ChunkId, CtaHints, DocumentMeta, EntityEntry, SkipReason, SkippedDocument,
};

pub use document::FrontMatter;
use document::{DocumentParser, ParsedSection};
use filter::DocumentFilter;

const CATALOG_DOC_TYPE: &str = "catalog";

/// Immutable result of one indexing pass.
#[derive(Debug, Default)]
pub struct Corpus {
    chunks: Vec<Arc<Chunk>>,
    by_id: HashMap<ChunkId, usize>,
    by_anchor: HashMap<(String, String), usize>,
    aliases: BTreeMap<String, AliasEntry>,
    entities: BTreeMap<String, EntityEntry>,
    documents: Vec<DocumentMeta>,
    skipped: Vec<SkippedDocument>,
    fingerprint: String,
}

impl Corpus {
    pub fn empty() -> Self {
        Self { fingerprint: blake3::Hasher::new().finalize().to_hex().to_string(), ..Self::default() }
    }

    pub fn chunks(&self) -> &[Arc<Chunk>] {
        &self.chunks
    }

    pub fn len(&self) -> usize {
        self.chunks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.chunks.is_empty()
    }

    pub fn get(&self, id: &str) -> Option<&Arc<Chunk>> {
        self.by_id.get(id).map(|&i| &self.chunks[i])
    }

    /// Chunk for `file` + anchor. A bare section id resolves to the first
    /// chunk of that section.
    pub fn resolve(&self, file: &str, anchor: &str) -> Option<&Arc<Chunk>> {
        self.by_anchor.get(&(file.to_string(), anchor.to_string())).map(|&i| &self.chunks[i])
    }

    pub fn first_chunk_in_file(&self, file: &str) -> Option<&Arc<Chunk>> {
        self.documents
            .iter()
            .find(|d| d.file == file)
            .and_then(|d| d.chunk_ids.first())
            .and_then(|id| self.get(id))
    }

    /// First chunk of `topic` whose section id or anchor equals `section_id`.
    pub fn find_section(&self, topic: &str, section_id: &str) -> Option<&Arc<Chunk>> {
        self.chunks
            .iter()
            .find(|c| c.topic == topic && (c.section_id == section_id || c.anchor() == section_id))
    }

    pub fn alias(&self, key: &str) -> Option<&AliasEntry> {
        self.aliases.get(key)
    }

    pub fn aliases(&self) -> &BTreeMap<String, AliasEntry> {
        &self.aliases
    }

    pub fn entities(&self) -> &BTreeMap<String, EntityEntry> {
        &self.entities
    }

    pub fn documents(&self) -> &[DocumentMeta] {
        &self.documents
    }

    pub fn skipped(&self) -> &[SkippedDocument] {
        &self.skipped
    }

    /// blake3 over retained file names and contents.
    pub fn fingerprint(&self) -> &str {
        &self.fingerprint
    }

    fn validate(&self) -> Result<()> {
        for (key, entry) in &self.aliases {
            if self.resolve(&entry.file, &entry.section_id).is_none() {
                return Err(Error::Inconsistent(format!(
                    "alias '{key}' points at missing section {}#{}",
                    entry.file, entry.section_id
                )));
            }
        }
        for (key, entity) in &self.entities {
            if !self.by_id.contains_key(&entity.chunk_id) {
                return Err(Error::Inconsistent(format!("entity '{key}' points at missing chunk {}", entity.chunk_id)));
            }
        }
        for doc in &self.documents {
            if let Some(id) = doc.chunk_ids.iter().find(|id| !self.by_id.contains_key(id.as_str())) {
                return Err(Error::Inconsistent(format!("document {} lists missing chunk {id}", doc.file)));
            }
        }
        Ok(())
    }
}

pub struct CorpusBuilder {
    parser: DocumentParser,
    filter: DocumentFilter,
}

impl CorpusBuilder {
    pub fn new(config: &CorpusConfig) -> Result<Self> {
        let parser = DocumentParser::new().map_err(|e| Error::Operation(format!("document parser: {e}")))?;
        let filter = DocumentFilter::new(&config.skip_files, config.min_body_chars)
            .map_err(|e| Error::Operation(format!("document filter: {e}")))?;
        Ok(Self { parser, filter })
    }

    /// Indexes every `.md` file under `dir`, in path order.
    pub fn build_from_dir(&self, dir: &Path) -> Result<Corpus> {
        if !dir.is_dir() {
            return Err(Error::NotFound(format!("corpus directory {}", dir.display())));
        }
        let mut files: Vec<PathBuf> = walkdir::WalkDir::new(dir)
            .into_iter()
            .filter_map(|entry| match entry {
                Ok(entry) => Some(entry),
                Err(err) => {
                    warn!(error = %err, "skipping unreadable directory entry");
                    None
                }
            })
            .filter(|e| e.file_type().is_file())
            .filter(|e| e.path().extension().and_then(|s| s.to_str()) == Some("md"))
            .map(|e| e.path().to_path_buf())
            .collect();
        files.sort();

        let mut assembly = Assembly::default();
        for path in files {
            let relative = path.strip_prefix(dir).unwrap_or(&path);
            let name = relative
                .components()
                .map(|c| c.as_os_str().to_string_lossy().into_owned())
                .collect::<Vec<_>>()
                .join("/");
            match fs::read_to_string(&path) {
                Ok(content) => assembly.add_document(self, &name, &content),
                Err(err) => {
                    warn!(file = %name, error = %err, "unreadable document skipped");
                    assembly.skip(&name, SkipReason::Unreadable(err.to_string()));
                }
            }
        }
        assembly.finish()
    }

    /// Indexes in-memory `(file name, content)` pairs, in the given order.
    pub fn build_from_sources<I, N, C>(&self, sources: I) -> Result<Corpus>
    where
        I: IntoIterator<Item = (N, C)>,
        N: AsRef<str>,
        C: AsRef<str>,
    {
        let mut assembly = Assembly::default();
        for (name, content) in sources {
            assembly.add_document(self, name.as_ref(), content.as_ref());
        }
        assembly.finish()
    }
}

/// Mutable state of a single indexing pass. Never escapes `CorpusBuilder`.
#[derive(Default)]
struct Assembly {
    chunks: Vec<Arc<Chunk>>,
    by_id: HashMap<ChunkId, usize>,
    by_anchor: HashMap<(String, String), usize>,
    section_aliases: BTreeMap<String, AliasEntry>,
    document_aliases: BTreeMap<String, AliasEntry>,
    entities: BTreeMap<String, EntityEntry>,
    documents: Vec<DocumentMeta>,
    skipped: Vec<SkippedDocument>,
    hasher: blake3::Hasher,
}

/// Document-wide fields copied onto every chunk.
struct DocContext<'a> {
    file: &'a str,
    title: String,
    topic: String,
    doc_type: String,
    front: FrontMatter,
}

impl Assembly {
    fn skip(&mut self, file: &str, reason: SkipReason) {
        self.skipped.push(SkippedDocument { file: file.to_string(), reason });
    }

    fn add_document(&mut self, builder: &CorpusBuilder, file: &str, content: &str) {
        let file_name = Path::new(file).file_name().and_then(|n| n.to_str()).unwrap_or(file);
        if builder.filter.is_index_name(file_name) {
            debug!(file, "navigation index skipped");
            self.skip(file, SkipReason::IndexLike);
            return;
        }
        let parsed = match builder.parser.parse(content) {
            Ok(parsed) => parsed,
            Err(reason) => {
                warn!(file, %reason, "malformed document skipped");
                self.skip(file, SkipReason::Malformed(reason));
                return;
            }
        };
        if builder.filter.is_too_short(parsed.body) {
            debug!(file, "short document without factual content skipped");
            self.skip(file, SkipReason::TooShort);
            return;
        }

        let front = parsed.front;
        let title = front
            .title
            .as_deref()
            .map(str::trim)
            .filter(|t| !t.is_empty())
            .map_or_else(|| file_stem(file), str::to_string);
        let sections = builder.parser.sections(parsed.body, &title);
        let ctx = DocContext { file, topic: front.topic(), doc_type: front.doc_type(), title, front };

        let mut chunk_ids = Vec::new();
        let mut used_anchors = HashSet::new();
        let mut section_ids = Vec::new();
        for section in &sections {
            let produced = self.add_section(&ctx, section, &mut used_anchors);
            if !produced.is_empty() {
                section_ids.push(section.id.clone());
                chunk_ids.extend(produced);
            }
        }
        if chunk_ids.is_empty() {
            debug!(file, "document without content skipped");
            self.skip(file, SkipReason::Empty);
            return;
        }

        let primary = match ctx.front.primary_section.as_deref() {
            Some(wanted) if self.by_anchor.contains_key(&(file.to_string(), wanted.to_string())) => wanted.to_string(),
            Some(wanted) => {
                warn!(file, section = wanted, "primary section not found, using the first section");
                section_ids[0].clone()
            }
            None => section_ids[0].clone(),
        };
        for alias in &ctx.front.aliases {
            let entry = AliasEntry { topic: ctx.topic.clone(), file: file.to_string(), section_id: primary.clone() };
            register(&mut self.document_aliases, alias_key(alias), entry);
        }

        self.hasher.update(file.as_bytes());
        self.hasher.update(&[0]);
        self.hasher.update(content.as_bytes());
        self.hasher.update(&[0]);
        self.documents.push(DocumentMeta {
            file: file.to_string(),
            topic: ctx.topic,
            doc_type: ctx.doc_type,
            title: ctx.title,
            aliases: ctx.front.aliases,
            tags: ctx.front.tags,
            chunk_ids,
        });
    }

    /// Emits the chunks of one `##` section and registers its aliases and
    /// catalog entities. Returns the ids of the chunks it produced.
    fn add_section(&mut self, ctx: &DocContext<'_>, section: &ParsedSection, used: &mut HashSet<String>) -> Vec<ChunkId> {
        let mut produced = Vec::new();
        let section_aliases: BTreeSet<String> = section.aliases.iter().cloned().collect();
        let is_catalog = ctx.doc_type == CATALOG_DOC_TYPE;
        let duplicate = self.by_anchor.contains_key(&(ctx.file.to_string(), section.id.clone()));
        if duplicate {
            warn!(file = ctx.file, section = %section.id, "duplicate section id, its aliases target the renamed anchor");
        }

        if section.subsections.is_empty() {
            if let Some(id) = self.push_chunk(ctx, section, None, &section.preamble, &section_aliases, section.id.clone(), used) {
                produced.push(id);
            }
        } else {
            if !section.preamble.trim().is_empty() {
                let anchor = format!("{}/preamble", section.id);
                if let Some(id) = self.push_chunk(ctx, section, None, &section.preamble, &section_aliases, anchor, used) {
                    produced.push(id);
                }
            }
            for sub in &section.subsections {
                let mut aliases = section_aliases.clone();
                aliases.extend(sub.aliases.iter().cloned());
                let slug = slugify(&sub.title);
                let anchor = format!("{}/{}", section.id, if slug.is_empty() { "item" } else { slug.as_str() });
                let Some(id) = self.push_chunk(ctx, section, Some(sub.title.as_str()), &sub.body, &aliases, anchor, used) else {
                    continue;
                };
                let anchor = self.chunks[self.by_id[&id]].anchor().to_string();
                if is_catalog {
                    let entity_key = slugify(&sub.title);
                    for name in std::iter::once(&sub.title).chain(sub.aliases.iter()) {
                        let entry = EntityEntry {
                            topic: ctx.topic.clone(),
                            entity_key: entity_key.clone(),
                            doc_id: ctx.file.to_string(),
                            section_title: section.title.clone(),
                            chunk_id: id.clone(),
                        };
                        register_entity(&mut self.entities, alias_key(name), entry);
                    }
                } else {
                    for alias in &sub.aliases {
                        let entry = AliasEntry { topic: ctx.topic.clone(), file: ctx.file.to_string(), section_id: anchor.clone() };
                        register(&mut self.section_aliases, alias_key(alias), entry);
                    }
                }
                produced.push(id);
            }
        }

        if let Some(first) = produced.first() {
            let target = if duplicate { self.chunks[self.by_id[first]].anchor().to_string() } else { section.id.clone() };
            let keys = [section.title.as_str(), section.id.as_str()].into_iter().chain(section.aliases.iter().map(String::as_str));
            for key in keys {
                let entry = AliasEntry { topic: ctx.topic.clone(), file: ctx.file.to_string(), section_id: target.clone() };
                register(&mut self.section_aliases, alias_key(key), entry);
            }
        }
        produced
    }

    #[allow(clippy::too_many_arguments)]
    fn push_chunk(
        &mut self,
        ctx: &DocContext<'_>,
        section: &ParsedSection,
        subsection: Option<&str>,
        body: &str,
        aliases: &BTreeSet<String>,
        anchor: String,
        used: &mut HashSet<String>,
    ) -> Option<ChunkId> {
        let text = body.trim();
        if text.is_empty() {
            return None;
        }
        let mut unique = anchor.clone();
        let mut n = 2;
        while !used.insert(unique.clone()) {
            unique = format!("{anchor}~{n}");
            n += 1;
        }

        let mut index_parts: Vec<&str> = vec![section.title.as_str()];
        index_parts.extend(subsection);
        index_parts.extend(aliases.iter().map(String::as_str));
        index_parts.push(text);

        let front = &ctx.front;
        let chunk = Chunk {
            id: format!("{}#{}", ctx.file, unique),
            file: ctx.file.to_string(),
            section_id: section.id.clone(),
            subsection: subsection.map(str::to_string),
            title: ctx.title.clone(),
            heading: section.title.clone(),
            text: text.to_string(),
            index_text: index_parts.join("\n"),
            topic: ctx.topic.clone(),
            doc_type: ctx.doc_type.clone(),
            section_aliases: aliases.clone(),
            criticality: front.criticality.clone().unwrap_or_else(|| "medium".to_string()),
            tone: front.tone.clone().unwrap_or_else(|| "friendly".to_string()),
            emotion: front.emotion.clone(),
            verbatim: front.verbatim,
            cta: CtaHints { action: front.cta_action.clone(), text: front.cta_text.clone(), link: front.cta_link.clone() },
        };

        let index = self.chunks.len();
        let id = chunk.id.clone();
        self.by_id.insert(id.clone(), index);
        self.by_anchor.insert((ctx.file.to_string(), unique), index);
        self.by_anchor.entry((ctx.file.to_string(), section.id.clone())).or_insert(index);
        self.chunks.push(Arc::new(chunk));
        Some(id)
    }

    fn finish(self) -> Result<Corpus> {
        let mut aliases = self.document_aliases;
        // section-scoped keys are more specific than document-level ones
        aliases.extend(self.section_aliases);

        let corpus = Corpus {
            chunks: self.chunks,
            by_id: self.by_id,
            by_anchor: self.by_anchor,
            aliases,
            entities: self.entities,
            documents: self.documents,
            skipped: self.skipped,
            fingerprint: self.hasher.finalize().to_hex().to_string(),
        };
        corpus.validate()?;
        info!(
            documents = corpus.documents.len(),
            chunks = corpus.chunks.len(),
            aliases = corpus.aliases.len(),
            entities = corpus.entities.len(),
            skipped = corpus.skipped.len(),
            "corpus built"
        );
        Ok(corpus)
    }
}

fn file_stem(file: &str) -> String {
    Path::new(file).file_stem().map_or_else(|| file.to_string(), |s| s.to_string_lossy().into_owned())
}

fn register(map: &mut BTreeMap<String, AliasEntry>, key: String, entry: AliasEntry) {
    if key.is_empty() {
        return;
    }
    match map.entry(key) {
        Entry::Vacant(slot) => {
            slot.insert(entry);
        }
        Entry::Occupied(existing) => {
            if existing.get() != &entry {
                debug!(key = %existing.key(), kept = ?existing.get(), dropped = ?entry, "alias conflict");
            }
        }
    }
}

fn register_entity(map: &mut BTreeMap<String, EntityEntry>, key: String, entry: EntityEntry) {
    if key.is_empty() {
        return;
    }
    if let Entry::Vacant(slot) = map.entry(key) {
        slot.insert(entry);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn dangling_alias_is_rejected() {
        let mut corpus = Corpus::empty();
        corpus.aliases.insert(
            "ghost".to_string(),
            AliasEntry { topic: "clinic".into(), file: "missing.md".into(), section_id: "nowhere".into() },
        );
        assert!(matches!(corpus.validate(), Err(Error::Inconsistent(_))));
    }

    #[test]
    fn dangling_entity_is_rejected() {
        let mut corpus = Corpus::empty();
        corpus.entities.insert(
            "ghost".to_string(),
            EntityEntry {
                topic: "prices".into(),
                entity_key: "ghost".into(),
                doc_id: "missing.md".into(),
                section_title: "Nothing".into(),
                chunk_id: "missing.md#nothing".into(),
            },
        );
        assert!(matches!(corpus.validate(), Err(Error::Inconsistent(_))));
    }
}
