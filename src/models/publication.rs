//! Publication model shared by every digital library adapter.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// A set of symbolic query options (`query_text`, `year`, ...) and their values.
pub type QueryOptions = BTreeMap<String, String>;

/// The kind of publication, with the fields specific to each kind
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum PublicationKind {
    Article {
        journal: Option<String>,
        volume: Option<String>,
        issue: Option<String>,
        #[serde(rename = "abstract", default)]
        abstract_text: Option<String>,
        #[serde(default)]
        pages: Option<String>,
    },
    Conference {
        book_title: Option<String>,
        conference: Option<String>,
        #[serde(rename = "abstract", default)]
        abstract_text: Option<String>,
        #[serde(default)]
        pages: Option<String>,
    },
    Book {
        #[serde(rename = "abstract", default)]
        abstract_text: Option<String>,
    },
    BookChapter {
        book_title: Option<String>,
        #[serde(rename = "abstract", default)]
        abstract_text: Option<String>,
        #[serde(default)]
        pages: Option<String>,
    },
}

impl PublicationKind {
    pub fn article(journal: Option<String>, volume: Option<String>, issue: Option<String>) -> Self {
        PublicationKind::Article {
            journal,
            volume,
            issue,
            abstract_text: None,
            pages: None,
        }
    }

    pub fn conference(book_title: Option<String>, conference: Option<String>) -> Self {
        PublicationKind::Conference {
            book_title,
            conference,
            abstract_text: None,
            pages: None,
        }
    }

    pub fn book() -> Self {
        PublicationKind::Book {
            abstract_text: None,
        }
    }

    pub fn book_chapter(book_title: Option<String>) -> Self {
        PublicationKind::BookChapter {
            book_title,
            abstract_text: None,
            pages: None,
        }
    }

    /// Short lowercase label, matching the serialized `type` tag
    pub fn label(&self) -> &'static str {
        match self {
            PublicationKind::Article { .. } => "article",
            PublicationKind::Conference { .. } => "conference",
            PublicationKind::Book { .. } => "book",
            PublicationKind::BookChapter { .. } => "book_chapter",
        }
    }

    fn abstract_slot(&mut self) -> &mut Option<String> {
        match self {
            PublicationKind::Article { abstract_text, .. }
            | PublicationKind::Conference { abstract_text, .. }
            | PublicationKind::Book { abstract_text }
            | PublicationKind::BookChapter { abstract_text, .. } => abstract_text,
        }
    }

    fn pages_slot(&mut self) -> Option<&mut Option<String>> {
        match self {
            PublicationKind::Article { pages, .. }
            | PublicationKind::Conference { pages, .. }
            | PublicationKind::BookChapter { pages, .. } => Some(pages),
            PublicationKind::Book { .. } => None,
        }
    }
}

/// A publication harvested from a digital library.
///
/// The identifier is assigned by the provider (a DOI when available, otherwise the
/// provider's own id) and never changes afterwards; it is the key of the results store.
/// `search_terms` records which (source, query) combinations produced the record.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Publication {
    identifier: String,

    /// Title
    pub title: String,

    /// Authors in the order reported by the provider
    #[serde(default)]
    pub authors: Vec<String>,

    /// Publication year as reported by the provider
    #[serde(default)]
    pub year: Option<String>,

    /// Provenance: source name -> query option sets that found this record
    #[serde(default)]
    pub search_terms: BTreeMap<String, Vec<QueryOptions>>,

    #[serde(flatten)]
    pub kind: PublicationKind,
}

impl Publication {
    pub fn new(identifier: impl Into<String>, title: impl Into<String>, kind: PublicationKind) -> Self {
        Self {
            identifier: identifier.into(),
            title: title.into(),
            authors: Vec::new(),
            year: None,
            search_terms: BTreeMap::new(),
            kind,
        }
    }

    pub fn identifier(&self) -> &str {
        &self.identifier
    }

    /// The human-facing venue: journal, conference (or its proceedings), book, or parent book
    pub fn venue(&self) -> Option<&str> {
        match &self.kind {
            PublicationKind::Article { journal, .. } => journal.as_deref(),
            PublicationKind::Conference {
                conference,
                book_title,
                ..
            } => conference
                .as_deref()
                .filter(|c| !c.trim().is_empty())
                .or(book_title.as_deref()),
            PublicationKind::Book { .. } => Some(self.title.as_str()),
            PublicationKind::BookChapter { book_title, .. } => book_title.as_deref(),
        }
    }

    pub fn abstract_text(&self) -> Option<&str> {
        match &self.kind {
            PublicationKind::Article { abstract_text, .. }
            | PublicationKind::Conference { abstract_text, .. }
            | PublicationKind::Book { abstract_text }
            | PublicationKind::BookChapter { abstract_text, .. } => abstract_text.as_deref(),
        }
    }

    /// Record that `query` on `source` produced this publication.
    ///
    /// Returns false when that exact pair was already recorded.
    pub fn add_search_terms(&mut self, source: &str, query: &QueryOptions) -> bool {
        let seen = self.search_terms.entry(source.to_string()).or_default();
        if seen.iter().any(|existing| existing == query) {
            return false;
        }
        seen.push(query.clone());
        true
    }

    /// Number of recorded (source, query) pairs
    pub fn provenance_len(&self) -> usize {
        self.search_terms.values().map(Vec::len).sum()
    }

    /// Compare every bibliographic field, ignoring provenance
    pub fn same_bibliography(&self, other: &Publication) -> bool {
        self.identifier == other.identifier
            && self.title == other.title
            && self.authors == other.authors
            && self.year == other.year
            && self.kind == other.kind
    }
}

/// Builder for constructing Publication objects
#[derive(Debug, Clone)]
pub struct PublicationBuilder {
    publication: Publication,
}

impl PublicationBuilder {
    pub fn new(identifier: impl Into<String>, title: impl Into<String>, kind: PublicationKind) -> Self {
        Self {
            publication: Publication::new(identifier, title, kind),
        }
    }

    pub fn authors(mut self, authors: Vec<String>) -> Self {
        self.publication.authors = authors;
        self
    }

    pub fn year(mut self, year: Option<String>) -> Self {
        self.publication.year = year;
        self
    }

    pub fn abstract_text(mut self, abstract_text: Option<String>) -> Self {
        *self.publication.kind.abstract_slot() = abstract_text;
        self
    }

    /// Set pages; ignored for whole books
    pub fn pages(mut self, pages: Option<String>) -> Self {
        if let Some(slot) = self.publication.kind.pages_slot() {
            *slot = pages;
        }
        self
    }

    pub fn build(self) -> Publication {
        self.publication
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn query(text: &str) -> QueryOptions {
        let mut q = QueryOptions::new();
        q.insert("query_text".to_string(), text.to_string());
        q
    }

    #[test]
    fn test_venue_per_kind() {
        let article = Publication::new(
            "10.1/a",
            "A",
            PublicationKind::article(Some("Journal of Tests".into()), None, None),
        );
        assert_eq!(article.venue(), Some("Journal of Tests"));

        let book = Publication::new("10.1/b", "The Book", PublicationKind::book());
        assert_eq!(book.venue(), Some("The Book"));

        let chapter = Publication::new(
            "10.1/c",
            "Chapter",
            PublicationKind::book_chapter(Some("Edited Volume".into())),
        );
        assert_eq!(chapter.venue(), Some("Edited Volume"));
    }

    #[test]
    fn test_conference_venue_falls_back_to_book_title() {
        let named = Publication::new(
            "x",
            "Paper",
            PublicationKind::conference(Some("Proc. of ICSE 2020".into()), Some("ICSE".into())),
        );
        assert_eq!(named.venue(), Some("ICSE"));

        let unnamed = Publication::new(
            "y",
            "Paper",
            PublicationKind::conference(Some("Proc. of ICSE 2020".into()), None),
        );
        assert_eq!(unnamed.venue(), Some("Proc. of ICSE 2020"));

        let blank = Publication::new(
            "z",
            "Paper",
            PublicationKind::conference(Some("Proceedings".into()), Some("  ".into())),
        );
        assert_eq!(blank.venue(), Some("Proceedings"));
    }

    #[test]
    fn test_builder_sets_abstract_and_pages() {
        let publication = PublicationBuilder::new(
            "10.1/a",
            "Title",
            PublicationKind::article(Some("J".into()), Some("4".into()), None),
        )
        .authors(vec!["Ada Lovelace".into(), "Charles Babbage".into()])
        .year(Some("1843".into()))
        .abstract_text(Some("Notes".into()))
        .pages(Some("1-10".into()))
        .build();

        assert_eq!(publication.identifier(), "10.1/a");
        assert_eq!(publication.abstract_text(), Some("Notes"));
        assert_eq!(publication.authors.len(), 2);
        match &publication.kind {
            PublicationKind::Article { pages, volume, .. } => {
                assert_eq!(pages.as_deref(), Some("1-10"));
                assert_eq!(volume.as_deref(), Some("4"));
            }
            other => panic!("unexpected kind {:?}", other),
        }

        let book = PublicationBuilder::new("b", "Book", PublicationKind::book())
            .pages(Some("300".into()))
            .build();
        assert_eq!(book.kind, PublicationKind::book());
    }

    #[test]
    fn test_search_terms_skip_exact_duplicates() {
        let mut publication = Publication::new("x", "T", PublicationKind::book());
        assert!(publication.add_search_terms("ieee", &query("rust")));
        assert!(!publication.add_search_terms("ieee", &query("rust")));
        assert!(publication.add_search_terms("ieee", &query("ownership")));
        assert!(publication.add_search_terms("springer", &query("rust")));
        assert_eq!(publication.provenance_len(), 3);
    }

    #[test]
    fn test_serialized_shape_is_tagged() {
        let publication = PublicationBuilder::new(
            "10.1/chap",
            "Chapter",
            PublicationKind::book_chapter(Some("Handbook".into())),
        )
        .abstract_text(Some("About".into()))
        .build();

        let value = serde_json::to_value(&publication).unwrap();
        assert_eq!(value["type"], "book_chapter");
        assert_eq!(value["identifier"], "10.1/chap");
        assert_eq!(value["abstract"], "About");

        let back: Publication = serde_json::from_value(value).unwrap();
        assert_eq!(back, publication);
    }
}
