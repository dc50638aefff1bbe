//! Data models for the acquisition pipeline.

use serde::{Deserialize, Serialize};

/// Metadata for one paper, as persisted in the per-query snapshot.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ArticleRecord {
    pub pubmed_id: String,
    pub doi: Option<String>,
    pub title: String,
    #[serde(rename = "abstract")]
    pub abstract_text: String,
    pub authors: Vec<Author>,
    pub journal: JournalInfo,
    pub publication_date: Option<String>,
    pub full_text_link: Option<String>,
}

impl ArticleRecord {
    /// Record with only an id and title; everything else empty.
    pub fn new(pubmed_id: impl Into<String>, title: impl Into<String>) -> Self {
        Self {
            pubmed_id: pubmed_id.into(),
            doi: None,
            title: title.into(),
            abstract_text: String::new(),
            authors: Vec::new(),
            journal: JournalInfo::default(),
            publication_date: None,
            full_text_link: None,
        }
    }

    pub fn with_full_text_link(mut self, link: Option<String>) -> Self {
        self.full_text_link = link;
        self
    }

    /// Journal name for display, `Journal` when unknown.
    pub fn journal_display_name(&self) -> &str {
        if self.journal.name.trim().is_empty() {
            "Journal"
        } else {
            &self.journal.name
        }
    }
}

/// An author entry. PubMed lists consortia as a bare collective name.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Author {
    Collective {
        collective_name: String,
    },
    Person {
        #[serde(default)]
        lastname: String,
        #[serde(default)]
        firstname: String,
        #[serde(default)]
        affiliation: String,
    },
}

impl Author {
    pub fn display_name(&self) -> String {
        match self {
            Author::Collective { collective_name } => collective_name.clone(),
            Author::Person { lastname, firstname, .. } => {
                if firstname.is_empty() {
                    lastname.clone()
                } else {
                    format!("{} {}", firstname, lastname)
                }
            }
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct JournalInfo {
    pub name: String,
    pub issn: String,
    pub volume: String,
    pub issue: String,
}

/// A cross-reference identifier attached to an article
/// (`ArticleId` with `IdType`, or `OtherID` with `Source`).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CrossRef {
    pub id_type: Option<String>,
    pub source: Option<String>,
    pub value: String,
}

impl CrossRef {
    /// True when the identifier points at the PMC free full-text mirror.
    pub fn is_pmc(&self) -> bool {
        self.id_type.as_deref().is_some_and(|t| t.eq_ignore_ascii_case("pmc"))
            || self.source.as_deref().is_some_and(|s| s.eq_ignore_ascii_case("pmc"))
    }
}

/// Parser output: the record plus the raw fields the link resolver needs.
#[derive(Debug, Clone, PartialEq)]
pub struct RawArticle {
    pub record: ArticleRecord,
    pub cross_refs: Vec<CrossRef>,
    /// `ELocationID` / `Link` values found inside the `Article` element.
    pub inline_links: Vec<String>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_record_json_shape() {
        let mut rec = ArticleRecord::new("123", "A title");
        rec.abstract_text = "Body".into();
        rec.authors.push(Author::Person {
            lastname: "Smith".into(),
            firstname: "Jane".into(),
            affiliation: String::new(),
        });
        rec.authors.push(Author::Collective { collective_name: "KRAS Consortium".into() });

        let json = serde_json::to_value(&rec).unwrap();
        assert_eq!(json["pubmed_id"], "123");
        assert_eq!(json["abstract"], "Body");
        assert_eq!(json["authors"][0]["lastname"], "Smith");
        assert_eq!(json["authors"][1]["collective_name"], "KRAS Consortium");
        assert!(json["full_text_link"].is_null());

        let back: ArticleRecord = serde_json::from_value(json).unwrap();
        assert_eq!(back, rec);
    }

    #[test]
    fn test_journal_display_name_fallback() {
        let mut rec = ArticleRecord::new("1", "t");
        assert_eq!(rec.journal_display_name(), "Journal");
        rec.journal.name = "Nature".into();
        assert_eq!(rec.journal_display_name(), "Nature");
    }

    #[test]
    fn test_cross_ref_pmc_detection() {
        let by_type = CrossRef { id_type: Some("pmc".into()), source: None, value: "PMC1".into() };
        let by_source = CrossRef { id_type: None, source: Some("PMC".into()), value: "1".into() };
        let doi = CrossRef { id_type: Some("doi".into()), source: None, value: "10.1/x".into() };
        assert!(by_type.is_pmc());
        assert!(by_source.is_pmc());
        assert!(!doi.is_pmc());
    }
}
