//! PubMed paper source backed by the NCBI E-utilities `efetch` endpoint.

use std::time::Duration;

use async_trait::async_trait;
use quick_xml::events::{BytesStart, Event};
use quick_xml::Reader;
use reqwest::Client;
use tracing::debug;

use super::{PaperFields, PaperSource, ProviderError, ProviderResult};

/// Base URL of the NCBI E-utilities API.
pub const DEFAULT_EUTILS_URL: &str = "https://eutils.ncbi.nlm.nih.gov/entrez/eutils";

/// Fetches PubMed articles as XML and flattens them into `PaperFields`.
#[derive(Debug, Clone)]
pub struct PubMedClient {
    client: Client,
    base_url: String,
    api_key: Option<String>,
}

impl PubMedClient {
    /// Builds a new E-utilities client.
    ///
    /// `api_key` is an optional NCBI API key; it only raises the rate limit.
    pub fn new(base_url: impl Into<String>, api_key: Option<String>, timeout: Duration) -> ProviderResult<Self> {
        let client = Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| ProviderError::ConfigError(format!("failed to build HTTP client: {}", e)))?;
        Ok(Self {
            client,
            base_url: base_url.into(),
            api_key: api_key.filter(|key| !key.trim().is_empty()),
        })
    }

    fn efetch_url(&self) -> String {
        format!("{}/efetch.fcgi", self.base_url.trim_end_matches('/'))
    }
}

#[async_trait]
impl PaperSource for PubMedClient {
    async fn fetch(&self, pmid: &str) -> ProviderResult<PaperFields> {
        let mut query = vec![("db", "pubmed"), ("id", pmid), ("retmode", "xml")];
        if let Some(key) = &self.api_key {
            query.push(("api_key", key.as_str()));
        }

        debug!(pmid, "Fetching PubMed article");
        let resp = self
            .client
            .get(self.efetch_url())
            .query(&query)
            .send()
            .await
            .map_err(|e| ProviderError::NetworkError(e.to_string()))?;

        let status = resp.status();
        let body = resp
            .text()
            .await
            .map_err(|e| ProviderError::NetworkError(e.to_string()))?;
        if !status.is_success() {
            return Err(ProviderError::HttpStatus {
                status: status.as_u16(),
                body,
            });
        }

        parse_pubmed_xml(&body, pmid)
    }

    fn name(&self) -> &str {
        "PubMed E-utilities"
    }
}

#[derive(Default)]
struct ArticleBuilder {
    pmid: Option<String>,
    title: Option<String>,
    abstract_sections: Vec<String>,
    journal: Option<String>,
    authors: Vec<String>,
    author_parts: AuthorParts,
    affiliations: Vec<String>,
    keywords: Vec<String>,
    doi: Option<String>,
    year: Option<String>,
    mesh_terms: Vec<String>,
}

#[derive(Default)]
struct AuthorParts {
    last: String,
    fore: String,
    collective: String,
}

impl ArticleBuilder {
    fn close(&mut self, name: &str, parent: Option<&str>, text: String, is_doi: bool) {
        match (name, parent) {
            ("PMID", Some("MedlineCitation")) if self.pmid.is_none() => self.pmid = Some(text),
            ("ArticleTitle", _) if self.title.is_none() => self.title = Some(text),
            ("AbstractText", _) if !text.is_empty() => self.abstract_sections.push(text),
            ("Title", Some("Journal")) if self.journal.is_none() => self.journal = Some(text),
            ("LastName", Some("Author")) => self.author_parts.last = text,
            ("ForeName", Some("Author")) => self.author_parts.fore = text,
            ("CollectiveName", Some("Author")) => self.author_parts.collective = text,
            ("Author", _) => {
                let parts = std::mem::take(&mut self.author_parts);
                let name = if parts.collective.is_empty() {
                    format!("{} {}", parts.fore, parts.last).trim().to_string()
                } else {
                    parts.collective
                };
                if !name.is_empty() {
                    self.authors.push(name);
                }
            }
            ("Affiliation", _) if !text.is_empty() && !self.affiliations.contains(&text) => {
                self.affiliations.push(text)
            }
            ("Keyword", _) if !text.is_empty() => self.keywords.push(text),
            ("ArticleId", _) | ("ELocationID", _) if is_doi && self.doi.is_none() => {
                self.doi = Some(text)
            }
            ("Year", Some("PubDate")) if self.year.is_none() => self.year = Some(text),
            ("MedlineDate", Some("PubDate")) if self.year.is_none() => {
                let year: String = text.chars().take(4).collect();
                if year.len() == 4 && year.chars().all(|c| c.is_ascii_digit()) {
                    self.year = Some(year);
                }
            }
            ("DescriptorName", Some("MeshHeading")) if !text.is_empty() => self.mesh_terms.push(text),
            _ => {}
        }
    }

    fn finish(self, requested_pmid: &str) -> PaperFields {
        let mut fields = PaperFields::new();
        fields.insert(
            "pmid".to_string(),
            self.pmid.unwrap_or_else(|| requested_pmid.to_string()),
        );
        fields.insert("title".to_string(), self.title.unwrap_or_default());
        fields.insert("abstract".to_string(), self.abstract_sections.join(" "));
        fields.insert("journal".to_string(), self.journal.unwrap_or_default());
        fields.insert("authors".to_string(), self.authors.join("; "));
        fields.insert("affiliations".to_string(), self.affiliations.join("; "));
        fields.insert("keywords".to_string(), self.keywords.join("; "));
        fields.insert("doi".to_string(), self.doi.unwrap_or_default());
        fields.insert("publication_year".to_string(), self.year.unwrap_or_default());
        fields.insert("mesh_terms".to_string(), self.mesh_terms.join("; "));
        fields
    }
}

fn element_name(name: &[u8]) -> String {
    String::from_utf8_lossy(name).into_owned()
}

fn has_attribute(e: &BytesStart, key: &[u8], value: &[u8]) -> bool {
    e.attributes()
        .flatten()
        .any(|attr| attr.key.as_ref() == key && attr.value.as_ref() == value)
}

fn collapse(text: &str) -> String {
    text.split_whitespace().collect::<Vec<_>>().join(" ")
}

/// Parse an `efetch` response and flatten the first `PubmedArticle`.
///
/// Text nested in inline markup (`<i>`, `<sup>`, ...) is folded into its
/// enclosing element. Multi-valued fields are joined with `"; "`, abstract
/// sections with a single space.
///
/// # Errors
/// `ProviderError::NotFound` if the document contains no article,
/// `ProviderError::ParseError` for malformed XML.
pub fn parse_pubmed_xml(xml: &str, requested_pmid: &str) -> ProviderResult<PaperFields> {
    let mut reader = Reader::from_str(xml);
    // (element name, accumulated text, carries a DOI attribute)
    let mut stack: Vec<(String, String, bool)> = Vec::new();
    let mut article: Option<ArticleBuilder> = None;

    loop {
        let event = reader.read_event().map_err(|e| {
            ProviderError::ParseError(format!(
                "XML error at position {}: {}",
                reader.buffer_position(),
                e
            ))
        })?;

        match event {
            Event::Start(e) => {
                let name = element_name(e.name().as_ref());
                if name == "PubmedArticle" && article.is_none() {
                    article = Some(ArticleBuilder::default());
                }
                let is_doi =
                    has_attribute(&e, b"IdType", b"doi") || has_attribute(&e, b"EIdType", b"doi");
                stack.push((name, String::new(), is_doi));
            }
            Event::Text(t) => {
                let text = t
                    .unescape()
                    .map_err(|e| ProviderError::ParseError(e.to_string()))?;
                if let Some((_, buf, _)) = stack.last_mut() {
                    buf.push_str(&text);
                }
            }
            Event::CData(c) => {
                let raw = c.into_inner();
                if let Some((_, buf, _)) = stack.last_mut() {
                    buf.push_str(&String::from_utf8_lossy(&raw));
                }
            }
            Event::End(_) => {
                let Some((name, text, is_doi)) = stack.pop() else {
                    continue;
                };
                let parent = stack.last().map(|(parent, _, _)| parent.as_str());
                if let Some(builder) = article.as_mut() {
                    builder.close(&name, parent, collapse(&text), is_doi);
                }
                if let Some((_, buf, _)) = stack.last_mut() {
                    buf.push_str(&text);
                }
                if name == "PubmedArticle" {
                    break;
                }
            }
            Event::Eof => break,
            _ => {}
        }
    }

    article
        .map(|builder| builder.finish(requested_pmid))
        .ok_or_else(|| ProviderError::NotFound(requested_pmid.to_string()))
}
