//! Document ingestion
//!
//! Loads one HTML filing per configured year, converts it to plain text and
//! tags the resulting document with its year. A missing or unreadable filing
//! fails the whole run; no partial corpus is returned.

use crate::config::Settings;
use crate::error::AgentError;
use crate::models::{DocumentMetadata, FilingDocument, Year, YearMap};
use crate::Result;
use std::fs;
use std::path::Path;
use tracing::{debug, info};

/// Column width used when rendering HTML tables and paragraphs to text
const TEXT_WIDTH: usize = 120;

/// Documents grouped per year plus the flat concatenation in year order
#[derive(Debug, Clone)]
pub struct IngestedCorpus {
    pub by_year: YearMap<Vec<FilingDocument>>,
    pub all: Vec<FilingDocument>,
}

/// Ingest every configured year
pub fn ingest(settings: &Settings) -> Result<IngestedCorpus> {
    ingest_years(settings, &settings.years)
}

/// Ingest the given years, in the given order
pub fn ingest_years(settings: &Settings, years: &[Year]) -> Result<IngestedCorpus> {
    let mut by_year = YearMap::new();
    let mut all = Vec::new();

    for &year in years {
        let path = settings.filing_path(year);
        let docs = load_filing(&path, year)?;

        info!(
            year = %year,
            documents = docs.len(),
            chars = docs.iter().map(|d| d.text.len()).sum::<usize>(),
            "Filing ingested"
        );

        all.extend(docs.iter().cloned());
        by_year.insert(year, docs);
    }

    Ok(IngestedCorpus { by_year, all })
}

/// Load one filing as a single document tagged with `year`
pub fn load_filing(path: &Path, year: Year) -> Result<Vec<FilingDocument>> {
    let bytes = fs::read(path).map_err(|e| AgentError::MissingFiling {
        year,
        path: path.to_path_buf(),
        reason: e.to_string(),
    })?;

    let text = html_to_text(&bytes).map_err(|reason| AgentError::MissingFiling {
        year,
        path: path.to_path_buf(),
        reason,
    })?;

    if text.trim().is_empty() {
        return Err(AgentError::EmptyFiling { year });
    }

    let id = path
        .file_stem()
        .map(|s| s.to_string_lossy().to_string())
        .unwrap_or_else(|| year.to_string());

    debug!(year = %year, id = %id, "Converted filing HTML to text");

    Ok(vec![FilingDocument {
        id,
        text,
        metadata: DocumentMetadata { year },
    }])
}

fn html_to_text(bytes: &[u8]) -> std::result::Result<String, String> {
    html2text::from_read(bytes, TEXT_WIDTH).map_err(|e| e.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn settings_in(dir: &Path, years: &[u16]) -> Settings {
        Settings {
            data_directory: dir.to_path_buf(),
            years: years.iter().map(|y| Year::new(*y).unwrap()).collect(),
            ..Settings::default()
        }
    }

    fn write_filing(dir: &Path, year: u16, body: &str) {
        fs::write(
            dir.join(format!("UBER_{}.html", year)),
            format!("<html><body><h1>Form 10-K {}</h1>{}</body></html>", year, body),
        )
        .unwrap();
    }

    #[test]
    fn test_every_document_tagged_with_its_year() {
        let dir = tempfile::tempdir().unwrap();
        write_filing(dir.path(), 2020, "<p>Revenue declined due to COVID-19.</p>");
        write_filing(dir.path(), 2021, "<p>Revenue recovered as trips returned.</p>");
        let settings = settings_in(dir.path(), &[2021, 2020]);

        let corpus = ingest(&settings).unwrap();

        assert_eq!(corpus.by_year.years(), settings.years);
        for (year, docs) in corpus.by_year.iter() {
            assert!(!docs.is_empty());
            for doc in docs {
                assert_eq!(doc.metadata, DocumentMetadata { year });
            }
        }

        // Flat list keeps year order, then document order.
        let flat_years: Vec<u16> = corpus.all.iter().map(|d| d.metadata.year.value()).collect();
        assert_eq!(flat_years, vec![2021, 2020]);
        assert!(corpus.all[0].text.contains("recovered"));
        assert!(!corpus.all[0].text.contains("<p>"));
    }

    #[test]
    fn test_missing_filing_fails_whole_run() {
        let dir = tempfile::tempdir().unwrap();
        write_filing(dir.path(), 2020, "<p>present</p>");
        let settings = settings_in(dir.path(), &[2020, 2019]);

        let err = ingest(&settings).unwrap_err();
        match err {
            AgentError::MissingFiling { year, path, .. } => {
                assert_eq!(year.value(), 2019);
                assert!(path.ends_with("UBER_2019.html"));
            }
            other => panic!("unexpected error {:?}", other),
        }
    }

    #[test]
    fn test_empty_filing_rejected() {
        let dir = tempfile::tempdir().unwrap();
        fs::write(dir.path().join("UBER_2022.html"), "<html><body></body></html>").unwrap();
        let settings = settings_in(dir.path(), &[2022]);

        assert!(matches!(
            ingest(&settings),
            Err(AgentError::EmptyFiling { .. })
        ));
    }
}
