//! Per-family filter catalogs, compiled from `data/filters/<family>.tsv`.

use once_cell::sync::OnceCell;
use serde::Deserialize;

use crate::error::{OpticsError, Result};
use crate::family::Family;

/// One row of a filter catalog.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct FilterEntry {
    #[serde(rename = "filter")]
    pub name: String,
    /// Default number of wavelengths for a broadband calculation
    pub nlambda: u32,
    pub throughput_file: String,
}

/// Ordered filter list for one family, shortest wavelength first.
#[derive(Debug, Clone)]
pub struct FilterCatalog {
    entries: Vec<FilterEntry>,
}

impl FilterCatalog {
    /// Parse a tab-separated table with a `filter nlambda throughput_file` header.
    pub fn parse_tsv(text: &str) -> Result<Self> {
        let mut rdr = csv::ReaderBuilder::new()
            .delimiter(b'\t')
            .trim(csv::Trim::All)
            .from_reader(text.as_bytes());
        let entries = rdr
            .deserialize()
            .collect::<std::result::Result<Vec<FilterEntry>, csv::Error>>()
            .map_err(|e| OpticsError::Data(format!("filter table: {e}")))?;
        if entries.is_empty() {
            return Err(OpticsError::Data("filter table is empty".to_string()));
        }
        Ok(Self { entries })
    }

    pub fn entries(&self) -> &[FilterEntry] {
        &self.entries
    }

    pub fn names(&self) -> Vec<String> {
        self.entries.iter().map(|e| e.name.clone()).collect()
    }

    /// Case-insensitive lookup.
    pub fn resolve(&self, name: &str) -> Option<&FilterEntry> {
        self.entries.iter().find(|e| e.name.eq_ignore_ascii_case(name.trim()))
    }

    pub fn first(&self) -> &FilterEntry {
        &self.entries[0]
    }
}

static NIRCAM: OnceCell<FilterCatalog> = OnceCell::new();
static MIRI: OnceCell<FilterCatalog> = OnceCell::new();
static NIRSPEC: OnceCell<FilterCatalog> = OnceCell::new();
static NIRISS: OnceCell<FilterCatalog> = OnceCell::new();
static FGS: OnceCell<FilterCatalog> = OnceCell::new();

/// Filter catalog of a family, parsed on first use.
pub fn filter_catalog(family: Family) -> Result<&'static FilterCatalog> {
    let (cell, text) = match family {
        Family::NIRCam => (&NIRCAM, include_str!("../../data/filters/nircam.tsv")),
        Family::MIRI => (&MIRI, include_str!("../../data/filters/miri.tsv")),
        Family::NIRSpec => (&NIRSPEC, include_str!("../../data/filters/nirspec.tsv")),
        Family::NIRISS => (&NIRISS, include_str!("../../data/filters/niriss.tsv")),
        Family::FGS => (&FGS, include_str!("../../data/filters/fgs.tsv")),
    };
    cell.get_or_try_init(|| FilterCatalog::parse_tsv(text))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_all_catalogs_parse() {
        for family in Family::ALL {
            let cat = filter_catalog(family).unwrap();
            assert!(!cat.entries().is_empty(), "{family} has no filters");
        }
    }

    #[test]
    fn test_resolve_is_case_insensitive() {
        let cat = filter_catalog(Family::NIRCam).unwrap();
        assert_eq!(cat.resolve("f444w").unwrap().name, "F444W");
        assert!(cat.resolve("F999W").is_none());
    }

    #[test]
    fn test_parse_rejects_bad_rows() {
        let text = "filter\tnlambda\tthroughput_file\nF070W\tnine\tF070W.fits\n";
        assert!(FilterCatalog::parse_tsv(text).is_err());
    }

    #[test]
    fn test_miri_order_starts_short() {
        let cat = filter_catalog(Family::MIRI).unwrap();
        assert_eq!(cat.first().name, "F560W");
        assert_eq!(cat.resolve("F1065C").unwrap().nlambda, 5);
    }
}
