//! Cross-provider identity resolution.
//!
//! Two records are the same work when their DOIs are equal (case-folded, trimmed) or,
//! failing that, when both carry a title and year and the normalized titles and years
//! are equal. Nothing fuzzier is attempted: records that do not meet either rule stay
//! distinct.

use std::collections::HashMap;

use crate::models::Paper;
use crate::utils::doi_key;

/// Outcome of folding one paper into the index
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Fold {
    /// A new work, stored at this position
    New(usize),
    /// Merged into the existing work at this position
    Merged(usize),
}

/// Running identity index owned by a single search.
///
/// Papers keep first-seen order. The index is mutated from one place only, so it needs
/// no locking.
#[derive(Debug, Default)]
pub struct IdentityIndex {
    papers: Vec<Paper>,
    by_doi: HashMap<String, usize>,
    by_title_year: HashMap<(String, i32), Vec<usize>>,
}

impl IdentityIndex {
    pub fn new() -> Self {
        Self::default()
    }

    /// Fold a normalized paper into the index
    pub fn fold(&mut self, paper: Paper) -> Fold {
        match self.resolve(&paper) {
            Some(idx) => {
                self.papers[idx].absorb(paper);
                self.reindex(idx);
                Fold::Merged(idx)
            }
            None => {
                let idx = self.papers.len();
                self.papers.push(paper);
                self.reindex(idx);
                Fold::New(idx)
            }
        }
    }

    fn resolve(&self, paper: &Paper) -> Option<usize> {
        let doi = paper.doi.as_deref().map(doi_key).filter(|k| !k.is_empty());
        if let Some(key) = &doi {
            if let Some(&idx) = self.by_doi.get(key) {
                return Some(idx);
            }
        }

        // Title + year only decides when the two records do not both carry a DOI
        let key = paper.title_year_key()?;
        let candidates = self.by_title_year.get(&key)?;
        candidates.iter().copied().find(|&idx| {
            let existing = self.papers[idx].doi.as_deref().map(doi_key).filter(|k| !k.is_empty());
            existing.is_none() || doi.is_none()
        })
    }

    fn reindex(&mut self, idx: usize) {
        let paper = &self.papers[idx];
        if let Some(doi) = paper.doi.as_deref() {
            let key = doi_key(doi);
            if !key.is_empty() {
                self.by_doi.entry(key).or_insert(idx);
            }
        }
        if let Some(key) = paper.title_year_key() {
            let slot = self.by_title_year.entry(key).or_default();
            if !slot.contains(&idx) {
                slot.push(idx);
            }
        }
    }

    pub fn get(&self, idx: usize) -> Option<&Paper> {
        self.papers.get(idx)
    }

    pub fn len(&self) -> usize {
        self.papers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.papers.is_empty()
    }

    /// Consume the index, returning papers in first-seen order
    pub fn into_papers(self) -> Vec<Paper> {
        self.papers
    }
}

/// Deduplicate a batch of already normalized papers
pub fn deduplicate(papers: impl IntoIterator<Item = Paper>) -> Vec<Paper> {
    let mut index = IdentityIndex::new();
    for paper in papers {
        index.fold(paper);
    }
    index.into_papers()
}
