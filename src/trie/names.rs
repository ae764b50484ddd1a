//! Case-folded name index with trigram postings.
//!
//! Maps every distinct folded name to the set of full paths carrying it and
//! keeps a trigram -> names posting list used to narrow substring and fuzzy
//! lookups before any string comparison happens.

use std::collections::{BTreeMap, BTreeSet, HashMap};

use super::trigram::{inner_trigrams, padded_trigrams, Trigram};

#[derive(Debug, Default)]
struct NameSlot {
    paths: BTreeSet<String>,
    trigram_count: usize,
}

#[derive(Debug, Default)]
pub struct NameIndex {
    names: BTreeMap<Box<str>, NameSlot>,
    postings: HashMap<Trigram, BTreeSet<Box<str>>>,
}

impl NameIndex {
    pub fn clear(&mut self) {
        self.names.clear();
        self.postings.clear();
    }

    /// Adds a posting for `path` under the folded `name`.
    pub fn insert(&mut self, name: &str, path: &str) {
        if let Some(slot) = self.names.get_mut(name) {
            slot.paths.insert(path.to_string());
            return;
        }

        let grams = padded_trigrams(name);
        for gram in &grams {
            self.postings.entry(*gram).or_default().insert(name.into());
        }
        let mut paths = BTreeSet::new();
        paths.insert(path.to_string());
        self.names.insert(
            name.into(),
            NameSlot {
                paths,
                trigram_count: grams.len(),
            },
        );
    }

    /// Drops the posting, and the name itself once it has no paths.
    pub fn remove(&mut self, name: &str, path: &str) {
        let Some(slot) = self.names.get_mut(name) else {
            return;
        };
        slot.paths.remove(path);
        if !slot.paths.is_empty() {
            return;
        }

        self.names.remove(name);
        for gram in padded_trigrams(name) {
            if let Some(names) = self.postings.get_mut(&gram) {
                names.remove(name);
                if names.is_empty() {
                    self.postings.remove(&gram);
                }
            }
        }
    }

    /// Paths whose folded name equals `name`.
    pub fn paths_for(&self, name: &str) -> impl Iterator<Item = &str> {
        self.names
            .get(name)
            .into_iter()
            .flat_map(|slot| slot.paths.iter().map(String::as_str))
    }

    /// Folded names containing `term` (exact and prefix matches included).
    pub fn names_containing(&self, term: &str) -> Vec<&str> {
        let grams = inner_trigrams(term);
        if grams.is_empty() {
            return self
                .names
                .keys()
                .filter(|name| name.contains(term))
                .map(|name| &**name)
                .collect();
        }

        let mut lists = Vec::with_capacity(grams.len());
        for gram in &grams {
            match self.postings.get(gram) {
                Some(names) => lists.push(names),
                None => return Vec::new(),
            }
        }
        lists.sort_by_key(|names| names.len());
        let Some((smallest, rest)) = lists.split_first() else {
            return Vec::new();
        };
        smallest
            .iter()
            .filter(|name| rest.iter().all(|names| names.contains(*name)))
            .filter(|name| name.contains(term))
            .map(|name| &**name)
            .collect()
    }

    /// Folded names whose trigram similarity to `term` is at least `threshold`.
    pub fn names_similar_to(&self, term: &str, threshold: f64) -> Vec<(&str, f64)> {
        let query = padded_trigrams(term);
        if query.is_empty() {
            return Vec::new();
        }

        let mut shared: HashMap<&str, usize> = HashMap::new();
        for gram in &query {
            if let Some(names) = self.postings.get(gram) {
                for name in names {
                    *shared.entry(&**name).or_insert(0) += 1;
                }
            }
        }

        let mut similar = shared
            .into_iter()
            .filter_map(|(name, count)| {
                let slot = self.names.get(name)?;
                let score = 2.0 * count as f64 / (query.len() + slot.trigram_count) as f64;
                (score >= threshold).then_some((name, score))
            })
            .collect::<Vec<_>>();
        similar.sort_by(|a, b| a.0.cmp(b.0));
        similar
    }
}
