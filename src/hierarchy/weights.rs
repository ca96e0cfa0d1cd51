//! Relative weights of HS4 headings within their chapter, for a given country.
//!
//! Weights come from a per-country, per-section table keyed by HS code or chapter ID. Within a
//! chapter only headings with a positive weight take part in normalisation. If no heading in a
//! chapter has a positive weight, every heading gets an equal share instead.
use super::{HsHierarchy, get_chapter};
use crate::id::{ChapterID, CountryCode, Hs4Code, SectionID};
use indexmap::IndexMap;
use log::{debug, warn};
use std::collections::HashMap;
use std::rc::Rc;

/// Weight table keyed by country, section, then HS code or chapter ID
pub type SectionWeightTable = HashMap<CountryCode, HashMap<SectionID, HashMap<String, f64>>>;

/// The `total_weight` reported when a chapter's weights were split equally
pub const UNIFORM_TOTAL_WEIGHT: f64 = 1.0;

/// Normalised HS4 weights for one chapter
#[derive(Debug, Clone, PartialEq)]
pub struct ChapterWeights {
    /// Sum of the source weights, or [`UNIFORM_TOTAL_WEIGHT`] for an equal split
    pub total_weight: f64,
    /// Each heading's share of the chapter
    pub hs4_relative_weights: IndexMap<Hs4Code, f64>,
}

/// Cached [`ChapterWeights`], keyed by country, section and chapter.
///
/// Entries are never refreshed; call [`WeightCache::clear`] to start again.
#[derive(Debug, Default)]
pub struct WeightCache(
    HashMap<CountryCode, HashMap<SectionID, HashMap<ChapterID, Rc<ChapterWeights>>>>,
);

impl WeightCache {
    /// Create a new, empty cache
    pub fn new() -> Self {
        Self::default()
    }

    /// Retrieve cached weights for a chapter
    pub fn get(
        &self,
        country: &CountryCode,
        section: &SectionID,
        chapter: &ChapterID,
    ) -> Option<Rc<ChapterWeights>> {
        self.0.get(country)?.get(section)?.get(chapter).cloned()
    }

    /// Store weights for a chapter
    pub fn insert(
        &mut self,
        country: &CountryCode,
        section: &SectionID,
        chapter: &ChapterID,
        weights: Rc<ChapterWeights>,
    ) {
        self.0
            .entry(country.clone())
            .or_default()
            .entry(section.clone())
            .or_default()
            .insert(chapter.clone(), weights);
    }

    /// Whether anything has been cached for `country`
    pub fn contains_country(&self, country: &CountryCode) -> bool {
        self.0.contains_key(country)
    }

    /// Number of chapters cached across all countries
    pub fn len(&self) -> usize {
        self.0
            .values()
            .flat_map(HashMap::values)
            .map(HashMap::len)
            .sum()
    }

    /// Whether the cache is empty
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Remove every entry
    pub fn clear(&mut self) {
        self.0.clear();
    }
}

/// Look up the source weight for an HS code (or chapter ID) in a section.
///
/// Returns `None` when there is no entry, as distinct from a weight of zero.
pub fn get_hs_code_weight(
    section: &SectionID,
    hs_code: &str,
    country: &CountryCode,
    weight_table: &SectionWeightTable,
) -> Option<f64> {
    weight_table
        .get(country)?
        .get(section)?
        .get(hs_code)
        .copied()
}

/// Share a chapter equally between its headings.
///
/// Used when there is no usable weight data for the chapter.
pub fn equal_split<I>(codes: I) -> ChapterWeights
where
    I: IntoIterator<Item = Hs4Code>,
{
    let codes: Vec<_> = codes.into_iter().collect();
    let share = 1.0 / codes.len() as f64;

    ChapterWeights {
        total_weight: UNIFORM_TOTAL_WEIGHT,
        hs4_relative_weights: codes.into_iter().map(|code| (code, share)).collect(),
    }
}

/// Normalise source weights for the headings of one chapter.
///
/// Headings with a missing or non-positive weight are left out. If none remain, falls back to
/// [`equal_split`] over every heading.
pub fn normalise_chapter_weights<I>(weights: I) -> ChapterWeights
where
    I: IntoIterator<Item = (Hs4Code, Option<f64>)>,
{
    let weights: Vec<_> = weights.into_iter().collect();
    let positive: IndexMap<Hs4Code, f64> = weights
        .iter()
        .filter_map(|(code, weight)| {
            weight
                .filter(|weight| *weight > 0.0)
                .map(|weight| (code.clone(), weight))
        })
        .collect();
    let total_weight: f64 = positive.values().sum();

    if total_weight > 0.0 {
        ChapterWeights {
            total_weight,
            hs4_relative_weights: positive
                .into_iter()
                .map(|(code, weight)| (code, weight / total_weight))
                .collect(),
        }
    } else {
        equal_split(weights.into_iter().map(|(code, _)| code))
    }
}

/// Calculate the relative weights of the HS4 headings in a chapter for `country`.
///
/// If `cache` already holds an entry for this chapter it is returned as is. Otherwise the weights
/// are computed with [`normalise_chapter_weights`] and stored in `cache`.
///
/// Returns `None` if the chapter is not in `hierarchy`.
pub fn calculate_chapter_relative_weights(
    section: &SectionID,
    chapter: &ChapterID,
    hierarchy: &HsHierarchy,
    country: &CountryCode,
    weight_table: &SectionWeightTable,
    cache: Option<&mut WeightCache>,
) -> Option<Rc<ChapterWeights>> {
    if let Some(weights) = cache
        .as_deref()
        .and_then(|cache| cache.get(country, section, chapter))
    {
        debug!("Using cached weights for {country}, section {section}, chapter {chapter}");
        return Some(weights);
    }

    let Some(node) = get_chapter(hierarchy, section, chapter) else {
        warn!("Chapter {chapter} not found in section {section}");
        return None;
    };

    let weights = Rc::new(normalise_chapter_weights(node.subcategories.keys().map(
        |code| {
            let weight = get_hs_code_weight(section, code.as_str(), country, weight_table);
            (code.clone(), weight)
        },
    )));

    if let Some(cache) = cache {
        cache.insert(country, section, chapter, Rc::clone(&weights));
    }

    Some(weights)
}

/// Calculate and cache chapter weights for every chapter in `hierarchy` for `country`.
///
/// Returns the number of chapters processed.
pub fn precompute_country_weights(
    country: &CountryCode,
    hierarchy: &HsHierarchy,
    weight_table: &SectionWeightTable,
    cache: &mut WeightCache,
) -> usize {
    let mut count = 0;
    for (section_id, section) in hierarchy {
        for chapter_id in section.chapters.keys() {
            calculate_chapter_relative_weights(
                section_id,
                chapter_id,
                hierarchy,
                country,
                weight_table,
                Some(cache),
            );
            count += 1;
        }
    }
    debug!("Precomputed weights for {count} chapters for {country}");

    count
}

/// Each chapter's share of its section for `country`.
///
/// A chapter's weight is its own entry in the weight table if present, otherwise the sum of its
/// headings' positive weights. If every chapter has zero weight, the section is split equally.
///
/// Returns `None` if the section is not in `hierarchy`.
pub fn section_chapter_shares(
    section: &SectionID,
    hierarchy: &HsHierarchy,
    country: &CountryCode,
    weight_table: &SectionWeightTable,
) -> Option<IndexMap<ChapterID, f64>> {
    let node = hierarchy.get(section)?;
    let weights: IndexMap<ChapterID, f64> = node
        .chapters
        .iter()
        .map(|(chapter_id, chapter)| {
            let weight = get_hs_code_weight(section, chapter_id.as_str(), country, weight_table)
                .unwrap_or_else(|| {
                    chapter
                        .subcategories
                        .keys()
                        .filter_map(|code| {
                            get_hs_code_weight(section, code.as_str(), country, weight_table)
                        })
                        .filter(|weight| *weight > 0.0)
                        .sum()
                });
            (chapter_id.clone(), weight.max(0.0))
        })
        .collect();

    let total: f64 = weights.values().sum();
    if total > 0.0 {
        return Some(
            weights
                .into_iter()
                .map(|(chapter_id, weight)| (chapter_id, weight / total))
                .collect(),
        );
    }

    let share = 1.0 / weights.len() as f64;
    Some(
        weights
            .into_keys()
            .map(|chapter_id| (chapter_id, share))
            .collect(),
    )
}
