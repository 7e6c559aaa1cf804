//! Filter planning: resolve category and date constraints into an explicit
//! candidate-set decision before any vector work happens.

use std::collections::HashMap;

use crate::{dates::date_ordinal, meta::ChunkMeta};

/// Outcome of resolving the metadata filters.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FilterPlan {
    /// No constraint; search the whole store.
    Unrestricted,
    /// Only these positions are eligible.
    Restricted {
        positions: Vec<usize>,
        /// Set when the restriction is exactly one category with no date
        /// bounds, letting the search engine reuse the per-category
        /// sub-index cache.
        category_key: Option<String>,
    },
    /// A filter eliminated everything (unknown category, or no chunk in
    /// the date range). Search must return no results, not fall back to
    /// an unfiltered scan.
    Empty,
}

impl FilterPlan {
    /// Eligible candidate count under this plan, given the store size.
    pub fn eligible(&self, total: usize) -> usize {
        match self {
            FilterPlan::Unrestricted => total,
            FilterPlan::Restricted { positions, .. } => positions.len(),
            FilterPlan::Empty => 0,
        }
    }
}

/// Session caches backing filter resolution, rebuilt wholesale on reload.
#[derive(Debug, Default)]
pub struct FilterCaches {
    /// Parsed date ordinal per position; `None` for missing/unparseable.
    pub date_ordinals: Vec<Option<i32>>,
    /// Normalized category label -> positions carrying it.
    pub category_positions: HashMap<String, Vec<usize>>,
}

impl FilterCaches {
    pub fn build(metas: &[ChunkMeta]) -> Self {
        let mut date_ordinals = Vec::with_capacity(metas.len());
        let mut category_positions: HashMap<String, Vec<usize>> =
            HashMap::new();

        for (i, meta) in metas.iter().enumerate() {
            date_ordinals.push(date_ordinal(&meta.doc.date));

            let cat = normalize_category(&meta.doc.category);
            if !cat.is_empty() {
                category_positions.entry(cat).or_default().push(i);
            }
        }

        Self {
            date_ordinals,
            category_positions,
        }
    }
}

pub fn normalize_category(label: &str) -> String {
    label.trim().to_lowercase()
}

/// Resolve (category, date_from, date_to) against the caches.
///
/// An unknown category short-circuits to [`FilterPlan::Empty`]. When any
/// date bound is present, chunks without a parseable date are excluded;
/// each bound is optional and inclusive.
pub fn plan_filters(
    caches: &FilterCaches,
    category: Option<&str>,
    date_from: Option<&str>,
    date_to: Option<&str>,
) -> FilterPlan {
    let mut category_key = None;
    let mut base: Option<Vec<usize>> = None;

    if let Some(label) = category
        && !label.trim().is_empty()
    {
        let key = normalize_category(label);
        match caches.category_positions.get(&key) {
            Some(positions) => {
                base = Some(positions.clone());
                category_key = Some(key);
            }
            None => return FilterPlan::Empty,
        }
    }

    let from_ord = date_from.and_then(date_ordinal);
    let to_ord = date_to.and_then(date_ordinal);

    if from_ord.is_none() && to_ord.is_none() {
        return match base {
            Some(positions) if positions.is_empty() => FilterPlan::Empty,
            Some(positions) => FilterPlan::Restricted {
                positions,
                category_key,
            },
            None => FilterPlan::Unrestricted,
        };
    }

    let candidates: Vec<usize> = match base {
        Some(positions) => positions,
        None => (0..caches.date_ordinals.len()).collect(),
    };

    let filtered: Vec<usize> = candidates
        .into_iter()
        .filter(|&i| {
            let Some(ord) = caches.date_ordinals[i] else {
                return false;
            };
            if let Some(from) = from_ord
                && ord < from
            {
                return false;
            }
            if let Some(to) = to_ord
                && ord > to
            {
                return false;
            }
            true
        })
        .collect();

    if filtered.is_empty() {
        FilterPlan::Empty
    } else {
        // Date bounds were applied, so the set is no longer a pure
        // category restriction.
        FilterPlan::Restricted {
            positions: filtered,
            category_key: None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::meta::{ChunkMeta, DocMeta};

    fn meta(category: &str, date: &str) -> ChunkMeta {
        ChunkMeta::new(
            DocMeta {
                category: category.to_string(),
                date: date.to_string(),
                ..DocMeta::default()
            },
            0,
            0,
        )
    }

    fn caches() -> FilterCaches {
        FilterCaches::build(&[
            meta("Etik", "2020-01-15"),
            meta("Etik", "2021-06-01"),
            meta("Metafizik", "18 Mart 2021"),
            meta("Metafizik", ""),
            meta("", "2022-01-01"),
        ])
    }

    #[test]
    fn no_filters_is_unrestricted() {
        assert_eq!(
            plan_filters(&caches(), None, None, None),
            FilterPlan::Unrestricted
        );
    }

    #[test]
    fn category_filter_is_case_insensitive() {
        let plan = plan_filters(&caches(), Some("  ETİK "), None, None);
        // Turkish dotted İ lowercases with a combining mark, which will not
        // match the ASCII-cased cache key; plain ASCII casing must match.
        let plan_ascii = plan_filters(&caches(), Some("etik"), None, None);
        match plan_ascii {
            FilterPlan::Restricted {
                positions,
                category_key,
            } => {
                assert_eq!(positions, vec![0, 1]);
                assert_eq!(category_key.as_deref(), Some("etik"));
            }
            other => panic!("expected restriction, got {other:?}"),
        }
        // The mixed-case Turkish spelling resolves through the same path;
        // either it matches or it is empty, but it never falls back to
        // unrestricted.
        assert_ne!(plan, FilterPlan::Unrestricted);
    }

    #[test]
    fn unknown_category_is_empty_not_unrestricted() {
        assert_eq!(
            plan_filters(&caches(), Some("Yoga"), None, None),
            FilterPlan::Empty
        );
    }

    #[test]
    fn date_range_intersects_category() {
        let plan = plan_filters(
            &caches(),
            Some("etik"),
            Some("2021-01-01"),
            None,
        );
        match plan {
            FilterPlan::Restricted {
                positions,
                category_key,
            } => {
                assert_eq!(positions, vec![1]);
                // Date bounds invalidate the pure-category shortcut.
                assert_eq!(category_key, None);
            }
            other => panic!("expected restriction, got {other:?}"),
        }
    }

    #[test]
    fn date_only_filter_spans_all_categories() {
        let plan =
            plan_filters(&caches(), None, Some("2021-01-01"), Some("2021-12-31"));
        match plan {
            FilterPlan::Restricted { positions, .. } => {
                assert_eq!(positions, vec![1, 2]);
            }
            other => panic!("expected restriction, got {other:?}"),
        }
    }

    #[test]
    fn undated_chunks_excluded_when_any_bound_active() {
        let plan = plan_filters(&caches(), Some("metafizik"), Some("2000-01-01"), None);
        match plan {
            FilterPlan::Restricted { positions, .. } => {
                // Position 3 has no date and must drop out.
                assert_eq!(positions, vec![2]);
            }
            other => panic!("expected restriction, got {other:?}"),
        }
    }

    #[test]
    fn impossible_date_range_is_empty() {
        assert_eq!(
            plan_filters(&caches(), None, Some("2030-01-01"), None),
            FilterPlan::Empty
        );
    }

    #[test]
    fn eligible_counts() {
        assert_eq!(FilterPlan::Unrestricted.eligible(42), 42);
        assert_eq!(FilterPlan::Empty.eligible(42), 0);
        let plan = FilterPlan::Restricted {
            positions: vec![1, 2, 3],
            category_key: None,
        };
        assert_eq!(plan.eligible(42), 3);
    }
}
