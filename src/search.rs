use std::{cmp::Ordering, collections::BTreeMap};

use serde::Serialize;

use crate::{
    error::Result,
    project,
    store::{CandidateRow, IndexStore},
};

pub const DEFAULT_LIMIT: usize = 5;

/// A ranked search hit. Scores live in [0, 1] and their tier
/// boundaries (0.6 exact title / 0.4 token overlap / 0.2 + 0.1 context
/// / 0.1 keyword) are a fixed contract, not tunable internals.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ScoredResult {
    pub id: String,
    pub title: String,
    pub source: String,
    pub score: f64,
    #[serde(rename = "type")]
    pub kind: &'static str,
    pub path: String,
}

/// Fetch candidates (pre-filtered at the store) and rank them. When a
/// project id is supplied, its declared dependencies restrict the
/// candidate set and feed the context boost.
pub fn execute_search(
    store: &IndexStore,
    query: &str,
    limit: usize,
    project_id: Option<&str>,
) -> Result<Vec<ScoredResult>> {
    let deps = match project_id {
        Some(id) => project::dependency_map(store, id)?,
        None => None,
    };
    let packages: Option<Vec<String>> =
        deps.as_ref().map(|d| d.keys().cloned().collect());

    let candidates = store.search_candidates(query, packages.as_deref())?;
    Ok(rank(query, &candidates, limit, deps.as_ref()))
}

/// Score and order candidates. Deterministic: identical inputs always
/// produce the identical ordered list.
pub fn rank(
    query: &str,
    candidates: &[CandidateRow],
    limit: usize,
    project_deps: Option<&BTreeMap<String, String>>,
) -> Vec<ScoredResult> {
    let query_lower = query.to_lowercase();
    let query_tokens = tokenize(&query_lower);

    let mut results: Vec<ScoredResult> = candidates
        .iter()
        .filter(|c| !c.title.is_empty())
        .map(|c| {
            let score = score_candidate(c, &query_lower, &query_tokens, project_deps);
            ScoredResult {
                id: c.id.clone(),
                title: c.title.clone(),
                source: c.package_name.clone(),
                score,
                kind: "Entry",
                path: c.slug.clone(),
            }
        })
        .collect();

    // Sort by score alone (a total order), then re-order each run of
    // near-equal scores by title. Folding the 0.001 tolerance into a
    // single comparator would make it non-transitive.
    results.sort_by(|a, b| b.score.total_cmp(&a.score));
    let mut i = 0;
    while i < results.len() {
        let mut j = i + 1;
        while j < results.len() && results[i].score - results[j].score <= 0.001 {
            j += 1;
        }
        results[i..j].sort_by(|a, b| natural_cmp(&a.title, &b.title));
        i = j;
    }
    results.truncate(limit);
    results
}

fn score_candidate(
    candidate: &CandidateRow,
    query_lower: &str,
    query_tokens: &[String],
    project_deps: Option<&BTreeMap<String, String>>,
) -> f64 {
    let title = candidate.title.to_lowercase();
    let mut score = 0.0;

    // Base term, max 0.6: an exact title match scores the full 0.6;
    // otherwise 0.4 weighted by the fraction of query tokens that
    // overlap a title token (substring in either direction).
    if title == query_lower {
        score = 0.6;
    } else if !query_tokens.is_empty() {
        let title_tokens = tokenize(&title);
        let matched = query_tokens
            .iter()
            .filter(|q| {
                title_tokens
                    .iter()
                    .any(|t| t.contains(q.as_str()) || q.contains(t.as_str()))
            })
            .count();
        score = 0.4 * (matched as f64 / query_tokens.len().max(1) as f64);
    }

    // Context boost, max 0.3: the candidate's package is a declared
    // dependency (+0.2), and its storage path carries the declared
    // version string (+0.1 on top).
    if let Some(deps) = project_deps
        && let Some(version) = deps.get(&candidate.package_name)
    {
        score += 0.2;
        if candidate.source_path.contains(version.as_str()) {
            score += 0.1;
        }
    }

    // Keyword bonus: any query token exactly equal to a keyword token.
    let keyword_hit = candidate
        .keywords
        .split_whitespace()
        .any(|k| query_tokens.iter().any(|q| q == &k.to_lowercase()));
    if keyword_hit {
        score += 0.1;
    }

    score.clamp(0.0, 1.0)
}

/// Split on any run of non-alphanumeric characters, dropping empties.
fn tokenize(text: &str) -> Vec<String> {
    text.split(|c: char| !c.is_alphanumeric())
        .filter(|t| !t.is_empty())
        .map(str::to_string)
        .collect()
}

/// Case-insensitive, numeric-aware ordering: digit runs compare as
/// numbers, so "item2" sorts before "item10".
fn natural_cmp(a: &str, b: &str) -> Ordering {
    let xs: Vec<char> = a.to_lowercase().chars().collect();
    let ys: Vec<char> = b.to_lowercase().chars().collect();
    let (mut i, mut j) = (0, 0);

    while i < xs.len() && j < ys.len() {
        if xs[i].is_ascii_digit() && ys[j].is_ascii_digit() {
            let si = i;
            while i < xs.len() && xs[i].is_ascii_digit() {
                i += 1;
            }
            let sj = j;
            while j < ys.len() && ys[j].is_ascii_digit() {
                j += 1;
            }
            let dx: String =
                xs[si..i].iter().skip_while(|c| **c == '0').collect();
            let dy: String =
                ys[sj..j].iter().skip_while(|c| **c == '0').collect();
            let ord = dx.len().cmp(&dy.len()).then_with(|| dx.cmp(&dy));
            if ord != Ordering::Equal {
                return ord;
            }
        } else {
            let ord = xs[i].cmp(&ys[j]);
            if ord != Ordering::Equal {
                return ord;
            }
            i += 1;
            j += 1;
        }
    }
    (xs.len() - i).cmp(&(ys.len() - j))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn candidate(id: &str, title: &str, package: &str) -> CandidateRow {
        CandidateRow {
            id: id.to_string(),
            title: title.to_string(),
            keywords: String::new(),
            slug: id.rsplit(':').next().unwrap_or(id).to_string(),
            package_name: package.to_string(),
            source_path: format!("/data/docs/{package}"),
        }
    }

    #[test]
    fn exact_title_scores_point_six() {
        let candidates = vec![
            candidate("react@18:usecontext", "useContext", "react"),
            candidate("react@18:usecallback", "useCallback", "react"),
        ];

        let results = rank("useContext", &candidates, DEFAULT_LIMIT, None);
        assert_eq!(results[0].title, "useContext");
        assert_eq!(results[0].score, 0.6);
        assert_eq!(results[0].kind, "Entry");
    }

    #[test]
    fn exact_title_match_is_case_insensitive() {
        let candidates = vec![candidate("dom@latest:css/margin", "Margin", "dom")];
        let results = rank("margin", &candidates, DEFAULT_LIMIT, None);
        assert_eq!(results[0].score, 0.6);
    }

    #[test]
    fn token_overlap_is_weighted_by_ratio() {
        let candidates =
            vec![candidate("node@20:fs/readfilesync", "fs.readFileSync", "node")];

        // One of two query tokens overlaps a title token.
        let results = rank("readFileSync zlib", &candidates, DEFAULT_LIMIT, None);
        assert!((results[0].score - 0.2).abs() < 1e-9);
    }

    #[test]
    fn no_cross_package_filtering_without_project_context() {
        let candidates = vec![
            candidate("tailwindcss@3:margin", "margin", "tailwindcss"),
            candidate("dom@latest:css/margin", "margin (CSS)", "dom"),
        ];

        let results = rank("margin", &candidates, DEFAULT_LIMIT, None);
        assert_eq!(results.len(), 2);
    }

    #[test]
    fn context_boost_raises_dependency_entries() {
        let mut fs = candidate("node@20:fs", "fs", "node");
        fs.source_path = "/data/docs/node~20".to_string();
        let candidates = vec![fs];

        let unscoped = rank("fs", &candidates, DEFAULT_LIMIT, None);

        let mut deps = BTreeMap::new();
        deps.insert("node".to_string(), "20".to_string());
        let scoped = rank("fs", &candidates, DEFAULT_LIMIT, Some(&deps));

        assert!(scoped[0].score > unscoped[0].score);
        // 0.6 base + 0.2 package + 0.1 version-in-path.
        assert!((scoped[0].score - 0.9).abs() < 1e-9);
    }

    #[test]
    fn version_fragment_must_appear_in_path_for_extra_boost() {
        let mut fs = candidate("node@20:fs", "fs", "node");
        fs.source_path = "/data/docs/node".to_string();
        let candidates = vec![fs];

        let mut deps = BTreeMap::new();
        deps.insert("node".to_string(), "20".to_string());
        let results = rank("fs", &candidates, DEFAULT_LIMIT, Some(&deps));
        assert!((results[0].score - 0.8).abs() < 1e-9);
    }

    #[test]
    fn keyword_bonus_requires_exact_token() {
        let mut hooks = candidate("react@18:hooks-intro", "Introducing Hooks", "react");
        hooks.keywords = "usestate useeffect hooks".to_string();
        let candidates = vec![hooks];

        let with_hit = rank("hooks", &candidates, DEFAULT_LIMIT, None);
        // 0.4 * 1/1 token overlap + 0.1 keyword bonus.
        assert!((with_hit[0].score - 0.5).abs() < 1e-9);

        let without = rank("hook", &candidates, DEFAULT_LIMIT, None);
        // "hook" still overlaps the title token, but is not an exact
        // keyword token.
        assert!((without[0].score - 0.4).abs() < 1e-9);
    }

    #[test]
    fn scores_stay_within_unit_interval() {
        let mut loaded = candidate("node@20:fs", "fs", "node");
        loaded.source_path = "/data/docs/node~20".to_string();
        loaded.keywords = "fs".to_string();
        let candidates = vec![loaded];

        let mut deps = BTreeMap::new();
        deps.insert("node".to_string(), "20".to_string());
        let results = rank("fs", &candidates, DEFAULT_LIMIT, Some(&deps));

        // 0.6 + 0.2 + 0.1 + 0.1 lands exactly on the clamp boundary.
        assert_eq!(results[0].score, 1.0);
        for r in &results {
            assert!((0.0..=1.0).contains(&r.score));
        }
    }

    #[test]
    fn ties_break_by_numeric_aware_title_order() {
        let candidates = vec![
            candidate("pkg@1:item10", "item10", "pkg"),
            candidate("pkg@1:item2", "item2", "pkg"),
        ];

        let results = rank("item", &candidates, DEFAULT_LIMIT, None);
        assert_eq!(results[0].title, "item2");
        assert_eq!(results[1].title, "item10");
    }

    #[test]
    fn rank_is_idempotent() {
        let candidates = vec![
            candidate("react@18:usecontext", "useContext", "react"),
            candidate("react@18:usecallback", "useCallback", "react"),
            candidate("dom@latest:css/margin", "margin", "dom"),
        ];

        let first = rank("use", &candidates, DEFAULT_LIMIT, None);
        let second = rank("use", &candidates, DEFAULT_LIMIT, None);
        assert_eq!(first, second);
    }

    #[test]
    fn untitled_candidates_are_discarded() {
        let candidates = vec![
            candidate("pkg@1:blank", "", "pkg"),
            candidate("pkg@1:real", "real", "pkg"),
        ];

        let results = rank("real", &candidates, DEFAULT_LIMIT, None);
        assert_eq!(results.len(), 1);
        assert_eq!(results[0].title, "real");
    }

    #[test]
    fn query_without_alphanumerics_scores_zero_base() {
        let candidates = vec![candidate("pkg@1:page", "page", "pkg")];
        let results = rank("!!!", &candidates, DEFAULT_LIMIT, None);
        assert_eq!(results[0].score, 0.0);
    }

    #[test]
    fn truncates_to_limit_after_sorting() {
        let candidates: Vec<CandidateRow> = (0..10)
            .map(|i| candidate(&format!("pkg@1:page{i}"), &format!("page{i}"), "pkg"))
            .collect();

        let results = rank("page", &candidates, 3, None);
        assert_eq!(results.len(), 3);
        assert_eq!(results[0].title, "page0");
    }

    #[test]
    fn ordering_holds_when_score_gaps_straddle_the_tolerance() {
        // Three candidates 0.0008 apart: each adjacent pair is within
        // the 0.001 tie tolerance but the outer pair is not. The sort
        // must still terminate and keep higher scores first.
        let query: String = (0..500)
            .map(|i| format!("w{i:03}"))
            .collect::<Vec<_>>()
            .join(" ");
        let candidates = vec![
            candidate("pkg@1:one", "w000", "pkg"),
            candidate("pkg@1:two", "w000 w001", "pkg"),
            candidate("pkg@1:three", "w000 w001 w002", "pkg"),
        ];

        let results = rank(&query, &candidates, DEFAULT_LIMIT, None);
        let titles: Vec<&str> =
            results.iter().map(|r| r.title.as_str()).collect();
        // The top two scores tie within tolerance and sort by title;
        // the lowest score stays last.
        assert_eq!(titles, ["w000 w001", "w000 w001 w002", "w000"]);
        assert!(results[0].score >= results[2].score);
    }

    #[test]
    fn natural_cmp_orders_digit_runs_numerically() {
        assert_eq!(natural_cmp("item2", "item10"), Ordering::Less);
        assert_eq!(natural_cmp("item10", "item2"), Ordering::Greater);
        assert_eq!(natural_cmp("Item2", "item2"), Ordering::Equal);
        assert_eq!(natural_cmp("a2b", "a2c"), Ordering::Less);
        assert_eq!(natural_cmp("a02", "a2"), Ordering::Equal);
        assert_eq!(natural_cmp("a", "ab"), Ordering::Less);
    }
}
