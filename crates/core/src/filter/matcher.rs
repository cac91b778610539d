use regex_lite::Regex;

use super::types::{Filter, FilterRejection, MatchResult};
use crate::release::Release;

/// Evaluate `release` against `filters` in the order given.
///
/// The first filter whose predicates all pass wins and the rest are not
/// evaluated. Disabled filters are skipped without a rejection entry.
pub fn find_match(release: &Release, filters: &[Filter]) -> MatchResult {
    let mut rejections = Vec::new();

    for filter in filters {
        if !filter.enabled {
            continue;
        }

        match check(filter, release) {
            Ok(()) => return MatchResult::Matched(filter.clone()),
            Err(reason) => rejections.push(FilterRejection {
                filter: filter.name.clone(),
                reason,
            }),
        }
    }

    MatchResult::Rejected(rejections)
}

/// Returns the first failing predicate as the rejection reason.
fn check(filter: &Filter, release: &Release) -> Result<(), String> {
    if !filter.indexers.is_empty()
        && !filter
            .indexers
            .iter()
            .any(|i| i.eq_ignore_ascii_case(&release.indexer))
    {
        return Err(format!("indexer {} not in whitelist", release.indexer));
    }

    if !filter.match_releases.is_empty()
        && !any_regex_match(&filter.match_releases, &release.torrent_name)?
    {
        return Err("no include pattern matched release name".to_string());
    }

    if !filter.except_releases.is_empty()
        && any_regex_match(&filter.except_releases, &release.torrent_name)?
    {
        return Err("release name hit an exclude pattern".to_string());
    }

    if !filter.categories.is_empty() {
        let category = release.category.as_deref().unwrap_or("");
        if !filter
            .categories
            .iter()
            .any(|c| c.eq_ignore_ascii_case(category))
        {
            return Err(format!("category {:?} not accepted", category));
        }
    }

    if !filter.tags.is_empty() {
        let announced: Vec<String> = release
            .tags
            .as_deref()
            .unwrap_or("")
            .split(',')
            .map(|t| t.trim().to_lowercase())
            .filter(|t| !t.is_empty())
            .collect();

        for wanted in &filter.tags {
            if !announced.contains(&wanted.trim().to_lowercase()) {
                return Err(format!("missing tag {:?}", wanted));
            }
        }
    }

    // Size constraints only apply when the announce carries a size.
    if let Some(size) = release.size_bytes {
        if let Some(min) = filter.min_size {
            if size < min {
                return Err(format!("size {} below minimum {}", size, min));
            }
        }
        if let Some(max) = filter.max_size {
            if size > max {
                return Err(format!("size {} above maximum {}", size, max));
            }
        }
    }

    if !filter.resolutions.is_empty() && !name_contains_any(&filter.resolutions, release) {
        return Err("resolution not matched".to_string());
    }

    if !filter.sources.is_empty() && !name_contains_any(&filter.sources, release) {
        return Err("source not matched".to_string());
    }

    if !filter.codecs.is_empty() && !name_contains_any(&filter.codecs, release) {
        return Err("codec not matched".to_string());
    }

    if filter.freeleech && !release.freeleech {
        return Err("not freeleech".to_string());
    }

    Ok(())
}

fn any_regex_match(patterns: &[String], name: &str) -> Result<bool, String> {
    for pattern in patterns {
        let regex = Regex::new(&format!("(?i){}", pattern))
            .map_err(|e| format!("invalid filter pattern {:?}: {}", pattern, e))?;
        if regex.is_match(name) {
            return Ok(true);
        }
    }
    Ok(false)
}

fn name_contains_any(needles: &[String], release: &Release) -> bool {
    let name = release.torrent_name.to_lowercase();
    needles
        .iter()
        .any(|needle| name.contains(&needle.to_lowercase()))
}
