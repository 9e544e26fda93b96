//! In-process entry store.
//!
//! Partitions entries by job id and executes search plans with a filter
//! scan over the requested partition. Good for single-node deployments and
//! tests; a remote engine slots in behind the same [`EntryStore`] trait.

use std::cmp::Ordering;
use std::collections::{BTreeMap, HashMap, HashSet};

use async_trait::async_trait;
use chrono::{Datelike, NaiveDateTime};
use tokio::sync::RwLock;

use crate::entry::LogEntry;
use crate::error::{StoreError, StoreResult};
use crate::plan::{
    AggregationRequest, Filter, FullTextQuery, HighlightSpec, HistogramInterval, SearchPlan,
};
use crate::store::{
    AggregationResults, EntryStore, FieldCount, HistogramBucket, SearchOutcome,
};

/// Gap-filled timelines are capped; past this many buckets only non-empty
/// buckets are emitted.
const MAX_FILLED_BUCKETS: usize = 10_000;

/// In-memory [`EntryStore`] keyed by job partition.
///
/// All methods take `&self`; interior mutability is a single `RwLock` so
/// readers (queries, status aggregation) see consistent snapshots while the
/// owning ingestion worker appends.
#[derive(Default)]
pub struct MemoryStore {
    partitions: RwLock<HashMap<String, Vec<LogEntry>>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of entries currently held for a job.
    pub async fn partition_len(&self, job_id: &str) -> usize {
        self.partitions
            .read()
            .await
            .get(job_id)
            .map(Vec::len)
            .unwrap_or(0)
    }
}

#[async_trait]
impl EntryStore for MemoryStore {
    async fn bulk_index(&self, entries: Vec<LogEntry>) -> StoreResult<u64> {
        let count = entries.len() as u64;
        let mut partitions = self.partitions.write().await;
        for entry in entries {
            partitions
                .entry(entry.job_id.clone())
                .or_default()
                .push(entry);
        }
        Ok(count)
    }

    async fn index(&self, entry: LogEntry) -> StoreResult<()> {
        let mut partitions = self.partitions.write().await;
        partitions
            .entry(entry.job_id.clone())
            .or_default()
            .push(entry);
        Ok(())
    }

    async fn search(&self, plan: &SearchPlan) -> StoreResult<SearchOutcome> {
        if plan.job_id.is_empty() {
            return Err(StoreError::InvalidPlan("plan has no job id".into()));
        }

        let partitions = self.partitions.read().await;
        let partition: &[LogEntry] = partitions
            .get(&plan.job_id)
            .map(Vec::as_slice)
            .unwrap_or(&[]);

        let mut matched: Vec<&LogEntry> = partition
            .iter()
            .filter(|entry| matches_filters(entry, &plan.filters))
            .filter(|entry| {
                plan.full_text
                    .as_ref()
                    .map(|ft| full_text_matches(entry, ft))
                    .unwrap_or(true)
            })
            .collect();

        let aggregations = if plan.aggregations.is_empty() {
            None
        } else {
            Some(compute_aggregations(&matched, &plan.aggregations))
        };

        sort_matches(&mut matched, &plan.sort.field, plan.sort.descending);

        let total = matched.len() as u64;
        let offset = plan.page.offset() as usize;
        let hits: Vec<LogEntry> = matched
            .iter()
            .skip(offset)
            .take(plan.page.size as usize)
            .map(|entry| (*entry).clone())
            .collect();

        let highlights = match (&plan.highlight, &plan.full_text) {
            (Some(spec), Some(ft)) => build_highlights(&hits, spec, ft),
            _ => HashMap::new(),
        };

        Ok(SearchOutcome {
            hits,
            total,
            aggregations,
            highlights,
        })
    }

    async fn delete_job(&self, job_id: &str) -> StoreResult<u64> {
        let mut partitions = self.partitions.write().await;
        Ok(partitions
            .remove(job_id)
            .map(|entries| entries.len() as u64)
            .unwrap_or(0))
    }
}

// ========== Filters ==========

fn matches_filters(entry: &LogEntry, filters: &[Filter]) -> bool {
    filters.iter().all(|filter| matches_filter(entry, filter))
}

fn matches_filter(entry: &LogEntry, filter: &Filter) -> bool {
    match filter {
        Filter::Term { field, value } => entry.keyword_value(field) == Some(value.as_str()),
        Filter::Terms { field, values } => entry
            .keyword_value(field)
            .map(|actual| values.iter().any(|v| v == actual))
            .unwrap_or(false),
        Filter::Wildcard { field, pattern } => entry
            .keyword_value(field)
            .map(|actual| wildcard_match(pattern, actual))
            .unwrap_or(false),
        Filter::HasError(expected) => entry.has_error == *expected,
        Filter::HasStackTrace(expected) => entry.has_stack_trace == *expected,
        Filter::Tags(values) => values.iter().any(|tag| entry.tags.iter().any(|t| t == tag)),
        Filter::TimeRange { start, end } => {
            start.map(|s| entry.timestamp >= s).unwrap_or(true)
                && end.map(|e| entry.timestamp <= e).unwrap_or(true)
        }
        Filter::LineRange { min, max } => {
            min.map(|m| entry.line_number >= m).unwrap_or(true)
                && max.map(|m| entry.line_number <= m).unwrap_or(true)
        }
    }
}

/// Glob match: `*` matches any run of characters, `?` exactly one.
fn wildcard_match(pattern: &str, value: &str) -> bool {
    let pat: Vec<char> = pattern.chars().collect();
    let val: Vec<char> = value.chars().collect();

    // Iterative backtracking over the single outstanding `*`.
    let (mut p, mut v) = (0usize, 0usize);
    let mut star: Option<(usize, usize)> = None;
    while v < val.len() {
        if p < pat.len() && (pat[p] == '?' || pat[p] == val[v]) {
            p += 1;
            v += 1;
        } else if p < pat.len() && pat[p] == '*' {
            star = Some((p, v));
            p += 1;
        } else if let Some((sp, sv)) = star {
            p = sp + 1;
            v = sv + 1;
            star = Some((sp, sv + 1));
        } else {
            return false;
        }
    }
    while p < pat.len() && pat[p] == '*' {
        p += 1;
    }
    p == pat.len()
}

// ========== Full text ==========

/// Lowercased alphanumeric tokens with their byte spans in the source.
fn tokenize_spans(text: &str) -> Vec<(usize, usize, String)> {
    let mut tokens = Vec::new();
    let mut start: Option<usize> = None;
    for (idx, ch) in text.char_indices() {
        if ch.is_alphanumeric() {
            if start.is_none() {
                start = Some(idx);
            }
        } else if let Some(s) = start.take() {
            tokens.push((s, idx, text[s..idx].to_lowercase()));
        }
    }
    if let Some(s) = start {
        tokens.push((s, text.len(), text[s..].to_lowercase()));
    }
    tokens
}

fn tokenize(text: &str) -> Vec<String> {
    tokenize_spans(text).into_iter().map(|(_, _, t)| t).collect()
}

/// Bounded Levenshtein distance check.
fn within_edit_distance(a: &str, b: &str, max: u32) -> bool {
    if max == 0 {
        return a == b;
    }
    let a: Vec<char> = a.chars().collect();
    let b: Vec<char> = b.chars().collect();
    if a.len().abs_diff(b.len()) > max as usize {
        return false;
    }

    let mut prev: Vec<usize> = (0..=b.len()).collect();
    let mut current = vec![0usize; b.len() + 1];
    for (i, ca) in a.iter().enumerate() {
        current[0] = i + 1;
        let mut row_min = current[0];
        for (j, cb) in b.iter().enumerate() {
            let cost = usize::from(ca != cb);
            current[j + 1] = (prev[j] + cost).min(prev[j + 1] + 1).min(current[j] + 1);
            row_min = row_min.min(current[j + 1]);
        }
        if row_min > max as usize {
            return false;
        }
        std::mem::swap(&mut prev, &mut current);
    }
    prev[b.len()] <= max as usize
}

fn token_matches(query_token: &str, doc_token: &str) -> bool {
    query_token == doc_token
        || within_edit_distance(query_token, doc_token, FullTextQuery::auto_fuzziness(query_token))
}

/// Operator AND with AUTO fuzziness: every query token must match some
/// token in at least one searched field.
fn full_text_matches(entry: &LogEntry, ft: &FullTextQuery) -> bool {
    let query_tokens = tokenize(&ft.query);
    if query_tokens.is_empty() {
        return true;
    }

    let mut doc_tokens: Vec<String> = Vec::new();
    for field in &ft.fields {
        if let Some(text) = entry.searchable_value(field) {
            doc_tokens.extend(tokenize(text));
        }
    }

    query_tokens
        .iter()
        .all(|qt| doc_tokens.iter().any(|dt| token_matches(qt, dt)))
}

// ========== Sorting ==========

fn sort_matches(matched: &mut [&LogEntry], field: &str, descending: bool) {
    matched.sort_by(|a, b| {
        let primary = compare_field(a, b, field);
        let primary = if descending { primary.reverse() } else { primary };
        primary.then_with(|| a.line_number.cmp(&b.line_number))
    });
}

fn compare_field(a: &LogEntry, b: &LogEntry, field: &str) -> Ordering {
    match field {
        "timestamp" => a.timestamp.cmp(&b.timestamp),
        "indexedAt" => a.indexed_at.cmp(&b.indexed_at),
        "lineNumber" => a.line_number.cmp(&b.line_number),
        _ => a.keyword_value(field).cmp(&b.keyword_value(field)),
    }
}

// ========== Aggregations ==========

fn compute_aggregations(matched: &[&LogEntry], request: &AggregationRequest) -> AggregationResults {
    let mut results = AggregationResults::default();

    if request.summary {
        let mut levels: BTreeMap<String, u64> = BTreeMap::new();
        for entry in matched {
            *levels.entry(entry.level.clone()).or_default() += 1;
            if entry.has_error {
                results.error_count += 1;
            }
            if entry.has_stack_trace {
                results.stacktrace_count += 1;
            }
            results.min_timestamp = Some(match results.min_timestamp {
                Some(min) => min.min(entry.timestamp),
                None => entry.timestamp,
            });
            results.max_timestamp = Some(match results.max_timestamp {
                Some(max) => max.max(entry.timestamp),
                None => entry.timestamp,
            });
        }
        results.level_counts = levels;
    }

    if request.extended {
        results.top_loggers = terms_aggregation(matched, "logger", 10);
        results.top_threads = terms_aggregation(matched, "thread", 10);
        results.top_sources = terms_aggregation(matched, "source", 10);
        results.top_hostnames = terms_aggregation(matched, "hostname", 10);
        results.unique_loggers = Some(cardinality(matched, "logger"));
        results.unique_threads = Some(cardinality(matched, "thread"));
    }

    if let Some(interval) = request.timeline {
        results.timeline = timeline_histogram(matched, interval);
    }

    if let Some(spec) = &request.unique_values {
        results.unique_values = terms_aggregation(matched, &spec.field, spec.limit);
    }

    results
}

/// Top-N values by document count, ties broken lexicographically.
fn terms_aggregation(matched: &[&LogEntry], field: &str, limit: usize) -> Vec<FieldCount> {
    let mut counts: HashMap<&str, u64> = HashMap::new();
    for entry in matched {
        if let Some(value) = entry.keyword_value(field) {
            *counts.entry(value).or_default() += 1;
        }
    }

    let mut buckets: Vec<FieldCount> = counts
        .into_iter()
        .map(|(value, count)| FieldCount {
            value: value.to_string(),
            count,
        })
        .collect();
    buckets.sort_by(|a, b| b.count.cmp(&a.count).then_with(|| a.value.cmp(&b.value)));
    buckets.truncate(limit);
    buckets
}

fn cardinality(matched: &[&LogEntry], field: &str) -> u64 {
    let distinct: HashSet<&str> = matched
        .iter()
        .filter_map(|entry| entry.keyword_value(field))
        .collect();
    distinct.len() as u64
}

fn floor_to_interval(ts: NaiveDateTime, interval: HistogramInterval) -> NaiveDateTime {
    match interval.fixed_seconds() {
        Some(span) => {
            let epoch = ts.and_utc().timestamp();
            let floored = epoch - epoch.rem_euclid(span);
            chrono::DateTime::from_timestamp(floored, 0)
                .map(|dt| dt.naive_utc())
                .unwrap_or(ts)
        }
        None => match interval {
            HistogramInterval::Week => {
                let days_from_monday = ts.date().weekday().num_days_from_monday() as i64;
                (ts.date() - chrono::Duration::days(days_from_monday))
                    .and_hms_opt(0, 0, 0)
                    .unwrap_or(ts)
            }
            _ => ts
                .date()
                .with_day(1)
                .and_then(|d| d.and_hms_opt(0, 0, 0))
                .unwrap_or(ts),
        },
    }
}

fn next_bucket(ts: NaiveDateTime, interval: HistogramInterval) -> NaiveDateTime {
    match interval.fixed_seconds() {
        Some(span) => ts + chrono::Duration::seconds(span),
        None => match interval {
            HistogramInterval::Week => ts + chrono::Duration::days(7),
            _ => {
                let (year, month) = if ts.month() == 12 {
                    (ts.year() + 1, 1)
                } else {
                    (ts.year(), ts.month() + 1)
                };
                ts.date()
                    .with_year(year)
                    .and_then(|d| d.with_month(month))
                    .map(|d| {
                        d.and_hms_opt(0, 0, 0)
                            .unwrap_or(ts)
                    })
                    .unwrap_or(ts)
            }
        },
    }
}

/// Date histogram with error/warn sub-counts. Buckets between the first and
/// last occupied bucket are zero-filled, up to a cap.
fn timeline_histogram(matched: &[&LogEntry], interval: HistogramInterval) -> Vec<HistogramBucket> {
    let mut counts: BTreeMap<NaiveDateTime, (u64, u64, u64)> = BTreeMap::new();
    for entry in matched {
        let bucket = floor_to_interval(entry.timestamp, interval);
        let slot = counts.entry(bucket).or_default();
        slot.0 += 1;
        if entry.level == "ERROR" {
            slot.1 += 1;
        }
        if entry.level == "WARN" {
            slot.2 += 1;
        }
    }

    let (Some(first), Some(last)) = (
        counts.keys().next().copied(),
        counts.keys().next_back().copied(),
    ) else {
        return Vec::new();
    };

    let mut buckets = Vec::new();
    let mut cursor = first;
    while cursor <= last && buckets.len() < MAX_FILLED_BUCKETS {
        let (count, error_count, warning_count) = counts.get(&cursor).copied().unwrap_or_default();
        buckets.push(HistogramBucket {
            timestamp: cursor,
            count,
            error_count,
            warning_count,
        });
        let advanced = next_bucket(cursor, interval);
        if advanced <= cursor {
            break;
        }
        cursor = advanced;
    }

    if buckets.len() >= MAX_FILLED_BUCKETS {
        // Too sparse to gap-fill; fall back to occupied buckets only.
        return counts
            .into_iter()
            .map(|(timestamp, (count, error_count, warning_count))| HistogramBucket {
                timestamp,
                count,
                error_count,
                warning_count,
            })
            .collect();
    }

    buckets
}

// ========== Highlights ==========

fn build_highlights(
    hits: &[LogEntry],
    spec: &HighlightSpec,
    ft: &FullTextQuery,
) -> HashMap<String, HashMap<String, Vec<String>>> {
    let query_tokens = tokenize(&ft.query);
    let mut highlights = HashMap::new();
    if query_tokens.is_empty() {
        return highlights;
    }

    for hit in hits {
        let mut per_field: HashMap<String, Vec<String>> = HashMap::new();
        for field in &spec.fields {
            let Some(text) = hit.searchable_value(field) else {
                continue;
            };
            let fragments = highlight_field(text, &query_tokens, spec);
            if !fragments.is_empty() {
                per_field.insert(field.clone(), fragments);
            }
        }
        if !per_field.is_empty() {
            highlights.insert(hit.id.clone(), per_field);
        }
    }

    highlights
}

/// Cuts up to `max_fragments` windows of `fragment_size` characters around
/// matching tokens and wraps each matched token in the configured tags.
fn highlight_field(text: &str, query_tokens: &[String], spec: &HighlightSpec) -> Vec<String> {
    let spans = tokenize_spans(text);
    let matches: Vec<(usize, usize)> = spans
        .iter()
        .filter(|(_, _, token)| query_tokens.iter().any(|qt| token_matches(qt, token)))
        .map(|(start, end, _)| (*start, *end))
        .collect();
    if matches.is_empty() {
        return Vec::new();
    }

    let mut fragments = Vec::new();
    let mut consumed = 0usize;
    while fragments.len() < spec.max_fragments && consumed < matches.len() {
        let (anchor_start, _) = matches[consumed];
        let frag_start = floor_char_boundary(text, anchor_start.saturating_sub(30));
        let frag_end = ceil_char_boundary(
            text,
            (frag_start + spec.fragment_size).min(text.len()),
        );

        let in_fragment: Vec<(usize, usize)> = matches[consumed..]
            .iter()
            .take_while(|(start, end)| *start >= frag_start && *end <= frag_end)
            .copied()
            .collect();
        consumed += in_fragment.len().max(1);

        let mut fragment = String::new();
        let mut cursor = frag_start;
        for (start, end) in &in_fragment {
            fragment.push_str(&text[cursor..*start]);
            fragment.push_str(&spec.pre_tag);
            fragment.push_str(&text[*start..*end]);
            fragment.push_str(&spec.post_tag);
            cursor = *end;
        }
        fragment.push_str(&text[cursor..frag_end]);
        fragments.push(fragment);
    }

    fragments
}

fn floor_char_boundary(text: &str, mut idx: usize) -> usize {
    idx = idx.min(text.len());
    while idx > 0 && !text.is_char_boundary(idx) {
        idx -= 1;
    }
    idx
}

fn ceil_char_boundary(text: &str, mut idx: usize) -> usize {
    idx = idx.min(text.len());
    while idx < text.len() && !text.is_char_boundary(idx) {
        idx += 1;
    }
    idx
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::plan::{Page, Sort, UniqueValuesSpec};
    use chrono::NaiveDate;

    fn ts(h: u32, m: u32, s: u32) -> NaiveDateTime {
        NaiveDate::from_ymd_opt(2024, 1, 15)
            .unwrap()
            .and_hms_opt(h, m, s)
            .unwrap()
    }

    fn entry(job: &str, line: u64, level: &str, message: &str) -> LogEntry {
        LogEntry {
            id: format!("{job}-{line}"),
            job_id: job.to_string(),
            line_number: line,
            timestamp: ts(10, 30, line as u32 % 60),
            indexed_at: ts(11, 0, 0),
            level: level.to_string(),
            has_error: level == "ERROR",
            has_stack_trace: false,
            message: message.to_string(),
            raw_line: message.to_string(),
            stack_trace: None,
            logger: Some("com.example.Svc".to_string()),
            thread: Some("main".to_string()),
            source: Some("Svc".to_string()),
            hostname: None,
            application: None,
            environment: None,
            file_name: Some("app.log".to_string()),
            metadata: Default::default(),
            tags: Vec::new(),
        }
    }

    async fn seeded_store() -> MemoryStore {
        let store = MemoryStore::new();
        store
            .bulk_index(vec![
                entry("job-1", 1, "ERROR", "connection refused to db"),
                entry("job-1", 2, "INFO", "request handled"),
                entry("job-1", 3, "ERROR", "connection reset by peer"),
                entry("job-2", 1, "WARN", "other job entry"),
            ])
            .await
            .unwrap();
        store
    }

    #[tokio::test]
    async fn should_scope_search_to_job_partition() {
        // given
        let store = seeded_store().await;

        // when
        let outcome = store.search(&SearchPlan::for_job("job-1")).await.unwrap();

        // then
        assert_eq!(outcome.total, 3);
        assert!(outcome.hits.iter().all(|e| e.job_id == "job-1"));
    }

    #[tokio::test]
    async fn should_filter_by_level_terms_and_sort_ascending() {
        // given
        let store = seeded_store().await;
        let mut plan = SearchPlan::for_job("job-1");
        plan.filters.push(Filter::Terms {
            field: "level".into(),
            values: vec!["ERROR".into()],
        });
        plan.sort = Sort {
            field: "lineNumber".into(),
            descending: false,
        };

        // when
        let outcome = store.search(&plan).await.unwrap();

        // then
        assert_eq!(outcome.total, 2);
        let lines: Vec<u64> = outcome.hits.iter().map(|e| e.line_number).collect();
        assert_eq!(lines, vec![1, 3]);
    }

    #[tokio::test]
    async fn should_match_full_text_with_and_semantics() {
        // given
        let store = seeded_store().await;
        let mut plan = SearchPlan::for_job("job-1");
        plan.full_text = Some(FullTextQuery {
            query: "connection refused".into(),
            fields: vec!["message".into(), "rawLine".into(), "stackTrace".into()],
        });

        // when
        let outcome = store.search(&plan).await.unwrap();

        // then: only line 1 has both tokens
        assert_eq!(outcome.total, 1);
        assert_eq!(outcome.hits[0].line_number, 1);
    }

    #[tokio::test]
    async fn should_match_full_text_with_auto_fuzziness() {
        // given: one edit away ("conection" -> "connection")
        let store = seeded_store().await;
        let mut plan = SearchPlan::for_job("job-1");
        plan.full_text = Some(FullTextQuery {
            query: "conection".into(),
            fields: vec!["message".into()],
        });

        // when
        let outcome = store.search(&plan).await.unwrap();

        // then
        assert_eq!(outcome.total, 2);
    }

    #[tokio::test]
    async fn should_apply_wildcard_filters() {
        // given
        let store = seeded_store().await;
        let mut plan = SearchPlan::for_job("job-1");
        plan.filters.push(Filter::Wildcard {
            field: "logger".into(),
            pattern: "com.example.*".into(),
        });

        // when
        let outcome = store.search(&plan).await.unwrap();

        // then
        assert_eq!(outcome.total, 3);
    }

    #[tokio::test]
    async fn should_paginate_with_stable_ordering() {
        // given
        let store = seeded_store().await;
        let mut plan = SearchPlan::for_job("job-1");
        plan.sort = Sort {
            field: "lineNumber".into(),
            descending: false,
        };
        plan.page = Page { number: 1, size: 2 };

        // when
        let outcome = store.search(&plan).await.unwrap();

        // then
        assert_eq!(outcome.total, 3);
        assert_eq!(outcome.hits.len(), 1);
        assert_eq!(outcome.hits[0].line_number, 3);
    }

    #[tokio::test]
    async fn should_compute_summary_aggregations_over_matched_set() {
        // given
        let store = seeded_store().await;
        let mut plan = SearchPlan::for_job("job-1");
        plan.aggregations.summary = true;
        plan.page = Page { number: 0, size: 1 };

        // when
        let outcome = store.search(&plan).await.unwrap();

        // then: aggregations cover all matches, not just the page
        let aggs = outcome.aggregations.unwrap();
        assert_eq!(aggs.level_counts.get("ERROR"), Some(&2));
        assert_eq!(aggs.level_counts.get("INFO"), Some(&1));
        assert_eq!(aggs.error_count, 2);
        assert!(aggs.min_timestamp.is_some());
    }

    #[tokio::test]
    async fn should_bucket_timeline_by_hour() {
        // given: entries at 10:30:xx all fall into the 10:00 bucket
        let store = seeded_store().await;
        let mut plan = SearchPlan::for_job("job-1");
        plan.aggregations.timeline = Some(HistogramInterval::Hour);

        // when
        let outcome = store.search(&plan).await.unwrap();

        // then
        let timeline = outcome.aggregations.unwrap().timeline;
        assert_eq!(timeline.len(), 1);
        assert_eq!(timeline[0].timestamp, ts(10, 0, 0));
        assert_eq!(timeline[0].count, 3);
        assert_eq!(timeline[0].error_count, 2);
    }

    #[tokio::test]
    async fn should_fill_timeline_gaps_with_empty_buckets() {
        // given: entries two hours apart
        let store = MemoryStore::new();
        let mut early = entry("job-3", 1, "INFO", "a");
        early.timestamp = ts(8, 15, 0);
        let mut late = entry("job-3", 2, "ERROR", "b");
        late.timestamp = ts(10, 45, 0);
        store.bulk_index(vec![early, late]).await.unwrap();

        let mut plan = SearchPlan::for_job("job-3");
        plan.aggregations.timeline = Some(HistogramInterval::Hour);

        // when
        let timeline = store
            .search(&plan)
            .await
            .unwrap()
            .aggregations
            .unwrap()
            .timeline;

        // then: 08:00, 09:00 (empty), 10:00
        assert_eq!(timeline.len(), 3);
        assert_eq!(timeline[1].timestamp, ts(9, 0, 0));
        assert_eq!(timeline[1].count, 0);
        assert_eq!(timeline[2].error_count, 1);
    }

    #[tokio::test]
    async fn should_order_unique_values_by_count_descending() {
        // given
        let store = MemoryStore::new();
        let mut a = entry("job-4", 1, "INFO", "x");
        a.logger = Some("alpha".into());
        let mut b = entry("job-4", 2, "INFO", "x");
        b.logger = Some("beta".into());
        let mut c = entry("job-4", 3, "INFO", "x");
        c.logger = Some("beta".into());
        store.bulk_index(vec![a, b, c]).await.unwrap();

        let mut plan = SearchPlan::for_job("job-4");
        plan.aggregations.unique_values = Some(UniqueValuesSpec {
            field: "logger".into(),
            limit: 10,
        });

        // when
        let values = store
            .search(&plan)
            .await
            .unwrap()
            .aggregations
            .unwrap()
            .unique_values;

        // then
        assert_eq!(values.len(), 2);
        assert_eq!(values[0].value, "beta");
        assert_eq!(values[0].count, 2);
        assert_eq!(values[1].value, "alpha");
    }

    #[tokio::test]
    async fn should_highlight_matches_in_page_hits() {
        // given
        let store = seeded_store().await;
        let mut plan = SearchPlan::for_job("job-1");
        plan.full_text = Some(FullTextQuery {
            query: "connection".into(),
            fields: vec!["message".into()],
        });
        plan.highlight = Some(HighlightSpec {
            fields: vec!["message".into()],
            ..HighlightSpec::default()
        });

        // when
        let outcome = store.search(&plan).await.unwrap();

        // then
        assert_eq!(outcome.highlights.len(), 2);
        let fragments = &outcome.highlights[&outcome.hits[0].id]["message"];
        assert!(fragments[0].contains("<em class=\"highlight\">connection</em>"));
    }

    #[tokio::test]
    async fn should_delete_job_partition() {
        // given
        let store = seeded_store().await;

        // when
        let removed = store.delete_job("job-1").await.unwrap();

        // then
        assert_eq!(removed, 3);
        assert_eq!(store.partition_len("job-1").await, 0);
        assert_eq!(store.partition_len("job-2").await, 1);
    }

    #[test]
    fn should_match_wildcards() {
        assert!(wildcard_match("com.*", "com.example.Svc"));
        assert!(wildcard_match("*.Svc", "com.example.Svc"));
        assert!(wildcard_match("ma?n", "main"));
        assert!(!wildcard_match("ma?n", "mains"));
        assert!(!wildcard_match("com.*", "org.example"));
    }

    #[test]
    fn should_bound_edit_distance() {
        assert!(within_edit_distance("warn", "warm", 1));
        assert!(!within_edit_distance("warn", "info", 1));
        assert!(within_edit_distance("exception", "exceptoin", 2));
    }

    #[test]
    fn should_floor_to_calendar_month() {
        let inside = NaiveDate::from_ymd_opt(2024, 3, 17)
            .unwrap()
            .and_hms_opt(14, 5, 9)
            .unwrap();
        let floored = floor_to_interval(inside, HistogramInterval::Month);
        assert_eq!(
            floored,
            NaiveDate::from_ymd_opt(2024, 3, 1)
                .unwrap()
                .and_hms_opt(0, 0, 0)
                .unwrap()
        );
    }

    #[test]
    fn should_floor_to_calendar_week_monday() {
        // 2024-01-17 is a Wednesday; the week starts Monday 2024-01-15.
        let inside = NaiveDate::from_ymd_opt(2024, 1, 17)
            .unwrap()
            .and_hms_opt(9, 0, 0)
            .unwrap();
        let floored = floor_to_interval(inside, HistogramInterval::Week);
        assert_eq!(
            floored,
            NaiveDate::from_ymd_opt(2024, 1, 15)
                .unwrap()
                .and_hms_opt(0, 0, 0)
                .unwrap()
        );
    }
}
