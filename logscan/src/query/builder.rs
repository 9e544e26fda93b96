//! Query compilation.
//!
//! Validates a [`LogQueryRequest`] and compiles it into a [`SearchPlan`]:
//! the job id becomes the mandatory partition term, the full-text clause a
//! must, and every other filter lands in filter context. Dedicated
//! builders cover the count, whole-job aggregation, timeline, and
//! unique-values queries.

use logstore::{
    AggregationRequest, Filter, FullTextQuery, HighlightSpec, HistogramInterval, Page, SearchPlan,
    Sort, UniqueValuesSpec, KEYWORD_FIELDS, SORTABLE_FIELDS,
};

use super::request::LogQueryRequest;
use crate::error::{Error, Result};

/// Hard cap on page size.
pub const MAX_PAGE_SIZE: i64 = 1000;

/// Compiles a search request into an executable plan.
pub fn build_search_plan(request: &LogQueryRequest) -> Result<SearchPlan> {
    validate(request)?;

    let mut plan = SearchPlan::for_job(request.job_id.clone());
    plan.filters = build_filters(request);

    if let Some(text) = request
        .search_text
        .as_ref()
        .filter(|text| !text.trim().is_empty())
    {
        plan.full_text = Some(FullTextQuery {
            query: text.clone(),
            fields: request.effective_search_fields(),
        });

        if request.highlight_matches {
            plan.highlight = Some(HighlightSpec {
                fields: request.effective_search_fields(),
                ..HighlightSpec::default()
            });
        }
    }

    plan.sort = Sort {
        field: request.sort_by.clone(),
        descending: request.effective_sort_direction() == "desc",
    };
    plan.page = Page {
        number: request.page as u64,
        size: request.size as u64,
    };

    if request.include_summary {
        plan.aggregations.summary = true;
    }

    Ok(plan)
}

/// Same filters, but only the total matters.
pub fn build_count_plan(request: &LogQueryRequest) -> Result<SearchPlan> {
    let mut plan = build_search_plan(request)?;
    plan.page = Page { number: 0, size: 1 };
    plan.highlight = None;
    plan.aggregations = AggregationRequest::default();
    Ok(plan)
}

/// Whole-job aggregation query: core summary plus top-N and cardinality.
pub fn build_aggregation_plan(job_id: &str) -> SearchPlan {
    let mut plan = SearchPlan::for_job(job_id);
    plan.page = Page { number: 0, size: 1 };
    plan.aggregations = AggregationRequest {
        summary: true,
        extended: true,
        ..AggregationRequest::default()
    };
    plan
}

/// Date-histogram query over one job.
pub fn build_timeline_plan(job_id: &str, interval: HistogramInterval) -> SearchPlan {
    let mut plan = SearchPlan::for_job(job_id);
    plan.page = Page { number: 0, size: 1 };
    plan.aggregations.timeline = Some(interval);
    plan
}

/// Terms aggregation over one keyword field.
pub fn build_unique_values_plan(job_id: &str, field: &str, limit: usize) -> Result<SearchPlan> {
    if !KEYWORD_FIELDS.contains(&field) {
        return Err(Error::unsupported_field(field));
    }

    let mut plan = SearchPlan::for_job(job_id);
    plan.page = Page { number: 0, size: 1 };
    plan.aggregations.unique_values = Some(UniqueValuesSpec {
        field: field.to_string(),
        limit,
    });
    Ok(plan)
}

fn validate(request: &LogQueryRequest) -> Result<()> {
    if request.job_id.trim().is_empty() {
        return Err(Error::InvalidInput("Job ID is required".to_string()));
    }

    if let (Some(start), Some(end)) = (request.start_date, request.end_date) {
        if start > end {
            return Err(Error::invalid_date_range());
        }
    }

    if let (Some(min), Some(max)) = (request.min_line_number, request.max_line_number) {
        if min > max {
            return Err(Error::InvalidInput(
                "minLineNumber must be <= maxLineNumber".to_string(),
            ));
        }
    }

    if !SORTABLE_FIELDS.contains(&request.sort_by.as_str()) {
        return Err(Error::invalid_sort_field(&request.sort_by));
    }

    if request.page < 0 {
        return Err(Error::InvalidInput("page must be >= 0".to_string()));
    }

    if request.size < 1 || request.size > MAX_PAGE_SIZE {
        return Err(Error::InvalidInput(format!(
            "size must be between 1 and {}",
            MAX_PAGE_SIZE
        )));
    }

    Ok(())
}

fn build_filters(request: &LogQueryRequest) -> Vec<Filter> {
    let mut filters = Vec::new();

    if let Some(levels) = request.levels.as_ref().filter(|l| !l.is_empty()) {
        filters.push(Filter::Terms {
            field: "level".to_string(),
            values: levels.iter().map(|l| l.to_uppercase()).collect(),
        });
    }

    add_keyword_filter(&mut filters, "fileName", request.file_name.as_deref());
    add_keyword_filter(&mut filters, "logger", request.logger.as_deref());
    add_keyword_filter(&mut filters, "thread", request.thread.as_deref());
    add_keyword_filter(&mut filters, "source", request.source.as_deref());
    add_keyword_filter(&mut filters, "hostname", request.hostname.as_deref());
    add_keyword_filter(&mut filters, "application", request.application.as_deref());
    add_keyword_filter(&mut filters, "environment", request.environment.as_deref());

    if let Some(has_error) = request.has_error {
        filters.push(Filter::HasError(has_error));
    }
    if let Some(has_stack_trace) = request.has_stack_trace {
        filters.push(Filter::HasStackTrace(has_stack_trace));
    }

    if let Some(tags) = request.tags.as_ref().filter(|t| !t.is_empty()) {
        filters.push(Filter::Tags(tags.clone()));
    }

    if request.start_date.is_some() || request.end_date.is_some() {
        filters.push(Filter::TimeRange {
            start: request.start_date,
            end: request.end_date,
        });
    }

    if request.min_line_number.is_some() || request.max_line_number.is_some() {
        filters.push(Filter::LineRange {
            min: request.min_line_number,
            max: request.max_line_number,
        });
    }

    filters
}

/// Term filter, upgraded to a wildcard when the value globs.
fn add_keyword_filter(filters: &mut Vec<Filter>, field: &str, value: Option<&str>) {
    let Some(value) = value.filter(|v| !v.trim().is_empty()) else {
        return;
    };
    if value.contains('*') || value.contains('?') {
        filters.push(Filter::Wildcard {
            field: field.to_string(),
            pattern: value.to_string(),
        });
    } else {
        filters.push(Filter::Term {
            field: field.to_string(),
            value: value.to_string(),
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;

    fn request() -> LogQueryRequest {
        LogQueryRequest::for_job("job-1")
    }

    #[test]
    fn should_reject_blank_job_id() {
        let mut bad = request();
        bad.job_id = "  ".to_string();

        assert!(matches!(
            build_search_plan(&bad),
            Err(Error::InvalidInput(_))
        ));
    }

    #[test]
    fn should_reject_inverted_date_range() {
        let mut bad = request();
        bad.start_date = NaiveDate::from_ymd_opt(2024, 1, 16)
            .unwrap()
            .and_hms_opt(0, 0, 0);
        bad.end_date = NaiveDate::from_ymd_opt(2024, 1, 15)
            .unwrap()
            .and_hms_opt(0, 0, 0);

        assert!(build_search_plan(&bad).is_err());
    }

    #[test]
    fn should_reject_inverted_line_range() {
        let mut bad = request();
        bad.min_line_number = Some(100);
        bad.max_line_number = Some(10);

        assert!(build_search_plan(&bad).is_err());
    }

    #[test]
    fn should_reject_unknown_sort_fields() {
        let mut bad = request();
        bad.sort_by = "message".to_string();

        assert!(matches!(
            build_search_plan(&bad),
            Err(Error::InvalidInput(_))
        ));
    }

    #[test]
    fn should_enforce_page_bounds() {
        let mut bad = request();
        bad.page = -1;
        assert!(build_search_plan(&bad).is_err());

        let mut bad = request();
        bad.size = 1001;
        assert!(build_search_plan(&bad).is_err());

        let mut ok = request();
        ok.size = 1000;
        assert!(build_search_plan(&ok).is_ok());
    }

    #[test]
    fn should_uppercase_level_filters() {
        let mut req = request();
        req.levels = Some(vec!["error".to_string(), "Warn".to_string()]);

        let plan = build_search_plan(&req).unwrap();

        assert!(plan.filters.contains(&Filter::Terms {
            field: "level".to_string(),
            values: vec!["ERROR".to_string(), "WARN".to_string()],
        }));
    }

    #[test]
    fn should_upgrade_globbing_values_to_wildcards() {
        let mut req = request();
        req.logger = Some("com.example.*".to_string());
        req.thread = Some("main".to_string());

        let plan = build_search_plan(&req).unwrap();

        assert!(plan.filters.contains(&Filter::Wildcard {
            field: "logger".to_string(),
            pattern: "com.example.*".to_string(),
        }));
        assert!(plan.filters.contains(&Filter::Term {
            field: "thread".to_string(),
            value: "main".to_string(),
        }));
    }

    #[test]
    fn should_attach_full_text_and_highlights() {
        let mut req = request();
        req.search_text = Some("connection refused".to_string());
        req.highlight_matches = true;

        let plan = build_search_plan(&req).unwrap();

        let full_text = plan.full_text.unwrap();
        assert_eq!(full_text.query, "connection refused");
        assert_eq!(full_text.fields, vec!["message", "rawLine", "stackTrace"]);
        let highlight = plan.highlight.unwrap();
        assert_eq!(highlight.fragment_size, 150);
        assert_eq!(highlight.max_fragments, 3);
    }

    #[test]
    fn should_not_highlight_without_search_text() {
        let mut req = request();
        req.highlight_matches = true;

        let plan = build_search_plan(&req).unwrap();

        assert!(plan.highlight.is_none());
    }

    #[test]
    fn should_build_count_plan_with_minimal_page() {
        let mut req = request();
        req.size = 500;
        req.include_summary = true;

        let plan = build_count_plan(&req).unwrap();

        assert_eq!(plan.page, Page { number: 0, size: 1 });
        assert!(plan.aggregations.is_empty());
    }

    #[test]
    fn should_reject_non_keyword_unique_values_field() {
        assert!(matches!(
            build_unique_values_plan("job-1", "message", 10),
            Err(Error::InvalidInput(_))
        ));
        assert!(build_unique_values_plan("job-1", "logger", 10).is_ok());
    }

    #[test]
    fn should_build_timeline_plan_with_interval() {
        let plan = build_timeline_plan("job-1", HistogramInterval::FiveMinutes);

        assert_eq!(
            plan.aggregations.timeline,
            Some(HistogramInterval::FiveMinutes)
        );
        assert_eq!(plan.job_id, "job-1");
    }
}
