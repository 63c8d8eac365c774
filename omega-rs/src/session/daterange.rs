//! `DATE1` / `DATE2` / `DAYSMINUS` date restriction.
//!
//! The range is expanded into the coarsest covering set of `Y`ear, `M`onth
//! and `D`ay terms, so a whole year costs one term rather than 365.

use chrono::{Datelike, Duration, NaiveDate};

use crate::backend::Query;
use crate::request::{parse_int, Request};

/// Raw date parameters as sent; any may be empty.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct DateRange {
    pub start: String,
    pub end: String,
    pub span: String,
}

impl DateRange {
    pub fn from_request(request: &Request) -> Self {
        let get = |name: &str| request.get(name).unwrap_or("").to_owned();
        Self { start: get("DATE1"), end: get("DATE2"), span: get("DAYSMINUS") }
    }

    pub fn is_set(&self) -> bool {
        !(self.start.is_empty() && self.end.is_empty() && self.span.is_empty())
    }

    /// Resolve to concrete inclusive bounds, relative to `today` where a
    /// bound is missing.
    pub fn bounds(&self, today: NaiveDate) -> Option<(NaiveDate, NaiveDate)> {
        if !self.is_set() {
            return None;
        }
        let parse = |s: &str| NaiveDate::parse_from_str(s, "%Y%m%d").ok();
        let mut start = parse(&self.start);
        let mut end = parse(&self.end);
        let span = (!self.span.is_empty()).then(|| Duration::days(parse_int(&self.span).max(0)));

        if let Some(span) = span {
            match (start, end) {
                (Some(s), None) => end = s.checked_add_signed(span),
                (None, Some(e)) => start = e.checked_sub_signed(span),
                (None, None) => {
                    end = Some(today);
                    start = today.checked_sub_signed(span);
                }
                (Some(_), Some(_)) => {}
            }
        }

        let start = start.or_else(|| NaiveDate::from_ymd_opt(1970, 1, 1))?;
        let end = end.unwrap_or(today);
        Some((start, end))
    }

    /// OR of the date terms covering the range; empty if the range is.
    pub fn to_query(&self, today: NaiveDate) -> Query {
        let Some((start, end)) = self.bounds(today) else {
            return Query::Empty;
        };
        Query::or(covering_terms(start, end).into_iter().map(Query::Term).collect())
    }
}

fn last_of_month(d: NaiveDate) -> Option<NaiveDate> {
    let (y, m) = if d.month() == 12 { (d.year() + 1, 1) } else { (d.year(), d.month() + 1) };
    NaiveDate::from_ymd_opt(y, m, 1).and_then(|n| n.pred_opt())
}

fn covering_terms(start: NaiveDate, end: NaiveDate) -> Vec<String> {
    let mut terms = Vec::new();
    let mut cursor = start;
    while cursor <= end {
        let year_end = NaiveDate::from_ymd_opt(cursor.year(), 12, 31);
        let month_end = last_of_month(cursor);
        let next = if cursor.ordinal() == 1 && year_end.is_some_and(|y| y <= end) {
            terms.push(cursor.format("Y%Y").to_string());
            year_end
        } else if cursor.day() == 1 && month_end.is_some_and(|m| m <= end) {
            terms.push(cursor.format("M%Y%m").to_string());
            month_end
        } else {
            terms.push(cursor.format("D%Y%m%d").to_string());
            Some(cursor)
        };
        match next.and_then(|n| n.succ_opt()) {
            Some(n) => cursor = n,
            None => break,
        }
    }
    terms
}

// ── Tests ─────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    fn date(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    fn range(start: &str, end: &str, span: &str) -> DateRange {
        DateRange { start: start.into(), end: end.into(), span: span.into() }
    }

    #[test]
    fn unset_is_empty() {
        assert!(!DateRange::default().is_set());
        assert!(DateRange::default().to_query(date(2024, 5, 1)).is_empty());
    }

    #[test]
    fn coarsest_cover() {
        let terms = covering_terms(date(2023, 12, 30), date(2025, 2, 2));
        assert_eq!(
            terms,
            vec!["D20231230", "D20231231", "Y2024", "M202501", "D20250201", "D20250202"]
        );
    }

    #[test]
    fn span_back_from_today() {
        let r = range("", "", "2");
        assert_eq!(r.bounds(date(2024, 3, 10)), Some((date(2024, 3, 8), date(2024, 3, 10))));
    }

    #[test]
    fn span_forward_from_start() {
        let r = range("20240101", "", "30");
        assert_eq!(r.bounds(date(2030, 1, 1)), Some((date(2024, 1, 1), date(2024, 1, 31))));
        assert_eq!(r.to_query(date(2030, 1, 1)), Query::term("M202401"));
    }

    #[test]
    fn inverted_range_has_no_terms() {
        let r = range("20240201", "20240101", "");
        assert!(r.to_query(date(2024, 6, 1)).is_empty());
    }

    #[test]
    fn invalid_dates_fall_back() {
        let r = range("garbage", "20240102", "");
        let (start, end) = r.bounds(date(2024, 6, 1)).unwrap();
        assert_eq!(start, date(1970, 1, 1));
        assert_eq!(end, date(2024, 1, 2));
    }
}
