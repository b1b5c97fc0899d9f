use crate::error::{AnalysisError, Result};
use chrono::{Months, NaiveDate};
use regex::Regex;
use std::sync::OnceLock;

/// Month keys everywhere in the pipeline use this shape. Lexicographic order
/// on valid keys is chronological order.
pub const MONTH_PATTERN: &str = r"^\d{4}-\d{2}$";

fn month_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(MONTH_PATTERN).unwrap())
}

pub fn is_valid_month(month: &str) -> bool {
    month_regex().is_match(month)
}

pub fn validate_month(month: &str) -> Result<()> {
    if is_valid_month(month) {
        Ok(())
    } else {
        Err(AnalysisError::InvalidMonthFormat(month.to_string()))
    }
}

/// Parses a month key to the first day of that month.
pub fn parse_month(month: &str) -> Result<NaiveDate> {
    let day_one = format!("{}-01", month.trim());
    NaiveDate::parse_from_str(&day_one, "%Y-%m-%d")
        .map_err(|_| AnalysisError::InvalidMonthFormat(month.to_string()))
}

/// Adds `count` calendar months to a month key. Calendar arithmetic, not
/// string arithmetic: "2024-11" + 3 = "2025-02".
pub fn add_months(month: &str, count: u32) -> Result<String> {
    let date = parse_month(month)?;
    let shifted = date
        .checked_add_months(Months::new(count))
        .ok_or_else(|| AnalysisError::InvalidMonthFormat(month.to_string()))?;
    Ok(shifted.format("%Y-%m").to_string())
}

/// Sorted, deduplicated month range from an arbitrary iteration order.
pub fn sorted_unique_months<I, S>(months: I) -> Vec<String>
where
    I: IntoIterator<Item = S>,
    S: Into<String>,
{
    let mut out: Vec<String> = months.into_iter().map(Into::into).collect();
    out.sort();
    out.dedup();
    out
}

/// Forecast horizon: 6 months when more than 12 historical months were
/// supplied, otherwise 3.
pub fn forecast_horizon(history_len: usize) -> usize {
    if history_len > 12 {
        6
    } else {
        3
    }
}

/// Forecast month `i` (1-indexed) is `base_month + i` calendar months.
pub fn forecast_months(base_month: &str, horizon: usize) -> Result<Vec<String>> {
    (1..=horizon)
        .map(|i| add_months(base_month, i as u32))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_month_validation() {
        assert!(is_valid_month("2024-01"));
        assert!(is_valid_month("1999-12"));
        assert!(!is_valid_month("2024-1"));
        assert!(!is_valid_month("2024/01"));
        assert!(!is_valid_month("202401"));
        assert!(!is_valid_month("2024-01-01"));
        assert!(!is_valid_month(""));
    }

    #[test]
    fn test_validate_month_names_offender() {
        let err = validate_month("24-01").unwrap_err();
        assert!(err.to_string().contains("24-01"));
    }

    #[test]
    fn test_add_months_crosses_year() {
        assert_eq!(add_months("2024-11", 3).unwrap(), "2025-02");
        assert_eq!(add_months("2024-12", 1).unwrap(), "2025-01");
        assert_eq!(add_months("2025-02", 0).unwrap(), "2025-02");
    }

    #[test]
    fn test_forecast_horizon_boundary() {
        assert_eq!(forecast_horizon(0), 3);
        assert_eq!(forecast_horizon(12), 3);
        assert_eq!(forecast_horizon(13), 6);
        assert_eq!(forecast_horizon(24), 6);
    }

    #[test]
    fn test_forecast_months_from_base() {
        let months = forecast_months("2025-02", 3).unwrap();
        assert_eq!(months, vec!["2025-03", "2025-04", "2025-05"]);

        let months = forecast_months("2024-10", 6).unwrap();
        assert_eq!(
            months,
            vec!["2024-11", "2024-12", "2025-01", "2025-02", "2025-03", "2025-04"]
        );
    }

    #[test]
    fn test_sorted_unique_months() {
        let months = sorted_unique_months(vec!["2024-11", "2024-01", "2024-11", "2023-12"]);
        assert_eq!(months, vec!["2023-12", "2024-01", "2024-11"]);
    }
}
