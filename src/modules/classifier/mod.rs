//! Filename predicates used by the needs-rename filter.
//!
//! Everything here looks only at the name string, never at the filesystem.

use chrono::NaiveDate;
use once_cell::sync::Lazy;
use regex::Regex;
use std::path::Path;

static UUID_PATTERN: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?i)^[0-9a-f]{8}-[0-9a-f]{4}-[0-9a-f]{4}-[0-9a-f]{4}-[0-9a-f]{12}$")
        .expect("invalid UUID regex")
});

/// Naming conventions of screenshot and screen-capture tools. Add new tools here.
static SCREENSHOT_PATTERNS: Lazy<Vec<Regex>> = Lazy::new(|| {
    [
        r"^CleanShot \d{4}-\d{2}-\d{2}",
        r"^ScreenFloat Shot",
        r"^Screen(shot|cap)(\s\d+)?\s?\d{4}-\d{2}-\d{2}(?:\s\w+\s\d{1,2}\.\d{1,2}\s?\w+)?$",
        r"^Pasted image \d+",
        r"^Picture \d+(?:\s\d+)?$",
        r"^Skitch \d{4}-\d{2}-\d{2}$",
    ]
    .iter()
    .map(|pattern| Regex::new(&format!("(?i){pattern}")).expect("invalid screenshot regex"))
    .collect()
});

static UNTITLED_PATTERN: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?i)^untitled(\s\d+)?$").expect("invalid untitled regex"));

static DASHED_DATE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?P<year>20\d{2})-(?P<month>\d{2})-(?P<day>\d{2})").expect("invalid date regex")
});

static COMPACT_DATE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?P<year>20\d{2})(?P<month>\d{2})(?P<day>\d{2})").expect("invalid date regex")
});

fn stem(filename: &str) -> &str {
    Path::new(filename)
        .file_stem()
        .and_then(|stem| stem.to_str())
        .unwrap_or(filename)
}

/// `IMG_1234`, `IMG-1234` or a bare UUID, as phones and cameras produce.
pub fn is_camera_filename(filename: &str) -> bool {
    let stem = stem(filename);
    let prefix: String = stem.chars().take(4).collect::<String>().to_ascii_uppercase();
    prefix == "IMG-" || prefix == "IMG_" || UUID_PATTERN.is_match(stem)
}

pub fn is_screenshot_filename(filename: &str) -> bool {
    let stem = stem(filename);
    SCREENSHOT_PATTERNS.iter().any(|pattern| pattern.is_match(stem))
}

pub fn is_untitled_filename(filename: &str) -> bool {
    UNTITLED_PATTERN.is_match(stem(filename))
}

pub fn needs_rename(filename: &str) -> bool {
    is_camera_filename(filename) || is_screenshot_filename(filename) || is_untitled_filename(filename)
}

/// First valid calendar date written as `YYYY-MM-DD` or `YYYYMMDD` in the stem.
///
/// Dashed dates are preferred over compact ones. Matches that are not real
/// dates (month 13, February 30) are passed over.
pub fn extract_date_from_filename(filename: &str) -> Option<NaiveDate> {
    let stem = stem(filename);
    [&*DASHED_DATE, &*COMPACT_DATE].into_iter().find_map(|pattern| {
        pattern.captures_iter(stem).find_map(|caps| {
            let year = caps["year"].parse().ok()?;
            let month = caps["month"].parse().ok()?;
            let day = caps["day"].parse().ok()?;
            NaiveDate::from_ymd_opt(year, month, day)
        })
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn detects_camera_names() {
        assert!(is_camera_filename("IMG_1234.jpg"));
        assert!(is_camera_filename("img_1234.jpg"));
        assert!(is_camera_filename("IMG-1234.jpg"));
        assert!(is_camera_filename("img-1234.JPG"));
        assert!(is_camera_filename("63C0900B-4465-4CF9-A310-327C627DB9EA.jpg"));
        assert!(is_camera_filename("63c0900b-4465-4cf9-a310-327c627db9ea.heic"));

        assert!(!is_camera_filename("photo.jpg"));
        assert!(!is_camera_filename("vacation.jpg"));
        assert!(!is_camera_filename("image_1234.jpg"));
        assert!(!is_camera_filename("63C0900B-4465-4CF9-327C627DB9EA.jpg"));
    }

    #[test]
    fn detects_screenshot_names() {
        assert!(is_screenshot_filename("Screenshot 2024-01-01.png"));
        assert!(is_screenshot_filename("Screenshot 2024-01-01 at 10.30 AM.png"));
        assert!(is_screenshot_filename("Screencap 2024-01-01.png"));
        assert!(is_screenshot_filename("CleanShot 2024-01-01.png"));
        assert!(is_screenshot_filename("ScreenFloat Shot.png"));
        assert!(is_screenshot_filename("Pasted image 123.png"));
        assert!(is_screenshot_filename("Picture 1.png"));
        assert!(is_screenshot_filename("Picture 1 2.png"));
        assert!(is_screenshot_filename("skitch 2024-01-01.png"));

        assert!(!is_screenshot_filename("photo.png"));
        assert!(!is_screenshot_filename("2024-01-01.png"));
    }

    #[test]
    fn detects_untitled_names() {
        assert!(is_untitled_filename("untitled.jpg"));
        assert!(is_untitled_filename("Untitled 42.jpg"));
        assert!(!is_untitled_filename("untitled-photo.jpg"));
        assert!(!is_untitled_filename("my-untitled-work.jpg"));
    }

    #[test]
    fn needs_rename_combines_predicates() {
        assert!(needs_rename("IMG_1234.jpg"));
        assert!(needs_rename("CleanShot 2024-01-01.png"));
        assert!(needs_rename("Untitled 1.jpg"));
        assert!(!needs_rename("golden-gate-bridge.png"));
        assert!(!needs_rename("2024-01-01-party.jpg"));
    }

    #[test]
    fn extracts_dates_from_names() {
        let new_year = NaiveDate::from_ymd_opt(2024, 1, 1);
        assert_eq!(extract_date_from_filename("2024-01-01-photo.jpg"), new_year);
        assert_eq!(extract_date_from_filename("20240101_photo.jpg"), new_year);
        assert_eq!(extract_date_from_filename("Screenshot 2024-01-01 at 10.30 AM.png"), new_year);
        assert_eq!(extract_date_from_filename("IMG_1234.jpg"), None);
        assert_eq!(extract_date_from_filename("photo.jpg"), None);
    }

    #[test]
    fn skips_impossible_dates() {
        assert_eq!(extract_date_from_filename("2024-13-01.jpg"), None);
        assert_eq!(
            extract_date_from_filename("2024-13-01 then 2024-02-29.jpg"),
            NaiveDate::from_ymd_opt(2024, 2, 29)
        );
        assert_eq!(extract_date_from_filename("20230230.jpg"), None);
    }
}
