use chrono::NaiveDate;
use once_cell::sync::Lazy;
use regex::Regex;
use std::path::Path;

use crate::modules::base::{CaseStyle, RenameOptions};
use crate::modules::classifier::extract_date_from_filename;
use crate::modules::sanitizer::{sanitize, SanitizePolicy};
use crate::utils::IMAGE_EXTENSIONS;

/// Longest filename, in bytes, most filesystems accept.
pub const MAX_FILENAME_LENGTH: usize = 255;

static LEADING_DATE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^\d{4}-\d{2}-\d{2}-").expect("invalid date prefix regex"));

pub fn fits_length_budget(filename: &str) -> bool {
    filename.len() <= MAX_FILENAME_LENGTH
}

/// Date for the prefix: the one already in the name wins over metadata.
pub fn date_prefix(original_name: &str, metadata_date: Option<NaiveDate>) -> Option<NaiveDate> {
    extract_date_from_filename(original_name).or(metadata_date)
}

/// Final filename for `original_name` given the model's raw `description`.
///
/// Returns `None` when the description leaves nothing usable once sanitized.
pub fn compose_filename(
    original_name: &str,
    description: &str,
    date: Option<NaiveDate>,
    options: &RenameOptions,
) -> Option<String> {
    let description = strip_image_extension(strip_leading_date(description.trim()));
    let stem = style_stem(original_name, description, options);
    if stem.is_empty() {
        return None;
    }

    let combined = match date {
        Some(date) => format!(
            "{}{}{}",
            date.format("%Y-%m-%d"),
            options.separator(original_name),
            stem
        ),
        None => stem,
    };
    // Second pass settles separators introduced by the join.
    let stem = style_stem(original_name, &combined, options);

    let extension = Path::new(original_name)
        .extension()
        .map(|ext| format!(".{}", ext.to_string_lossy()))
        .unwrap_or_default();
    Some(format!("{stem}{extension}"))
}

fn strip_leading_date(text: &str) -> &str {
    match LEADING_DATE.find(text) {
        Some(found) => &text[found.end()..],
        None => text,
    }
}

fn strip_image_extension(text: &str) -> &str {
    let Some((stem, ext)) = text.rsplit_once('.') else {
        return text;
    };
    if IMAGE_EXTENSIONS.iter().any(|known| known.eq_ignore_ascii_case(ext)) {
        stem
    } else {
        text
    }
}

fn style_stem(original_name: &str, text: &str, options: &RenameOptions) -> String {
    let policy = SanitizePolicy::default()
        .with_punctuation(false)
        .with_spaces(options.allows_spaces(original_name));
    let stem = sanitize(text, &policy);
    apply_case_style(&stem, options.case_style, original_name)
}

pub fn apply_case_style(text: &str, style: CaseStyle, original_name: &str) -> String {
    match style {
        CaseStyle::Lower => text.to_lowercase(),
        CaseStyle::Upper => text.to_uppercase(),
        CaseStyle::Title => title_case(text),
        CaseStyle::Sentence => sentence_case(text),
        CaseStyle::Infer => {
            if original_name.chars().any(char::is_uppercase) {
                text.to_string()
            } else {
                text.to_lowercase()
            }
        }
    }
}

fn title_case(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    let mut after_letter = false;
    for ch in text.chars() {
        if after_letter {
            out.extend(ch.to_lowercase());
        } else {
            out.extend(ch.to_uppercase());
        }
        after_letter = ch.is_alphabetic();
    }
    out
}

fn sentence_case(text: &str) -> String {
    let mut chars = text.chars();
    match chars.next() {
        Some(first) => first
            .to_uppercase()
            .chain(chars.flat_map(char::to_lowercase))
            .collect(),
        None => String::new(),
    }
}
