use anyhow::{Context, Result};
use chrono::{NaiveDate, NaiveDateTime};
use exif::{In, Reader, Tag, Value};
use log::debug;
use std::fs::File;
use std::io::BufReader;
use std::path::Path;

const DATE_TAGS: [Tag; 3] = [Tag::DateTimeOriginal, Tag::DateTimeDigitized, Tag::DateTime];

/// Capture date from the image's EXIF block.
///
/// Missing metadata and unsupported containers are routine and give `None`.
pub fn read_capture_date(path: &Path) -> Option<NaiveDate> {
    match read_exif_date(path) {
        Ok(date) => date,
        Err(e) => {
            debug!("No EXIF date for {}: {:#}", path.display(), e);
            None
        }
    }
}

fn read_exif_date(path: &Path) -> Result<Option<NaiveDate>> {
    let file = File::open(path).with_context(|| format!("cannot open {}", path.display()))?;
    let mut buf = BufReader::new(file);
    let exif = Reader::new()
        .read_from_container(&mut buf)
        .with_context(|| format!("cannot parse EXIF in {}", path.display()))?;

    Ok(DATE_TAGS.iter().find_map(|tag| {
        let field = exif.get_field(*tag, In::PRIMARY)?;
        match &field.value {
            Value::Ascii(values) => values
                .first()
                .and_then(|raw| std::str::from_utf8(raw).ok())
                .and_then(parse_exif_datetime),
            _ => None,
        }
    }))
}

fn parse_exif_datetime(raw: &str) -> Option<NaiveDate> {
    let raw = raw.trim().trim_end_matches('\0');
    ["%Y:%m:%d %H:%M:%S", "%Y-%m-%d %H:%M:%S", "%Y-%m-%dT%H:%M:%S"]
        .iter()
        .find_map(|fmt| NaiveDateTime::parse_from_str(raw, fmt).ok())
        .map(|dt| dt.date())
}
