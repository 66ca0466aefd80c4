//! Document-info handling: read facts about the source, patch dates on the output.
//!
//! Dates are written to the trailer's `/Info` dictionary as PDF date strings
//! (`D:YYYYMMDDHHmmSS+HH'mm'`). Only `/CreationDate` and `/ModDate` are
//! touched. Every other entry, including `/Producer`, is left as the
//! assembler wrote it.

use crate::config::{DateZone, MetadataDates};
use crate::error::FlattenError;
use crate::output::SourceInfo;
use crate::pipeline::assemble::write_atomic;
use chrono::{
    DateTime, FixedOffset, Local, NaiveDate, NaiveDateTime, NaiveTime, TimeDelta, TimeZone, Utc,
};
use lopdf::{Dictionary, Document, Object};
use std::path::Path;
use tracing::{debug, info, warn};

/// The instants that will be written, already combined with a time of day and zone.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PatchInstants {
    pub creation: Option<DateTime<FixedOffset>>,
    pub modification: Option<DateTime<FixedOffset>>,
}

impl PatchInstants {
    pub fn is_empty(&self) -> bool {
        self.creation.is_none() && self.modification.is_none()
    }

    /// Instant applied to the file's filesystem times.
    pub fn file_time(&self) -> Option<DateTime<FixedOffset>> {
        self.modification.or(self.creation)
    }
}

/// Time of day carried over from the source document.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SourceTimes {
    pub creation: Option<NaiveTime>,
    pub modification: Option<NaiveTime>,
}

// ── Reading ──────────────────────────────────────────────────────────────────

/// Load `path` with lopdf and summarise it.
pub fn read_source_info(path: &Path) -> Result<SourceInfo, FlattenError> {
    let doc = Document::load(path).map_err(|e| FlattenError::InvalidInputDocument {
        path: path.to_path_buf(),
        detail: e.to_string(),
    })?;

    let info = info_dict(&doc);
    let field = |key: &[u8]| info.and_then(|d| get_string_from_dict(d, key));

    let source = SourceInfo {
        page_count: doc.get_pages().len(),
        pdf_version: doc.version.to_string(),
        title: field(b"Title"),
        author: field(b"Author"),
        producer: field(b"Producer"),
        creation_date: field(b"CreationDate"),
        modification_date: field(b"ModDate"),
        is_encrypted: doc.is_encrypted(),
    };
    debug!(
        "Source {}: {} pages, PDF {}",
        path.display(),
        source.page_count,
        source.pdf_version
    );
    Ok(source)
}

/// The trailer's `/Info` dictionary, whether inline or referenced.
fn info_dict(doc: &Document) -> Option<&Dictionary> {
    match doc.trailer.get(b"Info").ok()? {
        Object::Reference(id) => doc.get_dictionary(*id).ok(),
        Object::Dictionary(dict) => Some(dict),
        _ => None,
    }
}

fn get_string_from_dict(dict: &Dictionary, key: &[u8]) -> Option<String> {
    match dict.get(key).ok()? {
        Object::String(bytes, _) => {
            if bytes.len() >= 2 && bytes[0] == 0xFE && bytes[1] == 0xFF {
                let utf16: Vec<u16> = bytes[2..]
                    .chunks_exact(2)
                    .map(|c| u16::from_be_bytes([c[0], c[1]]))
                    .collect();
                String::from_utf16(&utf16).ok()
            } else {
                String::from_utf8(bytes.clone())
                    .ok()
                    .or_else(|| Some(bytes.iter().map(|&b| b as char).collect()))
            }
        }
        Object::Name(bytes) => String::from_utf8(bytes.clone()).ok(),
        _ => None,
    }
}

// ── PDF date strings ─────────────────────────────────────────────────────────

/// `2021-03-04T05:06:07+01:30` → `D:20210304050607+01'30'`.
pub fn format_pdf_date(dt: &DateTime<FixedOffset>) -> String {
    let offset = dt.offset().local_minus_utc();
    let sign = if offset < 0 { '-' } else { '+' };
    let minutes = offset.unsigned_abs() / 60;
    format!(
        "D:{}{}{:02}'{:02}'",
        dt.format("%Y%m%d%H%M%S"),
        sign,
        minutes / 60,
        minutes % 60
    )
}

/// Wall-clock part of a PDF date string. Missing trailing fields default to
/// their minimum; any zone suffix is ignored.
pub fn parse_pdf_date(s: &str) -> Option<NaiveDateTime> {
    let s = s.trim();
    let s = s.strip_prefix("D:").unwrap_or(s);

    let year: i32 = s.get(0..4)?.parse().ok()?;
    let month: u32 = s.get(4..6).and_then(|m| m.parse().ok()).unwrap_or(1);
    let day: u32 = s.get(6..8).and_then(|d| d.parse().ok()).unwrap_or(1);
    let hour: u32 = s.get(8..10).and_then(|h| h.parse().ok()).unwrap_or(0);
    let minute: u32 = s.get(10..12).and_then(|m| m.parse().ok()).unwrap_or(0);
    let second: u32 = s.get(12..14).and_then(|s| s.parse().ok()).unwrap_or(0);

    NaiveDate::from_ymd_opt(year, month, day)
        .and_then(|date| date.and_hms_opt(hour, minute, second))
}

// ── Resolving instants ───────────────────────────────────────────────────────

/// Time of day of the source's own dates, falling back to the file's mtime
/// (expressed in `zone`) for whichever is missing.
pub fn source_times(info: &SourceInfo, source_path: &Path, zone: DateZone) -> SourceTimes {
    let from_info = |raw: &Option<String>| {
        raw.as_deref()
            .and_then(parse_pdf_date)
            .map(|dt| dt.time())
    };

    let mtime = std::fs::metadata(source_path)
        .and_then(|m| m.modified())
        .ok()
        .map(|st| match zone {
            DateZone::Utc => DateTime::<Utc>::from(st).time(),
            DateZone::Local => DateTime::<Local>::from(st).time(),
        });

    SourceTimes {
        creation: from_info(&info.creation_date).or(mtime),
        modification: from_info(&info.modification_date).or(mtime),
    }
}

/// Combine calendar dates with a time of day (midnight unless `times` says
/// otherwise) in `zone`.
///
/// When both dates are set and the modification instant precedes the
/// creation instant, the modification instant is raised to match.
pub fn resolve_instants(
    dates: &MetadataDates,
    zone: DateZone,
    times: Option<&SourceTimes>,
) -> PatchInstants {
    let creation_time = times.and_then(|t| t.creation).unwrap_or(NaiveTime::MIN);
    let modification_time = times.and_then(|t| t.modification).unwrap_or(NaiveTime::MIN);

    let creation = dates.creation.map(|d| in_zone(d.and_time(creation_time), zone));
    let mut modification = dates
        .modification
        .map(|d| in_zone(d.and_time(modification_time), zone));

    if let (Some(c), Some(m)) = (creation, modification) {
        if m < c {
            warn!(
                "Modification date {} precedes creation date {}; using the creation date for both",
                m.format("%Y-%m-%d"),
                c.format("%Y-%m-%d")
            );
            modification = Some(c);
        }
    }

    PatchInstants {
        creation,
        modification,
    }
}

/// Longest clock jump searched when a local time falls into a DST gap.
const MAX_GAP_MINUTES: i64 = 3 * 60;

fn in_zone(naive: NaiveDateTime, zone: DateZone) -> DateTime<FixedOffset> {
    match zone {
        DateZone::Utc => Utc.from_utc_datetime(&naive).fixed_offset(),
        DateZone::Local => {
            let local = |t: &NaiveDateTime| {
                Local
                    .from_local_datetime(t)
                    .earliest()
                    .map(|dt| dt.fixed_offset())
            };
            first_valid_local(naive, local)
                .unwrap_or_else(|| Utc.from_utc_datetime(&naive).fixed_offset())
        }
    }
}

/// `naive` in a zone described by `local`, or the first minute after it
/// that exists when a DST transition skipped it.
fn first_valid_local<F>(naive: NaiveDateTime, local: F) -> Option<DateTime<FixedOffset>>
where
    F: Fn(&NaiveDateTime) -> Option<DateTime<FixedOffset>>,
{
    (0..=MAX_GAP_MINUTES).find_map(|m| local(&(naive + TimeDelta::minutes(m))))
}

// ── Patching ─────────────────────────────────────────────────────────────────

/// Rewrite `/CreationDate` and/or `/ModDate` of the PDF at `path` in place.
///
/// Returns `Ok(false)` without touching the file when `instants` is empty.
pub fn patch_metadata(path: &Path, instants: &PatchInstants) -> Result<bool, FlattenError> {
    if instants.is_empty() {
        debug!("No dates supplied; metadata left as assembled");
        return Ok(false);
    }

    let patch_err = |detail: String| FlattenError::MetadataPatchFailed {
        path: path.to_path_buf(),
        detail,
    };

    let mut doc =
        Document::load(path).map_err(|e| patch_err(format!("cannot reopen output: {e}")))?;

    {
        let info = info_dict_mut(&mut doc).map_err(|e| patch_err(format!("no usable /Info: {e}")))?;
        if let Some(c) = &instants.creation {
            info.set("CreationDate", Object::string_literal(format_pdf_date(c)));
        }
        if let Some(m) = &instants.modification {
            info.set("ModDate", Object::string_literal(format_pdf_date(m)));
        }
    }

    let mut bytes = Vec::new();
    doc.save_to(&mut bytes)
        .map_err(|e| patch_err(format!("cannot serialise: {e}")))?;
    write_atomic(path, &bytes).map_err(|e| patch_err(e.to_string()))?;

    info!(
        "Patched metadata of {} (creation={}, modification={})",
        path.display(),
        instants.creation.map(|c| format_pdf_date(&c)).unwrap_or_else(|| "-".into()),
        instants.modification.map(|m| format_pdf_date(&m)).unwrap_or_else(|| "-".into()),
    );
    Ok(true)
}

/// Get the `/Info` dictionary for writing, creating or un-inlining it.
fn info_dict_mut(doc: &mut Document) -> lopdf::Result<&mut Dictionary> {
    let current = doc.trailer.get(b"Info").ok().cloned();
    let id = match current {
        Some(Object::Reference(id)) => id,
        Some(Object::Dictionary(dict)) => {
            let id = doc.add_object(dict);
            doc.trailer.set("Info", id);
            id
        }
        _ => {
            let id = doc.add_object(Dictionary::new());
            doc.trailer.set("Info", id);
            id
        }
    };
    doc.get_dictionary_mut(id)
}

/// Set the access and modification times of `path` to `instant`.
///
/// On macOS the creation (birth) time is set as well.
pub fn set_file_times(path: &Path, instant: &DateTime<FixedOffset>) -> Result<(), FlattenError> {
    let times_err = |e: std::io::Error| FlattenError::MetadataPatchFailed {
        path: path.to_path_buf(),
        detail: format!("cannot set file times: {e}"),
    };
    let ft =
        filetime::FileTime::from_unix_time(instant.timestamp(), instant.timestamp_subsec_nanos());
    filetime::set_file_times(path, ft, ft).map_err(times_err)?;
    set_birth_time(path, instant).map_err(times_err)?;
    debug!("Set file times of {} to {}", path.display(), instant);
    Ok(())
}

#[cfg(target_os = "macos")]
fn set_birth_time(path: &Path, instant: &DateTime<FixedOffset>) -> std::io::Result<()> {
    use std::os::macos::fs::FileTimesExt;

    let time = std::time::SystemTime::from(instant.with_timezone(&Utc));
    let file = std::fs::OpenOptions::new().write(true).open(path)?;
    file.set_times(std::fs::FileTimes::new().set_created(time))
}

#[cfg(not(target_os = "macos"))]
fn set_birth_time(_path: &Path, _instant: &DateTime<FixedOffset>) -> std::io::Result<()> {
    Ok(())
}
