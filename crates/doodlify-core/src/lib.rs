pub mod analysis;
pub mod config;
pub mod error;
pub mod fingerprint;
pub mod hash;

pub use error::{DoodlifyError, ErrorKind, Severity};

/// Current UTC time as an RFC 3339 string.
pub fn now_rfc3339() -> String {
    time::OffsetDateTime::now_utc()
        .format(&time::format_description::well_known::Rfc3339)
        .unwrap_or_default()
}

/// Current UTC calendar date, used for event date-window selection.
pub fn today_utc() -> time::Date {
    time::OffsetDateTime::now_utc().date()
}
