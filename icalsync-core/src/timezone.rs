//! Windows display name to IANA timezone resolution.
//!
//! Outlook feeds identify timezones by display strings like
//! `(UTC-08:00) Pacific Standard Time` instead of IANA identifiers. The
//! resolver maps the display portion onto an IANA zone via a static
//! CLDR-derived table, loaded once at startup and read-only afterwards.

use std::path::Path;
use std::str::FromStr;

use chrono_tz::Tz;

/// A single `Windows name -> IANA name` pair.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TimezoneMapEntry {
    pub windows_name: String,
    pub iana_name: String,
}

/// The Windows-zone to IANA-zone lookup table.
///
/// Entries keep file order; [`TimezoneMap::resolve`] returns the first match.
#[derive(Debug, Clone, Default)]
pub struct TimezoneMap {
    entries: Vec<TimezoneMapEntry>,
}

impl TimezoneMap {
    /// Build the map from the bundled CLDR-derived table.
    pub fn bundled() -> Self {
        // The bundled table is checked by tests, so parsing cannot fail here.
        Self::parse(include_str!("../data/windows_zones.tsv"))
    }

    /// Load a map from a caller-supplied table file (same TSV format as the
    /// bundled one).
    pub fn from_path(path: &Path) -> std::io::Result<Self> {
        let text = std::fs::read_to_string(path)?;
        Ok(Self::parse(&text))
    }

    /// Parse tab-separated `windows-name<TAB>iana-name` lines. Blank lines
    /// and `#` comments are skipped, as are lines without a tab.
    pub fn parse(text: &str) -> Self {
        let mut entries: Vec<TimezoneMapEntry> = text
            .lines()
            .map(str::trim_end)
            .filter(|line| !line.is_empty() && !line.starts_with('#'))
            .filter_map(|line| {
                let (windows_name, iana_name) = line.split_once('\t')?;
                Some(TimezoneMapEntry {
                    windows_name: windows_name.trim().to_string(),
                    iana_name: iana_name.trim().to_string(),
                })
            })
            .collect();
        // Longest names first, so "Canada Central Standard Time" is tried
        // before its substring "Central Standard Time". Stable sort keeps
        // file order between names of equal length.
        entries.sort_by_key(|entry| std::cmp::Reverse(entry.windows_name.len()));
        Self { entries }
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Resolve a Windows display name to an IANA zone name.
    ///
    /// Performs a substring search: the first entry whose Windows name occurs
    /// inside `display_name` wins. Returns `None` when nothing matches, in
    /// which case callers fall back to the fixed UTC offset carried alongside
    /// the display name.
    pub fn resolve(&self, display_name: &str) -> Option<&str> {
        self.entries
            .iter()
            .find(|entry| display_name.contains(&entry.windows_name))
            .map(|entry| entry.iana_name.as_str())
    }

    /// Resolve a display name directly to a `chrono_tz` zone.
    pub fn resolve_tz(&self, display_name: &str) -> Option<Tz> {
        self.resolve(display_name)
            .and_then(|name| Tz::from_str(name).ok())
    }
}

/// Accept a timezone string only if it can be an IANA identifier.
///
/// Windows display names always contain spaces; IANA names never do. An empty
/// or space-containing string is rejected so a mangled vendor name is dropped
/// rather than handed to the external store.
pub fn validate(tz: &str) -> Option<&str> {
    if tz.is_empty() || tz.contains(' ') {
        None
    } else {
        Some(tz)
    }
}
