use anyhow::{Context, Result};
use chrono::FixedOffset;
use icalsync_core::FeedSpec;
use serde::Deserialize;
use std::path::{Path, PathBuf};

#[derive(Debug, Deserialize)]
pub struct Config {
    /// Path of the JSON state file the imported catalog lives in.
    #[serde(default = "default_state_path")]
    pub state_path: PathBuf,

    /// Hour offset from UTC used for display dates and UNTIL truncation
    /// (the "gmt offset" of the site the events are reported for).
    #[serde(default)]
    pub report_offset_hours: i32,

    /// Bound on each feed fetch. The upstream importer had no timeout at
    /// all; here a hung feed cannot stall the batch.
    #[serde(default = "default_fetch_timeout_secs")]
    pub fetch_timeout_secs: u64,

    /// Optional replacement for the bundled Windows-zone table.
    #[serde(default)]
    pub timezone_table: Option<PathBuf>,

    /// The feeds to import.
    #[serde(default)]
    pub feeds: Vec<FeedSpec>,
}

fn default_state_path() -> PathBuf {
    PathBuf::from("icalsync-state.json")
}

fn default_fetch_timeout_secs() -> u64 {
    30
}

impl Config {
    pub fn report_offset(&self) -> Result<FixedOffset> {
        FixedOffset::east_opt(self.report_offset_hours * 3600)
            .with_context(|| format!("invalid report_offset_hours: {}", self.report_offset_hours))
    }
}

/// Load config from a TOML file.
pub fn load(path: &Path) -> Result<Config> {
    if !path.exists() {
        anyhow::bail!(
            "Config file not found at {}\n\n\
            Create it with your feeds:\n\n\
            report_offset_hours = -8\n\n\
            [[feeds]]\n\
            url = \"https://calendar.example.com/events.ics\"\n\
            category = \"community\"",
            path.display()
        );
    }

    let text = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read {}", path.display()))?;
    let config: Config =
        toml::from_str(&text).with_context(|| format!("Failed to parse {}", path.display()))?;
    Ok(config)
}
