use crate::auth::endpoints::{LIBRARY_SCOPE, PICKER_SCOPE};

#[derive(Debug, Clone, Copy, PartialEq, Eq, clap::ValueEnum)]
pub enum LogLevel {
    Debug,
    Info,
    Warn,
    Error,
}

impl LogLevel {
    pub fn as_filter(&self) -> &'static str {
        match self {
            LogLevel::Debug => "debug",
            LogLevel::Info => "info",
            LogLevel::Warn => "warn",
            LogLevel::Error => "error",
        }
    }
}

/// Where the remote item list comes from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PickSource {
    /// Items chosen interactively in the Photos Picker.
    Picker,
    /// Every item in the Library album with this title.
    Album(String),
}

impl PickSource {
    /// OAuth scope needed to list this source.
    pub fn scope(&self) -> &'static str {
        match self {
            PickSource::Picker => PICKER_SCOPE,
            PickSource::Album(_) => LIBRARY_SCOPE,
        }
    }
}
