use std::path::PathBuf;

use once_cell::sync::OnceCell;
use tracing_subscriber::EnvFilter;
use tracing_subscriber::layer::SubscriberExt as _;
use tracing_subscriber::util::SubscriberInitExt as _;

static INIT: OnceCell<()> = OnceCell::new();

const FALLBACK_FILTER: &str = "info";
const DEFAULT_JSON_LOG_FILE: &str = "duet.logs.jsonl";

/// Where and how much to log, resolved once at startup.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct LogSettings {
    /// `false` installs no subscriber at all.
    pub enabled: bool,
    /// `EnvFilter` directive, e.g. `info` or `duet_harness=debug`.
    pub filter: String,
    /// JSONL destination. `None` logs compact lines to stderr so stdout
    /// stays free for conversation output.
    pub json_path: Option<PathBuf>,
}

impl LogSettings {
    /// Reads `DUET_OBSERVABILITY_ENABLED`, `DUET_LOG_LEVEL` (then `RUST_LOG`)
    /// and `DUET_JSON_LOG_PATH`. `default_filter` applies when no filter
    /// variable is set.
    pub fn from_env(default_filter: &str) -> Self {
        Self::resolve(default_filter, |key| std::env::var(key).ok())
    }

    fn resolve(default_filter: &str, var: impl Fn(&str) -> Option<String>) -> Self {
        let set = |key: &str| {
            var(key)
                .map(|value| value.trim().to_string())
                .filter(|value| !value.is_empty())
        };
        Self {
            enabled: set("DUET_OBSERVABILITY_ENABLED").is_none_or(|flag| !is_off(&flag)),
            filter: set("DUET_LOG_LEVEL")
                .or_else(|| set("RUST_LOG"))
                .unwrap_or_else(|| default_filter.to_string()),
            json_path: set("DUET_JSON_LOG_PATH").map(PathBuf::from),
        }
    }

    /// Overrides the filter directive.
    pub fn filter(mut self, filter: impl Into<String>) -> Self {
        self.filter = filter.into();
        self
    }

    fn env_filter(&self) -> EnvFilter {
        EnvFilter::try_new(&self.filter).unwrap_or_else(|err| {
            eprintln!("ignoring invalid log filter {:?}: {err}", self.filter);
            EnvFilter::new(FALLBACK_FILTER)
        })
    }
}

fn is_off(flag: &str) -> bool {
    matches!(
        flag.to_ascii_lowercase().as_str(),
        "0" | "false" | "no" | "off" | "disabled"
    )
}

/// Installs the global subscriber described by `settings`.
///
/// Only the first call in a process has an effect; a subscriber installed
/// elsewhere is left in place.
pub fn init_observability(settings: LogSettings) {
    INIT.get_or_init(|| {
        if !settings.enabled {
            return;
        }
        let filter = settings.env_filter();
        match &settings.json_path {
            Some(path) => {
                let dir = path
                    .parent()
                    .filter(|p| !p.as_os_str().is_empty())
                    .unwrap_or_else(|| std::path::Path::new("."));
                let _ = std::fs::create_dir_all(dir);
                let file_name = path
                    .file_name()
                    .and_then(|n| n.to_str())
                    .unwrap_or(DEFAULT_JSON_LOG_FILE);
                let json = tracing_subscriber::fmt::layer()
                    .json()
                    .with_current_span(true)
                    .with_span_list(true)
                    .with_target(false)
                    .with_writer(tracing_appender::rolling::never(dir, file_name));
                let _ = tracing_subscriber::registry()
                    .with(filter)
                    .with(json)
                    .try_init();
            }
            None => {
                let console = tracing_subscriber::fmt::layer()
                    .compact()
                    .with_target(false)
                    .with_writer(std::io::stderr);
                let _ = tracing_subscriber::registry()
                    .with(filter)
                    .with(console)
                    .try_init();
            }
        }
    });
}
