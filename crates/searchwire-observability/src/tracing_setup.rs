//! Tracing / logging initialisation helpers.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

/// Logging configuration: a global level plus per-crate overrides.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LogConfig {
    /// Level for everything without an override.
    #[serde(default = "default_level")]
    pub level: String,
    /// Override per component, e.g. `searchwire-core` → `debug`
    #[serde(default)]
    pub components: HashMap<String, String>,
    /// JSON lines instead of human-readable text.
    #[serde(default)]
    pub json: bool,
}

fn default_level() -> String {
    "info".to_string()
}

impl Default for LogConfig {
    fn default() -> Self {
        Self {
            level: default_level(),
            components: HashMap::new(),
            json: false,
        }
    }
}

impl LogConfig {
    /// Filter directives, e.g. `warn,searchwire_core=debug`. Components are
    /// sorted so the output is stable.
    pub fn directives(&self) -> String {
        let mut components: Vec<_> = self.components.iter().collect();
        components.sort();
        components
            .into_iter()
            .fold(self.level.clone(), |mut acc, (component, level)| {
                acc.push_str(&format!(",{}={}", component.replace('-', "_"), level));
                acc
            })
    }
}

/// Initialise the global subscriber. `RUST_LOG`, when set, overrides the
/// configured levels. Call once at startup; later calls are ignored.
pub fn init_tracing(config: &LogConfig) {
    let filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(config.directives()))
        .unwrap_or_else(|_| EnvFilter::new("info"));

    let installed = if config.json {
        tracing_subscriber::registry()
            .with(filter)
            .with(fmt::layer().json().with_writer(std::io::stderr))
            .try_init()
    } else {
        tracing_subscriber::registry()
            .with(filter)
            .with(fmt::layer().with_writer(std::io::stderr))
            .try_init()
    };
    if installed.is_err() {
        tracing::debug!("tracing subscriber already installed");
    }
}
