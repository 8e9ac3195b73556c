//! Logging plugin.
//!
//! Provides [`TracingPlugin`], which installs the `tracing` subscriber the
//! whole host logs through and exposes its setup as host state.
//!
//! # Lifecycle
//!
//! - **`build()`** inserts the [`TracingConfig`] state so other plugins can
//!   read the intended configuration during build.
//! - **`ready()`** installs the subscriber from whatever [`TracingConfig`]
//!   the host holds by then, so plugins built later can still adjust it.
//!
//! # Example
//!
//! ```
//! use keystone_host::host::Host;
//! use keystone_core::{HostInfoPlugin, TracingConfig, TracingFormat, TracingPlugin};
//! use tracing::Level;
//!
//! let mut host = Host::new();
//! host.add_plugins(HostInfoPlugin).add_plugins(
//!     TracingPlugin::new()
//!         .with_format(TracingFormat::Compact)
//!         .with_resource_level(Level::DEBUG),
//! );
//! host.finish().unwrap();
//!
//! let config = host.state::<TracingConfig>().unwrap();
//! assert_eq!(config.directives(), "info,keystone_resources=debug");
//! ```

use keystone_host::host::Host;
use keystone_host::plugin::{Plugin, PluginId};
use keystone_host::state::HostState;
use tracing::Level;
use tracing_subscriber::fmt::format::FmtSpan;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{EnvFilter, Layer, Registry};

use crate::HostInfoPlugin;

/// Target of the resource lifecycle logs.
const RESOURCES_TARGET: &str = "keystone_resources";

// ─────────────────────────────────────────────────────────────────────────────
// TracingFormat
// ─────────────────────────────────────────────────────────────────────────────

/// Log output format.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum TracingFormat {
    /// Multi-line output for a console attached to the server.
    #[default]
    Pretty,
    /// One line per event, for server log files.
    Compact,
    /// JSON lines for log shippers.
    Json,
}

// ─────────────────────────────────────────────────────────────────────────────
// TracingConfig
// ─────────────────────────────────────────────────────────────────────────────

/// The logging setup the host runs with.
#[derive(Debug, Clone)]
pub struct TracingConfig {
    /// Level for everything without a more specific directive.
    pub level: Level,
    /// Level for resource lifecycle events, when it differs from `level`.
    pub resource_level: Option<Level>,
    /// Output format.
    pub format: TracingFormat,
    /// Extra filter directives.
    pub env_filter: Option<String>,
}

impl HostState for TracingConfig {}

impl TracingConfig {
    /// The filter directives this configuration installs.
    ///
    /// ```
    /// use keystone_core::{TracingConfig, TracingFormat};
    /// use tracing::Level;
    ///
    /// let config = TracingConfig {
    ///     level: Level::WARN,
    ///     resource_level: Some(Level::DEBUG),
    ///     format: TracingFormat::Compact,
    ///     env_filter: Some("keystone_host=info".into()),
    /// };
    /// assert_eq!(config.directives(), "warn,keystone_resources=debug,keystone_host=info");
    /// ```
    #[must_use]
    pub fn directives(&self) -> String {
        let mut directives = vec![self.level.as_str().to_lowercase()];
        if let Some(level) = self.resource_level {
            directives.push(format!("{RESOURCES_TARGET}={}", level.as_str().to_lowercase()));
        }
        if let Some(extra) = self.env_filter.as_deref().filter(|extra| !extra.is_empty()) {
            directives.push(extra.to_string());
        }
        directives.join(",")
    }

    fn filter(&self) -> EnvFilter {
        EnvFilter::try_new(self.directives())
            .unwrap_or_else(|_| EnvFilter::new(self.level.as_str()))
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// TracingPlugin
// ─────────────────────────────────────────────────────────────────────────────

/// Installs the global `tracing` subscriber.
///
/// # State Provided
///
/// | State | Description |
/// |-------|-------------|
/// | [`TracingConfig`] | The logging setup (read-only) |
///
/// # Dependencies
///
/// - [`HostInfoPlugin`]
///
/// # Configuration Options
///
/// ```
/// use keystone_core::{TracingFormat, TracingPlugin};
/// use tracing::Level;
///
/// // Console: pretty output, resource transitions in detail
/// let console = TracingPlugin::default()
///     .with_resource_level(Level::DEBUG)
///     .with_span_events(true);
///
/// // Dedicated server: one line per event, no colors, quiet host runtime
/// let dedicated = TracingPlugin::default()
///     .with_format(TracingFormat::Compact)
///     .with_ansi(false)
///     .with_env_filter("keystone_host=warn");
/// ```
#[derive(Clone)]
pub struct TracingPlugin {
    config: TracingConfig,
    span_events: bool,
    ansi: bool,
}

impl Default for TracingPlugin {
    fn default() -> Self {
        Self {
            config: TracingConfig {
                level: Level::INFO,
                resource_level: None,
                format: TracingFormat::Pretty,
                env_filter: None,
            },
            span_events: false,
            ansi: true,
        }
    }
}

impl TracingPlugin {
    /// Creates a `TracingPlugin` logging at `INFO`.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the default level.
    #[must_use]
    pub fn with_level(mut self, level: Level) -> Self {
        self.config.level = level;
        self
    }

    /// Sets the level of resource lifecycle events independently.
    #[must_use]
    pub fn with_resource_level(mut self, level: Level) -> Self {
        self.config.resource_level = Some(level);
        self
    }

    /// Sets the output format.
    #[must_use]
    pub fn with_format(mut self, format: TracingFormat) -> Self {
        self.config.format = format;
        self
    }

    /// Appends filter directives, `target=level,...`.
    ///
    /// An unparsable filter falls back to the default level.
    #[must_use]
    pub fn with_env_filter(mut self, filter: impl Into<String>) -> Self {
        self.config.env_filter = Some(filter.into());
        self
    }

    /// Logs span enter and exit.
    #[must_use]
    pub fn with_span_events(mut self, enabled: bool) -> Self {
        self.span_events = enabled;
        self
    }

    /// Enables or disables ANSI colors.
    #[must_use]
    pub fn with_ansi(mut self, enabled: bool) -> Self {
        self.ansi = enabled;
        self
    }

    fn output_layer(&self) -> Box<dyn Layer<Registry> + Send + Sync> {
        let span_events = if self.span_events {
            FmtSpan::ENTER | FmtSpan::EXIT
        } else {
            FmtSpan::NONE
        };
        let layer = tracing_subscriber::fmt::layer()
            .with_ansi(self.ansi)
            .with_span_events(span_events);

        match self.config.format {
            TracingFormat::Pretty => layer.pretty().boxed(),
            TracingFormat::Compact => layer.compact().boxed(),
            TracingFormat::Json => layer.json().boxed(),
        }
    }
}

impl Plugin for TracingPlugin {
    fn build(&self, host: &mut Host) {
        host.insert_state(self.config.clone());
    }

    fn ready(&self, host: &mut Host) {
        // Other plugins may have adjusted the config during build.
        let config = host
            .state::<TracingConfig>()
            .cloned()
            .unwrap_or_else(|| self.config.clone());

        // try_init fails when a global subscriber is already installed; keep it.
        let installed = tracing_subscriber::registry()
            .with(self.output_layer())
            .with(config.filter())
            .try_init()
            .is_ok();

        tracing::info!(
            directives = %config.directives(),
            format = ?config.format,
            installed,
            "logging initialized"
        );
    }

    fn cleanup(&self, _host: &mut Host) {
        tracing::info!("logging shutting down");
    }

    fn dependencies(&self) -> Vec<PluginId> {
        vec![PluginId::of::<HostInfoPlugin>()]
    }
}
