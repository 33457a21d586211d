//! Subscriber installation.
//!
//! One filter, one formatting layer, one writer. The writer is boxed so
//! the format choice is the only thing that changes the layer's type.

use std::path::{Path, PathBuf};
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use tracing_appender::rolling::{RollingFileAppender, Rotation};
use tracing_subscriber::filter::{Directive, ParseError};
use tracing_subscriber::fmt::format::{DefaultFields, Format, Full};
use tracing_subscriber::fmt::time::FormatTime;
use tracing_subscriber::fmt::writer::BoxMakeWriter;
use tracing_subscriber::layer::{Layered, SubscriberExt};
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{EnvFilter, Layer, Registry, fmt};

use crate::error::{TelemetryError, TelemetryResult};

/// How often a file target starts a new file.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FileRotation {
    /// New file each day.
    #[default]
    Daily,
    /// New file each hour.
    Hourly,
    /// A single file.
    Never,
}

impl FileRotation {
    fn rotation(self) -> Rotation {
        match self {
            Self::Daily => Rotation::DAILY,
            Self::Hourly => Rotation::HOURLY,
            Self::Never => Rotation::NEVER,
        }
    }
}

/// Line layout of each event.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    /// Multi-line, for terminals.
    Pretty,
    /// One short line per event.
    #[default]
    Compact,
    /// One JSON object per line, for log shippers.
    Json,
    /// The `tracing-subscriber` default layout.
    Full,
}

impl FromStr for LogFormat {
    type Err = TelemetryError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        [Self::Pretty, Self::Compact, Self::Json, Self::Full]
            .into_iter()
            .find(|format| format.name() == s)
            .ok_or_else(|| TelemetryError::ConfigError(format!("unknown log format '{s}'")))
    }
}

impl LogFormat {
    /// Name as written in configuration.
    #[must_use]
    pub const fn name(self) -> &'static str {
        match self {
            Self::Pretty => "pretty",
            Self::Compact => "compact",
            Self::Json => "json",
            Self::Full => "full",
        }
    }
}

/// Where events are written.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogTarget {
    /// Process stdout.
    Stdout,
    /// Process stderr.
    #[default]
    Stderr,
    /// Rolling files in a directory.
    File(PathBuf),
}

/// Everything needed to install the subscriber.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LogConfig {
    /// Base level or filter expression, e.g. `"info"`.
    pub level: String,
    /// Event layout.
    pub format: LogFormat,
    /// Destination.
    pub target: LogTarget,
    /// File name prefix under [`LogTarget::File`].
    pub file_prefix: String,
    /// Rotation under [`LogTarget::File`].
    pub rotation: FileRotation,
    /// Prefix each event with the wall-clock time.
    pub timestamps: bool,
    /// Color output.
    pub ansi: bool,
    /// Per-target overrides such as `cyper_events=debug`.
    pub directives: Vec<String>,
}

impl Default for LogConfig {
    fn default() -> Self {
        Self::new("info")
    }
}

impl LogConfig {
    /// Compact stderr output at `level`.
    #[must_use]
    pub fn new(level: impl Into<String>) -> Self {
        Self {
            level: level.into(),
            format: LogFormat::Compact,
            target: LogTarget::Stderr,
            file_prefix: "cyper".to_owned(),
            rotation: FileRotation::Daily,
            timestamps: true,
            ansi: true,
            directives: Vec::new(),
        }
    }

    /// Use `format`.
    #[must_use]
    pub fn with_format(self, format: LogFormat) -> Self {
        Self { format, ..self }
    }

    /// Write to `target`.
    #[must_use]
    pub fn with_target(self, target: LogTarget) -> Self {
        Self { target, ..self }
    }

    /// Rolling files named `prefix.*` under `directory`, without colors.
    #[must_use]
    pub fn with_file_logging(
        self,
        directory: impl Into<PathBuf>,
        prefix: impl Into<String>,
    ) -> Self {
        Self {
            target: LogTarget::File(directory.into()),
            file_prefix: prefix.into(),
            ansi: false,
            ..self
        }
    }

    /// Append a filter directive.
    #[must_use]
    pub fn with_directive(mut self, directive: impl Into<String>) -> Self {
        self.directives.push(directive.into());
        self
    }

    /// Omit timestamps, e.g. when a supervisor already adds them.
    #[must_use]
    pub fn without_timestamps(self) -> Self {
        Self {
            timestamps: false,
            ..self
        }
    }

    fn filter(&self) -> TelemetryResult<EnvFilter> {
        let invalid = |e: ParseError| TelemetryError::ConfigError(e.to_string());
        let mut filter = EnvFilter::try_new(&self.level).map_err(invalid)?;
        for directive in &self.directives {
            filter = filter.add_directive(directive.parse::<Directive>().map_err(invalid)?);
        }
        Ok(filter)
    }

    fn writer(&self) -> TelemetryResult<BoxMakeWriter> {
        Ok(match &self.target {
            LogTarget::Stdout => BoxMakeWriter::new(std::io::stdout),
            LogTarget::Stderr => BoxMakeWriter::new(std::io::stderr),
            LogTarget::File(dir) => BoxMakeWriter::new(rolling_file(
                dir,
                &self.file_prefix,
                self.rotation,
            )?),
        })
    }
}

fn rolling_file(
    dir: &Path,
    prefix: &str,
    rotation: FileRotation,
) -> TelemetryResult<RollingFileAppender> {
    std::fs::create_dir_all(dir)?;
    Ok(RollingFileAppender::new(rotation.rotation(), dir, prefix))
}

type Filtered = Layered<EnvFilter, Registry>;
type BoxedLayer = Box<dyn Layer<Filtered> + Send + Sync>;
type PlainLayer<T> = fmt::Layer<Filtered, DefaultFields, Format<Full, T>, BoxMakeWriter>;

fn styled<T>(layer: PlainLayer<T>, format: LogFormat) -> BoxedLayer
where
    T: FormatTime + Send + Sync + 'static,
{
    match format {
        LogFormat::Pretty => layer.pretty().boxed(),
        LogFormat::Compact => layer.compact().boxed(),
        LogFormat::Json => layer.json().boxed(),
        LogFormat::Full => layer.boxed(),
    }
}

/// Install the global subscriber described by `config`.
///
/// # Errors
///
/// Fails on an invalid filter, an unusable log directory, or when a global
/// subscriber is already installed.
pub fn setup_logging(config: &LogConfig) -> TelemetryResult<()> {
    let filter = config.filter()?;
    let layer = fmt::layer()
        .with_writer(config.writer()?)
        .with_ansi(config.ansi);
    let layer = if config.timestamps {
        styled(layer, config.format)
    } else {
        styled(layer.without_time(), config.format)
    };

    tracing_subscriber::registry()
        .with(filter)
        .with(layer)
        .try_init()
        .map_err(|e| TelemetryError::InitError(e.to_string()))
}
