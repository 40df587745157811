//! Structured logging setup
//!
//! Installs a global `tracing-subscriber` registry from [`LoggingConfig`],
//! with one formatting layer per enabled output. `RUST_LOG` overrides the
//! configured level when set.

use crate::config::LoggingConfig;
use crate::error::{NodeError, Result};
use std::fs::OpenOptions;
use std::sync::Mutex;
use tracing::info;
use tracing_subscriber::fmt::{self, MakeWriter};
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{EnvFilter, Layer, Registry};

type BoxedLayer = Box<dyn Layer<Registry> + Send + Sync + 'static>;

fn output_layer<W>(writer: W, json: bool, ansi: bool) -> BoxedLayer
where
    W: for<'w> MakeWriter<'w> + Send + Sync + 'static,
{
    let layer = fmt::layer()
        .with_target(true)
        .with_ansi(ansi)
        .with_writer(writer);

    if json {
        layer.json().boxed()
    } else {
        layer.boxed()
    }
}

/// Build one layer per enabled output.
fn output_layers(config: &LoggingConfig) -> Result<Vec<BoxedLayer>> {
    let mut layers = Vec::with_capacity(2);

    if config.log_to_console {
        layers.push(output_layer(std::io::stdout, config.json_format, true));
    }

    if config.log_to_file {
        let path = config.log_file_path.as_deref().ok_or_else(|| {
            NodeError::ConfigError("log_file_path must be specified when log_to_file is true".into())
        })?;
        let file = OpenOptions::new().create(true).append(true).open(path)?;
        layers.push(output_layer(Mutex::new(file), config.json_format, false));
    }

    Ok(layers)
}

/// Install the global subscriber.
///
/// Returns `Ok(false)` when nothing was installed: either both outputs are
/// disabled or a subscriber is already set. Calling this more than once is
/// harmless.
pub fn init_logging(config: &LoggingConfig) -> Result<bool> {
    let layers = output_layers(config)?;
    if layers.is_empty() {
        return Ok(false);
    }

    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(config.log_level.as_str().to_ascii_lowercase()));

    let installed = tracing_subscriber::registry()
        .with(layers)
        .with(filter)
        .try_init()
        .is_ok();

    if installed {
        info!(
            app = %config.app_name,
            level = %config.log_level,
            console = config.log_to_console,
            file = config.log_to_file,
            "Logging initialized"
        );
    }
    Ok(installed)
}
