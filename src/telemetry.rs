//! Log output for the binary.
//!
//! Filtering follows `RUST_LOG` and defaults to `info`. Spans opened by the
//! server (`rpc.connection`, `rpc.dispatch`) show up as context on every
//! event logged inside them.

use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

/// Install the global subscriber; `json` switches to JSON lines.
pub fn init_telemetry(json: bool) -> anyhow::Result<()> {
    let json_layer = json.then(|| tracing_subscriber::fmt::layer().json().with_target(true));
    let text_layer = (!json).then(|| tracing_subscriber::fmt::layer().with_target(true));

    tracing_subscriber::registry()
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| "info".into()))
        .with(json_layer)
        .with(text_layer)
        .try_init()?;

    Ok(())
}
