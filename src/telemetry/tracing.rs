use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter, Registry};

const DEFAULT_FILTER: &str = "info,mailora_sends=debug";

/// Installs the global subscriber; `RUST_LOG` overrides the default filter.
pub fn init_tracing() {
    let env_filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(DEFAULT_FILTER));
    let fmt_layer = fmt::layer().with_target(false);

    if Registry::default().with(env_filter).with(fmt_layer).try_init().is_err() {
        return;
    }

    ::tracing::debug!("Tracing initialized");
}
