use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

pub fn init_tracing(filter: &str) {
    let (env_filter, rejected) = match EnvFilter::try_new(filter) {
        Ok(parsed) => (parsed, None),
        Err(err) => (EnvFilter::new("info"), Some(err)),
    };
    tracing_subscriber::registry()
        .with(env_filter)
        .with(fmt::layer().with_target(false).compact())
        .init();
    if let Some(err) = rejected {
        tracing::warn!(filter, error = %err, "invalid log filter, using info");
    }
}
