use crate::settings::Log;
use anyhow::{Result, anyhow};
use tracing_subscriber::{
    EnvFilter, Registry, fmt, layer::SubscriberExt, reload, util::SubscriberInitExt,
};

pub struct LogConfig {
    pub filter: String,
}

impl From<&Log> for LogConfig {
    fn from(log: &Log) -> Self {
        LogConfig {
            filter: log.filter.clone(),
        }
    }
}

/// Owns the reload handle of the global subscriber's filter.
pub struct Logger {
    reload_handle: reload::Handle<EnvFilter, Registry>,
}

impl Logger {
    /// Installs the global subscriber at `RUST_LOG`, or `info` when unset, so
    /// that settings parsing is itself logged.
    pub fn new_bootstrap() -> Result<Self> {
        let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
        let (filter, reload_handle) = reload::Layer::new(filter);

        tracing_subscriber::registry()
            .with(filter)
            .with(fmt::layer().with_target(true))
            .try_init()
            .map_err(|e| anyhow!(e))?;

        Ok(Self { reload_handle })
    }

    pub fn reload_from_config(&self, config: &LogConfig) -> Result<()> {
        let filter = EnvFilter::try_new(&config.filter).map_err(|e| anyhow!(e))?;
        self.reload_handle.reload(filter).map_err(|e| anyhow!(e))?;
        Ok(())
    }
}
