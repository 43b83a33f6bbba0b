use std::path::PathBuf;

use clap::Args;

use service::process::{init_tracing, spawn_service, ProcessError};
use service::{Config, ConfigError, ConfigFile};

#[derive(Args, Debug, Clone)]
pub struct Relay {
    /// Directory holding the database and uploaded files
    pub store: Option<PathBuf>,

    /// Port to listen on (default 6455)
    #[arg(long, short)]
    pub port: Option<u16>,

    /// Default log level; RUST_LOG still wins when set
    #[arg(long)]
    pub log_level: Option<String>,

    /// Hex public key allowed to publish and upload; repeatable
    #[arg(long = "poster")]
    pub posters: Vec<String>,

    /// Second-level host label that marks content requests
    #[arg(long)]
    pub gateway_label: Option<String>,
}

#[derive(Debug, thiserror::Error)]
pub enum RelayError {
    #[error(transparent)]
    Config(#[from] ConfigError),
    #[error(transparent)]
    Process(#[from] ProcessError),
}

impl Relay {
    /// Flags win over the file; posters from both are accepted
    fn apply(&self, mut file: ConfigFile) -> ConfigFile {
        if let Some(store) = &self.store {
            file.store = Some(store.clone());
        }
        if let Some(port) = self.port {
            file.port = Some(port);
        }
        if let Some(level) = &self.log_level {
            file.log_level = Some(level.clone());
        }
        if let Some(label) = &self.gateway_label {
            file.gateway_label = Some(label.clone());
        }
        file.posters.extend(self.posters.iter().cloned());
        file
    }

    fn config(&self, ctx: &crate::cli::op::OpContext) -> Result<Config, RelayError> {
        let file = self.apply(ctx.config_file()?);
        Ok(file.into_config(&ctx.cwd)?)
    }
}

#[async_trait::async_trait]
impl crate::cli::op::Op for Relay {
    type Error = RelayError;
    type Output = String;

    async fn execute(&self, ctx: &crate::cli::op::OpContext) -> Result<Self::Output, Self::Error> {
        let config = self.config(ctx)?;
        let _guard = init_tracing(config.log_level);
        tracing::info!(addr = %config.listen_addr, "starting relay");

        spawn_service(&config).await?;
        Ok("relay stopped".to_string())
    }
}
