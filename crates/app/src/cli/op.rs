use std::error::Error;
use std::path::PathBuf;

use anyhow::Context;

use service::{ConfigError, ConfigFile};

/// What every command gets to work with
#[derive(Clone, Debug)]
pub struct OpContext {
    /// `--config`, when given
    pub config_path: Option<PathBuf>,
    /// Relative paths on the command line and in the config resolve here
    pub cwd: PathBuf,
}

impl OpContext {
    pub fn new(config_path: Option<PathBuf>) -> anyhow::Result<Self> {
        let cwd = std::env::current_dir().context("failed to read the current directory")?;
        Ok(Self { config_path, cwd })
    }

    /// The config file named by `--config`, or an empty one
    pub fn config_file(&self) -> Result<ConfigFile, ConfigError> {
        match &self.config_path {
            Some(path) => ConfigFile::load(&self.cwd.join(path)),
            None => Ok(ConfigFile::default()),
        }
    }
}

#[async_trait::async_trait]
pub trait Op: Send + Sync {
    type Error: Error + Send + Sync + 'static;
    type Output;

    async fn execute(&self, ctx: &OpContext) -> Result<Self::Output, Self::Error>;
}

#[macro_export]
macro_rules! command_enum {
    ($(($variant:ident, $type:ty)),* $(,)?) => {
        #[derive(Subcommand, Debug, Clone)]
        pub enum Command {
            $($variant($type),)*
        }

        #[derive(Debug)]
        pub enum OpOutput {
            $($variant(<$type as $crate::cli::op::Op>::Output),)*
        }

        #[derive(Debug, thiserror::Error)]
        pub enum OpError {
            $(
                #[error(transparent)]
                $variant(<$type as $crate::cli::op::Op>::Error),
            )*
        }

        #[async_trait::async_trait]
        impl $crate::cli::op::Op for Command {
            type Output = OpOutput;
            type Error = OpError;

            async fn execute(&self, ctx: &$crate::cli::op::OpContext) -> Result<Self::Output, Self::Error> {
                match self {
                    $(
                        Command::$variant(op) => {
                            op.execute(ctx).await
                                .map(OpOutput::$variant)
                                .map_err(OpError::$variant)
                        },
                    )*
                }
            }
        }

        impl std::fmt::Display for OpOutput {
            fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
                match self {
                    $(
                        OpOutput::$variant(output) => write!(f, "{}", output),
                    )*
                }
            }
        }
    };
}
