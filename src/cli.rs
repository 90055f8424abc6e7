use std::path::PathBuf;

use clap::{Parser, Subcommand};
use meterbook::Config;

#[derive(Parser)]
#[command(author, version = env!("APP_VERSION"), about, propagate_version = true)]
pub struct Args {
    /// YAML configuration file; the default locations are probed when omitted.
    #[clap(long, short = 'c', env = "METERBOOK_CONFIG")]
    pub config: Option<PathBuf>,

    #[clap(flatten)]
    pub credentials: CredentialArgs,

    #[command(subcommand)]
    pub command: Command,
}

/// Secrets are usually easier to pass through the environment than the config file.
#[derive(Parser)]
pub struct CredentialArgs {
    #[clap(long = "email", env = "METERBOOK_EMAIL")]
    pub email: Option<String>,

    #[clap(long = "password", env = "METERBOOK_PASSWORD", hide_env_values = true)]
    pub password: Option<String>,

    #[clap(long = "api-key", env = "METERBOOK_API_KEY", hide_env_values = true)]
    pub api_key: Option<String>,

    #[clap(long = "contract-id", env = "METERBOOK_CONTRACT_ID")]
    pub contract_id: Option<String>,
}

impl CredentialArgs {
    pub fn apply(&self, config: &mut Config) {
        if let Some(email) = &self.email {
            config.api.email.clone_from(email);
        }
        if let Some(password) = &self.password {
            config.api.password.clone_from(password);
        }
        if let Some(api_key) = &self.api_key {
            config.api.api_key.clone_from(api_key);
        }
        if let Some(contract_id) = &self.contract_id {
            config.contract_id.clone_from(contract_id);
        }
    }
}

#[derive(Subcommand)]
pub enum Command {
    /// Keep the cache up to date in the background until interrupted.
    #[clap(name = "run")]
    Run,

    /// Run a single sync cycle and exit.
    #[clap(name = "sync")]
    Sync {
        /// Ignore the per-resolution sync cadence.
        #[clap(long)]
        force: bool,
    },

    /// Print what the cache currently holds.
    #[clap(name = "status")]
    Status,

    /// Write the cached hourly records of the last days as a Markdown table.
    #[clap(name = "export-hourly")]
    ExportHourly {
        #[clap(long, short = 'o', default_value = "hourly_usage.md")]
        output: PathBuf,

        /// Number of days before today to include.
        #[clap(long, default_value = "10")]
        days: u32,
    },
}
