use anyhow::{bail, Context, Result};
use clap::{Args, Parser, Subcommand};
use log::{info, warn};
use std::fs::File;
use std::io::{self, BufWriter, Write};
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::auth::ClientCredentials;
use crate::config::{BitbucketConfig, Config, OutputFormat};
use crate::output::{GatherProgress, MetricWriter, SummarySink};
use crate::providers::{BitbucketProvider, GatherSettings};

#[derive(Parser)]
#[command(name = "bbpulse")]
#[command(author, version, about = "Bitbucket pull request metrics", long_about = None)]
pub struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Configuration file (defaults to ./bbpulse.toml and friends)
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    /// Write records to this file instead of stdout
    #[arg(short, long, global = true)]
    output: Option<PathBuf>,

    #[arg(short, long, global = true, default_value_t = false)]
    pretty: bool,
}

#[derive(Subcommand)]
enum Commands {
    /// Run one gather cycle and emit a record per pull request
    Gather(GatherArgs),

    /// Write a default configuration file
    Init {
        #[arg(default_value = "bbpulse.toml")]
        path: PathBuf,

        /// Overwrite an existing file
        #[arg(long, default_value_t = false)]
        force: bool,
    },
}

/// Command line overrides for the `[bitbucket]` and `[output]` config sections.
#[derive(Args, Default)]
struct GatherArgs {
    /// Team or user account name
    #[arg(long)]
    owner: Option<String>,

    /// `team`, `user` or `repos`
    #[arg(short = 't', long)]
    gather_type: Option<String>,

    #[arg(long, env = "BITBUCKET_OAUTH_KEY")]
    oauth_key: Option<String>,

    #[arg(long, env = "BITBUCKET_OAUTH_SECRET", hide_env_values = true)]
    oauth_secret: Option<String>,

    #[arg(long)]
    base_url: Option<String>,

    /// Per-request timeout in seconds
    #[arg(long)]
    timeout: Option<u64>,

    /// Maximum concurrent per-entity fetches
    #[arg(long)]
    max_concurrency: Option<usize>,

    #[arg(short, long, value_enum)]
    format: Option<OutputFormat>,
}

impl GatherArgs {
    fn apply_to(&self, config: &mut Config) {
        let bitbucket = &mut config.bitbucket;
        if let Some(owner) = &self.owner {
            bitbucket.owner = Some(owner.clone());
        }
        if let Some(gather_type) = &self.gather_type {
            bitbucket.gather_type.clone_from(gather_type);
        }
        if let Some(key) = &self.oauth_key {
            bitbucket.oauth_key = Some(key.clone());
        }
        if let Some(secret) = &self.oauth_secret {
            bitbucket.oauth_secret = Some(secret.clone());
        }
        if let Some(base_url) = &self.base_url {
            bitbucket.api_base_url.clone_from(base_url);
        }
        if let Some(timeout) = self.timeout {
            bitbucket.http_timeout = timeout;
        }
        if self.max_concurrency.is_some() {
            bitbucket.max_concurrency = self.max_concurrency;
        }
        if let Some(format) = self.format {
            config.output.format = format;
        }
    }
}

fn gather_settings(config: &BitbucketConfig) -> Result<GatherSettings> {
    let Some(owner) = config.owner.clone().filter(|o| !o.is_empty()) else {
        bail!("No owner configured, pass --owner or set `owner` in the config file");
    };

    let credentials = match (&config.oauth_key, &config.oauth_secret) {
        (Some(key), Some(secret)) => Some(ClientCredentials {
            key: key.clone(),
            secret: secret.clone(),
            token_url: config.token_url.clone(),
        }),
        (None, None) => None,
        _ => bail!("Both an OAuth key and an OAuth secret are required"),
    };

    if config.max_concurrency == Some(0) {
        bail!("max-concurrency must be at least 1");
    }

    Ok(GatherSettings {
        owner,
        gather_type: config.gather_type.clone(),
        api_base_url: config.api_base_url.clone(),
        credentials,
        http_timeout: Duration::from_secs(config.http_timeout),
        max_concurrency: config.max_concurrency,
    })
}

impl Cli {
    async fn execute_gather(&self, args: &GatherArgs) -> Result<()> {
        let mut config = Config::load(self.config.as_deref())?;
        args.apply_to(&mut config);
        if self.pretty {
            config.output.pretty = true;
        }

        let settings = gather_settings(&config.bitbucket)?;
        let owner = settings.owner.clone();
        info!(
            "Collecting Bitbucket pull requests for {owner} ({})",
            settings.gather_type
        );

        let provider = BitbucketProvider::new(settings);
        let progress = GatherProgress::start(&owner, &config.bitbucket.gather_type);

        if config.output.format == OutputFormat::Summary {
            if self.output.is_some() {
                warn!("--output is ignored for the summary format");
            }

            let mut sink = SummarySink::default();
            if let Err(err) = provider.gather(&mut sink).await {
                progress.abandon(&err.to_string());
                return Err(err.into());
            }
            progress.finish(sink.records(), sink.errors());
            sink.print(&owner);
            return Ok(());
        }

        let out: Box<dyn Write> = match &self.output {
            Some(path) => Box::new(BufWriter::new(File::create(path).with_context(|| {
                format!("Failed to create output file: {}", path.display())
            })?)),
            None => Box::new(io::stdout().lock()),
        };

        let mut sink = MetricWriter::new(out, config.output.format, config.output.pretty);
        if let Err(err) = provider.gather(&mut sink).await {
            progress.abandon(&err.to_string());
            return Err(err.into());
        }
        progress.finish(sink.written(), sink.errors());
        sink.finish()?;

        if let Some(path) = &self.output {
            info!("Records written to: {}", path.display());
        }

        Ok(())
    }

    fn execute_init(path: &Path, force: bool) -> Result<()> {
        if path.exists() && !force {
            bail!(
                "{} already exists, pass --force to overwrite it",
                path.display()
            );
        }

        Config::default().save(path)?;
        info!("Configuration written to: {}", path.display());
        Ok(())
    }

    pub async fn execute(&self) -> Result<()> {
        match &self.command {
            Commands::Gather(args) => self.execute_gather(args).await,
            Commands::Init { path, force } => Self::execute_init(path, *force),
        }
    }
}
