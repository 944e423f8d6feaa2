//! proxy-stack CLI - synthesize the LiteLLM proxy stack.

use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand, ValueEnum};
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

use proxy_cloud::aws::Aws;
use proxy_cloud::ContextCache;
use proxy_stack::config::DEFAULT_STACK_NAME;
use proxy_stack::document::DEFAULT_CONFIG_PATH;
use proxy_stack::{compose, write_assembly, ConfigDocument, StackConfig, TemplateFormat};

/// proxy-stack - CloudFormation synthesizer for the LiteLLM proxy.
#[derive(Parser)]
#[command(name = "proxy-stack")]
#[command(about = "Synthesize the LiteLLM proxy stack (ECS Fargate, RDS, ALB)")]
#[command(version)]
struct Cli {
    /// Stack name.
    #[arg(long, default_value = DEFAULT_STACK_NAME)]
    stack_name: String,

    /// Proxy configuration document uploaded to the config bucket.
    #[arg(long, default_value = DEFAULT_CONFIG_PATH)]
    config_file: PathBuf,

    /// File caching VPC lookups between runs.
    #[arg(long, default_value = "cdk.context.json")]
    context_file: PathBuf,

    /// Discard the cached lookup for `VPC_ID` and query AWS again.
    #[arg(long, default_value = "false")]
    refresh_context: bool,

    /// AWS CLI profile used for VPC lookups (or set `AWS_PROFILE`).
    #[arg(long, env = "AWS_PROFILE")]
    aws_profile: Option<String>,

    /// Enable verbose logging.
    #[arg(short, long, default_value = "false")]
    verbose: bool,

    /// Log output format.
    #[arg(long, value_enum, default_value_t = LogFormat::Text)]
    log_format: LogFormat,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Write the template and manifest to the output directory.
    Synth {
        /// Output directory.
        #[arg(short, long, default_value = "cdk.out")]
        output: PathBuf,

        /// Template format (json or yaml).
        #[arg(long, default_value = "json")]
        format: TemplateFormat,
    },

    /// List the resources the stack declares.
    Resources,
}

#[derive(Clone, Copy, ValueEnum)]
enum LogFormat {
    Text,
    Json,
}

fn init_tracing(verbose: bool, format: LogFormat) {
    let filter = if verbose {
        EnvFilter::new("debug")
    } else {
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"))
    };

    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr);
    match format {
        LogFormat::Text => builder.init(),
        LogFormat::Json => builder.json().init(),
    }
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    init_tracing(cli.verbose, cli.log_format);

    let config = StackConfig::from_env().with_stack_name(cli.stack_name.clone());
    let document = ConfigDocument::load(&cli.config_file)
        .with_context(|| format!("Failed to load {}", cli.config_file.display()))?;

    let mut aws = Aws::new();
    if let Some(region) = &config.region {
        aws = aws.with_region(region.clone());
    }
    if let Some(profile) = &cli.aws_profile {
        aws = aws.with_profile(profile.clone());
    }
    let lookup = ContextCache::open(
        aws,
        &cli.context_file,
        config.account.as_deref(),
        config.region.as_deref(),
    )
    .with_context(|| format!("Failed to open {}", cli.context_file.display()))?;

    if cli.refresh_context {
        match &config.vpc_id {
            Some(vpc_id) => lookup
                .invalidate(vpc_id)
                .context("Failed to update lookup context")?,
            None => warn!("--refresh-context has no effect without VPC_ID"),
        }
    }

    let synthesized = compose(&config, &document, &lookup).context("Stack composition failed")?;

    match cli.command {
        Commands::Synth { output, format } => {
            let files = write_assembly(&output, &synthesized, format)
                .context("Failed to write cloud assembly")?;
            info!(
                stack = %synthesized.name,
                warnings = synthesized.warnings.len(),
                "Synthesis complete"
            );
            println!("{}", files.template.display());
        }
        Commands::Resources => {
            println!("\n{:<60} {:<45}", "LOGICAL ID", "TYPE");
            println!("{}", "-".repeat(105));
            for (id, resource) in synthesized.template.resources() {
                println!("{:<60} {:<45}", id.as_str(), resource.resource_type);
            }
            println!(
                "\n{} resources, {} outputs",
                synthesized.template.resources().count(),
                synthesized.template.outputs().count()
            );
        }
    }

    Ok(())
}
