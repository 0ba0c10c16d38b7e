//! halluval CLI - Hallucination variant generation and LLM-judge scoring.

use anyhow::{Context, Result, bail};
use clap::{Parser, Subcommand};
use halluval::engine::JudgeEngine;
use halluval::models::{Config, JudgeScore, ModelSpec};
use halluval::{BatchRunner, LLMClient, TextGenerator};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{Level, info};
use tracing_subscriber::FmtSubscriber;

const DEFAULT_CONFIG: &str = "halluval.toml";

#[derive(Parser)]
#[command(name = "halluval")]
#[command(version)]
#[command(about = "Generate hallucinated answer variants and score them with an LLM judge")]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Path to configuration file (defaults apply when halluval.toml is absent)
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    /// Verbose output
    #[arg(short, long, global = true)]
    verbose: bool,
}

#[derive(Subcommand)]
enum Commands {
    /// Generate and score variants for every example in a file
    Run {
        /// Path to input examples (JSONL or JSON array)
        #[arg(short, long)]
        input: PathBuf,

        /// Path to output JSONL file
        #[arg(short, long)]
        output: PathBuf,

        /// Generator model id
        #[arg(long)]
        model: Option<String>,

        /// Judge model id
        #[arg(long)]
        judge_model: Option<String>,

        /// Examples processed concurrently
        #[arg(long)]
        concurrency: Option<usize>,

        /// Abort on the first failed example
        #[arg(long)]
        fail_fast: bool,
    },

    /// Judge a single submission against an expert answer
    Judge {
        /// Expert (correct) answer
        #[arg(long)]
        expert: String,

        /// Answer under evaluation
        #[arg(long)]
        submission: String,

        /// Context passage
        #[arg(long, default_value = "")]
        context: String,

        /// Question being answered
        #[arg(long, default_value = "")]
        question: String,

        /// Judge model id
        #[arg(long)]
        judge_model: Option<String>,
    },

    /// Validate configuration file
    Validate {
        /// Also ping the endpoint's /models route
        #[arg(long)]
        check_endpoint: bool,
    },

    /// Show example configuration
    Example,
}

fn setup_logging(verbose: bool) -> Result<()> {
    let level = if verbose { Level::DEBUG } else { Level::INFO };
    let subscriber = FmtSubscriber::builder()
        .with_max_level(level)
        .with_target(false)
        .with_thread_ids(false)
        .compact()
        .finish();
    tracing::subscriber::set_global_default(subscriber).context("Failed to set subscriber")
}

fn load_config(path: Option<&Path>) -> Result<Config> {
    let config = match path {
        Some(path) => Config::from_file(path)
            .with_context(|| format!("Failed to load config from {path:?}"))?,
        None if Path::new(DEFAULT_CONFIG).exists() => Config::from_file(Path::new(DEFAULT_CONFIG))
            .with_context(|| format!("Failed to load config from {DEFAULT_CONFIG}"))?,
        None => {
            info!("No {DEFAULT_CONFIG} found, using defaults");
            Config::default()
        }
    };
    Ok(config)
}

fn build_client(config: &Config) -> Result<Arc<LLMClient>> {
    let client = LLMClient::from_config(config).context("Failed to create client")?;
    Ok(Arc::new(client))
}

fn print_example_config() {
    let example = r#"# halluval configuration file

[endpoint]
# API key (can also use the variable named by api_key_env)
# api_key = "${OPENAI_API_KEY}"
api_key_env = "OPENAI_API_KEY"
base_url = "https://api.openai.com/v1"
timeout_secs = 120
# Attempts per request; 1 disables retries
max_retries = 1

[endpoint.headers]
# "X-Org" = "${ORG_ID}"

[generator]
id = "gpt-4o-mini"
input_price_per_1m = 0.15
output_price_per_1m = 0.60

[judge]
id = "gpt-4o-mini"
input_price_per_1m = 0.15
output_price_per_1m = 0.60

[generation]
hallucination_temperature = 1.0
partial_temperature = 0.7
max_tokens = 200

[judging]
temperature = 0.0
max_tokens = 500

[pipeline]
concurrency = 4
fail_fast = false

[output]
track_costs = true
"#;
    println!("{example}");
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    setup_logging(cli.verbose)?;

    match cli.command {
        Commands::Example => {
            print_example_config();
            return Ok(());
        }

        Commands::Validate { check_endpoint } => {
            let config = load_config(cli.config.as_deref())?;
            config.validate().context("Invalid configuration")?;

            let api_key = config
                .resolve_api_key(false)
                .context("Failed to resolve API key")?;

            info!("Configuration is valid");
            info!("  Endpoint: {}", config.endpoint.base_url);
            info!(
                "  API key: {}",
                if api_key.is_some() { "set" } else { "not set" }
            );
            info!("  Generator: {}", config.generator.id);
            info!("  Judge: {}", config.judge.id);
            info!("  Concurrency: {}", config.pipeline.concurrency);

            if check_endpoint {
                let client = build_client(&config)?;
                let health = client.health_check().await;
                match health.latency_ms {
                    Some(ms) => info!("  Endpoint status: {} ({ms}ms)", health.status),
                    None => info!("  Endpoint status: {}", health.status),
                }
                if let Some(error) = health.error {
                    bail!("Endpoint check failed: {error}");
                }
            }
            return Ok(());
        }

        Commands::Judge {
            expert,
            submission,
            context,
            question,
            judge_model,
        } => {
            let mut config = load_config(cli.config.as_deref())?;
            if let Some(id) = judge_model {
                config.judge = ModelSpec::named(id);
            }
            config.validate().context("Invalid configuration")?;

            let client = build_client(&config)?;
            let judge = JudgeEngine::from_config(client.clone(), &config);
            let verdict = judge
                .judge(&expert, &submission, &context, &question)
                .await
                .context("Judge call failed")?;
            let score = JudgeScore::from_verdict(&verdict);

            println!("Choice:    {}", score.choice());
            println!("Score:     {}", score.score());
            if score.parse_defaulted() {
                println!("Note:      judge output had no valid choice, defaulted");
            }
            println!("Reasoning: {}", score.reasoning());
            println!("Cost:      ${:.6}", client.usage().cost_usd);
        }

        Commands::Run {
            input,
            output,
            model,
            judge_model,
            concurrency,
            fail_fast,
        } => {
            let mut config = load_config(cli.config.as_deref())?;

            // CLI overrides
            if let Some(id) = model {
                config.generator = ModelSpec::named(id);
            }
            if let Some(id) = judge_model {
                config.judge = ModelSpec::named(id);
            }
            if let Some(n) = concurrency {
                config.pipeline.concurrency = n;
            }
            config.pipeline.fail_fast |= fail_fast;
            config.validate().context("Invalid configuration")?;

            let client = build_client(&config)?;
            let runner = BatchRunner::new(client, &config);
            let examples = BatchRunner::load_examples(&input)
                .with_context(|| format!("Failed to load examples from {input:?}"))?;

            let stats = runner.run(examples, &output).await?;

            println!("\n=== Hallucination Scoring Complete ===");
            println!("Examples:      {}", stats.total_examples);
            println!("Completed:     {}", stats.total_completed);
            println!("Failed:        {}", stats.total_failed);
            println!("Parse default: {}", stats.judge_parse_defaults);
            println!("Original:      {:.3}", stats.original.mean_score);
            println!("Hallucination: {:.3}", stats.hallucination.mean_score);
            println!("Partial:       {:.3}", stats.partial.mean_score);
            println!("Throughput:    {:.0}/hr", stats.throughput_per_hour);
            println!(
                "Tokens:        {} in / {} out",
                stats.input_tokens, stats.output_tokens
            );
            println!("Cost:          ${:.4}", stats.cost_usd);
            println!("Runtime:       {:.1}s", stats.runtime_secs);
            println!("Output:        {output:?}");
        }
    }

    Ok(())
}
