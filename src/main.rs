use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{bail, Context, Result};
use clap::Parser;
use rand::thread_rng;
use tracing::{error, info};

use lurelens::{
    build_client, chat, constants, prompt, web_server, Corpus, Defender, LlmConfig, Orchestrator, Provider,
    Role, SimulationConfig, StyleSample,
};

// Define the command-line interface structure using clap
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
#[command(propagate_version = true)]
struct Cli {
    #[command(flatten)]
    llm: LlmArgs,

    #[command(subcommand)]
    command: Commands,
}

/// Options shared by every subcommand.
#[derive(clap::Args, Debug)]
struct LlmArgs {
    #[arg(long, global = true, value_enum, default_value_t = Provider::Gemini, env = "LURELENS_PROVIDER", help = "Text-generation backend.")]
    provider: Provider,

    #[arg(long, global = true, env = "GEMINI_API_KEY", hide_env_values = true, help = "API key for the Gemini provider.")]
    api_key: Option<String>,

    #[arg(long, global = true, env = "LURELENS_MODEL", help = "Model name (provider default if omitted).")]
    model: Option<String>,

    #[arg(long, global = true, env = "LURELENS_BASE_URL", help = "Override the provider base URL.")]
    base_url: Option<String>,

    #[arg(long, global = true, env = "LURELENS_CORPUS", default_value = constants::DEFAULT_CORPUS_PATH, help = "JSONL style corpus.")]
    corpus: PathBuf,

    #[arg(long, global = true, default_value_t = constants::DEFAULT_CONTEXT_WINDOW, help = "Trailing turns included in each prompt.")]
    context_window: usize,

    #[arg(long, global = true, default_value_t = constants::DEFAULT_REQUEST_TIMEOUT_SECS, help = "Per-request timeout in seconds.")]
    timeout_secs: u64,

    #[arg(long, global = true, help = "Do not prefix generated turns with [SIMULATION].")]
    no_simulation_marker: bool,
}

impl LlmArgs {
    fn llm_config(&self) -> LlmConfig {
        let mut config =
            LlmConfig::new(self.provider).with_timeout(Duration::from_secs(self.timeout_secs));
        if let Some(key) = &self.api_key {
            config = config.with_api_key(key.clone());
        }
        if let Some(model) = &self.model {
            config = config.with_model(model.clone());
        }
        if let Some(url) = &self.base_url {
            config = config.with_base_url(url.clone());
        }
        config
    }

    fn simulation_config(&self) -> SimulationConfig {
        SimulationConfig {
            context_window: self.context_window,
            simulation_marker: !self.no_simulation_marker,
        }
    }
}

// Define the available subcommands
#[derive(clap::Subcommand, Debug)]
enum Commands {
    /// Start the web UI.
    Serve {
        #[arg(long, default_value_t = constants::DEFAULT_PORT, help = "Port for the web server.")]
        port: u16,
    },
    /// Run a simulated conversation in the terminal.
    Simulate {
        #[arg(long, help = "Generate this many turns and exit instead of prompting.")]
        turns: Option<usize>,
        #[arg(long, default_value = "attacker", help = "Role that speaks first (attacker or victim).")]
        starting_role: String,
        #[arg(long, help = "Style excerpt to use instead of sampling the corpus.")]
        style_sample: Option<String>,
    },
    /// Analyse a message you received for catphishing red flags.
    Defend {
        #[arg(help = "The message to analyse (do NOT include passwords or codes).")]
        message: String,
    },
    /// Ask the model for synthetic, labelled dialogues in corpus JSONL format.
    Augment {
        #[arg(long, default_value_t = 5, help = "Number of dialogues to generate.")]
        count: usize,
    },
}

// The main entry point of the application, using tokio's async runtime
#[tokio::main]
async fn main() -> Result<()> {
    // Load .env file if present (for GEMINI_API_KEY and friends)
    dotenvy::dotenv().ok();

    // Reads log level from RUST_LOG (e.g., RUST_LOG=info,lurelens=debug)
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .init();

    let cli = Cli::parse();
    info!("Lurelens starting with command: {:?}", cli.command);

    let client = build_client(&cli.llm.llm_config()).context("Failed to initialize LLM client")?;
    let corpus = Arc::new(Corpus::load(&cli.llm.corpus)?);
    let orchestrator = Arc::new(
        Orchestrator::new(client.clone(), cli.llm.simulation_config())
            .context("Invalid simulation settings")?,
    );
    let defender = Arc::new(Defender::new(client.clone(), corpus.clone()));

    match cli.command {
        Commands::Serve { port } => {
            info!("Starting web UI on port {}...", port);
            let state = web_server::AppState::new(orchestrator, defender, corpus, "templates");

            let mut web_server_handle = tokio::spawn(async move {
                if let Err(e) = web_server::start_web_server(port, state).await {
                    error!("Web server failed: {:?}", e);
                }
            });

            let ctrl_c = tokio::signal::ctrl_c();
            tokio::pin!(ctrl_c);

            tokio::select! {
                _ = &mut ctrl_c => {
                    info!("Ctrl-C received, initiating shutdown...");
                }
                res = &mut web_server_handle => {
                    match res {
                        Ok(_) => info!("Web server task completed unexpectedly."),
                        Err(e) if e.is_panic() => error!("Web server task panicked: {:?}", e),
                        Err(e) => error!("Web server task failed: {:?}", e),
                    }
                }
            }

            if !web_server_handle.is_finished() {
                info!("Aborting web server task...");
                web_server_handle.abort();
            }
            info!("Shutdown complete.");
        }
        Commands::Simulate {
            turns,
            starting_role,
            style_sample,
        } => {
            let role: Role = starting_role.parse()?;
            let style = match style_sample {
                Some(text) => StyleSample::new(text),
                None => corpus.sample_style_text(&mut thread_rng()),
            };
            let mut session = orchestrator.start_session(role, style);
            match turns {
                Some(n) => chat::run_batch(&orchestrator, &mut session, n).await?,
                None => chat::run_interactive(&orchestrator, &mut session).await?,
            }
            let snapshot = orchestrator.end_session(&mut session);
            info!(
                turns = snapshot.turns.len(),
                annotations = snapshot.annotations.len(),
                "Simulation finished."
            );
        }
        Commands::Defend { message } => {
            let report = defender.analyze(&message).await?;
            if report.had_sensitive {
                println!("⚠️  Sensitive words were removed before analysis. Never share passwords or codes.");
            }
            if !report.flags.is_empty() {
                println!("🚩 Red flags detected:");
                for flag in &report.flags {
                    println!("- {}", flag.description);
                }
            }
            println!("{}", report.analysis);
        }
        Commands::Augment { count } => {
            if count == 0 {
                bail!("--count must be at least 1");
            }
            let generated = client
                .generate(&prompt::augmentation_prompt(count), &prompt::safety_rules())
                .await
                .context("Dataset augmentation failed")?;
            println!("{}", generated);
        }
    }

    Ok(())
}
