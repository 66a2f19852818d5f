//! CLI entry point: run one debate against configured backends.

use anyhow::{Context, Result};
use clap::Parser;
use std::sync::Arc;
use tracing_subscriber::EnvFilter;

use oliver_debate::{
    run_debate, DebateConfig, DebateRequest, HttpSearchProvider, OpenAiCompatProvider,
};

#[derive(Parser, Debug)]
#[command(name = "oliver-debate", about = "Speculative multi-agent debate for course Q&A")]
struct Cli {
    /// The question to answer.
    query: String,

    /// Course whose indexed material to search.
    #[arg(long, default_value = "default")]
    course_id: String,

    /// Reuse a caller-supplied session id.
    #[arg(long)]
    session_id: Option<String>,

    /// Override the round budget.
    #[arg(long)]
    max_rounds: Option<u32>,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let mut config = DebateConfig::from_env();
    if let Some(max_rounds) = cli.max_rounds {
        config.max_debate_rounds = max_rounds;
    }

    let default_level = if config.enable_debug_logging {
        "oliver_debate=debug"
    } else {
        "oliver_debate=info"
    };
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level)),
        )
        .init();

    let search_url =
        std::env::var("OLIVER_SEARCH_URL").context("OLIVER_SEARCH_URL is not set")?;
    let llm_url = std::env::var("OLIVER_LLM_URL").context("OLIVER_LLM_URL is not set")?;
    let llm_model =
        std::env::var("OLIVER_LLM_MODEL").unwrap_or_else(|_| "gpt-4o-mini".to_string());
    let llm_api_key = std::env::var("OLIVER_LLM_API_KEY").ok();

    let search = Arc::new(HttpSearchProvider::new(&search_url, config.stage_timeout())?);
    let provider = Arc::new(OpenAiCompatProvider::new(
        &llm_url,
        llm_api_key,
        &llm_model,
        config.stage_timeout(),
    )?);

    let request = DebateRequest {
        query: cli.query,
        course_id: cli.course_id,
        session_id: cli.session_id,
    };
    let response = run_debate(request, config, search, provider).await?;

    println!("{}", serde_json::to_string_pretty(&response)?);
    Ok(())
}
