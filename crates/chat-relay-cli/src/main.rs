//! Terminal chat client: streams replies from a local Ollama model.
//!
//! Ctrl-C cancels the reply in progress; the partial text stays in the
//! conversation. In interactive mode `/reset` starts a new chat and `/quit`
//! exits.

mod cli;

use std::io::Write as _;
use std::sync::Arc;

use chat_relay::prelude::*;
use chat_relay::vendors::ollama::OllamaTransport;
use clap::Parser as _;
use tokio::io::{AsyncBufReadExt as _, BufReader};
use tracing::info;

use crate::cli::Cli;

/// Load .env from the crate dir or current dir.
fn load_env() {
    if let Ok(canon) = std::path::Path::new(env!("CARGO_MANIFEST_DIR"))
        .join(".env")
        .canonicalize()
    {
        let _ = dotenvy::from_path(canon);
    }
    let _ = dotenvy::dotenv();
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    load_env();
    let cli = Cli::parse();
    chat_relay::observability::init_with(cli.log_settings());

    let config = cli.client_config()?;
    info!(base_url = %config.base_url, model = %config.model, "connecting");
    let transport = OllamaTransport::new(config)?;

    let mut session = ChatSession::new(StreamRelay::new(Arc::new(transport)));
    if let Some(system) = cli.system.as_deref() {
        session = session.system_prompt(system);
    }

    if let Some(prompt) = cli.prompt.as_deref() {
        let outcome = run_turn(&mut session, prompt, cli.stats).await?;
        if let RelayOutcome::Failed(_) = outcome {
            std::process::exit(1);
        }
        return Ok(());
    }

    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    loop {
        print!("> ");
        std::io::stdout().flush()?;
        let Some(line) = lines.next_line().await? else {
            break;
        };
        match line.trim() {
            "" => continue,
            "/quit" | "/exit" => break,
            "/reset" => {
                session.reset();
                println!("(new chat)");
            }
            _ => {
                run_turn(&mut session, &line, cli.stats).await?;
            }
        }
    }
    Ok(())
}

/// Submits one turn and prints the reply as it streams.
async fn run_turn(
    session: &mut ChatSession,
    text: &str,
    show_stats: bool,
) -> Result<RelayOutcome, ClientError> {
    let turn = session.begin_turn(text)?;

    let cancel = turn.cancel_handle();
    let watcher = tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            cancel.cancel();
        }
    });

    let mut printer = RelayCallbacks::new(
        |chunk: &str| {
            print!("{chunk}");
            let _ = std::io::stdout().flush();
        },
        |message: &str| eprintln!("\n{message}"),
        || println!(),
    );
    let outcome = turn.complete_with(&mut printer).await;
    watcher.abort();

    match &outcome {
        RelayOutcome::Completed(stats) if show_stats => print_stats(stats),
        RelayOutcome::Cancelled => println!("\n(cancelled)"),
        _ => {}
    }
    Ok(outcome)
}

fn print_stats(stats: &CompletionStats) {
    let rate = stats
        .tokens_per_second()
        .map(|tps| format!("{tps:.1} tokens/s"))
        .unwrap_or_else(|| "n/a".to_string());
    println!(
        "[{} tokens in {:.2}s, {rate}, prompt {} tokens]",
        stats.eval_count,
        stats.total().as_secs_f64(),
        stats.prompt_eval_count
    );
}
