use std::time::Duration;

use chat_relay::{ClientError, LogSettings};
use chat_relay::vendors::ollama::OllamaClientConfig;
use clap::{ArgAction, Parser};

#[derive(Parser, Debug)]
#[command(name = "chat-relay")]
#[command(version, about = "Chat with a local Ollama model, streaming replies as they arrive")]
pub struct Cli {
    /// Ollama server address (overrides OLLAMA_HOST)
    #[arg(long)]
    pub host: Option<String>,

    /// Model name (overrides OLLAMA_MODEL)
    #[arg(short, long)]
    pub model: Option<String>,

    /// System prompt sent ahead of every turn
    #[arg(short, long)]
    pub system: Option<String>,

    /// How long the server keeps the model loaded (e.g. "5m")
    #[arg(long)]
    pub keep_alive: Option<String>,

    /// Overall request timeout in seconds
    #[arg(long)]
    pub timeout_secs: Option<u64>,

    /// Increase log verbosity (-v info, -vv debug, -vvv trace)
    #[arg(short, long, action = ArgAction::Count)]
    pub verbose: u8,

    /// Write JSONL logs to this file instead of stderr
    #[arg(long)]
    pub log_file: Option<std::path::PathBuf>,

    /// Print completion statistics after each reply
    #[arg(long)]
    pub stats: bool,

    /// Send a single prompt and exit instead of starting an interactive session
    pub prompt: Option<String>,
}

impl Cli {
    /// Log settings from the environment, raised by `-v` and `--log-file`.
    pub fn log_settings(&self) -> LogSettings {
        let settings = LogSettings::from_env().verbosity(self.verbose);
        match self.log_file.as_ref() {
            Some(path) => settings.json_log_path(path.clone()),
            None => settings,
        }
    }

    /// Resolves the client config: environment first, then explicit flags.
    pub fn client_config(&self) -> Result<OllamaClientConfig, ClientError> {
        let mut config = OllamaClientConfig::from_env()?;
        if let Some(host) = self.host.as_deref() {
            config = config.base_url(host);
        }
        if let Some(model) = self.model.as_deref() {
            config = config.model(model);
        }
        if let Some(keep_alive) = self.keep_alive.as_deref() {
            config = config.keep_alive(keep_alive);
        }
        if let Some(secs) = self.timeout_secs {
            config = config.request_timeout(Duration::from_secs(secs));
        }
        config.validate()?;
        Ok(config)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn flags_override_config() {
        let cli = Cli::try_parse_from([
            "chat-relay",
            "--host",
            "127.0.0.1:9999",
            "--model",
            "mistral",
            "--keep-alive",
            "10m",
            "--timeout-secs",
            "30",
            "hello there",
        ])
        .expect("parse");
        assert_eq!(cli.prompt.as_deref(), Some("hello there"));

        let config = cli.client_config().expect("config");
        assert_eq!(config.base_url, "http://127.0.0.1:9999");
        assert_eq!(config.model, "mistral");
        assert_eq!(config.keep_alive.as_deref(), Some("10m"));
        assert_eq!(config.request_timeout, Some(Duration::from_secs(30)));
    }

    #[test]
    fn verbosity_and_log_file_shape_log_settings() {
        let cli = Cli::try_parse_from(["chat-relay", "-vv", "--log-file", "relay.jsonl"])
            .expect("parse");
        assert_eq!(cli.verbose, 2);
        let settings = cli.log_settings();
        assert_eq!(settings.filter.as_deref(), Some("debug"));
        assert_eq!(
            settings.json_log_path,
            Some(std::path::PathBuf::from("relay.jsonl"))
        );
    }

    #[test]
    fn interactive_mode_without_prompt() {
        let cli = Cli::try_parse_from(["chat-relay", "--stats"]).expect("parse");
        assert!(cli.prompt.is_none());
        assert!(cli.stats);
    }
}
