//! CLI argument parsing and command routing

use std::path::PathBuf;

use clap::{Args, Parser, Subcommand};

use crate::{
    config::AdapterConfig,
    error::Result,
    messages::ConversationMessage,
    services::{GenerationOptions, GenerationRequest, PayloadMode},
};

/// localchat: talk to a local Ollama daemon
#[derive(Debug, Parser)]
#[command(name = "localchat")]
#[command(about = "Chat with local models served by Ollama", long_about = None)]
#[command(version)]
pub struct Cli {
    /// Enable verbose output
    #[arg(short, long, global = true)]
    pub verbose: bool,

    /// Config file to use instead of the default location
    #[arg(long, global = true, value_name = "PATH")]
    pub config: Option<PathBuf>,

    /// Daemon URL (overrides OLLAMA_HOST and the config file)
    #[arg(long, global = true, value_name = "URL")]
    pub host: Option<String>,

    /// Request timeout in seconds
    #[arg(long, global = true, value_name = "SECS")]
    pub timeout: Option<u64>,

    /// Subcommand to execute
    #[command(subcommand)]
    pub command: Commands,
}

/// Available commands
#[derive(Debug, Subcommand)]
pub enum Commands {
    /// Send a prompt and print the answer
    Chat(ChatArgs),

    /// Send a pre-formatted prompt verbatim (no template applied)
    Raw(RawArgs),

    /// List installed models
    Models {
        /// Print the listing as JSON
        #[arg(long)]
        json: bool,
    },

    /// Print the effective configuration
    Config {
        /// Write the effective configuration to the config file
        #[arg(long)]
        save: bool,
    },

    /// Show version information
    Version,
}

#[derive(Debug, Args)]
pub struct ChatArgs {
    /// The prompt (a `<|role|>` transcript with --legacy)
    pub prompt: String,

    /// System prompt
    #[arg(short, long)]
    pub system: Option<String>,

    /// Model to use (defaults to the configured model)
    #[arg(short, long)]
    pub model: Option<String>,

    /// Payload shape: chat or completion
    #[arg(long, default_value = "chat")]
    pub mode: PayloadMode,

    /// Parse the prompt as a legacy `<|system|>/<|user|>/<|assistant|>` transcript
    #[arg(long, conflicts_with = "system")]
    pub legacy: bool,

    /// Stream the answer from the daemon
    #[arg(long)]
    pub stream: bool,

    #[arg(long)]
    pub temperature: Option<f32>,

    #[arg(long)]
    pub top_p: Option<f32>,

    #[arg(long)]
    pub top_k: Option<u32>,

    /// Maximum number of tokens to generate
    #[arg(long)]
    pub max_tokens: Option<i32>,

    /// Stop sequence (repeatable)
    #[arg(long)]
    pub stop: Vec<String>,

    /// Print the model's reasoning to stderr
    #[arg(long)]
    pub show_reasoning: bool,

    /// Print the full response as JSON
    #[arg(long)]
    pub json: bool,
}

#[derive(Debug, Args)]
pub struct RawArgs {
    /// Fully formatted prompt, sent as is
    pub prompt: String,

    /// Model to use (defaults to the configured model)
    #[arg(short, long)]
    pub model: Option<String>,

    /// Stop sequence (repeatable)
    #[arg(long)]
    pub stop: Vec<String>,

    /// Stream the answer from the daemon
    #[arg(long)]
    pub stream: bool,

    /// Print the full response as JSON
    #[arg(long)]
    pub json: bool,
}

impl Cli {
    /// Parse CLI arguments from environment
    #[must_use]
    pub fn parse_args() -> Self {
        Self::parse()
    }

    /// Effective configuration: file, then environment, then flags
    ///
    /// # Errors
    ///
    /// Returns an error if the config file cannot be loaded or the result
    /// does not validate
    pub fn load_config(&self) -> Result<AdapterConfig> {
        let mut config = AdapterConfig::load_from_path(&self.config_path())?;
        config.apply_env(|key| std::env::var(key).ok())?;
        self.apply_overrides(&mut config);
        config.validate()?;
        Ok(config)
    }

    /// Config file in use: `--config` or the default location
    #[must_use]
    pub fn config_path(&self) -> PathBuf {
        self.config
            .clone()
            .unwrap_or_else(AdapterConfig::config_path)
    }

    /// Apply the global flags on top of a loaded configuration
    pub fn apply_overrides(&self, config: &mut AdapterConfig) {
        if let Some(host) = &self.host {
            config.base_url = crate::config::normalize_host(host);
        }
        if let Some(timeout) = self.timeout {
            config.timeout_secs = timeout;
        }
    }
}

impl ChatArgs {
    /// The request described by the flags
    #[must_use]
    pub fn to_request(&self) -> GenerationRequest {
        let model = self.model.clone().unwrap_or_default();

        let request = if self.legacy {
            GenerationRequest::legacy(model, self.prompt.clone(), self.mode)
        } else {
            let mut messages = Vec::with_capacity(2);
            if let Some(system) = &self.system {
                messages.push(ConversationMessage::system(system.clone()));
            }
            messages.push(ConversationMessage::user(self.prompt.clone()));

            match self.mode {
                PayloadMode::Chat => GenerationRequest::chat(model, messages),
                PayloadMode::Completion => GenerationRequest::completion(model, messages),
            }
        };

        request
            .with_stream(self.stream)
            .with_options(GenerationOptions {
                temperature: self.temperature,
                top_p: self.top_p,
                top_k: self.top_k,
                num_predict: self.max_tokens,
                stop: (!self.stop.is_empty()).then(|| self.stop.clone()),
                ..GenerationOptions::default()
            })
    }
}

impl RawArgs {
    #[must_use]
    pub fn to_request(&self) -> GenerationRequest {
        GenerationRequest::raw(self.model.clone().unwrap_or_default(), self.prompt.clone())
            .with_stream(self.stream)
            .with_options(GenerationOptions {
                stop: (!self.stop.is_empty()).then(|| self.stop.clone()),
                ..GenerationOptions::default()
            })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::messages::Role;

    fn parse(args: &[&str]) -> Cli {
        Cli::try_parse_from(args).unwrap()
    }

    #[test]
    fn test_chat_args() {
        let cli = parse(&[
            "localchat",
            "chat",
            "Hi",
            "--system",
            "Be brief",
            "--temperature",
            "0.2",
            "--stop",
            "\n\n",
            "--stop",
            "END",
        ]);

        let Commands::Chat(args) = cli.command else {
            panic!("expected chat command");
        };
        let request = args.to_request();

        assert_eq!(request.mode, PayloadMode::Chat);
        assert_eq!(request.messages.len(), 2);
        assert_eq!(request.messages[0].role(), Role::System);
        assert_eq!(request.messages[1].content(), "Hi");
        assert_eq!(request.options.temperature, Some(0.2));
        assert_eq!(
            request.options.stop,
            Some(vec!["\n\n".to_string(), "END".to_string()])
        );
        assert!(request.model.is_empty());
    }

    #[test]
    fn test_legacy_chat_args() {
        let cli = parse(&[
            "localchat",
            "chat",
            "<|user|>Hi",
            "--legacy",
            "--mode",
            "completion",
            "--model",
            "llama3.2",
        ]);

        let Commands::Chat(args) = cli.command else {
            panic!("expected chat command");
        };
        let request = args.to_request();

        assert_eq!(request.prompt.as_deref(), Some("<|user|>Hi"));
        assert!(request.messages.is_empty());
        assert_eq!(request.mode, PayloadMode::Completion);
        assert_eq!(request.model, "llama3.2");
        assert!(request.options.is_empty());
    }

    #[test]
    fn test_legacy_conflicts_with_system() {
        assert!(Cli::try_parse_from(["localchat", "chat", "x", "--legacy", "--system", "s"]).is_err());
    }

    #[test]
    fn test_raw_args() {
        let cli = parse(&["localchat", "raw", "<|im_start|>user\nHi", "--stop", "<|im_end|>", "--stream"]);

        let Commands::Raw(args) = cli.command else {
            panic!("expected raw command");
        };
        let request = args.to_request();

        assert!(request.raw);
        assert!(request.stream);
        assert_eq!(request.options.stop, Some(vec!["<|im_end|>".to_string()]));
    }

    #[test]
    fn test_global_overrides() {
        let cli = parse(&["localchat", "--host", "gpu-box:11434", "--timeout", "30", "models"]);

        let mut config = AdapterConfig::default();
        cli.apply_overrides(&mut config);

        assert_eq!(config.base_url, "http://gpu-box:11434");
        assert_eq!(config.timeout_secs, 30);
    }

    #[test]
    fn test_invalid_mode() {
        assert!(Cli::try_parse_from(["localchat", "chat", "x", "--mode", "embed"]).is_err());
    }
}
