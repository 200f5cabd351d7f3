//! localchat binary entry point

use std::io::Write;

use color_eyre::Result;
use futures::TryStreamExt;
use localchat_rs::{
    cli::{ChatArgs, Cli, Commands, RawArgs},
    services::streaming::{StreamAccumulator, VisibleTextFilter},
    GenerationRequest, GenerationResponse, OllamaAdapter,
};
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> Result<()> {
    // Install error handler
    color_eyre::install()?;
    dotenv::dotenv().ok();

    let cli = Cli::parse_args();

    // Logs go to stderr so answers can be piped
    let filter = if cli.verbose {
        EnvFilter::new("localchat_rs=debug,localchat=debug")
    } else {
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn"))
    };
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();

    match &cli.command {
        Commands::Chat(args) => run_chat(&cli, args).await?,
        Commands::Raw(args) => run_raw(&cli, args).await?,
        Commands::Models { json } => {
            let adapter = OllamaAdapter::new(cli.load_config()?)?;
            let models = adapter.list_models().await?;
            if *json {
                println!("{}", serde_json::to_string_pretty(&models)?);
            } else if models.is_empty() {
                println!("No models installed. Pull one with `ollama pull <model>`.");
            } else {
                for model in models {
                    println!(
                        "{:<32} {:>10} {}",
                        model.name, model.details.parameter_size, model.details.quantization_level
                    );
                }
            }
        }
        Commands::Config { save } => {
            let config = cli.load_config()?;
            if *save {
                let path = cli.config_path();
                config.save_to_path(&path)?;
                eprintln!("Saved configuration to {}", path.display());
            }
            println!("{}", serde_json::to_string_pretty(&config)?);
        }
        Commands::Version => {
            println!("localchat-rs version {}", env!("CARGO_PKG_VERSION"));
        }
    }

    Ok(())
}

async fn run_chat(cli: &Cli, args: &ChatArgs) -> Result<()> {
    let adapter = OllamaAdapter::new(cli.load_config()?)?;
    let request = args.to_request();

    if args.stream && !args.json {
        let response = print_stream(&adapter, &request).await?;
        if args.show_reasoning {
            print_reasoning(&response);
        }
        return Ok(());
    }

    let response = adapter.generate(&request).await?;
    if args.json {
        println!("{}", serde_json::to_string_pretty(&response)?);
    } else {
        if args.show_reasoning {
            print_reasoning(&response);
        }
        println!("{}", response.text);
    }
    Ok(())
}

async fn run_raw(cli: &Cli, args: &RawArgs) -> Result<()> {
    let adapter = OllamaAdapter::new(cli.load_config()?)?;
    let request = args.to_request();

    if args.stream && !args.json {
        print_stream(&adapter, &request).await?;
        return Ok(());
    }

    let response = adapter.generate(&request).await?;
    if args.json {
        println!("{}", serde_json::to_string_pretty(&response)?);
    } else {
        println!("{}", response.text);
    }
    Ok(())
}

/// Print visible text as it arrives, holding it back while a reasoning block is open
async fn print_stream(
    adapter: &OllamaAdapter,
    request: &GenerationRequest,
) -> Result<GenerationResponse> {
    let mut chunks = adapter.stream(request).await?;
    let mut accumulator = StreamAccumulator::new(request.mode);
    let mut filter = VisibleTextFilter::new();
    let mut stdout = std::io::stdout();

    while let Some(chunk) = chunks.try_next().await? {
        let visible = filter.push(&chunk.text);
        if !visible.is_empty() {
            write!(stdout, "{visible}")?;
            stdout.flush()?;
        }

        if accumulator.push(chunk) {
            break;
        }
    }

    let rest = filter.finish()?;
    writeln!(stdout, "{rest}")?;
    tracing::debug!(chunks = accumulator.chunk_count(), "stream finished");

    Ok(GenerationResponse::try_from(accumulator.finish()?)?)
}

fn print_reasoning(response: &GenerationResponse) {
    if let Some(reasoning) = response.reasoning.as_deref().filter(|r| !r.is_empty()) {
        eprintln!("[reasoning]\n{reasoning}\n[/reasoning]");
    }
}
