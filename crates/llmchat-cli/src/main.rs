use std::io::Write;
use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use futures::StreamExt;
use tokio::io::{AsyncBufReadExt, BufReader};
use tracing_subscriber::EnvFilter;

use llmchat::{ChatClient, ModelEntry};

#[derive(Parser)]
#[command(name = "llmchat", version, about = "Chat with models from OpenAI-compatible servers")]
struct Cli {
    /// Config file (JSON, or YAML by extension). Defaults to API_KEY/BASE_URL.
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    /// Model id or name to use instead of the first discovered model
    #[arg(short, long, global = true)]
    model: Option<String>,

    /// Only match --model against models owned by this provider
    #[arg(long, global = true, requires = "model")]
    server: Option<String>,

    /// System prompt for the conversation
    #[arg(short, long, global = true)]
    system: Option<String>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// List every discovered model
    Models,

    /// Send a single prompt and print the reply
    Chat {
        /// Print the reply as it arrives
        #[arg(long, conflicts_with = "json")]
        stream: bool,

        /// Ask the model for a JSON object
        #[arg(long)]
        json: bool,

        #[arg(required = true, trailing_var_arg = true)]
        prompt: Vec<String>,
    },

    /// Interactive session (/models, /model <id|name>, /reset, /exit)
    Repl {
        /// Print replies as they arrive
        #[arg(long)]
        stream: bool,
    },
}

#[derive(Clone, Copy)]
enum Mode {
    Blocking,
    Stream,
    Json,
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn")),
        )
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();

    let mut client = ChatClient::new(cli.config.as_deref())
        .await
        .context("failed to initialize chat client")?;

    if let Some(model) = &cli.model {
        match &cli.server {
            Some(server) => client.set_model_by_name_and_server(model, server)?,
            None => client.set_model(model.as_str())?,
        };
    }
    if let Some(system) = &cli.system {
        client.set_system_prompt(system);
    }

    match cli.command {
        Command::Models => print_models(&client),
        Command::Chat {
            stream,
            json,
            prompt,
        } => {
            let mode = if stream {
                Mode::Stream
            } else if json {
                Mode::Json
            } else {
                Mode::Blocking
            };
            send(&mut client, &prompt.join(" "), mode).await?;
        }
        Command::Repl { stream } => {
            let mode = if stream { Mode::Stream } else { Mode::Blocking };
            repl(&mut client, cli.system.as_deref(), mode).await?;
        }
    }

    Ok(())
}

fn print_models(client: &ChatClient) {
    let selected = client.selected_model().ok().map(|m| m.id);
    for model in client.available_models() {
        let marker = if Some(model.id) == selected { "*" } else { " " };
        println!("{marker}{}", describe(model));
    }
}

fn describe(model: &ModelEntry) -> String {
    format!(
        "{:>3}  {}  (provider: {}, server: {})",
        model.id, model.name, model.provider, model.server
    )
}

async fn send(client: &mut ChatClient, prompt: &str, mode: Mode) -> Result<()> {
    match mode {
        Mode::Blocking => println!("{}", client.chat(prompt).await?),
        Mode::Json => println!("{}", client.json_chat(prompt).await?),
        Mode::Stream => {
            let mut stream = client.stream_chat(prompt).await?;
            let mut stdout = std::io::stdout();
            while let Some(chunk) = stream.next().await {
                write!(stdout, "{}", chunk?)?;
                stdout.flush()?;
            }
            writeln!(stdout)?;
        }
    }
    Ok(())
}

async fn repl(client: &mut ChatClient, system: Option<&str>, mode: Mode) -> Result<()> {
    let mut lines = BufReader::new(tokio::io::stdin()).lines();

    loop {
        print!("> ");
        std::io::stdout().flush()?;

        let Some(line) = lines.next_line().await? else {
            break;
        };

        match line.trim() {
            "" => {}
            "/exit" | "/quit" => break,
            "/models" => print_models(client),
            "/reset" => {
                client.chat_cleanup();
                if let Some(system) = system {
                    client.set_system_prompt(system);
                }
            }
            cmd if cmd.starts_with("/model ") => {
                match client.set_model(cmd["/model ".len()..].trim()) {
                    Ok(model) => println!("using {}", describe(model)),
                    Err(e) => eprintln!("error: {e}"),
                }
            }
            prompt => {
                if let Err(e) = send(client, prompt, mode).await {
                    eprintln!("error: {e:#}");
                }
            }
        }
    }

    Ok(())
}
