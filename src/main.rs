// Copyright (c) 2025 Leonard Contributors
// Licensed under the MIT License. See LICENSE file for details.

use std::io::Write;
use std::time::Duration;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use colored::Colorize;
use indicatif::{ProgressBar, ProgressStyle};

use leonard_client::api::ApiClient;
use leonard_client::chat::Conversation;
use leonard_client::config::ClientConfig;
use leonard_client::download::{format_size, DownloadManager, DownloadPhase};
use leonard_client::resources::ResourceStore;

const VERSION: &str = env!("CARGO_PKG_VERSION");

#[derive(Parser)]
#[command(name = "leonard-client")]
#[command(version = VERSION)]
#[command(about = "Command-line client for the Leonard local inference service")]
#[command(propagate_version = true)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Backend URL (defaults to config file, then http://localhost:8000)
    #[arg(long, global = true)]
    url: Option<String>,
}

#[derive(Subcommand)]
enum Commands {
    /// Check whether the backend is up
    Health,

    /// Send a chat message and print the reply
    Chat {
        /// The message to send
        message: String,
        /// Continue an existing conversation
        #[arg(short, long)]
        conversation: Option<String>,
        /// Print the reply as it streams instead of waiting for the full turn
        #[arg(long)]
        stream: bool,
    },

    /// List installed and downloadable models
    Models,

    /// Search the model hub
    Search {
        /// Search query
        query: String,
        /// Maximum results
        #[arg(short, long, default_value_t = 10)]
        limit: usize,
    },

    /// Show featured models
    Featured,

    /// Download a model file and watch its progress
    Download {
        /// Repository (e.g. "acme/foo-gguf")
        repo_id: String,
        /// File within the repository
        filename: String,
    },

    /// Cancel an in-flight download
    Cancel {
        /// Download identifier from `download`
        download_id: String,
    },

    /// Install a registered model
    Install {
        /// Model identifier
        model_id: String,
    },

    /// Remove an installed model
    Remove {
        /// Model identifier
        model_id: String,
    },

    /// Clear server-side conversation state
    Clear,

    /// List tools and their enabled state
    Tools,

    /// Enable or disable one tool
    Tool {
        /// Tool identifier
        tool_id: String,
        /// Desired state
        #[arg(long)]
        enabled: bool,
    },

    /// List skills
    Skills,
}

#[tokio::main]
async fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("warn")),
        )
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();

    if let Err(e) = run(cli).await {
        eprintln!("{} {:#}", "Error:".red().bold(), e);
        std::process::exit(1);
    }
}

async fn run(cli: Cli) -> Result<()> {
    let mut config = ClientConfig::load().context("loading client config failed")?;
    if let Some(url) = cli.url {
        config = ClientConfig::with_base_url(url);
    }
    let client = ApiClient::new(&config);

    match cli.command {
        Commands::Health => cmd_health(&client).await,
        Commands::Chat {
            message,
            conversation,
            stream,
        } => cmd_chat(&client, message, conversation, stream).await,
        Commands::Models => cmd_models(&client).await,
        Commands::Search { query, limit } => cmd_search(&client, &query, limit).await,
        Commands::Featured => cmd_featured(client).await,
        Commands::Download { repo_id, filename } => {
            cmd_download(client, &config, &repo_id, &filename).await
        }
        Commands::Cancel { download_id } => cmd_cancel(client, &download_id).await,
        Commands::Install { model_id } => cmd_install(client, &model_id).await,
        Commands::Remove { model_id } => cmd_remove(client, &model_id).await,
        Commands::Clear => cmd_clear(client).await,
        Commands::Tools => cmd_tools(client).await,
        Commands::Tool { tool_id, enabled } => cmd_tool(client, &tool_id, enabled).await,
        Commands::Skills => cmd_skills(client).await,
    }
}

async fn cmd_health(client: &ApiClient) -> Result<()> {
    match client.health().await {
        Ok(health) => {
            println!("{} backend is {}", "[OK]".green(), health.status);
            Ok(())
        }
        Err(e) => {
            println!("{} backend unreachable", "[X]".red());
            Err(e).context("health check failed")
        }
    }
}

async fn cmd_chat(
    client: &ApiClient,
    message: String,
    conversation_id: Option<String>,
    stream: bool,
) -> Result<()> {
    let mut conversation = match conversation_id {
        Some(id) => Conversation::with_id(id),
        None => Conversation::new(),
    };

    if stream {
        let reply = conversation
            .stream_reply_with(client, &message, |fragment| {
                print!("{}", fragment);
                let _ = std::io::stdout().flush();
            })
            .await
            .context("streaming chat failed")?;
        println!();
        if let Some(model) = reply.model_name {
            println!("{}", format!("[{}]", model).dimmed());
        }
    } else {
        let reply = conversation
            .send(client, &message)
            .await
            .context("chat failed")?;
        println!("{}", reply.content);
        if let Some(model) = reply.model_name {
            println!("{}", format!("[{}]", model).dimmed());
        }
    }
    Ok(())
}

async fn cmd_models(client: &ApiClient) -> Result<()> {
    let models = client.list_models().await.context("listing models failed")?;
    if models.is_empty() {
        println!("No models registered.");
        return Ok(());
    }
    for model in models {
        let marker = if model.is_downloaded {
            "[*]".green()
        } else {
            "[ ]".dimmed()
        };
        println!("{} {:<32} {}", marker, model.id.bold(), model.name);
    }
    Ok(())
}

async fn cmd_search(client: &ApiClient, query: &str, limit: usize) -> Result<()> {
    let hits = client
        .search_models(query, limit)
        .await
        .context("model search failed")?;
    if hits.is_empty() {
        println!("No results for \"{}\".", query);
        return Ok(());
    }
    for hit in hits {
        println!(
            "{:<40} {} downloads, {} likes",
            hit.repo_id.bold(),
            hit.downloads,
            hit.likes
        );
        for file in hit.gguf_files.iter().take(3) {
            println!("    {} ({})", file.filename, format_size(file.size));
        }
    }
    Ok(())
}

async fn cmd_featured(client: ApiClient) -> Result<()> {
    let store = ResourceStore::new(client);
    let featured = store.load_featured().await;
    if featured.is_empty() {
        println!("No featured models available.");
        return Ok(());
    }
    for hit in featured {
        println!("{:<40} {} downloads", hit.repo_id.bold(), hit.downloads);
    }
    Ok(())
}

async fn cmd_download(
    client: ApiClient,
    config: &ClientConfig,
    repo_id: &str,
    filename: &str,
) -> Result<()> {
    let resources = ResourceStore::new(client.clone());
    let manager = DownloadManager::new(client, resources, config);

    let handle = manager
        .start(repo_id, filename)
        .await
        .context("starting download failed")?;
    println!("Download started: {}", handle.download_id().bold());

    let bar = ProgressBar::new(100);
    bar.set_style(
        ProgressStyle::default_bar()
            .template("{bar:40.cyan/blue} {percent}% {msg}")
            .unwrap_or_else(|_| ProgressStyle::default_bar()),
    );
    bar.enable_steady_tick(Duration::from_millis(200));

    // Drive the bar off the latest task state until it goes terminal.
    let task = loop {
        let task = handle.progress();
        bar.set_position(task.progress_percent.clamp(0.0, 100.0) as u64);
        bar.set_message(format!(
            "{} {}",
            task.status.as_str(),
            task.progress_display()
        ));
        if task.status.is_terminal() {
            break task;
        }
        tokio::time::sleep(Duration::from_millis(250)).await;
    };
    bar.finish_and_clear();

    match task.status {
        DownloadPhase::Completed => {
            println!(
                "{} downloaded {} ({})",
                "[OK]".green(),
                task.filename.bold(),
                format_size(task.total_bytes)
            );
            if let Some(model_id) = task.model_id {
                println!("Registered as {}", model_id.bold());
            }
            Ok(())
        }
        DownloadPhase::Cancelled => {
            println!("{} download cancelled", "[!]".yellow());
            Ok(())
        }
        _ => {
            let detail = task.error.unwrap_or_else(|| "unknown error".to_string());
            anyhow::bail!("download failed: {}", detail)
        }
    }
}

async fn cmd_cancel(client: ApiClient, download_id: &str) -> Result<()> {
    // One-shot cancel against the server; there is no local task to update
    // in a fresh process.
    client
        .cancel_download(download_id)
        .await
        .context("cancel failed")?;
    println!("{} cancel requested for {}", "[OK]".green(), download_id);
    Ok(())
}

async fn cmd_install(client: ApiClient, model_id: &str) -> Result<()> {
    let store = ResourceStore::new(client);
    let response = store
        .install_model(model_id)
        .await
        .context("model install failed")?;
    if let Some(message) = response.message {
        println!("{} {}", "[OK]".green(), message);
    } else {
        println!("{} installed {}", "[OK]".green(), model_id.bold());
    }
    Ok(())
}

async fn cmd_clear(client: ApiClient) -> Result<()> {
    client.clear_chat().await.context("clearing chat failed")?;
    println!("{} conversation cleared", "[OK]".green());
    Ok(())
}

async fn cmd_remove(client: ApiClient, model_id: &str) -> Result<()> {
    let store = ResourceStore::new(client);
    store
        .remove_model(model_id)
        .await
        .context("model removal failed")?;
    println!("{} removed {}", "[OK]".green(), model_id.bold());
    Ok(())
}

async fn cmd_tools(client: ApiClient) -> Result<()> {
    let store = ResourceStore::new(client);
    store.refresh_all().await;
    if let Some(e) = store.last_error() {
        eprintln!("{} some resources failed to load: {}", "[!]".yellow(), e);
    }
    let tools = store.tools();
    if tools.is_empty() {
        println!("No tools available.");
        return Ok(());
    }
    for tool in tools {
        let marker = if tool.enabled {
            "[on] ".green()
        } else {
            "[off]".dimmed()
        };
        println!("{} {:<24} {}", marker, tool.id.bold(), tool.description);
    }
    match store.chat_tools_enabled().await {
        Ok(enabled) => println!(
            "\nTool execution in chat: {}",
            if enabled { "enabled".green() } else { "disabled".red() }
        ),
        Err(e) => eprintln!("{} could not read chat tool state: {}", "[!]".yellow(), e),
    }
    Ok(())
}

async fn cmd_tool(client: ApiClient, tool_id: &str, enabled: bool) -> Result<()> {
    let store = ResourceStore::new(client);
    store
        .set_tool_enabled(tool_id, enabled)
        .await
        .context("tool update failed")?;
    println!(
        "{} {} is now {}",
        "[OK]".green(),
        tool_id.bold(),
        if enabled { "enabled" } else { "disabled" }
    );
    Ok(())
}

async fn cmd_skills(client: ApiClient) -> Result<()> {
    let skills = client.list_skills().await.context("listing skills failed")?;
    if skills.is_empty() {
        println!("No skills installed.");
        return Ok(());
    }
    for skill in skills {
        println!("{:<24} {}", skill.id.bold(), skill.description);
    }
    Ok(())
}
