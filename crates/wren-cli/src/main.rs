//! wren CLI — standalone voice conversation server.
//!
//! ```text
//! wren serve [--port 2005] [--host 127.0.0.1] [--reply-url http://...]
//! wren enable / disable / status / transcript [--server http://localhost:2005]
//! ```
//!
//! `serve` runs the turn engine with console demo devices: type a line to
//! "speak", the reply is printed back. Real deployments plug hardware
//! device adapters into `TurnEngine::new` instead.

mod console;

use std::sync::Arc;

use clap::{Parser, Subcommand};

use wren_lib::engine::TurnEngine;
use wren_lib::reply::HttpReplyService;
use wren_lib::wren_core::types::EngineConfig;

use crate::console::{ConsoleCapture, ConsoleSpeaker};

/// wren — voice conversation turn-taking engine
#[derive(Parser)]
#[command(name = "wren", version, about)]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Start the wren engine server with console demo devices
    Serve {
        /// Listen port
        #[arg(long, default_value = "2005")]
        port: u16,
        /// Listen host
        #[arg(long, default_value = "127.0.0.1")]
        host: String,
        /// Reply service endpoint
        #[arg(long, default_value = "http://localhost:4000/api/chat")]
        reply_url: String,
    },
    /// Enable voice mode on a running server
    Enable {
        #[arg(long, default_value = "http://localhost:2005")]
        server: String,
    },
    /// Disable voice mode
    Disable {
        #[arg(long, default_value = "http://localhost:2005")]
        server: String,
    },
    /// Get engine status
    Status {
        #[arg(long, default_value = "http://localhost:2005")]
        server: String,
    },
    /// Get the conversation transcript
    Transcript {
        #[arg(long, default_value = "http://localhost:2005")]
        server: String,
    },
}

#[tokio::main]
async fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "wren_lib=info,wren=info".into()),
        )
        .init();

    let cli = Cli::parse();

    match cli.command {
        Command::Serve {
            port,
            host,
            reply_url,
        } => {
            let config = EngineConfig {
                reply_url: reply_url.clone(),
                ..Default::default()
            };
            let engine = TurnEngine::new(
                config,
                Box::new(ConsoleCapture::default()),
                Box::new(ConsoleSpeaker::default()),
                Arc::new(HttpReplyService::new(reply_url)),
            );
            let app = wren_lib::server::router(engine);

            let addr = format!("{host}:{port}");
            eprintln!("wren listening on {addr}");
            eprintln!("POST /enable to start voice mode, then type to talk");

            let listener = tokio::net::TcpListener::bind(&addr)
                .await
                .expect("failed to bind");

            axum::serve(listener, app).await.expect("server error");
        }

        Command::Enable { server } => post_simple(&server, "enable").await,
        Command::Disable { server } => post_simple(&server, "disable").await,

        Command::Status { server } => get_simple(&server, "status").await,
        Command::Transcript { server } => get_simple(&server, "transcript").await,
    }
}

async fn post_simple(server: &str, endpoint: &str) {
    let resp = reqwest::Client::new()
        .post(format!("{server}/{endpoint}"))
        .send()
        .await
        .expect("request failed");
    println!("{}", resp.text().await.unwrap_or_default());
}

async fn get_simple(server: &str, endpoint: &str) {
    let resp = reqwest::Client::new()
        .get(format!("{server}/{endpoint}"))
        .send()
        .await
        .expect("request failed");
    let body = resp.text().await.unwrap_or_default();
    match serde_json::from_str::<serde_json::Value>(&body) {
        Ok(v) => println!("{}", serde_json::to_string_pretty(&v).unwrap_or(body)),
        Err(_) => println!("{body}"),
    }
}
