//! Terminal chat against a running server.
//!
//! Reads `CHAT_API_URL` (default `http://localhost:3000`) and `CHAT_API_TOKEN`.
//! Each input line is sent as a user turn. Ctrl+C aborts the answer in progress.
//! `:open N` / `:close N` toggles the N-th result list of the last answer,
//! `:new` starts a fresh conversation.

use client::{render_plain, ChatClient, ConversationView, ToolCallKey};
use domain::StreamEvent;
use std::io::Write;
use std::sync::{Arc, Mutex};
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio_util::sync::CancellationToken;
use tracing_subscriber::EnvFilter;

fn last_assistant_id(view: &ConversationView) -> Option<String> {
    view.state().assistant_messages().last().map(|m| m.id.clone())
}

#[tokio::main]
async fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn")))
        .with_writer(std::io::stderr)
        .init();

    let base_url =
        std::env::var("CHAT_API_URL").unwrap_or_else(|_| "http://localhost:3000".to_string());
    let Ok(token) = std::env::var("CHAT_API_TOKEN") else {
        eprintln!("CHAT_API_TOKEN is not set");
        std::process::exit(1);
    };

    let client = match ChatClient::new(base_url, token) {
        Ok(client) => client,
        Err(e) => {
            eprintln!("{e}");
            std::process::exit(1);
        }
    };

    let current: Arc<Mutex<Option<CancellationToken>>> = Arc::new(Mutex::new(None));
    let interrupt = current.clone();
    tokio::spawn(async move {
        while tokio::signal::ctrl_c().await.is_ok() {
            let token = interrupt
                .lock()
                .unwrap_or_else(|poisoned| poisoned.into_inner())
                .clone();
            match token {
                Some(token) => token.cancel(),
                None => std::process::exit(0),
            }
        }
    });

    let mut view = ConversationView::new();
    let mut lines = BufReader::new(tokio::io::stdin()).lines();

    while let Ok(Some(line)) = lines.next_line().await {
        let line = line.trim();
        if line.is_empty() {
            continue;
        }

        if line == ":new" {
            view.reset();
            continue;
        }
        if let Some((command, index)) = line.split_once(' ') {
            if command == ":open" || command == ":close" {
                match (last_assistant_id(&view), index.trim().parse::<usize>()) {
                    (Some(message_id), Ok(index)) => {
                        let key = ToolCallKey::new(message_id, index);
                        if view.expansion().is_expanded(&key) != (command == ":open") {
                            view.toggle(key);
                        }
                        print!("{}", render_plain(&view.render()));
                    }
                    _ => eprintln!("usage: {command} <result list number>"),
                }
                continue;
            }
        }

        let cancel = CancellationToken::new();
        *current.lock().unwrap_or_else(|p| p.into_inner()) = Some(cancel.clone());

        let result = client
            .submit_observed(&mut view, line, cancel, |event, _| {
                if let StreamEvent::TextDelta { delta, .. } = event {
                    print!("{delta}");
                    let _ = std::io::stdout().flush();
                }
            })
            .await;

        *current.lock().unwrap_or_else(|p| p.into_inner()) = None;
        println!();
        if let Err(e) = result {
            tracing::debug!("Request ended with error: {}", e);
        }
        print!("{}", render_plain(&view.render()));
    }
}
