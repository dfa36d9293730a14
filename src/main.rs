//! Tripdesk terminal client
//!
//! Connects to the planning service and chats on stdin/stdout. Speech is
//! not available in a terminal, so the session runs text-only.

use std::error::Error;
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::sync::broadcast::error::RecvError;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};
use tripdesk::config::Config;
use tripdesk::console::{self, ConsoleCommand, Renderer};
use tripdesk::runtime::{SessionRuntime, SessionUpdate, UnavailableCapture, UnavailablePlayback};
use tripdesk::transport::WsTransport;

fn init_logging(json: bool) {
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| "tripdesk=info".into());
    let registry = tracing_subscriber::registry().with(filter);

    // stdout belongs to the conversation
    if json {
        registry
            .with(
                tracing_subscriber::fmt::layer()
                    .json()
                    .with_current_span(false)
                    .with_span_list(false)
                    .with_writer(std::io::stderr),
            )
            .init();
    } else {
        registry
            .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
            .init();
    }
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn Error>> {
    let config = Config::from_env()?;
    init_logging(config.log_json);
    tracing::info!(url = %config.url, "Starting tripdesk");

    let (runtime, handle) = SessionRuntime::new(
        config.runtime(),
        WsTransport::new(config.url.clone()),
        UnavailableCapture,
        UnavailablePlayback,
    );
    let mut updates = handle.subscribe();
    let runtime_task = tokio::spawn(runtime.run());

    // Render updates until the session closes
    let render_task = tokio::spawn(async move {
        let mut renderer = Renderer::new();
        loop {
            match updates.recv().await {
                Ok(update) => {
                    for line in renderer.render(&update) {
                        println!("{line}");
                    }
                    if matches!(update, SessionUpdate::Closed) {
                        break;
                    }
                }
                Err(RecvError::Lagged(skipped)) => {
                    tracing::warn!(skipped, "Renderer fell behind");
                }
                Err(RecvError::Closed) => break,
            }
        }
    });

    println!("{}", console::HELP);
    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    loop {
        let command = match lines.next_line().await? {
            Some(line) => match console::parse_line(&line) {
                Ok(command) => command,
                Err(e) => {
                    println!("! {e}");
                    continue;
                }
            },
            // EOF ends the session like /quit
            None => ConsoleCommand::Quit,
        };
        if command == ConsoleCommand::Help {
            println!("{}", console::HELP);
            continue;
        }
        let quit = command == ConsoleCommand::Quit;
        if let Some(intent) = console::to_intent(command, &handle.snapshot()) {
            if handle.send(intent).await.is_err() {
                break;
            }
        }
        if quit {
            break;
        }
    }

    runtime_task.await?;
    render_task.await?;
    Ok(())
}
