use std::io::Write;
use std::time::Duration;

use anyhow::{Context, Result};
use clap::Parser;
use futures_util::{SinkExt, StreamExt};
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio_tungstenite::{
    connect_async,
    tungstenite::{client::IntoClientRequest, http::HeaderValue, protocol::Message},
};
use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;
use url::Url;

use idea_assistant::modules::chat::followups::extract_followups;
use idea_assistant::modules::chat::protocol::Sender;
use idea_assistant::modules::chat::{ChatResponse, MessageKind};
use idea_assistant::utils::auth::basic_header;

#[derive(Parser)]
#[command(name = "chat_client", about = "Terminal client for the idea assistant chat socket")]
struct Args {
    #[arg(long, default_value = "ws://localhost:9000/chat")]
    url: String,
    #[arg(long)]
    user: Option<String>,
    #[arg(long)]
    password: Option<String>,
}

/// Terminal rendering state for one conversation.
#[derive(Default)]
struct Screen {
    followup_text: String,
    followups: Vec<String>,
}

impl Screen {
    fn render(&mut self, frame: ChatResponse) {
        if frame.sender == Sender::You {
            return;
        }
        match frame.kind {
            MessageKind::Thinking => print!("… "),
            MessageKind::Start => print!("\rBot: "),
            MessageKind::Stream => print!("{}", frame.message),
            MessageKind::End => println!(),
            MessageKind::ModerationError => println!("\r⚠️  That question can't be answered."),
            MessageKind::StartFollowup => self.followup_text.clear(),
            MessageKind::StreamFollowup => self.followup_text.push_str(&frame.message),
            MessageKind::EndFollowup => {
                self.followups = extract_followups(&self.followup_text);
                for (i, q) in self.followups.iter().enumerate() {
                    println!("  [{}] {}", i + 1, q);
                }
                print!("> ");
            }
            MessageKind::Error => println!("\r❌ {}", frame.message),
        }
        let _ = std::io::stdout().flush();
    }

    /// A bare number picks one of the suggested follow-ups.
    fn resolve(&self, line: &str) -> String {
        line.parse::<usize>()
            .ok()
            .and_then(|n| n.checked_sub(1))
            .and_then(|i| self.followups.get(i).cloned())
            .unwrap_or_else(|| line.to_string())
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn")))
        .init();
    let args = Args::parse();
    let url = Url::parse(&args.url).with_context(|| format!("invalid chat url '{}'", args.url))?;
    let auth = match (&args.user, &args.password) {
        (Some(u), Some(p)) => Some(basic_header(u, p)),
        _ => None,
    };

    let mut stdin = BufReader::new(tokio::io::stdin()).lines();
    let mut screen = Screen::default();

    loop {
        let mut request = url.as_str().into_client_request()?;
        if let Some(value) = &auth {
            request.headers_mut().insert("Authorization", HeaderValue::from_str(value)?);
        }

        info!("🔌 Connecting to {} ...", url);
        match connect_async(request).await {
            Ok((ws_stream, _)) => {
                println!("Connected. Ask about the ideas (Ctrl-D to quit).");
                print!("> ");
                let _ = std::io::stdout().flush();
                let (mut write, mut read) = ws_stream.split();

                loop {
                    tokio::select! {
                        line = stdin.next_line() => {
                            let Some(line) = line? else { return Ok(()) };
                            let line = line.trim();
                            if line.is_empty() {
                                continue;
                            }
                            let question = screen.resolve(line);
                            if let Err(e) = write.send(Message::Text(question)).await {
                                warn!("Send failed: {}", e);
                                break;
                            }
                        }
                        msg = read.next() => match msg {
                            Some(Ok(Message::Text(text))) => match serde_json::from_str::<ChatResponse>(&text) {
                                Ok(frame) => screen.render(frame),
                                Err(e) => warn!("Unreadable frame: {}", e),
                            },
                            Some(Ok(Message::Close(frame))) => {
                                warn!("Server closed the socket: {:?}", frame);
                                break;
                            }
                            Some(Ok(_)) => {}
                            Some(Err(e)) => {
                                warn!("WS Error: {}", e);
                                break;
                            }
                            None => break,
                        }
                    }
                }
            }
            Err(e) => error!("WS Connection Failed: {}. Retrying in 5s...", e),
        }
        tokio::time::sleep(Duration::from_secs(5)).await;
    }
}
