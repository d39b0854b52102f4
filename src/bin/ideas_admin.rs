use std::fs;

use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand};
use dotenvy::dotenv;
use reqwest::{Client, RequestBuilder, StatusCode};
use tracing::info;
use tracing_subscriber::EnvFilter;

use idea_assistant::config::{Secrets, Settings};
use idea_assistant::database::connect_index;
use idea_assistant::modules::ideas::Post;

const DEFAULT_SERVER: &str = "http://localhost:9000";

#[derive(Parser)]
#[command(name = "ideas_admin", about = "Provision the idea index and manage indexed ideas")]
struct Cli {
    /// Basic auth user (falls back to HTTP_USER)
    #[arg(long, global = true)]
    user: Option<String>,
    /// Basic auth password (falls back to HTTP_PWD)
    #[arg(long, global = true)]
    password: Option<String>,
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Create the collections / tables of the configured backend
    Provision {
        /// Drop existing data first
        #[arg(long)]
        recreate: bool,
    },
    /// PUT a post JSON file to a running server
    Push {
        file: String,
        #[arg(long, default_value = DEFAULT_SERVER)]
        server: String,
    },
    /// Fetch an indexed idea
    Get {
        post_id: i64,
        #[arg(long)]
        language: Option<String>,
        #[arg(long, default_value = DEFAULT_SERVER)]
        server: String,
    },
}

struct Credentials(Option<(String, String)>);

impl Credentials {
    fn apply(&self, req: RequestBuilder) -> RequestBuilder {
        match &self.0 {
            Some((user, password)) => req.basic_auth(user, Some(password)),
            None => req,
        }
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    dotenv().ok();
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let cli = Cli::parse();
    let secrets = Secrets::from_env();
    let creds = Credentials(
        cli.user
            .or(secrets.http_user.clone())
            .zip(cli.password.or(secrets.http_password.clone())),
    );

    match cli.command {
        Command::Provision { recreate } => {
            let settings = Settings::load()?;
            let index = connect_index(&settings, &secrets).await?;
            index.ensure_schema(recreate).await?;
            info!("✅ {} schema ready", index.backend_name());
        }
        Command::Push { file, server } => {
            let raw = fs::read_to_string(&file).with_context(|| format!("reading {}", file))?;
            let post: Post = serde_json::from_str(&raw).with_context(|| format!("{} is not a post", file))?;
            let url = format!("{}/api/v1/posts/{}", server.trim_end_matches('/'), post.post_id);
            info!("📤 Pushing post {} to {}", post.post_id, url);
            let resp = creds.apply(Client::new().put(&url).json(&post)).send().await?;
            print_response(resp).await?;
        }
        Command::Get { post_id, language, server } => {
            let mut url = format!("{}/api/v1/posts/{}", server.trim_end_matches('/'), post_id);
            if let Some(lang) = language {
                url.push_str(&format!("?language={}", lang));
            }
            let resp = creds.apply(Client::new().get(&url)).send().await?;
            print_response(resp).await?;
        }
    }
    Ok(())
}

async fn print_response(resp: reqwest::Response) -> Result<()> {
    let status = resp.status();
    let body: serde_json::Value = resp.json().await.unwrap_or(serde_json::Value::Null);
    println!("{}", serde_json::to_string_pretty(&body)?);
    match status {
        s if s.is_success() => Ok(()),
        StatusCode::UNAUTHORIZED => bail!("unauthorized; pass --user/--password or set HTTP_USER/HTTP_PWD"),
        s => bail!("server answered {}", s),
    }
}
