use clap::{Parser, Subcommand};
use reqwest::header::{HeaderMap, HeaderValue, AUTHORIZATION};
use reqwest::Method;
use serde_json::{json, Value};

#[derive(Parser)]
#[command(name = "waf-cli")]
#[command(about = "Management CLI for the WAF proxy admin API", long_about = None)]
struct Cli {
    #[arg(short, long, default_value = "http://127.0.0.1:8082")]
    url: String,

    #[arg(short, long, env = "WAF_ADMIN_KEY")]
    key: String,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Check gate status
    Status,
    /// Manage the denylist
    Denylist {
        #[command(subcommand)]
        action: DenylistAction,
    },
    /// Manage custom rules
    Rules {
        #[command(subcommand)]
        action: RuleAction,
    },
    /// Show recent audit log entries
    Logs {
        #[arg(short, long, default_value_t = 100)]
        limit: usize,
    },
    /// Show counts by outcome and reason
    Stats,
}

#[derive(Subcommand)]
enum DenylistAction {
    List,
    Add { ip: String },
    Remove { ip: String },
}

#[derive(Subcommand)]
enum RuleAction {
    List,
    Add {
        pattern: String,
        #[arg(short, long, default_value = "")]
        description: String,
    },
    Remove { id: i64 },
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();
    let client = reqwest::Client::new();

    let mut headers = HeaderMap::new();
    headers.insert(
        AUTHORIZATION,
        HeaderValue::from_str(&format!("Bearer {}", cli.key))?,
    );

    let (method, path, body) = match cli.command {
        Commands::Status => (Method::GET, "/api/status".to_string(), None),
        Commands::Denylist { action } => match action {
            DenylistAction::List => (Method::GET, "/api/denylist".to_string(), None),
            DenylistAction::Add { ip } => {
                (Method::POST, "/api/denylist".to_string(), Some(json!({ "ip": ip })))
            }
            DenylistAction::Remove { ip } => (Method::DELETE, format!("/api/denylist/{}", ip), None),
        },
        Commands::Rules { action } => match action {
            RuleAction::List => (Method::GET, "/api/rules".to_string(), None),
            RuleAction::Add { pattern, description } => (
                Method::POST,
                "/api/rules".to_string(),
                Some(json!({ "pattern": pattern, "description": description })),
            ),
            RuleAction::Remove { id } => (Method::DELETE, format!("/api/rules/{}", id), None),
        },
        Commands::Logs { limit } => (Method::GET, format!("/api/logs?limit={}", limit), None),
        Commands::Stats => (Method::GET, "/api/stats".to_string(), None),
    };

    let mut request = client
        .request(method, format!("{}{}", cli.url.trim_end_matches('/'), path))
        .headers(headers);
    if let Some(body) = body {
        request = request.json(&body);
    }

    print_response(request.send().await?).await
}

async fn print_response(res: reqwest::Response) -> Result<(), Box<dyn std::error::Error>> {
    let status = res.status();
    if !status.is_success() {
        eprintln!("Error: Admin API returned status {}", status);
        if let Ok(text) = res.text().await {
            eprintln!("Response: {}", text);
        }
        return Ok(());
    }

    let json: Value = res.json().await?;
    println!("{}", serde_json::to_string_pretty(&json)?);
    Ok(())
}
