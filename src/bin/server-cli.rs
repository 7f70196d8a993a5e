use clap::{Parser, Subcommand};
use reqwest::header::{HeaderMap, HeaderValue, AUTHORIZATION};
use reqwest::Method;
use serde_json::Value;

#[derive(Parser)]
#[command(name = "server-cli")]
#[command(about = "Management CLI for the module server", long_about = None)]
struct Cli {
    #[arg(short, long, default_value = "http://localhost:8081")]
    url: String,

    #[arg(short, long, default_value = "CHANGE_ME_IN_PRODUCTION")]
    key: String,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Check server status
    Status,
    /// List modules in dispatch order
    Modules,
    /// List banning routes, or show one route's bans
    Banning {
        route: Option<String>,
    },
    /// Remove a route's banning configuration
    RemoveRoute {
        route: String,
    },
    /// Lift the ban on one client
    Unban {
        route: String,
        client: String,
    },
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

    let (method, path) = match &cli.command {
        Commands::Status => (Method::GET, "/admin/status".to_string()),
        Commands::Modules => (Method::GET, "/admin/modules".to_string()),
        Commands::Banning { route: None } => (Method::GET, "/admin/banning".to_string()),
        Commands::Banning { route: Some(route) } => (Method::GET, format!("/admin/banning/{route}")),
        Commands::RemoveRoute { route } => (Method::DELETE, format!("/admin/banning/{route}")),
        Commands::Unban { route, client } => {
            (Method::DELETE, format!("/admin/banning/{route}/{client}"))
        }
    };

    let res = client
        .request(method, format!("{}{}", cli.url.trim_end_matches('/'), path))
        .headers(headers)
        .send()
        .await?;
    print_response(res).await?;

    Ok(())
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

    if status == reqwest::StatusCode::NO_CONTENT {
        println!("OK");
        return Ok(());
    }

    let json: Value = res.json().await?;
    println!("{}", serde_json::to_string_pretty(&json)?);
    Ok(())
}
