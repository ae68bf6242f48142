use clap::{Parser, Subcommand};
use serde_json::Value;

#[derive(Parser)]
#[command(name = "http-inspector-cli")]
#[command(about = "Query a running HTTP inspector from the terminal", long_about = None)]
struct Cli {
    #[arg(short, long, default_value = "http://127.0.0.1:4040")]
    url: String,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Show version, captured port and counts
    Status,
    /// List captured messages, newest first
    Packets,
    /// List request/response pairs, newest first
    Pairs {
        /// Only pairs whose URL contains this text
        #[arg(short, long)]
        filter: Option<String>,

        /// Maximum number of pairs
        #[arg(short, long)]
        limit: Option<usize>,
    },
    /// Drop everything captured so far
    Clear,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();
    let client = reqwest::Client::new();
    let base = cli.url.trim_end_matches('/');

    let res = match cli.command {
        Commands::Status => client.get(format!("{}/api/status", base)).send().await?,
        Commands::Packets => client.get(format!("{}/api/packets", base)).send().await?,
        Commands::Pairs { filter, limit } => {
            let mut query: Vec<(&str, String)> = Vec::new();
            if let Some(q) = filter {
                query.push(("q", q));
            }
            if let Some(limit) = limit {
                query.push(("limit", limit.to_string()));
            }
            client
                .get(format!("{}/api/pairs", base))
                .query(&query)
                .send()
                .await?
        }
        Commands::Clear => client.post(format!("{}/api/clear", base)).send().await?,
    };
    print_response(res).await
}

async fn print_response(res: reqwest::Response) -> Result<(), Box<dyn std::error::Error>> {
    let status = res.status();
    if !status.is_success() {
        eprintln!("Error: inspector returned status {}", status);
        if let Ok(text) = res.text().await {
            eprintln!("Response: {}", text);
        }
        return Ok(());
    }

    let json: Value = res.json().await?;
    println!("{}", serde_json::to_string_pretty(&json)?);
    Ok(())
}
