use clap::{Parser, Subcommand};
use server::{bookmaker::Bookmaker, database::RedisStore, utils::RetryPolicy};
use tracing_subscriber::{EnvFilter, fmt};

#[derive(Parser, Debug)]
#[command(author, version, about)]
struct Args {
    #[arg(long, env = "REDIS_URL", default_value = "redis://127.0.0.1:6379")]
    redis_url: String,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Publish predictions and quizzes from a catalog file or URL
    Seed { source: String },

    /// Record the winning option and pay out
    Settle {
        prediction_id: String,

        winning_option: usize,
    },

    /// Void a prediction and refund every stake
    Cancel { prediction_id: String },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    fmt().with_env_filter(EnvFilter::from_default_env()).init();

    let args = Args::parse();

    let store = RedisStore::connect(&args.redis_url).await?;
    let bookmaker = Bookmaker::new(store, RetryPolicy::default());

    match args.command {
        Command::Seed { source } => {
            let summary = operator::seed(&bookmaker, &source).await?;
            println!("\n{summary}");
        }
        Command::Settle {
            prediction_id,
            winning_option,
        } => {
            let report = operator::settle(&bookmaker, &prediction_id, winning_option).await?;
            println!("{}", serde_json::to_string_pretty(&report)?);
        }
        Command::Cancel { prediction_id } => {
            let report = operator::cancel(&bookmaker, &prediction_id).await?;
            println!("{}", serde_json::to_string_pretty(&report)?);
        }
    }

    Ok(())
}
