use clap::Parser;
use livedit_cli::ReplayCli;
use tracing_subscriber::EnvFilter;

/// Drive the edit-and-continue session orchestrator from the command line.
#[derive(Debug, Parser)]
#[clap(author, version)]
struct MultitoolCli {
    #[clap(subcommand)]
    subcommand: Subcommand,
}

#[derive(Debug, clap::Subcommand)]
enum Subcommand {
    /// Replay a debugger event scenario and print each step's outcome.
    Replay(ReplayCli),
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Honor `RUST_LOG`; stdout carries the replay output.
    tracing_subscriber::fmt()
        .with_writer(std::io::stderr)
        .with_env_filter(EnvFilter::from_default_env())
        .init();

    let cli = MultitoolCli::parse();
    match cli.subcommand {
        Subcommand::Replay(replay_cli) => livedit_cli::replay::run_main(replay_cli).await,
    }
}
