use crate::demo::{run_demo, run_lifecycle_table, DemoArgs, LifecycleArgs};
use crate::server;
use clap::{Args, Parser, Subcommand};
use sejour::error::AppError;

#[derive(Parser, Debug)]
#[command(
    name = "Sejour demande service",
    about = "Run or demonstrate the residence permit demande workflow from the command line",
    version
)]
struct Cli {
    #[command(subcommand)]
    command: Option<Command>,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Start the HTTP service (default command)
    Serve(ServeArgs),
    /// Walk one demande from draft to archive against in-memory stores
    Demo(DemoArgs),
    /// Print the demande status transition table
    Lifecycle(LifecycleArgs),
}

#[derive(Args, Debug, Default)]
pub(crate) struct ServeArgs {
    /// Override the configured host for the HTTP server
    #[arg(long)]
    pub(crate) host: Option<String>,
    /// Override the configured port for the HTTP server
    #[arg(long)]
    pub(crate) port: Option<u16>,
}

pub(crate) async fn run() -> Result<(), AppError> {
    let cli = Cli::parse();
    let command = cli
        .command
        .unwrap_or_else(|| Command::Serve(ServeArgs::default()));

    match command {
        Command::Serve(args) => server::run(args).await,
        Command::Demo(args) => run_demo(args),
        Command::Lifecycle(args) => run_lifecycle_table(args),
    }
}
