pub mod args;
pub mod commands;

pub use args::{DotArgs, InvalidateArgs, ParamsArgs, ParamsCommand, RunArgs, StatusArgs};
use clap::{Parser, Subcommand};

const HELP_TEMPLATE: &str = "\
{name} {version}\n\
{about-with-newline}\n\
USAGE:\n    {usage}\n\
\nOPTIONS:\n{options}\n\
STRATEGY COMMANDS:\n{subcommands}\n";

#[derive(Parser, Debug)]
#[command(name = "regstrategy")]
#[command(version = crate::VERSION)]
#[command(about = "Run and maintain chained image registration strategies")]
#[command(help_template = HELP_TEMPLATE)]
#[command(
    after_long_help = "Typical flow: describe datasets and transformations in a strategy file, run it, then edit parameters and run again; only affected nodes are recomputed."
)]
pub struct Args {
    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    #[command(
        about = "Derive every out-of-date dataset",
        long_about = "Run invokes the registration engine for each dirty node in dependency order and records fresh fingerprints in the strategy file.",
        after_help = "Example:\n    regstrategy run ./study/strategy.yaml --continue-independent"
    )]
    Run(RunArgs),
    #[command(
        about = "Show which nodes are up to date",
        long_about = "Status lists each node with its dataset, parent transformation, and whether it must be recomputed.",
        after_help = "Example:\n    regstrategy status ./study/strategy.yaml --json"
    )]
    Status(StatusArgs),
    #[command(
        about = "Force a node and its descendants to be recomputed",
        long_about = "Invalidate marks a node dirty and propagates the flag to every node derived from it, then saves the strategy file.",
        after_help = "Example:\n    regstrategy invalidate ./study/strategy.yaml rigid"
    )]
    Invalidate(InvalidateArgs),
    #[command(
        about = "Render the strategy as Graphviz DOT",
        after_help = "Example:\n    regstrategy dot ./study/strategy.yaml | dot -Tsvg > strategy.svg"
    )]
    Dot(DotArgs),
    #[command(
        about = "Inspect or edit engine parameter files",
        long_about = "Params reads and writes the parenthesized key/value files consumed by the registration engine.",
        after_help = "Examples:\n    regstrategy params show Rigid.txt\n    regstrategy params set Rigid.txt MaximumNumberOfIterations 500"
    )]
    Params(ParamsArgs),
}

pub async fn run(args: Args) -> crate::Result<()> {
    match args.command {
        Command::Run(run_args) => commands::run(run_args).await,
        Command::Status(status_args) => commands::status(status_args).await,
        Command::Invalidate(invalidate_args) => commands::invalidate(invalidate_args).await,
        Command::Dot(dot_args) => commands::dot(dot_args).await,
        Command::Params(params_args) => commands::params(params_args).await,
    }
}
