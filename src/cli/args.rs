use clap::{Args, Subcommand};
use std::path::PathBuf;

#[derive(Args, Debug)]
pub struct RunArgs {
    /// Strategy document describing nodes and transformations
    #[arg(value_name = "STRATEGY")]
    pub strategy: PathBuf,

    /// Derive only this node from its parent instead of every dirty node
    #[arg(long, value_name = "NODE")]
    pub node: Option<String>,

    /// Keep deriving nodes that do not depend on a failed one
    #[arg(long)]
    pub continue_independent: bool,

    /// Kill the engine after this many seconds per edge (0 disables)
    #[arg(long, value_name = "SECONDS", help_heading = "Engine Overrides")]
    pub timeout: Option<u64>,

    /// Registration engine executable to invoke
    #[arg(long, value_name = "BIN", help_heading = "Engine Overrides")]
    pub engine: Option<String>,
}

#[derive(Args, Debug)]
pub struct StatusArgs {
    /// Strategy document to inspect
    #[arg(value_name = "STRATEGY")]
    pub strategy: PathBuf,

    /// Emit machine-readable JSON instead of a table
    #[arg(long)]
    pub json: bool,
}

#[derive(Args, Debug)]
pub struct InvalidateArgs {
    /// Strategy document to update
    #[arg(value_name = "STRATEGY")]
    pub strategy: PathBuf,

    /// Node to mark dirty along with everything derived from it
    #[arg(value_name = "NODE")]
    pub node: String,
}

#[derive(Args, Debug)]
pub struct DotArgs {
    /// Strategy document to render
    #[arg(value_name = "STRATEGY")]
    pub strategy: PathBuf,

    /// Write the graph to this file instead of stdout
    #[arg(long, short, value_name = "FILE")]
    pub output: Option<PathBuf>,
}

#[derive(Args, Debug)]
pub struct ParamsArgs {
    #[command(subcommand)]
    pub command: ParamsCommand,
}

#[derive(Subcommand, Debug)]
pub enum ParamsCommand {
    /// Print the parameters of an engine parameter file
    Show {
        #[arg(value_name = "FILE")]
        file: PathBuf,
    },
    /// Set one parameter, creating the file when missing
    Set {
        #[arg(value_name = "FILE")]
        file: PathBuf,
        #[arg(value_name = "KEY")]
        key: String,
        /// Raw value text, e.g. '"BSplineTransform"' or '0.5 0.5'
        #[arg(value_name = "VALUE", allow_hyphen_values = true)]
        value: String,
    },
    /// Remove one parameter
    Unset {
        #[arg(value_name = "FILE")]
        file: PathBuf,
        #[arg(value_name = "KEY")]
        key: String,
    },
}
