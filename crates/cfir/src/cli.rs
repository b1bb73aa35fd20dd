use clap::{Parser, ValueEnum};

use std::path::PathBuf;

/// The canned graphs the driver knows how to build.
#[derive(ValueEnum, Clone, Copy, Debug, PartialEq, Eq)]
pub enum Scenario {
    /// Three blocks in a row, folded into one by cleanup.
    Straight,
    /// A two-way branch joined by a phi.
    Diamond,
    /// A counting loop.
    Loop,
    /// The diamond with a small function inlined into its join block.
    Inline,
}

/// Defines and parses the command-line arguments accepted by the driver.
///
/// The driver builds one of the canned graphs, runs cleanup over it
/// (inlining first for [`Scenario::Inline`]), verifies the result and
/// prints it.
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
pub struct Args {
    /// The graph to build.
    #[clap(long, value_enum, default_value_t = Scenario::Diamond)]
    pub scenario: Scenario,

    /// Print the graph after every stage and log at debug level.
    #[clap(long)]
    pub verbose: bool,

    /// Measure and report the time taken by each stage.
    #[clap(long)]
    pub profile: bool,

    /// Print the edits applied after the graph was built.
    #[clap(long)]
    pub edits: bool,

    /// Undo every edit applied after the graph was built and check that the
    /// original graph comes back.
    #[clap(long)]
    pub undo: bool,

    /// Write the final graph to this file instead of standard output.
    #[clap(long, short = 'o')]
    pub output: Option<PathBuf>,
}

impl Args {
    pub fn from_cli() -> Self {
        Self::parse()
    }
}
