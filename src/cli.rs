//! CLI struct definitions for the `cyberismo` command-line interface.
//!
//! All clap-derived types live here. Dispatch logic lives in `main.rs`.
//! Every subcommand is a thin wrapper over exactly one call into the
//! engine crate (`project`, `commands`, `resources`, `doctor`,
//! `edit_session`) — no business logic belongs here (spec §1: "CLI
//! argument parsing ... routes only translate requests to core calls").

use clap::{Parser, Subcommand};
use std::path::PathBuf;

#[derive(Parser, Debug)]
#[clap(
    name = "cyberismo",
    version = env!("CARGO_PKG_VERSION"),
    about = "Manage a Cyberismo project: cards, resources, and calculations."
)]
pub struct Cli {
    /// Project root. Defaults to walking upward from the current directory
    /// looking for `.cards/local/cardsConfig.json` (spec §6 "Environment").
    #[clap(long, global = true)]
    pub project: Option<PathBuf>,

    /// Output format for every subcommand: `text` or `json`.
    #[clap(long, global = true, default_value = "text")]
    pub format: String,

    #[clap(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Create a new project at `--project` (or the current directory).
    Init(InitCli),
    /// Card mutation and inspection commands.
    Card {
        #[clap(subcommand)]
        command: CardCommand,
    },
    /// Resource and project-wide commands.
    Resource {
        #[clap(subcommand)]
        command: ResourceCommand,
    },
    /// CSV import and AsciiDoc/HTML tree export.
    Io {
        #[clap(subcommand)]
        command: IoCommand,
    },
    /// Git-worktree-backed edit sessions (spec §4.7).
    Session {
        #[clap(subcommand)]
        command: SessionCommand,
    },
    /// Run a raw Clingo program against the project's current model.
    Calc(CalcCli),
    /// Read-only project health report.
    Doctor,
}

#[derive(clap::Args, Debug)]
pub struct InitCli {
    /// Human-readable project name.
    #[clap(long)]
    pub name: String,
    /// Card key prefix, e.g. `dec`.
    #[clap(long)]
    pub prefix: String,
}

#[derive(Subcommand, Debug)]
pub enum CardCommand {
    /// Instantiate every card in a template under an optional parent.
    Create {
        /// Fully-qualified template name, e.g. `dec/templates/decision`.
        template: String,
        #[clap(long)]
        parent: Option<String>,
    },
    /// Print a card's metadata and content.
    Show { key: String },
    /// List every project card, one line per card.
    List,
    /// Replace a card's AsciiDoc content from a file.
    EditContent { key: String, content_file: PathBuf },
    /// Set one custom field to a raw string value (coerced per dataType).
    EditField { key: String, field: String, value: String },
    /// Move a card under a new parent (or `ROOT`).
    Move { key: String, destination: String },
    /// Move a card to a specific index among its siblings.
    RankTo { key: String, index: usize },
    /// Move a card immediately before a sibling.
    RankBefore { key: String, before: String },
    /// Move a card to the front of its siblings.
    RankFirst { key: String },
    /// Redistribute lexorank values evenly among a parent's children.
    Rebalance { parent: String },
    /// Run a named transition on a card.
    Transition { key: String, transition: String },
    /// Create a link from one card to another.
    Link {
        from: String,
        to: String,
        link_type: String,
        #[clap(long)]
        description: Option<String>,
    },
    /// Remove a link between two cards.
    Unlink {
        from: String,
        to: String,
        link_type: String,
        #[clap(long)]
        description: Option<String>,
    },
    /// Delete a card and every descendant, cascading to attachments.
    Remove { key: String },
}

#[derive(Subcommand, Debug)]
pub enum ResourceCommand {
    /// Delete a resource; refuses while still referenced.
    Remove { name: String },
    /// Clone another project's resources in read-only under a new prefix.
    ImportModule {
        location: String,
        #[clap(long)]
        branch: Option<String>,
    },
    /// Drop a previously imported module.
    RemoveModule { prefix: String },
    /// Rewrite every card key and resource name to a new prefix.
    Rename { new_prefix: String },
    /// Re-run schema and cross-reference validation for every resource.
    Validate,
    /// Advance the published version to match the current draft.
    Publish,
}

#[derive(Subcommand, Debug)]
pub enum IoCommand {
    /// Create one card per CSV data row.
    ImportCsv {
        csv_path: PathBuf,
        card_type: String,
        #[clap(long)]
        parent: Option<String>,
    },
    /// Dump every project card's tree to `out_dir`.
    Export {
        out_dir: PathBuf,
        /// `adoc` or `html`.
        #[clap(long, default_value = "adoc")]
        format: String,
    },
}

#[derive(Subcommand, Debug)]
pub enum SessionCommand {
    /// Start an edit session for a card.
    Start { card_key: String },
    /// Commit a session's pending changes.
    Save { id: String },
    /// Auto-save, merge into main, and remove a session's worktree.
    Publish { id: String },
    /// Discard a session's worktree and branch without merging.
    Discard { id: String },
    /// Remove orphaned sessions whose worktree is already gone.
    Cleanup,
}

#[derive(clap::Args, Debug)]
pub struct CalcCli {
    /// Path to a `.lp` file with the raw query/program to run.
    pub program_file: PathBuf,
}
