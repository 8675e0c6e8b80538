use clap::{Args, Parser, Subcommand};

#[derive(Parser)]
#[command(name = "cad", about = concat!("[~] cadence v", env!("CARGO_PKG_VERSION"), " - routine templates on a timeline"), version)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,

    /// Output as JSON
    #[arg(long, global = true)]
    pub json: bool,

    /// Run against a different library directory
    #[arg(short = 'C', long = "library-dir", global = true)]
    pub library_dir: Option<String>,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Initialize a new cadence library in the current directory
    Init(InitArgs),
    /// List all templates
    List,
    /// Show template details
    Show(ShowArgs),
    /// Add a new template
    Add(AddArgs),
    /// Delete a template (detaches it everywhere first)
    Rm(RmArgs),
    /// Place a child template under a parent
    Link(LinkArgs),
    /// Remove placements: all of a template's, or one edge by relationship id
    Unlink(UnlinkArgs),
    /// Schedule a template on the calendar
    Schedule(ScheduleArgs),
    /// Remove a calendar entry
    Unschedule(UnscheduleArgs),
    /// Resolve the chain of templates active at a given time
    Resolve(ResolveArgs),
    /// Validate library integrity
    Check(CheckArgs),
}

#[derive(Args)]
pub struct InitArgs {
    /// Library name (default: inferred from directory name)
    #[arg(long)]
    pub name: Option<String>,
}

#[derive(Args)]
pub struct ShowArgs {
    /// Template id
    pub id: String,
}

#[derive(Args)]
pub struct AddArgs {
    /// Template name
    pub name: String,
    /// Template id (default: derived from the name)
    #[arg(long)]
    pub id: Option<String>,
    /// Template kind: leaf, timed, or sequential
    #[arg(long, default_value = "leaf")]
    pub kind: String,
    /// Duration, e.g. 45m, 1h30m, 90s, or bare milliseconds
    #[arg(long, default_value = "0")]
    pub duration: String,
}

#[derive(Args)]
pub struct RmArgs {
    /// Template id
    pub id: String,
}

#[derive(Args)]
pub struct LinkArgs {
    /// Parent template id
    pub parent: String,
    /// Child template id
    pub child: String,
    /// Start offset within the parent (required for timed parents)
    #[arg(long)]
    pub offset: Option<String>,
}

#[derive(Args)]
pub struct UnlinkArgs {
    /// Template id — detach this template from all of its parents
    pub id: Option<String>,
    /// Remove the single edge with this relationship id instead
    #[arg(long)]
    pub rel: Option<String>,
}

#[derive(Args)]
pub struct ScheduleArgs {
    /// Template id to schedule
    pub template: String,
    /// Absolute start time: RFC 3339, "YYYY-MM-DD HH:MM", or epoch ms
    #[arg(long)]
    pub at: String,
    /// Calendar entry id (default: generated)
    #[arg(long)]
    pub entry_id: Option<String>,
}

#[derive(Args)]
pub struct UnscheduleArgs {
    /// Calendar entry id
    pub entry_id: String,
}

#[derive(Args)]
pub struct ResolveArgs {
    /// Resolve at this time instead of now
    #[arg(long)]
    pub at: Option<String>,
}

#[derive(Args)]
pub struct CheckArgs {
    /// Write the repaired library back when errors are found
    #[arg(long)]
    pub repair: bool,
}
