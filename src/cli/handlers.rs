use std::path::PathBuf;
use std::sync::Mutex;

use chrono::Utc;

use crate::cli::commands::*;
use crate::cli::output::*;
use crate::io::library_io::{self, Library, LibraryError};
use crate::model::calendar::BaseCalendarEntry;
use crate::model::store::StoreState;
use crate::model::template::Template;
use crate::ops::resolve::resolve_chain_with_budget;
use crate::ops::store_ops::{self, Action};
use crate::ops::check;
use crate::util::time::{parse_duration_ms, parse_instant_ms};

/// Global override for the library directory (set by -C flag)
static LIBRARY_DIR_OVERRIDE: Mutex<Option<PathBuf>> = Mutex::new(None);

// ---------------------------------------------------------------------------
// Dispatch
// ---------------------------------------------------------------------------

pub fn dispatch(cli: Cli) -> Result<(), Box<dyn std::error::Error>> {
    let json = cli.json;

    if let Some(ref dir) = cli.library_dir {
        let abs = std::fs::canonicalize(dir)
            .map_err(|e| format!("cannot resolve -C path '{}': {}", dir, e))?;
        LIBRARY_DIR_OVERRIDE.lock().unwrap().replace(abs);
    }

    match cli.command {
        Commands::Init(args) => cmd_init(args),
        Commands::List => cmd_list(json),
        Commands::Show(args) => cmd_show(args, json),
        Commands::Add(args) => cmd_add(args),
        Commands::Rm(args) => cmd_rm(args),
        Commands::Link(args) => cmd_link(args),
        Commands::Unlink(args) => cmd_unlink(args),
        Commands::Schedule(args) => cmd_schedule(args),
        Commands::Unschedule(args) => cmd_unschedule(args),
        Commands::Resolve(args) => cmd_resolve(args, json),
        Commands::Check(args) => cmd_check(args, json),
    }
}

// ---------------------------------------------------------------------------
// Helpers
// ---------------------------------------------------------------------------

fn start_dir() -> Result<PathBuf, LibraryError> {
    match LIBRARY_DIR_OVERRIDE.lock().unwrap().as_ref() {
        Some(dir) => Ok(dir.clone()),
        None => std::env::current_dir().map_err(LibraryError::IoError),
    }
}

fn load_library_cwd() -> Result<Library, LibraryError> {
    let root = library_io::discover_library(&start_dir()?)?;
    library_io::load_library(&root)
}

/// Apply one action to the loaded library and write the result back
fn apply_and_save(library: &Library, action: Action) -> Result<StoreState, Box<dyn std::error::Error>> {
    let state = StoreState::new(library.templates.clone(), library.calendar.clone());
    let next = store_ops::apply(&state, action)?;
    library_io::save_library(&library.cadence_dir, &next.templates, &next.calendar)?;
    Ok(next)
}

/// Derive a sortable id from a template name: lowercase, alphanumeric runs
/// joined by dashes, numeric suffix when taken.
fn derive_id(name: &str, taken: impl Fn(&str) -> bool) -> String {
    let mut slug = String::new();
    let mut last_dash = true;
    for c in name.chars() {
        if c.is_ascii_alphanumeric() {
            slug.push(c.to_ascii_lowercase());
            last_dash = false;
        } else if !last_dash {
            slug.push('-');
            last_dash = true;
        }
    }
    let slug = slug.trim_end_matches('-').to_string();
    let slug = if slug.is_empty() { "template".to_string() } else { slug };

    if !taken(&slug) {
        return slug;
    }
    let mut n = 2usize;
    loop {
        let candidate = format!("{}-{}", slug, n);
        if !taken(&candidate) {
            return candidate;
        }
        n += 1;
    }
}

fn now_or(at: &Option<String>) -> Result<i64, Box<dyn std::error::Error>> {
    match at {
        None => Ok(Utc::now().timestamp_millis()),
        Some(s) => {
            parse_instant_ms(s).ok_or_else(|| format!("cannot parse time '{}'", s).into())
        }
    }
}

// ---------------------------------------------------------------------------
// Commands
// ---------------------------------------------------------------------------

fn cmd_init(args: InitArgs) -> Result<(), Box<dyn std::error::Error>> {
    let dir = start_dir()?;
    let name = match args.name {
        Some(name) => name,
        None => dir
            .file_name()
            .and_then(|s| s.to_str())
            .unwrap_or("cadence")
            .to_string(),
    };
    library_io::init_library(&dir, &name)?;
    println!("initialized cadence library '{}' in {}", name, dir.display());
    Ok(())
}

fn cmd_list(json: bool) -> Result<(), Box<dyn std::error::Error>> {
    let library = load_library_cwd()?;
    if json {
        let items: Vec<TemplateJson> = library
            .templates
            .iter()
            .map(TemplateJson::from_template)
            .collect();
        println!("{}", serde_json::to_string_pretty(&items)?);
        return Ok(());
    }
    for t in &library.templates {
        println!("{}", format_template_line(t));
    }
    Ok(())
}

fn cmd_show(args: ShowArgs, json: bool) -> Result<(), Box<dyn std::error::Error>> {
    let library = load_library_cwd()?;
    let template = library
        .templates
        .get(&args.id)
        .ok_or_else(|| format!("template not found: {}", args.id))?;
    if json {
        println!(
            "{}",
            serde_json::to_string_pretty(&template.to_record())?
        );
        return Ok(());
    }
    print!("{}", format_template_details(template, &library.calendar));
    Ok(())
}

fn cmd_add(args: AddArgs) -> Result<(), Box<dyn std::error::Error>> {
    let library = load_library_cwd()?;
    let duration_ms = parse_duration_ms(&args.duration)
        .ok_or_else(|| format!("cannot parse duration '{}'", args.duration))?;

    let id = match args.id {
        Some(id) => id,
        None => derive_id(&args.name, |candidate| library.templates.contains(candidate)),
    };
    let template = match args.kind.as_str() {
        "leaf" => Template::leaf(&id, &args.name, duration_ms),
        "timed" => Template::timed(&id, &args.name, duration_ms),
        "sequential" => Template::sequential(&id, &args.name, duration_ms),
        other => return Err(format!("unknown template kind '{}'", other).into()),
    };

    apply_and_save(&library, Action::CreateTemplate { template })?;
    println!("added {}", id);
    Ok(())
}

fn cmd_rm(args: RmArgs) -> Result<(), Box<dyn std::error::Error>> {
    let library = load_library_cwd()?;
    apply_and_save(&library, Action::DeleteTemplateById { id: args.id.clone() })?;
    println!("deleted {}", args.id);
    Ok(())
}

fn cmd_link(args: LinkArgs) -> Result<(), Box<dyn std::error::Error>> {
    let library = load_library_cwd()?;
    let start_offset_ms = match &args.offset {
        None => None,
        Some(s) => Some(
            parse_duration_ms(s).ok_or_else(|| format!("cannot parse offset '{}'", s))?,
        ),
    };
    apply_and_save(
        &library,
        Action::AddChildToTemplate {
            parent_id: args.parent.clone(),
            child_id: args.child.clone(),
            start_offset_ms,
        },
    )?;
    println!("linked {} under {}", args.child, args.parent);
    Ok(())
}

fn cmd_unlink(args: UnlinkArgs) -> Result<(), Box<dyn std::error::Error>> {
    let library = load_library_cwd()?;
    match (args.id, args.rel) {
        (Some(id), None) => {
            apply_and_save(&library, Action::RemoveInstanceById { id: id.clone() })?;
            println!("unlinked {} from all parents", id);
            Ok(())
        }
        (None, Some(rel)) => {
            apply_and_save(
                &library,
                Action::RemoveInstanceByRelationshipId {
                    relationship_id: rel.clone(),
                },
            )?;
            println!("removed edge {}", rel);
            Ok(())
        }
        _ => Err("pass either a template id or --rel, not both".into()),
    }
}

fn cmd_schedule(args: ScheduleArgs) -> Result<(), Box<dyn std::error::Error>> {
    let library = load_library_cwd()?;
    let start_ms = parse_instant_ms(&args.at)
        .ok_or_else(|| format!("cannot parse time '{}'", args.at))?;

    let entry_id = match args.entry_id {
        Some(id) => id,
        None => {
            let mut n = 0usize;
            loop {
                let candidate = format!("{}@{}", args.template, n);
                if !library.calendar.contains_key(&candidate) {
                    break candidate;
                }
                n += 1;
            }
        }
    };

    apply_and_save(
        &library,
        Action::AddCalendarEntry {
            entry: BaseCalendarEntry::new(&entry_id, &args.template, start_ms),
        },
    )?;
    println!("scheduled {} as {}", args.template, entry_id);
    Ok(())
}

fn cmd_unschedule(args: UnscheduleArgs) -> Result<(), Box<dyn std::error::Error>> {
    let library = load_library_cwd()?;
    apply_and_save(
        &library,
        Action::RemoveCalendarEntry {
            entry_id: args.entry_id.clone(),
        },
    )?;
    println!("unscheduled {}", args.entry_id);
    Ok(())
}

fn cmd_resolve(args: ResolveArgs, json: bool) -> Result<(), Box<dyn std::error::Error>> {
    let library = load_library_cwd()?;
    let now_ms = now_or(&args.at)?;
    let chain = resolve_chain_with_budget(
        &library.templates,
        &library.calendar,
        now_ms,
        library.config.engine.soft_latency_ms,
    );
    if json {
        println!(
            "{}",
            serde_json::to_string_pretty(&chain_json(&chain, &library.calendar, now_ms))?
        );
        return Ok(());
    }
    println!("{}", format_chain(&chain, &library.calendar, now_ms).trim_end());
    Ok(())
}

fn cmd_check(args: CheckArgs, json: bool) -> Result<(), Box<dyn std::error::Error>> {
    let library = load_library_cwd()?;
    let result = check::validate(&library.templates, &library.calendar);

    if json {
        println!("{}", serde_json::to_string_pretty(&result)?);
    } else {
        print!("{}", format_check_result(&result));
    }

    if result.valid {
        return Ok(());
    }
    if args.repair {
        if let Some(repaired) = &result.repaired {
            library_io::save_library(
                &library.cadence_dir,
                &repaired.templates,
                &repaired.calendar,
            )?;
            println!("repaired {} issue(s)", result.errors.len());
        }
        return Ok(());
    }
    Err("library has consistency errors (rerun with --repair to fix)".into())
}
