use std::{env, rc::Rc, sync::Arc, time::Duration};

use anyhow::{Context, bail};
use chrono::{Datelike, Local};
use tokio_util::sync::CancellationToken;

use yearcal::{
    Event,
    categories::{
        Category, CategoryInput, CategoryRegistry, MatchMode,
        matcher::{CategorizedEvent, categorize_events, tally},
    },
    storage::{DisabledCalendars, SqliteStore, config::Config},
    sync::{
        cloud_sync::{CategorySink, DebouncedSync, HttpCategorySink, LogSink, NoopTrigger, SyncTrigger},
        sync_engine::SyncEngine,
    },
};

pub const USAGE: &str = "Usage: yearcal [--year YYYY] [--token TOKEN] [summary | calendars | toggle-calendar ID | categories | add-category LABEL COLOR KEYWORDS [--all] | remove-category ID | restore-default ID | reset-categories]";
pub const TOKEN_ENV: &str = "YEARCAL_ACCESS_TOKEN";
pub const SYNC_TOKEN_ENV: &str = "YEARCAL_SYNC_TOKEN";

#[derive(Debug, Clone, PartialEq)]
pub enum Command {
    Summary,
    Calendars,
    ToggleCalendar(String),
    Categories,
    AddCategory(CategoryInput),
    RemoveCategory(String),
    RestoreDefault(String),
    ResetCategories,
}

#[derive(Debug, Clone, PartialEq)]
pub struct CliOptions {
    pub year: i32,
    pub token: Option<String>,
    pub command: Command,
}

pub fn parse_cli<I>(args: I) -> Result<CliOptions, String>
where
    I: IntoIterator<Item = String>,
{
    let mut year = Local::now().year();
    let mut token = None;
    let mut match_all = false;
    let mut positional = Vec::new();
    let mut args = args.into_iter();

    while let Some(arg) = args.next() {
        match arg.as_str() {
            "--year" => {
                let value = args.next().ok_or("--year needs a value")?;
                year = value
                    .parse()
                    .map_err(|_| format!("Invalid year '{}'. Use YYYY.", value))?;
            }
            "--token" => {
                token = Some(args.next().ok_or("--token needs a value")?);
            }
            "--all" => match_all = true,
            "--help" => {
                println!("{}", USAGE);
                std::process::exit(0);
            }
            flag if flag.starts_with("--") => return Err(format!("Unknown argument: {}", flag)),
            _ => positional.push(arg),
        }
    }

    let mut positional = positional.into_iter();
    let name = positional.next();
    let mut operand = |what: &str| {
        positional
            .next()
            .ok_or_else(|| format!("Missing {} for {}", what, name.as_deref().unwrap_or("")))
    };

    let command = match name.as_deref() {
        None | Some("summary") => Command::Summary,
        Some("calendars") => Command::Calendars,
        Some("toggle-calendar") => Command::ToggleCalendar(operand("calendar id")?),
        Some("categories") => Command::Categories,
        Some("add-category") => {
            let label = operand("label")?;
            let color = operand("color")?;
            let keywords = operand("keywords")?;
            let match_mode = if match_all { MatchMode::All } else { MatchMode::Any };
            Command::AddCategory(CategoryInput {
                label,
                color,
                keywords: keywords.split(',').map(str::to_string).collect(),
                match_mode,
            })
        }
        Some("remove-category") => Command::RemoveCategory(operand("category id")?),
        Some("restore-default") => Command::RestoreDefault(operand("category id")?),
        Some("reset-categories") => Command::ResetCategories,
        Some(other) => return Err(format!("Unknown command: {}", other)),
    };

    Ok(CliOptions { year, token, command })
}

pub async fn run(options: CliOptions) -> anyhow::Result<()> {
    let config = Config::load_or_create().context("Failed to load config")?;
    let kv = Rc::new(
        SqliteStore::open(&config.storage.database).context("Failed to open local storage")?,
    );
    let token = options.token.or_else(|| env::var(TOKEN_ENV).ok());

    match options.command {
        Command::Summary => {
            let token = require_token(token)?;
            let cancel = CancellationToken::new();
            let on_interrupt = cancel.clone();
            tokio::spawn(async move {
                if tokio::signal::ctrl_c().await.is_ok() {
                    on_interrupt.cancel();
                }
            });

            let disabled = DisabledCalendars::new(Rc::clone(&kv)).load();
            let engine = SyncEngine::from_config(&config, token, cancel);
            let events = without_cancelled(engine.fetch_year(options.year, &disabled).await?);

            let categories = CategoryRegistry::new(Rc::clone(&kv), NoopTrigger).categories();
            let categorized = categorize_events(events, &categories);
            println!("{}", format_summary(options.year, &categorized, &categories));
        }
        Command::Calendars => {
            let token = require_token(token)?;
            let engine = SyncEngine::from_config(&config, token, CancellationToken::new());
            let disabled = DisabledCalendars::new(Rc::clone(&kv));
            for calendar in engine.calendars().await? {
                let marker = if disabled.is_disabled(&calendar.id) { " " } else { "x" };
                println!("[{}] {} ({}, {})", marker, calendar.summary, calendar.id, calendar.access_role.as_str());
            }
        }
        Command::ToggleCalendar(id) => {
            let now_disabled = DisabledCalendars::new(Rc::clone(&kv)).toggle(&id)?;
            println!("{} {}", if now_disabled { "Disabled" } else { "Enabled" }, id);
        }
        Command::Categories => {
            let registry = CategoryRegistry::new(Rc::clone(&kv), NoopTrigger);
            println!("{}", format_categories(&registry.sorted_categories(), &registry.removed_defaults()));
        }
        mutation => {
            let sync = DebouncedSync::spawn(
                category_sink(&config, env::var(SYNC_TOKEN_ENV).ok()),
                Duration::from_millis(config.sync.debounce_ms),
            );
            let outcome = {
                let mut registry = CategoryRegistry::new(Rc::clone(&kv), &sync);
                apply_mutation(&mut registry, mutation)
            };
            sync.shutdown().await;
            println!("{}", outcome?);
        }
    }

    Ok(())
}

fn require_token(token: Option<String>) -> anyhow::Result<String> {
    match token {
        Some(token) if !token.trim().is_empty() => Ok(token),
        _ => bail!("No access token; pass --token or set {}", TOKEN_ENV),
    }
}

fn without_cancelled(events: Vec<Event>) -> Vec<Event> {
    let (kept, cancelled): (Vec<_>, Vec<_>) = events.into_iter().partition(|e| !e.is_cancelled());
    if !cancelled.is_empty() {
        tracing::info!("Leaving {} cancelled events out of the summary", cancelled.len());
    }
    kept
}

fn category_sink(config: &Config, sync_token: Option<String>) -> Arc<dyn CategorySink> {
    match &config.sync.endpoint {
        Some(url) => {
            let sink = HttpCategorySink::new(url.clone());
            match sync_token {
                Some(token) => Arc::new(sink.with_access_token(token)),
                None => Arc::new(sink),
            }
        }
        None => Arc::new(LogSink),
    }
}

fn apply_mutation<T: SyncTrigger>(
    registry: &mut CategoryRegistry<Rc<SqliteStore>, T>,
    command: Command,
) -> anyhow::Result<String> {
    let message = match command {
        Command::AddCategory(input) => match registry.add_category(&input) {
            Ok(category) => format!("Added {} ({})", category.label, category.id),
            Err(e) => bail!("{}", e),
        },
        Command::RemoveCategory(id) => match registry.remove_category(&id)? {
            true => format!("Removed {}", id),
            false => format!("Nothing to remove for {}", id),
        },
        Command::RestoreDefault(id) => match registry.restore_default(&id)? {
            true => format!("Restored {}", id),
            false => format!("{} is not a removed default", id),
        },
        Command::ResetCategories => {
            registry.reset_to_defaults()?;
            "Categories reset to defaults".to_string()
        }
        other => bail!("Not a category change: {:?}", other),
    };
    Ok(message)
}

pub fn format_summary(year: i32, categorized: &[CategorizedEvent], categories: &[Category]) -> String {
    let mut lines = vec![format!("Events in {}", year), String::new()];

    for (label, count) in tally(categorized, categories) {
        lines.push(format!("{:<16} {:>5}", label, count));
    }
    lines.push(String::new());

    if categorized.is_empty() {
        lines.push("No events scheduled.".to_string());
    }

    for item in categorized {
        let event = &item.event;
        if event.all_day {
            let when = event.start.format("%Y-%m-%d").to_string();
            lines.push(format!("{:<16} {:<16} {}", when, item.category.label, event.title));
        } else {
            let when = event.start.with_timezone(&Local).format("%Y-%m-%d %H:%M").to_string();
            lines.push(format!(
                "{:<16} {:<16} {} ({} min)",
                when,
                item.category.label,
                event.title,
                event.duration_minutes()
            ));
        }
    }

    lines.join("\n")
}

pub fn format_categories(active: &[Category], removed: &[Category]) -> String {
    let mut lines = Vec::new();

    for category in active {
        let mode = match category.match_mode {
            MatchMode::Any => "any",
            MatchMode::All => "all",
        };
        let kind = if category.is_default { "default" } else { "custom" };
        lines.push(format!(
            "{:<16} {} {:<7} {:<3} {} [{}]",
            category.label,
            category.color,
            kind,
            mode,
            category.keywords.join(", "),
            category.id
        ));
    }

    if !removed.is_empty() {
        lines.push(String::new());
        lines.push("Removed defaults:".to_string());
        for category in removed {
            lines.push(format!("  {} [{}]", category.label, category.id));
        }
    }

    lines.join("\n")
}
