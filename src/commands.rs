use std::path::{Path, PathBuf};
use std::time::Instant;

use anyhow::Context as _;
use chrono::{Local, NaiveDate, NaiveDateTime, TimeZone};
use clap::{Args, Subcommand};
use indicatif::HumanDuration;
use owo_colors::OwoColorize;

use crate::{emit_success, OutputMode};
use flowlog::config::{ensure_db_dir, load_config, write_config, FlowlogConfig};
use flowlog::preferences::{FilePreferences, PreferencesStore};
use flowlog::report::{self, Averaged, Category, Direction, Filter, Metric};
use flowlog::storage::schema::DEFAULT_AXIS_NAME;
use flowlog::storage::{MigrationReport, SCHEMA_VERSION};
use flowlog::ui::{self, Icons};
use flowlog::{Axis, Error, Reflection, SqliteStore, Store, SyncOutcome};

#[derive(Args)]
pub struct AddArgs {
    /// Activity name
    name: String,

    /// Engagement, 0..100
    #[arg(short, long)]
    engagement: i32,

    /// Energy gained or drained, -100..100
    #[arg(short = 'n', long, allow_hyphen_values = true)]
    energy: i32,

    /// Mark as a flow state
    #[arg(short, long)]
    flow: bool,

    /// Free-text note
    #[arg(long, default_value = "")]
    note: String,

    /// Tag (repeatable)
    #[arg(short, long = "tag")]
    tags: Vec<String>,

    /// Axis (defaults to the active axis)
    #[arg(short, long)]
    axis: Option<String>,

    /// When it happened: epoch seconds, YYYY-MM-DD or "YYYY-MM-DD HH:MM" (defaults to now)
    #[arg(long)]
    date: Option<String>,
}

#[derive(Args)]
pub struct EditArgs {
    #[arg(long)]
    name: Option<String>,

    #[arg(short, long)]
    engagement: Option<i32>,

    #[arg(short = 'n', long, allow_hyphen_values = true)]
    energy: Option<i32>,

    /// Set the flow-state flag
    #[arg(long)]
    flow: Option<bool>,

    #[arg(long)]
    note: Option<String>,

    /// Replace all tags (repeatable)
    #[arg(short, long = "tag")]
    tags: Option<Vec<String>>,

    #[arg(short, long)]
    axis: Option<String>,

    #[arg(long)]
    date: Option<String>,
}

#[derive(Subcommand)]
pub enum AxisCommand {
    /// List all axes
    List,
    /// Create an axis
    Add {
        name: String,
        #[arg(long)]
        hidden: bool,
    },
    /// Rename an axis
    Rename { from: String, to: String },
    /// Hide an axis from default listings
    Hide { name: String },
    /// Show a hidden axis again
    Show { name: String },
    /// Delete empty axes
    Delete {
        #[arg(required = true)]
        names: Vec<String>,
    },
    /// Move every reflection of one axis into another and delete the first
    Merge { from: String, into: String },
    /// Make an axis the active one
    Use { name: String },
}

#[derive(Subcommand)]
pub enum RenameCommand {
    /// Rename every reflection with this activity name
    Activity { from: String, to: String },
    /// Rename a tag on every reflection
    Tag { from: String, to: String },
}

#[derive(Args)]
pub struct ReportArgs {
    /// Axis to report on (defaults to the active axis)
    #[arg(short, long)]
    axis: Option<String>,

    /// Group into buckets: activity or tag
    #[arg(long)]
    by: Option<Category>,

    /// Ranking metric: engagement, energy or combined
    #[arg(short, long, default_value = "combined")]
    metric: Metric,

    /// Rank worst first
    #[arg(short, long)]
    worst: bool,

    /// Only reflections with this activity name
    #[arg(long)]
    activity: Option<String>,

    /// Only reflections with this tag
    #[arg(long)]
    tag: Option<String>,

    /// Only flow (true) or non-flow (false) reflections
    #[arg(long)]
    flow: Option<bool>,

    /// Only reflections at or after this date
    #[arg(long)]
    since: Option<String>,

    /// Maximum number of buckets
    #[arg(short, long)]
    limit: Option<usize>,
}

/// Resolved paths and output mode for one invocation
pub struct Context {
    pub config_path: PathBuf,
    pub database: PathBuf,
    pub preferences: PathBuf,
    pub output: OutputMode,
}

impl Context {
    pub fn resolve(
        database: Option<PathBuf>,
        config: Option<PathBuf>,
        output: OutputMode,
    ) -> anyhow::Result<Self> {
        let config_path = config.unwrap_or_else(flowlog::config::default_config_path);
        let loaded = load_config(Some(&config_path))?.unwrap_or_default();
        let database = loaded.database_path(database.as_deref());
        let preferences = loaded.preferences_path(&database);
        Ok(Self {
            config_path,
            database,
            preferences,
            output,
        })
    }

    fn open_storage(&self, target: u32) -> anyhow::Result<(SqliteStore, MigrationReport)> {
        ensure_db_dir(&self.database)?;
        SqliteStore::open_at(&self.database, target)
            .with_context(|| format!("failed to open {}", self.database.display()))
    }

    /// Open the database at the latest schema and start the store worker
    pub fn open_store(&self) -> anyhow::Result<Store> {
        let (storage, migration) = self.open_storage(SCHEMA_VERSION)?;
        if self.output.is_human() && !migration.is_noop() && migration.from > 0 {
            print_migration(&migration);
        }
        let preferences: Box<dyn PreferencesStore> =
            Box::new(FilePreferences::new(self.preferences.clone()));
        Ok(Store::spawn(storage, Some(preferences))?)
    }
}

pub fn run_init(ctx: &Context, force: bool) -> anyhow::Result<()> {
    let config = FlowlogConfig {
        database: Some(ctx.database.display().to_string()),
        preferences: None,
    };
    write_config(&ctx.config_path, &config, force)?;
    let (storage, migration) = ctx.open_storage(SCHEMA_VERSION)?;
    let stats = storage.stats()?;

    if ctx.output.is_human() {
        ui::banner("Flowlog initialized", "Log your first reflection with `flowlog add`");
        ui::status(Icons::GEAR, "Config", &ctx.config_path.display().to_string());
        ui::status(Icons::DATABASE, "Database", &ctx.database.display().to_string());
        ui::status(Icons::PACKAGE, "Contents", &stats.to_string());
        if migration.from > 0 && !migration.is_noop() {
            print_migration(&migration);
        }
    } else {
        emit_success(
            ctx.output,
            "init",
            serde_json::json!({
                "config": ctx.config_path,
                "database": ctx.database,
                "migration": migration,
                "stats": stats,
            }),
        )?;
    }
    Ok(())
}

pub fn run_migrate(ctx: &Context, to: Option<u32>) -> anyhow::Result<()> {
    let target = to.unwrap_or(SCHEMA_VERSION);
    if ctx.output.is_human() {
        ui::phase(&format!("Schema migration to v{}", target));
    }
    let start = Instant::now();
    let spinner = ui::Spinner::new(&format!("Migrating {}", ctx.database.display()));
    let result = ctx.open_storage(target);
    spinner.clear();
    let (_, migration) = result?;

    if ctx.output.is_human() {
        if migration.is_noop() {
            ui::success(&format!("Already at schema v{}", migration.to));
        } else {
            print_migration(&migration);
            ui::timing(&HumanDuration(start.elapsed()).to_string());
        }
    } else {
        emit_success(ctx.output, "migrate", &migration)?;
    }
    Ok(())
}

pub async fn run_add(ctx: &Context, store: &Store, args: AddArgs) -> anyhow::Result<()> {
    let axis = match args.axis {
        Some(axis) => axis,
        None => active_axis(store).await?,
    };
    let date = parse_date(args.date.as_deref())?;
    let reflection = Reflection::new(args.name, axis, args.engagement, args.energy, date)
        .with_flow_state(args.flow)
        .with_note(args.note)
        .with_tags(args.tags);

    let id = store.add_reflection(reflection.clone()).await?;

    if ctx.output.is_human() {
        ui::reflection_added(id, &reflection.name);
        ui::summary_row("axis", &reflection.axis);
    } else {
        emit_success(ctx.output, "add", reflection.with_id(id))?;
    }
    Ok(())
}

pub async fn run_edit(ctx: &Context, store: &Store, id: i64, edit: EditArgs) -> anyhow::Result<()> {
    let mut reflection = store
        .fetch_reflection(id)
        .await?
        .ok_or(Error::ReflectionNotFound(id))?;

    if let Some(name) = edit.name {
        reflection.name = name;
    }
    if let Some(engagement) = edit.engagement {
        reflection.engagement = engagement;
    }
    if let Some(energy) = edit.energy {
        reflection.energy = energy;
    }
    if let Some(flow) = edit.flow {
        reflection.is_flow_state = flow;
    }
    if let Some(note) = edit.note {
        reflection.note = note;
    }
    if let Some(tags) = edit.tags {
        reflection.tags = tags.into_iter().collect();
    }
    if let Some(axis) = edit.axis {
        reflection.axis = axis;
    }
    if edit.date.is_some() {
        reflection.date = parse_date(edit.date.as_deref())?;
    }

    store.update_reflection(reflection.clone()).await?;

    if ctx.output.is_human() {
        ui::reflection_updated(id, &reflection.name);
    } else {
        emit_success(ctx.output, "edit", &reflection)?;
    }
    Ok(())
}

pub async fn run_delete(ctx: &Context, store: &Store, ids: Vec<i64>) -> anyhow::Result<()> {
    let deleted = store.delete_reflections(ids.clone()).await?;

    if ctx.output.is_human() {
        for id in &ids {
            ui::reflection_deleted(*id);
        }
        if deleted < ids.len() {
            ui::warn(&format!("{} of {} id(s) did not exist", ids.len() - deleted, ids.len()));
        }
    } else {
        emit_success(ctx.output, "delete", serde_json::json!({ "deleted": deleted }))?;
    }
    Ok(())
}

pub async fn run_list(
    ctx: &Context,
    store: &Store,
    axis: Option<&str>,
    limit: Option<usize>,
) -> anyhow::Result<()> {
    sync(store, axis).await?;
    let snapshot = store.snapshot();
    let shown = &snapshot.reflections[..limit.unwrap_or(usize::MAX).min(snapshot.reflections.len())];

    if ctx.output.is_human() {
        ui::header(snapshot.axis_name().unwrap_or("(no axis)"));
        if shown.is_empty() {
            println!("{}", ui::muted("No reflections yet."));
        } else {
            println!("{}", ui::reflection_table(shown, format_date));
        }
        if shown.len() < snapshot.reflections.len() {
            let hidden = snapshot.reflections.len() - shown.len();
            println!("{}", ui::dim(&format!("{} more not shown", hidden)));
        }
    } else {
        emit_success(
            ctx.output,
            "list",
            serde_json::json!({
                "axis": snapshot.axis,
                "reflections": shown,
            }),
        )?;
    }
    Ok(())
}

pub async fn run_axis(ctx: &Context, store: &Store, command: AxisCommand) -> anyhow::Result<()> {
    match command {
        AxisCommand::List => {
            sync(store, None).await?;
            let snapshot = store.snapshot();
            let mut axes: Vec<Axis> = snapshot
                .visible_axes
                .iter()
                .chain(&snapshot.hidden_axes)
                .cloned()
                .collect();
            axes.sort_by_key(|a| a.id);

            if ctx.output.is_human() {
                println!("{}", ui::axis_table(&axes, snapshot.axis_name()));
            } else {
                emit_success(
                    ctx.output,
                    "axis list",
                    serde_json::json!({ "active": snapshot.axis_name(), "axes": axes }),
                )?;
            }
        }
        AxisCommand::Add { name, hidden } => {
            let axis = store.add_axis(name, hidden).await?;
            done(ctx, "axis add", &format!("Created axis {}", axis), &axis)?;
        }
        AxisCommand::Rename { from, to } => {
            let axis = find_axis(store, &from).await?;
            let renamed = Axis { name: to, ..axis };
            store.update_axis(renamed.clone()).await?;
            done(ctx, "axis rename", &format!("Renamed {} to {}", from, renamed.name), &renamed)?;
        }
        AxisCommand::Hide { name } => set_hidden(ctx, store, &name, true).await?,
        AxisCommand::Show { name } => set_hidden(ctx, store, &name, false).await?,
        AxisCommand::Delete { names } => {
            let deleted = store.delete_axes(names.clone()).await.map_err(|e| {
                if e.is_constraint_violation() {
                    anyhow::anyhow!("cannot delete {:?}: axes still hold reflections (merge them first)", names)
                } else {
                    e.into()
                }
            })?;
            done(
                ctx,
                "axis delete",
                &format!("Deleted {} axis/axes", deleted),
                serde_json::json!({ "deleted": deleted }),
            )?;
        }
        AxisCommand::Merge { from, into } => {
            let moved = store.merge_axis(from.clone(), into.clone()).await?;
            done(
                ctx,
                "axis merge",
                &format!("Moved {} reflection(s) from {} into {}", moved, from, into),
                serde_json::json!({ "moved": moved }),
            )?;
        }
        AxisCommand::Use { name } => {
            sync(store, Some(&name)).await?;
            done(ctx, "axis use", &format!("Active axis is now {}", name), &store.snapshot().axis)?;
        }
    }
    Ok(())
}

pub async fn run_rename(ctx: &Context, store: &Store, command: RenameCommand) -> anyhow::Result<()> {
    match command {
        RenameCommand::Activity { from, to } => store.rename_activity(from, to),
        RenameCommand::Tag { from, to } => store.rename_tag(from, to),
    }
    let queued = store.pending_renames();
    let applied = store.flush_renames().await?;

    let summary: Vec<String> = queued.iter().map(ToString::to_string).collect();
    done(
        ctx,
        "rename",
        &format!("Applied {}", summary.join(", ")),
        serde_json::json!({ "applied": applied, "renames": queued }),
    )
}

pub async fn run_report(ctx: &Context, store: &Store, args: ReportArgs) -> anyhow::Result<()> {
    sync(store, args.axis.as_deref()).await?;
    let snapshot = store.snapshot();

    let mut filters = Vec::new();
    if let Some(activity) = args.activity {
        filters.push(Filter::Activity(activity));
    }
    if let Some(tag) = args.tag {
        filters.push(Filter::Tag(tag));
    }
    if let Some(flow) = args.flow {
        filters.push(Filter::FlowState(flow));
    }
    if let Some(since) = args.since.as_deref() {
        filters.push(Filter::Since(parse_date(Some(since))?));
    }
    let selected: Vec<Reflection> = snapshot
        .reflections
        .iter()
        .filter(|r| filters.iter().all(|f| f.matches(r)))
        .cloned()
        .collect();

    let label = snapshot.axis_name().map(str::to_string);
    let overall = Averaged::make(&selected, label.clone());
    let direction = if args.worst { Direction::Worst } else { Direction::Best };
    let mut buckets = match args.by {
        Some(category) => report::ranked(&selected, category, args.metric, direction),
        None => Vec::new(),
    };
    if let Some(limit) = args.limit {
        buckets.truncate(limit);
    }

    if !ctx.output.is_human() {
        return emit_success(
            ctx.output,
            "report",
            serde_json::json!({
                "axis": label,
                "overall": overall,
                "by": args.by.map(|c| c.as_str()),
                "metric": args.metric.as_str(),
                "direction": direction,
                "buckets": buckets,
            }),
        );
    }

    ui::header(&format!("Report: {}", label.as_deref().unwrap_or("(no axis)")));
    match &overall {
        None => println!("{}", ui::muted("No matching reflections.")),
        Some(avg) => {
            ui::summary_row("reflections", &avg.count().to_string());
            ui::summary_row("engagement", &avg.engagement.to_string());
            ui::summary_row("energy", &ui::signed(avg.energy));
            ui::summary_row(
                "flow",
                &format!(
                    "{} {}/{}",
                    Icons::WAVE.style(ui::theme().flow.clone()),
                    avg.flow_state_yes,
                    avg.count()
                ),
            );
        }
    }
    if let Some(category) = args.by {
        let arrow = if args.worst { Icons::DOWN } else { Icons::UP };
        ui::section(&format!(
            " {} {} by {} ",
            arrow,
            category.as_str(),
            args.metric.as_str()
        ));
        if buckets.is_empty() {
            println!("{}", ui::muted("Nothing to rank."));
        } else {
            println!("{}", ui::averaged_table(&buckets));
        }
    }
    Ok(())
}

pub async fn run_export(ctx: &Context, store: &Store, output: Option<PathBuf>) -> anyhow::Result<()> {
    let text = store.export().await?;
    let Some(path) = output else {
        print!("{}", text);
        return Ok(());
    };

    std::fs::write(&path, &text).with_context(|| format!("failed to write {}", path.display()))?;
    let records = text.lines().count().saturating_sub(2);
    done(
        ctx,
        "export",
        &format!("Exported {} reflection(s) to {}", records, path.display()),
        serde_json::json!({ "path": path, "records": records }),
    )
}

pub async fn run_import(ctx: &Context, store: &Store, path: &Path) -> anyhow::Result<()> {
    let text = std::fs::read_to_string(path).with_context(|| format!("failed to read {}", path.display()))?;
    let start = Instant::now();
    let spinner = ui::Spinner::new(&format!("Importing {}", path.display()));
    let result = store.import(text).await;
    spinner.clear();
    let imported = result?;

    done(
        ctx,
        "import",
        &format!("Imported {} reflection(s) in {}", imported, HumanDuration(start.elapsed())),
        serde_json::json!({ "imported": imported }),
    )
}

pub async fn run_stats(ctx: &Context, store: &Store) -> anyhow::Result<()> {
    let stats = store.stats().await?;

    if ctx.output.is_human() {
        ui::header(&format!("{} Flowlog Statistics", Icons::STATS));
        ui::info("Database", &ctx.database.display().to_string());
        println!(
            "{}",
            ui::stats_table(&[
                ("Schema version", &stats.schema_version.to_string()),
                ("Reflections", &stats.reflections.to_string()),
                ("Axes", &stats.axes.to_string()),
                ("Tags", &stats.tags.to_string()),
            ])
        );
    } else {
        emit_success(ctx.output, "stats", &stats)?;
    }
    Ok(())
}

async fn sync(store: &Store, axis: Option<&str>) -> anyhow::Result<()> {
    match store.sync(axis).await? {
        SyncOutcome::Published { .. } => Ok(()),
        SyncOutcome::Rejected => anyhow::bail!("a sync is already running"),
    }
}

async fn active_axis(store: &Store) -> anyhow::Result<String> {
    sync(store, None).await?;
    Ok(store
        .snapshot()
        .axis_name()
        .unwrap_or(DEFAULT_AXIS_NAME)
        .to_string())
}

async fn find_axis(store: &Store, name: &str) -> anyhow::Result<Axis> {
    sync(store, None).await?;
    let snapshot = store.snapshot();
    snapshot
        .visible_axes
        .iter()
        .chain(&snapshot.hidden_axes)
        .find(|a| a.name == name)
        .cloned()
        .ok_or_else(|| Error::AxisNotFound(name.to_string()).into())
}

async fn set_hidden(ctx: &Context, store: &Store, name: &str, is_hidden: bool) -> anyhow::Result<()> {
    let axis = Axis {
        is_hidden,
        ..find_axis(store, name).await?
    };
    store.update_axis(axis.clone()).await?;
    let state = if is_hidden { "hidden" } else { "visible" };
    done(ctx, "axis", &format!("Axis {} is now {}", axis.name, state), &axis)
}

/// Success line in human mode, JSON envelope otherwise
fn done<T: serde::Serialize>(ctx: &Context, command: &str, message: &str, data: T) -> anyhow::Result<()> {
    if ctx.output.is_human() {
        ui::success(message);
        Ok(())
    } else {
        emit_success(ctx.output, command, data)
    }
}

fn print_migration(migration: &MigrationReport) {
    let arrow = if migration.to > migration.from { Icons::UP } else { Icons::DOWN };
    ui::status(
        arrow,
        "Schema",
        &format!("v{} {} v{} (steps {:?})", migration.from, Icons::RIGHT, migration.to, migration.applied),
    );
    if let Some(backup) = &migration.backup {
        ui::status(Icons::DATABASE, "Backup", &backup.display().to_string());
    }
}

/// Epoch seconds, `YYYY-MM-DD HH:MM` or `YYYY-MM-DD` in local time; now when absent
fn parse_date(input: Option<&str>) -> anyhow::Result<i64> {
    let Some(raw) = input.map(str::trim) else {
        return Ok(Local::now().timestamp());
    };
    if let Ok(ts) = raw.parse::<i64>() {
        return Ok(ts);
    }
    let naive = match NaiveDateTime::parse_from_str(raw, "%Y-%m-%d %H:%M") {
        Ok(dt) => dt,
        Err(_) => NaiveDate::parse_from_str(raw, "%Y-%m-%d")
            .ok()
            .and_then(|d| d.and_hms_opt(0, 0, 0))
            .with_context(|| format!("unrecognized date {:?}", raw))?,
    };
    Local
        .from_local_datetime(&naive)
        .earliest()
        .map(|dt| dt.timestamp())
        .ok_or_else(|| anyhow::anyhow!("{:?} does not exist in the local time zone", raw))
}

fn format_date(ts: i64) -> String {
    match Local.timestamp_opt(ts, 0).single() {
        Some(dt) => dt.format("%Y-%m-%d %H:%M").to_string(),
        None => ts.to_string(),
    }
}
