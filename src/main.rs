use anyhow::{Context, Result};
use chrono::Local;
use clap::{Parser, Subcommand, ValueEnum};
use std::env;
use tracing_subscriber::EnvFilter;

use taskmap::commands::{self, task::Direction};
use taskmap::config::{find_workspace, Config, DB_FILE};
use taskmap::context::ViewContext;
use taskmap::dates::{parse_date, today};
use taskmap::db::Database;
use taskmap::models::Role;

#[derive(Parser)]
#[command(name = "taskmap")]
#[command(about = "Recurring tasks, daily completions and productivity reports")]
#[command(version)]
struct Cli {
    /// Email of the acting user
    #[arg(long, global = true, env = "TASKMAP_USER")]
    user: Option<String>,

    /// Email of the user whose map to work on (masters only)
    #[arg(long, global = true)]
    view: Option<String>,

    /// Emit logs as JSON
    #[arg(long, global = true)]
    log_json: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Initialize a taskmap workspace in the current directory
    Init {
        /// Reset config.json to the defaults
        #[arg(long)]
        force: bool,
    },

    /// Manage users
    User {
        #[command(subcommand)]
        action: UserCommands,
    },

    /// Manage task categories
    Category {
        #[command(subcommand)]
        action: CategoryCommands,
    },

    /// Manage tasks
    Task {
        #[command(subcommand)]
        action: TaskCommands,
    },

    /// Toggle a task's completion for a day
    Done {
        /// Task ID
        task: i64,
        /// Day to mark (YYYY-MM-DD, default today)
        #[arg(long)]
        date: Option<String>,
        /// Ignore the shift window and the current-day rule
        #[arg(long)]
        any_time: bool,
    },

    /// Show the pending and completed tasks of a day
    Day {
        /// Day to show (YYYY-MM-DD, default today)
        #[arg(long)]
        date: Option<String>,
    },

    /// Productivity reports
    Report {
        #[command(subcommand)]
        action: ReportCommands,
    },

    /// Day, week and month productivity of every user (masters only)
    Team {
        /// Reference day (YYYY-MM-DD, default today)
        #[arg(long)]
        date: Option<String>,
    },

    /// Time tracking stopwatch
    Timer {
        #[command(subcommand)]
        action: TimerCommands,
    },

    /// Export the viewed user's data
    Export {
        /// Output file (default stdout)
        #[arg(short, long)]
        output: Option<String>,
        /// Format (json, markdown)
        #[arg(short, long, default_value = "json")]
        format: String,
        /// Day of the markdown checklist (YYYY-MM-DD, default today)
        #[arg(long)]
        date: Option<String>,
    },
}

#[derive(Subcommand)]
enum UserCommands {
    /// Register a user
    Add {
        /// Display name
        name: String,
        /// Email, used to select the user
        email: String,
        #[arg(long)]
        sector: Option<String>,
        #[arg(long)]
        position: Option<String>,
    },
    /// List all users (masters only)
    List,
    /// Show a user's profile
    Show,
    /// Edit a user's profile
    Edit {
        #[arg(long)]
        name: Option<String>,
        #[arg(long)]
        sector: Option<String>,
        #[arg(long)]
        position: Option<String>,
    },
    /// Change a user's role
    Promote {
        /// Email of the user to change
        email: String,
        /// New role (normal, master)
        #[arg(long, default_value = "master")]
        role: String,
    },
}

#[derive(Subcommand)]
enum CategoryCommands {
    /// Create a category
    Add {
        name: String,
        /// Hex color such as #D1D5DB
        #[arg(short, long)]
        color: Option<String>,
    },
    /// List categories
    List,
    /// Rename or recolor a category
    Edit {
        id: i64,
        #[arg(short, long)]
        name: Option<String>,
        #[arg(short, long)]
        color: Option<String>,
    },
    /// Delete a category
    Delete { id: i64 },
}

#[derive(Subcommand)]
enum TaskCommands {
    /// Create a task
    Add {
        /// Task name
        name: String,
        /// Category name
        #[arg(short, long)]
        category: Option<String>,
        /// Weekdays such as mon,wed,fri (default: every workday)
        #[arg(short, long)]
        days: Option<String>,
        /// Repeat only for this many weeks from today
        #[arg(short, long)]
        weeks: Option<u32>,
        /// Shift (any, morning, afternoon, evening)
        #[arg(short, long, default_value = "any")]
        shift: String,
        /// Priority (important-urgent, important-not-urgent, urgent-not-important, not-urgent-not-important)
        #[arg(short, long, default_value = "important-urgent")]
        priority: String,
    },
    /// List tasks
    List {
        /// Show archived tasks instead
        #[arg(long)]
        archived: bool,
        /// Filter by priority
        #[arg(short, long)]
        priority: Option<String>,
    },
    /// Show task details
    Show { id: i64 },
    /// Update a task
    Update {
        id: i64,
        #[arg(short, long)]
        name: Option<String>,
        #[arg(short, long)]
        category: Option<String>,
        /// Set the legacy completion flag
        #[arg(long)]
        completed: Option<bool>,
    },
    /// Change a task's priority
    Priority { id: i64, priority: String },
    /// Move a task up or down in its list for a day
    Move {
        id: i64,
        direction: MoveDirection,
        #[arg(long)]
        date: Option<String>,
    },
    /// Archive a task
    Archive { id: i64 },
    /// Restore an archived task
    Unarchive { id: i64 },
    /// Archive every active task
    ArchiveAll,
}

#[derive(Clone, Copy, ValueEnum)]
enum MoveDirection {
    Up,
    Down,
}

impl From<MoveDirection> for Direction {
    fn from(d: MoveDirection) -> Self {
        match d {
            MoveDirection::Up => Direction::Up,
            MoveDirection::Down => Direction::Down,
        }
    }
}

#[derive(Subcommand)]
enum ReportCommands {
    /// A day's tasks grouped by category
    Day {
        #[arg(long)]
        date: Option<String>,
    },
    /// The Sunday-start week containing a day
    Week {
        #[arg(long)]
        date: Option<String>,
    },
    /// A month with its per-day breakdown
    Month {
        /// Month as YYYY-MM (default current month)
        #[arg(long)]
        month: Option<String>,
    },
    /// Time tracked per task
    Time {
        #[arg(long)]
        from: Option<String>,
        #[arg(long)]
        to: Option<String>,
    },
}

#[derive(Subcommand)]
enum TimerCommands {
    /// Start timing a task, or resume the paused timer
    Start {
        /// Task ID
        task: Option<i64>,
        /// Time spent off task
        #[arg(long)]
        off: bool,
    },
    /// Pause the running timer
    Pause,
    /// Stop the timer and record the session
    Finalize,
    /// Show the current timer
    Status,
    /// Follow the running timer until interrupted, then pause it
    Watch,
}

fn init_logging(json: bool) {
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("taskmap=warn"));
    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr);
    if json {
        builder.json().init();
    } else {
        builder.init();
    }
}

fn open_workspace() -> Result<(Database, Config)> {
    let workspace = find_workspace(&env::current_dir()?)?;
    let config = Config::load(&workspace)?;
    let db = Database::open(&workspace.join(DB_FILE)).context("Failed to open database")?;
    Ok((db, config))
}

fn context(db: &Database, config: &Config, cli: &Cli) -> Result<ViewContext> {
    let actor = cli.user.as_deref().or(config.default_user.as_deref());
    commands::resolve_context(db, actor, cli.view.as_deref())
}

fn optional_date(date: Option<&str>) -> Result<Option<chrono::NaiveDate>> {
    date.map(parse_date).transpose()
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    init_logging(cli.log_json);

    if let Commands::Init { force } = cli.command {
        let cwd = env::current_dir()?;
        return commands::init::run(&cwd, force);
    }

    let (db, config) = open_workspace()?;

    match &cli.command {
        Commands::Init { .. } => Ok(()),

        Commands::User { action } => match action {
            UserCommands::Add {
                name,
                email,
                sector,
                position,
            } => commands::user::add(&db, name, email, sector.as_deref(), position.as_deref())
                .map(|_| ()),
            UserCommands::List => commands::user::list(&db, &context(&db, &config, &cli)?),
            UserCommands::Show => commands::user::show(&context(&db, &config, &cli)?),
            UserCommands::Edit {
                name,
                sector,
                position,
            } => commands::user::edit(
                &db,
                &context(&db, &config, &cli)?,
                name.as_deref(),
                sector.as_deref(),
                position.as_deref(),
            ),
            UserCommands::Promote { email, role } => {
                let role: Role = role.parse()?;
                let actor = cli.user.as_deref().or(config.default_user.as_deref());
                commands::user::set_role(&db, actor, email, role)
            }
        },

        Commands::Category { action } => {
            let ctx = context(&db, &config, &cli)?;
            match action {
                CategoryCommands::Add { name, color } => {
                    commands::category::add(&db, &ctx, name, color.as_deref()).map(|_| ())
                }
                CategoryCommands::List => commands::category::list(&db, &ctx),
                CategoryCommands::Edit { id, name, color } => commands::category::edit(
                    &db,
                    &ctx,
                    *id,
                    name.as_deref(),
                    color.as_deref(),
                ),
                CategoryCommands::Delete { id } => commands::category::delete(&db, &ctx, *id),
            }
        }

        Commands::Task { action } => {
            let ctx = context(&db, &config, &cli)?;
            match action {
                TaskCommands::Add {
                    name,
                    category,
                    days,
                    weeks,
                    shift,
                    priority,
                } => {
                    let task = commands::task::build(
                        name,
                        category.as_deref(),
                        days.as_deref(),
                        *weeks,
                        shift,
                        priority,
                    )?;
                    commands::task::add(&db, &ctx, task).map(|_| ())
                }
                TaskCommands::List { archived, priority } => {
                    if *archived {
                        commands::archive::list(&db, &ctx)
                    } else {
                        commands::task::list(&db, &ctx, priority.as_deref())
                    }
                }
                TaskCommands::Show { id } => commands::task::show(&db, &ctx, *id),
                TaskCommands::Update {
                    id,
                    name,
                    category,
                    completed,
                } => commands::task::update(
                    &db,
                    &ctx,
                    *id,
                    name.as_deref(),
                    category.as_deref(),
                    *completed,
                ),
                TaskCommands::Priority { id, priority } => {
                    commands::task::set_priority(&db, &ctx, *id, priority)
                }
                TaskCommands::Move {
                    id,
                    direction,
                    date,
                } => {
                    let date = commands::date_or_today(date.as_deref())?;
                    commands::task::move_task(
                        &db,
                        &ctx,
                        *id,
                        (*direction).into(),
                        date,
                        config.day_filter(),
                    )
                    .map(|_| ())
                }
                TaskCommands::Archive { id } => commands::archive::archive(&db, &ctx, *id),
                TaskCommands::Unarchive { id } => commands::archive::unarchive(&db, &ctx, *id),
                TaskCommands::ArchiveAll => commands::archive::archive_all(&db, &ctx).map(|_| ()),
            }
        }

        Commands::Done {
            task,
            date,
            any_time,
        } => {
            let ctx = context(&db, &config, &cli)?;
            let date = commands::date_or_today(date.as_deref())?;
            commands::done::run(&db, &ctx, &config, *task, date, *any_time, Local::now())
                .map(|_| ())
        }

        Commands::Day { date } => {
            let ctx = context(&db, &config, &cli)?;
            let date = commands::date_or_today(date.as_deref())?;
            commands::day::run(&db, &ctx, &config, date)
        }

        Commands::Report { action } => {
            let ctx = context(&db, &config, &cli)?;
            match action {
                ReportCommands::Day { date } => {
                    let date = commands::date_or_today(date.as_deref())?;
                    commands::report::day(&db, &ctx, &config, date)
                }
                ReportCommands::Week { date } => commands::report::week(
                    &db,
                    &ctx,
                    &config,
                    commands::date_or_today(date.as_deref())?,
                ),
                ReportCommands::Month { month } => {
                    commands::report::month(&db, &ctx, &config, month.as_deref())
                }
                ReportCommands::Time { from, to } => {
                    let from = optional_date(from.as_deref())?.unwrap_or_else(today);
                    let to = optional_date(to.as_deref())?.unwrap_or(from.max(today()));
                    commands::report::time(&db, &ctx, from, to)
                }
            }
        }

        Commands::Team { date } => {
            let ctx = context(&db, &config, &cli)?;
            let date = commands::date_or_today(date.as_deref())?;
            commands::team::run(&db, &ctx, &config, date)
        }

        Commands::Timer { action } => {
            let ctx = context(&db, &config, &cli)?;
            match action {
                TimerCommands::Start { task, off } => {
                    commands::timer::start(&db, &ctx, *task, *off, Local::now())
                }
                TimerCommands::Pause => commands::timer::pause(&db, &ctx, Local::now()),
                TimerCommands::Finalize => {
                    commands::timer::finalize(&db, &ctx, Local::now()).map(|_| ())
                }
                TimerCommands::Status => commands::timer::status(&db, &ctx, Local::now()),
                TimerCommands::Watch => commands::timer::watch(&db, &ctx),
            }
        }

        Commands::Export {
            output,
            format,
            date,
        } => {
            let ctx = context(&db, &config, &cli)?;
            match format.as_str() {
                "json" => commands::export::run_json(&db, &ctx, output.as_deref()),
                "markdown" | "md" => {
                    let date = commands::date_or_today(date.as_deref())?;
                    commands::export::run_markdown(
                        &db,
                        &ctx,
                        date,
                        config.day_filter(),
                        output.as_deref(),
                    )
                }
                _ => anyhow::bail!("Unknown format '{}'. Use 'json' or 'markdown'", format),
            }
        }
    }
}
