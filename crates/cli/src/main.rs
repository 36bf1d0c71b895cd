mod app;
mod strings;

use std::path::{Path, PathBuf};

use anyhow::Result;
use app::settings::AiChanges;
use app::App;
use clap::{Args, Parser, Subcommand};
use puml_core::history::HistoryFilter;
use puml_core::render::RenderType;
use puml_core::settings::AiProvider;
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::EnvFilter;

#[derive(Parser, Debug)]
#[command(name = "puml", version, about = "Render PlantUML diagrams and keep a local history")]
struct Cli {
    /// Directory for history, settings and logs
    #[arg(long, global = true, env = "PUML_DATA_DIR")]
    data_dir: Option<PathBuf>,

    /// Print machine-readable JSON
    #[arg(long, global = true)]
    json: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Render a diagram and record it in history
    Render(RenderArgs),
    /// Load a shared diagram by id
    Fetch {
        id: String,
        /// Record the diagram in history
        #[arg(long)]
        save: bool,
        #[arg(short, long)]
        output: Option<PathBuf>,
    },
    /// Browse and edit render history
    #[command(subcommand)]
    History(HistoryCommand),
    /// AI assistance
    #[command(subcommand)]
    Ai(AiCommand),
    /// Show or change settings
    #[command(subcommand)]
    Settings(SettingsCommand),
}

#[derive(Args, Debug)]
struct RenderArgs {
    /// Source file; stdin when omitted or `-`
    input: Option<PathBuf>,
    #[arg(short = 't', long = "type", default_value = "png")]
    kind: RenderType,
    #[arg(long)]
    title: Option<String>,
    /// Write the rendered output to a file
    #[arg(short, long)]
    output: Option<PathBuf>,
}

#[derive(Subcommand, Debug)]
enum HistoryCommand {
    List {
        /// all, favorites, png, svg or text
        #[arg(short, long, default_value = "all")]
        filter: HistoryFilter,
        #[arg(short, long)]
        search: Option<String>,
    },
    Show {
        id: String,
    },
    Remove {
        id: String,
    },
    Clear {
        #[arg(long)]
        yes: bool,
    },
    /// Toggle the favorite flag
    Favorite {
        id: String,
    },
    /// Set a title; omit it to clear
    Rename {
        id: String,
        title: Option<String>,
    },
    Stats,
    /// Render a recorded entry again
    Rerender {
        id: String,
        #[arg(short = 't', long = "type")]
        kind: Option<RenderType>,
        #[arg(short, long)]
        output: Option<PathBuf>,
    },
}

#[derive(Subcommand, Debug)]
enum AiCommand {
    Generate {
        prompt: String,
        /// Continue an earlier conversation
        #[arg(long)]
        conversation: Option<String>,
        /// Share and record the generated diagram
        #[arg(long)]
        render: bool,
    },
    Explain {
        input: Option<PathBuf>,
        #[arg(short, long, default_value = "en")]
        language: String,
    },
    Optimize {
        input: Option<PathBuf>,
    },
}

#[derive(Subcommand, Debug)]
enum SettingsCommand {
    Show,
    SetApiUrl {
        url: String,
    },
    SetAutoRender {
        #[arg(action = clap::ArgAction::Set)]
        enabled: bool,
    },
    SetAi {
        #[arg(long)]
        provider: Option<AiProvider>,
        /// Empty string removes the custom URL
        #[arg(long)]
        base_url: Option<String>,
        /// Empty string removes the key
        #[arg(long)]
        api_key: Option<String>,
        #[arg(long)]
        model: Option<String>,
    },
}

fn log_dir(data_dir: Option<&Path>) -> Option<PathBuf> {
    match data_dir {
        Some(d) => Some(d.join("logs")),
        None => directories::BaseDirs::new().map(|b| b.data_dir().join("puml").join("logs")),
    }
}

/// Daily rolling file log; stdout stays clean for command output.
fn init_logging(data_dir: Option<&Path>) -> Option<WorkerGuard> {
    let dir = log_dir(data_dir)?;
    std::fs::create_dir_all(&dir).ok()?;
    let file_appender = tracing_appender::rolling::daily(&dir, "puml.log");
    let (non_blocking, guard) = tracing_appender::non_blocking(file_appender);
    let filter = EnvFilter::try_from_env("PUML_LOG").unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(non_blocking)
        .with_ansi(false)
        .init();
    Some(guard)
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    let _guard = init_logging(cli.data_dir.as_deref());

    let app = App::open(cli.data_dir, cli.json).await?;
    match cli.command {
        Command::Render(args) => {
            app.render(
                args.input.as_deref(),
                args.kind,
                args.title,
                args.output.as_deref(),
            )
            .await
        }
        Command::Fetch { id, save, output } => app.fetch(&id, save, output.as_deref()).await,
        Command::History(cmd) => match cmd {
            HistoryCommand::List { filter, search } => app.history_list(filter, search.as_deref()),
            HistoryCommand::Show { id } => app.history_show(&id),
            HistoryCommand::Remove { id } => app.history_remove(&id).await,
            HistoryCommand::Clear { yes } => app.history_clear(yes).await,
            HistoryCommand::Favorite { id } => app.history_favorite(&id).await,
            HistoryCommand::Rename { id, title } => app.history_rename(&id, title.as_deref()).await,
            HistoryCommand::Stats => app.history_stats(),
            HistoryCommand::Rerender { id, kind, output } => {
                app.history_rerender(&id, kind, output.as_deref()).await
            }
        },
        Command::Ai(cmd) => match cmd {
            AiCommand::Generate {
                prompt,
                conversation,
                render,
            } => app.ai_generate(&prompt, conversation.as_deref(), render).await,
            AiCommand::Explain { input, language } => {
                app.ai_explain(input.as_deref(), &language).await
            }
            AiCommand::Optimize { input } => app.ai_optimize(input.as_deref()).await,
        },
        Command::Settings(cmd) => match cmd {
            SettingsCommand::Show => app.settings_show(),
            SettingsCommand::SetApiUrl { url } => app.settings_set_api_url(&url).await,
            SettingsCommand::SetAutoRender { enabled } => app.settings_set_auto_render(enabled).await,
            SettingsCommand::SetAi {
                provider,
                base_url,
                api_key,
                model,
            } => {
                app.settings_set_ai(AiChanges {
                    provider,
                    base_url: base_url.as_deref(),
                    api_key: api_key.as_deref(),
                    model: model.as_deref(),
                })
                .await
            }
        },
    }
}
