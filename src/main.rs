use std::path::PathBuf;

use anyhow::Result;
use clap::{Args, Parser, Subcommand, ValueEnum};

use email_sorter::config::{API_BASE_ENV, DEFAULT_API_BASE, OUTBOX_PATH_ENV, SESSION_COOKIE_ENV};

#[derive(Debug, Clone, Copy, ValueEnum)]
enum LabelArg {
    Good,
    Bad,
}

#[derive(Debug, Parser)]
#[command(name = "email-sorter", version, about = "Swipe-style inbox triage")]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Output structured JSON
    #[arg(long, global = true)]
    json: bool,

    /// Base URL of the mail service
    #[arg(long, global = true, env = API_BASE_ENV, default_value = DEFAULT_API_BASE)]
    api_base: String,

    /// Cookie header value carrying the service session
    #[arg(long, global = true, env = SESSION_COOKIE_ENV, hide_env_values = true)]
    session_cookie: Option<String>,

    /// SQLite path of the dispatch outbox
    #[arg(long, global = true, env = OUTBOX_PATH_ENV)]
    outbox: Option<PathBuf>,

    /// Do not record dispatched classifications locally
    #[arg(long, global = true, conflicts_with = "outbox")]
    no_outbox: bool,
}

#[derive(Debug, Subcommand)]
enum Commands {
    /// Triage the inbox interactively from stdin
    Triage(FilterArgs),
    /// List emails already marked good or bad
    Review {
        label: LabelArg,
        #[command(flatten)]
        filters: FilterArgs,
    },
    /// Fetch the inbox and show the first card
    Fetch(FilterArgs),
    /// Show recent outbox entries
    Outbox {
        #[arg(long, default_value_t = 20)]
        limit: usize,
    },
    /// Run the JSON-RPC bridge over stdio
    Serve,
    /// Show the signed-in user
    Whoami,
    /// End the service session
    Logout,
}

#[derive(Debug, Clone, Default, Args)]
struct FilterArgs {
    /// Number of emails to request (1-500)
    #[arg(long)]
    max_results: Option<String>,
    /// Earliest date, YYYY-MM-DD
    #[arg(long)]
    since: Option<String>,
    /// Latest date, YYYY-MM-DD
    #[arg(long)]
    until: Option<String>,
    /// Comma-separated label ids
    #[arg(long)]
    label: Option<String>,
    /// Free-text search query
    #[arg(long)]
    search: Option<String>,
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive(tracing::Level::WARN.into()),
        )
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    commands::dispatch(cli).await
}

mod commands {
    use std::sync::{Arc, Mutex};

    use anyhow::{anyhow, bail, Context, Result};
    use tokio::io::{self, AsyncBufReadExt, BufReader};
    use tracing::warn;

    use email_sorter::auth::User;
    use email_sorter::bridge::Bridge;
    use email_sorter::config::Config;
    use email_sorter::db::Database;
    use email_sorter::dispatch::Dispatcher;
    use email_sorter::filters::{MaxResultsInput, RawFilter};
    use email_sorter::output::{self, OutputFormat};
    use email_sorter::service::{HttpMailService, MailService};
    use email_sorter::session::{FetchOutcome, TriageSession};
    use email_sorter::Label;

    use super::{Cli, Commands, FilterArgs, LabelArg};

    const TRIAGE_HELP: &str = "Commands: g/right (good), b/left (bad), r (refresh), \
        f key=value ... (filters: max, since, until, label, search=<rest of line>), reset, t (thread), q (quit)";

    pub async fn dispatch(cli: Cli) -> Result<()> {
        let format = OutputFormat::from_json_flag(cli.json);
        let config = resolve_config(&cli)?;

        match cli.command {
            Commands::Triage(filters) => handle_triage(&config, filters, format).await,
            Commands::Review { label, filters } => {
                handle_review(&config, map_label(label), filters, format).await
            }
            Commands::Fetch(filters) => handle_fetch(&config, filters, format).await,
            Commands::Outbox { limit } => handle_outbox(&config, limit, format),
            Commands::Serve => handle_serve(&config).await,
            Commands::Whoami => handle_whoami(&config, format).await,
            Commands::Logout => handle_logout(&config).await,
        }
    }

    async fn handle_triage(config: &Config, filters: FilterArgs, format: OutputFormat) -> Result<()> {
        let session = open_session(config)?;
        require_user(&session, to_raw_filter(filters)).await?;
        print_card(&session, format)?;
        eprintln!("{TRIAGE_HELP}");

        let mut lines = BufReader::new(io::stdin()).lines();
        while let Some(line) = lines.next_line().await.context("read triage command")? {
            let line = line.trim();
            if line.is_empty() {
                continue;
            }
            let (command, args) = line.split_once(char::is_whitespace).unwrap_or((line, ""));

            match command.to_ascii_lowercase().as_str() {
                "q" | "quit" | "exit" => break,
                "g" | "good" | "right" => classify(&session, Label::Good),
                "b" | "bad" | "left" => classify(&session, Label::Bad),
                "r" | "refresh" => report_outcome(session.refresh().await),
                "reset" => report_outcome(session.reset_filters().await),
                "f" | "filter" => match RawFilter::parse_assignments(args) {
                    Ok(overrides) => report_outcome(session.apply_filters(overrides).await),
                    Err(err) => {
                        eprintln!("{err}");
                        continue;
                    }
                },
                "t" | "thread" => {
                    match session.conversation().await {
                        Some(conversation) => {
                            println!("{}", output::format_conversation(format, &conversation)?)
                        }
                        None => eprintln!("No email to show."),
                    }
                    continue;
                }
                "?" | "h" | "help" => {
                    eprintln!("{TRIAGE_HELP}");
                    continue;
                }
                other => {
                    eprintln!("Unknown command '{other}'. {TRIAGE_HELP}");
                    continue;
                }
            }
            print_card(&session, format)?;
        }

        finish(&session).await;
        Ok(())
    }

    async fn handle_review(
        config: &Config,
        label: Label,
        filters: FilterArgs,
        format: OutputFormat,
    ) -> Result<()> {
        let session = open_session(config)?;
        require_user(&session, to_raw_filter(filters)).await?;
        if let Some(error) = session.last_error() {
            bail!("{error}");
        }

        let items = session.list(label);
        println!("{}", output::format_review(format, label, &items)?);
        Ok(())
    }

    async fn handle_fetch(config: &Config, filters: FilterArgs, format: OutputFormat) -> Result<()> {
        let session = open_session(config)?;
        require_user(&session, to_raw_filter(filters)).await?;
        print_card(&session, format)
    }

    fn handle_outbox(config: &Config, limit: usize, format: OutputFormat) -> Result<()> {
        let path = config
            .outbox_path
            .as_deref()
            .ok_or_else(|| anyhow!("outbox is disabled"))?;
        let db = Database::open(path)
            .with_context(|| format!("open outbox at {}", path.display()))?;
        let entries = db.list_outbox(limit)?;
        println!("{}", output::format_outbox(format, &entries)?);
        Ok(())
    }

    async fn handle_serve(config: &Config) -> Result<()> {
        let session = open_session(config)?;
        Bridge::new(session).run_stdio().await
    }

    async fn handle_whoami(config: &Config, format: OutputFormat) -> Result<()> {
        let service = HttpMailService::from_config(config);
        let user = service
            .current_user()
            .await
            .context("load signed-in user")?;
        println!("{}", output::format_user(format, user.as_ref())?);
        Ok(())
    }

    async fn handle_logout(config: &Config) -> Result<()> {
        let session = open_session(config)?;
        session.sign_out().await;
        println!("Signed out.");
        Ok(())
    }

    fn resolve_config(cli: &Cli) -> Result<Config> {
        let outbox_path = if cli.no_outbox {
            None
        } else if let Some(path) = &cli.outbox {
            Some(path.clone())
        } else {
            Some(Database::default_db_path().context("resolve default outbox path")?)
        };

        Ok(Config {
            session_cookie: cli.session_cookie.clone(),
            outbox_path,
            ..Config::default().with_api_base(cli.api_base.as_str())
        })
    }

    fn open_session(config: &Config) -> Result<TriageSession> {
        let service = Arc::new(HttpMailService::from_config(config));
        let mut dispatcher = Dispatcher::new(service.clone());
        if let Some(path) = &config.outbox_path {
            let db = Database::open(path)
                .with_context(|| format!("open outbox at {}", path.display()))?;
            dispatcher = dispatcher.with_outbox(Arc::new(Mutex::new(db)));
        }
        Ok(TriageSession::with_dispatcher(service, dispatcher))
    }

    async fn require_user(session: &TriageSession, overrides: RawFilter) -> Result<User> {
        session
            .sign_in_with(overrides)
            .await
            .context("load signed-in user")?
            .ok_or_else(|| anyhow!("not signed in; pass --session-cookie or set EMAIL_SORTER_SESSION"))
    }

    fn classify(session: &TriageSession, label: Label) {
        if session.classify(label).is_none() {
            eprintln!("Nothing left to classify.");
        }
    }

    fn report_outcome(outcome: FetchOutcome) {
        match outcome {
            FetchOutcome::Applied(_) | FetchOutcome::Stale => {}
            FetchOutcome::Failed(failure) => eprintln!("Error: {failure}"),
            FetchOutcome::SignedOut => eprintln!("Not signed in."),
        }
    }

    fn print_card(session: &TriageSession, format: OutputFormat) -> Result<()> {
        println!("{}", output::format_card(format, &session.snapshot())?);
        Ok(())
    }

    async fn finish(session: &TriageSession) {
        let dispatcher = session.dispatcher();
        dispatcher.wait_idle().await;
        let failures = dispatcher.failures();
        if failures > 0 {
            warn!("{failures} classification(s) from this session were not saved");
        }
    }

    fn to_raw_filter(args: FilterArgs) -> RawFilter {
        RawFilter {
            max_results: args.max_results.as_deref().map(MaxResultsInput::from),
            since: args.since,
            until: args.until,
            label: args.label,
            search: args.search,
        }
    }

    fn map_label(value: LabelArg) -> Label {
        match value {
            LabelArg::Good => Label::Good,
            LabelArg::Bad => Label::Bad,
        }
    }
}
