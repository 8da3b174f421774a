//! paperdesk - command-line client for the paperdesk document backend.
//!
//! Signs in, keeps the session across runs, and drives mailbox scans to
//! completion from the terminal.

use std::io::{self, Write};
use std::path::Path;
use std::sync::Arc;

use anyhow::{anyhow, bail, Context, Result};
use serde_json::Value;
use tokio::sync::oneshot;
use tracing::{debug, info};
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use paperdesk_core::auth::open_store;
use paperdesk_core::tasks::{EmailScanJob, Progress, ScanRequest, EMAIL_SCAN_JOB};
use paperdesk_core::{
    ApiClient, Config, Credentials, Navigator, NotificationSink, Notice, RestoreOutcome, SessionManager, Severity,
    SharedSession, TaskOutcome, TaskPoller, View, ViewTracker,
};

// ============================================================================
// Constants
// ============================================================================

/// Log file prefix inside the cache directory's `logs/` folder
const LOG_FILE_PREFIX: &str = "paperdesk.log";

const USAGE: &str = "\
Usage: paperdesk <command> [options]

Commands:
  login [username]     Sign in and remember the session
  logout               Sign out and forget stored credentials
  whoami               Show the signed-in user
  passwd               Change your password
  scan [options]       Scan mailboxes for new documents
      --config-id <n>  Only scan the mailbox with this id
      --days <n>       Look back this many days (default 7)
      --force          Rescan messages already seen
  status               Show configuration and session state
";

// ============================================================================
// Console side-channels
// ============================================================================

/// Prints request failures to stderr.
struct ConsoleSink;

impl NotificationSink for ConsoleSink {
    fn notify(&self, notice: Notice) {
        match notice.severity {
            Severity::Warning => eprintln!("warning: {}", notice.message),
            Severity::Error => eprintln!("error: {}", notice.message),
        }
    }
}

/// The terminal has no login screen; tell the user how to get there.
struct ConsoleNavigator {
    tracker: ViewTracker,
}

impl Navigator for ConsoleNavigator {
    fn current_view(&self) -> View {
        self.tracker.current_view()
    }

    fn go_to_login(&self) {
        self.tracker.go_to_login();
        eprintln!("Your session has ended. Run `paperdesk login` to sign in again.");
    }
}

/// Initialize the tracing subscriber: stderr plus a daily log file.
fn init_tracing(cache_dir: &Path) -> WorkerGuard {
    // RUST_LOG controls the level (e.g. RUST_LOG=paperdesk_core=debug)
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn"));

    let file_appender = tracing_appender::rolling::daily(cache_dir.join("logs"), LOG_FILE_PREFIX);
    let (file_writer, guard) = tracing_appender::non_blocking(file_appender);

    tracing_subscriber::registry()
        .with(fmt::layer().with_writer(io::stderr))
        .with(fmt::layer().with_ansi(false).with_writer(file_writer))
        .with(filter)
        .init();

    guard
}

struct Cli {
    config: Config,
    manager: SessionManager,
}

impl Cli {
    fn new(config: Config, cache_dir: &Path) -> Result<Self> {
        let store = open_store(config.credential_backend, cache_dir);
        let session = SharedSession::new(store);
        let navigator = Arc::new(ConsoleNavigator {
            tracker: ViewTracker::new(View::Other("cli".to_string())),
        });
        let api = ApiClient::new(&config, session, navigator, Arc::new(ConsoleSink))?;
        Ok(Self {
            config,
            manager: SessionManager::new(api),
        })
    }

    /// Restore the stored session, failing if there is none.
    async fn require_session(&self) -> Result<()> {
        match self.manager.restore().await {
            RestoreOutcome::Restored => Ok(()),
            RestoreOutcome::Empty => bail!("Not logged in. Run `paperdesk login` first."),
            RestoreOutcome::Discarded => {
                bail!("Stored session was unreadable and has been cleared. Run `paperdesk login`.")
            }
        }
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    // Load .env file if present (silently ignore if not found)
    let _ = dotenvy::dotenv();

    let args: Vec<String> = std::env::args().skip(1).collect();
    let Some(command) = args.first().map(String::as_str) else {
        eprint!("{}", USAGE);
        return Ok(());
    };
    if matches!(command, "-h" | "--help" | "help") {
        print!("{}", USAGE);
        return Ok(());
    }

    let config = Config::load().context("Failed to load configuration")?;
    let cache_dir = config.cache_dir()?;
    let _guard = init_tracing(&cache_dir);
    info!(command, base_url = %config.base_url, "paperdesk starting");

    let ctx = Cli::new(config, &cache_dir)?;
    let rest = &args[1..];

    match command {
        "login" => login(ctx, rest.first().cloned()).await,
        "logout" => logout(&ctx).await,
        "whoami" => whoami(&ctx).await,
        "passwd" => change_password(&ctx).await,
        "scan" => scan(&ctx, parse_scan_args(rest)?).await,
        "status" => status(&ctx).await,
        other => {
            eprint!("{}", USAGE);
            bail!("Unknown command: {}", other)
        }
    }
}

// ============================================================================
// Commands
// ============================================================================

async fn login(mut ctx: Cli, username: Option<String>) -> Result<()> {
    let username = match username
        .or_else(|| std::env::var("PAPERDESK_USERNAME").ok())
        .filter(|u| !u.is_empty())
    {
        Some(username) => username,
        None => prompt_username(ctx.config.last_username.as_deref())?,
    };
    let password = match std::env::var("PAPERDESK_PASSWORD") {
        Ok(password) if !password.is_empty() => password,
        _ => rpassword::prompt_password("Password: ")?,
    };

    if username.is_empty() || password.is_empty() {
        bail!("Username and password required");
    }

    let accepted = ctx
        .manager
        .login(&Credentials::new(username.clone(), password))
        .await
        .map_err(|e| anyhow!("Login failed: {}", e))?;
    if !accepted {
        bail!("Invalid username or password");
    }

    ctx.config.last_username = Some(username);
    if let Err(e) = ctx.config.save() {
        debug!(error = %e, "Failed to remember username");
    }

    let name = ctx
        .manager
        .profile()
        .await
        .map(|p| p.display_name().to_string())
        .unwrap_or_default();
    println!("Logged in as {}", name);
    Ok(())
}

async fn logout(ctx: &Cli) -> Result<()> {
    ctx.manager.restore().await;
    ctx.manager.sign_out().await;
    println!("Logged out");
    Ok(())
}

async fn whoami(ctx: &Cli) -> Result<()> {
    ctx.require_session().await?;
    ctx.manager.fetch_profile().await;

    let profile = ctx
        .manager
        .profile()
        .await
        .ok_or_else(|| anyhow!("Session is no longer valid"))?;
    println!("{}", serde_json::to_string_pretty(&profile)?);
    Ok(())
}

async fn change_password(ctx: &Cli) -> Result<()> {
    ctx.require_session().await?;

    let current = rpassword::prompt_password("Current password: ")?;
    let new = rpassword::prompt_password("New password: ")?;
    let confirm = rpassword::prompt_password("Confirm new password: ")?;
    if new != confirm {
        bail!("Passwords do not match");
    }
    if new.is_empty() {
        bail!("New password must not be empty");
    }

    if ctx.manager.change_password(&current, &new).await? {
        println!("Password changed");
        Ok(())
    } else {
        bail!("Password was not changed")
    }
}

async fn scan(ctx: &Cli, request: ScanRequest) -> Result<()> {
    ctx.require_session().await?;

    let poller = TaskPoller::new(ctx.config.poll_interval());
    let job = Arc::new(EmailScanJob::new(ctx.manager.api().clone(), request));
    let (tx, rx) = oneshot::channel();

    let ticket = poller
        .start_with_progress(
            EMAIL_SCAN_JOB,
            job,
            |progress: &Progress| print_progress(progress),
            move |outcome: TaskOutcome<Value>| {
                let _ = tx.send(outcome);
            },
        )
        .await
        .map_err(|e| anyhow!("Could not start scan: {}", e))?;
    eprintln!("Scan started (task {})", ticket.handle);
    ticket.finished().await;

    match rx.await {
        Ok(TaskOutcome::Succeeded(result)) => {
            eprintln!("Scan complete");
            println!("{}", serde_json::to_string_pretty(&result)?);
            Ok(())
        }
        Ok(TaskOutcome::Failed(failure)) => bail!("{}", failure),
        Err(_) => bail!("Scan was abandoned before it finished"),
    }
}

async fn status(ctx: &Cli) -> Result<()> {
    let restored = ctx.manager.restore().await;

    println!("Backend:      {}", ctx.config.base_url);
    println!("Credentials:  {:?}", ctx.config.credential_backend);
    println!("Poll every:   {}s", ctx.config.poll_interval_secs);
    match ctx.manager.profile().await {
        Some(profile) if restored == RestoreOutcome::Restored => {
            let role = if profile.is_admin() { " (admin)" } else { "" };
            println!("Signed in as: {}{}", profile.display_name(), role);
        }
        _ => println!("Signed in as: -"),
    }
    Ok(())
}

// ============================================================================
// Helpers
// ============================================================================

fn parse_scan_args(args: &[String]) -> Result<ScanRequest> {
    let mut request = ScanRequest::default();
    let mut iter = args.iter();
    while let Some(arg) = iter.next() {
        match arg.as_str() {
            "--config-id" => {
                let value = iter.next().ok_or_else(|| anyhow!("--config-id needs a value"))?;
                request.config_id = Some(value.parse().context("--config-id must be a number")?);
            }
            "--days" => {
                let value = iter.next().ok_or_else(|| anyhow!("--days needs a value"))?;
                request.days = value.parse().context("--days must be a number")?;
            }
            "--force" => request.force = true,
            other => bail!("Unknown scan option: {}", other),
        }
    }
    Ok(request)
}

fn print_progress(progress: &Progress) {
    let percent = progress
        .percent()
        .map(|p| format!("{:>3}%", p))
        .unwrap_or_else(|| "   ?".to_string());
    match progress.message {
        Some(ref message) => eprintln!("[{}] {}/{} {}", percent, progress.current, progress.total, message),
        None => eprintln!("[{}] {}/{}", percent, progress.current, progress.total),
    }
}

fn prompt_username(last: Option<&str>) -> Result<String> {
    match last {
        Some(last) => print!("Username [{}]: ", last),
        None => print!("Username: "),
    }
    io::stdout().flush()?;

    let mut username = String::new();
    io::stdin().read_line(&mut username)?;
    let username = username.trim();
    Ok(match (username.is_empty(), last) {
        (true, Some(last)) => last.to_string(),
        _ => username.to_string(),
    })
}
