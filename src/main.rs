mod api;
mod app;
mod catalog;
mod config;
mod crawler;
mod error;
mod export;
mod fetcher;
mod limiter;
mod models;
mod parser;
mod prompt;
mod queue;
mod store;
mod vault;

use anyhow::{bail, Context, Result};
use api::RemoteSession;
use catalog::CatalogStore;
use clap::{Parser, Subcommand};
use config::{Config, PlanFile};
use models::{Credential, ProtectionMethod, Session};
use queue::Selection;
use std::path::PathBuf;
use store::TeacherStore;
use tracing::info;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};
use vault::CredentialStore;

#[derive(Parser)]
#[command(name = "hw_crawler", version, about = "Export CodeHS class grades and submitted code")]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Save portal credentials, protected by a pin or password
    Credentials {
        #[arg(long)]
        identity: String,
        #[arg(long, default_value = "pin")]
        method: ProtectionMethod,
    },
    /// List the classes that can be crawled
    Sections {
        /// Rediscover sections from the portal even when cached
        #[arg(long)]
        refresh: bool,
    },
    /// Crawl classes and write grades and code
    Crawl {
        /// YAML crawl plan; flags below override its values
        #[arg(long)]
        plan: Option<PathBuf>,
        #[arg(long = "assignment")]
        assignments: Vec<String>,
        /// Due date as YYYY-MM-DD HH:MM
        #[arg(long)]
        due: Option<String>,
        /// Class selection as teacher|period, period 0 for every class
        #[arg(long = "class")]
        classes: Vec<String>,
        /// Comma separated: score, code
        #[arg(long)]
        download: Option<String>,
        #[arg(long)]
        no_cache: bool,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .with(tracing_subscriber::fmt::layer().with_target(false))
        .init();

    // Load configuration
    let config = Config::load().context("Failed to load configuration")?;

    match cli.command {
        Command::Credentials { identity, method } => save_credentials(&config, identity, method).await,
        Command::Sections { refresh } => list_sections(&config, refresh).await,
        Command::Crawl {
            plan,
            assignments,
            due,
            classes,
            download,
            no_cache,
        } => {
            let mut plan_file = match plan {
                Some(path) => PlanFile::load(&path)?,
                None => PlanFile::default(),
            };
            if !assignments.is_empty() {
                plan_file.assignments = assignments;
            }
            if due.is_some() {
                plan_file.due = due;
            }
            if !classes.is_empty() {
                plan_file.classes = classes;
            }
            if let Some(download) = download {
                plan_file.download = vec![download];
            }
            plan_file.no_cache |= no_cache;
            crawl(&config, plan_file).await
        }
    }
}

async fn save_credentials(config: &Config, identity: String, method: ProtectionMethod) -> Result<()> {
    let secret = prompt::read_secret("Portal password: ")?;
    let credential = Credential { identity, secret };

    let teachers = TeacherStore::new(&config.state_dir);
    let remote = RemoteSession::new(config.urls.clone())?;
    let session = remote
        .open(credential, teachers.load())
        .await
        .context("Login failed, credentials were not saved")?;

    let factor = prompt::read_new_factor(method)?;
    CredentialStore::new(&config.state_dir).save(&session.credential, method, &factor)?;
    teachers.remember(&session.teacher_id)?;

    println!("Credentials saved ({} protection).", method.label());
    Ok(())
}

/// Unlock the saved credentials and log in.
async fn login(config: &Config) -> Result<(RemoteSession, Session)> {
    let store = CredentialStore::new(&config.state_dir);
    if !store.exists() {
        bail!("no saved credentials, run `hw_crawler credentials` first");
    }
    let record = store
        .load()
        .context("Saved credentials are unreadable, run `hw_crawler credentials` again")?;

    let factor = match (record.method, config.factor.as_deref()) {
        (ProtectionMethod::None, _) => String::new(),
        (_, Some(factor)) => factor.to_string(),
        (method, None) => prompt::read_secret(&format!("Enter your {}: ", method.label()))?,
    };
    let credential = store.unlock(&factor)?;

    let teachers = TeacherStore::new(&config.state_dir);
    let remote = RemoteSession::new(config.urls.clone())?;
    let session = remote.open(credential, teachers.load()).await?;
    teachers.remember(&session.teacher_id)?;
    info!(teacher_id = %session.teacher_id, "logged in");
    Ok((remote, session))
}

async fn list_sections(config: &Config, refresh: bool) -> Result<()> {
    let store = CatalogStore::new(&config.state_dir);
    let catalog = if store.exists() && !refresh {
        store.load()?
    } else {
        let (remote, session) = login(config).await?;
        store
            .load_or_discover(&remote, &config.urls, &session.teacher_id, true)
            .await?
    };

    for (label, token) in queue::selection_options(&catalog) {
        println!("{:<30} {}", label, token);
    }
    Ok(())
}

async fn crawl(config: &Config, plan_file: PlanFile) -> Result<()> {
    let (plan, class_tokens) = plan_file.into_plan()?;
    let selections = class_tokens
        .iter()
        .map(|token| token.parse::<Selection>())
        .collect::<Result<Vec<_>, _>>()?;

    let (remote, session) = login(config).await?;
    let catalog = CatalogStore::new(&config.state_dir)
        .load_or_discover(&remote, &config.urls, &session.teacher_id, false)
        .await?;
    let tasks = queue::build(&selections, &catalog, &config.urls)?;
    info!(classes = tasks.len(), assignments = ?plan.assignments, "starting crawl");

    let run_date = chrono::Local::now().date_naive();
    let run = app::CrawlRun::new(
        &remote,
        &config.urls,
        &plan,
        &config.cache_dir,
        &config.out_dir,
        run_date,
    );
    let outcomes = run.execute(&tasks).await?;

    println!();
    for line in app::summarize(&outcomes) {
        println!("{}", line);
    }
    let failed = outcomes.iter().filter(|o| !o.succeeded()).count();
    if failed > 0 {
        bail!("{} of {} classes failed", failed, outcomes.len());
    }
    Ok(())
}
