use anyhow::Context;
use clap::Parser;
use std::collections::BTreeMap;
use tokio_util::sync::CancellationToken;
use tracing_subscriber::EnvFilter;
use treasury_db::models::Role;

mod accounts;
mod audit;
mod cli;
mod config;
mod console;
mod jobs;

use audit::{Actor, Event, Severity};
use cli::{Cli, Command, SettingsCommand};

const UPDATED_BY: &str = "treasury-admin";

#[tokio::main]
pub async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();
    let cli = Cli::parse();
    let config = config::load(&cli.config).context("loading configuration")?;
    init_tracing(&config.tracing);
    let store = treasury_db::create(&config.database)
        .await
        .context("creating database store")?;
    let actor = match cli.actor {
        Some(id) => Some(
            Actor::load(&store, id)
                .await
                .with_context(|| format!("loading actor {id}"))?,
        ),
        None => None,
    };
    let accounts = accounts::Accounts::new(store.clone(), config.accounts);
    match cli.command {
        Command::RegisterUser {
            email,
            password,
            name,
            admin,
        } => {
            let password = pass_phrase(password)?;
            let role = if admin { Role::Admin } else { Role::User };
            let user = accounts
                .register(&email, &password, name, role)
                .await
                .context("registering user")?;
            audit::record(
                &store,
                actor.as_ref(),
                Event::new("CREATE", "User", format!("registered {} as {role}", user.email))
                    .resource_id(user.id),
            )
            .await?;
            print(&user)?;
        }
        Command::VerifyPassword { email, password } => {
            let password = pass_phrase(password)?;
            match accounts
                .verify(&email, &password)
                .await
                .context("verifying pass phrase")?
            {
                Some(user) => print(&user)?,
                None => anyhow::bail!("no account matches {email} and the given pass phrase"),
            }
        }
        Command::IssueToken {
            user_id,
            token_type,
            ttl,
        } => {
            let token = accounts
                .issue_token(user_id, token_type.into(), ttl)
                .await
                .context("issuing token")?;
            audit::record(
                &store,
                actor.as_ref(),
                Event::new(
                    "CREATE",
                    "Token",
                    format!("issued {} token for user {user_id}", token.token_type),
                )
                .resource_id(token.id),
            )
            .await?;
            print(&token)?;
        }
        Command::RevokeTokens {
            user_id,
            token_type,
        } => {
            let revoked = accounts
                .revoke_tokens(user_id, token_type.map(Into::into))
                .await
                .context("revoking tokens")?;
            audit::record(
                &store,
                actor.as_ref(),
                Event::new("UPDATE", "Token", format!("blacklisted {revoked} tokens"))
                    .resource_id(user_id)
                    .severity(if token_type.is_none() {
                        Severity::Critical
                    } else {
                        Severity::Warning
                    }),
            )
            .await?;
            print(&serde_json::json!({ "revoked": revoked }))?;
        }
        Command::Settings(SettingsCommand::Get { key }) => match store.settings().get(&key) {
            Some(value) => print(&value)?,
            None => anyhow::bail!("setting {key} is not defined"),
        },
        Command::Settings(SettingsCommand::List) => {
            let settings: BTreeMap<_, _> = store
                .settings()
                .snapshot()
                .iter()
                .map(|(key, value)| (key.clone(), value.clone()))
                .collect();
            print(&settings)?;
        }
        Command::Settings(SettingsCommand::Set { key, value }) => {
            let value = serde_json::from_str(&value).unwrap_or(serde_json::Value::String(value));
            let updated_by = actor.as_ref().map_or(UPDATED_BY, Actor::name);
            let setting = store
                .system_config()
                .set(&key, value, updated_by)
                .await
                .with_context(|| format!("storing setting {key}"))?;
            audit::record(
                &store,
                actor.as_ref(),
                Event::new("UPDATE", "SystemConfig", format!("set {key}"))
                    .resource_id(&setting.id)
                    .severity(Severity::Warning),
            )
            .await?;
            print(&setting)?;
        }
        Command::Find(query) => query_console(&store, query, console::Operation::Find).await?,
        Command::Count(query) => query_console(&store, query, console::Operation::Count).await?,
        Command::Aggregate(query) => {
            query_console(&store, query, console::Operation::Aggregate).await?
        }
        Command::GroupBy(query) => query_console(&store, query, console::Operation::GroupBy).await?,
        Command::RunJobs => run_jobs(config.jobs, store).await,
    }
    Ok(())
}

fn init_tracing(config: &config::TracingConfig) {
    if config.console {
        console_subscriber::init();
    } else {
        tracing_subscriber::fmt()
            .with_env_filter(
                EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
            )
            .init();
    }
}

fn pass_phrase(argument: Option<String>) -> anyhow::Result<String> {
    if let Some(pass_phrase) = argument {
        return Ok(pass_phrase);
    }
    let mut line = String::new();
    std::io::stdin()
        .read_line(&mut line)
        .context("reading pass phrase from standard input")?;
    Ok(line.trim_end_matches(['\r', '\n']).to_owned())
}

fn print<T: serde::Serialize>(value: &T) -> anyhow::Result<()> {
    println!(
        "{}",
        serde_json::to_string_pretty(value).context("rendering output")?
    );
    Ok(())
}

async fn query_console(
    store: &treasury_db::Store,
    query: cli::QueryArgs,
    operation: console::Operation,
) -> anyhow::Result<()> {
    let result = console::run(store, query.model, operation, &query.args).await?;
    print(&result)
}

async fn run_jobs(config: jobs::Config, store: treasury_db::Store) {
    let cancellation_token = CancellationToken::new();
    let jobs = jobs::create(config, store);
    let run = jobs.run(cancellation_token.clone());
    tokio::pin!(run);
    tokio::select! {
        _ = &mut run => (),
        _ = tokio::signal::ctrl_c() => {
            tracing::info!("interrupt received, stopping jobs");
            cancellation_token.cancel();
            run.await;
        }
    }
}
