use crate::console::Model;
use clap::{Args, Parser, Subcommand, ValueEnum};
use std::{path::PathBuf, time::Duration};
use treasury_db::models::TokenType;

/// Administration console for the treasury database.
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
pub struct Cli {
    /// Path to the TOML configuration file.
    #[arg(long, global = true, default_value = "./app-config.toml")]
    pub config: PathBuf,

    /// User id recorded in the audit trail for write commands.
    #[arg(long, global = true)]
    pub actor: Option<i32>,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Create a user account.
    RegisterUser {
        email: String,
        /// Read from standard input when omitted.
        #[arg(long)]
        password: Option<String>,
        #[arg(long)]
        name: Option<String>,
        #[arg(long)]
        admin: bool,
    },
    /// Check a pass phrase against the stored hash.
    VerifyPassword {
        email: String,
        #[arg(long)]
        password: Option<String>,
    },
    /// Issue a token for a user.
    IssueToken {
        user_id: i32,
        #[arg(long = "type", value_enum)]
        token_type: TokenKind,
        /// Overrides the configured lifetime, e.g. `45m`.
        #[arg(long, value_parser = humantime::parse_duration)]
        ttl: Option<Duration>,
    },
    /// Blacklist a user's tokens.
    RevokeTokens {
        user_id: i32,
        #[arg(long = "type", value_enum)]
        token_type: Option<TokenKind>,
    },
    /// Read and write system settings.
    #[command(subcommand)]
    Settings(SettingsCommand),
    /// List rows, e.g. `find client '{"take": 5}'`.
    Find(QueryArgs),
    /// Count rows matching a filter.
    Count(QueryArgs),
    /// Compute aggregates over matching rows.
    Aggregate(QueryArgs),
    /// Group rows and aggregate each group.
    GroupBy(QueryArgs),
    /// Run the maintenance jobs until interrupted.
    RunJobs,
}

#[derive(Subcommand, Debug)]
pub enum SettingsCommand {
    Get { key: String },
    /// Store a setting. Values that are not valid JSON are stored as strings.
    Set { key: String, value: String },
    List,
}

#[derive(Args, Debug)]
pub struct QueryArgs {
    #[arg(value_enum)]
    pub model: Model,
    /// JSON arguments in wire format.
    #[arg(default_value = "{}")]
    pub args: String,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, ValueEnum)]
pub enum TokenKind {
    Access,
    Refresh,
    ResetPassword,
    VerifyEmail,
}

impl From<TokenKind> for TokenType {
    fn from(kind: TokenKind) -> Self {
        match kind {
            TokenKind::Access => TokenType::Access,
            TokenKind::Refresh => TokenType::Refresh,
            TokenKind::ResetPassword => TokenType::ResetPassword,
            TokenKind::VerifyEmail => TokenType::VerifyEmail,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn the_command_definition_is_consistent() {
        Cli::command().debug_assert();
    }

    #[test]
    fn global_options_follow_the_subcommand() {
        let cli = Cli::try_parse_from([
            "treasury-admin",
            "issue-token",
            "42",
            "--type",
            "reset-password",
            "--ttl",
            "15m",
            "--actor",
            "1",
        ])
        .expect("valid command line");
        assert_eq!(cli.actor, Some(1));
        assert_eq!(cli.config, PathBuf::from("./app-config.toml"));
        match cli.command {
            Command::IssueToken {
                user_id,
                token_type,
                ttl,
            } => {
                assert_eq!(user_id, 42);
                assert_eq!(TokenType::from(token_type), TokenType::ResetPassword);
                assert_eq!(ttl, Some(Duration::from_secs(900)));
            }
            other => panic!("unexpected command {other:?}"),
        }
    }

    #[test]
    fn query_commands_take_a_model_and_json() {
        let cli = Cli::try_parse_from([
            "treasury-admin",
            "group-by",
            "statement-file",
            r#"{"by": ["status"]}"#,
        ])
        .expect("valid command line");
        match cli.command {
            Command::GroupBy(QueryArgs { model, args }) => {
                assert_eq!(model, Model::StatementFile);
                assert_eq!(args, r#"{"by": ["status"]}"#);
            }
            other => panic!("unexpected command {other:?}"),
        }
        let cli =
            Cli::try_parse_from(["treasury-admin", "count", "audit-entry"]).expect("valid command line");
        assert!(matches!(cli.command, Command::Count(QueryArgs { ref args, .. }) if args == "{}"));
        assert!(Cli::try_parse_from(["treasury-admin", "find", "ledger"]).is_err());
    }

    #[test]
    fn settings_subcommands_parse() {
        let cli = Cli::try_parse_from([
            "treasury-admin",
            "--config",
            "/etc/treasury.toml",
            "settings",
            "set",
            "audit-retention-days",
            "90",
        ])
        .expect("valid command line");
        assert_eq!(cli.config, PathBuf::from("/etc/treasury.toml"));
        assert!(matches!(
            cli.command,
            Command::Settings(SettingsCommand::Set { ref key, ref value })
                if key == "audit-retention-days" && value == "90"
        ));
    }
}
