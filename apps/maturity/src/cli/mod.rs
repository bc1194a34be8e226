//! # Maturity CLI Module
//!
//! This module implements the operator CLI.
//!
//! ## Available Commands
//!
//! - `init` - Create the database and seed the built-in roles
//! - `catalog` - Summarize the question catalog (and advice)
//! - `team` / `group` / `member` - Directory administration
//! - `session` - Issue, extend and revoke sessions; sweep expired ones
//! - `assessment` - Token-gated assessment lifecycle

mod commands;

use crate::config::{AppConfig, Overrides};
use clap::{Args, Parser, Subcommand};
use maturity_core::{AssessmentId, GroupId, MaturityError, TeamId, UserId};
use std::path::PathBuf;

pub use commands::*;

// =============================================================================
// CLI STRUCTURE
// =============================================================================

/// Maturity - DevOps maturity assessments
///
/// Teams answer a fixed questionnaire; answers are scored per section and
/// per subcategory and exported as CSV.
#[derive(Parser, Debug)]
#[command(name = "maturity")]
#[command(version, about, long_about = None)]
pub struct Cli {
    /// Enable verbose output
    #[arg(short, long, global = true)]
    pub verbose: bool,

    /// Suppress banner output
    #[arg(short, long, global = true)]
    pub quiet: bool,

    /// Configuration file (defaults to ./maturity.toml when present)
    #[arg(short = 'c', long, global = true)]
    pub config: Option<PathBuf>,

    /// Path to the redb database
    #[arg(short = 'D', long, global = true)]
    pub database: Option<PathBuf>,

    /// Path to the question catalog
    #[arg(long, global = true)]
    pub questions: Option<PathBuf>,

    /// Path to the advice catalog
    #[arg(long, global = true)]
    pub advice: Option<PathBuf>,

    /// Output in JSON format (for programmatic access)
    #[arg(long, global = true)]
    pub json_mode: bool,

    /// Subcommand to execute
    #[command(subcommand)]
    pub command: Commands,
}

impl Cli {
    /// Resolve the configuration for this invocation.
    pub fn load_config(&self) -> Result<AppConfig, MaturityError> {
        AppConfig::load(
            self.config.as_deref(),
            &Overrides {
                database: self.database.clone(),
                questions: self.questions.clone(),
                advice: self.advice.clone(),
            },
        )
    }
}

/// Available CLI commands.
#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Create the database and seed the built-in roles
    Init,

    /// Load and summarize the question catalog
    Catalog {
        /// Also list the advice entries
        #[arg(long = "list-advice")]
        advice: bool,
    },

    /// Manage teams
    #[command(subcommand)]
    Team(TeamCommand),

    /// Manage groups of teams
    #[command(subcommand)]
    Group(GroupCommand),

    /// Grant a role on a team or group
    #[command(subcommand)]
    Member(MemberCommand),

    /// Manage sessions
    #[command(subcommand)]
    Session(SessionCommand),

    /// Run an assessment
    #[command(subcommand)]
    Assessment(AssessmentCommand),
}

#[derive(Subcommand, Debug)]
pub enum TeamCommand {
    /// Create a team
    Create {
        #[arg(short, long)]
        name: String,

        #[arg(short, long, default_value = "")]
        description: String,

        /// Parent group id
        #[arg(short, long)]
        group: Option<u64>,
    },

    /// List teams
    List {
        /// Only teams in this group
        #[arg(short, long)]
        group: Option<u64>,
    },

    /// Show a team by name
    Show {
        #[arg(short, long)]
        name: String,
    },
}

#[derive(Subcommand, Debug)]
pub enum GroupCommand {
    /// Create a group
    Create {
        #[arg(short, long)]
        name: String,

        #[arg(short, long, default_value = "")]
        description: String,
    },

    /// List groups
    List,

    /// Show a group
    Show {
        #[arg(short, long)]
        id: u64,
    },
}

#[derive(Subcommand, Debug)]
pub enum MemberCommand {
    /// Set a user's role on a team
    Team {
        #[arg(short, long)]
        user: u64,

        #[arg(short, long)]
        team: u64,

        /// Role name (admin, editor, viewer, or a custom role)
        #[arg(short, long)]
        role: String,
    },

    /// Set a user's role on a group
    Group {
        #[arg(short, long)]
        user: u64,

        #[arg(short, long)]
        group: u64,

        #[arg(short, long)]
        role: String,
    },
}

#[derive(Subcommand, Debug)]
pub enum SessionCommand {
    /// Issue a session for a user and print its token
    Issue {
        #[arg(short, long)]
        user: u64,
    },

    /// Delete one session
    Logout {
        #[arg(short, long)]
        token: String,
    },

    /// Delete every session of a user
    RevokeAll {
        #[arg(short, long)]
        user: u64,
    },

    /// Push an unexpired session's expiry out by one TTL
    Extend {
        #[arg(short, long)]
        token: String,
    },

    /// Delete expired sessions
    Sweep {
        /// Keep sweeping every SECS seconds until Ctrl+C
        #[arg(long, value_name = "SECS")]
        every: Option<u64>,
    },
}

/// Session token shared by every assessment command.
#[derive(Args, Debug, Clone)]
pub struct TokenArg {
    #[arg(short, long)]
    pub token: String,
}

#[derive(Subcommand, Debug)]
pub enum AssessmentCommand {
    /// Start an assessment for a team
    Start {
        #[command(flatten)]
        auth: TokenArg,

        #[arg(long)]
        team: u64,
    },

    /// Show an in-progress assessment with its saved answers
    Show {
        #[command(flatten)]
        auth: TokenArg,

        #[arg(short, long)]
        id: u64,
    },

    /// Save the answers of one section
    Save {
        #[command(flatten)]
        auth: TokenArg,

        #[arg(short, long)]
        id: u64,

        /// Section slug, e.g. `build-test`
        #[arg(short, long)]
        section: String,

        /// Form field, `KEY=VALUE` or `KEY` (repeatable)
        #[arg(long = "select", value_name = "KEY[=VALUE]")]
        select: Vec<String>,
    },

    /// Score and close an assessment
    Complete {
        #[command(flatten)]
        auth: TokenArg,

        #[arg(short, long)]
        id: u64,
    },

    /// Show the results of a completed assessment
    Results {
        #[command(flatten)]
        auth: TokenArg,

        #[arg(short, long)]
        id: u64,
    },

    /// Export a completed assessment as CSV
    Export {
        #[command(flatten)]
        auth: TokenArg,

        #[arg(short, long)]
        id: u64,

        /// Output file (stdout when omitted)
        #[arg(short, long)]
        output: Option<PathBuf>,
    },

    /// List the completed assessments of a team
    History {
        #[command(flatten)]
        auth: TokenArg,

        #[arg(long)]
        team: u64,
    },
}

// =============================================================================
// COMMAND EXECUTION
// =============================================================================

/// Execute the CLI with parsed arguments.
pub async fn execute(cli: Cli, config: AppConfig) -> Result<(), MaturityError> {
    let ctx = AppContext::open(&config, cli.json_mode)?;

    match cli.command {
        Commands::Init => cmd_init(&ctx).map(drop),
        Commands::Catalog { advice } => cmd_catalog(&ctx, advice),
        Commands::Team(TeamCommand::Create {
            name,
            description,
            group,
        }) => cmd_team_create(&ctx, &name, &description, group.map(GroupId)).map(drop),
        Commands::Team(TeamCommand::List { group }) => {
            cmd_team_list(&ctx, group.map(GroupId)).map(drop)
        }
        Commands::Team(TeamCommand::Show { name }) => cmd_team_show(&ctx, &name).map(drop),
        Commands::Group(GroupCommand::Create { name, description }) => {
            cmd_group_create(&ctx, &name, &description).map(drop)
        }
        Commands::Group(GroupCommand::List) => cmd_group_list(&ctx).map(drop),
        Commands::Group(GroupCommand::Show { id }) => cmd_group_show(&ctx, GroupId(id)).map(drop),
        Commands::Member(MemberCommand::Team { user, team, role }) => {
            cmd_member_team(&ctx, UserId(user), TeamId(team), &role)
        }
        Commands::Member(MemberCommand::Group { user, group, role }) => {
            cmd_member_group(&ctx, UserId(user), GroupId(group), &role)
        }
        Commands::Session(cmd) => match cmd {
            SessionCommand::Issue { user } => cmd_session_issue(&ctx, UserId(user)).map(drop),
            SessionCommand::Logout { token } => cmd_session_logout(&ctx, &token),
            SessionCommand::RevokeAll { user } => {
                cmd_session_revoke_all(&ctx, UserId(user)).map(drop)
            }
            SessionCommand::Extend { token } => cmd_session_extend(&ctx, &token).map(drop),
            SessionCommand::Sweep { every: None } => cmd_session_sweep(&ctx).map(drop),
            SessionCommand::Sweep { every: Some(secs) } => cmd_session_sweep_every(&ctx, secs).await,
        },
        Commands::Assessment(cmd) => match cmd {
            AssessmentCommand::Start { auth, team } => {
                cmd_assessment_start(&ctx, &auth.token, TeamId(team)).map(drop)
            }
            AssessmentCommand::Show { auth, id } => {
                cmd_assessment_show(&ctx, &auth.token, AssessmentId(id)).map(drop)
            }
            AssessmentCommand::Save {
                auth,
                id,
                section,
                select,
            } => {
                let form = parse_form(&select);
                cmd_assessment_save(&ctx, &auth.token, AssessmentId(id), &section, &form).map(drop)
            }
            AssessmentCommand::Complete { auth, id } => {
                cmd_assessment_complete(&ctx, &auth.token, AssessmentId(id)).map(drop)
            }
            AssessmentCommand::Results { auth, id } => {
                cmd_assessment_results(&ctx, &auth.token, AssessmentId(id)).map(drop)
            }
            AssessmentCommand::Export { auth, id, output } => {
                cmd_assessment_export(&ctx, &auth.token, AssessmentId(id), output.as_deref())
                    .map(drop)
            }
            AssessmentCommand::History { auth, team } => {
                cmd_assessment_history(&ctx, &auth.token, TeamId(team)).map(drop)
            }
        },
    }
}
