use clap::{Parser, Subcommand};

pub mod dispatch;
pub mod output;
pub mod subcommands;

use subcommands::{
    AuditCommands, BillingCommands, CustomerCommands, HandoverCommands, InvoiceCommands,
    JobCommands, LeaveCommands, UserCommands,
};

/// Top-level CLI parser for the `fleet` binary.
#[derive(Debug, Parser)]
#[command(name = "fleet", version, about = "Fleet back office: jobs, handovers, billing and staff")]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,

    /// Id of the user performing the command
    #[arg(long = "as", global = true, value_name = "USER_ID")]
    pub actor: Option<i32>,

    /// Run against a throwaway in-memory store seeded with one administrator
    #[arg(long, global = true)]
    pub memory: bool,

    /// Print results as JSON
    #[arg(long, global = true)]
    pub json: bool,

    /// Quiet mode (errors only)
    #[arg(short, long, global = true)]
    pub quiet: bool,

    /// Verbose mode (debug logging)
    #[arg(short, long, global = true)]
    pub verbose: bool,
}

/// Global flags handed to command handlers.
#[derive(Clone, Debug)]
pub struct GlobalFlags {
    pub actor: Option<i32>,
    pub memory: bool,
    pub json: bool,
}

impl Cli {
    pub fn global_flags(&self) -> GlobalFlags {
        GlobalFlags {
            actor: self.actor,
            memory: self.memory,
            json: self.json,
        }
    }
}

#[derive(Clone, Debug, Subcommand)]
pub enum Commands {
    /// Apply database migrations.
    Migrate,
    /// Transport jobs.
    Job {
        #[command(subcommand)]
        action: JobCommands,
    },
    /// Billing items and settings.
    Billing {
        #[command(subcommand)]
        action: BillingCommands,
    },
    /// Invoices.
    Invoice {
        #[command(subcommand)]
        action: InvoiceCommands,
    },
    /// Driver handovers.
    Handover {
        #[command(subcommand)]
        action: HandoverCommands,
    },
    /// Leave requests.
    Leave {
        #[command(subcommand)]
        action: LeaveCommands,
    },
    /// Users, roles and permissions.
    User {
        #[command(subcommand)]
        action: UserCommands,
    },
    /// Customers.
    Customer {
        #[command(subcommand)]
        action: CustomerCommands,
    },
    /// Audit log.
    Audit {
        #[command(subcommand)]
        action: AuditCommands,
    },
    /// Follow the job list live.
    Watch,
}

#[cfg(test)]
mod tests {
    use clap::{CommandFactory, Parser};
    use fleet_manager::models::{InvoiceStatus, JobStatus, Permission, Role};

    use super::subcommands::{InvoiceCommands, JobCommands, UserCommands};
    use super::{Cli, Commands};

    #[test]
    fn clap_command_tree_is_valid() {
        Cli::command().debug_assert();
    }

    #[test]
    fn global_flags_parse_after_subcommand() {
        let cli = Cli::try_parse_from(["fleet", "job", "get", "7", "--as", "3", "--json"])
            .expect("cli should parse");

        assert_eq!(cli.actor, Some(3));
        assert!(cli.json);
        assert!(matches!(
            cli.command,
            Commands::Job {
                action: JobCommands::Get { id: 7 }
            }
        ));
    }

    #[test]
    fn enum_arguments_use_stored_names() {
        let cli = Cli::try_parse_from(["fleet", "job", "list", "--status", "unallocated"])
            .expect("cli should parse");
        match cli.command {
            Commands::Job {
                action: JobCommands::List { status, .. },
            } => assert_eq!(status, Some(JobStatus::Unallocated)),
            other => panic!("unexpected command {other:?}"),
        }

        let cli = Cli::try_parse_from(["fleet", "invoice", "status", "4", "paid"])
            .expect("cli should parse");
        assert!(matches!(
            cli.command,
            Commands::Invoice {
                action: InvoiceCommands::Status {
                    id: 4,
                    status: InvoiceStatus::Paid
                }
            }
        ));

        let cli = Cli::try_parse_from(["fleet", "user", "grant", "2", "can_allocate_jobs"])
            .expect("cli should parse");
        assert!(matches!(
            cli.command,
            Commands::User {
                action: UserCommands::Grant {
                    id: 2,
                    permission: Permission::AllocateJobs
                }
            }
        ));

        let cli = Cli::try_parse_from(["fleet", "user", "role", "2", "contractor"])
            .expect("cli should parse");
        assert!(matches!(
            cli.command,
            Commands::User {
                action: UserCommands::Role {
                    id: 2,
                    role: Role::Contractor
                }
            }
        ));
    }

    #[test]
    fn unknown_status_is_rejected() {
        let parsed = Cli::try_parse_from(["fleet", "job", "list", "--status", "parked"]);
        assert!(parsed.is_err());
    }
}
