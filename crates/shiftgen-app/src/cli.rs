use crate::error::{AppError, AppResult};
use clap::{Parser, Subcommand};
use serde_json::{json, Value};
use shiftgen_core::{
    ConfirmationStatus, HydrateOptions, Reference, ShiftService, WorkspaceId, WEEK_TOKEN_PREFIX,
};

#[derive(Debug, Parser)]
#[command(name = "shiftgen")]
#[command(about = "Generate, inspect and confirm recurring driver shifts", long_about = None)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Command,
}

#[derive(Debug, Clone, PartialEq, Eq, Subcommand)]
pub enum Command {
    /// Creates the missing instances of every pattern for one month.
    Generate {
        #[arg(long)]
        workspace: String,
        /// Month as `YYYY-MM`.
        #[arg(long)]
        month: String,
    },
    /// Lists hydrated shifts.
    Shifts {
        #[arg(long)]
        workspace: Option<String>,
        #[arg(long)]
        month: Option<String>,
    },
    /// Shows one shift, or a week group when given `week:<anchorId>`.
    Show {
        id: String,
        /// Skips the trip-template lookup.
        #[arg(long)]
        no_trips: bool,
    },
    /// Shows the week group around an anchor shift.
    Week { anchor_id: String },
    /// Assigns a driver to a shift or week group.
    Assign {
        id: String,
        #[arg(long)]
        driver: String,
    },
    /// Sets the confirmation status of a shift or week group.
    Confirm {
        id: String,
        #[arg(long)]
        status: ConfirmationStatus,
    },
    /// Prints the confirmation request subject.
    Subject { id: String },
}

/// Runs one command and returns the JSON printed on stdout.
pub async fn run(command: Command, service: &ShiftService) -> AppResult<Value> {
    match command {
        Command::Generate { workspace, month } => {
            let report = service
                .generate(&WorkspaceId::new(workspace), &month)
                .await?;
            Ok(json!(report))
        }
        Command::Shifts { workspace, month } => {
            let workspace = workspace.map(WorkspaceId::new);
            let shifts = service
                .list_shifts(workspace.as_ref(), month.as_deref())
                .await?;
            Ok(json!(shifts))
        }
        Command::Show { id, no_trips } => {
            let options = if no_trips {
                HydrateOptions::without_trips()
            } else {
                HydrateOptions::default()
            };
            let view = service
                .get_by_id(&id, options)
                .await?
                .ok_or_else(|| AppError::NotFound(format!("shift {id}")))?;
            Ok(json!(view))
        }
        Command::Week { anchor_id } => {
            let token = format!("{WEEK_TOKEN_PREFIX}{}", anchor_id.trim());
            let view = service
                .get_by_id(&token, HydrateOptions::without_trips())
                .await?
                .ok_or_else(|| AppError::NotFound(format!("week group for {anchor_id}")))?;
            Ok(json!(view))
        }
        Command::Assign { id, driver } => {
            let outcome = service
                .assign_driver(&id, &Reference::new(driver.trim()))
                .await?
                .ok_or_else(|| AppError::NotFound(format!("shift {id}")))?;
            Ok(json!(outcome))
        }
        Command::Confirm { id, status } => {
            let outcome = service
                .set_confirmation_status(&id, status)
                .await?
                .ok_or_else(|| AppError::NotFound(format!("shift {id}")))?;
            Ok(json!(outcome))
        }
        Command::Subject { id } => {
            let subject = service
                .confirmation_subject(&id)
                .await?
                .ok_or_else(|| AppError::NotFound(format!("shift {id}")))?;
            Ok(json!({ "subject": subject }))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse(args: &[&str]) -> Command {
        Cli::try_parse_from(std::iter::once("shiftgen").chain(args.iter().copied()))
            .expect("parse cli")
            .command
    }

    #[test]
    fn parses_generate_with_required_flags() {
        assert_eq!(
            parse(&["generate", "--workspace", "south", "--month", "2026-02"]),
            Command::Generate {
                workspace: "south".to_owned(),
                month: "2026-02".to_owned(),
            }
        );
        assert!(Cli::try_parse_from(["shiftgen", "generate", "--workspace", "south"]).is_err());
    }

    #[test]
    fn parses_optional_filters_and_flags() {
        assert_eq!(
            parse(&["shifts", "--month", "2026-03"]),
            Command::Shifts {
                workspace: None,
                month: Some("2026-03".to_owned()),
            }
        );
        assert_eq!(
            parse(&["show", "week:12"]),
            Command::Show {
                id: "week:12".to_owned(),
                no_trips: false,
            }
        );
        assert_eq!(
            parse(&["show", "12", "--no-trips"]),
            Command::Show {
                id: "12".to_owned(),
                no_trips: true,
            }
        );
        assert!(Cli::try_parse_from(["shiftgen", "show", "12", "--trips"]).is_err());
    }

    #[test]
    fn confirm_status_uses_confirmation_status_parser() {
        assert_eq!(
            parse(&["confirm", "12", "--status", "Accepted"]),
            Command::Confirm {
                id: "12".to_owned(),
                status: ConfirmationStatus::Accepted,
            }
        );
        assert!(Cli::try_parse_from(["shiftgen", "confirm", "12", "--status", "maybe"]).is_err());
    }
}
