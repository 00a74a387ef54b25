use anyhow::{bail, Result};
use clap::{Parser, Subcommand};
use roster_core::{RecordId, ResourceKind};
use std::path::PathBuf;

mod context;
mod face;
mod resources;

use context::AppContext;

#[derive(Parser)]
#[command(name = "roster", about = "Roster personnel administration CLI")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// List the resource kinds this CLI can manage
    Resources,
    /// List rows of a resource
    List {
        /// Resource kind (e.g. departments, local-congregations)
        kind: ResourceKind,
        /// Case-insensitive filter across all columns
        #[arg(short, long, default_value = "")]
        search: String,
        #[arg(long, default_value_t = 1)]
        page: usize,
        #[arg(long, default_value_t = 10)]
        per_page: usize,
    },
    /// Show the fields of a resource
    ShowSchema { kind: ResourceKind },
    /// Create a row from field=value pairs
    Add {
        kind: ResourceKind,
        #[arg(required = true)]
        fields: Vec<String>,
    },
    /// Change fields of a row
    Edit {
        kind: ResourceKind,
        id: String,
        fields: Vec<String>,
    },
    /// Delete a row
    Delete { kind: ResourceKind, id: String },
    /// Sign in with a username and password
    Login {
        #[arg(short, long)]
        username: String,
        #[arg(short, long)]
        password: String,
    },
    /// Forget the stored session
    Logout,
    /// Show the signed-in user
    Whoami,
    /// Face enrollment and face login
    Face {
        #[command(subcommand)]
        command: FaceCommand,
    },
    /// Camera diagnostics
    Camera {
        #[command(subcommand)]
        command: CameraCommand,
    },
    /// Talk to the rosterd notifier daemon
    Notify {
        #[command(subcommand)]
        command: NotifyCommand,
    },
}

#[derive(Subcommand)]
enum FaceCommand {
    /// Show enrollment status for a person
    Status { personnel_id: String },
    /// Capture a face from the camera and enroll it
    Enroll { personnel_id: String },
    /// Enable or disable face login for a person
    Toggle {
        personnel_id: String,
        #[arg(long, conflicts_with = "disable")]
        enable: bool,
        #[arg(long)]
        disable: bool,
    },
    /// Delete a person's face enrollment
    Remove { personnel_id: String },
    /// Sign in with your face
    Login,
}

#[derive(Subcommand)]
enum CameraCommand {
    /// List video capture devices
    Devices,
    /// Save one grayscale frame as PNG
    Snapshot {
        #[arg(short, long, default_value = "snapshot.png")]
        output: PathBuf,
    },
}

#[derive(Subcommand)]
enum NotifyCommand {
    /// Show notifier status
    Status,
    /// Poll reminders and assignments now
    Refresh,
}

#[zbus::proxy(
    interface = "org.roster.Notifier1",
    default_service = "org.roster.Notifier1",
    default_path = "/org/roster/Notifier1"
)]
trait Notifier {
    async fn refresh(&self) -> zbus::Result<()>;
    async fn status(&self) -> zbus::Result<String>;
}

impl Commands {
    /// Route the command runs on, as the unauthorized guard sees it.
    fn route(&self) -> String {
        match self {
            Self::Login { .. } => roster_client::LOGIN_ROUTE.to_string(),
            Self::List { kind, .. }
            | Self::ShowSchema { kind }
            | Self::Add { kind, .. }
            | Self::Edit { kind, .. }
            | Self::Delete { kind, .. } => format!("/{}", kind.path()),
            _ => "/".to_string(),
        }
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .init();

    let cli = Cli::parse();
    let ctx = AppContext::from_env(&cli.command.route())?;

    match cli.command {
        Commands::Resources => resources::print_resources(),
        Commands::List {
            kind,
            search,
            page,
            per_page,
        } => resources::list(&ctx, kind, &search, page, per_page).await?,
        Commands::ShowSchema { kind } => resources::print_schema(kind),
        Commands::Add { kind, fields } => resources::add(&ctx, kind, &fields).await?,
        Commands::Edit { kind, id, fields } => {
            resources::edit(&ctx, kind, RecordId::from(id), &fields).await?
        }
        Commands::Delete { kind, id } => resources::delete(&ctx, kind, RecordId::from(id)).await?,
        Commands::Login { username, password } => {
            let session = ctx
                .api
                .login(&username, &password)
                .await
                .map_err(|e| anyhow::anyhow!(e.user_message("Login failed")))?;
            println!(
                "Logged in as {}.",
                session.display_name.as_deref().unwrap_or(&username)
            );
        }
        Commands::Logout => {
            ctx.api.logout();
            println!("Logged out.");
        }
        Commands::Whoami => match ctx.api.auth().current() {
            Some(session) => println!(
                "{} (id {}), signed in {}",
                session.display_name.as_deref().unwrap_or("unknown user"),
                session.user_id.as_deref().unwrap_or("-"),
                session.logged_in_at.format("%Y-%m-%d %H:%M UTC")
            ),
            None => println!("Not logged in."),
        },
        Commands::Face { command } => match command {
            FaceCommand::Status { personnel_id } => {
                face::status(&ctx, RecordId::from(personnel_id)).await?
            }
            FaceCommand::Enroll { personnel_id } => {
                face::enroll(&ctx, RecordId::from(personnel_id)).await?
            }
            FaceCommand::Toggle {
                personnel_id,
                enable,
                disable,
            } => {
                if enable == disable {
                    bail!("pass exactly one of --enable or --disable");
                }
                face::toggle(&ctx, RecordId::from(personnel_id), enable).await?
            }
            FaceCommand::Remove { personnel_id } => {
                face::remove(&ctx, RecordId::from(personnel_id)).await?
            }
            FaceCommand::Login => face::login(&ctx).await?,
        },
        Commands::Camera { command } => match command {
            CameraCommand::Devices => face::devices(),
            CameraCommand::Snapshot { output } => face::snapshot(&ctx, &output).await?,
        },
        Commands::Notify { command } => {
            let conn = zbus::Connection::session().await?;
            let proxy = NotifierProxy::new(&conn).await?;
            match command {
                NotifyCommand::Status => {
                    let raw = proxy.status().await?;
                    let pretty = serde_json::from_str::<serde_json::Value>(&raw)
                        .and_then(|v| serde_json::to_string_pretty(&v))
                        .unwrap_or(raw);
                    println!("{pretty}");
                }
                NotifyCommand::Refresh => {
                    proxy.refresh().await?;
                    println!("Refresh requested.");
                }
            }
        }
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_list_with_paging() {
        let cli = Cli::try_parse_from([
            "roster", "list", "local_congregations", "--search", "north", "--page", "3",
        ])
        .unwrap();
        let Commands::List {
            kind,
            search,
            page,
            per_page,
        } = cli.command
        else {
            panic!("expected list");
        };
        assert_eq!(kind, ResourceKind::LocalCongregations);
        assert_eq!(search, "north");
        assert_eq!((page, per_page), (3, 10));
    }

    #[test]
    fn test_unknown_resource_rejected() {
        assert!(Cli::try_parse_from(["roster", "list", "widgets"]).is_err());
    }

    #[test]
    fn test_add_requires_fields() {
        assert!(Cli::try_parse_from(["roster", "add", "departments"]).is_err());
        let cli = Cli::try_parse_from(["roster", "add", "department", "name=Finance"]).unwrap();
        assert_eq!(cli.command.route(), "/departments");
    }

    #[test]
    fn test_login_runs_on_login_route() {
        let cli = Cli::try_parse_from(["roster", "login", "-u", "admin", "-p", "pw"]).unwrap();
        assert_eq!(cli.command.route(), roster_client::LOGIN_ROUTE);
    }

    #[test]
    fn test_face_toggle_flags_conflict() {
        assert!(Cli::try_parse_from(["roster", "face", "toggle", "7", "--enable", "--disable"]).is_err());
        assert!(Cli::try_parse_from(["roster", "face", "toggle", "7", "--disable"]).is_ok());
    }
}
