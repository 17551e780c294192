use std::io::{self, Write};
use std::path::PathBuf;
use std::sync::Arc;

use anyhow::Result;
use clap::{Parser, Subcommand};
use kernel_launch::{
    list_kernelspec_choices, KernelspecChoice, KernelspecPicker, LocalNotebookSession,
};
use kernel_switch::settings::{load_settings, settings_json_schema, settings_path};
use kernel_switch::{KernelConnection, KernelSwitcher, LogHandler, NotebookSession, ServerType};
use log::info;
use tabled::{settings::Style, Table, Tabled};

#[derive(Parser)]
#[command(name = "runt-switch", author, version, about, long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Log level
    #[arg(long, global = true, default_value = "info")]
    log_level: String,
}

#[derive(Subcommand)]
enum Commands {
    /// List installed kernelspecs
    Kernels {
        /// Output in JSON format
        #[arg(long)]
        json: bool,
    },

    /// Start a kernel for a notebook, offering other kernels if it fails to start
    Switch {
        /// Kernelspec name (e.g. python3, deno)
        kernel: String,

        /// Notebook the kernel is for (default: untitled)
        #[arg(long)]
        notebook: Option<PathBuf>,

        /// Override the kernel launch timeout in milliseconds
        #[arg(long)]
        timeout_ms: Option<u64>,

        /// Override the configured server type (local or remote).
        ///
        /// Only picks the retry policy for a notebook without a kernel:
        /// `local` offers other kernels when one fails to start, `remote`
        /// makes a single attempt. Kernels are always launched on this machine.
        #[arg(long, verbatim_doc_comment)]
        server_type: Option<ServerType>,

        /// Keep the kernel running until Ctrl+C
        #[arg(long)]
        wait: bool,
    },

    /// Show kernel switch settings
    Settings {
        /// Print the JSON schema of the settings file instead
        #[arg(long)]
        schema: bool,
    },
}

#[derive(Tabled)]
struct KernelspecTableRow {
    #[tabled(rename = "NAME")]
    name: String,
    #[tabled(rename = "DISPLAY NAME")]
    display_name: String,
    #[tabled(rename = "LANGUAGE")]
    language: String,
}

impl From<&KernelspecChoice> for KernelspecTableRow {
    fn from(choice: &KernelspecChoice) -> Self {
        KernelspecTableRow {
            name: choice.name.clone(),
            display_name: choice.display_name.clone(),
            language: choice.language.clone(),
        }
    }
}

/// Shorten a path for display by replacing home directory with ~
fn shorten_path(path: &std::path::Path) -> String {
    if let Some(home) = dirs::home_dir() {
        if let Ok(relative) = path.strip_prefix(&home) {
            return format!("~/{}", relative.display());
        }
    }
    path.display().to_string()
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // Initialize logging
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(&cli.log_level))
        .init();

    match cli.command {
        Commands::Kernels { json } => list_kernels(json).await,
        Commands::Switch {
            kernel,
            notebook,
            timeout_ms,
            server_type,
            wait,
        } => switch_kernel(kernel, notebook, timeout_ms, server_type, wait).await,
        Commands::Settings { schema } => show_settings(schema),
    }
}

async fn list_kernels(json: bool) -> Result<()> {
    let choices = list_kernelspec_choices().await;

    if json {
        println!("{}", serde_json::to_string_pretty(&choices)?);
        return Ok(());
    }

    if choices.is_empty() {
        println!("No kernelspecs installed.");
        return Ok(());
    }

    let rows: Vec<KernelspecTableRow> = choices.iter().map(KernelspecTableRow::from).collect();
    let table = Table::new(rows).with(Style::rounded()).to_string();
    println!("{}", table);
    Ok(())
}

async fn switch_kernel(
    kernel: String,
    notebook: Option<PathBuf>,
    timeout_ms: Option<u64>,
    server_type: Option<ServerType>,
    wait: bool,
) -> Result<()> {
    let mut settings = load_settings();
    if let Some(ms) = timeout_ms {
        settings.jupyter_launch_timeout_ms = ms;
    }
    if let Some(server_type) = server_type {
        settings.jupyter_server_type = server_type;
    }
    if !settings.is_local_launch() {
        info!(
            "Server type is {}: making a single attempt without offering other kernels",
            settings.jupyter_server_type
        );
    }

    // Use the installed display name when there is one; an unknown name is
    // still attempted so the picker can offer alternatives.
    let target = list_kernelspec_choices()
        .await
        .iter()
        .find(|c| c.name == kernel)
        .map(KernelspecChoice::to_connection)
        .unwrap_or_else(|| KernelConnection::local_kernelspec(&kernel, &kernel));

    let notebook = notebook.map(|p| {
        if p.is_relative() {
            std::env::current_dir().unwrap_or_default().join(p)
        } else {
            p
        }
    });

    let picker = KernelspecPicker::new(Arc::new(prompt_for_kernel));
    let switcher = KernelSwitcher::new(settings, Arc::new(picker), Arc::new(LogHandler));
    let mut session = LocalNotebookSession::new(notebook);

    switcher.switch_kernel_with_retry(&mut session, target).await?;

    if let Some(connection) = session.connection() {
        println!("Kernel: {} ({})", connection, connection.kernelspec_name);
    }
    if let Some(id) = session.kernel_id() {
        println!("Kernel ID: {}", id);
    }
    if let Some(path) = session.connection_file() {
        println!("Connection file: {}", shorten_path(path));
    }

    if wait {
        println!("Press Ctrl+C to shut down the kernel.");
        tokio::signal::ctrl_c().await?;
    }

    info!("Shutting down kernel");
    session.shutdown().await;
    Ok(())
}

fn show_settings(schema: bool) -> Result<()> {
    if schema {
        println!("{}", serde_json::to_string_pretty(&settings_json_schema())?);
        return Ok(());
    }

    let path = settings_path();
    let settings = load_settings();
    println!("Settings file: {}", shorten_path(&path));
    if !path.exists() {
        println!("(not found, showing defaults)");
    }
    println!("{}", serde_json::to_string_pretty(&settings)?);
    Ok(())
}

/// Ask on the terminal which kernel to try next.
fn prompt_for_kernel(offered: &[KernelspecChoice], failing: &KernelConnection) -> Option<usize> {
    eprintln!();
    eprintln!("Kernel {} failed to start. Select another kernel:", failing);
    for (i, choice) in offered.iter().enumerate() {
        eprintln!(
            "  [{}] {} ({}, {})",
            i + 1,
            choice.display_name,
            choice.name,
            choice.language
        );
    }
    eprint!("Kernel number (empty to cancel): ");
    io::stderr().flush().ok();

    let mut line = String::new();
    if io::stdin().read_line(&mut line).ok()? == 0 {
        return None;
    }
    parse_selection(&line, offered.len())
}

/// Parse a 1-based menu selection into an index.
fn parse_selection(input: &str, count: usize) -> Option<usize> {
    let number: usize = input.trim().parse().ok()?;
    (1..=count).contains(&number).then(|| number - 1)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_selection() {
        assert_eq!(parse_selection("1\n", 3), Some(0));
        assert_eq!(parse_selection(" 3 ", 3), Some(2));
        assert_eq!(parse_selection("4", 3), None);
        assert_eq!(parse_selection("0", 3), None);
        assert_eq!(parse_selection("", 3), None);
        assert_eq!(parse_selection("deno", 3), None);
    }

    #[test]
    fn test_cli_parses_switch() {
        let cli = Cli::try_parse_from([
            "runt-switch",
            "switch",
            "python3",
            "--timeout-ms",
            "5000",
            "--server-type",
            "remote",
        ])
        .unwrap();

        match cli.command {
            Commands::Switch {
                kernel,
                timeout_ms,
                server_type,
                notebook,
                wait,
            } => {
                assert_eq!(kernel, "python3");
                assert_eq!(timeout_ms, Some(5000));
                assert_eq!(server_type, Some(ServerType::Remote));
                assert!(notebook.is_none());
                assert!(!wait);
            }
            _ => panic!("expected switch command"),
        }
        assert_eq!(cli.log_level, "info");
    }

    #[test]
    fn test_server_type_help_describes_retry_policy() {
        use clap::CommandFactory;

        let mut cmd = Cli::command();
        let switch = cmd
            .find_subcommand_mut("switch")
            .expect("switch subcommand");
        let help = switch.render_long_help().to_string();
        assert!(help.contains("Only picks the retry policy"));
        assert!(help.contains("always launched on this machine"));
    }

    #[test]
    fn test_kernelspec_table_row() {
        let choice = KernelspecChoice {
            name: "deno".into(),
            display_name: "Deno".into(),
            language: "typescript".into(),
        };
        let row = KernelspecTableRow::from(&choice);
        assert_eq!(row.name, "deno");
        assert_eq!(row.language, "typescript");
    }
}
