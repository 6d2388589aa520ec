//! lra1flash command-line interface.

mod commands;

use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use anyhow::Result;
use clap::{CommandFactory, Parser, Subcommand};
use clap_complete::Shell;
use console::style;
use lra1flash::Mode;

#[derive(Parser)]
#[command(
    name = "lra1flash",
    version,
    about = "Firmware flasher for LRA1 LoRa radio modules"
)]
struct Cli {
    /// Serial port the module is attached to (e.g., /dev/ttyUSB0, COM3)
    #[arg(short, long, global = true, env = "LRA1FLASH_PORT")]
    port: Option<String>,

    /// Baud rate. The bootloader only speaks 115200; other values are
    /// accepted for compatibility and ignored with a warning.
    #[arg(
        short,
        long,
        global = true,
        env = "LRA1FLASH_BAUD",
        default_value_t = lra1flash::DEFAULT_BAUD
    )]
    baud: u32,

    /// Pulse the DTR line to reset the module before connecting
    #[arg(short = 'r', long, global = true)]
    reset: bool,

    /// Send the RESET command to reset the module before connecting
    #[arg(short = 's', long, global = true)]
    swreset: bool,

    /// Increase log verbosity (-v, -vv)
    #[arg(short = 'v', long = "verbose", action = clap::ArgAction::Count, global = true)]
    verbose: u8,

    /// Suppress progress and status output
    #[arg(short, long, global = true)]
    quiet: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Write a firmware binary to the module
    Update {
        /// Path to the firmware binary
        firmware: PathBuf,
    },
    /// Compare a firmware binary against the module's flash
    Verify {
        /// Path to the firmware binary
        firmware: PathBuf,
    },
    /// Zero-fill the module's parameter area
    Init,
    /// List available serial ports
    ListPorts {
        /// Print as JSON
        #[arg(long)]
        json: bool,
    },
    /// Generate shell completions
    Completions {
        /// Target shell
        shell: Shell,
    },
}

fn init_logging(cli: &Cli) {
    let level = if cli.quiet {
        log::LevelFilter::Warn
    } else {
        match cli.verbose {
            0 => log::LevelFilter::Info,
            1 => log::LevelFilter::Debug,
            _ => log::LevelFilter::Trace,
        }
    };

    env_logger::Builder::new()
        .filter_level(level)
        .format_timestamp(None)
        .init();
}

/// Map an error chain to the process exit code.
///
/// Protocol and validation errors carry their own code convention;
/// anything else exits with 1.
fn exit_code(err: &anyhow::Error) -> i32 {
    err.chain()
        .find_map(|cause| cause.downcast_ref::<lra1flash::Error>())
        .map_or(1, lra1flash::Error::status_code)
}

fn run(cli: &Cli) -> Result<()> {
    match &cli.command {
        Commands::Update { firmware } => commands::transfer::run(cli, Mode::Update, Some(firmware)),
        Commands::Verify { firmware } => commands::transfer::run(cli, Mode::Verify, Some(firmware)),
        Commands::Init => commands::transfer::run(cli, Mode::Init, None),
        Commands::ListPorts { json } => commands::ports::run(*json),
        Commands::Completions { shell } => {
            let mut cmd = Cli::command();
            let name = cmd.get_name().to_string();
            clap_complete::generate(*shell, &mut cmd, name, &mut std::io::stdout());
            Ok(())
        }
    }
}

fn main() {
    let cli = Cli::parse();
    init_logging(&cli);

    // Ctrl-C flips a flag the library polls between blocks, so a transfer
    // stops at a block boundary instead of mid-frame.
    let interrupted = Arc::new(AtomicBool::new(false));
    {
        let interrupted = Arc::clone(&interrupted);
        if let Err(e) = ctrlc::set_handler(move || interrupted.store(true, Ordering::SeqCst)) {
            log::warn!("Could not install Ctrl-C handler: {e}");
        }
    }
    lra1flash::set_interrupt_checker(move || interrupted.load(Ordering::SeqCst));

    if let Err(err) = run(&cli) {
        eprintln!("{} {err:#}", style("Error:").red().bold());
        std::process::exit(exit_code(&err));
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn cli_definition_is_consistent() {
        Cli::command().debug_assert();
    }

    #[test]
    fn parses_update_command() {
        let cli = Cli::parse_from(["lra1flash", "update", "fw.bin", "--port", "/dev/ttyUSB0"]);
        assert_eq!(cli.port.as_deref(), Some("/dev/ttyUSB0"));
        assert_eq!(cli.baud, 115200);
        assert!(!cli.reset);
        match cli.command {
            Commands::Update { firmware } => assert_eq!(firmware, PathBuf::from("fw.bin")),
            _ => panic!("expected update command"),
        }
    }

    #[test]
    fn parses_init_with_reset_flags() {
        let cli = Cli::parse_from(["lra1flash", "init", "-p", "COM3", "-r", "-s"]);
        assert!(cli.reset);
        assert!(cli.swreset);
        assert!(matches!(cli.command, Commands::Init));
    }

    #[test]
    fn verbosity_accumulates() {
        let cli = Cli::parse_from(["lra1flash", "-vv", "list-ports"]);
        assert_eq!(cli.verbose, 2);
        assert!(matches!(
            cli.command,
            Commands::ListPorts { json: false }
        ));
    }

    #[test]
    fn exit_code_prefers_protocol_codes() {
        let err = anyhow::Error::from(lra1flash::Error::Device { code: 0x0523 })
            .context("transfer failed");
        assert_eq!(exit_code(&err), 0x0523);

        let plain = anyhow::anyhow!("something else");
        assert_eq!(exit_code(&plain), 1);
    }
}
