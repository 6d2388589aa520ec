//! Firmware transfer commands (update, verify, init).

use std::path::Path;

use anyhow::{Context, Result};
use console::style;
use indicatif::{ProgressBar, ProgressStyle};
use log::warn;

use lra1flash::{FirmwareImage, Lra1Flasher, Mode, NativePort, Port, SerialConfig, DEFAULT_BAUD};

use crate::Cli;

pub fn run(cli: &Cli, mode: Mode, firmware: Option<&Path>) -> Result<()> {
    // Validate the image before touching the port.
    let image = match firmware {
        Some(path) => FirmwareImage::from_file(path)
            .with_context(|| format!("Failed to load firmware image {}", path.display()))?,
        None => FirmwareImage::init(),
    };

    let port_name = cli
        .port
        .as_deref()
        .context("No serial port given (use --port or LRA1FLASH_PORT)")?;

    if cli.baud != DEFAULT_BAUD {
        warn!(
            "Baud rate {} ignored; the bootloader only speaks {DEFAULT_BAUD}",
            cli.baud
        );
    }

    if !cli.quiet {
        let action = match mode {
            Mode::Update => "Updating",
            Mode::Verify => "Verifying",
            Mode::Init => "Initializing",
        };
        let target = firmware.map_or_else(
            || "parameter area".to_string(),
            |p| p.display().to_string(),
        );
        println!(
            "{} {target} ({} bytes) via {port_name}",
            style(action).cyan().bold(),
            image.len()
        );
    }

    let port = NativePort::open(&SerialConfig::new(port_name, DEFAULT_BAUD))
        .with_context(|| format!("Failed to open serial port {port_name}"))?;
    let mut flasher = Lra1Flasher::new(port);

    // DTR doubles as the module's reset line on the usual adapters; park
    // it high so the module runs.
    flasher.port_mut().set_dtr(true)?;

    if cli.swreset {
        flasher.reset_cmd()?;
    }
    if cli.reset {
        flasher.reset_dtr()?;
    }

    let result = session(&mut flasher, &image, mode, cli.quiet);
    // Release the port whether or not the transfer succeeded.
    let _ = flasher.close();
    result?;

    if !cli.quiet {
        println!("{}", style("Successful.").green().bold());
    }
    Ok(())
}

fn session(
    flasher: &mut Lra1Flasher<NativePort>,
    image: &FirmwareImage,
    mode: Mode,
    quiet: bool,
) -> Result<()> {
    // The prompt is an action the operator must take, so it is printed
    // even with --quiet.
    flasher
        .connect(|| {
            eprintln!(
                "{}",
                style("Waiting for bootloader. Power-cycle or reset the module now.")
                    .yellow()
                    .bold()
            );
        })
        .context("Bootloader handshake failed")?;

    let bar = if quiet {
        ProgressBar::hidden()
    } else {
        let bar = ProgressBar::new(image.len() as u64);
        bar.set_style(
            ProgressStyle::with_template("{bar:40.cyan/blue} {bytes}/{total_bytes} ({eta})")
                .unwrap_or_else(|_| ProgressStyle::default_bar()),
        );
        bar
    };

    let result = flasher.flash(image, mode, |sent, _total| bar.set_position(sent as u64));
    bar.finish_and_clear();
    result?;
    Ok(())
}
