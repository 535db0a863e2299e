// SPDX-FileCopyrightText: 2024 Foundation Devices, Inc. <hello@foundationdevices.com>
// SPDX-License-Identifier: GPL-3.0-or-later

mod mergehex;

use cargo_metadata::MetadataCommand;
use clap::{Args, Parser, Subcommand};
use consts::{Layout, Placement, MBR_SIZE, NRF52832_S132, NRF52840_S140, PAGE_SIZE};
use mergehex::{merge_files, DEFAULT_PAGE_SIZE};
use std::path::{Path, PathBuf};
use std::process::{exit, Command, Stdio};
use std::{env, fs};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

#[derive(Parser)]
#[command(version, about, long_about = None)]
#[command(propagate_version = true)]
struct XtaskArgs {
    #[command(subcommand)]
    command: Commands,
    #[arg(short, long)]
    verbose: bool,
}

#[derive(Subcommand)]
enum Commands {
    /// Merge Intel HEX files page by page.
    /// A page present in a later input replaces the same page of earlier inputs.
    /// UICR registers are merged one word at a time.
    #[command(verbatim_doc_comment)]
    MergeHex {
        /// Page size in bytes, a power of two
        #[arg(short, long, default_value_t = DEFAULT_PAGE_SIZE)]
        page_size: u32,
        /// Output hex file
        output: PathBuf,
        /// Input hex files, in increasing priority
        #[arg(required = true)]
        inputs: Vec<PathBuf>,
    },

    /// Build a full flashable image with:
    /// SoftDevice
    /// Bootloader in release version
    /// Application (optional)
    #[command(verbatim_doc_comment)]
    BuildImage(ImageArgs),
}

#[derive(Args)]
struct ImageArgs {
    /// SoftDevice hex file, including the MBR
    #[arg(long)]
    softdevice: PathBuf,
    /// Application hex file
    #[arg(long)]
    application: Option<PathBuf>,
    /// Build for the nRF52840 with S140 instead of the nRF52832 with S132
    #[arg(long)]
    nrf52840: bool,
    /// Place the bootloader at address 0 instead of the MBR
    #[arg(long)]
    replaces_mbr: bool,
    /// Build the bootloader with RTT logging
    #[arg(long)]
    debug: bool,
}

impl ImageArgs {
    fn layout(&self) -> Layout {
        let chip = if self.nrf52840 { NRF52840_S140 } else { NRF52832_S132 };
        if self.replaces_mbr {
            chip.with_placement(Placement::ReplacesMbr)
        } else {
            chip
        }
    }

    fn features(&self) -> Vec<&'static str> {
        let mut features = if self.nrf52840 {
            vec!["nrf52840", "s140"]
        } else {
            vec!["nrf52832", "s132"]
        };
        features.extend(["input-checks", "page-checks", "error-reporting", "buffer-endpoint", "dynamic-info"]);
        if self.replaces_mbr {
            features.push("replaces-mbr");
        }
        if self.debug {
            features.push("debug");
        }
        features
    }

    /// `cargo <subcommand>` for the bootloader with the selected features.
    fn bootloader_cargo(&self, subcommand: &str) -> Command {
        let mut cmd = Command::new(cargo());
        cmd.current_dir(project_root().join("bootloader"))
            .args([subcommand, "--release", "--no-default-features", "--features"])
            .arg(self.features().join(","));
        cmd
    }
}

fn project_root() -> PathBuf {
    Path::new(&env!("CARGO_MANIFEST_DIR"))
        .ancestors()
        .nth(1)
        .expect("xtask lives one level below the workspace root")
        .to_path_buf()
}

pub fn cargo() -> String {
    env::var("CARGO").unwrap_or_else(|_| "cargo".to_string())
}

/// Directory the packaged images are written to.
fn package_dir() -> PathBuf {
    let metadata = MetadataCommand::new()
        .manifest_path(project_root().join("Cargo.toml"))
        .exec()
        .expect("Failed to get workspace metadata");
    metadata.target_directory.as_std_path().join("dfu")
}

fn run(mut cmd: Command, what: &str, verbose: bool) {
    if !verbose {
        cmd.stdout(Stdio::null()).stderr(Stdio::null());
    }
    let status = cmd.status().unwrap_or_else(|e| {
        tracing::error!("Running {what} failed: {e}");
        exit(-1);
    });
    if !status.success() {
        tracing::error!("{what} failed");
        exit(-1);
    }
}

fn build_tools_check(verbose: bool) {
    tracing::info!("Checking cargo binutils install state");
    let mut cmd = Command::new(cargo());
    cmd.current_dir(project_root()).args(["objcopy", "--version"]);
    if !verbose {
        cmd.stdout(Stdio::null()).stderr(Stdio::null());
    }
    let installed = cmd.status().map(|s| s.success()).unwrap_or(false);
    if !installed {
        tracing::info!("Please install cargo binutils with these commands:");
        tracing::info!("cargo install cargo-binutils");
        tracing::info!("rustup component add llvm-tools");
        exit(-1);
    }
}

fn build_bootloader(args: &ImageArgs, out: &Path, verbose: bool) -> PathBuf {
    tracing::info!("Building bootloader....");
    run(args.bootloader_cargo("build"), "Bootloader build", verbose);

    // Create bootloader binary first to show actual size, without the UICR word
    let bin = out.join("bootloader.bin");
    let mut cmd = args.bootloader_cargo("objcopy");
    cmd.args(["--", "-R", ".uicr_bootloader_addr", "-O", "binary"]).arg(&bin);
    run(cmd, "Bootloader binary generation", verbose);
    print_bootloader_binary_size(&bin, &args.layout());

    tracing::info!("Generating bootloader hex file...");
    let hex = out.join("bootloader.hex");
    let mut cmd = args.bootloader_cargo("objcopy");
    cmd.args(["--", "-O", "ihex"]).arg(&hex);
    run(cmd, "Bootloader hex generation", verbose);
    hex
}

fn build_image(args: &ImageArgs, verbose: bool) {
    build_tools_check(verbose);

    let out = package_dir();
    if !out.exists() {
        fs::create_dir_all(&out).unwrap_or_else(|e| {
            tracing::error!("Cannot create {}: {e}", out.display());
            exit(-1);
        });
    }

    let bootloader = build_bootloader(args, &out, verbose);

    // The bootloader goes last so its UICR word wins
    let mut inputs = vec![args.softdevice.clone()];
    inputs.extend(args.application.clone());
    inputs.push(bootloader);

    let image = out.join("image.hex");
    tracing::info!("Merging {} files into {}", inputs.len(), image.display());
    if let Err(e) = merge_files(&inputs, &image, PAGE_SIZE) {
        tracing::error!("Merge failed: {e}");
        exit(-1);
    }
    tracing::info!("Image ready: {}", image.display());
}

fn print_bootloader_binary_size(binary_path: &Path, layout: &Layout) {
    if let Ok(metadata) = fs::metadata(binary_path) {
        let size_bytes = metadata.len();
        let available = match layout.placement {
            Placement::AboveApplication => layout.bootloader_size(),
            Placement::ReplacesMbr => MBR_SIZE,
        } as u64;
        let usage_percentage = (size_bytes as f64 / available as f64) * 100.0;

        println!("Bootloader Binary Size:");
        println!("   Bytes: {} bytes", size_bytes);
        println!("   Flash Usage: {:.1}% of {} bytes available", usage_percentage, available);
        if size_bytes > available {
            tracing::error!("Bootloader does not fit its flash reservation");
            exit(-1);
        }
    } else {
        tracing::warn!("Could not read binary metadata for: {}", binary_path.display());
    }
}

fn main() {
    // Default to info when RUST_LOG is not set
    if env::var_os("RUST_LOG").is_none() {
        env::set_var("RUST_LOG", "info");
    }

    // Tracing using RUST_LOG
    tracing_subscriber::registry()
        .with(fmt::layer())
        .with(EnvFilter::from_default_env())
        .init();

    let args = XtaskArgs::parse();

    match args.command {
        Commands::MergeHex {
            page_size,
            output,
            inputs,
        } => {
            if let Err(e) = merge_files(&inputs, &output, page_size) {
                tracing::error!("Merge failed: {e}");
                exit(-1);
            }
            tracing::info!("Wrote {}", output.display());
        }
        Commands::BuildImage(image) => build_image(&image, args.verbose),
    }
}
