//! Command-line interface for nvprobe
//!
//! This setuid binary creates NVIDIA device files and loads NVIDIA
//! kernel modules, in a distribution-independent way, on behalf of
//! driver components that lack the privileges to do it themselves.
//! The first failed operation stops the run and sets a non-zero exit
//! code; everything else the caller asked for is skipped.

use std::path::PathBuf;

use anyhow::{anyhow, bail, Result};
use clap::Parser;

use nvprobe::memory;
use nvprobe::subsys::{caps, imex, modeset, nvidia, nvlink, nvswitch, uvm};

#[derive(Parser)]
#[command(name = "nvprobe")]
#[command(version = nvprobe::VERSION)]
#[command(about = "Load NVIDIA kernel modules and create NVIDIA device files", long_about = None)]
struct Cli {
    /// Create the NVIDIA device file with the given minor number; can be
    /// given multiple times to create multiple device files
    #[arg(short = 'c', long = "create-nvidia-device-file", value_name = "MINOR-NUMBER")]
    minors: Vec<u32>,

    /// Operate on the NVIDIA Unified Memory module and its device files
    /// instead of the main NVIDIA module
    #[arg(short = 'u', long)]
    unified_memory: bool,

    /// Load the NVIDIA modeset module and create its device file
    #[arg(short = 'm', long)]
    modeset: bool,

    /// Create the NVSwitch device files for each minor given with -c
    #[arg(short = 's', long)]
    nvswitch: bool,

    /// Create the NVLink control device file
    #[arg(short = 'l', long)]
    nvlink: bool,

    /// Create the NVIDIA capability device file announced by the given
    /// capability proc file; can be given multiple times
    #[arg(
        short = 'f',
        long = "nvidia-capability-device-file",
        value_name = "CAP-FILE-PATH"
    )]
    capability_files: Vec<PathBuf>,

    /// Create the NVIDIA IMEX channel device files for a minor number
    /// range, in START:COUNT form
    #[arg(
        short = 'i',
        long = "nvidia-imex-channel-device-file",
        value_name = "START:COUNT",
        value_parser = parse_channel_range
    )]
    imex_channels: Option<ChannelRange>,

    /// Enable the online_movable auto-onlining kernel setting, for
    /// platforms that hot-add GPU memory to the kernel
    #[arg(short = 'a', long)]
    auto_online_movable: bool,
}

#[derive(Debug, Clone, Copy)]
struct ChannelRange {
    start: u32,
    count: u32,
}

fn parse_channel_range(s: &str) -> Result<ChannelRange, String> {
    let (start, count) = s
        .split_once(':')
        .ok_or_else(|| format!("`{s}` is not in START:COUNT form"))?;

    let start = start
        .parse::<u32>()
        .map_err(|_| format!("`{start}` is not a valid start minor"))?;
    let count = count
        .parse::<u32>()
        .map_err(|_| format!("`{count}` is not a valid minor count"))?;

    Ok(ChannelRange { start, count })
}

fn ensure(ok: bool, what: &str) -> Result<()> {
    if ok {
        Ok(())
    } else {
        bail!("failed to {what}");
    }
}

fn main() -> Result<()> {
    env_logger::init();
    let cli = Cli::parse();

    if cli.auto_online_movable {
        ensure(
            memory::enable_auto_online_movable(),
            "enable auto-onlining of movable memory blocks",
        )?;
    }

    // -u and -s change what the -c minors mean; everything else builds
    // on the main NVIDIA module.
    if cli.unified_memory {
        ensure(uvm::load(true), "load the NVIDIA Unified Memory kernel module")?;
        for &minor in &cli.minors {
            ensure(
                uvm::create_device_files(minor),
                "create the NVIDIA Unified Memory device files",
            )?;
        }
    } else {
        ensure(nvidia::load(true), "load the NVIDIA kernel module")?;

        if cli.nvswitch {
            for &minor in &cli.minors {
                ensure(
                    nvswitch::create_device_file(minor),
                    "create an NVSwitch device file",
                )?;
            }
        } else {
            for &minor in &cli.minors {
                ensure(
                    nvidia::create_device_file(minor),
                    "create an NVIDIA device file",
                )?;
            }
        }
    }

    if cli.modeset {
        ensure(modeset::load(true), "load the NVIDIA modeset kernel module")?;
        ensure(
            modeset::create_device_file(),
            "create the NVIDIA modeset device file",
        )?;
    }

    if cli.nvlink {
        ensure(
            nvlink::create_device_file(),
            "create the NVLink control device file",
        )?;
    }

    for cap_file in &cli.capability_files {
        caps::create_device_file(cap_file).ok_or_else(|| {
            anyhow!(
                "failed to create the capability device file for {}",
                cap_file.display()
            )
        })?;
    }

    if let Some(range) = cli.imex_channels {
        let end = range.start.saturating_add(range.count);
        for minor in range.start..end {
            ensure(
                imex::create_channel_device_file(minor),
                "create an NVIDIA IMEX channel device file",
            )?;
        }
    }

    Ok(())
}
