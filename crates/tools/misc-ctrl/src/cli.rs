//! Definition of the command line interface (CLI).

use std::path::PathBuf;

use clap::{Parser, ValueEnum};
use thiserror::Error;
use tracing::info;

use misc_writer::{
    DeviceResolver, FixedDevice, Flag, FlagState, FstabResolver, MiscError, MiscWriter,
    MiscWriterAction,
};

use crate::config::{load_layout, ConfigError};

/// Error running a command.
#[derive(Debug, Error)]
pub enum CliError {
    #[error(transparent)]
    Config(#[from] ConfigError),
    #[error(transparent)]
    Misc(#[from] MiscError),
    #[error("invalid hex data")]
    InvalidHex(#[from] hex::FromHexError),
}

pub fn main() -> Result<(), CliError> {
    run(&Args::parse())
}

/// Render an error together with all of its causes.
pub fn report(error: &dyn std::error::Error) -> String {
    let mut report = format!("error: {error}");
    let mut source = error.source();
    while let Some(cause) = source {
        report.push_str(&format!("\n  caused by: {cause}"));
        source = cause.source();
    }
    report
}

/// Run the given command.
pub fn run(args: &Args) -> Result<(), CliError> {
    let layout = load_layout(args.config.as_deref())?;
    let resolver: Box<dyn DeviceResolver> = match (&args.device, &args.fstab) {
        (Some(device), _) => Box::new(FixedDevice::new(device)),
        (None, Some(fstab)) => Box::new(FstabResolver::new().with_fstab(fstab)),
        (None, None) => Box::new(FstabResolver::new()),
    };
    let writer = MiscWriter::new(resolver).with_layout(layout)?;
    match &args.command {
        Command::Set {
            flag,
            override_offset,
        } => {
            writer.perform(MiscWriterAction::set(flag.into()), *override_offset)?;
        }
        Command::Clear {
            flag,
            override_offset,
        } => {
            writer.perform(MiscWriterAction::clear(flag.into()), *override_offset)?;
        }
        Command::Write { offset, data } => {
            let data = hex::decode(data)?;
            writer.write_vendor_space(*offset, &data)?;
            info!("wrote {} bytes at vendor space offset {offset}", data.len());
        }
        Command::Status => {
            for flag in Flag::ALL {
                match writer.flag_state(flag)? {
                    FlagState::Set => println!("{flag}: set"),
                    FlagState::Clear => println!("{flag}: clear"),
                    FlagState::Unknown(bytes) => {
                        println!("{flag}: unknown ({})", hex::encode(bytes))
                    }
                }
            }
        }
    }
    Ok(())
}

#[derive(Debug, Parser)]
#[clap(author, version, about)]
pub struct Args {
    /// Layout configuration file.
    #[clap(long, global = true)]
    pub config: Option<PathBuf>,
    /// Device to write to instead of the misc partition from the mount table.
    #[clap(long, global = true)]
    pub device: Option<PathBuf>,
    /// Mount table to look up the misc partition in.
    #[clap(long, global = true, conflicts_with = "device")]
    pub fstab: Option<PathBuf>,
    /// The command.
    #[clap(subcommand)]
    pub command: Command,
}

#[derive(Debug, Parser)]
pub enum Command {
    /// Set a flag.
    Set {
        flag: FlagArg,
        /// Offset in the vendor space to use instead of the flag's default offset.
        #[clap(long)]
        override_offset: Option<u64>,
    },
    /// Clear a flag.
    Clear {
        flag: FlagArg,
        /// Offset in the vendor space to use instead of the flag's default offset.
        #[clap(long)]
        override_offset: Option<u64>,
    },
    /// Write raw bytes into the vendor space.
    Write {
        /// Offset in the vendor space.
        #[clap(long)]
        offset: u64,
        /// Hex-encoded bytes to write.
        data: String,
    },
    /// Show the state of all flags.
    Status,
}

#[derive(Debug, Clone, Copy, ValueEnum)]
pub enum FlagArg {
    /// Dark theme flag.
    Theme,
    /// Seamless update flag.
    Sota,
}

impl From<&FlagArg> for Flag {
    fn from(value: &FlagArg) -> Self {
        match value {
            FlagArg::Theme => Flag::Theme,
            FlagArg::Sota => Flag::Sota,
        }
    }
}
