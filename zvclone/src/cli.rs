use crate::clone::CloneMode;
use clap::{Parser, Subcommand, ValueEnum};
use std::path::PathBuf;
use zvclone_zfs::Codec;

#[derive(Debug, Parser)]
#[command(name = "zvclone")]
#[command(about = "Clone, export, and restore ZFS-backed VMs and containers from snapshots")]
#[command(version)]
pub struct Args {
    /// Root of the instance configuration tree
    #[arg(long, global = true, default_value = crate::instances::DEFAULT_CONFIG_ROOT)]
    pub config_root: PathBuf,

    /// Base path of the ZFS datasets
    #[arg(long, global = true, default_value = crate::instances::DEFAULT_POOL_PATH)]
    pub pool_path: String,

    /// Storage backend name referenced by instance configurations
    #[arg(long, global = true, default_value = crate::instances::DEFAULT_STORAGE)]
    pub storage: String,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Debug, Subcommand)]
pub enum Command {
    /// List available VMs and containers
    List,
    /// Clone an instance from a snapshot
    Clone {
        /// ID of the source instance
        source_id: String,
        /// ID for the new instance (default: 9<source_id>)
        new_id: Option<String>,
        /// Clone mode
        #[arg(long, value_enum, default_value_t = CloneMode::Linked)]
        mode: CloneMode,
        /// Snapshot index; repeat for one clone job per snapshot
        #[arg(long = "snapshot", value_name = "INDEX", allow_negative_numbers = true)]
        snapshots: Vec<i64>,
        /// Skip confirmation prompts
        #[arg(long)]
        yes: bool,
    },
    /// Export an instance's config and snapshot data into a bundle directory
    Export {
        /// ID of the source instance
        source_id: String,
        /// Parent directory for the bundle directories
        export_dir: PathBuf,
        /// Compression codec for the data streams
        #[arg(long, value_enum, default_value_t = CodecArg::None)]
        compress: CodecArg,
        /// Snapshot index; repeat for one bundle per snapshot
        #[arg(long = "snapshot", value_name = "INDEX", allow_negative_numbers = true)]
        snapshots: Vec<i64>,
    },
    /// Restore an instance from an export bundle
    Restore {
        /// Bundle directory produced by export
        import_dir: PathBuf,
        /// ID for the restored instance (default: 8<source_id>)
        new_id: Option<String>,
    },
}

#[derive(Debug, Clone, Copy, ValueEnum)]
pub enum CodecArg {
    None,
    Gzip,
    Zstd,
}

impl std::fmt::Display for CodecArg {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", Codec::from(*self))
    }
}

impl From<CodecArg> for Codec {
    fn from(arg: CodecArg) -> Self {
        match arg {
            CodecArg::None => Codec::None,
            CodecArg::Gzip => Codec::Gzip,
            CodecArg::Zstd => Codec::Zstd,
        }
    }
}
