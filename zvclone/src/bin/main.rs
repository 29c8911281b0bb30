use clap::Parser;
use tracing_subscriber::EnvFilter;
use zvclone::cli::{Args, Command};
use zvclone::{clone, export, instances, restore, ConfigRoot};
use zvclone_core::zv_error;
use zvclone_zfs::ZfsBackend;

fn main() {
    // Human-facing output goes through the zv_* macros; tracing carries the
    // diagnostic channel, off by default and enabled via RUST_LOG.
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_writer(std::io::stderr)
        .init();

    let args = Args::parse();
    let root = ConfigRoot::new(args.config_root.clone());
    let backend = ZfsBackend;

    let result = match args.command {
        Command::List => instances::handle_list(&root),
        Command::Clone {
            ref source_id,
            ref new_id,
            mode,
            ref snapshots,
            yes,
        } => clone::handle_clone(
            &root,
            &backend,
            &clone::CloneOptions {
                source_id: source_id.clone(),
                target_id: new_id.clone(),
                mode,
                snapshot_indices: snapshots.clone(),
                pool_path: args.pool_path.clone(),
                storage: args.storage.clone(),
                assume_yes: yes,
            },
        ),
        Command::Export {
            ref source_id,
            ref export_dir,
            compress,
            ref snapshots,
        } => export::handle_export(
            &root,
            &backend,
            &export::ExportOptions {
                source_id: source_id.clone(),
                export_parent: export_dir.clone(),
                codec: compress.into(),
                snapshot_indices: snapshots.clone(),
                pool_path: args.pool_path.clone(),
                storage: args.storage.clone(),
            },
        ),
        Command::Restore {
            ref import_dir,
            ref new_id,
        } => restore::handle_restore(
            &root,
            &backend,
            &restore::RestoreOptions {
                import_dir: import_dir.clone(),
                target_id: new_id.clone(),
                pool_path: args.pool_path.clone(),
            },
        ),
    };

    if let Err(e) = result {
        zv_error!("{}", e);
        std::process::exit(1);
    }
}
