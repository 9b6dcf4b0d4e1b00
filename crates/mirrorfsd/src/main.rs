use clap::Parser;
use std::fs;
use std::io;
use std::path::PathBuf;
use std::sync::Arc;

mod store;
use crate::store::DiskStore;

#[derive(Debug, clap::Parser)]
struct Cli {
    /// Directory to export
    exportdir: PathBuf,

    /// host:port to listen on
    #[arg(default_value_t = format!("0.0.0.0:{}", mirrorfs::DEFAULT_PORT))]
    address: String,

    /// Deny every mutating operation
    #[arg(long)]
    read_only: bool,
}

fn mirrorfsd_main(
    Cli {
        address,
        exportdir,
        read_only,
    }: Cli,
) -> mirrorfs::Result<i32> {
    if !exportdir.exists() {
        fs::create_dir_all(&exportdir)?;
    }
    if !fs::metadata(&exportdir)?.is_dir() {
        return Err(io::Error::other("export path must be a directory").into());
    }

    if read_only {
        println!("[*] Read-only export");
    }
    println!("[*] Exporting: {}", exportdir.display());
    println!("[*] Ready to accept clients: {}", address);

    mirrorfs::srv::serve_addr(&address, Arc::new(DiskStore::new(exportdir, read_only)))
        .and(Ok(0))
}

fn main() {
    env_logger::init();

    let exit_code = mirrorfsd_main(Cli::parse()).unwrap_or_else(|e| {
        eprintln!("Error: {:?}", e);
        -1
    });

    std::process::exit(exit_code);
}
