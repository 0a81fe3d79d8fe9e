use clap::{Parser, Subcommand};
use sfs::dir::DirEntryKind;
use sfs::geometry::Geometry;
use sfs::volume::{CreateOptions, Volume};
use std::io::Write;
use std::path::PathBuf;

#[derive(Parser)]
#[command(name = "mksfs", about = "Create, populate and inspect SFS volume images")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Format a new volume image
    Create {
        image: PathBuf,
        /// Block size exponent; bytes per block = 1 << (n + 7)
        #[arg(short, long, default_value = "2")]
        block_size: u8,
        /// Total blocks on the medium
        #[arg(short = 'n', long, default_value = "100")]
        total_blocks: u64,
        /// Volume label (up to 52 bytes)
        #[arg(short, long, default_value = "SFS")]
        label: String,
    },
    /// Show volume metadata
    Info {
        image: PathBuf,
        /// Use the block-cache accessor instead of mapping the image
        #[arg(long)]
        cached: bool,
    },
    /// List the root directory
    List {
        image: PathBuf,
        #[arg(long)]
        cached: bool,
    },
    /// Add a directory entry
    Mkdir { image: PathBuf, name: String },
    /// Add a file entry and write its content
    Add {
        image: PathBuf,
        name: String,
        /// Host file to copy in; omitted means an empty allocation of --size bytes
        #[arg(short, long)]
        input: Option<PathBuf>,
        /// Allocation size in bytes when no input file is given
        #[arg(short, long, default_value = "0")]
        size: u64,
    },
    /// Print a file's content
    Cat {
        image: PathBuf,
        name: String,
        #[arg(long)]
        cached: bool,
    },
    /// Mark an entry as deleted
    Rm {
        image: PathBuf,
        name: String,
        /// Remove a directory entry instead of a file entry
        #[arg(short, long)]
        dir: bool,
    },
    /// Filesystem statistics
    Stat {
        image: PathBuf,
        #[arg(long)]
        cached: bool,
    },
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    match Cli::parse().command {
        // ── Create ───────────────────────────────────────────────────────────
        Commands::Create { image, block_size, total_blocks, label } => {
            let opts = CreateOptions { block_size, total_blocks, label };
            let vol = Volume::create(&image, &opts)?;
            let geo = Geometry::of(vol.superblock());
            vol.close()?;
            println!(
                "Created {} ({} blocks of {} bytes, {} bytes total)",
                image.display(),
                total_blocks,
                geo.bytes_per_block,
                geo.media_size
            );
        }

        // ── Info ─────────────────────────────────────────────────────────────
        Commands::Info { image, cached } => {
            let vol = open_volume(&image, cached)?;
            let sb = vol.superblock();
            let geo = Geometry::of(sb);
            let id = vol.volume_id()?;

            println!("── SFS volume ───────────────────────────────────────────");
            println!("  Path            {}", image.display());
            if let Some(id) = &id {
                println!("  Label           {}", id.name);
                println!("  Created at      {}", format_millis(id.timestamp));
            }
            println!("  Altered at      {}", format_millis(sb.alteration_time));
            println!("  Block size      {} B", geo.bytes_per_block);
            println!("  Total blocks    {}", sb.total_blocks);
            println!("  Reserved blocks {}", sb.reserved_blocks);
            println!("  Index size      {} B ({} entries)", sb.index_bytes, sb.index_bytes / 64);
            println!("  Data region     {}..{}", geo.data_start, geo.index_start);
        }

        // ── List ─────────────────────────────────────────────────────────────
        Commands::List { image, cached } => {
            let vol = open_volume(&image, cached)?;
            println!("{:<56} {:>5} {:>12}  Modified", "Name", "Kind", "Size");
            for entry in vol.entries() {
                let entry = entry?;
                let kind = match entry.kind {
                    DirEntryKind::Directory => "dir",
                    DirEntryKind::File => "file",
                };
                let size = entry
                    .size
                    .map(|s| s.to_string())
                    .unwrap_or_else(|| "—".into());
                println!(
                    "{:<56} {:>5} {:>12}  {}",
                    entry.name,
                    kind,
                    size,
                    format_millis(entry.timestamp)
                );
            }
        }

        // ── Mkdir ────────────────────────────────────────────────────────────
        Commands::Mkdir { image, name } => {
            let mut vol = Volume::open(&image)?;
            vol.add_directory(&name)?;
            vol.close()?;
            println!("Added directory {name:?}");
        }

        // ── Add ──────────────────────────────────────────────────────────────
        Commands::Add { image, name, input, size } => {
            let data = match &input {
                Some(path) => std::fs::read(path)?,
                None => Vec::new(),
            };
            let alloc_size = if input.is_some() { data.len() as u64 } else { size };

            let mut vol = Volume::open(&image)?;
            let handle = vol.add_file(&name, alloc_size)?;
            if !data.is_empty() {
                vol.write_file(&handle, &data)?;
            }
            vol.close()?;
            println!("Added file {name:?} ({} bytes)", data.len());
        }

        // ── Cat ──────────────────────────────────────────────────────────────
        Commands::Cat { image, name, cached } => {
            let mut vol = open_volume(&image, cached)?;
            let handle = vol
                .find_file(&name)?
                .ok_or_else(|| format!("no file named {name:?}"))?;
            let data = vol.read_file(&handle, u64::MAX)?;
            std::io::stdout().write_all(&data)?;
        }

        // ── Rm ───────────────────────────────────────────────────────────────
        Commands::Rm { image, name, dir } => {
            let mut vol = Volume::open(&image)?;
            if dir {
                vol.remove_directory(&name)?;
            } else {
                vol.remove_file(&name)?;
            }
            vol.close()?;
            println!("Removed {name:?}");
        }

        // ── Stat ─────────────────────────────────────────────────────────────
        Commands::Stat { image, cached } => {
            let vol = open_volume(&image, cached)?;
            let stats = vol.stats()?;
            println!("  Block size       {} B", stats.block_size);
            println!("  Total blocks     {}", stats.total_blocks);
            println!("  Reserved blocks  {}", stats.reserved_blocks);
            println!("  Used blocks      {}", stats.used_blocks);
            println!("  Free blocks      {}", stats.free_blocks);
            println!("  Available blocks {}", stats.available_blocks);
            println!("  Max name length  {}", stats.max_name_len);
            println!("  Index entries    {}", stats.index_entries);
        }
    }

    Ok(())
}

// ── helpers ──────────────────────────────────────────────────────────────────

fn open_volume(path: &PathBuf, cached: bool) -> sfs::Result<Volume> {
    if cached {
        Volume::open_cached(path)
    } else {
        Volume::open(path)
    }
}

fn format_millis(millis: i64) -> String {
    chrono::DateTime::from_timestamp_millis(millis)
        .map(|dt| dt.format("%Y-%m-%d %H:%M:%S").to_string())
        .unwrap_or_else(|| millis.to_string())
}
