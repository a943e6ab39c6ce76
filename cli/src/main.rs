use anyhow::Context;
use clap::{Parser, Subcommand};
use log::LevelFilter;
use rawfs_core::{RawfsError, ReaderConfig};
use rawfs_filesystems::{utils, Attribute, AttributeType, FileRecord, NtfsVolume, Volume, HEADER_SIZE};
use std::fs::File;
use std::io::{self, Read, Seek, SeekFrom, Write};
use std::path::PathBuf;
use std::process::ExitCode;

#[derive(Parser)]
#[command(name = "rawfs")]
#[command(about = "Read NTFS metadata straight from a raw device or disk image", long_about = None)]
struct Cli {
    /// Increase log verbosity (-v debug, -vv trace)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    verbose: u8,
    /// JSON reader configuration file
    #[arg(long, global = true)]
    config: Option<PathBuf>,
    /// Byte offset of the volume inside the device
    #[arg(long, global = true)]
    offset: Option<u64>,
    /// Block size for raw reads; disables the native sector size probe
    #[arg(long, global = true)]
    block_size: Option<u32>,
    /// Device or image path
    device: PathBuf,
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Show volume geometry and the MFT's own attributes
    Info,
    /// Hex dump of the volume header
    Header,
    /// List the attributes and data runs of an MFT record
    Record {
        /// MFT record number
        number: u64,
    },
    /// Write an attribute's content to stdout
    Cat {
        /// MFT record number
        number: u64,
        /// Attribute type ($DATA, data, 0x80, ...)
        #[arg(short = 't', long = "type", default_value = "data")]
        attribute_type: String,
        /// Attribute name, e.g. an alternate data stream
        #[arg(short, long)]
        name: Option<String>,
    },
}

fn main() -> ExitCode {
    let cli = Cli::parse();
    init_logging(cli.verbose);

    match run(&cli) {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => match e.downcast_ref::<RawfsError>() {
            Some(open @ RawfsError::Open { .. }) => {
                eprintln!("rawfs: error: {}", open);
                ExitCode::from(2)
            }
            _ => {
                eprintln!("rawfs: error: {:#}", e);
                ExitCode::FAILURE
            }
        },
    }
}

fn init_logging(verbose: u8) {
    let mut builder = env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("warn"));
    match verbose {
        0 => {}
        1 => {
            builder.filter_level(LevelFilter::Debug);
        }
        _ => {
            builder.filter_level(LevelFilter::Trace);
        }
    }
    builder.init();
}

fn load_config(cli: &Cli) -> anyhow::Result<ReaderConfig> {
    let mut config = match &cli.config {
        Some(path) => ReaderConfig::from_file(path)
            .with_context(|| format!("failed to load configuration from {}", path.display()))?,
        None => ReaderConfig::default(),
    };

    if let Some(offset) = cli.offset {
        config.volume_offset = offset;
    }
    if let Some(block_size) = cli.block_size {
        config.default_block_size = block_size;
        config.probe_sector_size = false;
    }
    config.validate()?;
    Ok(config)
}

fn run(cli: &Cli) -> anyhow::Result<()> {
    let config = load_config(cli)?;

    if let Commands::Header = cli.command {
        return dump_header(cli, &config);
    }

    let volume = Volume::open_path(&cli.device, &config)?;
    let mut ntfs = match volume {
        Volume::Ntfs(ntfs) => ntfs,
    };

    match &cli.command {
        Commands::Info => show_info(&ntfs),
        Commands::Record { number } => {
            let record = ntfs
                .read_record(*number)
                .with_context(|| format!("failed to read MFT record {}", number))?;
            println!("Record {} at {:#x}", number, record.offset());
            print_record(&record);
            Ok(())
        }
        Commands::Cat { number, attribute_type, name } => {
            cat_attribute(&mut ntfs, *number, attribute_type, name.as_deref())
        }
        Commands::Header => Ok(()),
    }
}

fn dump_header(cli: &Cli, config: &ReaderConfig) -> anyhow::Result<()> {
    let mut device = utils::open_source(&cli.device, config)?;
    device
        .seek(SeekFrom::Start(config.volume_offset))
        .and_then(|_| {
            let mut header = [0u8; HEADER_SIZE];
            device.read_exact(&mut header).map(|_| header)
        })
        .map(|header| print!("{}", utils::hexdump(&header, config.volume_offset)))
        .with_context(|| format!("failed to read the header of {}", cli.device.display()))
}

fn show_info(ntfs: &NtfsVolume<File>) -> anyhow::Result<()> {
    let boot = ntfs.boot_sector();
    println!("Filesystem:          NTFS");
    println!("Volume offset:       {:#x}", ntfs.offset());
    println!("Serial number:       {:016X}", boot.volume_serial);
    println!("Bytes per sector:    {}", boot.bytes_per_sector);
    println!("Sectors per cluster: {}", boot.sectors_per_cluster);
    println!("Cluster size:        {}", boot.cluster_size);
    println!("Total sectors:       {} ({:.2} GB)",
             boot.total_sectors,
             boot.volume_size() as f64 / 1_073_741_824.0);
    println!("MFT record size:     {}", boot.mft_record_size);
    match boot.index_buffer_size() {
        Some(size) => println!("Index buffer size:   {}", size),
        None => println!("Index buffer size:   invalid ({})", boot.clusters_per_index_buffer),
    }
    println!("MFT cluster:         {}", boot.mft_lcn);
    println!("MFT mirror cluster:  {}", boot.mft_mirror_lcn);

    let location = ntfs.mft_location();
    println!("MFT record 0 at:     {:#x}{}",
             location.offset(),
             if location.is_backup() { " (read from mirror)" } else { "" });
    println!();
    print_record(ntfs.mft());
    Ok(())
}

fn print_record(record: &FileRecord) {
    println!("  Sequence: {}  Flags: {:#06x}{}{}",
             record.sequence_number(),
             record.flags(),
             if record.is_in_use() { " in-use" } else { "" },
             if record.is_directory() { " directory" } else { "" });

    for attribute in record.attributes() {
        println!("  {:<24} #{:<3} {:<20} {:>12} bytes  {}{}",
                 attribute.type_code().to_string(),
                 attribute.instance(),
                 attribute.name().unwrap_or("-"),
                 attribute.data_size(),
                 if attribute.is_resident() { "resident" } else { "non-resident" },
                 describe_flags(attribute));

        if attribute.is_resident() {
            continue;
        }
        for (index, run) in attribute.runs().iter().enumerate() {
            match run.offset {
                Some(offset) => println!("      run {:>3}: {:>12} bytes at {:#x}", index, run.length, offset),
                None => println!("      run {:>3}: {:>12} bytes sparse", index, run.length),
            }
        }
    }
}

fn describe_flags(attribute: &Attribute) -> String {
    let mut names = Vec::new();
    if attribute.is_compressed() {
        names.push("compressed");
    }
    if attribute.is_encrypted() {
        names.push("encrypted");
    }
    if attribute.is_sparse() {
        names.push("sparse");
    }
    if names.is_empty() {
        String::new()
    } else {
        format!(" [{}]", names.join(", "))
    }
}

fn cat_attribute(
    ntfs: &mut NtfsVolume<File>,
    number: u64,
    attribute_type: &str,
    name: Option<&str>,
) -> anyhow::Result<()> {
    let attribute_type: AttributeType = attribute_type.parse()?;
    let record = ntfs
        .read_record(number)
        .with_context(|| format!("failed to read MFT record {}", number))?;
    let attribute = record.find_named(attribute_type, name).with_context(|| {
        format!("record {} has no {} attribute named {}", number, attribute_type, name.unwrap_or("\"\""))
    })?;

    let stdout = io::stdout();
    let mut out = stdout.lock();
    let mut stream = ntfs.open_stream(attribute);
    io::copy(&mut stream, &mut out)
        .with_context(|| format!("failed to read {} of record {}", attribute_type, number))?;
    out.flush()?;
    Ok(())
}
