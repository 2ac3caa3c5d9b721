use std::path::PathBuf;

use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand};

use zbc::{zone_operation, DeviceHandle, OpenFlags, ReportingOptions, ZoneOpFlags, ZoneOperation};

#[derive(Parser)]
#[command(name = "zbc-cli")]
#[command(about = "Inspect and control zoned block / ATA devices")]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Device file to operate on (e.g. /dev/sdb, or a regular file for the
    /// fake backend).
    device: PathBuf,

    /// Restrict the driver filter: comma-separated subset of
    /// block,scsi,ata,fake. Defaults to all.
    #[arg(long, global = true, value_delimiter = ',')]
    drv: Vec<String>,

    /// Relax alignment/zero-length checks in the I/O path.
    #[arg(long, global = true)]
    test_mode: bool,

    /// Open read-only.
    #[arg(long, global = true)]
    read_only: bool,

    /// none, warning, error, info, debug.
    #[arg(long, global = true, default_value = "warning")]
    log_level: String,
}

#[derive(Subcommand)]
enum Commands {
    /// Print device info.
    Info,
    /// List every zone.
    ListZones {
        #[arg(long, default_value_t = 0)]
        start_sector: u64,
    },
    /// Report up to `count` zones.
    ReportZones {
        #[arg(long, default_value_t = 0)]
        start_sector: u64,
        #[arg(long, default_value_t = 64)]
        count: usize,
    },
    /// Reset the write pointer of a zone, or every zone with `--all`.
    Reset {
        #[arg(default_value_t = 0)]
        sector: u64,
        #[arg(long)]
        all: bool,
    },
    /// Explicitly open a zone.
    OpenZone { sector: u64 },
    /// Close an open zone.
    CloseZone { sector: u64 },
    /// Finish (fill) a zone.
    FinishZone { sector: u64 },
    /// Read `count` sectors starting at `offset` and write them to stdout.
    Read {
        #[arg(long, default_value_t = 0)]
        offset: u64,
        #[arg(long, default_value_t = 1)]
        count: u64,
    },
    /// Read `count` sectors from stdin and write them starting at `offset`.
    Write {
        #[arg(long, default_value_t = 0)]
        offset: u64,
        #[arg(long, default_value_t = 1)]
        count: u64,
    },
    /// Flush the device's write cache.
    Flush,
}

fn driver_filter(names: &[String]) -> Result<OpenFlags> {
    let mut flags = OpenFlags::empty();
    for name in names {
        flags |= match name.as_str() {
            "block" => OpenFlags::DRV_BLOCK,
            "scsi" => OpenFlags::DRV_SCSI,
            "ata" => OpenFlags::DRV_ATA,
            "fake" => OpenFlags::DRV_FAKE,
            other => bail!("unknown driver {other:?} (expected block, scsi, ata, or fake)"),
        };
    }
    Ok(flags)
}

fn open_handle(cli: &Cli) -> Result<DeviceHandle> {
    let mut flags = driver_filter(&cli.drv)?;
    if cli.test_mode {
        flags |= OpenFlags::TEST_MODE;
    }
    flags |= if cli.read_only {
        OpenFlags::O_RDONLY
    } else {
        OpenFlags::O_RDWR
    };
    zbc::open(&cli.device, flags).with_context(|| format!("opening {}", cli.device.display()))
}

fn print_zones(zones: &[zbc::ZoneDescriptor]) {
    for (i, z) in zones.iter().enumerate() {
        println!(
            "Zone {i}: type={} cond={} start={} len={} wp={}{}",
            z.zone_type.name(),
            z.condition.name(),
            z.start,
            z.length,
            z.write_pointer,
            if z.reset_recommended {
                " reset-recommended"
            } else {
                ""
            },
        );
    }
}

fn blank_zone() -> zbc::ZoneDescriptor {
    zbc::ZoneDescriptor {
        start: 0,
        length: 0,
        write_pointer: 0,
        zone_type: zbc::ZoneType::Unknown,
        condition: zbc::ZoneCondition::Unknown,
        reset_recommended: false,
        non_sequential_write: false,
    }
}

fn main() -> Result<()> {
    env_logger::init();
    let cli = Cli::parse();
    zbc::set_log_level(&cli.log_level);

    match &cli.command {
        Commands::Info => {
            let handle = open_handle(&cli)?;
            println!("Device: {}", cli.device.display());
            print!("{}", handle.info());
            zbc::close(handle)?;
        }
        Commands::ListZones { start_sector } => {
            let mut handle = open_handle(&cli)?;
            let zones = zbc::list_zones(&mut handle, *start_sector, ReportingOptions::LIST_ALL)?;
            print_zones(&zones);
            zbc::close(handle)?;
        }
        Commands::ReportZones { start_sector, count } => {
            let mut handle = open_handle(&cli)?;
            let mut out = vec![blank_zone(); *count];
            let n = zbc::report_zones(
                &mut handle,
                *start_sector,
                ReportingOptions::LIST_ALL,
                &mut out,
            )?;
            out.truncate(n);
            print_zones(&out);
            zbc::close(handle)?;
        }
        Commands::Reset { sector, all } => {
            let mut handle = open_handle(&cli)?;
            let flags = if *all {
                ZoneOpFlags::ALL_ZONES
            } else {
                ZoneOpFlags::empty()
            };
            zone_operation(&mut handle, *sector, ZoneOperation::Reset, flags)?;
            zbc::close(handle)?;
        }
        Commands::OpenZone { sector } => {
            let mut handle = open_handle(&cli)?;
            zone_operation(&mut handle, *sector, ZoneOperation::Open, ZoneOpFlags::empty())?;
            zbc::close(handle)?;
        }
        Commands::CloseZone { sector } => {
            let mut handle = open_handle(&cli)?;
            zone_operation(&mut handle, *sector, ZoneOperation::Close, ZoneOpFlags::empty())?;
            zbc::close(handle)?;
        }
        Commands::FinishZone { sector } => {
            let mut handle = open_handle(&cli)?;
            zone_operation(&mut handle, *sector, ZoneOperation::Finish, ZoneOpFlags::empty())?;
            zbc::close(handle)?;
        }
        Commands::Read { offset, count } => {
            let mut handle = open_handle(&cli)?;
            let mut buf = vec![0u8; (*count as usize) * 512];
            let n = zbc::pread(&mut handle, &mut buf, *offset)?;
            buf.truncate((n as usize) * 512);
            std::io::Write::write_all(&mut std::io::stdout(), &buf)?;
            zbc::close(handle)?;
        }
        Commands::Write { offset, count } => {
            let mut handle = open_handle(&cli)?;
            let mut buf = vec![0u8; (*count as usize) * 512];
            std::io::Read::read_exact(&mut std::io::stdin(), &mut buf)
                .context("reading sector data from stdin")?;
            zbc::pwrite(&mut handle, &buf, *offset)?;
            zbc::close(handle)?;
        }
        Commands::Flush => {
            let mut handle = open_handle(&cli)?;
            zbc::flush(&mut handle)?;
            zbc::close(handle)?;
        }
    }

    Ok(())
}
