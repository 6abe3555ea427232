use std::error::Error;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use clap::{Args, Parser, Subcommand, ValueEnum};
use tokio::sync::Mutex;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

use synscan::config::MountConfig;
use synscan::format::{format_dec_dms, format_ra_hms};
use synscan::{Axis, Direction, MountController, RaDec, TrackingMode, DEFAULT_JOG_SPEED};

#[derive(Parser)]
#[command(author, version, about = "Control a SynScan equatorial mount over serial", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Settings file
    #[arg(long, global = true, default_value = "config.json")]
    config: PathBuf,

    /// Serial port, overrides the settings file
    #[arg(long, global = true)]
    port: Option<String>,

    #[arg(long, global = true)]
    baud: Option<u32>,

    /// Observer latitude in degrees, north positive
    #[arg(long, global = true, allow_negative_numbers = true)]
    lat: Option<f64>,

    /// Observer longitude in degrees, east positive
    #[arg(long, global = true, allow_negative_numbers = true)]
    lon: Option<f64>,

    /// Observer elevation in meters
    #[arg(long, global = true, allow_negative_numbers = true)]
    elev: Option<i32>,

    /// Log every frame on the wire
    #[arg(long, global = true)]
    debug: bool,
}

#[derive(Subcommand)]
enum Commands {
    /// Lists connected serial devices
    List,
    /// Firmware version, steps per revolution, site and position
    Info,
    /// Read the current RA/DEC once
    Position,
    /// Print the position periodically until Ctrl-C
    Monitor {
        /// Poll interval in milliseconds
        #[arg(long, default_value_t = 1000)]
        interval: u64,
    },
    /// GOTO an equatorial position with the composite command
    Goto(GotoArgs),
    /// GOTO a horizon position
    GotoAltaz {
        /// Azimuth in degrees, north through east
        az: f64,
        /// Altitude in degrees
        #[arg(allow_negative_numbers = true)]
        alt: f64,
    },
    /// GOTO by encoder targets
    Slew {
        /// Right ascension in degrees
        #[arg(allow_negative_numbers = true)]
        ra: f64,
        /// Declination in degrees
        #[arg(allow_negative_numbers = true)]
        dec: f64,
    },
    /// Move one axis manually
    Jog(JogArgs),
    /// Stop both axes
    Stop,
    /// Set the tracking rate
    Track {
        #[arg(value_enum)]
        mode: TrackingArg,
    },
    /// Send the observer site to the mount and save it
    SetLocation {
        #[arg(allow_negative_numbers = true)]
        lat: f64,
        #[arg(allow_negative_numbers = true)]
        lon: f64,
        #[arg(default_value_t = 0, allow_negative_numbers = true)]
        elev: i32,
    },
    /// Write the effective settings to the settings file
    SaveConfig,
}

#[derive(Args)]
struct GotoArgs {
    /// Right ascension in degrees
    #[arg(allow_negative_numbers = true)]
    ra: f64,
    /// Declination in degrees
    #[arg(allow_negative_numbers = true)]
    dec: f64,
    /// Wait until the mount reports the target
    #[arg(long)]
    wait: bool,
    /// Arrival tolerance in degrees
    #[arg(long, default_value_t = 0.1)]
    tolerance: f64,
    /// Give up waiting after this many seconds
    #[arg(long, default_value_t = 120)]
    timeout: u64,
}

#[derive(Args)]
struct JogArgs {
    #[arg(value_enum)]
    axis: AxisArg,
    #[arg(value_enum)]
    direction: DirectionArg,
    /// Motor speed as a raw step rate
    #[arg(long, default_value_t = DEFAULT_JOG_SPEED)]
    speed: u32,
    /// Stop after this many milliseconds instead of waiting for Ctrl-C
    #[arg(long)]
    duration: Option<u64>,
}

#[derive(Clone, Copy, ValueEnum)]
enum AxisArg {
    Ra,
    Dec,
}

impl From<AxisArg> for Axis {
    fn from(arg: AxisArg) -> Self {
        match arg {
            AxisArg::Ra => Axis::RightAscension,
            AxisArg::Dec => Axis::Declination,
        }
    }
}

#[derive(Clone, Copy, ValueEnum)]
enum DirectionArg {
    Forward,
    Reverse,
}

impl From<DirectionArg> for Direction {
    fn from(arg: DirectionArg) -> Self {
        match arg {
            DirectionArg::Forward => Direction::Forward,
            DirectionArg::Reverse => Direction::Reverse,
        }
    }
}

#[derive(Clone, Copy, ValueEnum)]
enum TrackingArg {
    Off,
    Sidereal,
    Solar,
    Lunar,
}

impl From<TrackingArg> for TrackingMode {
    fn from(arg: TrackingArg) -> Self {
        match arg {
            TrackingArg::Off => TrackingMode::Off,
            TrackingArg::Sidereal => TrackingMode::Sidereal,
            TrackingArg::Solar => TrackingMode::Solar,
            TrackingArg::Lunar => TrackingMode::Lunar,
        }
    }
}

/// Settings file with command-line overrides applied.
fn effective_config(cli: &Cli) -> MountConfig {
    let mut config = MountConfig::load(&cli.config);
    if let Some(port) = &cli.port {
        config.port = port.clone();
    }
    if let Some(baud) = cli.baud {
        config.baud_rate = baud;
    }
    if let Some(lat) = cli.lat {
        config.latitude = Some(lat);
    }
    if let Some(lon) = cli.lon {
        config.longitude = Some(lon);
    }
    if let Some(elev) = cli.elev {
        config.elevation = elev;
    }
    config
}

fn print_position(position: RaDec) {
    println!(
        "RA {} ({:.4}°)  DEC {} ({:.4}°)",
        format_ra_hms(position.ra),
        position.ra,
        format_dec_dms(position.dec),
        position.dec
    );
}

fn list_serial() -> tokio_serial::Result<()> {
    let ports = tokio_serial::available_ports()?;
    ports.iter().for_each(|port| println!("{}", port.port_name));
    Ok(())
}

async fn connect(config: MountConfig) -> Result<MountController, Box<dyn Error>> {
    let mut mount: MountController = MountController::new(config);
    mount.connect().await?;
    Ok(mount)
}

async fn info(mount: &mut MountController) -> Result<(), Box<dyn Error>> {
    match mount.get_version().await {
        Ok(version) => println!("Firmware:       {version}"),
        Err(e) => println!("Firmware:       unknown ({e})"),
    }
    let state = mount.state();
    let site = state.effective_observer();
    println!("Steps/rev:      {}", state.steps_per_rev());
    println!(
        "Site:           lat {:.4}, lon {:.4}, elev {} m{}",
        site.latitude,
        site.longitude,
        site.elevation,
        if state.observer().is_none() { " (default)" } else { "" }
    );
    println!("Hemisphere:     {:?}", state.hemisphere());
    print_position(mount.get_ra_dec().await?);
    Ok(())
}

async fn monitor(mount: MountController, interval: Duration) -> Result<(), Box<dyn Error>> {
    let mount = Arc::new(Mutex::new(mount));
    let poller = {
        let mount = Arc::clone(&mount);
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            loop {
                ticker.tick().await;
                let mut mount = mount.lock().await;
                match mount.get_ra_dec().await {
                    Ok(position) => print_position(position),
                    Err(e) => warn!("Position read failed: {e}"),
                }
                if !mount.is_connected() {
                    break;
                }
            }
        })
    };

    tokio::select! {
        _ = tokio::signal::ctrl_c() => info!("Interrupted"),
        _ = poller => warn!("Link lost, monitor stopped"),
    }
    mount.lock().await.disconnect();
    Ok(())
}

async fn goto(mount: &mut MountController, args: &GotoArgs) -> Result<(), Box<dyn Error>> {
    mount.goto_ra_dec(args.ra, args.dec).await?;
    println!("GOTO accepted");
    if args.wait {
        let target = RaDec::new(args.ra.rem_euclid(360.0), args.dec);
        let reached = mount
            .wait_for_target(
                target,
                args.tolerance,
                Duration::from_secs(1),
                Duration::from_secs(args.timeout),
            )
            .await?;
        print!("Arrived: ");
        print_position(reached);
    }
    Ok(())
}

async fn jog(mount: &mut MountController, args: &JogArgs) -> Result<(), Box<dyn Error>> {
    let axis = Axis::from(args.axis);
    mount
        .set_motion_mode(axis, args.direction.into(), args.speed)
        .await?;
    match args.duration {
        Some(ms) => tokio::time::sleep(Duration::from_millis(ms)).await,
        None => {
            println!("Moving {axis}, Ctrl-C to stop");
            tokio::signal::ctrl_c().await?;
        }
    }
    mount.stop(axis).await?;
    Ok(())
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn Error>> {
    let cli = Cli::parse();

    let default_level = if cli.debug { "debug" } else { "info" };
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level)),
        )
        .init();

    let config = effective_config(&cli);

    match &cli.command {
        Commands::List => list_serial()?,
        Commands::SaveConfig => {
            config.save(&cli.config)?;
            println!("Saved {}", cli.config.display());
        }
        Commands::Info => {
            let mut mount = connect(config).await?;
            info(&mut mount).await?;
        }
        Commands::Position => {
            let mut mount = connect(config).await?;
            print_position(mount.get_ra_dec().await?);
        }
        Commands::Monitor { interval } => {
            let mount = connect(config).await?;
            monitor(mount, Duration::from_millis(*interval)).await?;
        }
        Commands::Goto(args) => {
            let mut mount = connect(config).await?;
            goto(&mut mount, args).await?;
        }
        Commands::GotoAltaz { az, alt } => {
            let mut mount = connect(config).await?;
            let target = mount.goto_altaz(*az, *alt).await?;
            print!("GOTO accepted: ");
            print_position(target);
        }
        Commands::Slew { ra, dec } => {
            let mut mount = connect(config).await?;
            mount.slew_to_coordinates(*ra, *dec).await?;
            println!("Slew started");
        }
        Commands::Jog(args) => {
            let mut mount = connect(config).await?;
            jog(&mut mount, args).await?;
        }
        Commands::Stop => {
            let mut mount = connect(config).await?;
            mount.stop_all().await?;
        }
        Commands::Track { mode } => {
            let mut mount = connect(config).await?;
            mount.set_tracking_mode((*mode).into()).await?;
        }
        Commands::SetLocation { lat, lon, elev } => {
            let mut mount = connect(config.clone()).await?;
            mount.set_location(*lat, *lon, *elev).await?;
            let config = MountConfig {
                latitude: Some(*lat),
                longitude: Some(*lon),
                elevation: *elev,
                ..config
            };
            config.save(&cli.config)?;
            println!("Location sent and saved to {}", cli.config.display());
        }
    }

    Ok(())
}
