use std::sync::Arc;

use strum::IntoEnumIterator;
use thiserror::Error;
use tokio::io::{AsyncRead, AsyncWrite};
use tokio::time::{self, Duration, Instant};
use tokio_serial::SerialStream;
use tracing::{debug, error, info, warn};

use crate::clock::{Clock, SystemClock};
use crate::codec::{
    decode_degrees, decode_le_hex_param, decode_position, encode_le_hex, reconcile_steps_per_rev,
    CodecError, PositionReading, StepsReconciliation,
};
use crate::config::MountConfig;
use crate::constants::*;
use crate::diagnostics::Diagnostics;
use crate::state::MountState;
use crate::transform::{altaz_to_radec, angular_separation, encoders_to_radec, range360};
use crate::transport::{open_serial, ChannelError, CommandChannel, Response};
use crate::types::{
    clamp_dec, Axis, Direction, MountStatus, MountTime, Observer, RaDec, TrackingMode,
};

#[derive(Debug, Error)]
pub enum MountError {
    #[error("{step}: {source}")]
    Channel {
        step: String,
        #[source]
        source: ChannelError,
    },
    #[error("{step}: {source}")]
    Codec {
        step: String,
        #[source]
        source: CodecError,
    },
    #[error("invalid coordinates RA={ra}, DEC={dec}")]
    InvalidCoordinates { ra: f64, dec: f64 },
    #[error("invalid location lat={latitude}, lon={longitude}, elev={elevation}")]
    InvalidLocation {
        latitude: f64,
        longitude: f64,
        elevation: i32,
    },
    #[error("invalid time {0}")]
    InvalidTime(MountTime),
    #[error("cannot open {port}: {source}")]
    Serial {
        port: String,
        #[source]
        source: tokio_serial::Error,
    },
    #[error("mount not connected")]
    NotConnected,
    #[error("target not reached within {0:?}")]
    SlewTimeout(Duration),
}

/// Drives a SynScan-protocol equatorial mount over a serial link.
///
/// The controller owns the link, the mount state and the connection status.
/// Every operation takes `&mut self`, so commands on the link are strictly
/// one at a time. Share a controller between tasks behind a
/// `tokio::sync::Mutex`.
///
/// Failures are returned, logged and recorded in [`Diagnostics`]. Nothing is
/// retried.
pub struct MountController<L = SerialStream> {
    config: MountConfig,
    channel: CommandChannel<L>,
    state: MountState,
    status: MountStatus,
    clock: Arc<dyn Clock>,
    diagnostics: Diagnostics,
}

impl MountController<SerialStream> {
    /// Open the configured serial port and run the connect handshake.
    pub async fn connect(&mut self) -> Result<(), MountError> {
        if self.channel.is_open() {
            self.disconnect();
        }

        let port = self.config.port.clone();
        let baud_rate = self.config.baud_rate;
        self.status = MountStatus::Connecting;
        info!("Connecting to {port} at {baud_rate} baud");

        match open_serial(&port, baud_rate) {
            Ok(stream) => self.attach(port, stream).await,
            Err(source) => {
                self.status = MountStatus::Disconnected;
                let err = MountError::Serial { port, source };
                error!("{err}");
                self.diagnostics.record(err.to_string());
                Err(err)
            }
        }
    }
}

impl<L> MountController<L>
where
    L: AsyncRead + AsyncWrite + Unpin + Send,
{
    /// A disconnected controller. An out-of-range site in `config` is
    /// dropped in favour of the default site and recorded in diagnostics.
    pub fn new(config: MountConfig) -> Self {
        let mut controller = MountController {
            channel: CommandChannel::new(config.timeout()),
            config,
            state: MountState::new(),
            status: MountStatus::Disconnected,
            clock: Arc::new(SystemClock),
            diagnostics: Diagnostics::new(),
        };
        if let Some(observer) = controller.config.observer() {
            if controller.set_observer(observer).is_err() {
                warn!("Ignoring configured site, the default site is used");
            }
        }
        controller
    }

    pub fn with_clock(mut self, clock: impl Clock + 'static) -> Self {
        self.clock = Arc::new(clock);
        self
    }

    pub fn config(&self) -> &MountConfig {
        &self.config
    }

    pub fn state(&self) -> &MountState {
        &self.state
    }

    pub fn status(&self) -> MountStatus {
        self.status
    }

    pub fn is_connected(&self) -> bool {
        self.channel.is_open()
    }

    /// A handle to the last failure message.
    pub fn diagnostics(&self) -> Diagnostics {
        self.diagnostics.clone()
    }

    /// Configure the observing site without sending it to the mount.
    ///
    /// Set this before connecting so the location handshake uses it.
    pub fn set_observer(&mut self, observer: Observer) -> Result<(), MountError> {
        let observer = self.validate_location(
            observer.latitude,
            observer.longitude,
            observer.elevation,
        )?;
        self.state.set_observer(observer);
        debug!(
            latitude = observer.latitude,
            longitude = observer.longitude,
            hemisphere = ?self.state.hemisphere(),
            "observer set"
        );
        Ok(())
    }

    /// Take over an already open link and run the connect handshake.
    ///
    /// Time and location sync, axis initialization and the steps-per-revolution
    /// query are all best effort: a failure is logged and the handshake moves
    /// on, leaving a connected but possibly degraded mount. Only losing the
    /// link itself fails the connection.
    pub async fn attach(&mut self, name: impl Into<String>, link: L) -> Result<(), MountError> {
        self.channel.open(name, link);
        self.status = MountStatus::Connecting;
        info!("Connected to {}", self.channel.name());

        let settle = self.config.settle();
        if !settle.is_zero() {
            time::sleep(settle).await;
        }

        self.status = MountStatus::TimeSync;
        let now = MountTime::from_local(&self.clock.now_local());
        info!("Sending time {now}");
        if let Err(e) = self.set_time(now).await {
            warn!("Time sync failed, continuing: {e}");
        }

        self.status = MountStatus::LocationSync;
        let site = self.state.effective_observer();
        if self.state.observer().is_none() {
            debug!("No observer configured, sending the default site");
        }
        if let Err(e) = self.send_location(site).await {
            warn!("Location sync failed, continuing: {e}");
        }

        self.status = MountStatus::AxisInit;
        if let Err(e) = self.initialize_mount().await {
            warn!("Axis initialization failed, positions may be unreliable: {e}");
        }

        if let Err(e) = self.refresh_steps_per_rev().await {
            warn!(
                "Could not read steps per revolution, using {}: {e}",
                self.state.steps_per_rev()
            );
        }

        if !self.channel.is_open() {
            let err = MountError::NotConnected;
            error!("Link lost during connect handshake");
            self.diagnostics.record(err.to_string());
            return Err(err);
        }

        self.status = MountStatus::Ready;
        info!("Mount ready");
        Ok(())
    }

    pub fn disconnect(&mut self) {
        if self.channel.close().is_some() {
            info!("Disconnected");
        }
        self.status = MountStatus::Disconnected;
    }

    /// Send one raw command. The link is dropped if it fails.
    pub async fn send(&mut self, axis: Axis, opcode: char, data: &str) -> Response {
        let response = self.channel.send(axis, opcode, data).await;
        if let Err(e) = &response {
            if e.is_link_failure() {
                error!("Link failed, disconnecting: {e}");
                self.channel.close();
                self.status = MountStatus::Disconnected;
            }
        }
        response
    }

    /// Set the mount's local time (`:T1YYYYMMDDHHMMSS±HH`).
    pub async fn set_time(&mut self, time: MountTime) -> Result<(), MountError> {
        if !time.is_valid() {
            return Err(self.reject(MountError::InvalidTime(time)));
        }
        let data = format!(
            "{:04}{:02}{:02}{:02}{:02}{:02}{:+03}",
            time.year, time.month, time.day, time.hour, time.minute, time.second, time.tz_hours
        );
        self.command("set time", Axis::RightAscension, CMD_SET_TIME, &data)
            .await?;
        Ok(())
    }

    /// Configure the observing site and send it to the mount
    /// (`:Z1±DD.DDDD,±DDD.DDDD,±EEE`).
    pub async fn set_location(
        &mut self,
        latitude: f64,
        longitude: f64,
        elevation: i32,
    ) -> Result<(), MountError> {
        let observer = self.validate_location(latitude, longitude, elevation)?;
        self.state.set_observer(observer);
        self.send_location(observer).await
    }

    async fn send_location(&mut self, site: Observer) -> Result<(), MountError> {
        let data = format!(
            "{:+.4},{:+.4},{:+04}",
            site.latitude, site.longitude, site.elevation
        );
        info!(
            "Sending location lat={:.4}, lon={:.4}, elev={}m",
            site.latitude, site.longitude, site.elevation
        );
        self.command("set location", Axis::RightAscension, CMD_SET_LOCATION, &data)
            .await?;
        Ok(())
    }

    /// Initialize both axes and capture the encoder zero offsets.
    pub async fn initialize_mount(&mut self) -> Result<(), MountError> {
        info!("Initializing axes");
        self.command("initialize RA axis", Axis::RightAscension, CMD_INIT_AXIS, "")
            .await?;
        time::sleep(AXIS_INIT_PAUSE).await;
        self.command("initialize DEC axis", Axis::Declination, CMD_INIT_AXIS, "")
            .await?;

        self.capture_zero_offsets().await;
        info!("Axes initialized");
        Ok(())
    }

    async fn capture_zero_offsets(&mut self) {
        let ra = self.read_position(Axis::RightAscension).await;
        let dec = self.read_position(Axis::Declination).await;
        match (ra, dec) {
            (Ok(PositionReading::Steps(ra)), Ok(PositionReading::Steps(dec))) => {
                self.state.set_zero_offsets(ra as i64, dec as i64);
                debug!(zero_ra = ra, zero_dec = dec, "encoder zero offsets captured");
            }
            (Ok(_), Ok(_)) => {
                self.state.set_zero_offsets(0, 0);
                debug!("Mount reports degrees, zero offsets left at 0");
            }
            (Err(e), _) | (_, Err(e)) => warn!("Could not capture zero offsets: {e}"),
        }
    }

    /// Query steps per revolution and reconcile it with the known firmware quirk.
    async fn refresh_steps_per_rev(&mut self) -> Result<u32, MountError> {
        const STEP: &str = "read steps per revolution";
        let reply = self
            .command(STEP, Axis::RightAscension, CMD_GET_STEPS_PER_REV, "")
            .await?;
        let reported = decode_le_hex_param(reply.trim())
            .map_err(|source| self.codec_failure(STEP, source))?;

        let outcome = reconcile_steps_per_rev(reported, self.state.steps_per_rev());
        match outcome {
            StepsReconciliation::Confirmed(steps) => {
                info!("Mount reports {steps} steps per revolution")
            }
            StepsReconciliation::Overridden { reported, used } => warn!(
                "Mount reports the standard 0x{reported:X} steps per revolution, keeping {used}"
            ),
            StepsReconciliation::Unrecognised { reported, used } => {
                warn!("Mount reports unknown {reported} steps per revolution, keeping {used}")
            }
        }
        self.state.set_steps_per_rev(outcome.steps_per_rev());
        Ok(outcome.steps_per_rev())
    }

    pub async fn get_version(&mut self) -> Result<String, MountError> {
        self.command(
            "read firmware version",
            Axis::RightAscension,
            CMD_GET_VERSION,
            "",
        )
        .await
    }

    async fn read_position(&mut self, axis: Axis) -> Result<PositionReading, MountError> {
        let step = format!("read {axis} position");
        let reply = self.command(&step, axis, CMD_GET_POSITION, "").await?;
        decode_position(&reply).map_err(|source| self.codec_failure(&step, source))
    }

    /// Position of one axis in degrees, for firmware that reports degrees.
    /// RA is in [0, 360), DEC is clamped to ±90°.
    pub async fn get_axis_degrees(&mut self, axis: Axis) -> Result<f64, MountError> {
        let step = format!("read {axis} degrees");
        let reply = self.command(&step, axis, CMD_GET_POSITION, "").await?;
        match decode_degrees(&reply) {
            Some(degrees) => Ok(axis_degrees(axis, degrees)),
            None => Err(self.codec_failure(&step, CodecError::Unparseable(reply))),
        }
    }

    /// Encoder position of one axis. Degree replies are converted to an
    /// estimated step count.
    pub async fn get_axis_steps(&mut self, axis: Axis) -> Result<i64, MountError> {
        let reading = self.read_position(axis).await?;
        let steps = self.state.codec().reading_to_steps(reading, axis);
        debug!(%axis, ?reading, steps, "axis steps");
        Ok(steps)
    }

    /// Current RA/DEC in degrees.
    ///
    /// Degree replies from both axes are used as-is. Otherwise both encoders
    /// are read and converted through the local sidereal time.
    pub async fn get_ra_dec(&mut self) -> Result<RaDec, MountError> {
        let ra = self.try_axis_degrees(Axis::RightAscension).await;
        let dec = self.try_axis_degrees(Axis::Declination).await;

        let position = match (ra, dec) {
            (Ok(Some(ra)), Ok(Some(dec))) => {
                let position = RaDec::new(ra, dec);
                info!("Position (direct): {position}");
                position
            }
            _ => {
                let ra_steps = self.get_axis_steps(Axis::RightAscension).await?;
                let dec_steps = self.get_axis_steps(Axis::Declination).await?;
                let position =
                    encoders_to_radec(&self.state, ra_steps, dec_steps, self.clock.now_utc());
                info!("Position (encoders): {position}");
                position
            }
        };

        self.state.record_position(position);
        if self.status == MountStatus::Slewing {
            self.status = MountStatus::Ready;
        }
        Ok(position)
    }

    /// `Ok(None)` when the axis answered with something other than degrees.
    async fn try_axis_degrees(&mut self, axis: Axis) -> Result<Option<f64>, MountError> {
        let step = format!("read {axis} degrees");
        let reply = self.command(&step, axis, CMD_GET_POSITION, "").await?;
        Ok(decode_degrees(&reply).map(|degrees| axis_degrees(axis, degrees)))
    }

    /// GOTO with the composite `X` command (`:X1<ra hours>,<dec degrees>`).
    ///
    /// Success only means the mount accepted the command. Poll
    /// [`MountController::get_ra_dec`] or use
    /// [`MountController::wait_for_target`] to see the slew finish.
    pub async fn goto_ra_dec(&mut self, ra: f64, dec: f64) -> Result<(), MountError> {
        let target = self.validate_target(ra, dec)?;
        let ra_hours = target.ra / 15.0;
        info!(
            "GOTO RA={:.4}° ({ra_hours:.4}h), DEC={:.4}°",
            target.ra, target.dec
        );

        let data = format!("{ra_hours:.6},{:.6}", target.dec);
        self.command("goto", Axis::RightAscension, CMD_GOTO, &data)
            .await?;
        self.status = MountStatus::Slewing;
        Ok(())
    }

    /// GOTO a horizon position, converted for the configured (or default) site.
    pub async fn goto_altaz(&mut self, az: f64, alt: f64) -> Result<RaDec, MountError> {
        if !az.is_finite() || !(MIN_DEC..=MAX_DEC).contains(&alt) {
            return Err(self.reject(MountError::InvalidCoordinates { ra: az, dec: alt }));
        }
        let site = self.state.effective_observer();
        let target = altaz_to_radec(az, alt, site.latitude, site.longitude, self.clock.now_utc());
        info!("Alt/Az {az:.4}°/{alt:.4}° is {target}");
        self.goto_ra_dec(target.ra, target.dec).await?;
        Ok(target)
    }

    /// GOTO by encoder targets: set both targets, both speeds, then start both
    /// axes. The first failing command aborts the slew.
    pub async fn slew_to_coordinates(&mut self, ra: f64, dec: f64) -> Result<(), MountError> {
        let target = self.validate_target(ra, dec)?;
        let codec = *self.state.codec();
        let ra_steps = codec.hours_to_steps(target.ra / 15.0);
        let dec_steps = codec.degrees_to_steps(target.dec);
        let speed = encode_le_hex(codec.goto_speed());
        info!("Slew to {target}");
        debug!(ra_steps, dec_steps, speed = codec.goto_speed(), "slew targets");

        self.command(
            "set RA target",
            Axis::RightAscension,
            CMD_SET_GOTO_TARGET,
            &encode_le_hex(ra_steps),
        )
        .await?;
        self.command(
            "set DEC target",
            Axis::Declination,
            CMD_SET_GOTO_TARGET,
            &encode_le_hex(dec_steps),
        )
        .await?;
        self.command("set RA speed", Axis::RightAscension, CMD_SET_SPEED, &speed)
            .await?;
        self.command("set DEC speed", Axis::Declination, CMD_SET_SPEED, &speed)
            .await?;
        self.command("start RA", Axis::RightAscension, CMD_START_MOTION, "")
            .await?;
        self.command("start DEC", Axis::Declination, CMD_START_MOTION, "")
            .await?;

        self.status = MountStatus::Slewing;
        Ok(())
    }

    /// Poll the position until it is within `tolerance` degrees of `target`.
    pub async fn wait_for_target(
        &mut self,
        target: RaDec,
        tolerance: f64,
        poll_interval: Duration,
        timeout: Duration,
    ) -> Result<RaDec, MountError> {
        let deadline = Instant::now() + timeout;
        loop {
            let position = self.get_ra_dec().await?;
            let separation = angular_separation(position, target);
            debug!(separation, tolerance, "distance to target");
            if separation <= tolerance {
                return Ok(position);
            }
            if Instant::now() + poll_interval > deadline {
                return Err(self.reject(MountError::SlewTimeout(timeout)));
            }
            time::sleep(poll_interval).await;
        }
    }

    /// Manual motion: direction, speed, then start.
    pub async fn set_motion_mode(
        &mut self,
        axis: Axis,
        direction: Direction,
        speed: u32,
    ) -> Result<(), MountError> {
        self.command(
            &format!("set {axis} direction"),
            axis,
            CMD_SET_SPEED,
            &direction.as_char().to_string(),
        )
        .await?;
        self.command(
            &format!("set {axis} speed"),
            axis,
            CMD_SET_SPEED,
            &encode_le_hex(speed),
        )
        .await?;
        self.command(&format!("start {axis}"), axis, CMD_START_MOTION, "")
            .await?;

        info!("{axis} moving {direction:?} at speed {speed}");
        self.status = MountStatus::Jogging;
        Ok(())
    }

    pub async fn move_ra(&mut self, direction: Direction, speed: u32) -> Result<(), MountError> {
        self.set_motion_mode(Axis::RightAscension, direction, speed)
            .await
    }

    pub async fn move_dec(&mut self, direction: Direction, speed: u32) -> Result<(), MountError> {
        self.set_motion_mode(Axis::Declination, direction, speed)
            .await
    }

    pub async fn stop(&mut self, axis: Axis) -> Result<(), MountError> {
        self.command(&format!("stop {axis}"), axis, CMD_STOP, "")
            .await?;
        if matches!(self.status, MountStatus::Slewing | MountStatus::Jogging) {
            self.status = MountStatus::Ready;
        }
        Ok(())
    }

    /// Stop both axes. DEC is stopped even if stopping RA fails.
    pub async fn stop_all(&mut self) -> Result<(), MountError> {
        let mut result = Ok(());
        for axis in Axis::iter() {
            let stopped = self.stop(axis).await;
            result = result.and(stopped);
        }
        result
    }

    pub async fn set_tracking_mode(&mut self, mode: TrackingMode) -> Result<(), MountError> {
        self.command(
            "set tracking mode",
            Axis::RightAscension,
            CMD_SET_TRACKING,
            &mode.as_char().to_string(),
        )
        .await?;
        info!("Tracking {mode:?}");
        Ok(())
    }

    /// One round trip, named `step` in any error.
    async fn command(
        &mut self,
        step: &str,
        axis: Axis,
        opcode: char,
        data: &str,
    ) -> Result<String, MountError> {
        match self.send(axis, opcode, data).await {
            Ok(reply) => Ok(reply),
            Err(source) => Err(self.reject(MountError::Channel {
                step: step.to_string(),
                source,
            })),
        }
    }

    fn codec_failure(&self, step: &str, source: CodecError) -> MountError {
        self.reject(MountError::Codec {
            step: step.to_string(),
            source,
        })
    }

    fn reject(&self, err: MountError) -> MountError {
        warn!("{err}");
        self.diagnostics.record(err.to_string());
        err
    }

    fn validate_target(&self, ra: f64, dec: f64) -> Result<RaDec, MountError> {
        if !(-MAX_GOTO_RA..=MAX_GOTO_RA).contains(&ra) || !(MIN_DEC..=MAX_DEC).contains(&dec) {
            return Err(self.reject(MountError::InvalidCoordinates { ra, dec }));
        }
        Ok(RaDec::new(range360(ra), dec))
    }

    fn validate_location(
        &self,
        latitude: f64,
        longitude: f64,
        elevation: i32,
    ) -> Result<Observer, MountError> {
        let valid = (MIN_LATITUDE..=MAX_LATITUDE).contains(&latitude)
            && (MIN_LONGITUDE..=MAX_LONGITUDE).contains(&longitude)
            && (MIN_ELEVATION..=MAX_ELEVATION).contains(&elevation);
        if !valid {
            return Err(self.reject(MountError::InvalidLocation {
                latitude,
                longitude,
                elevation,
            }));
        }
        Ok(Observer {
            latitude,
            longitude,
            elevation,
        })
    }
}

fn axis_degrees(axis: Axis, degrees: f64) -> f64 {
    match axis {
        Axis::RightAscension => range360(degrees),
        Axis::Declination => clamp_dec(degrees),
    }
}
