use std::time::Duration;

// Frame bytes
pub const START_CHAR_OUT: char = ':';
pub const START_CHAR_IN: u8 = b'=';
pub const ERROR_CHAR: u8 = b'!';
pub const END_CHAR: u8 = b'\r';

// Command opcodes
pub const CMD_INIT_AXIS: char = 'F';
pub const CMD_GET_POSITION: char = 'j';
pub const CMD_GET_VERSION: char = 'e';
pub const CMD_GET_STEPS_PER_REV: char = 'a';
pub const CMD_SET_GOTO_TARGET: char = 'S';
pub const CMD_SET_SPEED: char = 'I';
pub const CMD_START_MOTION: char = 'J';
pub const CMD_STOP: char = 'K';
pub const CMD_SET_TRACKING: char = 'T';
pub const CMD_SET_TIME: char = 'T';
pub const CMD_SET_LOCATION: char = 'Z';
pub const CMD_GOTO: char = 'X';

// Steps per revolution used by MiniEQ firmware (200 steps * 256 microsteps * 100:1 gearing)
pub const DEFAULT_STEPS_PER_REV: u32 = 5_120_000;
// Standard Sky-Watcher constant, misreported by MiniEQ firmware
pub const STANDARD_STEPS_PER_REV: u32 = 0x1000000;

// Observer used when none is configured
pub const DEFAULT_LATITUDE: f64 = 39.9164;
pub const DEFAULT_LONGITUDE: f64 = 116.3830;
pub const DEFAULT_ELEVATION: i32 = 0;

// Link defaults
pub const DEFAULT_PORT: &str = "/dev/ttyUSB0";
pub const DEFAULT_BAUD_RATE: u32 = 9600;
pub const DEFAULT_TIMEOUT: Duration = Duration::from_millis(1000);
pub const DEFAULT_SETTLE: Duration = Duration::from_millis(500);
pub const DRAIN_POLL: Duration = Duration::from_millis(2);
pub const AXIS_INIT_PAUSE: Duration = Duration::from_millis(200);

// Jog speed sent when the caller doesn't pick one (wire "000100")
pub const DEFAULT_JOG_SPEED: u32 = 0x000100;

// Coordinate limits
pub const MAX_GOTO_RA: f64 = 3600.0;
pub const MIN_DEC: f64 = -90.0;
pub const MAX_DEC: f64 = 90.0;
pub const MIN_LATITUDE: f64 = -90.0;
pub const MAX_LATITUDE: f64 = 90.0;
pub const MIN_LONGITUDE: f64 = -180.0;
pub const MAX_LONGITUDE: f64 = 180.0;
pub const MIN_ELEVATION: i32 = -1000;
pub const MAX_ELEVATION: i32 = 10000;
pub const MIN_TZ_OFFSET: i32 = -12;
pub const MAX_TZ_OFFSET: i32 = 14;
