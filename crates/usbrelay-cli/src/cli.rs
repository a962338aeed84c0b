use clap::{Args, Parser, Subcommand, ValueEnum};
use std::time::Duration;
use usbrelay_core::prelude::*;
use usbrelay_core::protocol::{parse_hex_bytes, DEFAULT_BAUD_RATE, MAX_RELAYS};

/// USB relay board controller
#[derive(Parser, Debug)]
#[command(name = "relay", version, about = "Control USB serial relay boards (A0 <ch> <val> <sum>)")]
pub struct CommandLine {
    /// Serial port (e.g. COM8, /dev/ttyUSB0). Defaults to the first detected port.
    #[arg(short, long, global = true, env = "RELAY_PORT")]
    pub port: Option<String>,

    /// Baud rate
    #[arg(long, global = true, env = "RELAY_BAUD", default_value_t = DEFAULT_BAUD_RATE)]
    pub baud: u32,

    /// Serial read/write timeout in seconds
    #[arg(long, global = true, env = "RELAY_TIMEOUT", default_value_t = 1.0)]
    pub timeout: f64,

    /// Number of relays on the board
    #[arg(long, global = true, env = "RELAY_CHANNELS", default_value_t = MAX_RELAYS)]
    pub channels: u8,

    /// How `all` commands are transmitted
    #[arg(long, global = true, value_enum, default_value_t = AllModeArg::Broadcast)]
    pub all_mode: AllModeArg,

    /// Do not probe channels one by one when a status query does not decode
    #[arg(long, global = true)]
    pub no_query_fallback: bool,

    /// Log TX/RX bytes to stderr
    #[arg(long, global = true)]
    pub debug: bool,

    /// Verbose logging (implies --debug)
    #[arg(short, long, global = true)]
    pub verbose: bool,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// List detected serial ports
    ListPorts(ListArgs),

    /// Control all relays at once
    All {
        /// Desired state
        state: StateArg,
        #[command(flatten)]
        duration: DurationArgs,
    },

    /// Control a single relay
    Relay {
        /// Relay number (1..8)
        number: u32,
        /// Desired state
        state: StateArg,
        #[command(flatten)]
        duration: DurationArgs,
    },

    /// Query relay status (device-dependent)
    Status {
        /// Relay number (1..8) or "all"
        target: String,
        /// Also print the raw response as hex
        #[arg(long)]
        raw: bool,
    },

    /// Send raw hex bytes and read the response
    Raw {
        /// Hex bytes to send (e.g. A0 01 01 A2)
        #[arg(required = true, num_args = 1..)]
        bytes: Vec<String>,
        /// Print the response as hex instead of text
        #[arg(long)]
        raw: bool,
    },
}

#[derive(Args, Debug, Clone, PartialEq, Eq)]
pub struct ListArgs {
    /// Show a detailed table
    #[arg(long, conflicts_with_all = ["csv", "json"])]
    pub detailed: bool,
    /// Output ports as CSV
    #[arg(long, conflicts_with = "json")]
    pub csv: bool,
    /// Output ports as JSON
    #[arg(long)]
    pub json: bool,
    /// Only show ports with a known relay-board USB bridge
    #[arg(long)]
    pub relay_only: bool,
}

#[derive(Args, Debug)]
pub struct DurationArgs {
    /// Pulse duration in seconds
    #[arg(value_name = "DURATION")]
    pub duration: Option<f64>,
    /// Pulse duration in seconds
    #[arg(long, conflicts_with = "duration")]
    pub seconds: Option<f64>,
}

impl DurationArgs {
    fn resolve(&self, default: f64) -> f64 {
        self.duration.or(self.seconds).unwrap_or(default)
    }
}

#[derive(ValueEnum, Clone, Copy, Debug, PartialEq, Eq)]
pub enum StateArg {
    On,
    Off,
    Pulse,
}

#[derive(ValueEnum, Clone, Copy, Debug, PartialEq, Eq)]
pub enum AllModeArg {
    Broadcast,
    Loop,
    Both,
}

impl From<AllModeArg> for AllMode {
    fn from(arg: AllModeArg) -> Self {
        match arg {
            AllModeArg::Broadcast => AllMode::Broadcast,
            AllModeArg::Loop => AllMode::Loop,
            AllModeArg::Both => AllMode::Both,
        }
    }
}

/// A validated request, ready to run against a port
#[derive(Debug, Clone, PartialEq)]
pub enum Request {
    ListPorts(ListArgs),
    Set { target: RelayTarget, state: RelayState },
    Status { target: RelayTarget, raw: bool },
    Raw { bytes: Vec<u8>, raw: bool },
}

const RELAY_PULSE_SECONDS: f64 = 1.0;
const ALL_PULSE_SECONDS: f64 = 3.0;

impl CommandLine {
    pub fn parse_args() -> Self {
        Self::parse()
    }

    /// Validate arguments into a request. Nothing here touches a port.
    pub fn request(&self) -> Result<Request, RelayError> {
        self.timeout()?;
        match &self.command {
            Commands::ListPorts(args) => Ok(Request::ListPorts(args.clone())),
            Commands::All { state, duration } => Ok(Request::Set {
                target: RelayTarget::All,
                state: relay_state(*state, duration.resolve(ALL_PULSE_SECONDS))?,
            }),
            Commands::Relay {
                number,
                state,
                duration,
            } => Ok(Request::Set {
                target: RelayTarget::single(*number)?,
                state: relay_state(*state, duration.resolve(RELAY_PULSE_SECONDS))?,
            }),
            Commands::Status { target, raw } => Ok(Request::Status {
                target: parse_target(target)?,
                raw: *raw,
            }),
            Commands::Raw { bytes, raw } => Ok(Request::Raw {
                bytes: parse_hex_bytes(bytes.as_slice())?,
                raw: *raw,
            }),
        }
    }

    pub fn session_config(&self, port_name: &str) -> Result<SessionConfig, RelayError> {
        Ok(SessionConfig {
            port_name: port_name.to_string(),
            baud_rate: self.baud,
            timeout: self.timeout()?,
        })
    }

    pub fn controller_config(&self) -> Result<ControllerConfig, RelayError> {
        Ok(ControllerConfig {
            channels: self.channels,
            all_mode: self.all_mode.into(),
            response_timeout: self.timeout()?,
            query_fallback: !self.no_query_fallback,
            ..ControllerConfig::default()
        })
    }

    fn timeout(&self) -> Result<Duration, RelayError> {
        if !self.timeout.is_finite() || self.timeout <= 0.0 {
            return Err(RelayError::InvalidTimeout(self.timeout));
        }
        Duration::try_from_secs_f64(self.timeout).map_err(|_| RelayError::InvalidTimeout(self.timeout))
    }
}

fn relay_state(state: StateArg, seconds: f64) -> Result<RelayState, RelayError> {
    match state {
        StateArg::On => Ok(RelayState::On),
        StateArg::Off => Ok(RelayState::Off),
        StateArg::Pulse => pulse_duration(seconds).map(|_| RelayState::Pulse(seconds)),
    }
}

fn parse_target(s: &str) -> Result<RelayTarget, RelayError> {
    if s.eq_ignore_ascii_case("all") {
        return Ok(RelayTarget::All);
    }
    let n = s
        .parse::<u32>()
        .map_err(|_| RelayError::InvalidTarget(s.to_string()))?;
    RelayTarget::single(n)
}
