//! A small test utility crate for injecting periodic traffic onto a serial
//! port.
//!
//! The [`TtyPort`] type opens a character device and puts the line into a
//! fixed frame format described by a [`PortConfig`], and an [`Injector`]
//! repeatedly writes a payload to it with a fixed delay between writes. The
//! accompanying `serial-injector` binary wires both together behind a small
//! CLI:
//!
//! ```text
//! serial-injector /dev/ttyUSB0 9600 "PING\n" 1000
//! ```

use std::error::Error as StdError;
use std::fmt;
use std::io;
use std::time::Duration;

use cfg_if::cfg_if;

cfg_if! {
    if #[cfg(unix)] {
        mod posix;
        pub use posix::TtyPort;
    } else {
        compile_error!("serial-injector is only supported on Unix platforms");
    }
}

mod injector;
pub use injector::Injector;

/// A type for results generated by this crate where the `Err` type is
/// hard-wired to [`Error`].
pub type Result<T> = std::result::Result<T, Error>;

/// Categories of errors that can occur while opening, configuring, or
/// writing to a port.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    /// The device is not available: the path does not name a usable device
    /// node, or it disappeared.
    NoDevice,

    /// A parameter was rejected before it reached the device, for example a
    /// baud rate with no matching line speed constant.
    InvalidInput,

    /// An I/O error from the operating system.
    Io(io::ErrorKind),

    /// An error of unknown origin.
    Unknown,
}

/// An error type with a category and a human-readable description naming the
/// failing operation.
#[derive(Debug, Clone)]
pub struct Error {
    /// The kind of error this is.
    pub kind: ErrorKind,
    /// A description of the error suitable for end-users.
    pub description: String,
}

impl Error {
    pub fn new<T: Into<String>>(kind: ErrorKind, description: T) -> Self {
        Error {
            kind,
            description: description.into(),
        }
    }

    pub fn kind(&self) -> ErrorKind {
        self.kind
    }
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.write_str(&self.description)
    }
}

impl StdError for Error {}

impl From<io::Error> for Error {
    fn from(e: io::Error) -> Self {
        Error::new(ErrorKind::Io(e.kind()), e.to_string())
    }
}

impl From<Error> for io::Error {
    fn from(e: Error) -> Self {
        let kind = match e.kind {
            ErrorKind::NoDevice => io::ErrorKind::NotFound,
            ErrorKind::InvalidInput => io::ErrorKind::InvalidInput,
            ErrorKind::Io(kind) => kind,
            ErrorKind::Unknown => io::ErrorKind::Other,
        };
        io::Error::new(kind, e.description)
    }
}

#[cfg(unix)]
impl From<nix::Error> for Error {
    fn from(e: nix::Error) -> Self {
        let kind = match e {
            nix::Error::ENOENT | nix::Error::ENOTDIR | nix::Error::ENODEV | nix::Error::ENXIO => {
                ErrorKind::NoDevice
            }
            nix::Error::EINVAL => ErrorKind::InvalidInput,
            errno => ErrorKind::Io(io::Error::from_raw_os_error(errno as i32).kind()),
        };
        Error::new(kind, e.desc())
    }
}

/// Number of bits per character.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum DataBits {
    Five,
    Six,
    Seven,
    Eight,
}

impl fmt::Display for DataBits {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            DataBits::Five => write!(f, "Five"),
            DataBits::Six => write!(f, "Six"),
            DataBits::Seven => write!(f, "Seven"),
            DataBits::Eight => write!(f, "Eight"),
        }
    }
}

/// Parity checking modes.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum Parity {
    None,
    Odd,
    Even,
}

impl fmt::Display for Parity {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            Parity::None => write!(f, "None"),
            Parity::Odd => write!(f, "Odd"),
            Parity::Even => write!(f, "Even"),
        }
    }
}

/// Number of stop bits appended to each character.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum StopBits {
    One,
    Two,
}

impl fmt::Display for StopBits {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            StopBits::One => write!(f, "One"),
            StopBits::Two => write!(f, "Two"),
        }
    }
}

/// Flow control modes.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum FlowControl {
    /// No flow control.
    None,
    /// Flow control using XON/XOFF bytes.
    Software,
    /// Flow control using RTS/CTS signals.
    Hardware,
}

impl fmt::Display for FlowControl {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            FlowControl::None => write!(f, "None"),
            FlowControl::Software => write!(f, "Software"),
            FlowControl::Hardware => write!(f, "Hardware"),
        }
    }
}

/// Line settings applied to a device when it is opened.
///
/// The `Default` value is the injector's fixed configuration: 8N1, no flow
/// control, raw mode, and a 0.5 second read timeout at 9600 baud.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct PortConfig {
    /// Line speed in baud for both directions. Must map to one of the
    /// platform's line speed constants.
    pub baud_rate: u32,
    pub data_bits: DataBits,
    pub parity: Parity,
    pub stop_bits: StopBits,
    pub flow_control: FlowControl,
    /// Read timeout programmed into the line driver, with decisecond
    /// granularity. The injector itself never reads; the timeout is applied
    /// anyway so the device ends up in a fully determined state.
    pub read_timeout: Duration,
}

impl PortConfig {
    /// The default configuration with `baud_rate` overridden.
    pub fn with_baud_rate(baud_rate: u32) -> Self {
        PortConfig {
            baud_rate,
            ..Default::default()
        }
    }
}

impl Default for PortConfig {
    fn default() -> Self {
        PortConfig {
            baud_rate: 9600,
            data_bits: DataBits::Eight,
            parity: Parity::None,
            stop_bits: StopBits::One,
            flow_control: FlowControl::None,
            read_timeout: Duration::from_millis(500),
        }
    }
}
