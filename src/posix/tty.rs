use std::io;
use std::os::unix::io::{AsRawFd, RawFd};
use std::path::Path;
use std::time::Duration;

use nix::fcntl::{self, OFlag};
use nix::sys::stat::Mode;
use nix::sys::termios::{
    self, BaudRate, ControlFlags, InputFlags, LocalFlags, OutputFlags, SetArg,
    SpecialCharacterIndices, Termios,
};
use nix::unistd;
use scopeguard::{guard, ScopeGuard};

use crate::{DataBits, Error, ErrorKind, FlowControl, Parity, PortConfig, Result, StopBits};

/// A serial device node, opened read-write and configured for injection.
///
/// The descriptor is opened with `O_NOCTTY` (the device never becomes the
/// controlling terminal) and `O_SYNC` (writes reach the driver before
/// returning), and is closed on drop.
#[derive(Debug)]
pub struct TtyPort {
    fd: RawFd,
}

impl TtyPort {
    /// Opens the device at `path` and applies `config` immediately, without
    /// waiting for pending output to drain.
    ///
    /// Reconfiguring the line discards whatever settings the device held
    /// before; they are not restored on drop.
    pub fn open(path: &Path, config: &PortConfig) -> Result<Self> {
        let fd = fcntl::open(
            path,
            OFlag::O_RDWR | OFlag::O_NOCTTY | OFlag::O_SYNC,
            Mode::empty(),
        )
        .map_err(|e| annotated(format!("unable to open {}", path.display()), e))?;

        // Close the descriptor again if any configuration step fails.
        let fd = guard(fd, |fd| {
            let _ = unistd::close(fd);
        });

        let mut termios = termios::tcgetattr(*fd)
            .map_err(|e| annotated("unable to read line attributes".to_string(), e))?;
        apply_config(&mut termios, config)?;
        termios::tcsetattr(*fd, SetArg::TCSANOW, &termios)
            .map_err(|e| annotated("unable to apply line attributes".to_string(), e))?;

        Ok(TtyPort {
            fd: ScopeGuard::into_inner(fd),
        })
    }
}

impl io::Write for TtyPort {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        unistd::write(self.fd, buf).map_err(|e| io::Error::from_raw_os_error(e as i32))
    }

    fn flush(&mut self) -> io::Result<()> {
        termios::tcdrain(self.fd).map_err(|e| io::Error::from_raw_os_error(e as i32))
    }
}

impl AsRawFd for TtyPort {
    fn as_raw_fd(&self) -> RawFd {
        self.fd
    }
}

impl Drop for TtyPort {
    fn drop(&mut self) {
        let _ = unistd::close(self.fd);
    }
}

fn annotated(operation: String, e: nix::Error) -> Error {
    Error::new(Error::from(e).kind, format!("{}: {}", operation, e.desc()))
}

/// Writes `config` into a fetched `Termios`, putting the line into raw mode.
fn apply_config(termios: &mut Termios, config: &PortConfig) -> Result<()> {
    let speed = baud_to_speed(config.baud_rate)?;
    termios::cfsetospeed(termios, speed).map_err(Error::from)?;
    termios::cfsetispeed(termios, speed).map_err(Error::from)?;

    // Ignore modem control lines, enable the receiver.
    termios.control_flags |= ControlFlags::CLOCAL | ControlFlags::CREAD;

    termios.control_flags &= !ControlFlags::CSIZE;
    termios.control_flags |= match config.data_bits {
        DataBits::Five => ControlFlags::CS5,
        DataBits::Six => ControlFlags::CS6,
        DataBits::Seven => ControlFlags::CS7,
        DataBits::Eight => ControlFlags::CS8,
    };

    match config.parity {
        Parity::None => {
            termios.control_flags &= !(ControlFlags::PARENB | ControlFlags::PARODD);
        }
        Parity::Odd => {
            termios.control_flags |= ControlFlags::PARENB | ControlFlags::PARODD;
        }
        Parity::Even => {
            termios.control_flags |= ControlFlags::PARENB;
            termios.control_flags &= !ControlFlags::PARODD;
        }
    }

    match config.stop_bits {
        StopBits::One => termios.control_flags &= !ControlFlags::CSTOPB,
        StopBits::Two => termios.control_flags |= ControlFlags::CSTOPB,
    }

    match config.flow_control {
        FlowControl::None => {
            termios.control_flags &= !ControlFlags::CRTSCTS;
            termios.input_flags &= !(InputFlags::IXON | InputFlags::IXOFF | InputFlags::IXANY);
        }
        FlowControl::Software => {
            termios.control_flags &= !ControlFlags::CRTSCTS;
            termios.input_flags |= InputFlags::IXON | InputFlags::IXOFF;
        }
        FlowControl::Hardware => {
            termios.control_flags |= ControlFlags::CRTSCTS;
            termios.input_flags &= !(InputFlags::IXON | InputFlags::IXOFF | InputFlags::IXANY);
        }
    }

    // Raw mode: no canonical processing, no echo, no signal characters, no
    // output remapping or delays, no break processing.
    termios.local_flags &= !(LocalFlags::ICANON
        | LocalFlags::ECHO
        | LocalFlags::ECHOE
        | LocalFlags::ECHONL
        | LocalFlags::ISIG
        | LocalFlags::IEXTEN);
    termios.output_flags &= !OutputFlags::OPOST;
    termios.input_flags &= !InputFlags::IGNBRK;

    // Non-blocking reads with a fixed timeout.
    termios.control_chars[SpecialCharacterIndices::VMIN as usize] = 0;
    termios.control_chars[SpecialCharacterIndices::VTIME as usize] =
        vtime_deciseconds(config.read_timeout);

    Ok(())
}

/// Maps a numeric baud rate onto the matching line speed constant.
fn baud_to_speed(baud: u32) -> Result<BaudRate> {
    let speed = match baud {
        50 => BaudRate::B50,
        75 => BaudRate::B75,
        110 => BaudRate::B110,
        134 => BaudRate::B134,
        150 => BaudRate::B150,
        200 => BaudRate::B200,
        300 => BaudRate::B300,
        600 => BaudRate::B600,
        1200 => BaudRate::B1200,
        1800 => BaudRate::B1800,
        2400 => BaudRate::B2400,
        4800 => BaudRate::B4800,
        #[cfg(any(target_os = "ios", target_os = "macos"))]
        7200 => BaudRate::B7200,
        9600 => BaudRate::B9600,
        #[cfg(any(target_os = "ios", target_os = "macos"))]
        14400 => BaudRate::B14400,
        19200 => BaudRate::B19200,
        #[cfg(any(target_os = "ios", target_os = "macos"))]
        28800 => BaudRate::B28800,
        38400 => BaudRate::B38400,
        57600 => BaudRate::B57600,
        #[cfg(any(target_os = "ios", target_os = "macos"))]
        76800 => BaudRate::B76800,
        115_200 => BaudRate::B115200,
        230_400 => BaudRate::B230400,
        #[cfg(any(target_os = "android", target_os = "linux"))]
        460_800 => BaudRate::B460800,
        #[cfg(any(target_os = "android", target_os = "linux"))]
        500_000 => BaudRate::B500000,
        #[cfg(any(target_os = "android", target_os = "linux"))]
        576_000 => BaudRate::B576000,
        #[cfg(any(target_os = "android", target_os = "linux"))]
        921_600 => BaudRate::B921600,
        #[cfg(any(target_os = "android", target_os = "linux"))]
        1_000_000 => BaudRate::B1000000,
        #[cfg(any(target_os = "android", target_os = "linux"))]
        1_152_000 => BaudRate::B1152000,
        #[cfg(any(target_os = "android", target_os = "linux"))]
        1_500_000 => BaudRate::B1500000,
        #[cfg(any(target_os = "android", target_os = "linux"))]
        2_000_000 => BaudRate::B2000000,
        #[cfg(any(target_os = "android", target_os = "linux"))]
        2_500_000 => BaudRate::B2500000,
        #[cfg(any(target_os = "android", target_os = "linux"))]
        3_000_000 => BaudRate::B3000000,
        #[cfg(any(target_os = "android", target_os = "linux"))]
        3_500_000 => BaudRate::B3500000,
        #[cfg(any(target_os = "android", target_os = "linux"))]
        4_000_000 => BaudRate::B4000000,
        _ => {
            return Err(Error::new(
                ErrorKind::InvalidInput,
                format!("unsupported baud rate: {}", baud),
            ))
        }
    };

    Ok(speed)
}

/// VTIME is counted in tenths of a second and stored in a single byte;
/// sub-decisecond remainders are truncated.
fn vtime_deciseconds(timeout: Duration) -> u8 {
    (timeout.as_millis() / 100).min(u8::MAX as u128) as u8
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    fn scribbled_termios() -> Termios {
        // Start from a fully populated set of flags so the test observes
        // clearing as well as setting.
        let mut termios = Termios::from(unsafe { std::mem::zeroed::<nix::libc::termios>() });
        termios.control_flags =
            ControlFlags::CSIZE | ControlFlags::PARENB | ControlFlags::CSTOPB | ControlFlags::CRTSCTS;
        termios.input_flags =
            InputFlags::IGNBRK | InputFlags::IXON | InputFlags::IXOFF | InputFlags::IXANY;
        termios.local_flags = LocalFlags::ICANON | LocalFlags::ECHO | LocalFlags::ISIG;
        termios.output_flags = OutputFlags::OPOST;
        termios
    }

    #[test]
    fn default_config_sets_8n1_raw() {
        let mut termios = scribbled_termios();
        apply_config(&mut termios, &PortConfig::default()).unwrap();

        assert!(termios.control_flags.contains(ControlFlags::CS8));
        assert!(termios
            .control_flags
            .contains(ControlFlags::CLOCAL | ControlFlags::CREAD));
        assert!(!termios.control_flags.contains(ControlFlags::PARENB));
        assert!(!termios.control_flags.contains(ControlFlags::CSTOPB));
        assert!(!termios.control_flags.contains(ControlFlags::CRTSCTS));

        assert!(!termios.input_flags.contains(InputFlags::IXON));
        assert!(!termios.input_flags.contains(InputFlags::IXOFF));
        assert!(!termios.input_flags.contains(InputFlags::IXANY));
        assert!(!termios.input_flags.contains(InputFlags::IGNBRK));

        assert!(!termios.local_flags.contains(LocalFlags::ICANON));
        assert!(!termios.local_flags.contains(LocalFlags::ECHO));
        assert!(!termios.local_flags.contains(LocalFlags::ISIG));
        assert!(!termios.output_flags.contains(OutputFlags::OPOST));

        assert_eq!(
            termios.control_chars[SpecialCharacterIndices::VMIN as usize],
            0
        );
        assert_eq!(
            termios.control_chars[SpecialCharacterIndices::VTIME as usize],
            5
        );

        assert_eq!(termios::cfgetospeed(&termios), BaudRate::B9600);
        assert_eq!(termios::cfgetispeed(&termios), BaudRate::B9600);
    }

    #[rstest]
    #[case(Parity::None, false, false)]
    #[case(Parity::Odd, true, true)]
    #[case(Parity::Even, true, false)]
    fn parity_flags(#[case] parity: Parity, #[case] parenb: bool, #[case] parodd: bool) {
        let mut termios = scribbled_termios();
        let config = PortConfig {
            parity,
            ..Default::default()
        };
        apply_config(&mut termios, &config).unwrap();

        assert_eq!(termios.control_flags.contains(ControlFlags::PARENB), parenb);
        assert_eq!(termios.control_flags.contains(ControlFlags::PARODD), parodd);
    }

    #[rstest]
    #[case(DataBits::Five, ControlFlags::CS5)]
    #[case(DataBits::Six, ControlFlags::CS6)]
    #[case(DataBits::Seven, ControlFlags::CS7)]
    #[case(DataBits::Eight, ControlFlags::CS8)]
    fn data_bit_flags(#[case] data_bits: DataBits, #[case] expected: ControlFlags) {
        let mut termios = scribbled_termios();
        let config = PortConfig {
            data_bits,
            ..Default::default()
        };
        apply_config(&mut termios, &config).unwrap();

        assert_eq!(termios.control_flags & ControlFlags::CSIZE, expected);
    }

    #[test]
    fn software_flow_control_flags() {
        let mut termios = scribbled_termios();
        let config = PortConfig {
            flow_control: FlowControl::Software,
            ..Default::default()
        };
        apply_config(&mut termios, &config).unwrap();

        assert!(termios
            .input_flags
            .contains(InputFlags::IXON | InputFlags::IXOFF));
        assert!(!termios.control_flags.contains(ControlFlags::CRTSCTS));
    }

    #[test]
    fn hardware_flow_control_flags() {
        let mut termios = scribbled_termios();
        let config = PortConfig {
            flow_control: FlowControl::Hardware,
            ..Default::default()
        };
        apply_config(&mut termios, &config).unwrap();

        assert!(termios.control_flags.contains(ControlFlags::CRTSCTS));
        assert!(!termios.input_flags.contains(InputFlags::IXON));
    }

    #[rstest]
    #[case(9600, BaudRate::B9600)]
    #[case(19200, BaudRate::B19200)]
    #[case(115_200, BaudRate::B115200)]
    #[case(230_400, BaudRate::B230400)]
    fn standard_baud_rates_map(#[case] baud: u32, #[case] expected: BaudRate) {
        assert_eq!(baud_to_speed(baud).unwrap(), expected);
    }

    #[rstest]
    #[case(0)]
    #[case(9601)]
    #[case(123_456)]
    fn unsupported_baud_rates_are_rejected(#[case] baud: u32) {
        let error = baud_to_speed(baud).unwrap_err();
        assert_eq!(error.kind(), ErrorKind::InvalidInput);
        assert!(error.description.contains(&baud.to_string()));
    }

    #[rstest]
    #[case(Duration::ZERO, 0)]
    #[case(Duration::from_millis(99), 0)]
    #[case(Duration::from_millis(100), 1)]
    #[case(Duration::from_millis(500), 5)]
    #[case(Duration::from_secs(1), 10)]
    #[case(Duration::from_secs(3600), u8::MAX)]
    fn read_timeout_converts_to_deciseconds(#[case] timeout: Duration, #[case] expected: u8) {
        assert_eq!(vtime_deciseconds(timeout), expected);
    }
}
