mod tty;

pub use tty::TtyPort;
