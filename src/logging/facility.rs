//! Syslog facilities and the external mirror seam.

use std::os::unix::net::UnixDatagram;
use std::sync::atomic::{AtomicU8, Ordering};

/// The fixed facility allow-list, stored as shifted syslog wire codes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Facility {
    Kern,
    User,
    Mail,
    Daemon,
    Auth,
    Syslog,
    Lpr,
    News,
    Uucp,
    Local0,
    Local1,
    Local2,
    Local3,
    Local4,
    Local5,
    Local6,
    Local7,
}

impl Facility {
    /// Fallback when a configured facility is not on the allow-list.
    pub const DEFAULT: Facility = Facility::Local3;

    /// Shifted facility code, as summed into syslog PRI values.
    pub fn code(self) -> u8 {
        match self {
            Facility::Kern => 0,
            Facility::User => 8,
            Facility::Mail => 16,
            Facility::Daemon => 24,
            Facility::Auth => 32,
            Facility::Syslog => 40,
            Facility::Lpr => 48,
            Facility::News => 56,
            Facility::Uucp => 64,
            Facility::Local0 => 128,
            Facility::Local1 => 136,
            Facility::Local2 => 144,
            Facility::Local3 => 152,
            Facility::Local4 => 160,
            Facility::Local5 => 168,
            Facility::Local6 => 176,
            Facility::Local7 => 184,
        }
    }

    /// Parse a facility keyword, case-insensitively.
    pub fn from_keyword(keyword: &str) -> Option<Facility> {
        let keyword = keyword.to_ascii_lowercase();
        let facility = match keyword.as_str() {
            "kern" => Facility::Kern,
            "user" => Facility::User,
            "mail" => Facility::Mail,
            "daemon" => Facility::Daemon,
            "auth" => Facility::Auth,
            "syslog" => Facility::Syslog,
            "lpr" => Facility::Lpr,
            "news" => Facility::News,
            "uucp" => Facility::Uucp,
            "local0" => Facility::Local0,
            "local1" => Facility::Local1,
            "local2" => Facility::Local2,
            "local3" => Facility::Local3,
            "local4" => Facility::Local4,
            "local5" => Facility::Local5,
            "local6" => Facility::Local6,
            "local7" => Facility::Local7,
            _ => return None,
        };
        Some(facility)
    }

    pub fn keyword(self) -> &'static str {
        match self {
            Facility::Kern => "kern",
            Facility::User => "user",
            Facility::Mail => "mail",
            Facility::Daemon => "daemon",
            Facility::Auth => "auth",
            Facility::Syslog => "syslog",
            Facility::Lpr => "lpr",
            Facility::News => "news",
            Facility::Uucp => "uucp",
            Facility::Local0 => "local0",
            Facility::Local1 => "local1",
            Facility::Local2 => "local2",
            Facility::Local3 => "local3",
            Facility::Local4 => "local4",
            Facility::Local5 => "local5",
            Facility::Local6 => "local6",
            Facility::Local7 => "local7",
        }
    }
}

/// External sink that accepted log lines are mirrored to.
pub trait FacilitySink: Send + Sync {
    /// Highest severity rank the sink supports; forwarded ranks are clamped
    /// to it.
    fn max_rank(&self) -> u8 {
        7
    }

    /// Take one formatted line at a severity rank.
    fn emit(&self, rank: u8, line: &str);

    /// Adopt a new facility on logger reconfiguration.
    fn configure(&self, _facility: Facility) {}
}

impl<T: FacilitySink + ?Sized> FacilitySink for std::sync::Arc<T> {
    fn max_rank(&self) -> u8 {
        (**self).max_rank()
    }

    fn emit(&self, rank: u8, line: &str) {
        (**self).emit(rank, line)
    }

    fn configure(&self, facility: Facility) {
        (**self).configure(facility)
    }
}

/// Datagram sink speaking just enough of the syslog wire format for the
/// local log socket.
pub struct SyslogSink {
    socket: UnixDatagram,
    facility: AtomicU8,
}

impl SyslogSink {
    /// Connect to `/dev/log`. `None` when the socket is unavailable, so
    /// hosts without a system log daemon run with the console sink alone.
    pub fn connect() -> Option<SyslogSink> {
        let socket = UnixDatagram::unbound().ok()?;
        socket.connect("/dev/log").ok()?;
        Some(SyslogSink {
            socket,
            facility: AtomicU8::new(Facility::DEFAULT.code()),
        })
    }
}

impl FacilitySink for SyslogSink {
    fn emit(&self, rank: u8, line: &str) {
        let pri = self.facility.load(Ordering::Relaxed) + rank;
        let datagram = format!("<{pri}>{line}");
        // A stalled log socket is not worth failing a request over.
        let _ = self.socket.send(datagram.as_bytes());
    }

    fn configure(&self, facility: Facility) {
        self.facility.store(facility.code(), Ordering::Relaxed);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_keyword_round_trip() {
        for keyword in [
            "kern", "user", "mail", "daemon", "auth", "syslog", "lpr", "news", "uucp", "local0",
            "local1", "local2", "local3", "local4", "local5", "local6", "local7",
        ] {
            let facility = Facility::from_keyword(keyword).expect(keyword);
            assert_eq!(facility.keyword(), keyword);
        }
        assert_eq!(Facility::from_keyword("LOCAL4"), Some(Facility::Local4));
        assert_eq!(Facility::from_keyword("mausoleum"), None);
    }

    #[test]
    fn test_codes_are_shifted() {
        assert_eq!(Facility::Kern.code(), 0);
        assert_eq!(Facility::User.code(), 8);
        assert_eq!(Facility::Local3.code(), 152);
        assert_eq!(Facility::Local7.code(), 184);
        assert_eq!(Facility::DEFAULT, Facility::Local3);
    }
}
