//! Modem control-line mask.
//!
//! Four input signals are watched: clear-to-send, data-set-ready, carrier
//! detect, and ring indicator. Their states are packed into the low four
//! bits of a [`LineMask`] and delivered to the consumer as one value.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::ops::BitOr;

/// 4-bit encoding of the modem control-line states.
#[derive(Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct LineMask(u8);

impl LineMask {
    /// No line asserted. Also the initial baseline the edge-triggered
    /// watcher compares its first observation against.
    pub const EMPTY: LineMask = LineMask(0);
    /// Clear to send.
    pub const CTS: LineMask = LineMask(0x1);
    /// Data set ready.
    pub const DSR: LineMask = LineMask(0x2);
    /// Data carrier detect.
    pub const DCD: LineMask = LineMask(0x4);
    /// Ring indicator.
    pub const RI: LineMask = LineMask(0x8);

    /// Build a mask from raw bits; anything above the low four bits is
    /// discarded.
    pub fn from_bits_truncate(bits: u8) -> Self {
        LineMask(bits & 0x0f)
    }

    /// The raw 4-bit value, in `[0, 15]`.
    pub fn bits(self) -> u8 {
        self.0
    }

    /// Whether every line in `other` is asserted in `self`.
    pub fn contains(self, other: LineMask) -> bool {
        self.0 & other.0 == other.0
    }

    /// Decode the word returned by the `TIOCMGET` ioctl.
    pub(crate) fn from_tiocm(status: libc::c_int) -> Self {
        let mut mask = LineMask::EMPTY;
        if status & libc::TIOCM_CTS != 0 {
            mask = mask | LineMask::CTS;
        }
        if status & libc::TIOCM_DSR != 0 {
            mask = mask | LineMask::DSR;
        }
        if status & libc::TIOCM_CD != 0 {
            mask = mask | LineMask::DCD;
        }
        if status & libc::TIOCM_RI != 0 {
            mask = mask | LineMask::RI;
        }
        mask
    }
}

impl BitOr for LineMask {
    type Output = LineMask;

    fn bitor(self, rhs: LineMask) -> LineMask {
        LineMask(self.0 | rhs.0)
    }
}

impl fmt::Display for LineMask {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.0 == 0 {
            return write!(f, "none");
        }
        let mut first = true;
        for (bit, name) in [
            (LineMask::CTS, "CTS"),
            (LineMask::DSR, "DSR"),
            (LineMask::DCD, "DCD"),
            (LineMask::RI, "RI"),
        ] {
            if self.contains(bit) {
                if !first {
                    write!(f, "|")?;
                }
                write!(f, "{name}")?;
                first = false;
            }
        }
        Ok(())
    }
}

impl fmt::Debug for LineMask {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "LineMask({:#x}: {})", self.0, self)
    }
}
