//! SMC eyecatcher markers.
//!
//! A CLC message opens and closes with one of two 4-byte magic values, one
//! per SMC flavor. This module is the only place that knows the constants;
//! everything else asks it.

use std::fmt;

/// Length of an SMC eyecatcher in bytes.
pub const EYECATCHER_LEN: usize = 4;

/// Marker bracketing SMC-R CLC messages (and carried in the SMC TCP option).
pub const SMCR_EYECATCHER: [u8; EYECATCHER_LEN] = [0xE2, 0xD4, 0xC3, 0xD9];

/// Marker bracketing SMC-D CLC messages.
pub const SMCD_EYECATCHER: [u8; EYECATCHER_LEN] = [0xE2, 0xD4, 0xC3, 0xC4];

/// The SMC flavor an eyecatcher identifies.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SmcVariant {
    SmcR,
    SmcD,
    Unknown,
}

/// Returns true if `buf` starts with one of the two valid eyecatchers.
pub fn is_eyecatcher(buf: &[u8]) -> bool {
    buf.len() >= EYECATCHER_LEN
        && (buf[..EYECATCHER_LEN] == SMCR_EYECATCHER || buf[..EYECATCHER_LEN] == SMCD_EYECATCHER)
}

/// A 4-byte eyecatcher as found on the wire, valid or not.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Eyecatcher(pub [u8; EYECATCHER_LEN]);

impl Eyecatcher {
    /// Classifies the eyecatcher by SMC flavor.
    pub fn kind(&self) -> SmcVariant {
        if self.0 == SMCR_EYECATCHER {
            SmcVariant::SmcR
        } else if self.0 == SMCD_EYECATCHER {
            SmcVariant::SmcD
        } else {
            SmcVariant::Unknown
        }
    }

    /// Copies the first four bytes of `buf` into an `Eyecatcher`.
    ///
    /// The caller must have checked `buf.len() >= EYECATCHER_LEN`.
    pub(crate) fn from_slice(buf: &[u8]) -> Self {
        let mut bytes = [0u8; EYECATCHER_LEN];
        bytes.copy_from_slice(&buf[..EYECATCHER_LEN]);
        Eyecatcher(bytes)
    }
}

impl fmt::Display for Eyecatcher {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.kind() {
            SmcVariant::SmcR => write!(f, "SMC-R"),
            SmcVariant::SmcD => write!(f, "SMC-D"),
            SmcVariant::Unknown => write!(f, "Unknown"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn valid_eyecatchers() {
        assert!(is_eyecatcher(&SMCR_EYECATCHER));
        assert!(is_eyecatcher(&SMCD_EYECATCHER));
        // longer buffers only check the prefix
        assert!(is_eyecatcher(&[0xE2, 0xD4, 0xC3, 0xD9, 0x00, 0xFF]));
    }

    #[test]
    fn invalid_eyecatchers() {
        assert!(!is_eyecatcher(&[0xE2, 0xD4, 0xC3, 0xDA]));
        assert!(!is_eyecatcher(&[0x00, 0x00, 0x00, 0x00]));
        // too short
        assert!(!is_eyecatcher(&[0xE2, 0xD4, 0xC3]));
        assert!(!is_eyecatcher(&[]));
    }

    #[test]
    fn kind_classification() {
        assert_eq!(Eyecatcher(SMCR_EYECATCHER).kind(), SmcVariant::SmcR);
        assert_eq!(Eyecatcher(SMCD_EYECATCHER).kind(), SmcVariant::SmcD);
        assert_eq!(Eyecatcher([0; 4]).kind(), SmcVariant::Unknown);
    }

    #[test]
    fn display() {
        assert_eq!(Eyecatcher(SMCR_EYECATCHER).to_string(), "SMC-R");
        assert_eq!(Eyecatcher(SMCD_EYECATCHER).to_string(), "SMC-D");
        assert_eq!(Eyecatcher([1, 2, 3, 4]).to_string(), "Unknown");
    }
}
