use std::fmt;

use camkit_core::geometry::Size;

/// Four-character pixel format code, stored byte-order independent.
#[derive(Clone, Copy, Eq, Hash, PartialEq)]
pub struct FourCc(pub [u8; 4]);

impl FourCc {
    pub const fn new(code: &[u8; 4]) -> Self {
        Self(*code)
    }

    pub const NV12: FourCc = FourCc::new(b"NV12");

    /// IPU3 packed 10-bit Bayer variants produced by the CIO2 unit.
    pub const IPU3_SBGGR10: FourCc = FourCc::new(b"ip3b");
    pub const IPU3_SGBRG10: FourCc = FourCc::new(b"ip3g");
    pub const IPU3_SGRBG10: FourCc = FourCc::new(b"ip3G");
    pub const IPU3_SRGGB10: FourCc = FourCc::new(b"ip3r");

    /// IPU3 3A statistics meta format.
    pub const IPU3_STAT_3A: FourCc = FourCc::new(b"ip3s");
}

impl fmt::Display for FourCc {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match std::str::from_utf8(&self.0) {
            Ok(s) => f.write_str(s),
            Err(_) => write!(f, "{:02x}{:02x}{:02x}{:02x}", self.0[0], self.0[1], self.0[2], self.0[3]),
        }
    }
}

impl fmt::Debug for FourCc {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "FourCc({})", self)
    }
}

/// Media-bus format codes, matching the kernel's numbering.
pub mod mbus {
    pub const FIXED: u32 = 0x0001;
    pub const SBGGR10_1X10: u32 = 0x3007;
    pub const SGBRG10_1X10: u32 = 0x3009;
    pub const SGRBG10_1X10: u32 = 0x300a;
    pub const SRGGB10_1X10: u32 = 0x300f;
}

/// Image format negotiated on a video device node.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct VideoFormat {
    pub size: Size,
    pub fourcc: FourCc,
    pub planes: u32,
    /// Total buffer size in bytes. Zero lets the device compute it; meta
    /// nodes require an explicit value.
    pub sizeimage: u32,
}

impl VideoFormat {
    pub fn new(size: Size, fourcc: FourCc, planes: u32) -> Self {
        Self {
            size,
            fourcc,
            planes,
            sizeimage: 0,
        }
    }
}

impl fmt::Display for VideoFormat {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "{}-{}", self.size, self.fourcc)
    }
}

/// Format negotiated on one pad of a sub-device.
#[derive(Clone, Copy, Debug, Default, Eq, PartialEq)]
pub struct SubdevFormat {
    pub mbus_code: u32,
    pub size: Size,
}

impl fmt::Display for SubdevFormat {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "{}-0x{:04x}", self.size, self.mbus_code)
    }
}
