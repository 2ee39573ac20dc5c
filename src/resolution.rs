//! Resolution codes.

/// Picture size in pixels.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Resolution {
    pub width: u32,
    pub height: u32,
}

// Known codes. Anything else carries the size in the packed word itself.
const RESOLUTION_CODES: [(u16, Resolution); 8] = [
    (0x1001, Resolution::new(352, 240)),
    (0x1002, Resolution::new(176, 128)),
    (0x1003, Resolution::new(704, 480)),
    (0x1004, Resolution::new(704, 240)),
    (0x1005, Resolution::new(96, 64)),
    (0x1006, Resolution::new(320, 240)),
    (0x1007, Resolution::new(160, 128)),
    (0x1008, Resolution::new(528, 320)),
];

impl Resolution {
    pub const fn new(width: u32, height: u32) -> Self {
        Resolution { width, height }
    }

    /// Decode a packed resolution word.
    ///
    /// The low 16 bits select an entry of the code table. When they match no
    /// entry, the low half is the raw width and the high half the raw height.
    pub fn from_code(packed: u32) -> Self {
        let code = (packed & 0xFFFF) as u16;
        RESOLUTION_CODES
            .iter()
            .find(|(c, _)| *c == code)
            .map(|(_, r)| *r)
            .unwrap_or(Resolution::new(packed & 0xFFFF, packed >> 16))
    }

    /// Pack a code and a fallback height the way the header stores them.
    pub fn pack(code: u16, fallback_height: u16) -> u32 {
        ((fallback_height as u32) << 16) | code as u32
    }
}

impl std::fmt::Display for Resolution {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}x{}", self.width, self.height)
    }
}
