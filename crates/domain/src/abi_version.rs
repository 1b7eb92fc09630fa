use std::fmt;

/// Negotiated protocol revision of a backend session.
///
/// The revision is fixed by the handshake and decides how many fields a
/// query line carries:
///
/// | version | fields |
/// |---|---|
/// | 1 | command, name, type, class, id, remote ip |
/// | 2 | + local ip |
/// | 3 | + EDNS client subnet |
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum AbiVersion {
    V1,
    V2,
    V3,
}

impl AbiVersion {
    pub const ALL: [AbiVersion; 3] = [AbiVersion::V1, AbiVersion::V2, AbiVersion::V3];

    pub fn as_u8(&self) -> u8 {
        match self {
            AbiVersion::V1 => 1,
            AbiVersion::V2 => 2,
            AbiVersion::V3 => 3,
        }
    }

    pub fn from_u8(value: u8) -> Option<Self> {
        match value {
            1 => Some(AbiVersion::V1),
            2 => Some(AbiVersion::V2),
            3 => Some(AbiVersion::V3),
            _ => None,
        }
    }

    /// Number of tab-separated fields in a query line, command token included.
    pub fn field_count(&self) -> usize {
        match self {
            AbiVersion::V1 => 6,
            AbiVersion::V2 => 7,
            AbiVersion::V3 => 8,
        }
    }

    pub fn supports_local_ip(&self) -> bool {
        *self >= AbiVersion::V2
    }

    pub fn supports_edns_subnet(&self) -> bool {
        *self >= AbiVersion::V3
    }
}

impl fmt::Display for AbiVersion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_u8())
    }
}
