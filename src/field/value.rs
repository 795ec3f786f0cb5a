use std::fmt;
use std::net::{IpAddr, Ipv4Addr, Ipv6Addr};
use std::str::FromStr;

use chrono::{DateTime, Utc};

/// Semantic type of a field, as declared by the catalog.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FieldType {
    U8,
    U16,
    U32,
    U64,
    F64,
    Timestamp,
    Addr,
    Mac,
    Str,
    /// Fixed-layout composite (basic record, ACL triple, MPLS stack).
    Blob,
}

impl FieldType {
    /// Returns the canonical type name used in error messages.
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::U8 => "u8",
            Self::U16 => "u16",
            Self::U32 => "u32",
            Self::U64 => "u64",
            Self::F64 => "f64",
            Self::Timestamp => "timestamp",
            Self::Addr => "addr",
            Self::Mac => "mac",
            Self::Str => "string",
            Self::Blob => "blob",
        }
    }

    /// The value an unset field of this type contributes to a group key.
    pub fn zero_value(self) -> Value {
        match self {
            Self::U8 => Value::U8(0),
            Self::U16 => Value::U16(0),
            Self::U32 => Value::U32(0),
            Self::U64 => Value::U64(0),
            Self::F64 => Value::F64(0.0),
            Self::Timestamp => Value::Timestamp(DateTime::UNIX_EPOCH),
            Self::Addr => Value::Addr(IpAddr::V4(Ipv4Addr::UNSPECIFIED)),
            Self::Mac => Value::Mac(MacAddr::default()),
            Self::Str => Value::Str(String::new()),
            Self::Blob => Value::Blob(Vec::new()),
        }
    }

    /// Whether values of this type are IP addresses subject to prefix masking.
    pub const fn is_addr(self) -> bool {
        matches!(self, Self::Addr)
    }
}

impl fmt::Display for FieldType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A single field value.
#[derive(Debug, Clone, PartialEq)]
pub enum Value {
    U8(u8),
    U16(u16),
    U32(u32),
    U64(u64),
    F64(f64),
    /// Millisecond-precision wall clock time.
    Timestamp(DateTime<Utc>),
    Addr(IpAddr),
    Mac(MacAddr),
    Str(String),
    Blob(Vec<u8>),
}

impl Value {
    /// Returns the semantic type of this value.
    pub const fn field_type(&self) -> FieldType {
        match self {
            Self::U8(_) => FieldType::U8,
            Self::U16(_) => FieldType::U16,
            Self::U32(_) => FieldType::U32,
            Self::U64(_) => FieldType::U64,
            Self::F64(_) => FieldType::F64,
            Self::Timestamp(_) => FieldType::Timestamp,
            Self::Addr(_) => FieldType::Addr,
            Self::Mac(_) => FieldType::Mac,
            Self::Str(_) => FieldType::Str,
            Self::Blob(_) => FieldType::Blob,
        }
    }

    /// Widens any unsigned integer to u64.
    pub fn as_u64(&self) -> Option<u64> {
        match *self {
            Self::U8(v) => Some(u64::from(v)),
            Self::U16(v) => Some(u64::from(v)),
            Self::U32(v) => Some(u64::from(v)),
            Self::U64(v) => Some(v),
            _ => None,
        }
    }

    /// Converts any numeric value to f64.
    pub fn as_f64(&self) -> Option<f64> {
        match *self {
            Self::F64(v) => Some(v),
            _ => self.as_u64().map(|v| v as f64),
        }
    }

    pub fn as_timestamp(&self) -> Option<DateTime<Utc>> {
        match *self {
            Self::Timestamp(t) => Some(t),
            _ => None,
        }
    }

    /// Applies CIDR truncation to address values; other values pass through.
    pub fn masked(self, v4_prefix: u8, v6_prefix: u8) -> Self {
        match self {
            Self::Addr(addr) => Self::Addr(mask_addr(addr, v4_prefix, v6_prefix)),
            other => other,
        }
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::U8(v) => write!(f, "{v}"),
            Self::U16(v) => write!(f, "{v}"),
            Self::U32(v) => write!(f, "{v}"),
            Self::U64(v) => write!(f, "{v}"),
            Self::F64(v) => write!(f, "{v:.3}"),
            Self::Timestamp(t) => write!(f, "{}", t.format("%Y-%m-%d %H:%M:%S%.3f")),
            Self::Addr(a) => write!(f, "{a}"),
            Self::Mac(m) => write!(f, "{m}"),
            Self::Str(s) => f.write_str(s),
            Self::Blob(b) => {
                for byte in b {
                    write!(f, "{byte:02x}")?;
                }
                Ok(())
            }
        }
    }
}

/// Truncates an address to the given prefix length of its family.
///
/// A prefix of 0, or one at least as wide as the family, leaves the address
/// unchanged.
pub fn mask_addr(addr: IpAddr, v4_prefix: u8, v6_prefix: u8) -> IpAddr {
    match addr {
        IpAddr::V4(v4) => {
            if v4_prefix == 0 || v4_prefix >= 32 {
                return addr;
            }
            let mask = u32::MAX << (32 - u32::from(v4_prefix));
            IpAddr::V4(Ipv4Addr::from(u32::from(v4) & mask))
        }
        IpAddr::V6(v6) => {
            if v6_prefix == 0 || v6_prefix >= 128 {
                return addr;
            }
            let mask = u128::MAX << (128 - u32::from(v6_prefix));
            IpAddr::V6(Ipv6Addr::from(u128::from(v6) & mask))
        }
    }
}

/// IEEE 802 link-layer address.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct MacAddr(pub [u8; 6]);

impl fmt::Display for MacAddr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let [a, b, c, d, e, g] = self.0;
        write!(f, "{a:02x}:{b:02x}:{c:02x}:{d:02x}:{e:02x}:{g:02x}")
    }
}

/// Error returned when a link-layer address string is malformed.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("invalid MAC address: {0}")]
pub struct InvalidMac(pub String);

impl FromStr for MacAddr {
    type Err = InvalidMac;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let mut out = [0u8; 6];
        let mut parts = s.split([':', '-']);
        for slot in &mut out {
            let part = parts.next().ok_or_else(|| InvalidMac(s.to_string()))?;
            if part.len() != 2 {
                return Err(InvalidMac(s.to_string()));
            }
            *slot = u8::from_str_radix(part, 16).map_err(|_| InvalidMac(s.to_string()))?;
        }
        if parts.next().is_some() {
            return Err(InvalidMac(s.to_string()));
        }
        Ok(Self(out))
    }
}
