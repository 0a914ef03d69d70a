//! Payloads of the boxed value kinds that live on the [`Heap`](crate::heap::Heap).

use std::{
    fmt,
    net::{IpAddr, Ipv4Addr, Ipv6Addr},
};

use serde::{Deserialize, Serialize};
use strum::Display;

use crate::{heap::ValPtr, types::TypePtr, zval::ZVal};

/// Transport protocol of a port value.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Display, Serialize, Deserialize)]
#[strum(serialize_all = "lowercase")]
pub enum TransportProto {
    Unknown,
    Tcp,
    Udp,
    Icmp,
}

/// A transport-layer port, e.g. `80/tcp`.
///
/// Ports are interned by the heap, so two equal ports always share one heap entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct PortVal {
    number: u16,
    proto: TransportProto,
}

const PORT_SPACE_MASK: u64 = 0x30000;
const TCP_PORT_MASK: u64 = 0x10000;
const UDP_PORT_MASK: u64 = 0x20000;
const ICMP_PORT_MASK: u64 = 0x30000;

impl PortVal {
    #[must_use]
    pub const fn new(number: u16, proto: TransportProto) -> Self {
        Self { number, proto }
    }

    #[must_use]
    pub const fn number(self) -> u16 {
        self.number
    }

    #[must_use]
    pub const fn proto(self) -> TransportProto {
        self.proto
    }

    /// The packed unsigned form: the port number with the protocol in bits 16-17.
    ///
    /// This is what a port yields when read through its unsigned internal representation.
    #[must_use]
    pub const fn raw(self) -> u64 {
        let mask = match self.proto {
            TransportProto::Unknown => 0,
            TransportProto::Tcp => TCP_PORT_MASK,
            TransportProto::Udp => UDP_PORT_MASK,
            TransportProto::Icmp => ICMP_PORT_MASK,
        };
        self.number as u64 | mask
    }

    /// Inverse of [`raw`](Self::raw). Bits above the protocol field are ignored.
    #[must_use]
    pub const fn from_raw(raw: u64) -> Self {
        let proto = match raw & PORT_SPACE_MASK {
            TCP_PORT_MASK => TransportProto::Tcp,
            UDP_PORT_MASK => TransportProto::Udp,
            ICMP_PORT_MASK => TransportProto::Icmp,
            _ => TransportProto::Unknown,
        };
        #[expect(clippy::cast_possible_truncation, reason = "masked to 16 bits")]
        let number = (raw & 0xFFFF) as u16;
        Self { number, proto }
    }
}

impl fmt::Display for PortVal {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.number, self.proto)
    }
}

/// An address prefix, e.g. `10.0.0.0/8`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct SubNetVal {
    prefix: IpAddr,
    width: u8,
}

impl SubNetVal {
    /// Builds a subnet, masking host bits off `addr`. Widths beyond the address family's
    /// length are clamped.
    #[must_use]
    pub fn new(addr: IpAddr, width: u8) -> Self {
        match addr {
            IpAddr::V4(v4) => {
                let width = width.min(32);
                let mask = u32::MAX.checked_shl(32 - u32::from(width)).unwrap_or(0);
                Self {
                    prefix: IpAddr::V4(Ipv4Addr::from(u32::from(v4) & mask)),
                    width,
                }
            }
            IpAddr::V6(v6) => {
                let width = width.min(128);
                let mask = u128::MAX.checked_shl(128 - u32::from(width)).unwrap_or(0);
                Self {
                    prefix: IpAddr::V6(Ipv6Addr::from(u128::from(v6) & mask)),
                    width,
                }
            }
        }
    }

    #[must_use]
    pub const fn prefix(&self) -> IpAddr {
        self.prefix
    }

    #[must_use]
    pub const fn width(&self) -> u8 {
        self.width
    }

    #[must_use]
    pub fn contains(&self, addr: IpAddr) -> bool {
        Self::new(addr, self.width).prefix == self.prefix
    }
}

impl fmt::Display for SubNetVal {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.prefix, self.width)
    }
}

/// A compiled regular-expression pattern.
#[derive(Debug, Clone)]
pub struct PatternVal {
    source: String,
    regex: regex::bytes::Regex,
}

impl PatternVal {
    /// Compiles `source` into an anchored-anywhere byte pattern.
    pub fn new(source: impl Into<String>) -> Result<Self, regex::Error> {
        let source = source.into();
        let regex = regex::bytes::Regex::new(&source)?;
        Ok(Self { source, regex })
    }

    #[must_use]
    pub fn source(&self) -> &str {
        &self.source
    }

    /// True if the pattern matches anywhere in `text`.
    #[must_use]
    pub fn is_match(&self, text: &[u8]) -> bool {
        self.regex.is_match(text)
    }
}

/// A value of an enum type.
#[derive(Debug, Clone)]
pub struct EnumVal {
    pub ty: TypePtr,
    pub value: i64,
}

/// A file handle, identified by its name.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FileVal {
    pub name: String,
}

/// A function handle, identified by its name.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FuncVal {
    pub name: String,
}

/// Host-defined state behind an opaque type.
#[derive(Debug, Clone)]
pub struct OpaqueVal {
    pub ty: TypePtr,
    pub state: Vec<u8>,
}

/// A type list (`types`): an ordered list of owned references.
#[derive(Debug, Default)]
pub struct ListVal {
    pub elems: Vec<ValPtr>,
}

/// A record. Fields are positional, matching the record type's field order; unset
/// optional fields are `None`.
#[derive(Debug)]
pub struct RecordVal {
    pub ty: TypePtr,
    pub fields: Vec<Option<ValPtr>>,
}

/// A table or set. Sets store `None` as every entry's value.
#[derive(Debug)]
pub struct TableVal {
    pub ty: TypePtr,
    pub entries: Vec<(ValPtr, Option<ValPtr>)>,
}

/// A vector. Elements are stored as cells under the vector's yield type, so a vector of
/// `count` costs 8 bytes per element and a vector of `any` keeps each element's concrete
/// kind. `None` marks a hole.
#[derive(Debug)]
pub struct VectorVal {
    pub ty: TypePtr,
    pub elems: Vec<Option<ZVal>>,
}

impl VectorVal {
    #[must_use]
    pub fn new(ty: TypePtr) -> Self {
        Self { ty, elems: Vec::new() }
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.elems.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.elems.is_empty()
    }
}
