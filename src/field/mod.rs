//! Flow field catalog.
//!
//! Maps every field identifier to its semantic value type and its
//! configuration-file name, and declares the symmetric pair fields used for
//! bidirectional statistics. The tables are static; nothing here is mutated
//! at runtime.

pub mod value;

use std::fmt;
use std::sync::LazyLock;

use rustc_hash::FxHashMap;

pub use self::value::{FieldType, MacAddr, Value};

/// Opaque identifier of a flow record field.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct FieldId(pub u16);

impl FieldId {
    // -- Timestamps and counters --
    pub const FIRST: Self = Self(0x01);
    pub const LAST: Self = Self(0x02);
    pub const RECEIVED: Self = Self(0x03);
    pub const DOCTETS: Self = Self(0x04);
    pub const DPKTS: Self = Self(0x05);
    pub const OUT_BYTES: Self = Self(0x06);
    pub const OUT_PKTS: Self = Self(0x07);
    pub const AGGR_FLOWS: Self = Self(0x08);

    // -- L3/L4 identity --
    pub const SRCPORT: Self = Self(0x09);
    pub const DSTPORT: Self = Self(0x0a);
    pub const TCP_FLAGS: Self = Self(0x0b);
    pub const SRCADDR: Self = Self(0x0c);
    pub const DSTADDR: Self = Self(0x0d);
    pub const IP_NEXTHOP: Self = Self(0x0e);
    pub const SRC_MASK: Self = Self(0x0f);
    pub const DST_MASK: Self = Self(0x10);
    pub const TOS: Self = Self(0x11);
    pub const DST_TOS: Self = Self(0x12);
    pub const SRCAS: Self = Self(0x13);
    pub const DSTAS: Self = Self(0x14);
    pub const BGP_NEXT_ADJACENT_AS: Self = Self(0x15);
    pub const BGP_PREV_ADJACENT_AS: Self = Self(0x16);
    pub const BGP_NEXTHOP: Self = Self(0x17);
    pub const PROT: Self = Self(0x18);

    // -- L2 --
    pub const SRC_VLAN: Self = Self(0x20);
    pub const DST_VLAN: Self = Self(0x21);
    pub const IN_SRC_MAC: Self = Self(0x22);
    pub const OUT_SRC_MAC: Self = Self(0x23);
    pub const IN_DST_MAC: Self = Self(0x24);
    pub const OUT_DST_MAC: Self = Self(0x25);
    pub const MPLS_LABEL: Self = Self(0x26);

    // -- Exporter and routing --
    pub const INPUT: Self = Self(0x27);
    pub const OUTPUT: Self = Self(0x28);
    pub const DIR: Self = Self(0x29);
    pub const FWD_STATUS: Self = Self(0x2a);
    pub const IP_ROUTER: Self = Self(0x2b);
    pub const ENGINE_TYPE: Self = Self(0x2c);
    pub const ENGINE_ID: Self = Self(0x2d);

    // -- NSEL / NAT --
    pub const EVENT_TIME: Self = Self(0x2e);
    pub const CONN_ID: Self = Self(0x2f);
    pub const ICMP_CODE: Self = Self(0x30);
    pub const ICMP_TYPE: Self = Self(0x31);
    pub const FW_XEVENT: Self = Self(0x32);
    pub const FW_EVENT: Self = Self(0x33);
    pub const XLATE_SRC_IP: Self = Self(0x34);
    pub const XLATE_DST_IP: Self = Self(0x35);
    pub const XLATE_SRC_PORT: Self = Self(0x36);
    pub const XLATE_DST_PORT: Self = Self(0x37);
    pub const INGRESS_ACL_ID: Self = Self(0x38);
    pub const INGRESS_ACE_ID: Self = Self(0x39);
    pub const INGRESS_XACE_ID: Self = Self(0x3a);
    pub const INGRESS_ACL: Self = Self(0x3b);
    pub const EGRESS_ACL_ID: Self = Self(0x3c);
    pub const EGRESS_ACE_ID: Self = Self(0x3d);
    pub const EGRESS_XACE_ID: Self = Self(0x3e);
    pub const EGRESS_ACL: Self = Self(0x3f);
    pub const USERNAME: Self = Self(0x40);
    pub const INGRESS_VRFID: Self = Self(0x41);
    pub const EVENT_FLAG: Self = Self(0x42);
    pub const EGRESS_VRFID: Self = Self(0x43);
    pub const BLOCK_START: Self = Self(0x44);
    pub const BLOCK_END: Self = Self(0x45);
    pub const BLOCK_STEP: Self = Self(0x46);
    pub const BLOCK_SIZE: Self = Self(0x47);

    // -- Latency extension --
    pub const CLIENT_NW_DELAY_USEC: Self = Self(0x48);
    pub const SERVER_NW_DELAY_USEC: Self = Self(0x49);
    pub const APPL_LATENCY_USEC: Self = Self(0x4a);

    // -- Exporter metadata --
    pub const INET_FAMILY: Self = Self(0x4b);
    pub const EXPORTER_IP: Self = Self(0x4c);
    pub const EXPORTER_ID: Self = Self(0x4d);
    pub const EXPORTER_VERSION: Self = Self(0x4e);
    pub const SEQUENCE_FAILURES: Self = Self(0x4f);
    pub const SAMPLER_MODE: Self = Self(0x50);
    pub const SAMPLER_INTERVAL: Self = Self(0x51);
    pub const SAMPLER_ID: Self = Self(0x52);

    // -- Calculated --
    pub const CALC_DURATION: Self = Self(0xa1);
    pub const CALC_BPS: Self = Self(0xa2);
    pub const CALC_PPS: Self = Self(0xa3);
    pub const CALC_BPP: Self = Self(0xa4);

    /// Composite basic record (first, last, addresses, ports, counters).
    pub const BREC1: Self = Self(0xb0);

    // -- Pair pseudo-fields --
    pub const PAIR_PORT: Self = Self(0x100);
    pub const PAIR_ADDR: Self = Self(0x101);
    pub const PAIR_AS: Self = Self(0x102);
    pub const PAIR_IF: Self = Self(0x103);
    pub const PAIR_VLAN: Self = Self(0x104);

    /// Looks up a field by its configuration name (e.g. "srcip", "bytes").
    pub fn from_name(name: &str) -> Option<Self> {
        BY_NAME.get(name).copied()
    }

    /// Returns the catalog entry for this field, if it exists.
    pub fn def(self) -> Option<&'static FieldDef> {
        BY_ID.get(&self).copied()
    }

    /// Returns the semantic value type of this field.
    pub fn field_type(self) -> Option<FieldType> {
        self.def().map(|d| d.ty)
    }

    /// Returns the configuration name, or "unknown" for identifiers outside
    /// the catalog.
    pub fn name(self) -> &'static str {
        self.def().map_or("unknown", |d| d.name)
    }

    /// Returns the (source, destination) fields of a pair pseudo-field.
    pub fn pair(self) -> Option<(Self, Self)> {
        PAIR_FIELDS
            .iter()
            .find(|(pair, _, _)| *pair == self)
            .map(|&(_, src, dst)| (src, dst))
    }

    /// Whether this is a pair pseudo-field.
    pub fn is_pair(self) -> bool {
        self.pair().is_some()
    }
}

impl fmt::Display for FieldId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.def() {
            Some(def) => f.write_str(def.name),
            None => write!(f, "field#{:#x}", self.0),
        }
    }
}

/// One catalog entry.
#[derive(Debug, Clone, Copy)]
pub struct FieldDef {
    pub id: FieldId,
    pub name: &'static str,
    pub ty: FieldType,
    /// False for composite fields that can only be carried, never aggregated.
    pub aggregatable: bool,
}

const fn def(id: FieldId, name: &'static str, ty: FieldType) -> FieldDef {
    FieldDef {
        id,
        name,
        ty,
        aggregatable: true,
    }
}

const fn composite(id: FieldId, name: &'static str, ty: FieldType) -> FieldDef {
    FieldDef {
        id,
        name,
        ty,
        aggregatable: false,
    }
}

/// The complete field catalog.
pub static CATALOG: &[FieldDef] = &[
    def(FieldId::FIRST, "first", FieldType::Timestamp),
    def(FieldId::LAST, "last", FieldType::Timestamp),
    def(FieldId::RECEIVED, "received", FieldType::U64),
    def(FieldId::DOCTETS, "bytes", FieldType::U64),
    def(FieldId::DPKTS, "pkts", FieldType::U64),
    def(FieldId::OUT_BYTES, "outbytes", FieldType::U64),
    def(FieldId::OUT_PKTS, "outpkts", FieldType::U64),
    def(FieldId::AGGR_FLOWS, "flows", FieldType::U64),
    def(FieldId::SRCPORT, "srcport", FieldType::U16),
    def(FieldId::DSTPORT, "dstport", FieldType::U16),
    def(FieldId::TCP_FLAGS, "tcpflags", FieldType::U8),
    def(FieldId::SRCADDR, "srcip", FieldType::Addr),
    def(FieldId::DSTADDR, "dstip", FieldType::Addr),
    def(FieldId::IP_NEXTHOP, "nexthop", FieldType::Addr),
    def(FieldId::SRC_MASK, "srcmask", FieldType::U8),
    def(FieldId::DST_MASK, "dstmask", FieldType::U8),
    def(FieldId::TOS, "tos", FieldType::U8),
    def(FieldId::DST_TOS, "dsttos", FieldType::U8),
    def(FieldId::SRCAS, "srcas", FieldType::U32),
    def(FieldId::DSTAS, "dstas", FieldType::U32),
    def(FieldId::BGP_NEXT_ADJACENT_AS, "nextas", FieldType::U32),
    def(FieldId::BGP_PREV_ADJACENT_AS, "prevas", FieldType::U32),
    def(FieldId::BGP_NEXTHOP, "bgpnexthop", FieldType::Addr),
    def(FieldId::PROT, "proto", FieldType::U8),
    def(FieldId::SRC_VLAN, "srcvlan", FieldType::U16),
    def(FieldId::DST_VLAN, "dstvlan", FieldType::U16),
    def(FieldId::IN_SRC_MAC, "insrcmac", FieldType::Mac),
    def(FieldId::OUT_SRC_MAC, "outsrcmac", FieldType::Mac),
    def(FieldId::IN_DST_MAC, "indstmac", FieldType::Mac),
    def(FieldId::OUT_DST_MAC, "outdstmac", FieldType::Mac),
    composite(FieldId::MPLS_LABEL, "mpls", FieldType::Blob),
    def(FieldId::INPUT, "inif", FieldType::U32),
    def(FieldId::OUTPUT, "outif", FieldType::U32),
    def(FieldId::DIR, "dir", FieldType::U8),
    def(FieldId::FWD_STATUS, "fwd", FieldType::U8),
    def(FieldId::IP_ROUTER, "router", FieldType::Addr),
    def(FieldId::ENGINE_TYPE, "systype", FieldType::U8),
    def(FieldId::ENGINE_ID, "sysid", FieldType::U8),
    def(FieldId::EVENT_TIME, "eventtime", FieldType::U64),
    def(FieldId::CONN_ID, "connid", FieldType::U32),
    def(FieldId::ICMP_CODE, "icmpcode", FieldType::U8),
    def(FieldId::ICMP_TYPE, "icmptype", FieldType::U8),
    def(FieldId::FW_XEVENT, "xevent", FieldType::U16),
    def(FieldId::FW_EVENT, "event", FieldType::U8),
    def(FieldId::XLATE_SRC_IP, "xsrcip", FieldType::Addr),
    def(FieldId::XLATE_DST_IP, "xdstip", FieldType::Addr),
    def(FieldId::XLATE_SRC_PORT, "xsrcport", FieldType::U16),
    def(FieldId::XLATE_DST_PORT, "xdstport", FieldType::U16),
    def(FieldId::INGRESS_ACL_ID, "iacl", FieldType::U32),
    def(FieldId::INGRESS_ACE_ID, "iace", FieldType::U32),
    def(FieldId::INGRESS_XACE_ID, "ixace", FieldType::U32),
    composite(FieldId::INGRESS_ACL, "ingressacl", FieldType::Blob),
    def(FieldId::EGRESS_ACL_ID, "eacl", FieldType::U32),
    def(FieldId::EGRESS_ACE_ID, "eace", FieldType::U32),
    def(FieldId::EGRESS_XACE_ID, "exace", FieldType::U32),
    composite(FieldId::EGRESS_ACL, "egressacl", FieldType::Blob),
    composite(FieldId::USERNAME, "username", FieldType::Str),
    def(FieldId::INGRESS_VRFID, "ingressvrfid", FieldType::U32),
    def(FieldId::EVENT_FLAG, "eventflag", FieldType::U8),
    def(FieldId::EGRESS_VRFID, "egressvrfid", FieldType::U32),
    def(FieldId::BLOCK_START, "blockstart", FieldType::U16),
    def(FieldId::BLOCK_END, "blockend", FieldType::U16),
    def(FieldId::BLOCK_STEP, "blockstep", FieldType::U16),
    def(FieldId::BLOCK_SIZE, "blocksize", FieldType::U16),
    def(FieldId::CLIENT_NW_DELAY_USEC, "cl", FieldType::U64),
    def(FieldId::SERVER_NW_DELAY_USEC, "sl", FieldType::U64),
    def(FieldId::APPL_LATENCY_USEC, "al", FieldType::U64),
    def(FieldId::INET_FAMILY, "inetfamily", FieldType::U32),
    def(FieldId::EXPORTER_IP, "exporterip", FieldType::Addr),
    def(FieldId::EXPORTER_ID, "exporterid", FieldType::U32),
    def(FieldId::EXPORTER_VERSION, "exporterversion", FieldType::U32),
    def(FieldId::SEQUENCE_FAILURES, "seqfailures", FieldType::U32),
    def(FieldId::SAMPLER_MODE, "samplermode", FieldType::U16),
    def(FieldId::SAMPLER_INTERVAL, "samplerinterval", FieldType::U32),
    def(FieldId::SAMPLER_ID, "samplerid", FieldType::U32),
    def(FieldId::CALC_DURATION, "duration", FieldType::U64),
    def(FieldId::CALC_BPS, "bps", FieldType::F64),
    def(FieldId::CALC_PPS, "pps", FieldType::F64),
    def(FieldId::CALC_BPP, "bpp", FieldType::F64),
    composite(FieldId::BREC1, "brec1", FieldType::Blob),
    def(FieldId::PAIR_PORT, "port", FieldType::U16),
    def(FieldId::PAIR_ADDR, "ip", FieldType::Addr),
    def(FieldId::PAIR_AS, "as", FieldType::U32),
    def(FieldId::PAIR_IF, "if", FieldType::U32),
    def(FieldId::PAIR_VLAN, "vlan", FieldType::U16),
];

/// Pair pseudo-field -> (source field, destination field).
pub static PAIR_FIELDS: &[(FieldId, FieldId, FieldId)] = &[
    (FieldId::PAIR_PORT, FieldId::SRCPORT, FieldId::DSTPORT),
    (FieldId::PAIR_ADDR, FieldId::SRCADDR, FieldId::DSTADDR),
    (FieldId::PAIR_AS, FieldId::SRCAS, FieldId::DSTAS),
    (FieldId::PAIR_IF, FieldId::INPUT, FieldId::OUTPUT),
    (FieldId::PAIR_VLAN, FieldId::SRC_VLAN, FieldId::DST_VLAN),
];

static BY_ID: LazyLock<FxHashMap<FieldId, &'static FieldDef>> =
    LazyLock::new(|| CATALOG.iter().map(|d| (d.id, d)).collect());

static BY_NAME: LazyLock<FxHashMap<&'static str, FieldId>> =
    LazyLock::new(|| CATALOG.iter().map(|d| (d.name, d.id)).collect());
