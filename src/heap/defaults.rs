//! Static per-field aggregation defaults and derived-field prerequisites.

use crate::field::{FieldId, FieldType};

use super::template::AggrKind;

/// Derived fields in evaluation order. Each entry only depends on raw fields
/// or on entries before it.
pub const DERIVED: &[FieldId] = &[
    FieldId::CALC_DURATION,
    FieldId::CALC_BPS,
    FieldId::CALC_PPS,
    FieldId::CALC_BPP,
];

/// Returns the raw fields a derived field is computed from, in the order the
/// computation reads them.
pub fn prerequisites(field: FieldId) -> &'static [FieldId] {
    match field {
        FieldId::CALC_DURATION => &[FieldId::FIRST, FieldId::LAST],
        FieldId::CALC_BPS => &[FieldId::DOCTETS, FieldId::CALC_DURATION],
        FieldId::CALC_PPS => &[FieldId::DPKTS, FieldId::CALC_DURATION],
        FieldId::CALC_BPP => &[FieldId::DPKTS, FieldId::DOCTETS],
        _ => &[],
    }
}

pub fn is_derived(field: FieldId) -> bool {
    DERIVED.contains(&field)
}

/// The aggregation kind a field gets when none is requested.
pub fn default_kind(field: FieldId) -> AggrKind {
    match field {
        FieldId::FIRST | FieldId::EVENT_TIME => AggrKind::Min,
        FieldId::LAST | FieldId::RECEIVED => AggrKind::Max,
        FieldId::DOCTETS
        | FieldId::DPKTS
        | FieldId::OUT_BYTES
        | FieldId::OUT_PKTS
        | FieldId::AGGR_FLOWS
        | FieldId::SEQUENCE_FAILURES
        | FieldId::CALC_DURATION
        | FieldId::CALC_BPS
        | FieldId::CALC_PPS
        | FieldId::CALC_BPP => AggrKind::Sum,
        FieldId::TCP_FLAGS => AggrKind::Or,
        _ => AggrKind::Key,
    }
}

/// Resolves [`AggrKind::Auto`]. An address field with a prefix length is
/// always grouped on.
pub fn resolve_auto(field: FieldId, ty: FieldType, v4_prefix: u8, v6_prefix: u8) -> AggrKind {
    if ty.is_addr() && (v4_prefix > 0 || v6_prefix > 0) {
        return AggrKind::Key;
    }
    default_kind(field)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_kinds() {
        assert_eq!(default_kind(FieldId::FIRST), AggrKind::Min);
        assert_eq!(default_kind(FieldId::LAST), AggrKind::Max);
        assert_eq!(default_kind(FieldId::RECEIVED), AggrKind::Max);
        assert_eq!(default_kind(FieldId::DOCTETS), AggrKind::Sum);
        assert_eq!(default_kind(FieldId::TCP_FLAGS), AggrKind::Or);
        assert_eq!(default_kind(FieldId::SRCPORT), AggrKind::Key);
        assert_eq!(default_kind(FieldId::PAIR_ADDR), AggrKind::Key);
    }

    #[test]
    fn test_auto_address_with_prefix_is_key() {
        assert_eq!(
            resolve_auto(FieldId::EXPORTER_IP, FieldType::Addr, 24, 0),
            AggrKind::Key
        );
        assert_eq!(
            resolve_auto(FieldId::DOCTETS, FieldType::U64, 24, 64),
            AggrKind::Sum
        );
    }

    #[test]
    fn test_derived_order_respects_prerequisites() {
        for (i, field) in DERIVED.iter().enumerate() {
            for dep in prerequisites(*field) {
                if is_derived(*dep) {
                    let pos = DERIVED.iter().position(|d| d == dep).expect("listed");
                    assert!(pos < i, "{dep} must precede {field}");
                }
            }
        }
    }

    #[test]
    fn test_raw_fields_have_no_prerequisites() {
        assert!(prerequisites(FieldId::DOCTETS).is_empty());
        assert!(!is_derived(FieldId::DOCTETS));
    }
}
