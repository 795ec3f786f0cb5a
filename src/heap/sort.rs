//! Derived-value computation and result ordering.

use std::cmp::Ordering;
use std::net::IpAddr;

use serde::{Deserialize, Serialize};

use crate::field::{FieldId, Value};

use super::defaults::{prerequisites, DERIVED};
use super::shard::{GroupState, GroupTable};
use super::template::{SortOrder, Templates, Tuple};

/// How IP addresses compare when sorting.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AddressOrdering {
    /// Ascending puts IPv6 before IPv4 and orders each family by descending
    /// address bytes, matching the ordering older nfdump tooling produced.
    #[default]
    Legacy,
    /// IPv4 before IPv6, then ascending address bytes.
    Numeric,
}

/// Where a derived field and its inputs live inside a group.
#[derive(Debug, Clone)]
struct DerivedPlan {
    field: FieldId,
    target: usize,
    inputs: Vec<(Tuple, usize)>,
}

/// Collects the derived fields held in the value template, in evaluation
/// order. Derived fields grouped on as keys keep the record's own value.
fn plan_derived(templates: &Templates) -> Vec<DerivedPlan> {
    DERIVED
        .iter()
        .filter_map(|&field| {
            let (tuple, target) = templates.locate(field)?;
            if tuple != Tuple::Value {
                return None;
            }
            let inputs = prerequisites(field)
                .iter()
                .map(|&dep| templates.locate(dep))
                .collect::<Option<Vec<_>>>()?;
            Some(DerivedPlan {
                field,
                target,
                inputs,
            })
        })
        .collect()
}

fn slot(group: &GroupState, (tuple, offset): (Tuple, usize)) -> Option<&Value> {
    match tuple {
        Tuple::Key => group.keys.get(offset),
        Tuple::Value => group.values.get(offset).and_then(Option::as_ref),
    }
}

fn number(v: Option<&Value>) -> f64 {
    v.and_then(Value::as_f64).unwrap_or(0.0)
}

fn duration_ms(first: Option<&Value>, last: Option<&Value>) -> u64 {
    match (first.and_then(Value::as_timestamp), last.and_then(Value::as_timestamp)) {
        (Some(first), Some(last)) => (last - first).num_milliseconds().unsigned_abs(),
        _ => 0,
    }
}

fn per_second(amount: f64, duration_ms: f64) -> f64 {
    if duration_ms == 0.0 {
        return 0.0;
    }
    amount / (duration_ms / 1000.0)
}

/// Computes every planned derived value for one group. Absent inputs count
/// as zero.
fn compute_derived(group: &mut GroupState, plans: &[DerivedPlan]) {
    for plan in plans {
        let input = |i: usize| plan.inputs.get(i).and_then(|loc| slot(group, *loc));
        let value = match plan.field {
            FieldId::CALC_DURATION => Value::U64(duration_ms(input(0), input(1))),
            FieldId::CALC_BPS => Value::F64(per_second(number(input(0)) * 8.0, number(input(1)))),
            FieldId::CALC_PPS => Value::F64(per_second(number(input(0)), number(input(1)))),
            FieldId::CALC_BPP => {
                let packets = number(input(0));
                let bytes = number(input(1));
                Value::F64(if packets == 0.0 { 0.0 } else { bytes / packets })
            }
            _ => continue,
        };
        if let Some(slot) = group.values.get_mut(plan.target) {
            *slot = Some(value);
        }
    }
}

fn addr_cmp(a: &IpAddr, b: &IpAddr, ordering: AddressOrdering) -> Ordering {
    let natural = match (a, b) {
        (IpAddr::V4(a), IpAddr::V4(b)) => a.octets().cmp(&b.octets()),
        (IpAddr::V6(a), IpAddr::V6(b)) => a.octets().cmp(&b.octets()),
        (IpAddr::V4(_), IpAddr::V6(_)) => Ordering::Less,
        (IpAddr::V6(_), IpAddr::V4(_)) => Ordering::Greater,
    };
    match ordering {
        AddressOrdering::Legacy => natural.reverse(),
        AddressOrdering::Numeric => natural,
    }
}

fn variant_rank(v: &Value) -> u8 {
    match v {
        Value::U8(_) => 0,
        Value::U16(_) => 1,
        Value::U32(_) => 2,
        Value::U64(_) => 3,
        Value::F64(_) => 4,
        Value::Timestamp(_) => 5,
        Value::Addr(_) => 6,
        Value::Mac(_) => 7,
        Value::Str(_) => 8,
        Value::Blob(_) => 9,
    }
}

/// Ascending comparison of two optional values. Absent sorts first.
pub fn compare_values(a: Option<&Value>, b: Option<&Value>, ordering: AddressOrdering) -> Ordering {
    let (a, b) = match (a, b) {
        (None, None) => return Ordering::Equal,
        (None, Some(_)) => return Ordering::Less,
        (Some(_), None) => return Ordering::Greater,
        (Some(a), Some(b)) => (a, b),
    };
    match (a, b) {
        (Value::U8(x), Value::U8(y)) => x.cmp(y),
        (Value::U16(x), Value::U16(y)) => x.cmp(y),
        (Value::U32(x), Value::U32(y)) => x.cmp(y),
        (Value::U64(x), Value::U64(y)) => x.cmp(y),
        (Value::F64(x), Value::F64(y)) => x.total_cmp(y),
        (Value::Timestamp(x), Value::Timestamp(y)) => x.cmp(y),
        (Value::Addr(x), Value::Addr(y)) => addr_cmp(x, y, ordering),
        (Value::Mac(x), Value::Mac(y)) => x.cmp(y),
        (Value::Str(x), Value::Str(y)) => x.cmp(y),
        (Value::Blob(x), Value::Blob(y)) => x.cmp(y),
        _ => variant_rank(a).cmp(&variant_rank(b)),
    }
}

/// Computes derived values in place and returns every canonical key in
/// result order. Ties, and the unsorted case, fall back to key order.
pub fn rebuild(table: &GroupTable, templates: &Templates, ordering: AddressOrdering) -> Vec<String> {
    let plans = plan_derived(templates);
    let sort = templates.sort().copied();

    let mut rows: Vec<(String, Option<Value>)> = Vec::new();
    table.for_each_mut(|key, group| {
        compute_derived(group, &plans);
        let sort_value = sort.and_then(|s| slot(group, (s.tuple, s.offset)).cloned());
        rows.push((key.to_string(), sort_value));
    });

    rows.sort_unstable_by(|(ka, va), (kb, vb)| {
        let by_value = match sort {
            Some(s) => {
                let ord = compare_values(va.as_ref(), vb.as_ref(), ordering);
                if s.order == SortOrder::Desc {
                    ord.reverse()
                } else {
                    ord
                }
            }
            None => Ordering::Equal,
        };
        by_value.then_with(|| ka.cmp(kb))
    });

    rows.into_iter().map(|(key, _)| key).collect()
}

#[cfg(test)]
mod tests {
    use chrono::DateTime;

    use super::*;
    use crate::heap::key::render_key;
    use crate::heap::template::AggrKind;

    fn ip(s: &str) -> Value {
        Value::Addr(s.parse().expect("valid address"))
    }

    fn ts(ms: i64) -> Value {
        Value::Timestamp(DateTime::from_timestamp_millis(ms).expect("valid ts"))
    }

    fn sorted(values: &[Value], ordering: AddressOrdering) -> Vec<Value> {
        let mut out = values.to_vec();
        out.sort_by(|a, b| compare_values(Some(a), Some(b), ordering));
        out
    }

    #[test]
    fn test_legacy_address_ordering() {
        let input = [
            ip("192.168.1.1"),
            ip("2001:db8::7917"),
            ip("192.168.1.2"),
            ip("2001:db8::7918"),
        ];
        assert_eq!(
            sorted(&input, AddressOrdering::Legacy),
            vec![
                ip("2001:db8::7918"),
                ip("2001:db8::7917"),
                ip("192.168.1.2"),
                ip("192.168.1.1"),
            ]
        );
    }

    #[test]
    fn test_numeric_address_ordering() {
        let input = [
            ip("2001:db8::7918"),
            ip("192.168.1.2"),
            ip("2001:db8::7917"),
            ip("192.168.1.1"),
        ];
        assert_eq!(
            sorted(&input, AddressOrdering::Numeric),
            vec![
                ip("192.168.1.1"),
                ip("192.168.1.2"),
                ip("2001:db8::7917"),
                ip("2001:db8::7918"),
            ]
        );
    }

    #[test]
    fn test_absent_sorts_first() {
        let v = Value::U64(1);
        assert_eq!(
            compare_values(None, Some(&v), AddressOrdering::Legacy),
            Ordering::Less
        );
        assert_eq!(
            compare_values(Some(&v), None, AddressOrdering::Legacy),
            Ordering::Greater
        );
        assert_eq!(
            compare_values(None, None, AddressOrdering::Legacy),
            Ordering::Equal
        );
    }

    #[test]
    fn test_float_and_time_ordering() {
        assert_eq!(
            sorted(
                &[Value::F64(320.0), Value::F64(80.0), Value::F64(280.0)],
                AddressOrdering::Legacy
            ),
            vec![Value::F64(80.0), Value::F64(280.0), Value::F64(320.0)]
        );
        assert_eq!(
            compare_values(Some(&ts(1)), Some(&ts(2)), AddressOrdering::Legacy),
            Ordering::Less
        );
    }

    fn bps_table(bytes: &[u64]) -> (GroupTable, Templates) {
        let mut t = Templates::default();
        t.configure(FieldId::SRCPORT, AggrKind::Key, SortOrder::None, 0, 0)
            .expect("configure srcport");
        t.configure(FieldId::CALC_BPS, AggrKind::Auto, SortOrder::Asc, 0, 0)
            .expect("configure bps");

        // value tuple: [bps, bytes, duration, first, last]
        let table = GroupTable::new(3);
        for (i, &b) in bytes.iter().enumerate() {
            let keys = vec![Value::U16(i as u16)];
            table.upsert(
                render_key(&keys),
                keys,
                vec![None, Some(Value::U64(b)), None, Some(ts(0)), Some(ts(2_000))],
                t.value(),
            );
        }
        (table, t)
    }

    #[test]
    fn test_rebuild_computes_derived_and_sorts() {
        let (table, t) = bps_table(&[70, 20, 80]);
        let keys = rebuild(&table, &t, AddressOrdering::Legacy);

        let bps: Vec<Option<Value>> = keys
            .iter()
            .map(|k| table.with_group(k, |g| g.values[0].clone()).flatten())
            .collect();
        assert_eq!(
            bps,
            vec![
                Some(Value::F64(80.0)),
                Some(Value::F64(280.0)),
                Some(Value::F64(320.0)),
            ]
        );

        let duration = table
            .with_group(&keys[0], |g| g.values[2].clone())
            .flatten();
        assert_eq!(duration, Some(Value::U64(2_000)));
    }

    #[test]
    fn test_zero_duration_rate_is_zero() {
        let mut group = GroupState {
            keys: vec![],
            values: vec![None, Some(Value::U64(100)), None, Some(ts(5)), Some(ts(5))],
        };
        let mut t = Templates::default();
        t.configure(FieldId::CALC_BPS, AggrKind::Auto, SortOrder::None, 0, 0)
            .expect("configure bps");
        compute_derived(&mut group, &plan_derived(&t));
        assert_eq!(group.values[0], Some(Value::F64(0.0)));
        assert_eq!(group.values[2], Some(Value::U64(0)));
    }

    #[test]
    fn test_packets_per_second() {
        let mut t = Templates::default();
        t.configure(FieldId::CALC_PPS, AggrKind::Auto, SortOrder::None, 0, 0)
            .expect("configure pps");
        // value tuple: [pps, pkts, duration, first, last]
        let mut group = GroupState {
            keys: vec![],
            values: vec![None, Some(Value::U64(10)), None, Some(ts(1_000)), Some(ts(5_000))],
        };
        compute_derived(&mut group, &plan_derived(&t));
        assert_eq!(group.values[0], Some(Value::F64(2.5)));
        assert_eq!(group.values[2], Some(Value::U64(4_000)));

        group.values[4] = Some(ts(1_000));
        compute_derived(&mut group, &plan_derived(&t));
        assert_eq!(group.values[0], Some(Value::F64(0.0)));
    }

    #[test]
    fn test_mac_ordering_is_bytewise() {
        let mac = |s: &str| Value::Mac(s.parse().expect("valid mac"));
        let input = [
            mac("0a:00:00:00:00:01"),
            mac("00:ff:ff:ff:ff:ff"),
            mac("0a:00:00:00:00:00"),
            mac("01:00:00:00:00:00"),
        ];
        assert_eq!(
            sorted(&input, AddressOrdering::Legacy),
            vec![
                mac("00:ff:ff:ff:ff:ff"),
                mac("01:00:00:00:00:00"),
                mac("0a:00:00:00:00:00"),
                mac("0a:00:00:00:00:01"),
            ]
        );
    }

    #[test]
    fn test_bpp_with_zero_packets() {
        let mut t = Templates::default();
        t.configure(FieldId::CALC_BPP, AggrKind::Auto, SortOrder::None, 0, 0)
            .expect("configure bpp");
        // value tuple: [bpp, pkts, bytes]
        let mut group = GroupState {
            keys: vec![],
            values: vec![None, None, Some(Value::U64(100))],
        };
        compute_derived(&mut group, &plan_derived(&t));
        assert_eq!(group.values[0], Some(Value::F64(0.0)));

        group.values[1] = Some(Value::U64(4));
        compute_derived(&mut group, &plan_derived(&t));
        assert_eq!(group.values[0], Some(Value::F64(25.0)));
    }

    #[test]
    fn test_unsorted_rebuild_uses_key_order() {
        let mut t = Templates::default();
        t.configure(FieldId::PROT, AggrKind::Key, SortOrder::None, 0, 0)
            .expect("configure proto");
        let table = GroupTable::new(4);
        for proto in [17u8, 6, 1] {
            let keys = vec![Value::U8(proto)];
            table.upsert(render_key(&keys), keys, vec![], t.value());
        }
        assert_eq!(
            rebuild(&table, &t, AddressOrdering::Legacy),
            vec!["b:17;", "b:1;", "b:6;"]
        );
    }

    #[test]
    fn test_descending_reverses_value_order() {
        let (table, mut t) = bps_table(&[70, 20, 80]);
        t.configure(FieldId::CALC_BPS, AggrKind::Auto, SortOrder::Desc, 0, 0)
            .expect("reconfigure bps");
        let keys = rebuild(&table, &t, AddressOrdering::Legacy);
        assert_eq!(keys, vec!["w:2;", "w:0;", "w:1;"]);
    }
}
