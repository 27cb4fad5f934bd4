//! Tests for the ring buffer container.

use emeter_rs::timeseries::RingBuff;

/// Overwrite semantics: capacity 3, five pushes keep the newest three.
#[test]
fn test_overwrite_keeps_newest() {
    let mut ring = RingBuff::new(3);
    for v in [10, 20, 30, 40, 50] {
        ring.push(v);
    }
    assert_eq!(ring.len(), 3);
    assert_eq!(ring.iter().copied().collect::<Vec<_>>(), vec![30, 40, 50]);
}

/// Reverse iteration visits the same elements newest-first.
#[test]
fn test_reverse_iteration() {
    let mut ring = RingBuff::new(3);
    for v in [10, 20, 30, 40, 50] {
        ring.push(v);
    }
    assert_eq!(
        ring.iter().rev().copied().collect::<Vec<_>>(),
        vec![50, 40, 30]
    );
}

/// For any push count the iterator length is min(total, capacity) and the
/// two directions agree.
#[test]
fn test_iterator_length_invariant() {
    for total in 0..12usize {
        let mut ring = RingBuff::new(5);
        for v in 0..total {
            ring.push(v);
        }
        let fwd: Vec<_> = ring.iter().copied().collect();
        let mut rev: Vec<_> = ring.iter().rev().copied().collect();
        rev.reverse();
        assert_eq!(fwd.len(), total.min(5));
        assert_eq!(fwd, rev);
    }
}

/// `at` indexes from the oldest retained element.
#[test]
fn test_at_offsets() {
    let mut ring = RingBuff::new(4);
    for v in [1, 2, 3, 4, 5, 6] {
        ring.push(v);
    }
    assert_eq!(ring.at(0), Some(&3));
    assert_eq!(ring.at(3), Some(&6));
    assert_eq!(ring.at(4), None);
}

/// Iterator arithmetic through the standard adapters.
#[test]
fn test_random_access_through_adapters() {
    let mut ring = RingBuff::new(8);
    for v in 0..8 {
        ring.push(v * 10);
    }
    let mut it = ring.iter();
    assert_eq!(it.len(), 8);
    assert_eq!(it.nth(2), Some(&20));
    assert_eq!(it.next_back(), Some(&70));
    assert_eq!(it.len(), 4);
}

/// A zero-capacity buffer is inert and drops every push.
#[test]
fn test_inert_buffer_drops_pushes() {
    let mut ring: RingBuff<u32> = RingBuff::new(0);
    assert!(ring.is_inert());
    ring.push(1);
    ring.push(2);
    assert_eq!(ring.len(), 0);
    assert!(ring.iter().next().is_none());
}
