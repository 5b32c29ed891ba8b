//! Assertion helpers for recorded recompute calls.

use arbor_core::ViewId;

use crate::arena::LayoutCall;

/// Views that received a sizing recompute, in call order.
pub fn sizing_order(calls: &[LayoutCall]) -> Vec<ViewId> {
    calls
        .iter()
        .filter(|call| call.is_sizing())
        .map(|call| call.view())
        .collect()
}

/// Views that received a layout recompute, in call order.
pub fn layout_order(calls: &[LayoutCall]) -> Vec<ViewId> {
    calls
        .iter()
        .filter(|call| !call.is_sizing())
        .map(|call| call.view())
        .collect()
}

/// Assert that `first` was recorded strictly before `second`.
pub fn assert_called_before(calls: &[LayoutCall], first: LayoutCall, second: LayoutCall) {
    let first_index = calls.iter().position(|call| *call == first);
    let second_index = calls.iter().position(|call| *call == second);
    match (first_index, second_index) {
        (Some(a), Some(b)) => assert!(
            a < b,
            "expected {:?} before {:?}, got positions {} and {} in {:?}",
            first,
            second,
            a,
            b,
            calls
        ),
        _ => panic!(
            "expected both {:?} and {:?} to be recorded in {:?}",
            first, second, calls
        ),
    }
}

/// Assert that `call` was recorded exactly `expected` times.
pub fn assert_call_count(calls: &[LayoutCall], call: LayoutCall, expected: usize) {
    let count = calls.iter().filter(|recorded| **recorded == call).count();
    assert_eq!(
        count, expected,
        "{:?} recorded {} times, expected {} in {:?}",
        call, count, expected, calls
    );
}
