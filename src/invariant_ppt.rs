//! Invariant checks with contract-test bookkeeping
//!
//! Pipeline code asserts its structural invariants through
//! [`assert_invariant!`]. Every checked invariant is remembered per thread so
//! tests can prove, via [`contract_test`], that the code path they exercised
//! actually reached the check instead of silently skipping it.
//!
//! ```rust,ignore
//! use crabcorder::assert_invariant;
//!
//! assert_invariant!(
//!     ready_len <= capacity,
//!     "Ready queue never exceeds capacity",
//!     "pool::publish"
//! );
//!
//! #[test]
//! fn contract_pool() {
//!     // ... drive the pool ...
//!     crabcorder::invariant_ppt::contract_test("pool", &[
//!         "Ready queue never exceeds capacity",
//!     ]);
//! }
//! ```

use std::cell::RefCell;
use std::collections::HashMap;
use std::thread_local;

thread_local! {
    static CHECKED: RefCell<HashMap<String, u64>> = RefCell::new(HashMap::new());
}

/// Assert a pipeline invariant and record that it was checked.
///
/// Panics with the message (and optional context) when the condition is false.
#[macro_export]
macro_rules! assert_invariant {
    ($condition:expr, $message:expr) => {
        $crate::invariant_ppt::__check_invariant($condition, $message, None)
    };
    ($condition:expr, $message:expr, $context:expr) => {
        $crate::invariant_ppt::__check_invariant($condition, $message, Some($context))
    };
}

#[doc(hidden)]
pub fn __check_invariant(condition: bool, message: &str, context: Option<&str>) {
    CHECKED.with(|checked| {
        *checked.borrow_mut().entry(message.to_string()).or_insert(0) += 1;
    });

    if !condition {
        panic!(
            "INVARIANT VIOLATION [{}]: {}",
            context.unwrap_or("unknown"),
            message
        );
    }
}

/// Panic unless every listed invariant was checked on this thread.
pub fn contract_test(test_name: &str, required_invariants: &[&str]) {
    let missing: Vec<&str> = CHECKED.with(|checked| {
        let checked = checked.borrow();
        required_invariants
            .iter()
            .copied()
            .filter(|inv| !checked.contains_key(*inv))
            .collect()
    });

    if !missing.is_empty() {
        panic!(
            "CONTRACT FAILURE [{}]: invariants never checked:\n  - {}",
            test_name,
            missing.join("\n  - ")
        );
    }
}

/// How many times an invariant has been checked on this thread
pub fn check_count(message: &str) -> u64 {
    CHECKED.with(|checked| checked.borrow().get(message).copied().unwrap_or(0))
}

pub fn clear_invariant_log() {
    CHECKED.with(|checked| checked.borrow_mut().clear());
}
