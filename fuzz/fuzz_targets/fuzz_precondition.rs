#![no_main]

use arbitrary::{Arbitrary, Unstructured};
use cybersim::precondition::{Precondition, Truth};
use libfuzzer_sys::fuzz_target;

fuzz_target!(|data: &[u8]| {
    let mut u = Unstructured::new(data);

    let input = match String::arbitrary(&mut u) {
        Ok(s) => s,
        Err(_) => return,
    };
    let seed = u64::arbitrary(&mut u).unwrap_or(0);

    let Ok(precondition) = Precondition::parse(&input) else {
        return;
    };

    // Any resolver, including one answering Unknown, must evaluate without panicking.
    let resolver = |symbol: &str| match (symbol.len() as u64 ^ seed) % 3 {
        0 => Truth::True,
        1 => Truth::False,
        _ => Truth::Unknown,
    };
    let first = precondition.evaluate(&resolver);

    // Re-parsing the displayed text yields the same verdict.
    let again = Precondition::parse(&precondition.to_string())
        .expect("displayed precondition must parse");
    assert_eq!(first, again.evaluate(&resolver));
});
