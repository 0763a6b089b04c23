#![no_main]

use libfuzzer_sys::fuzz_target;

fuzz_target!(|data: &[u8]| {
    let s = String::from_utf8_lossy(data);

    let def = match cybersim::parse(&s) {
        Ok(d) => d,
        Err(_) => return,
    };

    if !cybersim::validate(&def).is_valid() {
        return;
    }
    let normalized = cybersim::normalize(def);

    let yaml = match cybersim::serialize(&normalized) {
        Ok(y) => y,
        Err(_) => return,
    };

    // A valid, normalized network must survive serialization unchanged.
    match cybersim::parse(&yaml) {
        Ok(reparsed) => assert_eq!(reparsed, normalized, "round trip changed the network"),
        Err(e) => panic!(
            "serialize produced YAML that cannot be re-parsed: {}\n\
             Input (lossy): {:?}\n\
             Serialized YAML:\n{}",
            e,
            s.get(..200).unwrap_or(&s),
            yaml.get(..500).unwrap_or(&yaml),
        ),
    }
});
