#![no_main]

use cybersim::Profile;
use libfuzzer_sys::fuzz_target;

fuzz_target!(|data: &[u8]| {
    let s = String::from_utf8_lossy(data);

    let Ok(profile) = s.parse::<Profile>() else {
        return;
    };

    let canonical = profile.to_string();
    let reparsed: Profile = canonical
        .parse()
        .unwrap_or_else(|e| panic!("canonical descriptor {:?} rejected: {}", canonical, e));
    assert_eq!(reparsed, profile);

    let mut merged = profile.clone();
    assert_eq!(merged.merge(&profile), 0);
});
