#![no_main]
use libfuzzer_sys::fuzz_target;
use sectorex::{Flag, Flags, Regex};

fuzz_target!(|data: &[u8]| {
    let Ok(pattern) = std::str::from_utf8(data) else {
        return;
    };
    if let Ok(re) = Regex::new(pattern, Flags::none().with(Flag::Sector)) {
        let _ = re.find_all(data);
    }
});
