#![no_main]
use libfuzzer_sys::fuzz_target;
use mirrorkit_core::git::Revision;

fuzz_target!(|data: &[u8]| {
    if let Ok(version) = std::str::from_utf8(data) {
        if let Ok(oid) = Revision::parse(version) {
            let sha = Revision::version_revision(version);
            assert!(oid.to_string().eq_ignore_ascii_case(sha));
        }
    }
});
