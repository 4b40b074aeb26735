#![no_main]
use libfuzzer_sys::fuzz_target;
use mirrorkit_core::submodule::SubmodulesConfig;

fuzz_target!(|data: &[u8]| {
    let text = String::from_utf8_lossy(data);
    if let Ok(config) = SubmodulesConfig::parse(&text) {
        for entry in config.entries() {
            assert_eq!(config.find(&entry.path).map(|e| &e.path), Some(&entry.path));
            let _ = config.is_submodule_prefix(&entry.path);
        }
    }
});
