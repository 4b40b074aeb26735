#![no_main]
use libfuzzer_sys::fuzz_target;
use mirrorkit_core::mirror::MirrorLocator;
use mirrorkit_core::submodule::resolve_submodule_url;

fuzz_target!(|data: &[u8]| {
    if let Ok(url) = std::str::from_utf8(data) {
        let once = MirrorLocator::normalize_url(url);
        // Normalizing twice changes nothing
        assert_eq!(MirrorLocator::normalize_url(&once), once);
        assert_eq!(MirrorLocator::dir_name(url), MirrorLocator::dir_name(&once));
        let _ = resolve_submodule_url(url, "../sibling.git");
    }
});
