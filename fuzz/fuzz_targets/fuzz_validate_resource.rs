#![no_main]
use libfuzzer_sys::fuzz_target;
use remote_dl::config::DEFAULT_ALLOWED_EXTENSIONS;
use remote_dl::http::{extension_of, validate_resource};

fuzz_target!(|data: &str| {
    let allowed: Vec<String> = DEFAULT_ALLOWED_EXTENSIONS
        .iter()
        .map(|e| e.to_string())
        .collect();

    // validation should never panic on arbitrary UTF-8 strings
    if let Ok(resource) = validate_resource(data, &allowed) {
        assert!(!resource.filename.contains('/'));
        assert!(allowed.contains(&resource.extension));
    }
    let _ = extension_of(data, &allowed);
});
