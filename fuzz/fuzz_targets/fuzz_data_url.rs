#![no_main]

//! Fuzz target for the data URL decoder.
//!
//! Stored drafts carry their photo inline, so the decoder sees whatever
//! ended up in the draft table. It must reject garbage without panicking.

use libfuzzer_sys::fuzz_target;

use konnekt::dataurl;

fuzz_target!(|input: &str| {
    if let Ok(image) = dataurl::decode(input) {
        // Re-encoding what we decoded must decode to the same bytes
        let again = dataurl::encode(&image.mime, &image.bytes);
        let decoded = dataurl::decode(&again).expect("re-encoded data URL must decode");
        assert_eq!(decoded.bytes, image.bytes);
    }

    let _ = dataurl::extension(input);
    let _ = dataurl::mime_for_name(input);
});
