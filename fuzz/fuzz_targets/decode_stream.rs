#![no_main]
use ldap_codec::{encode, Decoder};
use libfuzzer_sys::fuzz_target;

fuzz_target!(|data: &[u8]| {
    // whole-buffer feed
    let mut whole = Decoder::new();
    let whole_result = whole.feed(data);

    // byte-at-a-time feed must agree with the whole-buffer feed
    let mut fragmented = Decoder::new();
    let mut frag_result = Ok(0);
    for byte in data {
        frag_result = fragmented.feed(std::slice::from_ref(byte));
        if frag_result.is_err() {
            break;
        }
    }
    assert_eq!(whole_result.is_ok(), frag_result.is_ok());

    // every decoded message must survive re-encoding
    while let Ok(Some(msg)) = whole.next_message() {
        let _ = encode(&msg);
    }
});
