#![no_main]

use courier_e2e::{generate_key_pair, EnvelopeCodec, Identity, MessageEnvelope, PrivateKey};
use libfuzzer_sys::fuzz_target;
use once_cell::sync::Lazy;

static KEY: Lazy<PrivateKey> = Lazy::new(|| {
    let kp = generate_key_pair(2048).expect("keygen");
    PrivateKey::from_pem(&kp.private_key_pem).expect("pem")
});

fuzz_target!(|data: &[u8]| {
    let Ok(json) = std::str::from_utf8(data) else {
        return;
    };
    let Ok(envelope) = MessageEnvelope::from_json(json) else {
        return;
    };
    let codec = EnvelopeCodec::new();
    let _ = codec.open_with_key(&envelope, &KEY, &Identity::new("fuzz"));
    let _ = codec.open_with_key(&envelope, &KEY, &envelope.sender);
});
