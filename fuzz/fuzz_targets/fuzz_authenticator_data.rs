#![no_main]
#[macro_use] extern crate libfuzzer_sys;
extern crate passkey_ceremony;

use passkey_ceremony::webauthn::{error::Error, proto::{constants::WEBAUTHN_AUTH_DATA_MIN_LENGTH, raw_message::AuthenticatorData}};

fuzz_target!(|data: &[u8]| {
    match AuthenticatorData::from_slice(data) {
        Ok(auth_data) => {
            assert!(data.len() >= WEBAUTHN_AUTH_DATA_MIN_LENGTH);
            assert_eq!(auth_data.flags_byte, data[32]);
            let _ = auth_data.flags.entries();
        }
        Err(e) => assert_eq!(e, Error::MalformedAuthenticatorData { len: data.len() }),
    }
});
