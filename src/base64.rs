pub use base64::Engine;
use base64::{
    alphabet,
    engine::{DecodePaddingMode, GeneralPurpose, GeneralPurposeConfig},
};

const CONFIG_NO_PAD: GeneralPurposeConfig = GeneralPurposeConfig::new()
    .with_encode_padding(false)
    .with_decode_padding_mode(DecodePaddingMode::Indifferent)
    .with_decode_allow_trailing_bits(true);

/// Encoding used by `PublicKeyCredential.id` and the client data challenge.
pub const BASE64_URLSAFE_NOPAD: GeneralPurpose = GeneralPurpose::new(&alphabet::URL_SAFE, CONFIG_NO_PAD);

#[test]
fn test_urlsafe_no_pad() {
    assert_eq!(BASE64_URLSAFE_NOPAD.encode([0xfbu8, 0xff]), "-_8");
    assert_eq!(BASE64_URLSAFE_NOPAD.decode("-_8=").unwrap(), vec![0xfb, 0xff]);
}

#[test]
fn test_engine_reexport_decodes_challenge() {
    use crate::base64::Engine as _;

    let challenge = [0x3eu8; 32];
    let encoded = BASE64_URLSAFE_NOPAD.encode(challenge);
    assert!(!encoded.contains('='));
    assert_eq!(BASE64_URLSAFE_NOPAD.decode(encoded).unwrap(), challenge.to_vec());
}
