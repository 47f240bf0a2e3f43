pub const WEBAUTHN_CHALLENGE_LENGTH: usize = 32;
pub const WEBAUTHN_USER_ID_LENGTH: usize = 32;

pub const WEBAUTHN_RP_ID_HASH_LENGTH: usize = 32;
pub const WEBAUTHN_AUTH_DATA_MIN_LENGTH: usize = 37;

pub const WEBAUTHN_USER_PRESENT_FLAG: u8 = 0b00000001;
pub const WEBAUTHN_USER_VERIFIED_FLAG: u8 = 0b00000100;
pub const WEBAUTHN_BACKUP_ELIGIBLE_FLAG: u8 = 0b00001000;
pub const WEBAUTHN_BACKUP_STATE_FLAG: u8 = 0b00010000;
pub const WEBAUTHN_ATTESTED_CREDENTIAL_DATA_FLAG: u8 = 0b01000000;
pub const WEBAUTHN_EXTENSION_DATA_FLAG: u8 = 0b10000000;

pub const WEBAUTHN_COSE_ALGORITHM_IDENTIFIER_ES256: i64 = -7;
pub const WEBAUTHN_COSE_ALGORITHM_IDENTIFIER_RS256: i64 = -257;

pub const WEBAUTHN_DEFAULT_TIMEOUT_MS: u64 = 60_000;
