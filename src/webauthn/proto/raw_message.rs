use crate::webauthn::{
    error::Error,
    proto::constants::{
        WEBAUTHN_ATTESTED_CREDENTIAL_DATA_FLAG, WEBAUTHN_AUTH_DATA_MIN_LENGTH, WEBAUTHN_BACKUP_ELIGIBLE_FLAG, WEBAUTHN_BACKUP_STATE_FLAG,
        WEBAUTHN_EXTENSION_DATA_FLAG, WEBAUTHN_RP_ID_HASH_LENGTH, WEBAUTHN_USER_PRESENT_FLAG, WEBAUTHN_USER_VERIFIED_FLAG,
    },
};
use byteorder::{BigEndian, ReadBytesExt};
use serde_derive::*;
use std::io::{Cursor, Read};

#[derive(Clone, Copy, Debug, Eq, PartialEq)]
#[repr(u8)]
pub enum AttestationFlags {
    UserPresent = WEBAUTHN_USER_PRESENT_FLAG,
    //Reserved for future use = 2
    UserVerified = WEBAUTHN_USER_VERIFIED_FLAG,
    BackupEligible = WEBAUTHN_BACKUP_ELIGIBLE_FLAG,
    BackupState = WEBAUTHN_BACKUP_STATE_FLAG,
    //Reserved for future use = 32
    AttestedCredentialDataIncluded = WEBAUTHN_ATTESTED_CREDENTIAL_DATA_FLAG,
    ExtensionDataIncluded = WEBAUTHN_EXTENSION_DATA_FLAG,
}

impl AttestationFlags {
    pub fn name(&self) -> &'static str {
        match self {
            AttestationFlags::UserPresent => "userPresent",
            AttestationFlags::UserVerified => "userVerified",
            AttestationFlags::BackupEligible => "backupEligible",
            AttestationFlags::BackupState => "backupState",
            AttestationFlags::AttestedCredentialDataIncluded => "attestedCredentialData",
            AttestationFlags::ExtensionDataIncluded => "extensionDataIncluded",
        }
    }

    pub fn is_set(&self, flags: u8) -> bool {
        flags & *self as u8 != 0
    }
}

/// Boolean view of the authenticator data flags byte. Reserved bits 1 and 5
/// are not surfaced.
#[derive(Serialize, Clone, Copy, Debug, Default, Eq, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct AuthenticatorFlags {
    pub user_present: bool,
    pub user_verified: bool,
    pub backup_eligible: bool,
    pub backup_state: bool,
    pub attested_credential_data: bool,
    pub extension_data_included: bool,
}

impl From<u8> for AuthenticatorFlags {
    fn from(flags: u8) -> Self {
        AuthenticatorFlags {
            user_present: AttestationFlags::UserPresent.is_set(flags),
            user_verified: AttestationFlags::UserVerified.is_set(flags),
            backup_eligible: AttestationFlags::BackupEligible.is_set(flags),
            backup_state: AttestationFlags::BackupState.is_set(flags),
            attested_credential_data: AttestationFlags::AttestedCredentialDataIncluded.is_set(flags),
            extension_data_included: AttestationFlags::ExtensionDataIncluded.is_set(flags),
        }
    }
}

impl AuthenticatorFlags {
    /// Flags paired with their display names, in bit order.
    pub fn entries(&self) -> [(&'static str, bool); 6] {
        [
            (AttestationFlags::UserPresent.name(), self.user_present),
            (AttestationFlags::UserVerified.name(), self.user_verified),
            (AttestationFlags::BackupEligible.name(), self.backup_eligible),
            (AttestationFlags::BackupState.name(), self.backup_state),
            (AttestationFlags::AttestedCredentialDataIncluded.name(), self.attested_credential_data),
            (AttestationFlags::ExtensionDataIncluded.name(), self.extension_data_included),
        ]
    }
}

/// Fixed-layout prefix of the authenticator data:
/// `rpIdHash[32] | flags[1] | signCount[4, big endian]`.
///
/// Attested credential data and extensions that may follow are not decoded.
#[derive(Serialize, Clone, Debug, Eq, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct AuthenticatorData {
    pub rp_id_hash: [u8; WEBAUTHN_RP_ID_HASH_LENGTH],
    pub flags: AuthenticatorFlags,
    pub flags_byte: u8,
    pub sign_count: u32,
}

impl AuthenticatorData {
    pub fn from_slice(data: &[u8]) -> Result<Self, Error> {
        let len = data.len();
        if len < WEBAUTHN_AUTH_DATA_MIN_LENGTH {
            return Err(Error::MalformedAuthenticatorData { len });
        }

        let mut cursor = Cursor::new(data);

        let mut rp_id_hash = [0u8; WEBAUTHN_RP_ID_HASH_LENGTH];
        cursor
            .read_exact(&mut rp_id_hash)
            .map_err(|_| Error::MalformedAuthenticatorData { len })?;

        let flags_byte = cursor.read_u8().map_err(|_| Error::MalformedAuthenticatorData { len })?;

        let sign_count = cursor
            .read_u32::<BigEndian>()
            .map_err(|_| Error::MalformedAuthenticatorData { len })?;

        Ok(AuthenticatorData {
            rp_id_hash,
            flags: AuthenticatorFlags::from(flags_byte),
            flags_byte,
            sign_count,
        })
    }

    pub fn rp_id_hash_hex(&self) -> String {
        to_hex(self.rp_id_hash)
    }

    pub fn flags_hex(&self) -> String {
        to_hex([self.flags_byte])
    }
}

/// Two lowercase hex digits per byte, no separators.
pub fn to_hex(bytes: impl AsRef<[u8]>) -> String {
    hex::encode(bytes)
}

#[cfg(test)]
fn auth_data_with(flags: u8, sign_count: [u8; 4]) -> Vec<u8> {
    let mut data = vec![0xabu8; WEBAUTHN_RP_ID_HASH_LENGTH];
    data.push(flags);
    data.extend_from_slice(&sign_count);
    data
}

#[test]
fn test_all_zero_auth_data() {
    let auth_data = AuthenticatorData::from_slice(&[0u8; 37]).unwrap();
    assert_eq!(auth_data.flags, AuthenticatorFlags::default());
    assert_eq!(auth_data.flags_byte, 0);
    assert_eq!(auth_data.sign_count, 0);
    assert_eq!(auth_data.rp_id_hash, [0u8; 32]);
}

#[test]
fn test_flags_bit_assignment() {
    let auth_data = AuthenticatorData::from_slice(&auth_data_with(0xC5, [0, 0, 0, 0])).unwrap();
    assert_eq!(
        auth_data.flags,
        AuthenticatorFlags {
            user_present: true,
            user_verified: true,
            backup_eligible: false,
            backup_state: false,
            attested_credential_data: true,
            extension_data_included: true,
        }
    );
    assert_eq!(auth_data.flags_hex(), "c5");
    assert!(AttestationFlags::UserVerified.is_set(auth_data.flags_byte));
    assert!(!AttestationFlags::BackupState.is_set(auth_data.flags_byte));

    // bits 1 and 5 are reserved
    let reserved = AuthenticatorData::from_slice(&auth_data_with(0b0010_0010, [0, 0, 0, 0])).unwrap();
    assert_eq!(reserved.flags, AuthenticatorFlags::default());
    assert_eq!(reserved.flags_byte, 0x22);

    let backup = AuthenticatorData::from_slice(&auth_data_with(0b0001_1000, [0, 0, 0, 0])).unwrap();
    assert!(backup.flags.backup_eligible);
    assert!(backup.flags.backup_state);
    assert!(!backup.flags.user_present);
}

#[test]
fn test_sign_count_big_endian() {
    let one = AuthenticatorData::from_slice(&auth_data_with(0x01, [0x00, 0x00, 0x00, 0x01])).unwrap();
    assert_eq!(one.sign_count, 1);

    let max = AuthenticatorData::from_slice(&auth_data_with(0x01, [0xFF, 0xFF, 0xFF, 0xFF])).unwrap();
    assert_eq!(max.sign_count, u32::MAX);

    let mixed = AuthenticatorData::from_slice(&auth_data_with(0x01, [0x01, 0x02, 0x03, 0x04])).unwrap();
    assert_eq!(mixed.sign_count, 0x01020304);
}

#[test]
fn test_short_auth_data_is_malformed() {
    assert_eq!(AuthenticatorData::from_slice(&[]), Err(Error::MalformedAuthenticatorData { len: 0 }));
    assert_eq!(
        AuthenticatorData::from_slice(&[0u8; 36]),
        Err(Error::MalformedAuthenticatorData { len: 36 })
    );
}

#[test]
fn test_trailing_data_is_ignored() {
    let mut data = auth_data_with(0x45, [0, 0, 0, 7]);
    data.extend_from_slice(&[0xEE; 40]);
    let auth_data = AuthenticatorData::from_slice(&data).unwrap();
    assert_eq!(auth_data.sign_count, 7);
    assert!(auth_data.flags.attested_credential_data);
    assert_eq!(auth_data.rp_id_hash_hex(), "ab".repeat(32));
}

#[test]
fn test_to_hex() {
    assert_eq!(to_hex([0x00u8, 0x0A, 0xFF]), "000aff");
    assert_eq!(to_hex([0u8; 0]), "");
}

#[test]
fn test_flag_entries_order() {
    let names: Vec<&str> = AuthenticatorFlags::from(0xFF).entries().iter().map(|(name, _)| *name).collect();
    assert_eq!(
        names,
        vec![
            "userPresent",
            "userVerified",
            "backupEligible",
            "backupState",
            "attestedCredentialData",
            "extensionDataIncluded"
        ]
    );
    assert!(AuthenticatorFlags::from(0xFF).entries().iter().all(|(_, set)| *set));
}
