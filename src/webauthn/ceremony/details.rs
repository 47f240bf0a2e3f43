use crate::webauthn::{
    error::Error,
    proto::{
        raw_message::{to_hex, AuthenticatorData},
        web_message::{CollectedClientData, PublicKeyCredentialRaw},
    },
};
use serde_derive::*;

/// What the page renders after a successful assertion.
#[derive(Serialize, Clone, Debug, Eq, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct AssertionDetails {
    pub credential_id: String,
    pub authenticator_data: AuthenticatorData,
    #[serde(rename = "clientDataJSON")]
    pub client_data_json: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub client_data: Option<CollectedClientData>,
    pub signature: String,
}

impl AssertionDetails {
    pub fn from_credential(credential: &PublicKeyCredentialRaw) -> Result<Self, Error> {
        let response = credential
            .response
            .as_ref()
            .ok_or_else(|| Error::Other("Credential carries no authenticator response".to_string()))?;

        let authenticator_data = AuthenticatorData::from_slice(response.authenticator_data.as_deref().unwrap_or_default())?;

        Ok(AssertionDetails {
            credential_id: to_hex(&credential.raw_id),
            authenticator_data,
            client_data_json: String::from_utf8_lossy(&response.client_data_json).into_owned(),
            client_data: serde_json::from_slice(&response.client_data_json).ok(),
            signature: to_hex(response.signature.as_deref().unwrap_or_default()),
        })
    }

    pub fn rp_id_hash(&self) -> String {
        self.authenticator_data.rp_id_hash_hex()
    }

    pub fn flags_byte(&self) -> String {
        self.authenticator_data.flags_hex()
    }

    pub fn sign_count(&self) -> u32 {
        self.authenticator_data.sign_count
    }
}

#[cfg(test)]
use crate::webauthn::proto::web_message::AuthenticatorAttestationResponseRaw;

#[cfg(test)]
fn assertion(authenticator_data: Option<Vec<u8>>) -> PublicKeyCredentialRaw {
    PublicKeyCredentialRaw {
        id: "AAr_".to_owned(),
        raw_id: vec![0x00, 0x0a, 0xff],
        response: Some(AuthenticatorAttestationResponseRaw {
            client_data_json: br#"{"type":"webauthn.get","challenge":"AQID","origin":"https://localhost"}"#.to_vec(),
            authenticator_data,
            signature: Some(vec![0x30, 0x45]),
            ..Default::default()
        }),
    }
}

#[test]
fn test_details_from_assertion() {
    let mut auth_data = vec![0x11u8; 32];
    auth_data.push(0x05);
    auth_data.extend_from_slice(&[0, 0, 0, 42]);

    let details = AssertionDetails::from_credential(&assertion(Some(auth_data))).unwrap();
    assert_eq!(details.credential_id, "000aff");
    assert_eq!(details.signature, "3045");
    assert_eq!(details.flags_byte(), "05");
    assert_eq!(details.sign_count(), 42);
    assert_eq!(details.rp_id_hash(), "11".repeat(32));
    assert!(details.authenticator_data.flags.user_present);
    assert!(details.authenticator_data.flags.user_verified);
    assert_eq!(details.client_data.unwrap().origin, "https://localhost");
}

#[test]
fn test_details_malformed_authenticator_data() {
    assert_eq!(
        AssertionDetails::from_credential(&assertion(Some(vec![0u8; 10]))),
        Err(Error::MalformedAuthenticatorData { len: 10 })
    );
    assert_eq!(
        AssertionDetails::from_credential(&assertion(None)),
        Err(Error::MalformedAuthenticatorData { len: 0 })
    );
}

#[test]
fn test_details_without_response() {
    let credential = PublicKeyCredentialRaw {
        id: String::new(),
        raw_id: vec![],
        response: None,
    };
    assert!(matches!(AssertionDetails::from_credential(&credential), Err(Error::Other(_))));
}
