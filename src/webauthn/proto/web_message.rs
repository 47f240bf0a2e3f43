use crate::webauthn::ceremony::token::AbortToken;
use http::Uri;
use serde_derive::*;

/// Argument of `navigator.credentials.create()`.
#[derive(Serialize, Deserialize, Clone, Debug, Eq, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct CredentialCreationOptions {
    pub public_key: PublicKeyCredentialCreationOptions,
}

/// Argument of `navigator.credentials.get()`. The abort signal is attached by
/// the credentials capability, it never goes through serde.
#[derive(Serialize, Deserialize, Clone, Debug)]
#[serde(rename_all = "camelCase")]
pub struct CredentialRequestOptions {
    pub public_key: PublicKeyCredentialRequestOptions,
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub mediation: Option<CredentialMediationRequirement>,
    #[serde(skip)]
    pub signal: Option<AbortToken>,
}

impl CredentialRequestOptions {
    pub fn is_conditional(&self) -> bool {
        self.mediation == Some(CredentialMediationRequirement::Conditional)
    }
}

#[derive(Serialize, Deserialize, Clone, Debug, Eq, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct PublicKeyCredentialCreationOptions {
    pub rp: PublicKeyCredentialRpEntity,
    pub user: PublicKeyCredentialUserEntity,
    #[serde(with = "serde_bytes")]
    pub challenge: Vec<u8>,
    pub pub_key_cred_params: Vec<PublicKeyCredentialParameters>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub timeout: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub authenticator_selection: Option<AuthenticatorSelectionCriteria>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub attestation: Option<AttestationConveyancePreference>,
}

#[derive(Serialize, Deserialize, Clone, Debug, Eq, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct PublicKeyCredentialRequestOptions {
    #[serde(with = "serde_bytes")]
    pub challenge: Vec<u8>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub timeout: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub rp_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub user_verification: Option<UserVerificationRequirement>,
}

#[derive(Serialize, Deserialize, Clone, Debug, Eq, PartialEq)]
pub struct PublicKeyCredentialRpEntity {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
    pub name: String,
}

#[derive(Serialize, Deserialize, Clone, Debug, Eq, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct PublicKeyCredentialUserEntity {
    #[serde(with = "serde_bytes")]
    pub id: Vec<u8>,
    pub name: String,
    pub display_name: String,
}

#[derive(Serialize, Deserialize, Clone, Debug, Eq, PartialEq)]
pub struct PublicKeyCredentialParameters {
    #[serde(rename = "type")]
    pub auth_type: PublicKeyCredentialType,
    pub alg: i64,
}

#[derive(Serialize, Deserialize, Clone, Debug, Eq, PartialEq)]
pub enum PublicKeyCredentialType {
    #[serde(rename = "public-key")]
    PublicKey,
}

#[derive(Serialize, Deserialize, Clone, Debug, Eq, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct AuthenticatorSelectionCriteria {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub authenticator_attachment: Option<AuthenticatorAttachment>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub require_resident_key: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub resident_key: Option<ResidentKeyRequirement>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub user_verification: Option<UserVerificationRequirement>,
}

#[derive(Serialize, Deserialize, Clone, Debug, Eq, PartialEq)]
#[serde(rename_all = "camelCase")]
pub enum AuthenticatorAttachment {
    Platform,
    #[serde(rename = "cross-platform")]
    CrossPlatform,
}

#[derive(Serialize, Deserialize, Clone, Debug, Eq, PartialEq)]
#[serde(rename_all = "camelCase")]
pub enum ResidentKeyRequirement {
    Required,
    Preferred,
    Discouraged,
}

#[derive(Serialize, Deserialize, Clone, Debug, Eq, PartialEq)]
#[serde(rename_all = "camelCase")]
pub enum UserVerificationRequirement {
    Required,
    Preferred,
    Discouraged,
}

#[derive(Serialize, Deserialize, Clone, Debug, Eq, PartialEq)]
#[serde(rename_all = "camelCase")]
pub enum AttestationConveyancePreference {
    None,
    Indirect,
    Direct,
    Enterprise,
}

// https://w3c.github.io/webappsec-credential-management/#enumdef-credentialmediationrequirement
#[derive(Serialize, Deserialize, Clone, Copy, Debug, Eq, PartialEq)]
#[serde(rename_all = "camelCase")]
pub enum CredentialMediationRequirement {
    Silent,
    Optional,
    Conditional,
    Required,
}

/// Credential handed back by the browser, binary fields copied out of their
/// `ArrayBuffer`s.
#[derive(Serialize, Deserialize, Clone, Debug, Eq, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct PublicKeyCredentialRaw {
    pub id: String,
    #[serde(with = "serde_bytes")]
    pub raw_id: Vec<u8>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub response: Option<AuthenticatorAttestationResponseRaw>,
}

#[derive(Serialize, Deserialize, Clone, Debug, Default, Eq, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct AuthenticatorAttestationResponseRaw {
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub attestation_object: Option<Vec<u8>>,
    #[serde(rename = "clientDataJSON")]
    pub client_data_json: Vec<u8>,
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub authenticator_data: Option<Vec<u8>>,
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub signature: Option<Vec<u8>>,
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub user_handle: Option<Vec<u8>>,
}

#[derive(Serialize, Deserialize, Clone, Debug, Eq, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct CollectedClientData {
    #[serde(rename = "type")]
    pub request_type: String,
    pub challenge: String,
    pub origin: String,
    #[serde(default, skip_serializing_if = "std::ops::Not::not")]
    pub cross_origin: bool,
}

pub fn get_default_rp_id(origin: &str) -> String {
    origin
        .parse::<Uri>()
        .ok()
        .and_then(|u| u.authority().map(|a| a.host().to_string()))
        .unwrap_or(origin.to_string())
}

#[test]
fn test_default_rp_id() {
    assert_eq!(get_default_rp_id("https://login.example.com:1337"), "login.example.com");
    assert_eq!(get_default_rp_id("https://login.example.com"), "login.example.com");
    assert_eq!(get_default_rp_id("http://login.example.com:1337"), "login.example.com");
    assert_eq!(get_default_rp_id("http://login.example.com"), "login.example.com");
    assert_eq!(get_default_rp_id("login.example.com:1337"), "login.example.com");
    assert_eq!(get_default_rp_id("login.example.com"), "login.example.com");
}

#[test]
fn test_request_options_shape() {
    let options = CredentialRequestOptions {
        public_key: PublicKeyCredentialRequestOptions {
            challenge: vec![1, 2, 3],
            timeout: Some(60000),
            rp_id: Some("localhost".to_owned()),
            user_verification: Some(UserVerificationRequirement::Required),
        },
        mediation: Some(CredentialMediationRequirement::Conditional),
        signal: None,
    };

    let value = serde_json::to_value(&options).unwrap();
    assert_eq!(
        value,
        serde_json::json!({
            "publicKey": {
                "challenge": [1, 2, 3],
                "timeout": 60000,
                "rpId": "localhost",
                "userVerification": "required"
            },
            "mediation": "conditional"
        })
    );
    assert!(options.is_conditional());
}

#[test]
fn test_collected_client_data() {
    let client_data: CollectedClientData =
        serde_json::from_str(r#"{"type":"webauthn.get","challenge":"AQID","origin":"https://localhost","crossOrigin":false}"#).unwrap();
    assert_eq!(client_data.request_type, "webauthn.get");
    assert_eq!(client_data.challenge, "AQID");
    assert!(!client_data.cross_origin);
}
