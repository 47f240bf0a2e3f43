use crate::webauthn::{
    ceremony::token::AbortToken,
    error::Error,
    proto::{
        constants::{
            WEBAUTHN_CHALLENGE_LENGTH, WEBAUTHN_COSE_ALGORITHM_IDENTIFIER_ES256, WEBAUTHN_COSE_ALGORITHM_IDENTIFIER_RS256,
            WEBAUTHN_USER_ID_LENGTH,
        },
        web_message::{
            AttestationConveyancePreference, AuthenticatorAttachment, AuthenticatorSelectionCriteria, CredentialCreationOptions,
            CredentialMediationRequirement, CredentialRequestOptions, PublicKeyCredentialCreationOptions, PublicKeyCredentialParameters,
            PublicKeyCredentialRequestOptions, PublicKeyCredentialRpEntity, PublicKeyCredentialType, PublicKeyCredentialUserEntity,
            ResidentKeyRequirement, UserVerificationRequirement,
        },
    },
};
use rand_core::{OsRng, RngCore};

/// Fresh random challenge, one per ceremony.
pub fn gen_challenge() -> [u8; WEBAUTHN_CHALLENGE_LENGTH] {
    let mut challenge = [0u8; WEBAUTHN_CHALLENGE_LENGTH];
    OsRng.fill_bytes(&mut challenge);
    challenge
}

/// Random user handle; the demo has no account behind it.
pub fn gen_user_id() -> [u8; WEBAUTHN_USER_ID_LENGTH] {
    let mut user_id = [0u8; WEBAUTHN_USER_ID_LENGTH];
    OsRng.fill_bytes(&mut user_id);
    user_id
}

/// Builds the options of a platform passkey registration: ES256 or RS256,
/// discoverable credential and user verification required, no attestation.
#[derive(Default)]
pub struct CredentialCreationBuilder {
    challenge: Option<Vec<u8>>,
    user: Option<User>,
    rp: Option<Rp>,
    timeout: Option<u64>,
}

impl CredentialCreationBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn challenge(mut self, challenge: impl Into<Vec<u8>>) -> Self {
        self.challenge = Some(challenge.into());
        self
    }

    pub fn user(mut self, id: impl Into<Vec<u8>>, name: String, display_name: String) -> Self {
        self.user = Some(User {
            id: id.into(),
            name,
            display_name,
        });
        self
    }

    pub fn rp(mut self, name: String, id: Option<String>) -> Self {
        self.rp = Some(Rp { name, id });
        self
    }

    pub fn timeout(mut self, timeout_ms: u64) -> Self {
        self.timeout = Some(timeout_ms);
        self
    }

    pub fn build(self) -> Result<CredentialCreationOptions, Error> {
        let challenge = self
            .challenge
            .ok_or_else(|| Error::Other("Unable to build a WebAuthn request without a challenge".to_string()))?;

        let user = self
            .user
            .map(|user| PublicKeyCredentialUserEntity {
                id: user.id,
                name: user.name,
                display_name: user.display_name,
            })
            .ok_or_else(|| Error::Other("Unable to build a WebAuthn request without a user".to_string()))?;

        let rp = self
            .rp
            .map(|rp| PublicKeyCredentialRpEntity { id: rp.id, name: rp.name })
            .ok_or_else(|| Error::Other("Unable to build a WebAuthn request without a relying party".to_string()))?;

        Ok(CredentialCreationOptions {
            public_key: PublicKeyCredentialCreationOptions {
                rp,
                user,
                challenge,
                pub_key_cred_params: vec![
                    PublicKeyCredentialParameters {
                        auth_type: PublicKeyCredentialType::PublicKey,
                        alg: WEBAUTHN_COSE_ALGORITHM_IDENTIFIER_ES256,
                    },
                    PublicKeyCredentialParameters {
                        auth_type: PublicKeyCredentialType::PublicKey,
                        alg: WEBAUTHN_COSE_ALGORITHM_IDENTIFIER_RS256,
                    },
                ],
                timeout: self.timeout,
                authenticator_selection: Some(AuthenticatorSelectionCriteria {
                    authenticator_attachment: Some(AuthenticatorAttachment::Platform),
                    require_resident_key: Some(true),
                    resident_key: Some(ResidentKeyRequirement::Required),
                    user_verification: Some(UserVerificationRequirement::Required),
                }),
                attestation: Some(AttestationConveyancePreference::None),
            },
        })
    }
}

struct User {
    id: Vec<u8>,
    name: String,
    display_name: String,
}

struct Rp {
    name: String,
    id: Option<String>,
}

/// Builds the options of an assertion. Without [`CredentialRequestBuilder::conditional`]
/// the request is a regular modal one.
#[derive(Default)]
pub struct CredentialRequestBuilder {
    challenge: Option<Vec<u8>>,
    rp_id: Option<String>,
    timeout: Option<u64>,
    signal: Option<AbortToken>,
    conditional: bool,
}

impl CredentialRequestBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn challenge(mut self, challenge: impl Into<Vec<u8>>) -> Self {
        self.challenge = Some(challenge.into());
        self
    }

    pub fn rp_id(mut self, rp_id: String) -> Self {
        self.rp_id = Some(rp_id);
        self
    }

    pub fn timeout(mut self, timeout_ms: u64) -> Self {
        self.timeout = Some(timeout_ms);
        self
    }

    /// Offers the passkeys through autofill, cancellable with `signal`.
    pub fn conditional(mut self, signal: AbortToken) -> Self {
        self.conditional = true;
        self.signal = Some(signal);
        self
    }

    pub fn build(self) -> Result<CredentialRequestOptions, Error> {
        let challenge = self
            .challenge
            .ok_or_else(|| Error::Other("Unable to build a WebAuthn request without a challenge".to_string()))?;

        Ok(CredentialRequestOptions {
            public_key: PublicKeyCredentialRequestOptions {
                challenge,
                timeout: self.timeout,
                rp_id: self.rp_id,
                user_verification: Some(UserVerificationRequirement::Required),
            },
            mediation: self.conditional.then_some(CredentialMediationRequirement::Conditional),
            signal: self.signal,
        })
    }
}

#[test]
fn test_gen_challenge_is_fresh() {
    let first = gen_challenge();
    let second = gen_challenge();
    assert_eq!(first.len(), WEBAUTHN_CHALLENGE_LENGTH);
    assert_ne!(first, second);
    assert_ne!(gen_user_id(), gen_user_id());
}

#[test]
fn test_creation_options_shape() {
    let options = CredentialCreationBuilder::new()
        .challenge(vec![7u8; 4])
        .user(vec![9u8; 2], "test-user".to_owned(), "Test User".to_owned())
        .rp("WebAuthn Conditional UI Test".to_owned(), Some("localhost".to_owned()))
        .timeout(60000)
        .build()
        .unwrap();

    let value = serde_json::to_value(&options).unwrap();
    assert_eq!(
        value,
        serde_json::json!({
            "publicKey": {
                "rp": { "id": "localhost", "name": "WebAuthn Conditional UI Test" },
                "user": { "id": [9, 9], "name": "test-user", "displayName": "Test User" },
                "challenge": [7, 7, 7, 7],
                "pubKeyCredParams": [
                    { "type": "public-key", "alg": -7 },
                    { "type": "public-key", "alg": -257 }
                ],
                "timeout": 60000,
                "authenticatorSelection": {
                    "authenticatorAttachment": "platform",
                    "requireResidentKey": true,
                    "residentKey": "required",
                    "userVerification": "required"
                },
                "attestation": "none"
            }
        })
    );
}

#[test]
fn test_creation_builder_requires_parts() {
    let missing_user = CredentialCreationBuilder::new()
        .challenge(gen_challenge())
        .rp("rp".to_owned(), None)
        .build();
    assert!(matches!(missing_user, Err(Error::Other(_))));

    let missing_challenge = CredentialCreationBuilder::new()
        .user(gen_user_id(), "a".to_owned(), "b".to_owned())
        .rp("rp".to_owned(), None)
        .build();
    assert!(matches!(missing_challenge, Err(Error::Other(_))));
}

#[test]
fn test_request_builder_modal_and_conditional() {
    let modal = CredentialRequestBuilder::new()
        .challenge(gen_challenge())
        .rp_id("localhost".to_owned())
        .build()
        .unwrap();
    assert_eq!(modal.mediation, None);
    assert!(modal.signal.is_none());
    assert_eq!(modal.public_key.user_verification, Some(UserVerificationRequirement::Required));

    let token = AbortToken::new(1);
    let conditional = CredentialRequestBuilder::new()
        .challenge(gen_challenge())
        .conditional(token.clone())
        .build()
        .unwrap();
    assert!(conditional.is_conditional());
    assert!(conditional.signal.unwrap().same_as(&token));
}
