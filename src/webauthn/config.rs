use crate::webauthn::proto::{constants::WEBAUTHN_DEFAULT_TIMEOUT_MS, web_message::get_default_rp_id};
use serde_derive::*;
use std::time::Duration;

pub const DEFAULT_RP_NAME: &str = "WebAuthn Conditional UI Test";
pub const DEFAULT_RP_ID: &str = "localhost";
pub const DEFAULT_USER_NAME: &str = "test-user";
pub const DEFAULT_USER_DISPLAY_NAME: &str = "Test User";
pub const DEFAULT_RELOAD_DELAY_MS: u64 = 1000;

/// Fixed values of the demo page. Every field can be omitted when
/// deserializing.
#[derive(Serialize, Deserialize, Clone, Debug, Eq, PartialEq)]
#[serde(default, rename_all = "camelCase")]
pub struct CeremonyConfig {
    pub rp_name: String,
    pub rp_id: String,
    pub user_name: String,
    pub user_display_name: String,
    pub timeout_ms: u64,
    /// Delay between a successful registration and the page reload, long
    /// enough for the success message to be read.
    pub reload_delay_ms: u64,
}

impl Default for CeremonyConfig {
    fn default() -> Self {
        CeremonyConfig {
            rp_name: DEFAULT_RP_NAME.to_owned(),
            rp_id: DEFAULT_RP_ID.to_owned(),
            user_name: DEFAULT_USER_NAME.to_owned(),
            user_display_name: DEFAULT_USER_DISPLAY_NAME.to_owned(),
            timeout_ms: WEBAUTHN_DEFAULT_TIMEOUT_MS,
            reload_delay_ms: DEFAULT_RELOAD_DELAY_MS,
        }
    }
}

impl CeremonyConfig {
    /// Defaults with the relying party id taken from the page origin or
    /// hostname.
    pub fn for_origin(origin: &str) -> Self {
        CeremonyConfig {
            rp_id: get_default_rp_id(origin),
            ..Default::default()
        }
    }

    pub fn reload_delay(&self) -> Duration {
        Duration::from_millis(self.reload_delay_ms)
    }
}

#[test]
fn test_defaults() {
    let config = CeremonyConfig::default();
    assert_eq!(config.user_name, "test-user");
    assert_eq!(config.timeout_ms, 60000);
    assert_eq!(config.reload_delay(), Duration::from_secs(1));
}

#[test]
fn test_partial_config() {
    let config: CeremonyConfig = serde_json::from_str(r#"{"rpName":"Passkey Autofill Test","reloadDelayMs":0}"#).unwrap();
    assert_eq!(config.rp_name, "Passkey Autofill Test");
    assert_eq!(config.reload_delay_ms, 0);
    assert_eq!(config.rp_id, DEFAULT_RP_ID);
    assert_eq!(config.timeout_ms, 60000);
}

#[test]
fn test_for_origin() {
    assert_eq!(CeremonyConfig::for_origin("https://passkeys.example.org:8443").rp_id, "passkeys.example.org");
    assert_eq!(CeremonyConfig::for_origin("passkeys.example.org").rp_id, "passkeys.example.org");
}
