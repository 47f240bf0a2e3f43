//! # Passkey Ceremony
//!
//! Client side WebAuthn ceremonies: passkey registration, explicit login and
//! conditional (autofill) login, plus the authenticator data decoder used to
//! display assertion results.

pub mod base64;

/// Module for webauthn ceremonies
pub mod webauthn;

#[cfg(target_arch = "wasm32")]
pub mod wasm;
