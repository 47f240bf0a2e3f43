pub mod details;
pub mod messages;
pub mod token;

use crate::webauthn::{
    ceremony::{
        details::AssertionDetails,
        token::{AbortToken, AmbientSlot},
    },
    client::{gen_challenge, gen_user_id, CredentialCreationBuilder, CredentialRequestBuilder},
    config::CeremonyConfig,
    error::Error,
    proto::web_message::{CredentialCreationOptions, CredentialRequestOptions, PublicKeyCredentialRaw},
};
use async_trait::async_trait;
use futures::task::{LocalSpawn, LocalSpawnExt};
use std::{rc::Rc, time::Duration};

/// The browser's credential management API.
#[async_trait(?Send)]
pub trait CredentialsApi {
    /// `navigator.credentials.create()`.
    async fn create(&self, options: CredentialCreationOptions) -> Result<PublicKeyCredentialRaw, Error>;

    /// `navigator.credentials.get()`. A request carrying a signal must reject
    /// with [`Error::OperationAborted`] once the signal is aborted.
    async fn get(&self, options: CredentialRequestOptions) -> Result<Option<PublicKeyCredentialRaw>, Error>;

    /// `PublicKeyCredential.isConditionalMediationAvailable()`, or
    /// [`Error::UnsupportedCapability`] when the browser lacks the probe.
    async fn is_conditional_mediation_available(&self) -> Result<bool, Error>;
}

#[derive(Clone, Copy, Debug, Eq, PartialEq, Hash)]
pub enum Surface {
    Registration,
    Login,
}

#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum StatusLevel {
    Info,
    Success,
    Error,
}

impl StatusLevel {
    pub fn as_str(&self) -> &'static str {
        match self {
            StatusLevel::Info => "info",
            StatusLevel::Success => "success",
            StatusLevel::Error => "error",
        }
    }
}

/// Where ceremony outcomes are rendered.
pub trait PresentationSink {
    fn show_status(&self, surface: Surface, level: StatusLevel, message: &str);

    fn show_assertion(&self, details: &AssertionDetails);

    fn set_trigger_enabled(&self, surface: Surface, enabled: bool);

    /// Refreshes the page once `delay` has elapsed.
    fn schedule_reload(&self, delay: Duration);
}

/// Terminal state of one conditional assertion attempt.
#[derive(Debug, Eq, PartialEq)]
pub enum AmbientOutcome {
    /// The browser cannot offer passkeys through autofill.
    Unsupported,
    Resolved(AssertionDetails),
    NoCredential,
    /// Superseded by a registration or a newer conditional request.
    Cancelled,
    Declined,
    Failed(Error),
}

/// Runs the registration, login and conditional login ceremonies of the
/// page. At most one conditional request is in flight at a time.
pub struct CeremonyController {
    config: CeremonyConfig,
    credentials: Box<dyn CredentialsApi>,
    sink: Box<dyn PresentationSink>,
    spawner: Box<dyn LocalSpawn>,
    ambient: AmbientSlot,
}

impl CeremonyController {
    pub fn new(
        config: CeremonyConfig,
        credentials: impl CredentialsApi + 'static,
        sink: impl PresentationSink + 'static,
        spawner: impl LocalSpawn + 'static,
    ) -> Rc<Self> {
        Rc::new(CeremonyController {
            config,
            credentials: Box::new(credentials),
            sink: Box::new(sink),
            spawner: Box::new(spawner),
            ambient: AmbientSlot::new(),
        })
    }

    /// Token of the conditional request currently in flight.
    pub fn pending_ambient(&self) -> Option<AbortToken> {
        self.ambient.current()
    }

    pub fn cancel_ambient_assertion(&self) -> bool {
        self.ambient.cancel()
    }

    /// Registers a new platform passkey. The registration trigger is disabled
    /// for the duration of the call, and a conditional request is restarted
    /// whatever the outcome.
    pub async fn start_registration(self: &Rc<Self>) -> Result<PublicKeyCredentialRaw, Error> {
        self.sink.set_trigger_enabled(Surface::Registration, false);
        self.sink
            .show_status(Surface::Registration, StatusLevel::Info, messages::REGISTRATION_IN_PROGRESS);

        // the platform authenticator cannot serve the autofill prompt and the
        // registration at once
        self.ambient.cancel();

        let result = self.register().await;
        match &result {
            Ok(credential) => {
                tracing::info!(credential = %credential.id, "passkey registered");
                self.sink
                    .show_status(Surface::Registration, StatusLevel::Success, messages::REGISTRATION_SUCCEEDED);
                self.sink.schedule_reload(self.config.reload_delay());
            }
            Err(e) => {
                tracing::error!(error = %e, "registration failed");
                self.sink
                    .show_status(Surface::Registration, StatusLevel::Error, &messages::registration_failed(e));
            }
        }

        self.sink.set_trigger_enabled(Surface::Registration, true);
        self.spawn_ambient_assertion();

        result
    }

    /// Explicit login. Not cancellable and not arbitrated against the
    /// conditional request; every failure is shown.
    pub async fn start_manual_assertion(&self) -> Result<Option<AssertionDetails>, Error> {
        self.sink.show_status(Surface::Login, StatusLevel::Info, messages::LOGIN_IN_PROGRESS);

        let result = self.authenticate().await;
        if let Err(e) = &result {
            tracing::error!(error = %e, "authentication failed");
            self.sink.show_status(Surface::Login, StatusLevel::Error, &messages::login_failed(e));
        }

        result
    }

    /// Offers the registered passkeys through autofill. Supersedes the
    /// previous conditional request, if any.
    pub async fn start_ambient_assertion(&self) -> AmbientOutcome {
        let token = self.ambient.renew();
        let outcome = self.ambient_assertion(&token).await;

        if !self.ambient.release(&token) {
            tracing::trace!(token = token.id(), "conditional request already superseded");
        }

        outcome
    }

    fn spawn_ambient_assertion(self: &Rc<Self>) {
        let controller = Rc::clone(self);
        if let Err(e) = self.spawner.spawn_local(async move {
            controller.start_ambient_assertion().await;
        }) {
            tracing::warn!(error = %e, "unable to restart conditional mediation");
        }
    }

    async fn register(&self) -> Result<PublicKeyCredentialRaw, Error> {
        let options = CredentialCreationBuilder::new()
            .challenge(gen_challenge())
            .user(gen_user_id(), self.config.user_name.clone(), self.config.user_display_name.clone())
            .rp(self.config.rp_name.clone(), Some(self.config.rp_id.clone()))
            .timeout(self.config.timeout_ms)
            .build()?;

        tracing::debug!(rp_id = %self.config.rp_id, "creating credential");
        self.credentials.create(options).await
    }

    async fn authenticate(&self) -> Result<Option<AssertionDetails>, Error> {
        let options = self.request_builder().build()?;

        tracing::debug!(rp_id = %self.config.rp_id, "requesting assertion");
        match self.credentials.get(options).await? {
            Some(credential) => self.present_assertion(&credential).map(Some),
            None => Ok(None),
        }
    }

    async fn ambient_assertion(&self, token: &AbortToken) -> AmbientOutcome {
        let available = match self.credentials.is_conditional_mediation_available().await {
            Ok(available) => available,
            Err(Error::UnsupportedCapability(capability)) => {
                tracing::debug!(capability, "conditional mediation not supported");
                return AmbientOutcome::Unsupported;
            }
            Err(e) => return self.ambient_failure(e),
        };

        if !available {
            tracing::debug!("conditional mediation not available");
            return AmbientOutcome::Unsupported;
        }

        if token.is_aborted() {
            return self.ambient_failure(Error::OperationAborted);
        }

        let options = match self.request_builder().conditional(token.clone()).build() {
            Ok(options) => options,
            Err(e) => return self.ambient_failure(e),
        };

        tracing::debug!(token = token.id(), "starting conditional mediation");
        match self.credentials.get(options).await {
            Ok(Some(credential)) => match self.present_assertion(&credential) {
                Ok(details) => AmbientOutcome::Resolved(details),
                Err(e) => self.ambient_failure(e),
            },
            Ok(None) => AmbientOutcome::NoCredential,
            Err(e) => self.ambient_failure(e),
        }
    }

    fn ambient_failure(&self, error: Error) -> AmbientOutcome {
        if error.is_benign_for_ambient() {
            tracing::debug!(reason = %error, "conditional mediation ended");
            return match error {
                Error::OperationAborted => AmbientOutcome::Cancelled,
                _ => AmbientOutcome::Declined,
            };
        }

        tracing::error!(error = %error, "authentication failed");
        self.sink
            .show_status(Surface::Login, StatusLevel::Error, &messages::login_failed(&error));
        AmbientOutcome::Failed(error)
    }

    fn request_builder(&self) -> CredentialRequestBuilder {
        CredentialRequestBuilder::new()
            .challenge(gen_challenge())
            .rp_id(self.config.rp_id.clone())
            .timeout(self.config.timeout_ms)
    }

    /// Reports the success first; a response that cannot be decoded then
    /// fails the ceremony.
    fn present_assertion(&self, credential: &PublicKeyCredentialRaw) -> Result<AssertionDetails, Error> {
        tracing::info!(credential = %credential.id, "authentication successful");
        self.sink.show_status(Surface::Login, StatusLevel::Success, messages::LOGIN_SUCCEEDED);

        let details = AssertionDetails::from_credential(credential)?;
        self.sink.show_assertion(&details);
        Ok(details)
    }
}
