use async_trait::async_trait;
use futures::{
    channel::oneshot,
    executor::LocalPool,
    task::{LocalSpawnExt, SpawnError},
};
use passkey_ceremony::{
    base64::{Engine as _, BASE64_URLSAFE_NOPAD},
    webauthn::{
        ceremony::{
            details::AssertionDetails, messages, AmbientOutcome, CeremonyController, CredentialsApi, PresentationSink, StatusLevel,
            Surface,
        },
        config::CeremonyConfig,
        error::Error,
        proto::web_message::{
            AuthenticatorAttestationResponseRaw, CredentialCreationOptions, CredentialMediationRequirement, CredentialRequestOptions,
            PublicKeyCredentialRaw, UserVerificationRequirement,
        },
    },
};
use std::{cell::RefCell, collections::VecDeque, rc::Rc, time::Duration};

enum Reply {
    Credential(Option<PublicKeyCredentialRaw>),
    Reject(Error),
    /// Stays pending until the request signal is aborted.
    WaitForAbort,
}

struct Scripted {
    conditional_mediation: Result<bool, Error>,
    /// Holds the availability check until the sender fires.
    availability_gate: Option<oneshot::Receiver<()>>,
    create_replies: VecDeque<Result<PublicKeyCredentialRaw, Error>>,
    get_replies: VecDeque<Reply>,
    created: Vec<CredentialCreationOptions>,
    requested: Vec<CredentialRequestOptions>,
}

#[derive(Clone)]
struct ScriptedCredentials {
    state: Rc<RefCell<Scripted>>,
}

impl ScriptedCredentials {
    fn new() -> Self {
        ScriptedCredentials {
            state: Rc::new(RefCell::new(Scripted {
                conditional_mediation: Ok(true),
                availability_gate: None,
                create_replies: VecDeque::new(),
                get_replies: VecDeque::new(),
                created: Vec::new(),
                requested: Vec::new(),
            })),
        }
    }

    fn conditional_mediation(self, available: Result<bool, Error>) -> Self {
        self.state.borrow_mut().conditional_mediation = available;
        self
    }

    fn gate_availability(self) -> (Self, oneshot::Sender<()>) {
        let (sender, receiver) = oneshot::channel();
        self.state.borrow_mut().availability_gate = Some(receiver);
        (self, sender)
    }

    fn on_create(self, reply: Result<PublicKeyCredentialRaw, Error>) -> Self {
        self.state.borrow_mut().create_replies.push_back(reply);
        self
    }

    fn on_get(self, reply: Reply) -> Self {
        self.state.borrow_mut().get_replies.push_back(reply);
        self
    }

    fn created(&self) -> Vec<CredentialCreationOptions> {
        self.state.borrow().created.clone()
    }

    fn requested(&self) -> Vec<CredentialRequestOptions> {
        self.state.borrow().requested.clone()
    }
}

#[async_trait(?Send)]
impl CredentialsApi for ScriptedCredentials {
    async fn create(&self, options: CredentialCreationOptions) -> Result<PublicKeyCredentialRaw, Error> {
        let mut state = self.state.borrow_mut();
        state.created.push(options);
        state
            .create_replies
            .pop_front()
            .unwrap_or_else(|| Err(Error::Other("no create reply scripted".to_owned())))
    }

    async fn get(&self, options: CredentialRequestOptions) -> Result<Option<PublicKeyCredentialRaw>, Error> {
        let reply = {
            let mut state = self.state.borrow_mut();
            state.requested.push(options.clone());
            state.get_replies.pop_front()
        };

        match reply {
            None => Ok(None),
            Some(Reply::Credential(credential)) => Ok(credential),
            Some(Reply::Reject(e)) => Err(e),
            Some(Reply::WaitForAbort) => {
                let signal = options.signal.expect("only conditional requests wait for an abort");
                signal.aborted().await;
                Err(Error::OperationAborted)
            }
        }
    }

    async fn is_conditional_mediation_available(&self) -> Result<bool, Error> {
        let gate = self.state.borrow_mut().availability_gate.take();
        if let Some(gate) = gate {
            gate.await.ok();
        }

        self.state.borrow().conditional_mediation.clone()
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
enum SinkEvent {
    Status(Surface, StatusLevel, String),
    Assertion(AssertionDetails),
    Trigger(Surface, bool),
    Reload(Duration),
}

#[derive(Clone, Default)]
struct RecordingSink {
    events: Rc<RefCell<Vec<SinkEvent>>>,
}

impl RecordingSink {
    fn events(&self) -> Vec<SinkEvent> {
        self.events.borrow().clone()
    }

    fn statuses(&self, surface: Surface) -> Vec<(StatusLevel, String)> {
        self.events()
            .into_iter()
            .filter_map(|event| match event {
                SinkEvent::Status(s, level, message) if s == surface => Some((level, message)),
                _ => None,
            })
            .collect()
    }
}

impl PresentationSink for RecordingSink {
    fn show_status(&self, surface: Surface, level: StatusLevel, message: &str) {
        self.events
            .borrow_mut()
            .push(SinkEvent::Status(surface, level, message.to_owned()));
    }

    fn show_assertion(&self, details: &AssertionDetails) {
        self.events.borrow_mut().push(SinkEvent::Assertion(details.clone()));
    }

    fn set_trigger_enabled(&self, surface: Surface, enabled: bool) {
        self.events.borrow_mut().push(SinkEvent::Trigger(surface, enabled));
    }

    fn schedule_reload(&self, delay: Duration) {
        self.events.borrow_mut().push(SinkEvent::Reload(delay));
    }
}

struct Harness {
    pool: LocalPool,
    credentials: ScriptedCredentials,
    sink: RecordingSink,
    controller: Rc<CeremonyController>,
}

impl Harness {
    fn new(credentials: ScriptedCredentials) -> Self {
        let pool = LocalPool::new();
        let sink = RecordingSink::default();
        let controller = CeremonyController::new(CeremonyConfig::default(), credentials.clone(), sink.clone(), pool.spawner());

        Harness {
            pool,
            credentials,
            sink,
            controller,
        }
    }

    fn spawn_ambient(&self) -> Result<futures::future::RemoteHandle<AmbientOutcome>, SpawnError> {
        let controller = self.controller.clone();
        self.pool
            .spawner()
            .spawn_local_with_handle(async move { controller.start_ambient_assertion().await })
    }
}

fn assertion_credential(flags: u8, sign_count: u32) -> PublicKeyCredentialRaw {
    let mut authenticator_data = vec![0x49u8; 32];
    authenticator_data.push(flags);
    authenticator_data.extend_from_slice(&sign_count.to_be_bytes());

    credential(
        vec![0xc0, 0xff, 0xee],
        AuthenticatorAttestationResponseRaw {
            client_data_json: br#"{"type":"webauthn.get","challenge":"AAAA","origin":"http://localhost"}"#.to_vec(),
            authenticator_data: Some(authenticator_data),
            signature: Some(vec![0x30, 0x44, 0x02, 0x20]),
            user_handle: Some(vec![1; 32]),
            ..Default::default()
        },
    )
}

fn registered_credential() -> PublicKeyCredentialRaw {
    credential(
        vec![0x01, 0x02, 0x03, 0x04],
        AuthenticatorAttestationResponseRaw {
            attestation_object: Some(vec![0xa3]),
            client_data_json: br#"{"type":"webauthn.create","challenge":"AAAA","origin":"http://localhost"}"#.to_vec(),
            ..Default::default()
        },
    )
}

fn credential(raw_id: Vec<u8>, response: AuthenticatorAttestationResponseRaw) -> PublicKeyCredentialRaw {
    PublicKeyCredentialRaw {
        id: BASE64_URLSAFE_NOPAD.encode(&raw_id),
        raw_id,
        response: Some(response),
    }
}

const NOT_ALLOWED: &str = "The operation either timed out or was not allowed.";

#[test]
fn ambient_assertion_without_capability_makes_no_request() {
    let mut harness = Harness::new(ScriptedCredentials::new().conditional_mediation(Err(Error::UnsupportedCapability("PublicKeyCredential"))));

    let outcome = harness.pool.run_until(harness.controller.start_ambient_assertion());

    assert_eq!(outcome, AmbientOutcome::Unsupported);
    assert!(harness.credentials.requested().is_empty());
    assert!(harness.sink.events().is_empty());
    assert!(harness.controller.pending_ambient().is_none());
}

#[test]
fn ambient_assertion_when_unavailable_makes_no_request() {
    let mut harness = Harness::new(ScriptedCredentials::new().conditional_mediation(Ok(false)));

    let outcome = harness.pool.run_until(harness.controller.start_ambient_assertion());

    assert_eq!(outcome, AmbientOutcome::Unsupported);
    assert!(harness.credentials.requested().is_empty());
    assert!(harness.sink.events().is_empty());
    assert!(harness.controller.pending_ambient().is_none());
}

#[test]
fn ambient_assertion_cancelled_during_availability_check() {
    let (credentials, release_check) = ScriptedCredentials::new().gate_availability();
    let mut harness = Harness::new(credentials.on_get(Reply::Credential(Some(assertion_credential(0x05, 1)))));

    let ambient = harness.spawn_ambient().unwrap();
    harness.pool.run_until_stalled();

    let token = harness
        .controller
        .pending_ambient()
        .expect("token registered before the availability check resolves");
    assert!(harness.controller.cancel_ambient_assertion());
    assert!(token.is_aborted());

    release_check.send(()).unwrap();
    assert_eq!(harness.pool.run_until(ambient), AmbientOutcome::Cancelled);

    assert!(harness.credentials.requested().is_empty());
    assert!(harness.sink.events().is_empty());
    assert!(harness.controller.pending_ambient().is_none());
}

#[test]
fn registration_during_availability_check_skips_the_request() {
    let (credentials, release_check) = ScriptedCredentials::new().gate_availability();
    let mut harness = Harness::new(credentials.on_create(Ok(registered_credential())));

    let ambient = harness.spawn_ambient().unwrap();
    harness.pool.run_until_stalled();

    harness.pool.run_until(harness.controller.start_registration()).unwrap();
    release_check.send(()).unwrap();
    assert_eq!(harness.pool.run_until(ambient), AmbientOutcome::Cancelled);

    // only the conditional request restarted after the registration
    harness.pool.run_until_stalled();
    assert_eq!(harness.credentials.requested().len(), 1);
    assert!(harness.sink.statuses(Surface::Login).is_empty());
}

#[test]
fn ambient_assertion_presents_the_credential() {
    let mut harness = Harness::new(ScriptedCredentials::new().on_get(Reply::Credential(Some(assertion_credential(0x1d, 5)))));

    let outcome = harness.pool.run_until(harness.controller.start_ambient_assertion());

    let details = match outcome {
        AmbientOutcome::Resolved(details) => details,
        other => panic!("unexpected outcome {other:?}"),
    };
    assert_eq!(details.credential_id, "c0ffee");
    assert_eq!(details.sign_count(), 5);
    assert_eq!(details.flags_byte(), "1d");
    assert!(details.authenticator_data.flags.backup_state);
    assert_eq!(details.signature, "30440220");

    assert_eq!(
        harness.sink.events(),
        vec![
            SinkEvent::Status(Surface::Login, StatusLevel::Success, messages::LOGIN_SUCCEEDED.to_owned()),
            SinkEvent::Assertion(details),
        ]
    );

    let requested = harness.credentials.requested();
    assert_eq!(requested.len(), 1);
    assert_eq!(requested[0].mediation, Some(CredentialMediationRequirement::Conditional));
    assert!(requested[0].signal.is_some());
    assert_eq!(requested[0].public_key.rp_id.as_deref(), Some("localhost"));
    assert_eq!(requested[0].public_key.user_verification, Some(UserVerificationRequirement::Required));
    assert_eq!(requested[0].public_key.timeout, Some(60000));
    assert_eq!(requested[0].public_key.challenge.len(), 32);

    assert!(harness.controller.pending_ambient().is_none());
}

#[test]
fn ambient_assertion_without_credential_is_silent() {
    let mut harness = Harness::new(ScriptedCredentials::new().on_get(Reply::Credential(None)));

    let outcome = harness.pool.run_until(harness.controller.start_ambient_assertion());

    assert_eq!(outcome, AmbientOutcome::NoCredential);
    assert!(harness.sink.events().is_empty());
}

#[test]
fn declined_ambient_assertion_is_silent() {
    let mut harness = Harness::new(ScriptedCredentials::new().on_get(Reply::Reject(Error::UserDeclined(NOT_ALLOWED.to_owned()))));

    let outcome = harness.pool.run_until(harness.controller.start_ambient_assertion());

    assert_eq!(outcome, AmbientOutcome::Declined);
    assert!(harness.sink.events().is_empty());
    assert!(harness.controller.pending_ambient().is_none());
}

#[test]
fn declined_manual_assertion_is_reported() {
    let mut harness = Harness::new(ScriptedCredentials::new().on_get(Reply::Reject(Error::UserDeclined(NOT_ALLOWED.to_owned()))));

    let result = harness.pool.run_until(harness.controller.start_manual_assertion());

    assert_eq!(result, Err(Error::UserDeclined(NOT_ALLOWED.to_owned())));
    assert_eq!(
        harness.sink.statuses(Surface::Login),
        vec![
            (StatusLevel::Info, messages::LOGIN_IN_PROGRESS.to_owned()),
            (StatusLevel::Error, format!("認証に失敗しました: {NOT_ALLOWED}")),
        ]
    );

    let requested = harness.credentials.requested();
    assert_eq!(requested.len(), 1);
    assert_eq!(requested[0].mediation, None);
    assert!(requested[0].signal.is_none());
}

#[test]
fn aborted_manual_assertion_is_reported() {
    let mut harness = Harness::new(ScriptedCredentials::new().on_get(Reply::Reject(Error::OperationAborted)));

    let result = harness.pool.run_until(harness.controller.start_manual_assertion());

    assert_eq!(result, Err(Error::OperationAborted));
    assert_eq!(
        harness.sink.statuses(Surface::Login).last(),
        Some(&(StatusLevel::Error, messages::login_failed(Error::OperationAborted)))
    );
}

#[test]
fn other_ambient_failure_is_reported() {
    let failure = Error::Other("The relying party ID is not a registrable domain suffix of, nor equal to the current domain.".to_owned());
    let mut harness = Harness::new(ScriptedCredentials::new().on_get(Reply::Reject(failure.clone())));

    let outcome = harness.pool.run_until(harness.controller.start_ambient_assertion());

    assert_eq!(outcome, AmbientOutcome::Failed(failure.clone()));
    assert_eq!(
        harness.sink.statuses(Surface::Login),
        vec![(StatusLevel::Error, messages::login_failed(&failure))]
    );
    assert!(harness.controller.pending_ambient().is_none());
}

#[test]
fn rejected_availability_probe_is_reported() {
    let failure = Error::Other("probe failed".to_owned());
    let mut harness = Harness::new(ScriptedCredentials::new().conditional_mediation(Err(failure.clone())));

    let outcome = harness.pool.run_until(harness.controller.start_ambient_assertion());

    assert_eq!(outcome, AmbientOutcome::Failed(failure));
    assert!(harness.credentials.requested().is_empty());
    assert_eq!(harness.sink.statuses(Surface::Login).len(), 1);
}

#[test]
fn manual_assertion_presents_the_credential() {
    let mut harness = Harness::new(ScriptedCredentials::new().on_get(Reply::Credential(Some(assertion_credential(0x05, 0)))));

    let details = harness
        .pool
        .run_until(harness.controller.start_manual_assertion())
        .unwrap()
        .expect("a credential was returned");

    assert_eq!(details.sign_count(), 0);
    assert!(details.authenticator_data.flags.user_present);
    assert!(details.authenticator_data.flags.user_verified);
    assert_eq!(details.client_data.as_ref().map(|c| c.request_type.as_str()), Some("webauthn.get"));
    assert_eq!(
        harness.sink.events(),
        vec![
            SinkEvent::Status(Surface::Login, StatusLevel::Info, messages::LOGIN_IN_PROGRESS.to_owned()),
            SinkEvent::Status(Surface::Login, StatusLevel::Success, messages::LOGIN_SUCCEEDED.to_owned()),
            SinkEvent::Assertion(details),
        ]
    );
}

#[test]
fn manual_assertion_without_credential() {
    let mut harness = Harness::new(ScriptedCredentials::new().on_get(Reply::Credential(None)));

    let result = harness.pool.run_until(harness.controller.start_manual_assertion());

    assert_eq!(result, Ok(None));
    assert_eq!(
        harness.sink.statuses(Surface::Login),
        vec![(StatusLevel::Info, messages::LOGIN_IN_PROGRESS.to_owned())]
    );
}

#[test]
fn malformed_authenticator_data_fails_after_success() {
    let mut credential = assertion_credential(0x05, 1);
    if let Some(response) = credential.response.as_mut() {
        response.authenticator_data = Some(vec![0u8; 5]);
    }
    let mut harness = Harness::new(ScriptedCredentials::new().on_get(Reply::Credential(Some(credential))));

    let result = harness.pool.run_until(harness.controller.start_manual_assertion());

    assert_eq!(result, Err(Error::MalformedAuthenticatorData { len: 5 }));
    assert_eq!(
        harness.sink.statuses(Surface::Login),
        vec![
            (StatusLevel::Info, messages::LOGIN_IN_PROGRESS.to_owned()),
            (StatusLevel::Success, messages::LOGIN_SUCCEEDED.to_owned()),
            (StatusLevel::Error, messages::login_failed(Error::MalformedAuthenticatorData { len: 5 })),
        ]
    );
    assert!(!harness.sink.events().iter().any(|e| matches!(e, SinkEvent::Assertion(_))));
}

#[test]
fn each_ceremony_uses_a_fresh_challenge() {
    let mut harness = Harness::new(ScriptedCredentials::new());

    harness.pool.run_until(harness.controller.start_manual_assertion()).unwrap();
    harness.pool.run_until(harness.controller.start_manual_assertion()).unwrap();

    let requested = harness.credentials.requested();
    assert_eq!(requested.len(), 2);
    assert_ne!(requested[0].public_key.challenge, requested[1].public_key.challenge);
}

#[test]
fn registration_request_shape() {
    let mut harness = Harness::new(ScriptedCredentials::new().on_create(Ok(registered_credential())));

    harness.pool.run_until(harness.controller.start_registration()).unwrap();

    let created = harness.credentials.created();
    assert_eq!(created.len(), 1);
    let options = &created[0].public_key;
    assert_eq!(options.challenge.len(), 32);
    assert_eq!(options.user.id.len(), 32);
    assert_ne!(options.challenge, options.user.id);
    assert_eq!(options.user.name, "test-user");
    assert_eq!(options.user.display_name, "Test User");
    assert_eq!(options.rp.id.as_deref(), Some("localhost"));
    assert_eq!(options.rp.name, "WebAuthn Conditional UI Test");
    assert_eq!(options.timeout, Some(60000));
    assert_eq!(options.pub_key_cred_params.iter().map(|p| p.alg).collect::<Vec<_>>(), vec![-7, -257]);
}

#[test]
fn successful_registration_reloads_and_restarts_ambient_assertion() {
    let mut harness = Harness::new(ScriptedCredentials::new().on_create(Ok(registered_credential())));

    let credential = harness.pool.run_until(harness.controller.start_registration()).unwrap();
    assert_eq!(credential, registered_credential());

    assert_eq!(
        harness.sink.events(),
        vec![
            SinkEvent::Trigger(Surface::Registration, false),
            SinkEvent::Status(Surface::Registration, StatusLevel::Info, messages::REGISTRATION_IN_PROGRESS.to_owned()),
            SinkEvent::Status(Surface::Registration, StatusLevel::Success, messages::REGISTRATION_SUCCEEDED.to_owned()),
            SinkEvent::Reload(Duration::from_millis(1000)),
            SinkEvent::Trigger(Surface::Registration, true),
        ]
    );

    // the restarted conditional request runs on the executor
    assert!(harness.credentials.requested().is_empty());
    harness.pool.run_until_stalled();
    let requested = harness.credentials.requested();
    assert_eq!(requested.len(), 1);
    assert!(requested[0].is_conditional());
}

#[test]
fn failed_registration_reenables_trigger_and_restarts_ambient_assertion() {
    let mut harness = Harness::new(
        ScriptedCredentials::new()
            .on_create(Err(Error::Other("The authenticator was previously registered".to_owned())))
            .on_get(Reply::Reject(Error::UserDeclined(NOT_ALLOWED.to_owned()))),
    );

    let result = harness.pool.run_until(harness.controller.start_registration());
    assert!(result.is_err());

    let events = harness.sink.events();
    assert_eq!(events.first(), Some(&SinkEvent::Trigger(Surface::Registration, false)));
    assert_eq!(events.last(), Some(&SinkEvent::Trigger(Surface::Registration, true)));
    assert!(!events.iter().any(|e| matches!(e, SinkEvent::Reload(_))));
    assert_eq!(
        harness.sink.statuses(Surface::Registration).last(),
        Some(&(StatusLevel::Error, "登録に失敗しました: The authenticator was previously registered".to_owned()))
    );

    harness.pool.run_until_stalled();
    assert_eq!(harness.credentials.requested().len(), 1);
    // the restarted request was declined, silently
    assert!(harness.sink.statuses(Surface::Login).is_empty());
    assert!(harness.controller.pending_ambient().is_none());
}

#[test]
fn registration_aborts_pending_ambient_assertion() {
    let mut harness = Harness::new(
        ScriptedCredentials::new()
            .on_get(Reply::WaitForAbort)
            .on_create(Ok(registered_credential())),
    );

    let ambient = harness.spawn_ambient().unwrap();
    harness.pool.run_until_stalled();

    let token = harness.controller.pending_ambient().expect("conditional request in flight");
    assert!(!token.is_aborted());

    harness.pool.run_until(harness.controller.start_registration()).unwrap();
    assert!(token.is_aborted());

    let outcome = harness.pool.run_until(ambient);
    assert_eq!(outcome, AmbientOutcome::Cancelled);

    harness.pool.run_until_stalled();
    assert!(harness.sink.statuses(Surface::Login).is_empty());
    assert!(harness
        .sink
        .statuses(Surface::Registration)
        .iter()
        .all(|(level, _)| *level != StatusLevel::Error));
    assert!(harness.controller.pending_ambient().is_none());
}

#[test]
fn overlapping_ambient_assertions_keep_the_newest_token() {
    let mut harness = Harness::new(
        ScriptedCredentials::new()
            .on_get(Reply::WaitForAbort)
            .on_get(Reply::WaitForAbort)
            .on_get(Reply::WaitForAbort),
    );

    let first = harness.spawn_ambient().unwrap();
    harness.pool.run_until_stalled();
    let second = harness.spawn_ambient().unwrap();
    harness.pool.run_until_stalled();

    assert_eq!(harness.pool.run_until(first), AmbientOutcome::Cancelled);

    let third = harness.spawn_ambient().unwrap();
    harness.pool.run_until_stalled();
    assert_eq!(harness.pool.run_until(second), AmbientOutcome::Cancelled);

    let requested = harness.credentials.requested();
    assert_eq!(requested.len(), 3);
    let newest = requested[2].signal.clone().unwrap();
    let pending = harness.controller.pending_ambient().expect("third request still registered");
    assert!(pending.same_as(&newest));
    assert!(!newest.is_aborted());
    assert!(requested[0].signal.as_ref().unwrap().is_aborted());
    assert!(requested[1].signal.as_ref().unwrap().is_aborted());

    assert!(harness.controller.cancel_ambient_assertion());
    assert_eq!(harness.pool.run_until(third), AmbientOutcome::Cancelled);
    assert!(harness.controller.pending_ambient().is_none());
    assert!(harness.sink.events().is_empty());
}
