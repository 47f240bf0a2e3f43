use crate::webauthn::proto::constants::WEBAUTHN_AUTH_DATA_MIN_LENGTH;

pub const DOM_EXCEPTION_NOT_ALLOWED: &str = "NotAllowedError";
pub const DOM_EXCEPTION_ABORT: &str = "AbortError";

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum Error {
    /// The user dismissed the prompt, or the request timed out.
    #[error("{0}")]
    UserDeclined(String),
    /// The request was cancelled through its abort signal.
    #[error("The operation was aborted.")]
    OperationAborted,
    #[error("Authenticator data is {len} bytes long, at least {min} are required", min = WEBAUTHN_AUTH_DATA_MIN_LENGTH)]
    MalformedAuthenticatorData { len: usize },
    #[error("{0} is not supported by this browser")]
    UnsupportedCapability(&'static str),
    #[error("{0}")]
    Other(String),
}

impl Error {
    /// Maps a `DOMException` name and message onto the error taxonomy.
    pub fn from_exception(name: &str, message: impl Into<String>) -> Self {
        match name {
            DOM_EXCEPTION_NOT_ALLOWED => Error::UserDeclined(message.into()),
            DOM_EXCEPTION_ABORT => Error::OperationAborted,
            _ => Error::Other(message.into()),
        }
    }

    /// Rejections a conditional request is expected to end with: the user not
    /// picking a passkey, or the request being superseded.
    pub fn is_benign_for_ambient(&self) -> bool {
        matches!(self, Error::UserDeclined(_) | Error::OperationAborted)
    }
}

pub type Result<T, E = Error> = std::result::Result<T, E>;

#[test]
fn test_from_exception() {
    assert_eq!(
        Error::from_exception("NotAllowedError", "The operation either timed out or was not allowed."),
        Error::UserDeclined("The operation either timed out or was not allowed.".to_owned())
    );
    assert_eq!(Error::from_exception("AbortError", "signal is aborted without reason"), Error::OperationAborted);
    assert_eq!(
        Error::from_exception("InvalidStateError", "The authenticator was previously registered"),
        Error::Other("The authenticator was previously registered".to_owned())
    );
}

#[test]
fn test_benign_for_ambient() {
    assert!(Error::UserDeclined(String::new()).is_benign_for_ambient());
    assert!(Error::OperationAborted.is_benign_for_ambient());
    assert!(!Error::MalformedAuthenticatorData { len: 3 }.is_benign_for_ambient());
    assert!(!Error::Other("SecurityError".to_owned()).is_benign_for_ambient());
}

#[test]
fn test_display_reason() {
    assert_eq!(Error::UserDeclined("not allowed".to_owned()).to_string(), "not allowed");
    assert_eq!(
        Error::MalformedAuthenticatorData { len: 12 }.to_string(),
        "Authenticator data is 12 bytes long, at least 37 are required"
    );
}
