use async_trait::async_trait;
use futures::task::{LocalFutureObj, LocalSpawn, SpawnError};
use js_sys::{Function, Promise, Reflect, Uint8Array};
use std::{rc::Rc, time::Duration};
use wasm_bindgen::{prelude::*, JsCast};
use wasm_bindgen_futures::JsFuture;
use web_sys::{AbortController, Document, DomException, Element, Event, HtmlButtonElement, HtmlElement, Window};

use crate::{
    base64::{Engine as _, BASE64_URLSAFE_NOPAD},
    webauthn::{
        ceremony::{details::AssertionDetails, CeremonyController, CredentialsApi, PresentationSink, StatusLevel, Surface},
        config::CeremonyConfig,
        error::Error,
        proto::{
            raw_message::AuthenticatorData,
            web_message::{
                AuthenticatorAttestationResponseRaw, CredentialCreationOptions, CredentialRequestOptions, PublicKeyCredentialRaw,
            },
        },
    },
};

const REGISTER_STATUS_ID: &str = "registerStatus";
const LOGIN_STATUS_ID: &str = "loginStatus";
const REGISTER_BUTTON_ID: &str = "registerButton";
const LOGIN_BUTTON_ID: &str = "loginButton";
const LOGIN_FORM_ID: &str = "loginForm";
const ASSERTION_SECTION_ID: &str = "assertionSection";
const ASSERTION_DETAILS_ID: &str = "assertionDetails";

fn js_error(value: JsValue) -> Error {
    if let Some(exception) = value.dyn_ref::<DomException>() {
        return Error::from_exception(&exception.name(), exception.message());
    }

    if let Some(error) = value.dyn_ref::<js_sys::Error>() {
        return Error::Other(String::from(error.message()));
    }

    Error::Other(value.as_string().unwrap_or_else(|| format!("{value:?}")))
}

fn serde_error(e: serde_wasm_bindgen::Error) -> Error {
    Error::Other(format!("{e:?}"))
}

fn get_field(target: &JsValue, key: &str) -> Result<JsValue, Error> {
    Reflect::get(target, &JsValue::from_str(key)).map_err(js_error)
}

fn get_bytes(target: &JsValue, key: &str) -> Result<Option<Vec<u8>>, Error> {
    let value = get_field(target, key)?;
    if value.is_undefined() || value.is_null() {
        return Ok(None);
    }

    Ok(Some(Uint8Array::new(&value).to_vec()))
}

/// Reads a `PublicKeyCredential` returned by the browser.
fn read_credential(value: &JsValue) -> Result<PublicKeyCredentialRaw, Error> {
    let raw_id = get_bytes(value, "rawId")?.unwrap_or_default();
    let id = get_field(value, "id")?
        .as_string()
        .unwrap_or_else(|| BASE64_URLSAFE_NOPAD.encode(&raw_id));

    let response = get_field(value, "response")?;
    let response = if response.is_undefined() || response.is_null() {
        None
    } else {
        Some(AuthenticatorAttestationResponseRaw {
            attestation_object: get_bytes(&response, "attestationObject")?,
            client_data_json: get_bytes(&response, "clientDataJSON")?.unwrap_or_default(),
            authenticator_data: get_bytes(&response, "authenticatorData")?,
            signature: get_bytes(&response, "signature")?,
            user_handle: get_bytes(&response, "userHandle")?,
        })
    };

    Ok(PublicKeyCredentialRaw { id, raw_id, response })
}

/// `navigator.credentials` of the current window.
pub struct BrowserCredentials {
    window: Window,
}

impl BrowserCredentials {
    pub fn new(window: Window) -> Self {
        BrowserCredentials { window }
    }
}

#[async_trait(?Send)]
impl CredentialsApi for BrowserCredentials {
    async fn create(&self, options: CredentialCreationOptions) -> Result<PublicKeyCredentialRaw, Error> {
        let options = serde_wasm_bindgen::to_value(&options).map_err(serde_error)?;
        let promise = self
            .window
            .navigator()
            .credentials()
            .create_with_options(options.unchecked_ref())
            .map_err(js_error)?;

        let credential = JsFuture::from(promise).await.map_err(js_error)?;
        if credential.is_null() || credential.is_undefined() {
            return Err(Error::Other("No credential was created".to_string()));
        }

        read_credential(&credential)
    }

    async fn get(&self, options: CredentialRequestOptions) -> Result<Option<PublicKeyCredentialRaw>, Error> {
        let js_options = serde_wasm_bindgen::to_value(&options).map_err(serde_error)?;

        if let Some(token) = &options.signal {
            let controller = AbortController::new().map_err(js_error)?;
            Reflect::set(&js_options, &JsValue::from_str("signal"), &controller.signal()).map_err(js_error)?;
            token.on_abort(move || controller.abort());
        }

        let promise = self
            .window
            .navigator()
            .credentials()
            .get_with_options(js_options.unchecked_ref())
            .map_err(js_error)?;

        let credential = JsFuture::from(promise).await.map_err(js_error)?;
        if credential.is_null() || credential.is_undefined() {
            return Ok(None);
        }

        read_credential(&credential).map(Some)
    }

    async fn is_conditional_mediation_available(&self) -> Result<bool, Error> {
        let constructor = get_field(&self.window, "PublicKeyCredential")?;
        if constructor.is_undefined() || constructor.is_null() {
            return Err(Error::UnsupportedCapability("PublicKeyCredential"));
        }

        let probe = get_field(&constructor, "isConditionalMediationAvailable")?
            .dyn_into::<Function>()
            .map_err(|_| Error::UnsupportedCapability("PublicKeyCredential.isConditionalMediationAvailable"))?;

        let promise = probe
            .call0(&constructor)
            .map_err(js_error)?
            .dyn_into::<Promise>()
            .map_err(js_error)?;

        Ok(JsFuture::from(promise).await.map_err(js_error)?.as_bool().unwrap_or(false))
    }
}

/// Runs spawned ceremonies on the browser microtask queue.
#[derive(Clone, Copy, Default)]
pub struct BrowserSpawner;

impl LocalSpawn for BrowserSpawner {
    fn spawn_local_obj(&self, future: LocalFutureObj<'static, ()>) -> Result<(), SpawnError> {
        wasm_bindgen_futures::spawn_local(future);
        Ok(())
    }
}

/// Renders ceremony outcomes into the demo page.
pub struct DomPresentation {
    window: Window,
    document: Document,
}

impl DomPresentation {
    pub fn new(window: Window, document: Document) -> Self {
        DomPresentation { window, document }
    }

    fn element(&self, id: &str) -> Option<Element> {
        let element = self.document.get_element_by_id(id);
        if element.is_none() {
            tracing::warn!(id, "element not found");
        }
        element
    }

    fn create(&self, tag: &str, class: Option<&str>, text: Option<&str>) -> Result<Element, JsValue> {
        let element = self.document.create_element(tag)?;
        if let Some(class) = class {
            element.set_class_name(class);
        }
        if text.is_some() {
            element.set_text_content(text);
        }
        Ok(element)
    }

    fn group(&self, title: &str) -> Result<Element, JsValue> {
        let group = self.create("div", Some("detail-group"), None)?;
        group.append_child(&self.create("h3", None, Some(title))?)?;
        Ok(group)
    }

    fn item(&self, label: &str, value: &Element) -> Result<Element, JsValue> {
        let item = self.create("div", Some("detail-item"), None)?;
        item.append_child(&self.create("strong", None, Some(label))?)?;
        item.append_child(value)?;
        Ok(item)
    }

    fn render_assertion(&self, details: &AssertionDetails) -> Result<(), JsValue> {
        let (Some(section), Some(container)) = (self.element(ASSERTION_SECTION_ID), self.element(ASSERTION_DETAILS_ID)) else {
            return Ok(());
        };

        container.set_text_content(None);

        let credential = self.group("Credential ID")?;
        credential.append_child(&self.create("div", Some("detail-value hex-value"), Some(&details.credential_id))?)?;
        container.append_child(&credential)?;

        let authenticator = self.group("Authenticator Data")?;
        authenticator.append_child(&self.item(
            "RP ID Hash:",
            &self.create("div", Some("detail-value hex-value"), Some(&details.rp_id_hash()))?,
        )?)?;

        let flags = self.create("div", Some("flags-list"), None)?;
        for (name, set) in details.authenticator_data.flags.entries() {
            let flag = self.create("div", Some("flag-item"), None)?;
            let (mark, class) = if set { ("✓", "flag-true") } else { ("✗", "flag-false") };
            flag.append_child(&self.create("span", Some(class), Some(mark))?)?;
            flag.append_child(&self.document.create_text_node(&format!(" {name}")))?;
            flags.append_child(&flag)?;
        }
        authenticator.append_child(&self.item(&format!("Flags (0x{}):", details.flags_byte()), &flags)?)?;

        authenticator.append_child(&self.item(
            "Sign Count:",
            &self.create("div", Some("detail-value"), Some(&details.sign_count().to_string()))?,
        )?)?;
        container.append_child(&authenticator)?;

        let client_data = self.group("Client Data JSON")?;
        client_data.append_child(&self.create("div", Some("detail-value json-value"), Some(&details.client_data_json))?)?;
        container.append_child(&client_data)?;

        let signature = self.group("Signature")?;
        signature.append_child(&self.create("div", Some("detail-value hex-value"), Some(&details.signature))?)?;
        container.append_child(&signature)?;

        if let Some(section) = section.dyn_ref::<HtmlElement>() {
            section.style().set_property("display", "block")?;
        }

        Ok(())
    }
}

impl PresentationSink for DomPresentation {
    fn show_status(&self, surface: Surface, level: StatusLevel, message: &str) {
        let id = match surface {
            Surface::Registration => REGISTER_STATUS_ID,
            Surface::Login => LOGIN_STATUS_ID,
        };

        if let Some(element) = self.element(id) {
            element.set_text_content(Some(message));
            element.set_class_name(&format!("status {}", level.as_str()));
        }
    }

    fn show_assertion(&self, details: &AssertionDetails) {
        if let Err(e) = self.render_assertion(details) {
            tracing::error!(error = ?e, "unable to render assertion details");
        }
    }

    fn set_trigger_enabled(&self, surface: Surface, enabled: bool) {
        let id = match surface {
            Surface::Registration => REGISTER_BUTTON_ID,
            Surface::Login => LOGIN_BUTTON_ID,
        };

        if let Some(button) = self.element(id).and_then(|e| e.dyn_into::<HtmlButtonElement>().ok()) {
            button.set_disabled(!enabled);
        }
    }

    fn schedule_reload(&self, delay: Duration) {
        let location = self.window.location();
        let reload = Closure::once_into_js(move || {
            if let Err(e) = location.reload() {
                tracing::error!(error = ?e, "unable to reload the page");
            }
        });

        let timeout = i32::try_from(delay.as_millis()).unwrap_or(i32::MAX);
        if let Err(e) = self
            .window
            .set_timeout_with_callback_and_timeout_and_arguments_0(reload.unchecked_ref(), timeout)
        {
            tracing::error!(error = ?e, "unable to schedule the page reload");
        }
    }
}

/// Entry point of the demo page.
#[wasm_bindgen]
pub struct PasskeyDemo {
    document: Document,
    controller: Rc<CeremonyController>,
}

#[wasm_bindgen]
impl PasskeyDemo {
    /// `config` is an optional object with the fields of [`CeremonyConfig`]; the
    /// relying party id defaults to the page hostname.
    #[wasm_bindgen(constructor)]
    pub fn new(config: JsValue) -> Result<PasskeyDemo, JsValue> {
        console_error_panic_hook::set_once();

        let window = web_sys::window().ok_or_else(|| JsValue::from_str("No window available"))?;
        let document = window.document().ok_or_else(|| JsValue::from_str("No document available"))?;
        let hostname = window.location().hostname()?;

        let config = if config.is_undefined() || config.is_null() {
            CeremonyConfig::for_origin(&hostname)
        } else {
            let has_rp_id = !Reflect::get(&config, &JsValue::from_str("rpId"))?.is_undefined();
            let mut parsed: CeremonyConfig = serde_wasm_bindgen::from_value(config).map_err(|e| format!("{e:?}"))?;
            if !has_rp_id {
                parsed.rp_id = CeremonyConfig::for_origin(&hostname).rp_id;
            }
            parsed
        };

        tracing::debug!(rp_id = %config.rp_id, "passkey demo configured");

        let controller = CeremonyController::new(
            config,
            BrowserCredentials::new(window.clone()),
            DomPresentation::new(window, document.clone()),
            BrowserSpawner,
        );

        Ok(PasskeyDemo { document, controller })
    }

    /// Wires the page controls and starts offering passkeys through autofill.
    pub fn mount(&self) -> Result<(), JsValue> {
        if let Some(button) = self.document.get_element_by_id(REGISTER_BUTTON_ID) {
            let controller = self.controller.clone();
            listen(&button, "click", move |_| {
                let controller = controller.clone();
                wasm_bindgen_futures::spawn_local(async move {
                    if let Err(e) = controller.start_registration().await {
                        tracing::debug!(error = %e, "registration ended without a credential");
                    }
                });
            })?;
        }

        let login = |controller: Rc<CeremonyController>| {
            wasm_bindgen_futures::spawn_local(async move {
                if let Err(e) = controller.start_manual_assertion().await {
                    tracing::debug!(error = %e, "login ended without an assertion");
                }
            });
        };

        if let Some(form) = self.document.get_element_by_id(LOGIN_FORM_ID) {
            let controller = self.controller.clone();
            listen(&form, "submit", move |event| {
                event.prevent_default();
                login(controller.clone());
            })?;
        } else if let Some(button) = self.document.get_element_by_id(LOGIN_BUTTON_ID) {
            let controller = self.controller.clone();
            listen(&button, "click", move |_| login(controller.clone()))?;
        }

        self.start_ambient_assertion();
        Ok(())
    }

    #[wasm_bindgen(js_name = "startAmbientAssertion")]
    pub fn start_ambient_assertion(&self) {
        let controller = self.controller.clone();
        wasm_bindgen_futures::spawn_local(async move {
            controller.start_ambient_assertion().await;
        });
    }

    #[wasm_bindgen(js_name = "cancelAmbientAssertion")]
    pub fn cancel_ambient_assertion(&self) -> bool {
        self.controller.cancel_ambient_assertion()
    }
}

/// Decodes raw authenticator data into `{ rpIdHash, flags, flagsByte, signCount }`.
#[wasm_bindgen(js_name = "parseAuthenticatorData")]
pub fn parse_authenticator_data(data: &[u8]) -> Result<JsValue, JsValue> {
    let auth_data = AuthenticatorData::from_slice(data).map_err(|e| JsValue::from_str(&e.to_string()))?;
    serde_wasm_bindgen::to_value(&auth_data).map_err(|e| JsValue::from_str(&format!("{e:?}")))
}

fn listen(target: &Element, event: &str, handler: impl FnMut(Event) + 'static) -> Result<(), JsValue> {
    let closure = Closure::<dyn FnMut(Event)>::new(handler);
    target.add_event_listener_with_callback(event, closure.as_ref().unchecked_ref())?;
    // page lifetime
    closure.forget();
    Ok(())
}
