pub mod dsp;
pub mod encoder;
pub mod error;
#[cfg(feature = "loader")]
pub mod loader;
pub mod morse;
pub mod otp;
#[cfg(feature = "runtime")]
pub mod scheduler;
pub mod sequence;
pub mod settings;
pub mod voice_pack;
pub mod xor;

use serde::Serialize;
use wasm_bindgen::prelude::*;

use crate::encoder::EncodingMethod;
use crate::error::{StationError, render_diagnostic};
use crate::settings::TransmissionSettings;
use crate::voice_pack::SoundKey;

pub use crate::encoder::EncodedMessage;
pub use crate::sequence::{TransmissionEvent, TransmissionSequence};

/// The crate version, read from Cargo.toml at compile time.
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

fn js_error(source: &str, err: impl Into<StationError>) -> JsValue {
    JsValue::from_str(&render_diagnostic(source, &err.into()))
}

fn to_js<T: Serialize>(value: &T) -> Result<JsValue, JsValue> {
    serde_wasm_bindgen::to_value(value).map_err(|e| JsValue::from_str(&format!("{e}")))
}

/// Settings from JSON; an empty string means defaults.
fn settings_from_json(json: &str) -> Result<TransmissionSettings, StationError> {
    if json.trim().is_empty() {
        return Ok(TransmissionSettings::default());
    }
    TransmissionSettings::from_json(json)
}

/// WASM-exposed: return the numbers_station core version string.
#[wasm_bindgen]
pub fn core_version() -> String {
    VERSION.to_string()
}

/// WASM-exposed: validate, encode and group a message.
/// `method` is `"a1z26"` or `"checkerboard"`.
#[wasm_bindgen]
pub fn encode_message(text: &str, method: &str) -> Result<JsValue, JsValue> {
    let method: EncodingMethod = method.parse().map_err(|e| js_error(method, e))?;
    let message = encoder::encode_message(text, method).map_err(|e| js_error(text, e))?;
    to_js(&message)
}

/// WASM-exposed: decode an array of digit groups back to text.
#[wasm_bindgen]
pub fn decode_message(groups: JsValue, method: &str, unpadded_len: Option<u32>) -> Result<String, JsValue> {
    let groups: Vec<String> =
        serde_wasm_bindgen::from_value(groups).map_err(|e| JsValue::from_str(&format!("{e}")))?;
    let method: EncodingMethod = method.parse().map_err(|e| js_error(method, e))?;
    let joined = groups.concat();
    encoder::decode_message(&groups, method, unpadded_len.map(|n| n as usize)).map_err(|e| js_error(&joined, e))
}

/// WASM-exposed: one-time-pad encryption of a digit string.
#[wasm_bindgen]
pub fn encrypt_otp(plaintext: &str, key: &str) -> Result<JsValue, JsValue> {
    let result = otp::encrypt_otp(plaintext, key).map_err(|e| js_error(plaintext, e))?;
    to_js(&result)
}

/// WASM-exposed: one-time-pad decryption of a digit string.
#[wasm_bindgen]
pub fn decrypt_otp(ciphertext: &str, key: &str) -> Result<JsValue, JsValue> {
    let result = otp::decrypt_otp(ciphertext, key).map_err(|e| js_error(ciphertext, e))?;
    to_js(&result)
}

#[wasm_bindgen]
pub fn xor_ascii(text: &str, key: &str) -> Result<JsValue, JsValue> {
    let result = xor::xor_ascii(text, key).map_err(|e| js_error(text, e))?;
    to_js(&result)
}

#[wasm_bindgen]
pub fn xor_hex(data: &str, key: &str) -> Result<JsValue, JsValue> {
    let result = xor::xor_hex(data, key).map_err(|e| js_error(data, e))?;
    to_js(&result)
}

/// WASM-exposed: Morse code for a character or a control word
/// (`"achtung"`, `"trennung"`, `"ende"`). Control words come back as
/// `code/code/...`.
#[wasm_bindgen]
pub fn morse_code_for(symbol: &str) -> Option<String> {
    let mut chars = symbol.chars();
    if let (Some(ch), None) = (chars.next(), chars.next()) {
        return morse::code_for(ch).map(str::to_string);
    }
    symbol
        .parse::<SoundKey>()
        .ok()
        .and_then(morse::control_word_code)
}

/// WASM-exposed: render raw Morse text to a 16-bit mono WAV byte array.
/// `settings_json` uses the shell's camelCase settings keys.
#[wasm_bindgen]
pub fn render_morse_wav(text: &str, settings_json: &str, sample_rate: u32) -> Result<Vec<u8>, JsValue> {
    let settings = settings_from_json(settings_json).map_err(|e| js_error(settings_json, e))?;
    dsp::renderer::render_cw_wav(text, &settings, sample_rate).map_err(|e| js_error(text, e))
}
