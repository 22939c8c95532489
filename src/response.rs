use crate::errors::{DeviceError, ErrorCode, TransportError};
use crate::transaction::ResponseTransaction;
use mime::Mime;
use serde::Deserialize;
use serde::de::DeserializeOwned;
use std::any::TypeId;

/// Status half of the response envelope. Both fields default so that
/// management responses lacking them decode as success.
#[derive(Debug, Deserialize)]
pub(crate) struct ResponseStatus {
    #[serde(rename = "ErrorNumber", default)]
    pub(crate) error_number: ErrorCode,
    #[serde(rename = "ErrorMessage", default)]
    pub(crate) error_message: String,
}

#[derive(Debug, Deserialize)]
struct ValueResponse<T> {
    #[serde(rename = "Value")]
    value: T,
}

pub(crate) fn check_json_content_type(
    content_type: Option<&reqwest::header::HeaderValue>,
) -> Result<(), TransportError> {
    let unexpected = |content_type: &str| TransportError::UnexpectedContentType {
        content_type: content_type.to_owned(),
    };

    let raw = content_type
        .and_then(|value| value.to_str().ok())
        .ok_or_else(|| unexpected("(none)"))?;
    let mime_type = raw.parse::<Mime>().map_err(|_err| unexpected(raw))?;
    if mime_type.essence_str() != mime::APPLICATION_JSON.as_ref() {
        return Err(unexpected(raw));
    }
    match mime_type.get_param(mime::CHARSET) {
        Some(mime::UTF_8) | None => Ok(()),
        Some(_charset) => Err(unexpected(raw)),
    }
}

/// Decode a response body into its transaction ids and either the typed
/// `Value` payload or the device error the envelope reports.
pub(crate) fn decode_envelope<R: DeserializeOwned + 'static>(
    bytes: &[u8],
) -> Result<(ResponseTransaction, Result<R, DeviceError>), TransportError> {
    let status: ResponseStatus = serde_json::from_slice(bytes)?;
    let transaction: ResponseTransaction = serde_json::from_slice(bytes)?;

    if !status.error_number.is_ok() {
        let err = DeviceError::new(status.error_number, status.error_message);
        return Ok((transaction, Err(err)));
    }

    // serde expects `null` for the unit type, but void PUT responses omit
    // `Value` entirely, so don't even look for it.
    let value = if TypeId::of::<R>() == TypeId::of::<()>() {
        serde_json::from_slice::<R>(b"null")?
    } else {
        serde_json::from_slice::<ValueResponse<R>>(bytes)?.value
    };
    Ok((transaction, Ok(value)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::errors::ErrorKind;

    #[test]
    fn success_envelope_yields_typed_value() {
        let body = br#"{"ClientTransactionID":4,"ServerTransactionID":9,"ErrorNumber":0,"ErrorMessage":"","Value":true}"#;
        let (transaction, result) = decode_envelope::<bool>(body).expect("decode failed");
        assert_eq!(transaction.client_transaction_id, Some(4));
        assert_eq!(transaction.server_transaction_id, Some(9));
        assert_eq!(result.expect("expected success"), true);
    }

    #[test]
    fn error_envelope_yields_device_error() {
        let body = br#"{"ErrorNumber":1031,"ErrorMessage":"not connected","Value":null}"#;
        let (_, result) = decode_envelope::<bool>(body).expect("decode failed");
        let err = result.expect_err("expected device error");
        assert_eq!(err.kind(), ErrorKind::NotConnected);
        assert_eq!(err.message, "not connected");
    }

    #[test]
    fn void_response_without_value_decodes_as_unit() {
        let body = br#"{"ClientTransactionID":1,"ServerTransactionID":2,"ErrorNumber":0,"ErrorMessage":""}"#;
        let (_, result) = decode_envelope::<()>(body).expect("decode failed");
        assert!(result.is_ok());
    }

    #[test]
    fn missing_value_for_typed_response_is_malformed() {
        let body = br#"{"ErrorNumber":0,"ErrorMessage":""}"#;
        assert!(decode_envelope::<bool>(body).is_err());
    }

    #[test]
    fn json_content_type_accepted() {
        let value = reqwest::header::HeaderValue::from_static("application/json; charset=utf-8");
        assert!(check_json_content_type(Some(&value)).is_ok());
    }

    #[test]
    fn non_json_content_type_rejected() {
        let value = reqwest::header::HeaderValue::from_static("text/html");
        assert!(matches!(
            check_json_content_type(Some(&value)),
            Err(TransportError::UnexpectedContentType { content_type }) if content_type == "text/html"
        ));
        assert!(check_json_content_type(None).is_err());
    }
}
