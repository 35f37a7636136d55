use alloc::string::{String, ToString};
use alloc::vec::Vec;
use log::{debug, error, info};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use super::CalibrationCoefficients;
use crate::collaborators::Clock;
use crate::error::{PipelineError, PipelineResult};
use crate::payload::ScanPayload;

/// Message used when an undecodable response is not valid UTF-8 either
const UNDECODABLE_RESPONSE: &str = "Failed to decode data received from remote server.";

/// Where and how to reach the calibration oracle
#[derive(Serialize, Deserialize, Debug, Clone, Default, PartialEq, Eq)]
pub struct OracleConfig {
    /// Absolute URL the calibration request is posted to
    pub endpoint: String,
    /// Opaque credential sent with every request
    pub token: String,
}

/// Sends one `application/x-www-form-urlencoded` POST and returns the body.
///
/// Errors are human readable descriptions of the transport failure (DNS,
/// connect, timeout, invalid URL). The HTTP status is not part of the
/// contract: whatever body came back is returned.
pub trait HttpTransport {
    fn post_form(
        &self,
        endpoint: &str,
        fields: &[(&str, &str)],
    ) -> impl Future<Output = Result<Vec<u8>, String>>;
}

/// Oracle response envelope
#[derive(Deserialize, Debug)]
struct CalibrationStatus {
    slope: Option<SlopeParameters>,
}

#[derive(Deserialize, Debug)]
#[serde(rename_all = "camelCase")]
struct SlopeParameters {
    slope_slope: Option<f64>,
    slope_offset: Option<f64>,
    offset_slope: Option<f64>,
    offset_offset: Option<f64>,
    #[serde(rename = "isValidForFooterWithReverseCRCs")]
    is_valid_for_footer_with_reverse_crcs: Option<f64>,
}

/// Fetches calibration coefficients for a scan from the remote oracle.
///
/// Stateless apart from its transport and clock: one call issues exactly one
/// request and never retries.
pub struct RemoteCalibrationClient<T: HttpTransport, C: Clock> {
    transport: T,
    clock: C,
}

impl<T: HttpTransport, C: Clock> RemoteCalibrationClient<T, C> {
    pub fn new(transport: T, clock: C) -> Self {
        Self { transport, clock }
    }

    pub fn clock(&self) -> &C {
        &self.clock
    }

    pub fn transport(&self) -> &T {
        &self.transport
    }

    /// Ask the oracle for the coefficients of the sensor that produced `payload`
    ///
    /// The result is bound to `serial`; the response itself carries no serial.
    pub async fn fetch(
        &self,
        payload: &ScanPayload<'_>,
        serial: &str,
        oracle: &OracleConfig,
    ) -> PipelineResult<CalibrationCoefficients> {
        let content = hex::encode(payload.as_bytes());
        let timestamp = self.clock.now().timestamp_millis().to_string();
        let fields = [
            ("token", oracle.token.as_str()),
            ("content", content.as_str()),
            ("timestamp", timestamp.as_str()),
        ];

        debug!("Requesting calibration for sensor {} from {}", serial, oracle.endpoint);

        let body = self
            .transport
            .post_form(&oracle.endpoint, &fields)
            .await
            .map_err(|e| {
                error!("Calibration request failed: {}", e);
                PipelineError::Transport(e)
            })?;

        let coefficients = parse_response(&body, serial)?;
        info!("Received calibration for sensor {}", serial);
        Ok(coefficients)
    }
}

/// Turn an oracle response body into coefficients for `serial`
fn parse_response(body: &[u8], serial: &str) -> PipelineResult<CalibrationCoefficients> {
    let status = serde_json::from_slice::<Value>(body)
        .map_err(|e| e.to_string())
        .and_then(|value| match value {
            Value::Object(_) => {
                serde_json::from_value::<CalibrationStatus>(value).map_err(|e| e.to_string())
            }
            _ => Err("response is not a JSON object".to_string()),
        })
        .map_err(|details| {
            let text = core::str::from_utf8(body).unwrap_or(UNDECODABLE_RESPONSE);
            error!("Failed to decode calibration response ({}): {}", details, text);
            PipelineError::Decode(text.to_string())
        })?;

    let Some(slope) = status.slope else {
        error!("Calibration response has no slope");
        return Err(PipelineError::MissingCalibration);
    };

    Ok(CalibrationCoefficients::new(
        slope.slope_slope.unwrap_or(0.0),
        slope.slope_offset.unwrap_or(0.0),
        slope.offset_slope.unwrap_or(0.0),
        slope.offset_offset.unwrap_or(0.0),
        slope.is_valid_for_footer_with_reverse_crcs.unwrap_or(1.0) as i32,
        serial,
    ))
}
