//! Collector commands that start and stop profiling sessions.
//!
//! Arguments arrive as a JSON object. Periods and durations are given in
//! seconds and are clamped into supported ranges before being converted to
//! milliseconds.

use super::controller::SessionController;
use crate::utils::config::{
    DEFAULT_SAMPLING_DURATION_SECONDS, DEFAULT_SAMPLING_FREQUENCY_SECONDS, INVALID_SESSION_ID,
    MAXIMUM_SAMPLING_DURATION_SECONDS, MAXIMUM_SAMPLING_FREQUENCY_SECONDS,
    MINIMUM_SAMPLING_DURATION_SECONDS, MINIMUM_SAMPLING_FREQUENCY_SECONDS,
};
use crate::utils::error::CommandError;
use log::debug;
use serde_json::{json, Map, Value};
use std::time::Duration;

/// Decoded `start_profiler` arguments
#[derive(Debug, Clone, PartialEq)]
pub struct StartCommandArgs {
    pub profile_id: i32,
    pub frequency: Duration,
    pub duration: Duration,
}

impl StartCommandArgs {
    /// Decode and clamp the command arguments
    ///
    /// # Errors
    /// * `CommandError::MissingProfileId` - no usable non-zero `profile_id`
    /// * `CommandError::InvalidArgument` - a period or duration is not a number
    pub fn from_arguments(arguments: Option<&Map<String, Value>>) -> Result<Self, CommandError> {
        let arguments = arguments.ok_or(CommandError::MissingProfileId)?;

        let profile_id = arguments
            .get("profile_id")
            .and_then(Value::as_i64)
            .and_then(|id| i32::try_from(id).ok())
            .filter(|id| *id != INVALID_SESSION_ID)
            .ok_or(CommandError::MissingProfileId)?;

        let period = seconds_argument(
            arguments,
            "sample_period",
            DEFAULT_SAMPLING_FREQUENCY_SECONDS,
            MINIMUM_SAMPLING_FREQUENCY_SECONDS,
            MAXIMUM_SAMPLING_FREQUENCY_SECONDS,
        )?;
        let duration = seconds_argument(
            arguments,
            "duration",
            DEFAULT_SAMPLING_DURATION_SECONDS,
            MINIMUM_SAMPLING_DURATION_SECONDS,
            MAXIMUM_SAMPLING_DURATION_SECONDS,
        )?;

        Ok(Self {
            profile_id,
            frequency: to_millis(period),
            duration: to_millis(duration),
        })
    }
}

/// Decoded `stop_profiler` arguments
#[derive(Debug, Clone, PartialEq)]
pub struct StopCommandArgs {
    pub profile_id: i32,
    pub report_data: bool,
}

impl StopCommandArgs {
    /// Missing `profile_id` means "whichever session is active"
    pub fn from_arguments(arguments: Option<&Map<String, Value>>) -> Result<Self, CommandError> {
        let Some(arguments) = arguments else {
            return Ok(Self {
                profile_id: INVALID_SESSION_ID,
                report_data: true,
            });
        };

        let profile_id = match arguments.get("profile_id") {
            None | Some(Value::Null) => INVALID_SESSION_ID,
            Some(value) => value
                .as_i64()
                .and_then(|id| i32::try_from(id).ok())
                .ok_or(CommandError::InvalidArgument("profile_id"))?,
        };
        let report_data = match arguments.get("report_data") {
            None | Some(Value::Null) => true,
            Some(value) => value
                .as_bool()
                .ok_or(CommandError::InvalidArgument("report_data"))?,
        };

        Ok(Self {
            profile_id,
            report_data,
        })
    }
}

fn seconds_argument(
    arguments: &Map<String, Value>,
    name: &'static str,
    default: f64,
    min: f64,
    max: f64,
) -> Result<f64, CommandError> {
    match arguments.get(name) {
        None | Some(Value::Null) => Ok(default),
        Some(value) => {
            let seconds = value.as_f64().ok_or(CommandError::InvalidArgument(name))?;
            if seconds.is_nan() {
                return Err(CommandError::InvalidArgument(name));
            }
            Ok(seconds.clamp(min, max))
        }
    }
}

fn to_millis(seconds: f64) -> Duration {
    Duration::from_millis((seconds * 1000.0).round() as u64)
}

/// Handle a `start_profiler` command and build its response
///
/// Responses are `{}` on success or `{"error": message}`.
pub fn process_start_command(controller: &SessionController, arguments: Option<&Value>) -> Value {
    let args = match StartCommandArgs::from_arguments(arguments.and_then(Value::as_object)) {
        Ok(args) => args,
        Err(e) => return error_response(e.to_string()),
    };

    debug!("Processing start command: {:?}", args);

    if controller.start(args.profile_id, args.frequency, args.duration) {
        json!({})
    } else {
        error_response("Unable to start a thread profiling session.".to_string())
    }
}

/// Handle a `stop_profiler` command and build its response
pub fn process_stop_command(controller: &SessionController, arguments: Option<&Value>) -> Value {
    let args = match StopCommandArgs::from_arguments(arguments.and_then(Value::as_object)) {
        Ok(args) => args,
        Err(e) => return error_response(e.to_string()),
    };

    debug!("Processing stop command: {:?}", args);

    if controller.stop(args.profile_id, args.report_data) {
        json!({})
    } else {
        error_response(format!(
            "No thread profiling session with profile_id {} to stop.",
            args.profile_id
        ))
    }
}

fn error_response(message: String) -> Value {
    json!({ "error": message })
}
