//! Microwave control
//!
//! `MicrowaveDevice` is the capability: read the state, apply a partial update.
//! `HttpMicrowave` talks to the microwave's HTTP API (`GET`/`PUT <base>/state`,
//! camelCase JSON) and `SimulatedMicrowave` keeps the same rules in memory with
//! a real countdown.
//!
//! `MicrowaveTools` is what agents call. Every outcome, including transport
//! failures, becomes a short sentence the model can read.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use reqwest::StatusCode;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tokio::sync::Mutex;
use tokio::time::Instant;
use tower::BoxError;
use tracing::{debug, warn};

use crate::core::{tool_typed, ToolDef};

/// Device state as reported by the microwave.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MicrowaveState {
    pub minutes: i64,
    pub seconds: i64,
    pub power: i64,
    pub is_running: bool,
    pub remaining_time_in_seconds: i64,
}

impl MicrowaveState {
    /// Configured run time in seconds, `None` if it does not fit in an `i64`.
    pub fn total_seconds(&self) -> Option<i64> {
        run_time(self.minutes, self.seconds)
    }
}

fn run_time(minutes: i64, seconds: i64) -> Option<i64> {
    minutes.checked_mul(60)?.checked_add(seconds)
}

/// Partial update; unset fields are left as they are.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MicrowaveUpdate {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub minutes: Option<i64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub seconds: Option<i64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub power: Option<i64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub is_running: Option<bool>,
}

impl MicrowaveUpdate {
    /// Run for `seconds` at `power`%.
    pub fn start(seconds: i64, power: i64) -> Self {
        Self {
            minutes: Some(seconds / 60),
            seconds: Some(seconds % 60),
            power: Some(power),
            is_running: Some(true),
        }
    }

    pub fn stop() -> Self {
        Self {
            is_running: Some(false),
            ..Default::default()
        }
    }
}

#[derive(Debug, Error)]
pub enum MicrowaveError {
    /// Start requested while a program is running
    #[error("microwave is already running")]
    AlreadyRunning,

    /// Rejected fields, using the device's field names
    #[error("invalid fields: {}", .0.join(", "))]
    Invalid(Vec<String>),

    /// Missing or unreadable state in the response
    #[error("microwave did not report its state")]
    StateUnavailable,

    #[error("unexpected status {0}")]
    UnexpectedStatus(StatusCode),

    #[error("transport error: {0}")]
    Transport(#[from] reqwest::Error),
}

#[async_trait]
pub trait MicrowaveDevice: Send + Sync + 'static {
    async fn get_state(&self) -> Result<MicrowaveState, MicrowaveError>;

    async fn set_state(&self, update: MicrowaveUpdate) -> Result<MicrowaveState, MicrowaveError>;
}

// =============================
// HTTP device
// =============================

#[derive(Debug, Clone)]
pub struct HttpMicrowave {
    client: reqwest::Client,
    state_url: String,
}

impl HttpMicrowave {
    pub fn new(client: reqwest::Client, base_url: &str) -> Self {
        let base = base_url.trim_end_matches('/');
        Self {
            client,
            state_url: format!("{}/state", base),
        }
    }

    async fn read_state(response: reqwest::Response) -> Result<MicrowaveState, MicrowaveError> {
        let body = response.text().await?;
        serde_json::from_str::<Option<MicrowaveState>>(&body)
            .ok()
            .flatten()
            .ok_or(MicrowaveError::StateUnavailable)
    }
}

#[async_trait]
impl MicrowaveDevice for HttpMicrowave {
    async fn get_state(&self) -> Result<MicrowaveState, MicrowaveError> {
        let response = self.client.get(&self.state_url).send().await?;
        if response.status() != StatusCode::OK {
            return Err(MicrowaveError::UnexpectedStatus(response.status()));
        }
        Self::read_state(response).await
    }

    async fn set_state(&self, update: MicrowaveUpdate) -> Result<MicrowaveState, MicrowaveError> {
        let response = self.client.put(&self.state_url).json(&update).send().await?;
        match response.status() {
            StatusCode::OK => Self::read_state(response).await,
            StatusCode::BAD_REQUEST => Err(MicrowaveError::AlreadyRunning),
            StatusCode::UNPROCESSABLE_ENTITY => {
                let fields = response
                    .json::<Option<Vec<String>>>()
                    .await
                    .ok()
                    .flatten()
                    .unwrap_or_default();
                Err(MicrowaveError::Invalid(fields))
            }
            other => Err(MicrowaveError::UnexpectedStatus(other)),
        }
    }
}

// =============================
// Simulated device
// =============================

#[derive(Debug, Default)]
struct Program {
    minutes: i64,
    seconds: i64,
    power: i64,
    started: Option<(Instant, Duration)>,
}

impl Program {
    fn snapshot(&mut self, now: Instant) -> MicrowaveState {
        let remaining = match self.started {
            Some((at, total)) => {
                let elapsed = now.saturating_duration_since(at);
                if elapsed >= total {
                    self.started = None;
                    None
                } else {
                    let left = total - elapsed;
                    // round up so a fresh start reports its full duration
                    Some(left.as_secs() as i64 + i64::from(left.subsec_nanos() > 0))
                }
            }
            None => None,
        };
        MicrowaveState {
            minutes: self.minutes,
            seconds: self.seconds,
            power: self.power,
            is_running: remaining.is_some(),
            remaining_time_in_seconds: remaining.unwrap_or(0),
        }
    }
}

/// In-memory microwave with the same validation and conflict rules as the
/// real device. Uses tokio time, so paused-clock tests are deterministic.
#[derive(Debug)]
pub struct SimulatedMicrowave {
    program: Mutex<Program>,
}

impl Default for SimulatedMicrowave {
    fn default() -> Self {
        Self::new()
    }
}

impl SimulatedMicrowave {
    pub fn new() -> Self {
        Self {
            program: Mutex::new(Program {
                power: 100,
                ..Default::default()
            }),
        }
    }

    fn validate(update: &MicrowaveUpdate, current: &MicrowaveState) -> Vec<String> {
        let mut invalid = Vec::new();
        let minutes = update.minutes.unwrap_or(current.minutes);
        let seconds = update.seconds.unwrap_or(current.seconds);
        if minutes < 0 || run_time(minutes, seconds).is_none() {
            invalid.push("minutes".to_string());
        }
        if update.seconds.is_some_and(|s| !(0..60).contains(&s)) {
            invalid.push("seconds".to_string());
        }
        if update.power.is_some_and(|p| !(0..=100).contains(&p)) {
            invalid.push("power".to_string());
        }
        invalid
    }
}

#[async_trait]
impl MicrowaveDevice for SimulatedMicrowave {
    async fn get_state(&self) -> Result<MicrowaveState, MicrowaveError> {
        let mut program = self.program.lock().await;
        Ok(program.snapshot(Instant::now()))
    }

    async fn set_state(&self, update: MicrowaveUpdate) -> Result<MicrowaveState, MicrowaveError> {
        let mut program = self.program.lock().await;
        let now = Instant::now();
        let current = program.snapshot(now);

        if current.is_running && update.is_running == Some(true) {
            return Err(MicrowaveError::AlreadyRunning);
        }
        let invalid = Self::validate(&update, &current);
        if !invalid.is_empty() {
            return Err(MicrowaveError::Invalid(invalid));
        }

        if let Some(m) = update.minutes {
            program.minutes = m;
        }
        if let Some(s) = update.seconds {
            program.seconds = s;
        }
        if let Some(p) = update.power {
            program.power = p;
        }
        match update.is_running {
            Some(true) => {
                // validated above
                let total = run_time(program.minutes, program.seconds).unwrap_or_default();
                program.started = Some((now, Duration::from_secs(total as u64)));
                debug!(seconds = total, power = program.power, "simulated microwave started");
                // reported at the instant of starting, before any time passes
                return Ok(MicrowaveState {
                    minutes: program.minutes,
                    seconds: program.seconds,
                    power: program.power,
                    is_running: true,
                    remaining_time_in_seconds: total,
                });
            }
            Some(false) => {
                program.started = None;
                debug!("simulated microwave stopped");
            }
            None => {}
        }
        Ok(program.snapshot(now))
    }
}

// =============================
// Agent-facing tools
// =============================

#[derive(Debug, Deserialize, JsonSchema)]
pub struct StartMicrowaveArgs {
    /// How long to run, in seconds (>= 0)
    #[schemars(range(min = 0))]
    pub seconds: i64,
    /// Power in percent (0 - 100)
    #[schemars(range(min = 0, max = 100))]
    pub power: i64,
}

#[derive(Debug, Deserialize, JsonSchema)]
pub struct NoArgs {}

/// Natural-language front for a `MicrowaveDevice`.
#[derive(Clone)]
pub struct MicrowaveTools {
    device: Arc<dyn MicrowaveDevice>,
}

impl MicrowaveTools {
    pub fn new(device: Arc<dyn MicrowaveDevice>) -> Self {
        Self { device }
    }

    pub async fn start(&self, seconds: i64, power: i64) -> String {
        let mut invalid = Vec::new();
        if seconds < 0 {
            invalid.push("seconds".to_string());
        }
        if !(0..=100).contains(&power) {
            invalid.push("power".to_string());
        }
        if !invalid.is_empty() {
            return invalid_input(&invalid);
        }

        let started = self
            .device
            .set_state(MicrowaveUpdate::start(seconds, power))
            .await
            .and_then(|state| {
                let total = state.total_seconds().ok_or(MicrowaveError::StateUnavailable)?;
                Ok((total, state.power))
            });
        match started {
            Ok((total, power)) => {
                format!("The microwave will run for {} seconds at {}% power.", total, power)
            }
            Err(MicrowaveError::AlreadyRunning) => {
                "Cannot start microwave when already running. Stop first.".to_string()
            }
            Err(MicrowaveError::Invalid(fields)) => invalid_input(&fields),
            Err(MicrowaveError::StateUnavailable) => {
                "The microwave started but could not report it's state.".to_string()
            }
            Err(e) => failure(e),
        }
    }

    pub async fn stop(&self) -> String {
        match self.device.set_state(MicrowaveUpdate::stop()).await {
            Ok(_) => "The microwave is stopped.".to_string(),
            Err(MicrowaveError::StateUnavailable) => {
                "The microwave has been stopped but it's state could not be reported.".to_string()
            }
            Err(e) => failure(e),
        }
    }

    pub async fn state(&self) -> String {
        match self.device.get_state().await {
            Ok(state) if state.is_running => format!(
                "The microwave is running at {}% power, {} seconds remaining.",
                state.power, state.remaining_time_in_seconds
            ),
            Ok(_) => "The microwave is off.".to_string(),
            Err(MicrowaveError::StateUnavailable) => {
                "Could not read the state of the microwave.".to_string()
            }
            Err(e) => failure(e),
        }
    }

    pub fn tool_defs(&self) -> Vec<ToolDef> {
        let start = self.clone();
        let stop = self.clone();
        let state = self.clone();
        vec![
            tool_typed(
                "start_microwave",
                "Sets the microwave to run for `seconds` seconds (>= 0) at `power`% (0 - 100). Cannot be used if the microwave is already running.",
                move |args: StartMicrowaveArgs| {
                    let tools = start.clone();
                    async move { Ok::<_, BoxError>(tools.start(args.seconds, args.power).await) }
                },
            ),
            tool_typed(
                "stop_microwave",
                "Immediately stops any running microwave operations.",
                move |_: NoArgs| {
                    let tools = stop.clone();
                    async move { Ok::<_, BoxError>(tools.stop().await) }
                },
            ),
            tool_typed(
                "get_microwave_state",
                "Gets whether the microwave is on and how many seconds remain, or if it's off.",
                move |_: NoArgs| {
                    let tools = state.clone();
                    async move { Ok::<_, BoxError>(tools.state().await) }
                },
            ),
        ]
    }
}

/// The public tool takes plain seconds; the device splits them into
/// minutes and seconds, so both map back to `seconds`.
fn invalid_input(fields: &[String]) -> String {
    let mut names: Vec<&str> = Vec::with_capacity(fields.len());
    for field in fields {
        let name = if field == "minutes" { "seconds" } else { field.as_str() };
        if !names.contains(&name) {
            names.push(name);
        }
    }
    format!("Something is wrong with the input: {}.", names.join(", "))
}

fn failure(err: MicrowaveError) -> String {
    match err {
        MicrowaveError::UnexpectedStatus(status) => format!("Unexpected error: {}.", status),
        MicrowaveError::Transport(e) => {
            warn!(error = %e, "microwave unreachable");
            "Could not reach the microwave.".to_string()
        }
        other => format!("Unexpected error: {}.", other),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    fn tools() -> (Arc<SimulatedMicrowave>, MicrowaveTools) {
        let device = Arc::new(SimulatedMicrowave::new());
        (device.clone(), MicrowaveTools::new(device))
    }

    #[test]
    fn update_serializes_camel_case_and_skips_unset() {
        let start = serde_json::to_value(MicrowaveUpdate::start(90, 80)).unwrap();
        assert_eq!(
            start,
            serde_json::json!({"minutes": 1, "seconds": 30, "power": 80, "isRunning": true})
        );
        let stop = serde_json::to_value(MicrowaveUpdate::stop()).unwrap();
        assert_eq!(stop, serde_json::json!({"isRunning": false}));
    }

    #[test]
    fn invalid_fields_are_renamed_and_deduplicated() {
        let fields = vec!["minutes".to_string(), "seconds".to_string(), "power".to_string()];
        assert_eq!(invalid_input(&fields), "Something is wrong with the input: seconds, power.");
    }

    #[tokio::test]
    async fn negative_seconds_reports_the_public_name() {
        let (device, tools) = tools();
        assert_eq!(tools.start(-1, 50).await, "Something is wrong with the input: seconds.");
        assert!(!device.get_state().await.unwrap().is_running);
    }

    #[tokio::test]
    async fn power_out_of_range_is_rejected_before_the_device() {
        let (device, tools) = tools();
        assert_eq!(tools.start(30, 101).await, "Something is wrong with the input: power.");
        assert!(!device.get_state().await.unwrap().is_running);
    }

    #[tokio::test(start_paused = true)]
    async fn start_while_running_keeps_the_running_program() {
        let (device, tools) = tools();
        assert_eq!(
            tools.start(90, 80).await,
            "The microwave will run for 90 seconds at 80% power."
        );
        let before = device.get_state().await.unwrap();

        assert_eq!(
            tools.start(10, 20).await,
            "Cannot start microwave when already running. Stop first."
        );
        let after = device.get_state().await.unwrap();
        assert_eq!(before, after);
        assert_eq!(after.power, 80);
    }

    #[tokio::test(start_paused = true)]
    async fn state_counts_down_and_stop_turns_off() {
        let (_, tools) = tools();
        tools.start(90, 80).await;
        tokio::time::advance(Duration::from_secs(30)).await;
        assert_eq!(
            tools.state().await,
            "The microwave is running at 80% power, 60 seconds remaining."
        );
        assert_eq!(tools.stop().await, "The microwave is stopped.");
        assert_eq!(tools.state().await, "The microwave is off.");
    }

    #[tokio::test(start_paused = true)]
    async fn program_ends_by_itself() {
        let (device, tools) = tools();
        tools.start(5, 100).await;
        tokio::time::advance(Duration::from_secs(6)).await;
        let state = device.get_state().await.unwrap();
        assert!(!state.is_running);
        assert_eq!(state.remaining_time_in_seconds, 0);
        // the program can be started again
        assert!(tools.start(5, 100).await.starts_with("The microwave will run"));
    }

    #[tokio::test(start_paused = true)]
    async fn repeated_reads_only_lose_time() {
        let device = SimulatedMicrowave::new();
        device.set_state(MicrowaveUpdate::start(120, 60)).await.unwrap();
        let first = device.get_state().await.unwrap();
        let again = device.get_state().await.unwrap();
        assert_eq!(first, again);

        tokio::time::advance(Duration::from_millis(1500)).await;
        let later = device.get_state().await.unwrap();
        assert!(later.remaining_time_in_seconds <= first.remaining_time_in_seconds);
        assert_eq!(
            MicrowaveState { remaining_time_in_seconds: first.remaining_time_in_seconds, ..later },
            first
        );
    }

    #[tokio::test]
    async fn run_time_that_overflows_is_rejected() {
        let device = SimulatedMicrowave::new();
        let update = MicrowaveUpdate {
            minutes: Some(i64::MAX),
            seconds: Some(0),
            power: Some(50),
            is_running: Some(true),
        };
        match device.set_state(update).await {
            Err(MicrowaveError::Invalid(fields)) => assert_eq!(fields, vec!["minutes".to_string()]),
            other => panic!("unexpected: {:?}", other),
        }
        assert!(!device.get_state().await.unwrap().is_running);

        // minutes alone fit, but not once the current seconds are added
        device
            .set_state(MicrowaveUpdate { seconds: Some(59), ..Default::default() })
            .await
            .unwrap();
        let update = MicrowaveUpdate { minutes: Some(i64::MAX / 60), ..Default::default() };
        assert!(matches!(
            device.set_state(update).await,
            Err(MicrowaveError::Invalid(_))
        ));
    }

    #[test]
    fn total_seconds_is_none_when_it_overflows() {
        let state = MicrowaveState { minutes: i64::MAX, ..Default::default() };
        assert_eq!(state.total_seconds(), None);
        let state = MicrowaveState { minutes: 2, seconds: 5, ..Default::default() };
        assert_eq!(state.total_seconds(), Some(125));
    }

    #[test]
    fn tool_defs_expose_three_tools() {
        let (_, tools) = tools();
        let names: Vec<String> = tools.tool_defs().into_iter().map(|t| t.name).collect();
        assert_eq!(names, vec!["start_microwave", "stop_microwave", "get_microwave_state"]);
    }

    proptest! {
        #[test]
        fn valid_start_while_idle_runs_as_requested(seconds in 0i64..=7200, power in 0i64..=100) {
            let rt = tokio::runtime::Builder::new_current_thread()
                .enable_time()
                .start_paused(true)
                .build()
                .unwrap();
            let state = rt.block_on(async {
                SimulatedMicrowave::new()
                    .set_state(MicrowaveUpdate::start(seconds, power))
                    .await
                    .unwrap()
            });
            prop_assert!(state.is_running);
            prop_assert_eq!(state.total_seconds(), Some(seconds));
            prop_assert_eq!(state.remaining_time_in_seconds, seconds);
            prop_assert_eq!(state.power, power);
        }
    }
}
