//! Integration tests for the Supervisor → arbiter → dispatcher pipeline.
//!
//! Every test drives the real control loop against `MockPlatform`; only
//! the network and the clock are simulated.

use std::time::{Duration, Instant};

use smartiron::advisory::{AdvisoryDecision, AdvisoryGateway, AdvisorySource};
use smartiron::app::commands::{AppCommand, ControlHandle, ControlMode, control_channel};
use smartiron::app::events::AppEvent;
use smartiron::app::ports::{HttpReply, OraclePort};
use smartiron::app::service::{CycleOutcome, Supervisor};
use smartiron::config::SupervisorConfig;
use smartiron::dispatch::RpcCall;
use smartiron::error::{AuthError, Error, OracleError, TransportError};
use smartiron::fsm::StateId;
use smartiron::fsm::context::{FinalCommand, SensorSnapshot};

use crate::mock_platform::{
    FixedAdvisor, ManualClock, MockPlatform, PlatformCall, RecordingSink, test_config,
};

fn started(platform: &mut MockPlatform) -> (Supervisor, ManualClock, RecordingSink) {
    started_with(test_config(), platform)
}

fn started_with(
    config: SupervisorConfig,
    platform: &mut MockPlatform,
) -> (Supervisor, ManualClock, RecordingSink) {
    let mut sup = Supervisor::new(config);
    let clock = ManualClock::default();
    let mut sink = RecordingSink::default();
    sup.start(platform, &clock, &mut sink).expect("login");
    (sup, clock, sink)
}

fn completed(outcome: &CycleOutcome) -> FinalCommand {
    match outcome {
        CycleOutcome::Completed { command, .. } => *command,
        CycleOutcome::Aborted(e) => panic!("cycle aborted: {e}"),
    }
}

// ── End-to-end scenarios ─────────────────────────────────────

#[test]
fn heating_inside_envelope_follows_advisory() {
    let mut platform = MockPlatform::reporting(130.0, 50.0, true);
    let (mut sup, clock, mut sink) = started(&mut platform);
    let mut advisor = FixedAdvisor::new(true, false);

    let report = sup.run_cycle(&mut platform, &mut advisor, &clock, &mut sink);

    assert_eq!(completed(&report.outcome), FinalCommand { relay: true, buzzer: false });
    assert_eq!(platform.rpcs(), vec![RpcCall::relay(true)]);
    assert_eq!(report.next_delay, Duration::from_millis(2000));
    assert_eq!(sup.state(), StateId::Sleeping);
}

#[test]
fn overheat_cuts_relay_and_sounds_corroborated_alarm() {
    let mut platform = MockPlatform::reporting(180.0, 50.0, true);
    let (mut sup, clock, mut sink) = started(&mut platform);
    let mut advisor = FixedAdvisor::new(true, true);

    let report = sup.run_cycle(&mut platform, &mut advisor, &clock, &mut sink);

    assert_eq!(completed(&report.outcome), FinalCommand { relay: false, buzzer: true });
    assert_eq!(platform.rpcs(), vec![RpcCall::relay(false), RpcCall::buzzer(true)]);
    assert_eq!(
        sink.count(|e| matches!(e, AppEvent::SafetyOverride { .. })),
        1
    );
}

#[test]
fn missing_fabric_cuts_relay() {
    let mut platform = MockPlatform::reporting(130.0, 50.0, false);
    let (mut sup, clock, mut sink) = started(&mut platform);
    let mut advisor = FixedAdvisor::new(true, false);

    let report = sup.run_cycle(&mut platform, &mut advisor, &clock, &mut sink);

    assert_eq!(completed(&report.outcome), FinalCommand::all_off());
    assert_eq!(platform.rpcs(), vec![RpcCall::relay(false)]);
}

#[test]
fn empty_telemetry_never_heats() {
    let mut platform = MockPlatform::reporting(0.0, 0.0, false);
    platform.steady = HttpReply::new(200, r#"{"temperature":[],"humidity":[]}"#);
    let (mut sup, clock, mut sink) = started(&mut platform);
    let mut advisor = FixedAdvisor::new(true, true);

    let report = sup.run_cycle(&mut platform, &mut advisor, &clock, &mut sink);

    assert_eq!(completed(&report.outcome), FinalCommand::all_off());
    assert_eq!(advisor.seen.len(), 1);
    assert_eq!(advisor.seen[0].temperature, 0.0);
}

// ── Session renewal ──────────────────────────────────────────

#[test]
fn telemetry_401_relogs_once_and_retries_with_new_token() {
    let mut platform = MockPlatform::reporting(130.0, 50.0, true);
    let (mut sup, clock, mut sink) = started(&mut platform);
    platform.clear_calls();
    platform
        .telemetry_script
        .push_back(HttpReply::new(401, r#"{"status":401,"message":"Token has expired"}"#));
    let mut advisor = FixedAdvisor::new(true, false);

    let report = sup.run_cycle(&mut platform, &mut advisor, &clock, &mut sink);

    assert!(matches!(report.outcome, CycleOutcome::Completed { .. }));
    assert_eq!(
        &platform.calls[..3],
        &[
            PlatformCall::Fetch { token: "tok-1".into() },
            PlatformCall::Login,
            PlatformCall::Fetch { token: "tok-2".into() },
        ]
    );
    assert_eq!(platform.login_count(), 1);
    assert_eq!(platform.rpc_tokens(), vec!["tok-2"]);
    assert_eq!(sup.session().logins(), 2);
    assert_eq!(
        sink.count(|e| matches!(e, AppEvent::SessionRenewed { logins: 2 })),
        1
    );
}

#[test]
fn second_401_after_relogin_aborts_and_drops_session() {
    let mut platform = MockPlatform::reporting(130.0, 50.0, true);
    let (mut sup, clock, mut sink) = started(&mut platform);
    platform.telemetry_script.push_back(HttpReply::new(401, ""));
    platform.telemetry_script.push_back(HttpReply::new(401, ""));
    let mut advisor = FixedAdvisor::new(true, false);

    let report = sup.run_cycle(&mut platform, &mut advisor, &clock, &mut sink);

    assert_eq!(report.outcome, CycleOutcome::Aborted(Error::Auth(AuthError::TokenRefused)));
    assert_eq!(report.next_delay, Duration::from_millis(5000));
    assert!(sup.session().current().is_none());
    assert!(platform.rpcs().is_empty());

    // Next iteration authenticates from scratch and recovers.
    platform.clear_calls();
    let report = sup.run_cycle(&mut platform, &mut advisor, &clock, &mut sink);
    assert!(matches!(report.outcome, CycleOutcome::Completed { .. }));
    assert_eq!(platform.calls[0], PlatformCall::Login);
}

#[test]
fn failed_relogin_backs_off() {
    let mut platform = MockPlatform::reporting(130.0, 50.0, true);
    let (mut sup, clock, mut sink) = started(&mut platform);
    platform.telemetry_script.push_back(HttpReply::new(401, ""));
    platform
        .login_script
        .push_back(Err(AuthError::Transport("connection reset".into())));
    let mut advisor = FixedAdvisor::new(true, false);

    let report = sup.run_cycle(&mut platform, &mut advisor, &clock, &mut sink);

    assert!(matches!(report.outcome, CycleOutcome::Aborted(Error::Auth(_))));
    assert_eq!(sup.state(), StateId::Sleeping);
    assert!(sink.count(|e| matches!(e, AppEvent::CycleAborted { .. })) == 1);
}

#[test]
fn dispatch_401_relogs_before_next_network_call() {
    let mut platform = MockPlatform::reporting(130.0, 50.0, true);
    let (mut sup, clock, mut sink) = started(&mut platform);
    platform.rpc_script.push_back(401);
    let mut advisor = FixedAdvisor::new(true, false);

    let report = sup.run_cycle(&mut platform, &mut advisor, &clock, &mut sink);
    assert!(matches!(
        report.outcome,
        CycleOutcome::Completed { dispatched: false, .. }
    ));
    assert_eq!(platform.calls.last(), Some(&PlatformCall::Login));

    clock.advance(2000);
    sup.run_cycle(&mut platform, &mut advisor, &clock, &mut sink);
    assert_eq!(platform.fetch_tokens().last(), Some(&"tok-2"));
    assert_eq!(platform.rpc_tokens().last(), Some(&"tok-2"));
}

#[test]
fn initial_login_failure_is_fatal() {
    let mut platform = MockPlatform::reporting(130.0, 50.0, true);
    platform
        .login_script
        .push_back(Err(AuthError::Rejected { status: 401 }));
    let mut sup = Supervisor::new(test_config());
    let mut sink = RecordingSink::default();

    let err = sup
        .start(&mut platform, &ManualClock::default(), &mut sink)
        .unwrap_err();

    assert_eq!(err, AuthError::Rejected { status: 401 });
    assert!(sink.events.is_empty());
    assert_eq!(sup.state(), StateId::Authenticating);
}

// ── Transport & dispatch failures ────────────────────────────

#[test]
fn transport_failure_backs_off_without_dispatch() {
    let mut platform = MockPlatform::reporting(130.0, 50.0, true);
    let (mut sup, clock, mut sink) = started(&mut platform);
    platform
        .telemetry_script
        .push_back(HttpReply::transport_failure("request timed out"));
    let mut advisor = FixedAdvisor::new(true, false);

    let report = sup.run_cycle(&mut platform, &mut advisor, &clock, &mut sink);

    assert_eq!(
        report.outcome,
        CycleOutcome::Aborted(Error::Transport(TransportError::Unreachable(
            "request timed out".into()
        )))
    );
    assert_eq!(report.next_delay, Duration::from_millis(5000));
    assert!(platform.rpcs().is_empty());
    assert!(advisor.seen.is_empty());

    let report = sup.run_cycle(&mut platform, &mut advisor, &clock, &mut sink);
    assert!(matches!(report.outcome, CycleOutcome::Completed { .. }));
}

#[test]
fn server_error_is_transport_failure() {
    let mut platform = MockPlatform::reporting(130.0, 50.0, true);
    let (mut sup, clock, mut sink) = started(&mut platform);
    platform.telemetry_script.push_back(HttpReply::new(502, "bad gateway"));

    let report = sup.run_cycle(&mut platform, &mut FixedAdvisor::new(true, false), &clock, &mut sink);

    assert_eq!(
        report.outcome,
        CycleOutcome::Aborted(Error::Transport(TransportError::Status { status: 502 }))
    );
}

#[test]
fn dispatch_failure_is_not_fatal_and_heals_next_cycle() {
    let mut platform = MockPlatform::reporting(130.0, 50.0, true);
    let (mut sup, clock, mut sink) = started(&mut platform);
    platform.rpc_script.push_back(503);
    let mut advisor = FixedAdvisor::new(true, false);

    let report = sup.run_cycle(&mut platform, &mut advisor, &clock, &mut sink);
    assert_eq!(
        report.outcome,
        CycleOutcome::Completed {
            command: FinalCommand { relay: true, buzzer: false },
            dispatched: false
        }
    );
    assert_eq!(report.next_delay, Duration::from_millis(2000));
    assert_eq!(
        sink.count(|e| matches!(e, AppEvent::DispatchFailed { status: 503, .. })),
        1
    );
    assert_eq!(platform.rpcs().len(), 1, "no retry within the cycle");

    clock.advance(2000);
    let report = sup.run_cycle(&mut platform, &mut advisor, &clock, &mut sink);
    assert!(matches!(
        report.outcome,
        CycleOutcome::Completed { dispatched: true, .. }
    ));
}

// ── Rate limiting ─────────────────────────────────────────────

#[test]
fn dispatch_is_rate_limited_independently_of_polling() {
    let mut platform = MockPlatform::reporting(130.0, 50.0, true);
    let (mut sup, clock, mut sink) = started(&mut platform);
    let mut advisor = FixedAdvisor::new(true, false);

    let mut dispatched = Vec::new();
    for _ in 0..5 {
        let report = sup.run_cycle(&mut platform, &mut advisor, &clock, &mut sink);
        if let CycleOutcome::Completed { dispatched: d, .. } = report.outcome {
            dispatched.push(d);
        }
        clock.advance(1000);
    }

    assert_eq!(dispatched, vec![true, false, true, false, true]);
    assert_eq!(platform.fetch_tokens().len(), 5);
    assert_eq!(platform.rpcs().len(), 3);
}

#[test]
fn buzzer_off_is_sent_once_when_alarm_clears() {
    let mut platform = MockPlatform::reporting(180.0, 50.0, true);
    let (mut sup, clock, mut sink) = started(&mut platform);
    let mut advisor = FixedAdvisor::new(false, true);

    sup.run_cycle(&mut platform, &mut advisor, &clock, &mut sink);
    platform.set_reading(120.0, 50.0, true);
    advisor.decision.buzzer = false;
    for _ in 0..2 {
        clock.advance(2000);
        sup.run_cycle(&mut platform, &mut advisor, &clock, &mut sink);
    }

    assert_eq!(
        platform.rpcs(),
        vec![
            RpcCall::relay(false),
            RpcCall::buzzer(true),
            RpcCall::relay(false),
            RpcCall::buzzer(false),
            RpcCall::relay(false),
        ]
    );
}

// ── Operator commands ────────────────────────────────────────

#[test]
fn manual_mode_bypasses_oracle_but_not_safety() {
    let mut platform = MockPlatform::reporting(100.0, 50.0, false);
    let (mut sup, clock, mut sink) = started(&mut platform);
    let mut advisor = FixedAdvisor::new(false, false);
    sup.handle_command(AppCommand::ManualRelay(true), &mut sink);

    let report = sup.run_cycle(&mut platform, &mut advisor, &clock, &mut sink);
    assert!(!completed(&report.outcome).relay, "no fabric, no heat");

    platform.set_reading(100.0, 50.0, true);
    clock.advance(2000);
    let report = sup.run_cycle(&mut platform, &mut advisor, &clock, &mut sink);
    assert!(completed(&report.outcome).relay);
    assert!(advisor.seen.is_empty(), "oracle not consulted in manual mode");
    assert_eq!(sup.build_telemetry().mode, ControlMode::Manual { relay: true });

    sup.handle_command(AppCommand::ResumeAuto, &mut sink);
    clock.advance(2000);
    let report = sup.run_cycle(&mut platform, &mut advisor, &clock, &mut sink);
    assert!(!completed(&report.outcome).relay);
    assert_eq!(advisor.seen.len(), 1);
}

#[test]
fn sensor_inversion_command_flips_fabric() {
    let mut platform = MockPlatform::reporting(130.0, 50.0, false);
    let (mut sup, clock, mut sink) = started(&mut platform);
    let mut advisor = FixedAdvisor::new(true, false);
    sup.handle_command(AppCommand::SetSensorInversion(true), &mut sink);

    let report = sup.run_cycle(&mut platform, &mut advisor, &clock, &mut sink);

    assert!(completed(&report.outcome).relay);
    assert!(advisor.seen[0].fabric_present);
}

#[test]
fn stop_before_run_executes_nothing() {
    let mut platform = MockPlatform::reporting(130.0, 50.0, true);
    let (mut sup, clock, mut sink) = started(&mut platform);
    let (handle, rx) = control_channel();
    handle.stop();

    let cycles = sup.run(
        &mut platform,
        &mut FixedAdvisor::new(true, false),
        &clock,
        &mut sink,
        &rx,
        None,
    );

    assert_eq!(cycles, 0);
    assert!(sup.is_stop_requested());
    assert!(platform.fetch_tokens().is_empty());
}

#[test]
fn run_honours_cycle_limit() {
    let config = SupervisorConfig {
        poll_interval_ms: 1,
        error_backoff_ms: 1,
        ..test_config()
    };
    let mut platform = MockPlatform::reporting(130.0, 50.0, true);
    let (mut sup, clock, mut sink) = started_with(config, &mut platform);
    let (_handle, rx) = control_channel();

    let cycles = sup.run(
        &mut platform,
        &mut FixedAdvisor::new(true, false),
        &clock,
        &mut sink,
        &rx,
        Some(3),
    );

    assert_eq!(cycles, 3);
    assert_eq!(platform.fetch_tokens().len(), 3);
    assert_eq!(
        sink.count(|e| matches!(e, AppEvent::Telemetry(_))),
        3
    );
}

#[test]
fn commands_queued_before_run_apply_to_first_cycle() {
    let config = SupervisorConfig {
        poll_interval_ms: 1,
        ..test_config()
    };
    let mut platform = MockPlatform::reporting(100.0, 50.0, true);
    let (mut sup, clock, mut sink) = started_with(config, &mut platform);
    let (handle, rx) = control_channel();
    handle.send(AppCommand::ManualRelay(true));

    sup.run(&mut platform, &mut FixedAdvisor::new(false, false), &clock, &mut sink, &rx, Some(1));

    assert_eq!(platform.rpcs(), vec![RpcCall::relay(true)]);
}

/// Advises "off"; during its first call it queues an operator command, as a
/// console thread would while the iteration is in flight.
struct CommandingAdvisor<'a> {
    handle: ControlHandle,
    clock: &'a ManualClock,
    sent: bool,
}

impl AdvisorySource for CommandingAdvisor<'_> {
    fn advise(&mut self, _snapshot: &SensorSnapshot) -> AdvisoryDecision {
        if !self.sent {
            self.sent = self.handle.send(AppCommand::ManualRelay(true));
        }
        self.clock.advance(2000);
        AdvisoryDecision::degraded("off")
    }
}

#[test]
fn command_sent_mid_cycle_applies_to_the_next_one() {
    let config = SupervisorConfig {
        poll_interval_ms: 1,
        ..test_config()
    };
    let mut platform = MockPlatform::reporting(100.0, 50.0, true);
    let (mut sup, clock, mut sink) = started_with(config, &mut platform);
    let (handle, rx) = control_channel();
    let mut advisor = CommandingAdvisor {
        handle,
        clock: &clock,
        sent: false,
    };

    let cycles = sup.run(&mut platform, &mut advisor, &clock, &mut sink, &rx, Some(2));

    assert_eq!(cycles, 2);
    assert_eq!(platform.rpcs(), vec![RpcCall::relay(false), RpcCall::relay(true)]);
    assert_eq!(sup.mode(), ControlMode::Manual { relay: true });
}

#[test]
fn cycle_limit_returns_without_a_trailing_sleep() {
    let config = SupervisorConfig {
        poll_interval_ms: 60_000,
        ..test_config()
    };
    let mut platform = MockPlatform::reporting(100.0, 50.0, true);
    let (mut sup, clock, mut sink) = started_with(config, &mut platform);
    let (_handle, rx) = control_channel();

    let began = Instant::now();
    let cycles = sup.run(
        &mut platform,
        &mut FixedAdvisor::new(true, false),
        &clock,
        &mut sink,
        &rx,
        Some(1),
    );

    assert_eq!(cycles, 1);
    assert!(began.elapsed() < Duration::from_secs(30), "slept after the last cycle");
}

// ── Operator alarm silence ───────────────────────────────────

#[test]
fn silenced_alarm_stays_quiet_until_overheat_clears() {
    let mut platform = MockPlatform::reporting(180.0, 50.0, true);
    let (mut sup, clock, mut sink) = started(&mut platform);
    let mut advisor = FixedAdvisor::new(true, true);

    sup.run_cycle(&mut platform, &mut advisor, &clock, &mut sink);
    assert_eq!(platform.rpcs(), vec![RpcCall::relay(false), RpcCall::buzzer(true)]);

    // Silencing sends one explicit off; the relay stays cut.
    sup.handle_command(AppCommand::SilenceBuzzer, &mut sink);
    clock.advance(2000);
    platform.clear_calls();
    let report = sup.run_cycle(&mut platform, &mut advisor, &clock, &mut sink);
    assert_eq!(completed(&report.outcome), FinalCommand::all_off());
    assert_eq!(platform.rpcs(), vec![RpcCall::relay(false), RpcCall::buzzer(false)]);
    assert!(sup.build_telemetry().buzzer_silenced);

    clock.advance(2000);
    platform.clear_calls();
    sup.run_cycle(&mut platform, &mut advisor, &clock, &mut sink);
    assert_eq!(platform.rpcs(), vec![RpcCall::relay(false)]);

    // Cooling down releases the silence...
    platform.set_reading(100.0, 50.0, true);
    clock.advance(2000);
    platform.clear_calls();
    sup.run_cycle(&mut platform, &mut advisor, &clock, &mut sink);
    assert_eq!(platform.rpcs(), vec![RpcCall::relay(true)]);
    assert!(!sup.build_telemetry().buzzer_silenced);

    // ...so the next overheat sounds again.
    platform.set_reading(180.0, 50.0, true);
    clock.advance(2000);
    platform.clear_calls();
    sup.run_cycle(&mut platform, &mut advisor, &clock, &mut sink);
    assert_eq!(platform.rpcs(), vec![RpcCall::relay(false), RpcCall::buzzer(true)]);
}

#[test]
fn silence_never_turns_anything_on() {
    let mut platform = MockPlatform::reporting(130.0, 50.0, false);
    let (mut sup, clock, mut sink) = started(&mut platform);
    sup.handle_command(AppCommand::SilenceBuzzer, &mut sink);

    let report = sup.run_cycle(&mut platform, &mut FixedAdvisor::new(true, true), &clock, &mut sink);

    assert_eq!(completed(&report.outcome), FinalCommand::all_off());
}

// ── Link heartbeat & telemetry ───────────────────────────────

#[test]
fn link_goes_offline_when_polls_keep_failing() {
    let mut platform = MockPlatform::reporting(130.0, 50.0, true);
    let (mut sup, clock, mut sink) = started(&mut platform);
    let mut advisor = FixedAdvisor::new(false, false);

    sup.run_cycle(&mut platform, &mut advisor, &clock, &mut sink);
    assert!(sup.build_telemetry().online);

    for _ in 0..4 {
        clock.advance(5000);
        platform
            .telemetry_script
            .push_back(HttpReply::transport_failure("unreachable"));
        sup.run_cycle(&mut platform, &mut advisor, &clock, &mut sink);
    }

    let links: Vec<bool> = sink
        .events
        .iter()
        .filter_map(|e| match e {
            AppEvent::LinkChanged { online } => Some(*online),
            _ => None,
        })
        .collect();
    assert_eq!(links, vec![true, false]);
    assert!(!sup.history().online());
}

#[test]
fn telemetry_event_carries_history_average() {
    let mut platform = MockPlatform::reporting(100.0, 50.0, true);
    let (mut sup, clock, mut sink) = started(&mut platform);
    let mut advisor = FixedAdvisor::new(true, false);

    sup.run_cycle(&mut platform, &mut advisor, &clock, &mut sink);
    platform.set_reading(140.0, 50.0, true);
    sup.run_cycle(&mut platform, &mut advisor, &clock, &mut sink);

    let t = sup.build_telemetry();
    assert_eq!(t.cycle, 2);
    assert_eq!(t.temperature_c, 140.0);
    assert_eq!(t.avg_temperature_c, Some(120.0));
    assert_eq!(t.advisory_reason, "scripted");
}

// ── Inline advisory gateway ──────────────────────────────────

struct DownOracle;

impl OraclePort for DownOracle {
    fn complete(&self, _system: &str, _user: &str) -> Result<String, OracleError> {
        Err(OracleError::Unavailable("connection refused".into()))
    }
}

struct ChattyOracle;

impl OraclePort for ChattyOracle {
    fn complete(&self, _system: &str, _user: &str) -> Result<String, OracleError> {
        Ok("Fabric is present and the plate is cold, so: {\"relay\": true, \"buzzer\": true, \"reason\": \"Heating\"} Hope that helps!".into())
    }
}

#[test]
fn unavailable_oracle_degrades_to_heater_off() {
    let mut platform = MockPlatform::reporting(100.0, 50.0, true);
    let (mut sup, clock, mut sink) = started(&mut platform);
    let mut gateway = AdvisoryGateway::new(DownOracle);

    let report = sup.run_cycle(&mut platform, &mut gateway, &clock, &mut sink);

    assert_eq!(completed(&report.outcome), FinalCommand::all_off());
    assert!(sup.build_telemetry().advisory_reason.contains("connection refused"));
}

#[test]
fn chatty_oracle_is_parsed_and_hallucinated_alarm_refused() {
    let mut platform = MockPlatform::reporting(100.0, 50.0, true);
    let (mut sup, clock, mut sink) = started(&mut platform);
    let mut gateway = AdvisoryGateway::new(ChattyOracle);

    let report = sup.run_cycle(&mut platform, &mut gateway, &clock, &mut sink);

    assert_eq!(completed(&report.outcome), FinalCommand { relay: true, buzzer: false });
    assert_eq!(platform.rpcs(), vec![RpcCall::relay(true)]);
}
