//! Control loop driver, the hexagonal core.
//!
//! [`Supervisor`] owns the session, the loop state tracker, the dispatch
//! rate gate and the reading history.  One call to [`Supervisor::run_cycle`]
//! is one iteration:
//!
//! ```text
//!  [Authenticating] ─▶ Polling ─▶ Advising ─▶ Arbitrating ─▶ Dispatching ─▶ Sleeping
//!        ▲   (no session)  │ 401: re-login once, retry with new token
//!        └─────────────────┘ other failure: Sleeping with error back-off
//! ```
//!
//! All I/O flows through port traits injected at call sites, so the whole
//! loop runs against mock adapters in tests.
//!
//! ```text
//!  PlatformPort ──▶ ┌──────────────────────────────┐ ──▶ EventSink
//!                   │          Supervisor           │
//! AdvisorySource ──▶│ session · fsm · gate · safety │
//!                   └──────────────────────────────┘
//! ```

use std::sync::mpsc::{Receiver, RecvTimeoutError, TryRecvError};
use std::thread;
use std::time::{Duration, Instant};

use log::{error, info, warn};

use crate::advisory::{AdvisoryDecision, AdvisorySource};
use crate::config::SupervisorConfig;
use crate::dispatch::{DispatchOutcome, Dispatcher, RateLimitState};
use crate::error::{AuthError, Error, TransportError};
use crate::fsm::context::{CycleContext, FinalCommand};
use crate::fsm::states::build_state_table;
use crate::fsm::{Fsm, StateId};
use crate::history::ReadingHistory;
use crate::safety;
use crate::sensors::TelemetryClient;
use crate::session::SessionManager;

use super::commands::{AppCommand, ControlMode};
use super::events::{AppEvent, TelemetryData};
use super::ports::{AuthPort, EventSink, PlatformPort, TimePort};

// ───────────────────────────────────────────────────────────────
// Cycle report
// ───────────────────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq)]
pub enum CycleOutcome {
    /// The iteration reached Sleeping normally.
    Completed {
        command: FinalCommand,
        dispatched: bool,
    },
    /// The iteration was abandoned; nothing was dispatched.
    Aborted(Error),
}

#[derive(Debug, Clone, PartialEq)]
pub struct CycleReport {
    pub outcome: CycleOutcome,
    /// How long to sleep before the next iteration.
    pub next_delay: Duration,
}

// ───────────────────────────────────────────────────────────────
// Supervisor
// ───────────────────────────────────────────────────────────────

pub struct Supervisor {
    config: SupervisorConfig,
    fsm: Fsm,
    session: SessionManager,
    telemetry: TelemetryClient,
    dispatcher: Dispatcher,
    rate: RateLimitState,
    history: ReadingHistory,
    mode: ControlMode,
    /// Context of the most recent iteration, for telemetry read-back.
    last: CycleContext,
    cycle: u64,
    stop_requested: bool,
    /// Operator muted the current alarm; released once the arbiter stops
    /// asking for the buzzer.
    buzzer_silenced: bool,
}

impl Supervisor {
    /// Construct the supervisor from a validated configuration.
    ///
    /// Does **not** log in; call [`start`](Self::start) next.
    pub fn new(config: SupervisorConfig) -> Self {
        let session = SessionManager::new(config.username.clone(), config.password.clone());
        let telemetry = TelemetryClient::new(config.invert_fabric_sensor);
        let history = ReadingHistory::new(u64::from(config.stale_after_secs) * 1000);
        Self {
            fsm: Fsm::new(build_state_table(), StateId::Authenticating),
            session,
            telemetry,
            dispatcher: Dispatcher::new(),
            rate: RateLimitState::default(),
            history,
            mode: ControlMode::Auto,
            last: CycleContext::default(),
            cycle: 0,
            stop_requested: false,
            buzzer_silenced: false,
            config,
        }
    }

    // ── Lifecycle ─────────────────────────────────────────────

    /// Initial login.  Failure here is fatal: without a token there is no
    /// control at all.
    pub fn start(
        &mut self,
        auth: &mut impl AuthPort,
        clock: &impl TimePort,
        sink: &mut impl EventSink,
    ) -> Result<(), AuthError> {
        if let Err(e) = self.session.login(auth, clock) {
            error!("Initial login failed: {e}");
            return Err(e);
        }
        self.enter(StateId::Polling);
        sink.emit(&AppEvent::Started {
            device_id: self.config.device_id.clone(),
        });
        info!(
            "Supervisor started for device {} ({:?} advisory)",
            self.config.device_id, self.config.advisory_mode
        );
        Ok(())
    }

    // ── Per-iteration orchestration ───────────────────────────

    /// Run one iteration: fetch → advise → arbitrate → dispatch.
    ///
    /// Never fails: every error is reported in the returned
    /// [`CycleReport`] together with the delay the caller should observe.
    pub fn run_cycle(
        &mut self,
        platform: &mut impl PlatformPort,
        advisor: &mut impl AdvisorySource,
        clock: &impl TimePort,
        sink: &mut impl EventSink,
    ) -> CycleReport {
        self.cycle += 1;
        let mut ctx = CycleContext::new(self.cycle);
        let now = clock.uptime_ms();

        // 1. Authenticating (only when no session is held)
        let mut session = if let Some(s) = self.session.current() {
            s
        } else {
            self.enter(StateId::Authenticating);
            match self.session.login(platform, clock) {
                Ok(s) => {
                    self.emit_renewed(sink);
                    s
                }
                Err(e) => return self.back_off(ctx, Error::Auth(e), sink),
            }
        };

        // 2. Polling
        self.enter(StateId::Polling);
        let mut fetch = self.telemetry.fetch(&session, platform);
        if SessionManager::is_expired_response(fetch.status) {
            warn!("Telemetry fetch rejected with 401, re-authenticating");
            self.enter(StateId::Authenticating);
            session = match self.session.renew(platform, clock) {
                Ok(s) => s,
                Err(e) => return self.back_off(ctx, Error::Auth(e), sink),
            };
            self.emit_renewed(sink);
            self.enter(StateId::Polling);
            fetch = self.telemetry.fetch(&session, platform);
            if SessionManager::is_expired_response(fetch.status) {
                self.session.discard();
                return self.back_off(ctx, Error::Auth(AuthError::TokenRefused), sink);
            }
        }
        if !fetch.is_ok() {
            self.refresh_link(now, sink);
            let err = TransportError::from_status(fetch.status, &fetch.raw_body);
            return self.back_off(ctx, Error::Transport(err), sink);
        }
        let snapshot = fetch.snapshot;
        ctx.snapshot = Some(snapshot);
        self.history.record(now, snapshot);
        self.refresh_link(now, sink);

        // 3. Advising
        self.enter(StateId::Advising);
        let advisory = match self.mode {
            ControlMode::Auto => advisor.advise(&snapshot),
            ControlMode::Manual { relay } => AdvisoryDecision::manual(relay),
        };

        // 4. Arbitrating
        self.enter(StateId::Arbitrating);
        let verdict = safety::review(&advisory, &snapshot);
        if verdict.overrides != 0 {
            sink.emit(&AppEvent::SafetyOverride {
                overrides: verdict.overrides,
                temperature: snapshot.temperature,
            });
        }
        let mut command = verdict.command;
        if self.buzzer_silenced {
            if command.buzzer {
                command.buzzer = false;
            } else {
                info!("Alarm condition cleared, buzzer silence released");
                self.buzzer_silenced = false;
            }
        }
        ctx.advisory = Some(advisory);
        ctx.command = Some(command);
        ctx.overrides = verdict.overrides;

        // 5. Dispatching (rate-gated)
        self.enter(StateId::Dispatching);
        if self
            .rate
            .ready(now, u64::from(self.config.dispatch_interval_ms))
        {
            self.rate.mark(now);
            match self.dispatcher.dispatch(&session, &command, platform) {
                DispatchOutcome::Delivered => {
                    ctx.dispatched = true;
                    sink.emit(&AppEvent::Dispatched(command));
                }
                DispatchOutcome::Failed { status } => {
                    sink.emit(&AppEvent::DispatchFailed { command, status });
                }
                DispatchOutcome::Unauthorized => {
                    sink.emit(&AppEvent::DispatchFailed {
                        command,
                        status: crate::session::STATUS_UNAUTHORIZED,
                    });
                    warn!("Dispatch rejected with 401, re-authenticating");
                    self.enter(StateId::Authenticating);
                    match self.session.renew(platform, clock) {
                        Ok(_) => self.emit_renewed(sink),
                        Err(e) => return self.back_off(ctx, Error::Auth(e), sink),
                    }
                }
            }
        }

        // 6. Sleeping
        self.enter(StateId::Sleeping);
        self.last = ctx;
        sink.emit(&AppEvent::Telemetry(self.build_telemetry()));
        CycleReport {
            outcome: CycleOutcome::Completed {
                command,
                dispatched: self.last.dispatched,
            },
            next_delay: self.config.poll_interval(),
        }
    }

    /// Run until [`AppCommand::Stop`] arrives or `max_cycles` iterations
    /// (counted since construction) have executed.  Commands are applied
    /// between iterations only.  Returns the total iteration count.
    pub fn run(
        &mut self,
        platform: &mut impl PlatformPort,
        advisor: &mut impl AdvisorySource,
        clock: &impl TimePort,
        sink: &mut impl EventSink,
        commands: &Receiver<AppCommand>,
        max_cycles: Option<u64>,
    ) -> u64 {
        loop {
            self.drain_commands(commands, sink);
            if self.stop_requested {
                break;
            }
            if self.cycle_limit_reached(max_cycles) {
                break;
            }
            let report = self.run_cycle(platform, advisor, clock, sink);
            if self.cycle_limit_reached(max_cycles) {
                break;
            }
            self.wait(report.next_delay, commands, sink);
        }
        info!("Control loop stopped after {} cycles", self.cycle);
        self.cycle
    }

    // ── Command handling ──────────────────────────────────────

    /// Apply an operator command.
    pub fn handle_command(&mut self, cmd: AppCommand, sink: &mut impl EventSink) {
        match cmd {
            AppCommand::ManualRelay(relay) => {
                self.mode = ControlMode::Manual { relay };
                info!("Manual mode: relay forced {}", if relay { "ON" } else { "OFF" });
                sink.emit(&AppEvent::ModeChanged(self.mode));
            }
            AppCommand::ResumeAuto => {
                if self.mode != ControlMode::Auto {
                    self.mode = ControlMode::Auto;
                    info!("Advisory control resumed");
                    sink.emit(&AppEvent::ModeChanged(self.mode));
                }
            }
            AppCommand::SetSensorInversion(invert) => {
                self.telemetry.set_inverted(invert);
                info!("Fabric sensor inversion {}", if invert { "on" } else { "off" });
            }
            AppCommand::SilenceBuzzer => {
                if !self.buzzer_silenced {
                    info!("Buzzer silenced by operator");
                    self.buzzer_silenced = true;
                }
            }
            AppCommand::Stop => {
                info!("Stop requested");
                self.stop_requested = true;
            }
        }
    }

    // ── Queries ───────────────────────────────────────────────

    /// Telemetry record for the most recent completed iteration.
    pub fn build_telemetry(&self) -> TelemetryData {
        let snap = self.last.snapshot.unwrap_or_default();
        let cmd = self.last.command.unwrap_or_default();
        TelemetryData {
            cycle: self.last.cycle,
            temperature_c: snap.temperature,
            humidity_pct: snap.humidity,
            fabric_present: snap.fabric_present,
            avg_temperature_c: self.history.average_temperature(),
            relay: cmd.relay,
            buzzer: cmd.buzzer,
            dispatched: self.last.dispatched,
            overrides: self.last.overrides,
            advisory_reason: self
                .last
                .advisory
                .as_ref()
                .map(|a| a.reason.clone())
                .unwrap_or_default(),
            mode: self.mode,
            buzzer_silenced: self.buzzer_silenced,
            online: self.history.online(),
        }
    }

    pub fn state(&self) -> StateId {
        self.fsm.current_state()
    }

    pub fn cycle_count(&self) -> u64 {
        self.cycle
    }

    pub fn mode(&self) -> ControlMode {
        self.mode
    }

    pub fn session(&self) -> &SessionManager {
        &self.session
    }

    pub fn history(&self) -> &ReadingHistory {
        &self.history
    }

    pub fn is_stop_requested(&self) -> bool {
        self.stop_requested
    }

    // ── Internal ──────────────────────────────────────────────

    fn cycle_limit_reached(&self, max_cycles: Option<u64>) -> bool {
        let reached = max_cycles.is_some_and(|max| self.cycle >= max);
        if reached {
            info!("Cycle limit reached");
        }
        reached
    }

    fn enter(&mut self, next: StateId) {
        if let Err(e) = self.fsm.transition(next) {
            debug_assert!(false, "illegal loop transition {:?} -> {:?}", e.from, e.to);
        }
    }

    fn back_off(&mut self, ctx: CycleContext, err: Error, sink: &mut impl EventSink) -> CycleReport {
        let state = self.fsm.current_state();
        warn!(
            "Cycle {} aborted in {}: {err}; retrying in {:?}",
            ctx.cycle,
            self.fsm.name_of(state),
            self.config.error_backoff()
        );
        sink.emit(&AppEvent::CycleAborted {
            state,
            error: err.clone(),
        });
        self.enter(StateId::Sleeping);
        self.last = ctx;
        CycleReport {
            outcome: CycleOutcome::Aborted(err),
            next_delay: self.config.error_backoff(),
        }
    }

    fn emit_renewed(&self, sink: &mut impl EventSink) {
        sink.emit(&AppEvent::SessionRenewed {
            logins: self.session.logins(),
        });
    }

    fn refresh_link(&mut self, now_ms: u64, sink: &mut impl EventSink) {
        if let Some(online) = self.history.update_link(now_ms) {
            sink.emit(&AppEvent::LinkChanged { online });
        }
    }

    fn drain_commands(&mut self, commands: &Receiver<AppCommand>, sink: &mut impl EventSink) {
        loop {
            match commands.try_recv() {
                Ok(cmd) => self.handle_command(cmd, sink),
                Err(TryRecvError::Empty | TryRecvError::Disconnected) => break,
            }
        }
    }

    /// Sleep for `delay`, applying commands as they arrive.  A stop cuts the
    /// sleep short; an in-flight network call is never interrupted because
    /// none is running here.
    fn wait(&mut self, delay: Duration, commands: &Receiver<AppCommand>, sink: &mut impl EventSink) {
        let deadline = Instant::now() + delay;
        while !self.stop_requested {
            let remaining = deadline.saturating_duration_since(Instant::now());
            match commands.recv_timeout(remaining) {
                Ok(cmd) => self.handle_command(cmd, sink),
                Err(RecvTimeoutError::Timeout) => break,
                Err(RecvTimeoutError::Disconnected) => {
                    thread::sleep(remaining);
                    break;
                }
            }
        }
    }
}
