//! Operator command processing.
//!
//! The console and remote command interfaces feed text lines here. Every
//! action flows through the same public contracts the sequence and safety
//! logic use — relay writes are issued with `Origin::Manual`, e-stop reset
//! goes through the latch's guarded reset, parameter changes are validated
//! and persisted through the config store. There is no privileged path.

use tracing::warn;

use splitter_common::config::{ControllerConfig, FilterMode};
use splitter_common::consts::Millis;
use splitter_common::error::SystemFault;
use splitter_common::event::EventSink;
use splitter_common::relay::{Origin, RelayId};

use crate::config::ConfigStore;
use crate::fault::FaultRegistry;
use crate::pressure::FilteredChannel;
use crate::relay::{RelayController, SetOutcome};
use crate::safety::{EmergencyStop, SafetySystem};
use crate::sequence::SequenceController;

/// Everything a command may touch, borrowed for the duration of one line.
pub struct CommandContext<'a> {
    pub seq: &'a mut SequenceController,
    pub safety: &'a mut SafetySystem,
    pub estop: &'a mut EmergencyStop,
    pub relays: &'a mut RelayController,
    pub faults: &'a mut FaultRegistry,
    pub config: &'a mut ControllerConfig,
    pub store: &'a ConfigStore,
    pub hydraulic: &'a mut FilteredChannel,
    pub oil: &'a mut FilteredChannel,
    pub sink: &'a mut dyn EventSink,
    pub now: Millis,
}

const HELP: &str = "commands: show | relay R<n> ON|OFF | set <param> <value> | \
                    seq abort|reset|enable | reset estop | safety clear | \
                    fault list|ack <code>|clear | help";

/// Execute one command line, returning the response text.
pub fn execute(line: &str, ctx: &mut CommandContext) -> String {
    let mut words = line.split_whitespace();
    let Some(command) = words.next() else {
        return HELP.to_string();
    };

    match command.to_ascii_lowercase().as_str() {
        "help" => HELP.to_string(),
        "show" => handle_show(ctx),
        "relay" => handle_relay(words.next(), words.next(), ctx),
        "set" => handle_set(words.next(), words.next(), ctx),
        "seq" => handle_seq(words.next(), ctx),
        "reset" => handle_reset(words.next(), ctx),
        "safety" => handle_safety(words.next(), ctx),
        "fault" => handle_fault(words.next(), words.next(), ctx),
        other => format!("unknown command: {other} ({HELP})"),
    }
}

fn handle_show(ctx: &mut CommandContext) -> String {
    format!(
        "{} | {} | {} | estop live={} latched={} | {}",
        ctx.seq.status_line(ctx.now),
        ctx.safety.status_line(),
        ctx.relays.status_line(),
        u8::from(ctx.estop.is_live()),
        u8::from(ctx.estop.is_latched()),
        ctx.faults.status_line(ctx.now),
    )
}

fn handle_relay(
    relay_token: Option<&str>,
    state_token: Option<&str>,
    ctx: &mut CommandContext,
) -> String {
    let (Some(relay_token), Some(state_token)) = (relay_token, state_token) else {
        return "usage: relay R<n> ON|OFF".to_string();
    };

    let number = relay_token
        .strip_prefix(['R', 'r'])
        .and_then(|n| n.parse::<u8>().ok());
    let Some(relay) = number.and_then(RelayId::from_number) else {
        return format!("invalid relay: {relay_token}");
    };

    let on = match state_token.to_ascii_lowercase().as_str() {
        "on" | "1" => true,
        "off" | "0" => false,
        other => return format!("invalid relay state: {other}"),
    };

    match ctx.relays.set(relay, on, Origin::Manual, ctx.sink) {
        SetOutcome::Applied => format!("relay {relay} {}", if on { "ON" } else { "OFF" }),
        SetOutcome::NoChange => format!("relay {relay} unchanged"),
        SetOutcome::BlockedBySafety => format!("relay {relay} blocked by safety"),
        SetOutcome::Interlocked => format!("relay {relay} refused: opposing relay energized"),
    }
}

fn handle_set(param: Option<&str>, value: Option<&str>, ctx: &mut CommandContext) -> String {
    let (Some(param), Some(value)) = (param, value) else {
        return "usage: set stable|startstable|timeout|threshold|hysteresis|\
                extendlimit|retractlimit|filter|emaalpha <value>"
            .to_string();
    };

    // Stage the change on a copy; only a config that validates as a whole
    // is committed and persisted.
    let mut staged = ctx.config.clone();
    let param_lower = param.to_ascii_lowercase();

    let parse_ms = |v: &str| v.parse::<Millis>().ok();
    let parse_psi = |v: &str| v.parse::<f32>().ok();

    match param_lower.as_str() {
        "stable" => match parse_ms(value) {
            Some(ms) => staged.timing.stable_ms = ms,
            None => return format!("invalid value: {value}"),
        },
        "startstable" => match parse_ms(value) {
            Some(ms) => staged.timing.start_stable_ms = ms,
            None => return format!("invalid value: {value}"),
        },
        "timeout" => match parse_ms(value) {
            Some(ms) => staged.timing.timeout_ms = ms,
            None => return format!("invalid value: {value}"),
        },
        "threshold" => match parse_psi(value) {
            Some(psi) => staged.safety.threshold_psi = psi,
            None => return format!("invalid value: {value}"),
        },
        "hysteresis" => match parse_psi(value) {
            Some(psi) => staged.safety.hysteresis_psi = psi,
            None => return format!("invalid value: {value}"),
        },
        "extendlimit" => match parse_psi(value) {
            Some(psi) => staged.safety.extend_pressure_limit_psi = psi,
            None => return format!("invalid value: {value}"),
        },
        "retractlimit" => match parse_psi(value) {
            Some(psi) => staged.safety.retract_pressure_limit_psi = psi,
            None => return format!("invalid value: {value}"),
        },
        "filter" => match value.to_ascii_lowercase().as_str() {
            "none" => staged.pressure.filter = FilterMode::None,
            "median3" => staged.pressure.filter = FilterMode::Median3,
            "ema" => staged.pressure.filter = FilterMode::Ema,
            other => return format!("invalid filter: {other} (none|median3|ema)"),
        },
        "emaalpha" => match parse_psi(value) {
            Some(alpha) => staged.pressure.ema_alpha = alpha,
            None => return format!("invalid value: {value}"),
        },
        other => return format!("unknown parameter: {other}"),
    }

    if let Err(reason) = staged.validate() {
        return format!("rejected: {reason}");
    }

    // Commit: push the new values into the live components.
    let pressure_changed = staged.pressure != ctx.config.pressure;
    *ctx.config = staged;
    ctx.seq.set_timing(ctx.config.timing);
    ctx.seq.set_pressure_limits(&ctx.config.safety);
    ctx.safety.set_config(ctx.config.safety);
    if pressure_changed {
        ctx.hydraulic.reconfigure(&ctx.config.pressure);
        ctx.oil.reconfigure(&ctx.config.pressure);
    }

    if let Err(err) = ctx.store.save(ctx.config) {
        warn!(%err, "parameter change not persisted");
        ctx.faults
            .raise(SystemFault::STORE_SAVE, ctx.now, ctx.sink);
        return format!("{param_lower} set to {value} (save failed: {err})");
    }

    format!("{param_lower} set to {value}")
}

fn handle_seq(param: Option<&str>, ctx: &mut CommandContext) -> String {
    match param.map(str::to_ascii_lowercase).as_deref() {
        Some("abort") => {
            ctx.seq.abort("manual_abort", ctx.now, ctx.relays, ctx.sink);
            "sequence aborted".to_string()
        }
        Some("reset") => {
            ctx.seq.reset(ctx.now, ctx.relays, ctx.sink);
            "sequence reset".to_string()
        }
        Some("enable") => {
            ctx.seq.set_enabled(true);
            ctx.faults.clear(SystemFault::SEQUENCE_TIMEOUT, ctx.sink);
            "sequence enabled".to_string()
        }
        _ => "usage: seq abort|reset|enable".to_string(),
    }
}

fn handle_reset(param: Option<&str>, ctx: &mut CommandContext) -> String {
    match param.map(str::to_ascii_lowercase).as_deref() {
        Some("estop") => match ctx.estop.try_reset(ctx.safety, ctx.relays, ctx.sink) {
            Ok(()) => "e-stop reset successful - system operational".to_string(),
            Err(err) => format!("e-stop reset failed: {err}"),
        },
        _ => "usage: reset estop".to_string(),
    }
}

fn handle_safety(param: Option<&str>, ctx: &mut CommandContext) -> String {
    match param.map(str::to_ascii_lowercase).as_deref() {
        Some("clear") => {
            if !ctx.safety.is_active() {
                return "safety not active".to_string();
            }
            ctx.safety.clear_manual(ctx.relays, ctx.sink);
            "safety cleared".to_string()
        }
        _ => "usage: safety clear".to_string(),
    }
}

fn handle_fault(param: Option<&str>, value: Option<&str>, ctx: &mut CommandContext) -> String {
    match param.map(str::to_ascii_lowercase).as_deref() {
        Some("list") => ctx.faults.list_active(),
        Some("ack") => {
            let Some(value) = value else {
                return "usage: fault ack <code>".to_string();
            };
            let code = if let Some(hex) = value.strip_prefix("0x").or(value.strip_prefix("0X")) {
                u8::from_str_radix(hex, 16).ok()
            } else {
                value.parse::<u8>().ok()
            };
            let Some(fault) = code.and_then(SystemFault::from_bits) else {
                return format!("invalid fault code: {value}");
            };
            if !ctx.faults.has(fault) {
                return format!("fault 0x{:02X} not active", fault.bits());
            }
            ctx.faults.acknowledge(fault);
            format!("fault 0x{:02X} acknowledged", fault.bits())
        }
        Some("clear") => {
            ctx.faults.clear_all(ctx.sink);
            "all faults cleared".to_string()
        }
        _ => "usage: fault list|ack <code>|clear".to_string(),
    }
}

// ─── Tests ──────────────────────────────────────────────────────────
