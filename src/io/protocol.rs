//! Garage wire-format codec - pure encode/decode, no I/O
//!
//! Protocol (ASCII, line-oriented):
//! - Commands: `FIELD=VALUE.` or `FIELD=[idx=val,idx=val,...].`, `.`-terminated
//! - State query `GS.` -> reply `SU:field=val;field=val;...`
//! - Acknowledgement is the literal `OK`
//!
//! List indices are 1-based on the wire. Decoded `PO` entries are rebased to
//! 0-based array positions while `PL` entries keep their 1-based positions -
//! that asymmetry matches the deployed garage firmware and is load-bearing.

use crate::domain::types::{GarageState, LightState, MAX_SPOTS};

// Protocol control tokens
pub const PARAM_DELIM: char = ';';
pub const MSG_DELIM: char = ':';
pub const LIST_DELIM: char = ',';
pub const PARAM_EQ: char = '=';
pub const MSG_END: char = '.';

/// Successful command acknowledgement
pub const OK: &str = "OK";

// Field names
pub const ENTRY_GATE: &str = "NG";
pub const EXIT_GATE: &str = "XG";
pub const ENTRY_BEAM: &str = "NIR";
pub const EXIT_BEAM: &str = "XIR";
pub const ENTRY_LIGHT: &str = "NL";
pub const EXIT_LIGHT: &str = "XL";
pub const SPOT_LIGHTS: &str = "PL";
pub const SPOT_OCCUPIED: &str = "PO";
pub const GET_STATE: &str = "GS";
pub const STATE_UPDATE: &str = "SU";

/// A command sent to the garage hardware
#[derive(Debug, Clone, PartialEq)]
pub enum Command {
    SetEntryGate(bool),
    SetExitGate(bool),
    SetEntryLight(LightState),
    SetExitLight(LightState),
    /// Per-stall guide lights, 0-based positions (encoded 1-based)
    SetSpotLights(Vec<bool>),
    GetState,
}

impl Command {
    /// Render the `.`-terminated wire form
    pub fn encode(&self) -> String {
        match self {
            Command::SetEntryGate(open) => scalar(ENTRY_GATE, bool_token(*open)),
            Command::SetExitGate(open) => scalar(EXIT_GATE, bool_token(*open)),
            Command::SetEntryLight(light) => scalar(ENTRY_LIGHT, light.as_wire()),
            Command::SetExitLight(light) => scalar(EXIT_LIGHT, light.as_wire()),
            Command::SetSpotLights(lights) => {
                let entries: Vec<String> = lights
                    .iter()
                    .enumerate()
                    .map(|(i, on)| format!("{}{}{}", i + 1, PARAM_EQ, bool_token(*on)))
                    .collect();
                format!("{}{}[{}]{}", SPOT_LIGHTS, PARAM_EQ, entries.join(","), MSG_END)
            }
            Command::GetState => format!("{}{}", GET_STATE, MSG_END),
        }
    }

    /// Parse a wire command. Used by the garage simulator and for round-trip
    /// tests; the control side only ever encodes.
    pub fn parse(line: &str) -> Option<Command> {
        let line = line.trim().strip_suffix(MSG_END)?;
        if line == GET_STATE {
            return Some(Command::GetState);
        }
        let (field, value) = line.split_once(PARAM_EQ)?;
        match field {
            ENTRY_GATE => Some(Command::SetEntryGate(value == "1")),
            EXIT_GATE => Some(Command::SetExitGate(value == "1")),
            ENTRY_LIGHT => LightState::from_wire(value).map(Command::SetEntryLight),
            EXIT_LIGHT => LightState::from_wire(value).map(Command::SetExitLight),
            SPOT_LIGHTS => {
                let body = value.strip_prefix('[')?.strip_suffix(']')?;
                let mut lights: Vec<bool> = Vec::new();
                for entry in body.split(LIST_DELIM).filter(|e| !e.is_empty()) {
                    let (idx, val) = entry.split_once(PARAM_EQ)?;
                    let idx: usize = idx.parse().ok()?;
                    if idx == 0 || idx > MAX_SPOTS {
                        return None;
                    }
                    if lights.len() < idx {
                        lights.resize(idx, false);
                    }
                    lights[idx - 1] = val == "1";
                }
                Some(Command::SetSpotLights(lights))
            }
            _ => None,
        }
    }
}

fn scalar(field: &str, value: &str) -> String {
    format!("{}{}{}{}", field, PARAM_EQ, value, MSG_END)
}

fn bool_token(v: bool) -> &'static str {
    if v {
        "1"
    } else {
        "0"
    }
}

/// Decode a `SU:` state-update line into a fresh snapshot.
///
/// Any line that is not a well-formed state update (wrong segment count,
/// missing `SU` prefix) yields None and is silently ignored by callers -
/// the previous snapshot stays current. Malformed individual params are
/// skipped, not fatal.
pub fn decode_state_update(line: &str) -> Option<GarageState> {
    let line = line.trim();
    if line.is_empty() {
        return None;
    }

    let segments: Vec<&str> = line.split(MSG_DELIM).collect();
    if segments.len() != 2 {
        return None;
    }
    if segments[0] != STATE_UPDATE {
        return None;
    }

    let body = segments[1].strip_suffix(MSG_END).unwrap_or(segments[1]);

    let mut state = GarageState::default();
    for param in body.split(PARAM_DELIM).filter(|p| !p.is_empty()) {
        let Some((key, value)) = param.split_once(PARAM_EQ) else {
            continue;
        };
        match key {
            ENTRY_GATE => state.entry_gate = Some(value == "1"),
            EXIT_GATE => state.exit_gate = Some(value == "1"),
            ENTRY_BEAM => state.entry_beam = Some(value == "1"),
            EXIT_BEAM => state.exit_beam = Some(value == "1"),
            // Unknown light tokens leave the field unset, not defaulted
            ENTRY_LIGHT => {
                if let Some(light) = LightState::from_wire(value) {
                    state.entry_light = Some(light);
                }
            }
            EXIT_LIGHT => {
                if let Some(light) = LightState::from_wire(value) {
                    state.exit_light = Some(light);
                }
            }
            SPOT_LIGHTS => {
                // 1-based wire index used as-is
                for (idx, val) in list_entries(value) {
                    if idx < MAX_SPOTS {
                        state.spot_lights[idx] = Some(val);
                    }
                }
            }
            SPOT_OCCUPIED => {
                // 1-based wire index rebased to 0-based
                for (idx, val) in list_entries(value) {
                    if idx >= 1 && idx - 1 < MAX_SPOTS {
                        state.occupied[idx - 1] = Some(val);
                    }
                }
            }
            _ => {}
        }
    }

    Some(state)
}

/// Parse `[idx=val,idx=val,...]` into (idx, val) pairs, skipping malformed
/// entries.
fn list_entries(value: &str) -> Vec<(usize, u8)> {
    let Some(body) = value.strip_prefix('[').and_then(|v| v.strip_suffix(']')) else {
        return Vec::new();
    };
    body.split(LIST_DELIM)
        .filter_map(|entry| {
            let (idx, val) = entry.split_once(PARAM_EQ)?;
            Some((idx.parse().ok()?, val.parse().ok()?))
        })
        .collect()
}

/// Render a snapshot back into a `SU:` line. Only fields that are set appear.
/// Used by the garage simulator; also gives the codec a decode(encode(..))
/// round trip.
pub fn encode_state_update(state: &GarageState) -> String {
    let mut params: Vec<String> = Vec::new();

    if let Some(v) = state.entry_gate {
        params.push(format!("{}{}{}", ENTRY_GATE, PARAM_EQ, bool_token(v)));
    }
    if let Some(v) = state.exit_gate {
        params.push(format!("{}{}{}", EXIT_GATE, PARAM_EQ, bool_token(v)));
    }
    if let Some(v) = state.entry_beam {
        params.push(format!("{}{}{}", ENTRY_BEAM, PARAM_EQ, bool_token(v)));
    }
    if let Some(v) = state.exit_beam {
        params.push(format!("{}{}{}", EXIT_BEAM, PARAM_EQ, bool_token(v)));
    }
    if let Some(light) = state.entry_light {
        params.push(format!("{}{}{}", ENTRY_LIGHT, PARAM_EQ, light.as_wire()));
    }
    if let Some(light) = state.exit_light {
        params.push(format!("{}{}{}", EXIT_LIGHT, PARAM_EQ, light.as_wire()));
    }

    let lights: Vec<String> = state
        .spot_lights
        .iter()
        .enumerate()
        .filter_map(|(idx, v)| v.map(|val| format!("{}{}{}", idx, PARAM_EQ, val)))
        .collect();
    if !lights.is_empty() {
        params.push(format!("{}{}[{}]", SPOT_LIGHTS, PARAM_EQ, lights.join(",")));
    }

    let occupied: Vec<String> = state
        .occupied
        .iter()
        .enumerate()
        .filter_map(|(idx, v)| v.map(|val| format!("{}{}{}", idx + 1, PARAM_EQ, val)))
        .collect();
    if !occupied.is_empty() {
        params.push(format!("{}{}[{}]", SPOT_OCCUPIED, PARAM_EQ, occupied.join(",")));
    }

    format!("{}{}{}{}", STATE_UPDATE, MSG_DELIM, params.join(";"), MSG_END)
}
