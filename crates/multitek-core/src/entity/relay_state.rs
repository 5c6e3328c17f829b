// ── Relay state machine ──
//
//   off ──turn_on──▶ pending-on ──ack / confirming poll──▶ on
//   on ──turn_off──▶ pending-off ──ack / confirming poll──▶ off
//   pending-* ──write failed──▶ last confirmed value
//   any ──absent from a successful poll──▶ unknown
//   unknown ──reappears──▶ reported value

use serde::Serialize;
use strum::Display;

/// Displayed state of a relay entity.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Display)]
#[serde(rename_all = "kebab-case")]
#[strum(serialize_all = "kebab-case")]
pub enum RelayState {
    Off,
    On,
    PendingOn,
    PendingOff,
    Unknown,
}

impl RelayState {
    fn settled(on: bool) -> Self {
        if on { Self::On } else { Self::Off }
    }

    fn pending(on: bool) -> Self {
        if on { Self::PendingOn } else { Self::PendingOff }
    }

    /// The on/off value shown to users. Pending states show their target.
    pub fn is_on(self) -> Option<bool> {
        match self {
            Self::On | Self::PendingOn => Some(true),
            Self::Off | Self::PendingOff => Some(false),
            Self::Unknown => None,
        }
    }

    pub fn is_pending(self) -> bool {
        matches!(self, Self::PendingOn | Self::PendingOff)
    }
}

/// Outcome of starting a command.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Begin {
    /// Already confirmed in the target state; acknowledge without a write.
    Noop,
    /// Local state flipped to pending; the write must follow.
    Write,
    /// The device is missing from the tablet.
    Unknown,
}

/// Displayed state plus the last value the tablet confirmed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct RelayTracker {
    state: RelayState,
    confirmed: Option<bool>,
}

impl RelayTracker {
    pub(crate) fn new(reading: Option<bool>) -> Self {
        Self {
            state: reading.map_or(RelayState::Unknown, RelayState::settled),
            confirmed: reading,
        }
    }

    pub(crate) fn state(&self) -> RelayState {
        self.state
    }

    /// Start driving the relay to `target`.
    pub(crate) fn begin(&mut self, target: bool) -> Begin {
        if self.state == RelayState::Unknown {
            return Begin::Unknown;
        }
        if !self.state.is_pending() && self.confirmed == Some(target) {
            return Begin::Noop;
        }
        self.state = RelayState::pending(target);
        Begin::Write
    }

    /// Target for a toggle: the opposite of what is displayed.
    pub(crate) fn toggle_target(&self) -> Option<bool> {
        self.state.is_on().map(|on| !on)
    }

    /// The tablet accepted a write to `target`, optionally echoing the state
    /// it actually reached.
    ///
    /// Ignored unless the relay is still pending toward `target`; a later
    /// command or poll has already moved it on.
    pub(crate) fn ack(&mut self, target: bool, reported: Option<bool>) {
        if self.state == RelayState::pending(target) {
            let on = reported.unwrap_or(target);
            self.confirmed = Some(on);
            self.state = RelayState::settled(on);
        }
    }

    /// The write to `target` failed: fall back to the confirmed value.
    pub(crate) fn fail(&mut self, target: bool) {
        if self.state == RelayState::pending(target) {
            self.state = self
                .confirmed
                .map_or(RelayState::Unknown, RelayState::settled);
        }
    }

    /// Apply a successful poll. `None` means the device was absent.
    ///
    /// Returns `true` if the displayed state changed.
    pub(crate) fn observe(&mut self, reading: Option<bool>) -> bool {
        let before = self.state;
        self.confirmed = reading;
        self.state = match (self.state, reading) {
            (_, None) => RelayState::Unknown,
            // A poll may predate the write; only a confirming reading settles it.
            (pending, Some(on)) if pending.is_pending() => {
                if pending == RelayState::pending(on) {
                    RelayState::settled(on)
                } else {
                    pending
                }
            }
            (_, Some(on)) => RelayState::settled(on),
        };
        self.state != before
    }
}
