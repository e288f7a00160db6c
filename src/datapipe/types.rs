//! Enumerated states carried on the channels (§3.3).
//!
//! Closed discriminated unions, as the design notes prescribe. Several
//! include an explicit `Undefined`/`Invalid` sentinel required during the
//! startup race window — this is source behavior the spec calls out
//! explicitly, not an oversight, so it is kept.

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum SystemState {
    #[default]
    Undefined,
    User,
    ActDead,
    Shutdown,
    Reboot,
    Boot,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum DisplayState {
    #[default]
    Undefined,
    Off,
    Dim,
    On,
    LpmOff,
    LpmOn,
    PowerUp,
    PowerDown,
}

impl DisplayState {
    pub fn is_on_or_dim(self) -> bool {
        matches!(self, Self::On | Self::Dim)
    }

    pub fn is_off_like(self) -> bool {
        matches!(self, Self::Off | Self::LpmOff)
    }

    pub fn is_lpm(self) -> bool {
        matches!(self, Self::LpmOff | Self::LpmOn)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum CallState {
    #[default]
    None,
    Ringing,
    Active,
    Invalid,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum AlarmUiState {
    #[default]
    Off,
    Visible,
    Ringing,
    Invalid,
}

/// Proximity / lid / jack / lens cover state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum CoverState {
    #[default]
    Undefined,
    Open,
    Closed,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum DevicelockState {
    #[default]
    Undefined,
    Locked,
    Unlocked,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum ChargerState {
    #[default]
    Undefined,
    On,
    Off,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum ChargingState {
    #[default]
    Unknown,
    Enabled,
    Disabled,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum BatteryStatus {
    #[default]
    Undefined,
    Full,
    Ok,
    Low,
    Empty,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum UsbCableState {
    #[default]
    Undefined,
    Disconnected,
    Connected,
    AskUser,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum ServiceState {
    #[default]
    Undefined,
    Running,
    Stopped,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum AudioRoute {
    #[default]
    Undefined,
    Handset,
    Headset,
    Speaker,
}

bitflags::bitflags! {
    /// UI exception type bitmask, priority order notif > alarm > call >
    /// linger > noanim (highest bit wins — see
    /// [`crate::tklock::exception::topmost`]).
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
    pub struct UiExceptionMask: u8 {
        const NOANIM = 0b0_0001;
        const LINGER = 0b0_0010;
        const CALL   = 0b0_0100;
        const ALARM  = 0b0_1000;
        const NOTIF  = 0b1_0000;
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum UiExceptionType {
    #[default]
    None,
    Noanim,
    Linger,
    Call,
    Alarm,
    Notif,
}

impl UiExceptionType {
    pub fn mask(self) -> UiExceptionMask {
        match self {
            Self::None => UiExceptionMask::empty(),
            Self::Noanim => UiExceptionMask::NOANIM,
            Self::Linger => UiExceptionMask::LINGER,
            Self::Call => UiExceptionMask::CALL,
            Self::Alarm => UiExceptionMask::ALARM,
            Self::Notif => UiExceptionMask::NOTIF,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum TklockRequest {
    #[default]
    Undef,
    Off,
    OffDelayed,
    OffProximity,
    On,
    OnDimmed,
    OnProximity,
    OnDelayed,
    Toggle,
}
