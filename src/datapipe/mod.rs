//! Event bus ("datapipes") — C1.
//!
//! One [`Channel`] per named state variable (§3.1), collected into a
//! single [`Datapipes`] registry. The registry holds one typed field per
//! declared pipe — a fixed, known-at-compile-time set, matching the
//! teacher's preference for static tables over type-erased dynamic
//! dispatch (`fsm::StateDescriptor` table) — rather than a `HashMap<TypeId,
//! Box<dyn Any>>` map. [`define_pipes!`] is the declarative-macro
//! elaboration of that table: each invocation line is one row.

pub mod channel;
pub mod types;

pub use channel::{CachePolicy, Channel, SourcePolicy};
pub use types::*;

/// Declare the fixed registry of named channels as typed struct fields,
/// with a constructor and `&T` / `&mut Channel<T>` accessors per pipe.
macro_rules! define_pipes {
    ($( $field:ident : $ty:ty = $default:expr ),+ $(,)?) => {
        /// The process-wide channel registry. Declared at init, torn down
        /// at shutdown (§3.1 lifecycle) — in practice this just means
        /// "owned by the top-level daemon struct for its lifetime".
        pub struct Datapipes {
            $( pub $field: Channel<$ty>, )+
        }

        impl Datapipes {
            pub fn new() -> Self {
                Self {
                    $( $field: {
                        let mut ch = Channel::new(stringify!($field));
                        ch.seed($default);
                        ch
                    }, )+
                }
            }
        }

        impl Default for Datapipes {
            fn default() -> Self {
                Self::new()
            }
        }
    };
}

define_pipes! {
    system_state: SystemState = SystemState::Undefined,

    display_state: DisplayState = DisplayState::Undefined,
    /// The *requested* display state; display_state follows once the
    /// compositor acks. Every tklock sub-machine gates on this one per
    /// spec (§4.4.3, §4.4.5, §4.4.10: "when display_next transitions...").
    display_state_next: DisplayState = DisplayState::Undefined,

    call_state: CallState = CallState::None,
    alarm_ui_state: AlarmUiState = AlarmUiState::Off,

    proximity_actual: CoverState = CoverState::Undefined,
    proximity_effective: CoverState = CoverState::Undefined,
    lid_cover_state: CoverState = CoverState::Undefined,
    lid_filtered_state: CoverState = CoverState::Undefined,
    jack_cover_state: CoverState = CoverState::Undefined,
    lens_cover_state: CoverState = CoverState::Undefined,
    keyboard_slide_state: CoverState = CoverState::Undefined,

    devicelock_state: DevicelockState = DevicelockState::Undefined,

    charger_state: ChargerState = ChargerState::Undefined,
    charging_state: ChargingState = ChargingState::Unknown,
    battery_status: BatteryStatus = BatteryStatus::Undefined,
    battery_level_pct: u8 = 100,
    usb_cable_state: UsbCableState = UsbCableState::Undefined,
    charging_suspendable: bool = false,
    forced_charging: bool = false,

    audio_route: AudioRoute = AudioRoute::Undefined,
    music_playing: bool = false,

    tklock_submode_bit: bool = false,
    ui_exception_active: UiExceptionMask = UiExceptionMask::empty(),
    ui_exception_topmost: UiExceptionType = UiExceptionType::None,

    device_activity: bool = false,
    inactivity_state: bool = false,
    interaction_expected: bool = false,
    compositor_running: bool = false,

    lpm_ui_wanted: bool = false,
    lpm_ui_last: bool = false,

    touchscreen_enabled: bool = true,
    keypad_enabled: bool = true,
    doubletap_enabled: bool = false,
}
