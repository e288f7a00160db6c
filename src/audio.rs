//! Audio-routing observer (C10, §4.7).
//!
//! Grounded on the teacher's prefix-match-style validation helpers
//! (simple guard functions over a small fixed table, same shape as a
//! dropped SSID-prefix validator) applied to sink-name routing instead.

use crate::datapipe::AudioRoute;

/// One `(sink, group, limit, variable, value)` tuple from the policy
/// signal's array-of-arrays.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PolicyTuple {
    pub sink: String,
    pub group: String,
    pub limit: i64,
    pub variable: String,
    pub value: String,
}

/// Prefix table, longest-prefix-first so e.g. `"bluetooth_a2dp"` beats
/// a plain `"bluetooth"` entry.
const ROUTE_PREFIXES: &[(&str, AudioRoute)] = &[
    ("null", AudioRoute::Undefined),
    ("bluetooth_a2dp", AudioRoute::Speaker),
    ("bluetooth_sco", AudioRoute::Headset),
    ("bluetooth", AudioRoute::Headset),
    ("wired_headset", AudioRoute::Headset),
    ("wired_headphone", AudioRoute::Headset),
    ("speaker", AudioRoute::Speaker),
    ("earpiece", AudioRoute::Handset),
    ("handset", AudioRoute::Handset),
];

pub fn route_from_sink_name(sink: &str) -> AudioRoute {
    let sink_lower = sink.to_ascii_lowercase();
    ROUTE_PREFIXES
        .iter()
        .filter(|(prefix, _)| sink_lower.starts_with(prefix))
        .max_by_key(|(prefix, _)| prefix.len())
        .map(|(_, route)| *route)
        .unwrap_or(AudioRoute::Undefined)
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MediaState {
    Active,
    Background,
    Inactive,
}

pub struct AudioObserver {
    pub route: AudioRoute,
    pub music_playing: bool,
}

impl AudioObserver {
    pub fn new() -> Self {
        Self {
            route: AudioRoute::Undefined,
            music_playing: false,
        }
    }

    /// Parse the policy array-of-arrays into tuples, ignoring any entry
    /// missing the fields the routing/music logic needs.
    pub fn parse_policy_tuples(raw: &[(String, String, i64, String, String)]) -> Vec<PolicyTuple> {
        raw.iter()
            .map(|(sink, group, limit, variable, value)| PolicyTuple {
                sink: sink.clone(),
                group: group.clone(),
                limit: *limit,
                variable: variable.clone(),
                value: value.clone(),
            })
            .collect()
    }

    /// Re-derive route and music-playing state from a fresh policy
    /// snapshot. Returns `true` if the route changed.
    pub fn on_policy_changed(
        &mut self,
        tuples: &[PolicyTuple],
        active_sink: Option<&str>,
        media_state: Option<MediaState>,
    ) -> bool {
        let new_route = active_sink.map(route_from_sink_name).unwrap_or(AudioRoute::Undefined);
        let changed = new_route != self.route;
        self.route = new_route;

        self.music_playing = match media_state {
            Some(MediaState::Active) | Some(MediaState::Background) => true,
            Some(MediaState::Inactive) => false,
            None => Self::volume_limit_heuristic(tuples),
        };

        changed
    }

    /// Fallback heuristic when no `media_state` is reported: any policy
    /// tuple carrying a non-zero volume limit for the active group is
    /// taken to mean audio is actively being limited, i.e. playing.
    fn volume_limit_heuristic(tuples: &[PolicyTuple]) -> bool {
        tuples.iter().any(|t| t.limit > 0)
    }
}

impl Default for AudioObserver {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn prefix_match_prefers_longest_match() {
        assert_eq!(route_from_sink_name("bluetooth_a2dp_headset"), AudioRoute::Speaker);
        assert_eq!(route_from_sink_name("bluetooth_generic"), AudioRoute::Headset);
    }

    #[test]
    fn unmatched_sink_yields_undefined() {
        assert_eq!(route_from_sink_name("mystery_device"), AudioRoute::Undefined);
    }

    #[test]
    fn media_state_preferred_over_heuristic() {
        let mut obs = AudioObserver::new();
        let tuples = vec![];
        let changed = obs.on_policy_changed(&tuples, Some("speaker_out"), Some(MediaState::Inactive));
        assert!(changed);
        assert!(!obs.music_playing);
    }

    #[test]
    fn volume_limit_heuristic_used_without_media_state() {
        let mut obs = AudioObserver::new();
        let tuples = vec![PolicyTuple {
            sink: "speaker".into(),
            group: "music".into(),
            limit: 5,
            variable: "volume".into(),
            value: "40".into(),
        }];
        obs.on_policy_changed(&tuples, Some("speaker"), None);
        assert!(obs.music_playing);
    }
}
