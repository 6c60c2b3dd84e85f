//! INI serialization: `ConfigFile` → commented `config.ini` text.

use std::time::Duration;

use super::settings::ConfigFile;

fn secs(d: Duration) -> f64 {
    d.as_secs_f64()
}

/// Render a fully populated, commented configuration file.
pub(super) fn to_config_string(config: &ConfigFile) -> String {
    let t = &config.tracker.telemetry;
    let m = &config.tracker.mode;
    let p = &config.tracker.policy;
    let s = &config.tracker.scheduler;
    let l = &config.logging;

    format!(
        r#"[telemetry]
; Samples kept for the "is flying" check
recent_window = {}
; Samples averaged for smoothed vertical / horizontal speed
speed_window = {}
; Descent-rate values averaged
descent_window = {}
; Positions averaged for the landed position
landed_window = {}
; Minimum age of the reference point for descent rate (seconds)
descent_lookback_secs = {}
; Descent-rate values needed before the average is used
min_descent_samples = {}
; Samples older than this skip landing evaluation (seconds)
freshness_secs = {}
; Landed when smoothed |vertical speed| (m/s) and horizontal speed (km/h) are both below these
landed_vertical_speed = {}
landed_horizontal_speed = {}
; Save the track every N accepted samples
checkpoint_interval = {}

[mode]
; Minimum time between mode transitions (seconds)
hysteresis_secs = {}
; Periodic re-evaluation (seconds)
reevaluation_interval_secs = {}
; Fall back to Explore after this much telemetry silence (seconds)
signal_loss_timeout_secs = {}
; Fall back to Explore beyond this distance (metres)
max_distance_m = {}
; The balloon counts as flying above this altitude (metres)
flying_altitude_m = {}
; Final approach: |vertical speed| below threshold (m/s) for the given duration
low_speed_threshold = {}
low_speed_duration_secs = {}
; Final approach: altitude and distance both below these (metres)
final_approach_altitude_m = {}
final_approach_distance_m = {}
; Follow: signal stronger than this (dBm) for the given duration
follow_signal_dbm = {}
follow_signal_duration_secs = {}
; A telemetry gap longer than this restarts the signal timer (seconds)
telemetry_gap_secs = {}
; Transitions remembered
history_capacity = {}

[policy]
; Minimum time between accepted map updates (seconds)
min_update_interval_secs = {}
; Debounce before annotation / camera recompute (seconds)
annotation_debounce_secs = {}
camera_debounce_secs = {}
; Automatic follow pauses this long after a manual pan (seconds)
pan_suppression_secs = {}
; Recentre the camera once the balloon moved this far (metres)
recenter_explore_m = {}
recenter_follow_m = {}
recenter_final_approach_m = {}
; Padding around fitted regions (fraction of span per side)
region_padding = {}

[scheduler]
; Backoff base interval (seconds) and multiplier cap
backoff_base_secs = {}
backoff_max_multiplier = {}

[logging]
directory = {}
file = {}
"#,
        t.recent_window,
        t.speed_window,
        t.descent_window,
        t.landed_window,
        secs(t.descent_lookback),
        t.min_descent_samples,
        secs(t.freshness),
        t.landed_vertical_speed,
        t.landed_horizontal_speed,
        t.checkpoint_interval,
        secs(m.hysteresis),
        secs(m.reevaluation_interval),
        secs(m.signal_loss_timeout),
        m.max_distance_m,
        m.flying_altitude_m,
        m.low_speed_threshold,
        secs(m.low_speed_duration),
        m.final_approach_altitude_m,
        m.final_approach_distance_m,
        m.follow_signal_dbm,
        secs(m.follow_signal_duration),
        secs(m.telemetry_gap),
        m.history_capacity,
        secs(p.min_update_interval),
        secs(p.annotation_debounce),
        secs(p.camera_debounce),
        secs(p.pan_suppression),
        p.recenter_explore_m,
        p.recenter_follow_m,
        p.recenter_final_approach_m,
        p.region_padding,
        secs(s.backoff_base),
        s.backoff_max_multiplier,
        l.directory.display(),
        l.file,
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_output_contains_all_sections() {
        let text = to_config_string(&ConfigFile::default());
        for section in ["[telemetry]", "[mode]", "[policy]", "[scheduler]", "[logging]"] {
            assert!(text.contains(section), "missing {section}");
        }
        assert!(text.contains("hysteresis_secs = 5\n"));
        assert!(text.contains("camera_debounce_secs = 0.25\n"));
        assert!(text.contains("follow_signal_dbm = -80\n"));
    }
}
