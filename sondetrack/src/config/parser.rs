//! INI parsing: `Ini` → `ConfigFile`.
//!
//! The single place where INI key names are mapped to struct fields. Values
//! found in the file are overlaid on `ConfigFile::default()`.

use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

use ini::{Ini, Properties};

use super::file::ConfigFileError;
use super::settings::ConfigFile;

/// Typed access to one INI section with uniform error reporting.
struct Section<'a> {
    name: &'static str,
    props: &'a Properties,
}

impl<'a> Section<'a> {
    fn open(ini: &'a Ini, name: &'static str) -> Option<Self> {
        ini.section(Some(name)).map(|props| Self { name, props })
    }

    fn invalid(&self, key: &str, value: &str, reason: &str) -> ConfigFileError {
        ConfigFileError::InvalidValue {
            section: self.name.to_string(),
            key: key.to_string(),
            value: value.to_string(),
            reason: reason.to_string(),
        }
    }

    fn raw(&self, key: &str) -> Option<&'a str> {
        self.props.get(key).map(str::trim).filter(|v| !v.is_empty())
    }

    fn parsed<T: FromStr>(&self, key: &str, reason: &str) -> Result<Option<T>, ConfigFileError> {
        match self.raw(key) {
            Some(v) => v.parse().map(Some).map_err(|_| self.invalid(key, v, reason)),
            None => Ok(None),
        }
    }

    /// Any finite number.
    fn number(&self, key: &str) -> Result<Option<f64>, ConfigFileError> {
        match self.parsed::<f64>(key, "must be a number")? {
            Some(v) if !v.is_finite() => Err(self.invalid(key, &v.to_string(), "must be finite")),
            other => Ok(other),
        }
    }

    /// A non-negative number of seconds (fractions allowed).
    fn seconds(&self, key: &str) -> Result<Option<Duration>, ConfigFileError> {
        let reason = "must be a non-negative number of seconds";
        match self.parsed::<f64>(key, reason)? {
            Some(v) if v >= 0.0 => Duration::try_from_secs_f64(v)
                .map(Some)
                .map_err(|_| self.invalid(key, &v.to_string(), "is out of range")),
            Some(v) => Err(self.invalid(key, &v.to_string(), reason)),
            None => Ok(None),
        }
    }

    /// A positive integer.
    fn count<T: FromStr + PartialOrd + Default>(&self, key: &str) -> Result<Option<T>, ConfigFileError> {
        let reason = "must be a positive integer";
        match self.raw(key) {
            Some(v) => match v.parse::<T>() {
                Ok(n) if n > T::default() => Ok(Some(n)),
                _ => Err(self.invalid(key, v, reason)),
            },
            None => Ok(None),
        }
    }
}

/// Assign `$target` if `$value` (a `Result<Option<_>>`) holds a value.
macro_rules! overlay {
    ($target:expr, $value:expr) => {
        if let Some(v) = $value? {
            $target = v;
        }
    };
}

/// Parse an `Ini` into a `ConfigFile`.
pub(super) fn parse_ini(ini: &Ini) -> Result<ConfigFile, ConfigFileError> {
    let mut config = ConfigFile::default();

    if let Some(s) = Section::open(ini, "telemetry") {
        let t = &mut config.tracker.telemetry;
        overlay!(t.recent_window, s.count("recent_window"));
        overlay!(t.speed_window, s.count("speed_window"));
        overlay!(t.descent_window, s.count("descent_window"));
        overlay!(t.landed_window, s.count("landed_window"));
        overlay!(t.descent_lookback, s.seconds("descent_lookback_secs"));
        overlay!(t.min_descent_samples, s.count("min_descent_samples"));
        overlay!(t.freshness, s.seconds("freshness_secs"));
        overlay!(t.landed_vertical_speed, s.number("landed_vertical_speed"));
        overlay!(t.landed_horizontal_speed, s.number("landed_horizontal_speed"));
        overlay!(t.checkpoint_interval, s.count("checkpoint_interval"));
    }

    if let Some(s) = Section::open(ini, "mode") {
        let m = &mut config.tracker.mode;
        overlay!(m.hysteresis, s.seconds("hysteresis_secs"));
        overlay!(m.reevaluation_interval, s.seconds("reevaluation_interval_secs"));
        overlay!(m.signal_loss_timeout, s.seconds("signal_loss_timeout_secs"));
        overlay!(m.max_distance_m, s.number("max_distance_m"));
        overlay!(m.flying_altitude_m, s.number("flying_altitude_m"));
        overlay!(m.low_speed_threshold, s.number("low_speed_threshold"));
        overlay!(m.low_speed_duration, s.seconds("low_speed_duration_secs"));
        overlay!(m.final_approach_altitude_m, s.number("final_approach_altitude_m"));
        overlay!(m.final_approach_distance_m, s.number("final_approach_distance_m"));
        overlay!(m.follow_signal_dbm, s.number("follow_signal_dbm"));
        overlay!(m.follow_signal_duration, s.seconds("follow_signal_duration_secs"));
        overlay!(m.telemetry_gap, s.seconds("telemetry_gap_secs"));
        overlay!(m.history_capacity, s.count("history_capacity"));
    }

    if let Some(s) = Section::open(ini, "policy") {
        let p = &mut config.tracker.policy;
        overlay!(p.min_update_interval, s.seconds("min_update_interval_secs"));
        overlay!(p.annotation_debounce, s.seconds("annotation_debounce_secs"));
        overlay!(p.camera_debounce, s.seconds("camera_debounce_secs"));
        overlay!(p.pan_suppression, s.seconds("pan_suppression_secs"));
        overlay!(p.recenter_explore_m, s.number("recenter_explore_m"));
        overlay!(p.recenter_follow_m, s.number("recenter_follow_m"));
        overlay!(p.recenter_final_approach_m, s.number("recenter_final_approach_m"));
        overlay!(p.region_padding, s.number("region_padding"));
    }

    if let Some(s) = Section::open(ini, "scheduler") {
        let sc = &mut config.tracker.scheduler;
        overlay!(sc.backoff_base, s.seconds("backoff_base_secs"));
        if let Some(v) = s.number("backoff_max_multiplier")? {
            if v < 1.0 {
                return Err(s.invalid("backoff_max_multiplier", &v.to_string(), "must be at least 1"));
            }
            sc.backoff_max_multiplier = v;
        }
    }

    if let Some(s) = Section::open(ini, "logging") {
        if let Some(v) = s.raw("directory") {
            config.logging.directory = expand_tilde(v);
        }
        if let Some(v) = s.raw("file") {
            config.logging.file = v.to_string();
        }
    }

    Ok(config)
}

/// Expand a leading `~` to the home directory.
fn expand_tilde(path: &str) -> PathBuf {
    if let Some(rest) = path.strip_prefix("~/") {
        if let Some(home) = dirs::home_dir() {
            return home.join(rest);
        }
    }
    PathBuf::from(path)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse(content: &str) -> Result<ConfigFile, ConfigFileError> {
        parse_ini(&Ini::load_from_str(content).unwrap())
    }

    #[test]
    fn test_empty_gives_defaults() {
        assert_eq!(parse("").unwrap(), ConfigFile::default());
    }

    #[test]
    fn test_overlays_each_section() {
        let config = parse(
            "[telemetry]\nspeed_window = 30\nfreshness_secs = 2.5\n\
             [mode]\nhysteresis_secs = 10\n\
             [policy]\ncamera_debounce_secs = 0.5\nrecenter_follow_m = 75\n\
             [scheduler]\nbackoff_base_secs = 2\n\
             [logging]\nfile = custom.log\n",
        )
        .unwrap();

        assert_eq!(config.tracker.telemetry.speed_window, 30);
        assert_eq!(config.tracker.telemetry.freshness, Duration::from_millis(2500));
        assert_eq!(config.tracker.mode.hysteresis, Duration::from_secs(10));
        assert_eq!(config.tracker.policy.camera_debounce, Duration::from_millis(500));
        assert_eq!(config.tracker.policy.recenter_follow_m, 75.0);
        assert_eq!(config.tracker.scheduler.backoff_base, Duration::from_secs(2));
        assert_eq!(config.logging.file, "custom.log");
    }

    #[test]
    fn test_blank_values_ignored() {
        let config = parse("[mode]\nhysteresis_secs =   \n").unwrap();
        assert_eq!(config.tracker.mode.hysteresis, Duration::from_secs(5));
    }

    #[test]
    fn test_invalid_values_reported() {
        let err = parse("[telemetry]\nspeed_window = 0\n").unwrap_err();
        match err {
            ConfigFileError::InvalidValue { section, key, value, .. } => {
                assert_eq!(section, "telemetry");
                assert_eq!(key, "speed_window");
                assert_eq!(value, "0");
            }
            other => panic!("unexpected error: {other}"),
        }

        assert!(parse("[mode]\nhysteresis_secs = -1\n").is_err());
        assert!(parse("[mode]\nmax_distance_m = far\n").is_err());
        assert!(parse("[scheduler]\nbackoff_max_multiplier = 0.5\n").is_err());
    }

    #[test]
    fn test_oversized_seconds_rejected() {
        let err = parse("[mode]\nhysteresis_secs = 1e30\n").unwrap_err();
        match err {
            ConfigFileError::InvalidValue { key, reason, .. } => {
                assert_eq!(key, "hysteresis_secs");
                assert_eq!(reason, "is out of range");
            }
            other => panic!("unexpected error: {other}"),
        }
        assert!(parse("[telemetry]\nfreshness_secs = inf\n").is_err());
    }

    #[test]
    fn test_expand_tilde() {
        assert_eq!(expand_tilde("/var/log"), PathBuf::from("/var/log"));
        if let Some(home) = dirs::home_dir() {
            assert_eq!(expand_tilde("~/logs"), home.join("logs"));
        }
    }
}
