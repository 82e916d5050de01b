use std::fmt;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::de::{self, Deserializer};
use serde::{Deserialize, Serialize, Serializer};

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("failed to read configuration at {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("failed to parse configuration: {0}")]
    Parse(#[from] toml::de::Error),
    #[error("invalid configuration: {0}")]
    Invalid(String),
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct GlassConfig {
    pub version: u32,
    #[serde(default)]
    pub storm: StormConfig,
    #[serde(default)]
    pub idle: IdleConfig,
    #[serde(default)]
    pub focus: FocusConfig,
    #[serde(default)]
    pub rain: RainConfig,
    #[serde(default)]
    pub interaction: InteractionConfig,
    #[serde(default)]
    pub cards: Vec<CardConfig>,
}

impl Default for GlassConfig {
    fn default() -> Self {
        Self {
            version: 1,
            storm: StormConfig::default(),
            idle: IdleConfig::default(),
            focus: FocusConfig::default(),
            rain: RainConfig::default(),
            interaction: InteractionConfig::default(),
            cards: Vec::new(),
        }
    }
}

/// Typing-driven storm accumulation and its thresholds.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct StormConfig {
    pub heavy_threshold: f32,
    pub intense_threshold: f32,
    /// Amount subtracted on every decay tick.
    pub decay_per_tick: f32,
    #[serde(
        deserialize_with = "deserialize_duration",
        serialize_with = "serialize_duration"
    )]
    pub decay_interval: Duration,
    /// Probability of a lightning flash per lightning tick while above the intense threshold.
    pub lightning_chance: f64,
    #[serde(
        deserialize_with = "deserialize_duration",
        serialize_with = "serialize_duration"
    )]
    pub lightning_interval: Duration,
    #[serde(
        deserialize_with = "deserialize_duration",
        serialize_with = "serialize_duration"
    )]
    pub flash_duration: Duration,
}

impl Default for StormConfig {
    fn default() -> Self {
        Self {
            heavy_threshold: 30.0,
            intense_threshold: 80.0,
            decay_per_tick: 5.0,
            decay_interval: Duration::from_secs(1),
            lightning_chance: 0.3,
            lightning_interval: Duration::from_secs(1),
            flash_duration: Duration::from_millis(180),
        }
    }
}

/// Idle-driven fog and blur ramps.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct IdleConfig {
    #[serde(
        deserialize_with = "deserialize_duration",
        serialize_with = "serialize_duration"
    )]
    pub fog_after: Duration,
    /// Fog opacity gained per idle second once past `fog_after`.
    pub fog_rate: f32,
    pub fog_max: f32,
    #[serde(
        deserialize_with = "deserialize_duration",
        serialize_with = "serialize_duration"
    )]
    pub blur_after: Duration,
    pub blur_per_second: f32,
    pub blur_cap: f32,
}

impl Default for IdleConfig {
    fn default() -> Self {
        Self {
            fog_after: Duration::from_secs(1),
            fog_rate: 0.05,
            fog_max: 0.6,
            blur_after: Duration::from_secs(2),
            blur_per_second: 2.0,
            blur_cap: 5.0,
        }
    }
}

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct FocusConfig {
    /// Depth engaged the first time the peek modifier is held.
    pub preferred: f32,
    /// Depth change per scrolled pixel while peeking.
    pub scroll_step: f32,
}

impl Default for FocusConfig {
    fn default() -> Self {
        Self {
            preferred: 1.0,
            scroll_step: 0.001,
        }
    }
}

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct RainConfig {
    pub rain_chance: f32,
    pub droplets_rate: f32,
    pub brightness: f32,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub background: Option<PathBuf>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub foreground: Option<PathBuf>,
    #[serde(
        deserialize_with = "deserialize_duration",
        serialize_with = "serialize_duration"
    )]
    pub startup_timeout: Duration,
}

impl Default for RainConfig {
    fn default() -> Self {
        Self {
            rain_chance: 0.3,
            droplets_rate: 50.0,
            brightness: 1.04,
            background: None,
            foreground: None,
            startup_timeout: Duration::from_secs(2),
        }
    }
}

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct InteractionConfig {
    /// Radius (viewport pixels) of droplets cleared under a dragging pointer.
    pub wipe_radius: f32,
    /// Radius (viewport pixels) of fog wiped under the pointer.
    pub fog_wipe_radius: f32,
}

impl Default for InteractionConfig {
    fn default() -> Self {
        Self {
            wipe_radius: 48.0,
            fog_wipe_radius: 60.0,
        }
    }
}

/// A note card shown in the connection graph, in viewport pixels.
#[derive(Debug, Clone, Deserialize, Serialize, PartialEq)]
pub struct CardConfig {
    pub x: f32,
    pub y: f32,
    pub width: f32,
    pub height: f32,
    pub text: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub depth: Option<f32>,
}

fn deserialize_duration<'de, D>(deserializer: D) -> Result<Duration, D::Error>
where
    D: Deserializer<'de>,
{
    struct Visitor;
    impl<'de> de::Visitor<'de> for Visitor {
        type Value = Duration;

        fn expecting(&self, formatter: &mut fmt::Formatter<'_>) -> fmt::Result {
            formatter.write_str("a duration as number of seconds or human-readable string")
        }

        fn visit_str<E>(self, v: &str) -> Result<Self::Value, E>
        where
            E: de::Error,
        {
            humantime::parse_duration(v)
                .map_err(|err| E::custom(format!("invalid duration '{v}': {err}")))
        }

        fn visit_u64<E>(self, v: u64) -> Result<Self::Value, E>
        where
            E: de::Error,
        {
            Ok(Duration::from_secs(v))
        }

        fn visit_i64<E>(self, v: i64) -> Result<Self::Value, E>
        where
            E: de::Error,
        {
            if v < 0 {
                return Err(E::custom("duration must be non-negative"));
            }
            Ok(Duration::from_secs(v as u64))
        }

        fn visit_f64<E>(self, v: f64) -> Result<Self::Value, E>
        where
            E: de::Error,
        {
            if v.is_nan() || v.is_sign_negative() {
                return Err(E::custom("duration must be non-negative"));
            }
            Duration::try_from_secs_f64(v).map_err(E::custom)
        }
    }

    deserializer.deserialize_any(Visitor)
}

fn serialize_duration<S>(value: &Duration, serializer: S) -> Result<S::Ok, S::Error>
where
    S: Serializer,
{
    serializer.serialize_str(&humantime::format_duration(*value).to_string())
}

impl GlassConfig {
    pub fn from_toml_str(input: &str) -> Result<Self, ConfigError> {
        let raw: GlassConfig = toml::from_str(input)?;
        raw.validate()?;
        Ok(raw)
    }

    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let contents = fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_toml_str(&contents)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.version != 1 {
            return Err(ConfigError::Invalid(format!(
                "unsupported config version {}; expected 1",
                self.version
            )));
        }

        self.ensure_finite()?;

        let storm = &self.storm;
        if storm.heavy_threshold < 0.0 || storm.heavy_threshold >= storm.intense_threshold {
            return Err(ConfigError::Invalid(format!(
                "storm.heavy_threshold ({}) must be >= 0 and below storm.intense_threshold ({})",
                storm.heavy_threshold, storm.intense_threshold
            )));
        }
        if storm.decay_per_tick <= 0.0 {
            return Err(ConfigError::Invalid(
                "storm.decay_per_tick must be greater than zero".into(),
            ));
        }
        if storm.decay_interval.is_zero() || storm.lightning_interval.is_zero() {
            return Err(ConfigError::Invalid(
                "storm intervals must be greater than zero".into(),
            ));
        }
        if !(0.0..=1.0).contains(&storm.lightning_chance) {
            return Err(ConfigError::Invalid(format!(
                "storm.lightning_chance must be within [0, 1], got {}",
                storm.lightning_chance
            )));
        }

        let idle = &self.idle;
        if idle.fog_rate < 0.0 || idle.blur_per_second < 0.0 {
            return Err(ConfigError::Invalid(
                "idle rates must be non-negative".into(),
            ));
        }
        if !(0.0..=1.0).contains(&idle.fog_max) {
            return Err(ConfigError::Invalid(format!(
                "idle.fog_max must be within [0, 1], got {}",
                idle.fog_max
            )));
        }
        if idle.blur_cap < 0.0 {
            return Err(ConfigError::Invalid("idle.blur_cap must be >= 0".into()));
        }

        if !(0.1..=1.0).contains(&self.focus.preferred) {
            return Err(ConfigError::Invalid(format!(
                "focus.preferred must be within [0.1, 1], got {}",
                self.focus.preferred
            )));
        }

        let rain = &self.rain;
        if !(0.0..=1.0).contains(&rain.rain_chance) {
            return Err(ConfigError::Invalid(format!(
                "rain.rain_chance must be within [0, 1], got {}",
                rain.rain_chance
            )));
        }
        if rain.droplets_rate < 0.0 {
            return Err(ConfigError::Invalid(
                "rain.droplets_rate must be >= 0".into(),
            ));
        }
        if rain.brightness < 0.0 {
            return Err(ConfigError::Invalid(format!(
                "rain.brightness must be >= 0, got {}",
                rain.brightness
            )));
        }

        if self.interaction.wipe_radius < 0.0 || self.interaction.fog_wipe_radius < 0.0 {
            return Err(ConfigError::Invalid(
                "interaction radii must be non-negative".into(),
            ));
        }

        for (index, card) in self.cards.iter().enumerate() {
            if card.text.trim().is_empty() {
                return Err(ConfigError::Invalid(format!(
                    "card #{index} must contain text"
                )));
            }
            if card.width <= 0.0 || card.height <= 0.0 {
                return Err(ConfigError::Invalid(format!(
                    "card #{index} must have a positive size"
                )));
            }
            if let Some(depth) = card.depth {
                if !(0.5..=2.0).contains(&depth) {
                    return Err(ConfigError::Invalid(format!(
                        "card #{index} depth must be within [0.5, 2.0]"
                    )));
                }
            }
        }

        Ok(())
    }

    /// Range checks pass NaN through, so every float is screened first.
    fn ensure_finite(&self) -> Result<(), ConfigError> {
        let (storm, idle, rain) = (&self.storm, &self.idle, &self.rain);
        let fields = [
            ("storm.heavy_threshold", storm.heavy_threshold),
            ("storm.intense_threshold", storm.intense_threshold),
            ("storm.decay_per_tick", storm.decay_per_tick),
            ("idle.fog_rate", idle.fog_rate),
            ("idle.fog_max", idle.fog_max),
            ("idle.blur_per_second", idle.blur_per_second),
            ("idle.blur_cap", idle.blur_cap),
            ("focus.preferred", self.focus.preferred),
            ("focus.scroll_step", self.focus.scroll_step),
            ("rain.rain_chance", rain.rain_chance),
            ("rain.droplets_rate", rain.droplets_rate),
            ("rain.brightness", rain.brightness),
            ("interaction.wipe_radius", self.interaction.wipe_radius),
            ("interaction.fog_wipe_radius", self.interaction.fog_wipe_radius),
        ];
        if let Some((name, value)) = fields.iter().find(|(_, value)| !value.is_finite()) {
            return Err(ConfigError::Invalid(format!(
                "{name} must be a finite number, got {value}"
            )));
        }
        if !storm.lightning_chance.is_finite() {
            return Err(ConfigError::Invalid(format!(
                "storm.lightning_chance must be a finite number, got {}",
                storm.lightning_chance
            )));
        }

        for (index, card) in self.cards.iter().enumerate() {
            let depth = card.depth.unwrap_or(1.0);
            if [card.x, card.y, card.width, card.height, depth]
                .iter()
                .any(|value| !value.is_finite())
            {
                return Err(ConfigError::Invalid(format!(
                    "card #{index} geometry must be finite"
                )));
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const SAMPLE: &str = r#"
version = 1

[storm]
heavy_threshold = 25
intense_threshold = 60
decay_per_tick = 4
flash_duration = "250ms"

[idle]
fog_after = "1500ms"
blur_after = 3
blur_cap = 6.5

[rain]
background = "img/texture-rain-bg.png"
startup_timeout = "500ms"

[[cards]]
x = 40
y = 60
width = 220
height = 140
text = "Shader pipeline notes"

[[cards]]
x = 340
y = 90
width = 220
height = 140
text = "Pipeline ordering"
depth = 1.5
"#;

    #[test]
    fn parses_sample_config() {
        let config = GlassConfig::from_toml_str(SAMPLE).expect("parse config");
        assert_eq!(config.version, 1);
        assert_eq!(config.storm.heavy_threshold, 25.0);
        assert_eq!(config.storm.flash_duration, Duration::from_millis(250));
        assert_eq!(config.storm.decay_interval, Duration::from_secs(1));
        assert_eq!(config.idle.fog_after, Duration::from_millis(1500));
        assert_eq!(config.idle.blur_after, Duration::from_secs(3));
        assert_eq!(
            config.rain.background.as_deref(),
            Some(Path::new("img/texture-rain-bg.png"))
        );
        assert_eq!(config.cards.len(), 2);
        assert_eq!(config.cards[1].depth, Some(1.5));
    }

    #[test]
    fn minimal_config_uses_defaults() {
        let config = GlassConfig::from_toml_str("version = 1").unwrap();
        assert_eq!(config.storm.intense_threshold, 80.0);
        assert_eq!(config.idle.blur_cap, 5.0);
        assert_eq!(config.focus.preferred, 1.0);
        assert!(config.cards.is_empty());
    }

    #[test]
    fn rejects_inverted_thresholds() {
        let err = GlassConfig::from_toml_str(
            r#"
version = 1

[storm]
heavy_threshold = 90
intense_threshold = 80
"#,
        )
        .unwrap_err();
        assert!(matches!(err, ConfigError::Invalid(_)));
    }

    #[test]
    fn rejects_unsupported_version() {
        let err = GlassConfig::from_toml_str("version = 2").unwrap_err();
        assert!(matches!(err, ConfigError::Invalid(_)));
    }

    #[test]
    fn rejects_negative_duration() {
        let err = GlassConfig::from_toml_str(
            r#"
version = 1

[idle]
fog_after = -1
"#,
        )
        .unwrap_err();
        assert!(matches!(err, ConfigError::Parse(_)));
    }

    #[test]
    fn rejects_infinite_duration() {
        let err = GlassConfig::from_toml_str("version = 1\n[storm]\ndecay_interval = inf\n")
            .unwrap_err();
        assert!(matches!(err, ConfigError::Parse(_)));
    }

    #[test]
    fn rejects_non_finite_numbers() {
        let err = GlassConfig::from_toml_str("version = 1\n[storm]\nheavy_threshold = nan\n")
            .unwrap_err();
        match err {
            ConfigError::Invalid(message) => assert!(message.contains("heavy_threshold")),
            other => panic!("unexpected error: {other:?}"),
        }

        let err = GlassConfig::from_toml_str("version = 1\n[rain]\nrain_chance = nan\n")
            .unwrap_err();
        assert!(matches!(err, ConfigError::Invalid(_)));
    }

    #[test]
    fn rejects_negative_brightness() {
        let err = GlassConfig::from_toml_str("version = 1\n[rain]\nbrightness = -1\n")
            .unwrap_err();
        match err {
            ConfigError::Invalid(message) => assert!(message.contains("brightness")),
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[test]
    fn rejects_blank_card() {
        let err = GlassConfig::from_toml_str(
            r#"
version = 1

[[cards]]
x = 0
y = 0
width = 10
height = 10
text = "   "
"#,
        )
        .unwrap_err();
        assert!(matches!(err, ConfigError::Invalid(_)));
    }

    #[test]
    fn durations_serialize_human_readable() {
        let rendered = toml::to_string(&GlassConfig::default()).unwrap();
        assert!(rendered.contains("flash_duration = \"180ms\""));
        let reparsed = GlassConfig::from_toml_str(&rendered).unwrap();
        assert_eq!(reparsed.idle.blur_after, Duration::from_secs(2));
    }

    #[test]
    fn load_reports_missing_file() {
        let dir = tempfile::TempDir::new().unwrap();
        let err = GlassConfig::load(&dir.path().join("absent.toml")).unwrap_err();
        assert!(matches!(err, ConfigError::Io { .. }));
    }
}
