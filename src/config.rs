use std::str::FromStr;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum RoundingMode {
    #[default]
    HalfEven,
    HalfUp,
}

impl RoundingMode {
    pub fn round(&self, value: f64) -> f64 {
        let rounded = match self {
            RoundingMode::HalfEven => value.round_ties_even(),
            RoundingMode::HalfUp => value.round(),
        };
        // Avoid printing "-0".
        if rounded == 0.0 {
            0.0
        } else {
            rounded
        }
    }

    pub fn round_to_int(&self, value: f64) -> i64 {
        self.round(value) as i64
    }

    pub fn round_one_decimal(&self, value: f64) -> f64 {
        self.round(value * 10.0) / 10.0
    }
}

impl FromStr for RoundingMode {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "half-even" | "half_even" | "bankers" => Ok(RoundingMode::HalfEven),
            "half-up" | "half_up" => Ok(RoundingMode::HalfUp),
            other => Err(format!(
                "invalid rounding mode {other:?}: expected half-even or half-up"
            )),
        }
    }
}

/// Trend percentage bounds. Strictly below `decline` is declining, strictly
/// above `improve` is improving, anything in between (inclusive) is stable.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Thresholds {
    pub decline: f64,
    pub improve: f64,
}

impl Default for Thresholds {
    fn default() -> Self {
        Self {
            decline: -10.0,
            improve: 10.0,
        }
    }
}

impl Thresholds {
    pub fn validate(&self) -> Result<(), String> {
        if !self.decline.is_finite() || !self.improve.is_finite() {
            return Err("trend thresholds must be finite numbers".to_string());
        }
        if self.decline >= self.improve {
            return Err(format!(
                "decline threshold ({}) must be below improve threshold ({})",
                self.decline, self.improve
            ));
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Default)]
pub struct Settings {
    pub thresholds: Thresholds,
    pub rounding: RoundingMode,
}

impl Settings {
    pub fn from_env() -> Result<Self, String> {
        let defaults = Thresholds::default();
        let settings = Self {
            thresholds: Thresholds {
                decline: parse_env_f64("DECAY_DECLINE_THRESHOLD", defaults.decline)?,
                improve: parse_env_f64("DECAY_IMPROVE_THRESHOLD", defaults.improve)?,
            },
            rounding: match std::env::var("DECAY_ROUNDING") {
                Ok(raw) => raw.parse()?,
                Err(_) => RoundingMode::default(),
            },
        };
        settings.thresholds.validate()?;
        Ok(settings)
    }

    pub fn with_overrides(
        mut self,
        decline: Option<f64>,
        improve: Option<f64>,
        rounding: Option<RoundingMode>,
    ) -> Result<Self, String> {
        if let Some(value) = decline {
            self.thresholds.decline = value;
        }
        if let Some(value) = improve {
            self.thresholds.improve = value;
        }
        if let Some(mode) = rounding {
            self.rounding = mode;
        }
        self.thresholds.validate()?;
        Ok(self)
    }
}

fn parse_env_f64(key: &str, default: f64) -> Result<f64, String> {
    match std::env::var(key) {
        Ok(raw) => raw
            .trim()
            .parse()
            .map_err(|e| format!("invalid {key}: {e}")),
        Err(_) => Ok(default),
    }
}
