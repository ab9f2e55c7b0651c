use std::time::Duration;

/// Gameplay constants shared with clients by convention.
///
/// These form an implicit protocol contract: a client that renders the field
/// or clamps its own paddle assumes the same numbers, so changing any of them
/// changes observable behavior and has to be coordinated with client releases.
#[derive(Debug, Clone)]
pub struct GameConfig {
    pub field_width: f64,
    pub field_height: f64,
    pub paddle_width: f64,
    /// Half-paddle offset: distance from a paddle's edge to its center, and
    /// the depth of the contact band in front of each paddle.
    pub paddle_diff: f64,
    /// |speed_y| of a fresh serve.
    pub serve_speed: f64,
    /// Hard cap on |speed_y| after contact escalation.
    pub max_speed: f64,
    /// Horizontal speed per pixel of offset between ball and paddle center.
    pub spin_factor: f64,
    pub winning_score: u32,
    /// Where both paddles start before any input arrives.
    pub paddle_start_x: f64,
}

impl Default for GameConfig {
    fn default() -> Self {
        Self {
            field_width: 500.0,
            field_height: 700.0,
            paddle_width: 50.0,
            paddle_diff: 25.0,
            serve_speed: 3.0,
            max_speed: 5.0,
            spin_factor: 0.3,
            winning_score: 7,
            paddle_start_x: 255.0,
        }
    }
}

/// Server configuration
#[derive(Debug, Clone)]
pub struct ServerConfig {
    pub listen_addr: String,
    /// Room timer rate. Runs well above the ~60 Hz the motion constants were
    /// tuned for, which absorbs scheduling jitter at the cost of a faster
    /// ball than the single-player client.
    pub tick_rate_hz: u32,
    /// Render-equivalent time one tick may spend before it eats into the
    /// next frame.
    pub frame_budget: Duration,
    /// Warn when the remaining budget after a tick drops below this.
    pub frame_warn_headroom: Duration,
    /// Rooms with no paddle input for this long are closed.
    pub idle_timeout: Duration,
    pub command_buffer: usize,
    pub broadcast_buffer: usize,
    pub game: GameConfig,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            listen_addr: "0.0.0.0:3000".to_string(),
            tick_rate_hz: 150,
            frame_budget: Duration::from_secs_f64(1.0 / 60.0),
            frame_warn_headroom: Duration::from_millis(14),
            idle_timeout: Duration::from_secs(300),
            command_buffer: 256,
            broadcast_buffer: 64,
            game: GameConfig::default(),
        }
    }
}

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("listen address is empty")]
    EmptyListenAddr,
    #[error("tick rate must be positive")]
    ZeroTickRate,
    #[error("winning score must be positive")]
    ZeroWinningScore,
    #[error("paddle (width {paddle}) must fit inside the field (width {field})")]
    PaddleWiderThanField { paddle: f64, field: f64 },
    #[error("field dimensions must be positive")]
    EmptyField,
    #[error("serve speed must be positive and no greater than the speed cap")]
    BadServeSpeed,
    #[error("channel capacities must be positive")]
    ZeroChannelCapacity,
    #[error("idle timeout must be positive")]
    ZeroIdleTimeout,
}

impl ServerConfig {
    /// Default configuration with the listen port taken from `PORT` if set,
    /// matching how the service has always been deployed.
    pub fn from_env() -> Self {
        let mut config = Self::default();
        if let Some(port) = std::env::var("PORT")
            .ok()
            .and_then(|p| p.parse::<u16>().ok())
        {
            config.listen_addr = format!("0.0.0.0:{port}");
        }
        config
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.listen_addr.is_empty() {
            return Err(ConfigError::EmptyListenAddr);
        }
        if self.tick_rate_hz == 0 {
            return Err(ConfigError::ZeroTickRate);
        }
        if self.command_buffer == 0 || self.broadcast_buffer == 0 {
            return Err(ConfigError::ZeroChannelCapacity);
        }
        if self.idle_timeout.is_zero() {
            return Err(ConfigError::ZeroIdleTimeout);
        }
        self.game.validate()
    }
}

impl GameConfig {
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.field_width <= 0.0 || self.field_height <= 0.0 {
            return Err(ConfigError::EmptyField);
        }
        if self.paddle_width <= 0.0 || self.paddle_width >= self.field_width {
            return Err(ConfigError::PaddleWiderThanField {
                paddle: self.paddle_width,
                field: self.field_width,
            });
        }
        if self.serve_speed <= 0.0 || self.serve_speed > self.max_speed {
            return Err(ConfigError::BadServeSpeed);
        }
        if self.winning_score == 0 {
            return Err(ConfigError::ZeroWinningScore);
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config_is_valid() {
        assert!(ServerConfig::default().validate().is_ok());
    }

    #[test]
    fn zero_tick_rate_is_rejected() {
        let config = ServerConfig {
            tick_rate_hz: 0,
            ..Default::default()
        };
        assert!(matches!(config.validate(), Err(ConfigError::ZeroTickRate)));
    }

    #[test]
    fn paddle_must_fit_in_field() {
        let mut config = ServerConfig::default();
        config.game.paddle_width = config.game.field_width;
        assert!(matches!(
            config.validate(),
            Err(ConfigError::PaddleWiderThanField { .. })
        ));
    }

    #[test]
    fn serve_faster_than_cap_is_rejected() {
        let mut config = ServerConfig::default();
        config.game.serve_speed = config.game.max_speed + 1.0;
        assert!(matches!(config.validate(), Err(ConfigError::BadServeSpeed)));
    }

    #[test]
    fn zero_winning_score_is_rejected() {
        let mut config = ServerConfig::default();
        config.game.winning_score = 0;
        assert!(matches!(
            config.validate(),
            Err(ConfigError::ZeroWinningScore)
        ));
    }
}
