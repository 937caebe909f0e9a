use crate::poll_engine::PollLimits;
use clap::Parser;
use shared::{DEFAULT_TIMER_SECS, MAX_TEXT_LEN};

/// Live poll session server
#[derive(Parser, Debug, Clone, PartialEq)]
#[command(author, version, about, long_about = None)]
pub struct ServerConfig {
    /// Address to bind to
    #[arg(short = 'H', long, env = "HOST", default_value = "0.0.0.0")]
    pub host: String,

    /// Port to listen on
    #[arg(short, long, env = "PORT", default_value = "3000")]
    pub port: u16,

    /// Maximum number of simultaneous WebSocket connections
    #[arg(short, long, env = "MAX_CONNECTIONS", default_value = "1024")]
    pub max_connections: usize,

    /// Longest question or option text kept, in characters
    #[arg(long, default_value_t = MAX_TEXT_LEN)]
    pub max_text_len: usize,

    /// Timer, in seconds, for polls created without one
    #[arg(long, default_value_t = DEFAULT_TIMER_SECS)]
    pub default_timer: u32,
}

impl ServerConfig {
    pub fn bind_address(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }

    pub fn poll_limits(&self) -> PollLimits {
        PollLimits {
            max_text_len: self.max_text_len,
            default_timer: self.default_timer,
        }
    }
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".to_string(),
            port: 3000,
            max_connections: 1024,
            max_text_len: MAX_TEXT_LEN,
            default_timer: DEFAULT_TIMER_SECS,
        }
    }
}
