use clap::Parser;
use std::net::SocketAddr;
use std::time::Duration;

/// Play-by-play broadcaster with rolling micro-bets
#[derive(Parser, Debug, Clone)]
#[command(name = "playcast", version, about)]
pub struct Config {
    /// Subscriber socket / API listen address
    #[arg(long, env = "LISTEN_ADDR", default_value = "0.0.0.0:8080")]
    pub listen_addr: String,

    /// SQLite database path
    #[arg(long, env = "DATABASE_PATH", default_value = "playcast.db")]
    pub database_path: String,

    /// Milliseconds between broadcast ticks
    #[arg(long, env = "TICK_MS", default_value = "4000")]
    pub tick_ms: u64,

    /// Game id stamped on every broadcast event
    #[arg(long, env = "GAME_ID", default_value = "gt-vs-uga-2025")]
    pub game_id: String,

    /// Sportradar NFL API base URL
    #[arg(
        long,
        env = "SPORTRADAR_API_URL",
        default_value = "https://api.sportradar.com/nfl/official/trial/v7/en"
    )]
    pub sportradar_api_url: String,

    /// Sportradar game whose play-by-play is replayed
    #[arg(
        long,
        env = "SPORTRADAR_GAME_ID",
        default_value = "ca9d8f84-8e7b-4ee7-a310-54c2e3ca4edc"
    )]
    pub sportradar_game_id: String,

    /// Sportradar API key
    #[arg(long, env = "SPORTRADAR_API_KEY")]
    pub sportradar_api_key: Option<String>,

    /// Read plays from a local JSON file instead of Sportradar
    #[arg(long, env = "PLAYS_FILE")]
    pub plays_file: Option<String>,

    /// OpenAI-compatible chat-completions base URL
    #[arg(long, env = "GENAI_API_URL", default_value = "https://api.openai.com/v1")]
    pub genai_api_url: String,

    /// Key for the chat-completions service (fallback questions only when unset)
    #[arg(long, env = "GENAI_API_KEY")]
    pub genai_api_key: Option<String>,

    /// Model used for question generation and outcome judging
    #[arg(long, env = "GENAI_MODEL", default_value = "gpt-4o-mini")]
    pub genai_model: String,

    /// Upper bound on any single generator, judge or store call (ms)
    #[arg(long, env = "CALL_TIMEOUT_MS", default_value = "15000")]
    pub call_timeout_ms: u64,

    /// Attempts at loading the play list before giving up
    #[arg(long, env = "FETCH_ATTEMPTS", default_value = "5")]
    pub fetch_attempts: u32,

    /// Home team name used by the fallback question
    #[arg(long, env = "HOME_TEAM", default_value = "Georgia Tech")]
    pub home_team: String,

    /// Away team name used by the fallback question
    #[arg(long, env = "AWAY_TEAM", default_value = "University of Georgia")]
    pub away_team: String,
}

impl Config {
    pub fn validate(&self) -> anyhow::Result<()> {
        if self.tick_ms == 0 {
            anyhow::bail!("tick_ms must be positive");
        }
        if self.call_timeout_ms == 0 {
            anyhow::bail!("call_timeout_ms must be positive");
        }
        if self.fetch_attempts == 0 {
            anyhow::bail!("fetch_attempts must be at least 1");
        }
        if self.listen_addr.parse::<SocketAddr>().is_err() {
            anyhow::bail!("listen_addr {:?} is not a socket address", self.listen_addr);
        }
        if self.plays_file.is_none() && self.sportradar_key().is_none() {
            anyhow::bail!(
                "SPORTRADAR_API_KEY is required unless --plays-file is given"
            );
        }
        Ok(())
    }

    pub fn tick_period(&self) -> Duration {
        Duration::from_millis(self.tick_ms)
    }

    pub fn call_timeout(&self) -> Duration {
        Duration::from_millis(self.call_timeout_ms)
    }

    /// The Sportradar key, ignoring blank values.
    pub fn sportradar_key(&self) -> Option<&str> {
        self.sportradar_api_key
            .as_deref()
            .map(str::trim)
            .filter(|k| !k.is_empty())
    }
}
