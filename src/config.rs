use crate::error::{Result, VoteError};
use log::{info, warn};
use std::env;
use std::time::Duration;
use url::Url;

const DEFAULT_LOCAL_DB: &str = "sqlite:buildon_vote.db";
const DEFAULT_SCREEN: (u32, u32) = (1920, 1080);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ViewKind {
    Ballot,
    Results,
}

impl ViewKind {
    pub fn default_debounce(self) -> Duration {
        match self {
            ViewKind::Ballot => Duration::from_millis(500),
            ViewKind::Results => Duration::from_millis(1000),
        }
    }

    fn parse(value: &str) -> Option<Self> {
        match value.trim().to_ascii_lowercase().as_str() {
            "ballot" | "vote" => Some(ViewKind::Ballot),
            "results" | "dashboard" => Some(ViewKind::Results),
            _ => None,
        }
    }
}

#[derive(Debug, Clone)]
pub struct Config {
    pub supabase_url: Url,
    pub anon_key: String,
    pub view: ViewKind,
    pub debounce: Duration,
    pub local_db_url: String,
    pub screen: (u32, u32),
}

impl Config {
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|key| env::var(key).ok())
    }

    pub fn from_lookup<F>(lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let required = |key: &str| {
            lookup(key)
                .map(|value| value.trim().to_string())
                .filter(|value| !value.is_empty())
                .ok_or_else(|| VoteError::Config(format!("{key} must be set")))
        };

        let raw_url = required("SUPABASE_URL")?;
        let supabase_url = Url::parse(&raw_url)
            .map_err(|e| VoteError::Config(format!("SUPABASE_URL is not a valid URL: {e}")))?;
        if !matches!(supabase_url.scheme(), "http" | "https") {
            return Err(VoteError::Config(format!(
                "unsupported SUPABASE_URL scheme '{}'",
                supabase_url.scheme()
            )));
        }
        let anon_key = required("SUPABASE_ANON_KEY")?;

        let view = match lookup("BUILDON_VIEW") {
            Some(value) => ViewKind::parse(&value).unwrap_or_else(|| {
                warn!("Unknown BUILDON_VIEW '{value}', using ballot view");
                ViewKind::Ballot
            }),
            None => ViewKind::Ballot,
        };

        let debounce = lookup("BUILDON_DEBOUNCE_MS")
            .and_then(|value| {
                value
                    .trim()
                    .parse::<u64>()
                    .map_err(|e| warn!("Invalid BUILDON_DEBOUNCE_MS value: {e}"))
                    .ok()
            })
            .map(Duration::from_millis)
            .unwrap_or_else(|| view.default_debounce());

        let local_db_url = lookup("BUILDON_LOCAL_DB").unwrap_or_else(|| {
            info!("BUILDON_LOCAL_DB not set, using default: {DEFAULT_LOCAL_DB}");
            DEFAULT_LOCAL_DB.to_string()
        });

        let screen = lookup("BUILDON_SCREEN")
            .and_then(|value| {
                let parsed = parse_screen(&value);
                if parsed.is_none() {
                    warn!("Invalid BUILDON_SCREEN value '{value}', expected WIDTHxHEIGHT");
                }
                parsed
            })
            .unwrap_or(DEFAULT_SCREEN);

        Ok(Self {
            supabase_url,
            anon_key,
            view,
            debounce,
            local_db_url,
            screen,
        })
    }

    /// PostgREST endpoint of the `votes` table.
    pub fn votes_url(&self) -> Result<Url> {
        let mut url = self.supabase_url.clone();
        {
            let mut segments = url
                .path_segments_mut()
                .map_err(|_| VoteError::Config("SUPABASE_URL cannot be a base URL".to_string()))?;
            segments.pop_if_empty();
            segments.extend(&["rest", "v1", "votes"]);
        }
        url.set_query(None);
        Ok(url)
    }

    pub fn realtime_url(&self) -> Result<Url> {
        let mut url = self.supabase_url.clone();
        let scheme = match url.scheme() {
            "https" => "wss",
            _ => "ws",
        };
        url.set_scheme(scheme)
            .map_err(|_| VoteError::Config(format!("cannot derive {scheme} URL from SUPABASE_URL")))?;
        {
            let mut segments = url
                .path_segments_mut()
                .map_err(|_| VoteError::Config("SUPABASE_URL cannot be a base URL".to_string()))?;
            segments.pop_if_empty();
            segments.extend(&["realtime", "v1", "websocket"]);
        }
        url.set_query(None);
        url.query_pairs_mut()
            .append_pair("apikey", &self.anon_key)
            .append_pair("vsn", "1.0.0");
        Ok(url)
    }
}

fn parse_screen(value: &str) -> Option<(u32, u32)> {
    let (width, height) = value.trim().split_once(['x', 'X'])?;
    Some((width.trim().parse().ok()?, height.trim().parse().ok()?))
}
