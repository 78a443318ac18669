//! Best-effort per-device identifier used as a soft duplicate-vote key.
//!
//! Nothing here is a security boundary: a different machine profile, a changed
//! display or a cleared local store all produce a fresh identity.

use chrono::Local;
use std::fs;

/// Environment signals folded into the fingerprint.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Environment {
    pub user_agent: String,
    pub language: String,
    pub screen_width: u32,
    pub screen_height: u32,
    /// Minutes to add to local time to get UTC (positive west of Greenwich).
    pub timezone_offset_minutes: i32,
    /// Device-specific rendering/host signature contributing extra entropy.
    pub render_signature: String,
}

impl Environment {
    pub fn detect(screen: (u32, u32)) -> Self {
        let user_agent = format!(
            "{}/{} ({}; {})",
            env!("CARGO_PKG_NAME"),
            env!("CARGO_PKG_VERSION"),
            std::env::consts::OS,
            std::env::consts::ARCH
        );
        let language = std::env::var("LANG")
            .ok()
            .and_then(|lang| lang.split('.').next().map(|l| l.replace('_', "-")))
            .filter(|lang| !lang.is_empty())
            .unwrap_or_else(|| "en-US".to_string());
        let timezone_offset_minutes = -Local::now().offset().local_minus_utc() / 60;

        Self {
            user_agent,
            language,
            screen_width: screen.0,
            screen_height: screen.1,
            timezone_offset_minutes,
            render_signature: render_signature(),
        }
    }

    fn signal_string(&self) -> String {
        [
            self.user_agent.clone(),
            self.language.clone(),
            format!("{}x{}", self.screen_width, self.screen_height),
            self.timezone_offset_minutes.to_string(),
            self.render_signature.clone(),
        ]
        .join("|")
    }
}

fn render_signature() -> String {
    ["/etc/machine-id", "/var/lib/dbus/machine-id"]
        .iter()
        .find_map(|path| fs::read_to_string(path).ok())
        .map(|id| id.trim().to_string())
        .or_else(|| std::env::var("HOSTNAME").ok())
        .unwrap_or_default()
}

/// Rolling `h * 31 + c` over UTF-16 code units, truncated to 32 bits each step.
pub fn fold_hash(input: &str) -> i32 {
    input
        .encode_utf16()
        .fold(0i32, |hash, unit| {
            hash.wrapping_shl(5).wrapping_sub(hash).wrapping_add(i32::from(unit))
        })
}

pub fn generate(env: &Environment) -> String {
    // i32::MIN has no i32 absolute value.
    i64::from(fold_hash(&env.signal_string())).abs().to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample() -> Environment {
        Environment {
            user_agent: "Mozilla/5.0 (X11; Linux x86_64)".to_string(),
            language: "en-US".to_string(),
            screen_width: 2560,
            screen_height: 1440,
            timezone_offset_minutes: -120,
            render_signature: "data:image/png;base64,iVBORw0KGgo".to_string(),
        }
    }

    #[test]
    fn fold_hash_small_inputs() {
        assert_eq!(fold_hash(""), 0);
        assert_eq!(fold_hash("a"), 97);
        assert_eq!(fold_hash("ab"), 97 * 31 + 98);
    }

    #[test]
    fn fold_hash_wraps_to_32_bits() {
        let long = "fingerprint|".repeat(64);
        let expected = long
            .encode_utf16()
            .fold(0i64, |h, c| ((h * 31 + i64::from(c)) as i32) as i64);
        assert_eq!(i64::from(fold_hash(&long)), expected);
    }

    #[test]
    fn generate_is_deterministic_and_unsigned() {
        let env = sample();
        let first = generate(&env);
        assert_eq!(first, generate(&env));
        assert_eq!(first, generate(&env.clone()));
        assert!(first.parse::<u64>().unwrap() <= 1u64 << 31);
    }

    #[test]
    fn signals_change_the_fingerprint() {
        let base = generate(&sample());
        let mut moved = sample();
        moved.timezone_offset_minutes = 300;
        assert_ne!(base, generate(&moved));

        let mut resized = sample();
        resized.screen_width = 1920;
        assert_ne!(base, generate(&resized));
    }

    #[test]
    fn signals_are_pipe_joined() {
        assert_eq!(
            sample().signal_string(),
            "Mozilla/5.0 (X11; Linux x86_64)|en-US|2560x1440|-120|data:image/png;base64,iVBORw0KGgo"
        );
    }
}
