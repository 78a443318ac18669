use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Identifier of one of the fixed ballot options, as stored in `votes.option_id`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct OptionId(pub i64);

impl fmt::Display for OptionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BallotOption {
    pub id: OptionId,
    pub title: &'static str,
    pub description: &'static str,
    pub image_url: &'static str,
    pub repo_url: &'static str,
}

pub const OPTION_COUNT: usize = 3;

pub static OPTIONS: [BallotOption; OPTION_COUNT] = [
    BallotOption {
        id: OptionId(1),
        title: "Calendar Conflicts Reporter",
        description: "Automatically detects conflicts between on-call schedules and calendar events. \
            Identifies when on-call personnel have scheduled time off and suggests replacements. \
            Supports incident.io integration with Slack and email notifications.",
        image_url: "https://github.com/nikita-vanyasin/calendar-conflicts-reporter/raw/master/assets/email-ses-demo.png",
        repo_url: "https://github.com/nikita-vanyasin/calendar-conflicts-reporter",
    },
    BallotOption {
        id: OptionId(2),
        title: "Alexa Incident Commander",
        description: "Voice-powered incident management assistant using Alexa and incident.io. \
            Get real-time incident status updates through natural voice commands. \
            Perfect for hands-free operation during war rooms and on-call situations.",
        image_url: "https://www.bhphotovideo.com/images/images500x500/amazon_b07xkf5rm3_echo_4th_gen_with_1605694869_1599234.jpg",
        repo_url: "https://github.com/diverheart/alexa-incident-commander",
    },
    BallotOption {
        id: OptionId(3),
        title: "Incident Scorecard Check",
        description: "Analyzes incidents and their impact on service scorecard scores. \
            Integrates Incident.io with Cortex.io to correlate incidents with service performance metrics. \
            Generates comprehensive reports on operational readiness and security impacts.",
        image_url: "https://a-us.storyblok.com/f/1021527/2264x1310/7f32bb11d5/cortex-initiatives-when-scorecards-need-a-deadline_2.webp",
        repo_url: "https://github.com/realpdm/incident-scorecard-check",
    },
];

impl BallotOption {
    pub fn find(id: OptionId) -> Option<&'static BallotOption> {
        OPTIONS.iter().find(|option| option.id == id)
    }

    /// Position of the option in the catalog, used to index tallies.
    pub fn index_of(id: OptionId) -> Option<usize> {
        OPTIONS.iter().position(|option| option.id == id)
    }
}

/// Server-assigned row id. The hosted table may use integer or uuid keys.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum RecordId {
    Int(i64),
    Text(String),
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VoteRecord {
    pub id: RecordId,
    pub option_id: i64,
    #[serde(default)]
    pub voter_ip: Option<String>,
    /// Holds the voter fingerprint, not a literal user agent.
    #[serde(default)]
    pub user_agent: Option<String>,
    pub created_at: Option<DateTime<Utc>>,
}

/// Insert payload for the `votes` table.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct NewVote {
    pub option_id: OptionId,
    pub voter_ip: Option<String>,
    pub user_agent: String,
}

impl NewVote {
    pub fn new(option_id: OptionId, fingerprint: &str) -> Self {
        Self {
            option_id,
            voter_ip: None,
            user_agent: fingerprint.to_string(),
        }
    }
}

/// Notification that a row was inserted into `votes`. Only the arrival matters
/// for aggregation; the record is carried along when the feed provides it.
#[derive(Debug, Clone)]
pub struct VoteInserted {
    pub record: Option<VoteRecord>,
}
