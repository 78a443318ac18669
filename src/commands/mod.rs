use crate::models::{BallotOption, OptionId, OPTIONS};

/// One line of terminal input.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Input {
    Vote(OptionId),
    Refresh,
    Results,
    Options,
    Help,
    Quit,
    Empty,
    Unknown(String),
}

pub fn parse(line: &str) -> Input {
    let line = line.trim();
    let mut words = line.split_whitespace();
    let Some(first) = words.next() else {
        return Input::Empty;
    };

    match first.to_ascii_lowercase().as_str() {
        "vote" | "v" => match words.next().and_then(|word| word.parse::<i64>().ok()) {
            Some(id) => Input::Vote(OptionId(id)),
            None => Input::Unknown(line.to_string()),
        },
        "refresh" | "r" => Input::Refresh,
        "results" | "tally" => Input::Results,
        "options" | "list" => Input::Options,
        "help" | "?" => Input::Help,
        "quit" | "exit" | "q" => Input::Quit,
        other => match other.parse::<i64>() {
            Ok(id) => Input::Vote(OptionId(id)),
            Err(_) => Input::Unknown(line.to_string()),
        },
    }
}

pub fn help_text() -> String {
    let ids: Vec<String> = OPTIONS.iter().map(|option| option.id.to_string()).collect();
    format!(
        "Commands: <{}> or `vote <n>` to vote, `results`, `refresh`, `options`, `quit`",
        ids.join("|")
    )
}

pub fn option_card(option: &BallotOption) -> String {
    format!(
        "[{}] {}\n    {}\n    Image: {}\n    View on GitHub: {}",
        option.id, option.title, option.description, option.image_url, option.repo_url
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn votes_by_number_or_keyword() {
        assert_eq!(parse("2"), Input::Vote(OptionId(2)));
        assert_eq!(parse("  vote 3 "), Input::Vote(OptionId(3)));
        assert_eq!(parse("V 1"), Input::Vote(OptionId(1)));
        // Range checking is left to the session.
        assert_eq!(parse("9"), Input::Vote(OptionId(9)));
        assert_eq!(parse("vote"), Input::Unknown("vote".to_string()));
        assert_eq!(parse("vote two"), Input::Unknown("vote two".to_string()));
    }

    #[test]
    fn other_commands() {
        assert_eq!(parse(""), Input::Empty);
        assert_eq!(parse("   "), Input::Empty);
        assert_eq!(parse("Results"), Input::Results);
        assert_eq!(parse("refresh"), Input::Refresh);
        assert_eq!(parse("list"), Input::Options);
        assert_eq!(parse("?"), Input::Help);
        assert_eq!(parse("quit"), Input::Quit);
        assert_eq!(parse("dance"), Input::Unknown("dance".to_string()));
    }

    #[test]
    fn cards_and_help_mention_every_option() {
        let help = help_text();
        assert!(help.contains("<1|2|3>"));
        let card = option_card(&OPTIONS[2]);
        assert!(card.starts_with("[3] Incident Scorecard Check"));
        assert!(card.contains("https://github.com/realpdm/incident-scorecard-check"));
    }
}
