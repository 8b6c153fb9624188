//! Events delivered to a user's conversation

use serde::{Deserialize, Serialize};
use std::fmt;

/// Opaque reference to an image (a download URL in production)
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ImageRef(String);

impl ImageRef {
    pub fn new(reference: impl Into<String>) -> Self {
        Self(reference.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Copy that is safe to store: a Telegram `bot<token>` path segment is
    /// replaced with a placeholder.
    pub fn redacted(&self) -> ImageRef {
        let segments: Vec<&str> = self
            .0
            .split('/')
            .map(|segment| match segment.strip_prefix("bot") {
                Some(token) if is_bot_token(token) => "bot<redacted>",
                _ => segment,
            })
            .collect();
        ImageRef(segments.join("/"))
    }
}

/// Bot tokens look like `<numeric id>:<secret>`
fn is_bot_token(candidate: &str) -> bool {
    candidate.split_once(':').is_some_and(|(id, secret)| {
        !id.is_empty() && id.bytes().all(|b| b.is_ascii_digit()) && !secret.is_empty()
    })
}

impl fmt::Display for ImageRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Events that trigger state transitions
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Event {
    /// Slash command such as `/start`
    Command(Command),
    /// Free text that is not a command or a menu button
    Text(String),
    /// Photos attached to a single message, in order
    Photos(Vec<ImageRef>),
    /// One of the main menu buttons
    MenuChoice(MenuOption),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command {
    Start,
    Generate,
    /// Any command the bot does not know
    Other(String),
}

impl Command {
    /// Parse a command name, with or without the leading slash or a
    /// `@botname` suffix.
    pub fn parse(name: &str) -> Self {
        let name = name.trim().trim_start_matches('/');
        let name = name.split('@').next().unwrap_or(name).to_ascii_lowercase();
        match name.as_str() {
            "start" => Command::Start,
            "generate" => Command::Generate,
            _ => Command::Other(name),
        }
    }
}

/// Main menu buttons
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum MenuOption {
    Combine,
    Match,
}

impl MenuOption {
    pub const ALL: [MenuOption; 2] = [MenuOption::Combine, MenuOption::Match];

    /// Button label shown on the reply keyboard
    pub fn label(self) -> &'static str {
        match self {
            MenuOption::Combine => "Combine items into an outfit",
            MenuOption::Match => "Match an outfit to an item",
        }
    }

    pub fn from_label(label: &str) -> Option<Self> {
        let label = label.trim();
        Self::ALL.into_iter().find(|option| option.label() == label)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_command_parse() {
        assert_eq!(Command::parse("/start"), Command::Start);
        assert_eq!(Command::parse("generate"), Command::Generate);
        assert_eq!(Command::parse("/Generate@outfit_bot"), Command::Generate);
        assert_eq!(
            Command::parse("/settings"),
            Command::Other("settings".to_string())
        );
    }

    #[test]
    fn test_menu_labels_round_trip() {
        for option in MenuOption::ALL {
            assert_eq!(MenuOption::from_label(option.label()), Some(option));
        }
        assert_eq!(MenuOption::from_label("something else"), None);
    }

    #[test]
    fn test_redacted_masks_bot_token() {
        let image = ImageRef::new("https://api.telegram.org/file/bot123456:AA-secret_x/photos/file_7.jpg");
        assert_eq!(
            image.redacted().as_str(),
            "https://api.telegram.org/file/bot<redacted>/photos/file_7.jpg"
        );
    }

    #[test]
    fn test_redacted_leaves_other_urls_alone() {
        for url in [
            "https://cdn.example.com/images/out.png",
            "https://example.com/bots/robot.png",
            "https://example.com/botany:notes/leaf.jpg",
        ] {
            assert_eq!(ImageRef::new(url).redacted().as_str(), url);
        }
    }
}
