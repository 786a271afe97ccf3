//! Keyword intent classification and command handling.
//!
//! [`classify`] maps a transcript to an [`Intent`] without side effects. The
//! [`Dispatcher`] then performs the action through the injected launcher and
//! browser, and picks a reply from the response pools.

/// Intent execution
pub mod dispatch;
/// Echo mode handler
pub mod echo;
/// Reply pools
pub mod responses;

use chrono::NaiveDateTime;

pub use dispatch::Dispatcher;
pub use echo::EchoHandler;

/// Social network opened by the social intent
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SocialSite {
    /// facebook.com
    Facebook,
    /// instagram.com
    Instagram,
    /// twitter.com
    Twitter,
}

/// What the user asked for
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Intent {
    /// hello, hi, good morning...
    Greeting,
    /// how are you
    SmallTalk,
    /// thanks
    Gratitude,
    /// open something; `target` is the text after "open"
    Open {
        /// Application or site name, may be empty
        target: String,
    },
    /// current time
    Time,
    /// current date
    Date,
    /// web search; `query` may be empty
    Search {
        /// Search terms with the trigger words removed
        query: String,
    },
    /// weather site
    Weather,
    /// news site
    News,
    /// music, via Spotify when mentioned
    Music {
        /// Transcript mentions spotify
        spotify: bool,
    },
    /// social network
    Social(SocialSite),
    /// capability summary
    Help,
    /// end the session
    Exit,
    /// anything else
    Fallback,
}

const GREETING_WORDS: &[&str] = &[
    "hello",
    "hi",
    "hey",
    "good morning",
    "good afternoon",
    "good evening",
];
const SMALL_TALK_PHRASES: &[&str] = &["how are you", "how do you do", "how are things"];
const GRATITUDE_WORDS: &[&str] = &["thank you", "thanks", "appreciate"];
const TIME_WORDS: &[&str] = &["time", "clock"];
const DATE_WORDS: &[&str] = &["date", "today", "day"];
const SEARCH_WORDS: &[&str] = &["search", "google", "find"];
const MUSIC_WORDS: &[&str] = &["music", "song", "play"];
const HELP_PHRASES: &[&str] = &["help", "what can you do"];
/// Phrases that end the session
pub const EXIT_WORDS: &[&str] = &["goodbye", "bye", "stop assistant", "quit", "exit"];

fn contains_any(text: &str, words: &[&str]) -> bool {
    words.iter().any(|word| text.contains(word))
}

/// Normalizes a transcript for matching
#[must_use]
pub fn normalize(text: &str) -> String {
    text.trim().to_lowercase()
}

/// True if the text contains an exit phrase
#[must_use]
pub fn is_exit(text: &str) -> bool {
    contains_any(&normalize(text), EXIT_WORDS)
}

/// Maps a transcript to its intent; the first matching rule wins
#[must_use]
pub fn classify(text: &str) -> Intent {
    let text = normalize(text);

    if contains_any(&text, GREETING_WORDS) {
        Intent::Greeting
    } else if contains_any(&text, SMALL_TALK_PHRASES) {
        Intent::SmallTalk
    } else if contains_any(&text, GRATITUDE_WORDS) {
        Intent::Gratitude
    } else if let Some((_, rest)) = text.split_once("open") {
        Intent::Open {
            target: rest.trim().to_owned(),
        }
    } else if contains_any(&text, TIME_WORDS) {
        Intent::Time
    } else if contains_any(&text, DATE_WORDS) {
        Intent::Date
    } else if contains_any(&text, SEARCH_WORDS) {
        let query = SEARCH_WORDS
            .iter()
            .fold(text.clone(), |acc, word| acc.replace(word, ""));
        Intent::Search {
            query: query.trim().to_owned(),
        }
    } else if text.contains("weather") {
        Intent::Weather
    } else if text.contains("news") {
        Intent::News
    } else if contains_any(&text, MUSIC_WORDS) {
        Intent::Music {
            spotify: text.contains("spotify"),
        }
    } else if text.contains("facebook") {
        Intent::Social(SocialSite::Facebook)
    } else if text.contains("instagram") {
        Intent::Social(SocialSite::Instagram)
    } else if text.contains("twitter") {
        Intent::Social(SocialSite::Twitter)
    } else if contains_any(&text, HELP_PHRASES) {
        Intent::Help
    } else if contains_any(&text, EXIT_WORDS) {
        Intent::Exit
    } else {
        Intent::Fallback
    }
}

/// Outcome of handling one transcript
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommandResult {
    /// Keep listening after this command
    pub continue_session: bool,
    /// Text to speak
    pub response: String,
}

impl CommandResult {
    /// Reply and keep the session going
    #[must_use]
    pub fn reply(response: impl Into<String>) -> Self {
        Self {
            continue_session: true,
            response: response.into(),
        }
    }

    /// Reply and end the session
    #[must_use]
    pub fn finish(response: impl Into<String>) -> Self {
        Self {
            continue_session: false,
            response: response.into(),
        }
    }
}

/// Turns a recognized transcript into a reply
pub trait CommandHandler {
    /// Handles one transcript
    fn handle(&mut self, text: &str) -> CommandResult;
}

/// Source of the current local time
pub trait Clock {
    /// Local wall-clock time
    fn now(&self) -> NaiveDateTime;
}

/// Reads the system clock in the local timezone
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> NaiveDateTime {
        chrono::Local::now().naive_local()
    }
}

/// Always returns the same instant
#[derive(Debug, Clone, Copy)]
pub struct FixedClock(pub NaiveDateTime);

impl Clock for FixedClock {
    fn now(&self) -> NaiveDateTime {
        self.0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_greeting_and_small_talk() {
        assert_eq!(classify("Hello"), Intent::Greeting);
        assert_eq!(classify("  GOOD MORNING  "), Intent::Greeting);
        assert_eq!(classify("how are you"), Intent::SmallTalk);
        assert_eq!(classify("thank you so much"), Intent::Gratitude);
    }

    #[test]
    fn test_open_extracts_target() {
        assert_eq!(
            classify("Open Calculator"),
            Intent::Open {
                target: "calculator".to_owned()
            }
        );
        assert_eq!(
            classify("please open   file manager "),
            Intent::Open {
                target: "file manager".to_owned()
            }
        );
        assert_eq!(
            classify("open"),
            Intent::Open {
                target: String::new()
            }
        );
    }

    #[test]
    fn test_time_and_date() {
        assert_eq!(classify("what time is it"), Intent::Time);
        assert_eq!(classify("what's the date"), Intent::Date);
        assert_eq!(classify("what day is it"), Intent::Date);
    }

    #[test]
    fn test_search_strips_trigger_words() {
        assert_eq!(
            classify("search rust tutorials"),
            Intent::Search {
                query: "rust tutorials".to_owned()
            }
        );
        assert_eq!(
            classify("google cats"),
            Intent::Search {
                query: "cats".to_owned()
            }
        );
        assert_eq!(
            classify("search"),
            Intent::Search {
                query: String::new()
            }
        );
    }

    #[test]
    fn test_sites_and_music() {
        assert_eq!(classify("weather"), Intent::Weather);
        assert_eq!(classify("latest news"), Intent::News);
        assert_eq!(classify("play music on spotify"), Intent::Music { spotify: true });
        assert_eq!(classify("play a song"), Intent::Music { spotify: false });
        assert_eq!(classify("facebook"), Intent::Social(SocialSite::Facebook));
        assert_eq!(classify("instagram"), Intent::Social(SocialSite::Instagram));
        assert_eq!(classify("twitter"), Intent::Social(SocialSite::Twitter));
    }

    #[test]
    fn test_help_exit_and_fallback() {
        assert_eq!(classify("help"), Intent::Help);
        assert_eq!(classify("what can you do"), Intent::Help);
        assert_eq!(classify("goodbye"), Intent::Exit);
        assert_eq!(classify("quit"), Intent::Exit);
        assert_eq!(classify("stop assistant"), Intent::Exit);
        assert_eq!(classify("the sky is blue"), Intent::Fallback);
    }

    #[test]
    fn test_first_match_wins() {
        // greeting beats exit
        assert_eq!(classify("hi, goodbye"), Intent::Greeting);
        // open beats time
        assert_eq!(
            classify("open clock"),
            Intent::Open {
                target: "clock".to_owned()
            }
        );
        // time beats date ("today" also present)
        assert_eq!(classify("time today"), Intent::Time);
        // search beats weather
        assert_eq!(
            classify("search weather"),
            Intent::Search {
                query: "weather".to_owned()
            }
        );
        // substring containment: "this" contains "hi"
        assert_eq!(classify("is this working"), Intent::Greeting);
    }

    #[test]
    fn test_is_exit() {
        assert!(is_exit("Bye now"));
        assert!(is_exit("please EXIT"));
        assert!(!is_exit("open calculator"));
    }
}
