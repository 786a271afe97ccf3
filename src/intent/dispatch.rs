use rand::Rng;
use tracing::{info, warn};

use super::responses::{
    ResponsePool, ACKNOWLEDGMENTS, CONVERSATIONAL, FAREWELLS, GREETINGS, HELP_TEXT, STATUS,
};
use super::{classify, Clock, CommandHandler, CommandResult, Intent, SocialSite};
use crate::actions::{AppLauncher, BrowserOpener};

const YOUTUBE_URL: &str = "https://www.youtube.com";
const GMAIL_URL: &str = "https://mail.google.com";
const WHATSAPP_WEB_URL: &str = "https://web.whatsapp.com";
const WEATHER_URL: &str = "https://www.weather.com";
const NEWS_URL: &str = "https://news.google.com";
const YOUTUBE_MUSIC_URL: &str = "https://music.youtube.com";

/// Google search URL for `query`
#[must_use]
pub fn search_url(query: &str) -> String {
    format!(
        "https://www.google.com/search?q={}",
        urlencoding::encode(query)
    )
}

/// Executes intents against the launcher and browser
pub struct Dispatcher<R> {
    launcher: Box<dyn AppLauncher>,
    browser: Box<dyn BrowserOpener>,
    clock: Box<dyn Clock>,
    rng: R,
}

impl<R: Rng> Dispatcher<R> {
    /// Creates a dispatcher; `rng` drives reply selection
    #[must_use]
    pub fn new(
        launcher: Box<dyn AppLauncher>,
        browser: Box<dyn BrowserOpener>,
        clock: Box<dyn Clock>,
        rng: R,
    ) -> Self {
        Self {
            launcher,
            browser,
            clock,
            rng,
        }
    }

    /// Performs `intent` and returns the reply
    pub fn dispatch(&mut self, intent: &Intent) -> CommandResult {
        match intent {
            Intent::Greeting => self.pick(GREETINGS),
            Intent::SmallTalk => self.pick(STATUS),
            Intent::Gratitude => self.pick(ACKNOWLEDGMENTS),
            Intent::Open { target } => CommandResult::reply(self.open(target)),
            Intent::Time => CommandResult::reply(format!(
                "The current time is {}",
                self.clock.now().format("%I:%M %p")
            )),
            Intent::Date => CommandResult::reply(format!(
                "Today is {}",
                self.clock.now().format("%A, %B %d, %Y")
            )),
            Intent::Search { query } => {
                if query.is_empty() {
                    CommandResult::reply("What would you like me to search for?")
                } else {
                    self.open_url(&search_url(query));
                    CommandResult::reply(format!("Searching for {query} on Google."))
                }
            }
            Intent::Weather => {
                self.open_url(WEATHER_URL);
                CommandResult::reply("Opening weather information for you.")
            }
            Intent::News => {
                self.open_url(NEWS_URL);
                CommandResult::reply("Opening Google News for you.")
            }
            Intent::Music { spotify: true } => {
                if let Err(e) = self.launcher.launch("spotify") {
                    warn!(error = %e, "failed to launch spotify");
                }
                CommandResult::reply("Opening Spotify.")
            }
            Intent::Music { spotify: false } => {
                self.open_url(YOUTUBE_MUSIC_URL);
                CommandResult::reply("Opening YouTube Music for you.")
            }
            Intent::Social(site) => {
                let (url, reply) = match site {
                    SocialSite::Facebook => ("https://www.facebook.com", "Opening Facebook."),
                    SocialSite::Instagram => ("https://www.instagram.com", "Opening Instagram."),
                    SocialSite::Twitter => ("https://www.twitter.com", "Opening Twitter."),
                };
                self.open_url(url);
                CommandResult::reply(reply)
            }
            Intent::Help => CommandResult::reply(HELP_TEXT),
            Intent::Exit => CommandResult::finish(FAREWELLS.pick(&mut self.rng)),
            Intent::Fallback => self.pick(CONVERSATIONAL),
        }
    }

    fn pick(&mut self, pool: ResponsePool) -> CommandResult {
        CommandResult::reply(pool.pick(&mut self.rng))
    }

    fn open_url(&self, url: &str) {
        if let Err(e) = self.browser.open_url(url) {
            warn!(url, error = %e, "failed to open browser");
        }
    }

    fn launch(&self, app: &str) -> bool {
        match self.launcher.launch(app) {
            Ok(()) => true,
            Err(e) => {
                info!(app, error = %e, "launch failed");
                false
            }
        }
    }

    fn open(&self, target: &str) -> String {
        if target.is_empty() {
            return "What would you like me to open?".to_owned();
        }

        if target.contains("youtube") {
            self.open_url(YOUTUBE_URL);
            "Opening YouTube for you.".to_owned()
        } else if target.contains("gmail") || target.contains("email") {
            self.open_url(GMAIL_URL);
            "Opening Gmail for you.".to_owned()
        } else if target.contains("whatsapp") {
            if self.launch("whatsapp") {
                "Opening WhatsApp.".to_owned()
            } else {
                self.open_url(WHATSAPP_WEB_URL);
                "Opening WhatsApp Web.".to_owned()
            }
        } else if target.contains("calculator") {
            if self.launch("calculator") {
                "Opening calculator.".to_owned()
            } else {
                "Sorry, I couldn't open the calculator.".to_owned()
            }
        } else if self.launch(target) {
            format!("Opening {target}.")
        } else {
            self.open_url(&search_url(target));
            format!(
                "Sorry, I couldn't find or open {target}. Let me try opening it in the browser."
            )
        }
    }
}

impl<R: Rng> CommandHandler for Dispatcher<R> {
    fn handle(&mut self, text: &str) -> CommandResult {
        let intent = classify(text);
        info!(text, intent = ?intent, "dispatching intent");
        self.dispatch(&intent)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::actions::{LaunchError, MockAppLauncher, MockBrowserOpener};
    use crate::intent::FixedClock;
    use chrono::NaiveDate;
    use rand::rngs::StdRng;
    use rand::SeedableRng;

    fn clock() -> FixedClock {
        let at = NaiveDate::from_ymd_opt(2024, 3, 5)
            .and_then(|d| d.and_hms_opt(14, 7, 30))
            .unwrap();
        FixedClock(at)
    }

    fn dispatcher(launcher: MockAppLauncher, browser: MockBrowserOpener) -> Dispatcher<StdRng> {
        Dispatcher::new(
            Box::new(launcher),
            Box::new(browser),
            Box::new(clock()),
            StdRng::seed_from_u64(3),
        )
    }

    fn quiet() -> Dispatcher<StdRng> {
        let mut launcher = MockAppLauncher::new();
        launcher.expect_launch().never();
        let mut browser = MockBrowserOpener::new();
        browser.expect_open_url().never();
        dispatcher(launcher, browser)
    }

    fn browser_expecting(url: &'static str) -> MockBrowserOpener {
        let mut browser = MockBrowserOpener::new();
        browser
            .expect_open_url()
            .withf(move |u| u == url)
            .times(1)
            .returning(|_| Ok(()));
        browser
    }

    fn not_found(app: &str) -> Result<(), LaunchError> {
        Err(LaunchError::NotFound(app.to_owned()))
    }

    #[test]
    fn test_hello_gets_greeting() {
        let result = quiet().handle("hello");
        assert!(result.continue_session);
        assert!(GREETINGS.contains(&result.response));
    }

    #[test]
    fn test_time_and_date_formatting() {
        let mut dispatcher = quiet();
        let result = dispatcher.handle("what time is it");
        assert!(result.continue_session);
        assert_eq!(result.response, "The current time is 02:07 PM");
        // same minute, same answer
        assert_eq!(dispatcher.handle("what time is it"), result);

        let result = dispatcher.handle("what's the date");
        assert_eq!(result.response, "Today is Tuesday, March 05, 2024");
    }

    #[test]
    fn test_open_calculator_success() {
        let mut launcher = MockAppLauncher::new();
        launcher
            .expect_launch()
            .withf(|app| app == "calculator")
            .times(1)
            .returning(|_| Ok(()));
        let mut browser = MockBrowserOpener::new();
        browser.expect_open_url().never();

        let result = dispatcher(launcher, browser).handle("open calculator");
        assert_eq!(result, CommandResult::reply("Opening calculator."));
    }

    #[test]
    fn test_open_calculator_failure() {
        let mut launcher = MockAppLauncher::new();
        launcher
            .expect_launch()
            .times(1)
            .returning(|app| not_found(app));
        let mut browser = MockBrowserOpener::new();
        browser.expect_open_url().never();

        let result = dispatcher(launcher, browser).handle("open calculator");
        assert_eq!(
            result,
            CommandResult::reply("Sorry, I couldn't open the calculator.")
        );
    }

    #[test]
    fn test_open_youtube_and_gmail_use_browser() {
        let mut launcher = MockAppLauncher::new();
        launcher.expect_launch().never();
        let result =
            dispatcher(launcher, browser_expecting(YOUTUBE_URL)).handle("open youtube");
        assert_eq!(result.response, "Opening YouTube for you.");

        let mut launcher = MockAppLauncher::new();
        launcher.expect_launch().never();
        let result = dispatcher(launcher, browser_expecting(GMAIL_URL)).handle("open my email");
        assert_eq!(result.response, "Opening Gmail for you.");
    }

    #[test]
    fn test_whatsapp_falls_back_to_web() {
        let mut launcher = MockAppLauncher::new();
        launcher
            .expect_launch()
            .withf(|app| app == "whatsapp")
            .times(1)
            .returning(|app| not_found(app));
        let result =
            dispatcher(launcher, browser_expecting(WHATSAPP_WEB_URL)).handle("open whatsapp");
        assert_eq!(result.response, "Opening WhatsApp Web.");
    }

    #[test]
    fn test_unknown_app_searches_in_browser() {
        let mut launcher = MockAppLauncher::new();
        launcher
            .expect_launch()
            .withf(|app| app == "blender")
            .times(1)
            .returning(|app| not_found(app));
        let browser = browser_expecting("https://www.google.com/search?q=blender");

        let result = dispatcher(launcher, browser).handle("open blender");
        assert_eq!(
            result.response,
            "Sorry, I couldn't find or open blender. Let me try opening it in the browser."
        );
    }

    #[test]
    fn test_known_app_launches() {
        let mut launcher = MockAppLauncher::new();
        launcher
            .expect_launch()
            .withf(|app| app == "vlc")
            .times(1)
            .returning(|_| Ok(()));
        let mut browser = MockBrowserOpener::new();
        browser.expect_open_url().never();

        let result = dispatcher(launcher, browser).handle("Open VLC");
        assert_eq!(result.response, "Opening vlc.");
    }

    #[test]
    fn test_open_without_target_asks() {
        let result = quiet().handle("open");
        assert_eq!(result, CommandResult::reply("What would you like me to open?"));
    }

    #[test]
    fn test_search_alone_asks_without_browser() {
        let result = quiet().handle("search");
        assert_eq!(
            result,
            CommandResult::reply("What would you like me to search for?")
        );
    }

    #[test]
    fn test_search_query_is_encoded() {
        let mut launcher = MockAppLauncher::new();
        launcher.expect_launch().never();
        let browser = browser_expecting("https://www.google.com/search?q=rust%20%26%20tokio");

        let result = dispatcher(launcher, browser).handle("search rust & tokio");
        assert_eq!(result.response, "Searching for rust & tokio on Google.");
    }

    #[test]
    fn test_music_routes() {
        let mut launcher = MockAppLauncher::new();
        launcher
            .expect_launch()
            .withf(|app| app == "spotify")
            .times(1)
            .returning(|app| not_found(app));
        let mut browser = MockBrowserOpener::new();
        browser.expect_open_url().never();
        let result = dispatcher(launcher, browser).handle("play music on spotify");
        assert_eq!(result.response, "Opening Spotify.");

        let mut launcher = MockAppLauncher::new();
        launcher.expect_launch().never();
        let result =
            dispatcher(launcher, browser_expecting(YOUTUBE_MUSIC_URL)).handle("play a song");
        assert_eq!(result.response, "Opening YouTube Music for you.");
    }

    #[test]
    fn test_browser_failure_still_replies() {
        let mut launcher = MockAppLauncher::new();
        launcher.expect_launch().never();
        let mut browser = MockBrowserOpener::new();
        browser.expect_open_url().times(1).returning(|_| {
            Err(LaunchError::Spawn {
                program: "xdg-open".to_owned(),
                source: std::io::Error::from(std::io::ErrorKind::NotFound),
            })
        });
        let result = dispatcher(launcher, browser).handle("news");
        assert_eq!(result, CommandResult::reply("Opening Google News for you."));
    }

    #[test]
    fn test_only_exit_ends_session() {
        let mut dispatcher = quiet();
        let result = dispatcher.handle("goodbye");
        assert!(!result.continue_session);
        assert!(FAREWELLS.contains(&result.response));

        for text in ["hello", "how are you", "thanks", "help", "something else", "what day is it"] {
            assert!(dispatcher.handle(text).continue_session, "{text}");
        }
    }

    #[test]
    fn test_fallback_and_help() {
        let mut dispatcher = quiet();
        assert!(CONVERSATIONAL.contains(&dispatcher.handle("the sky is blue").response));
        assert_eq!(dispatcher.handle("help").response, HELP_TEXT);
    }
}
