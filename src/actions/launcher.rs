use std::process::Command;

use super::{AppLauncher, BrowserOpener, LaunchError, Platform};

/// What launching a table entry does
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LaunchAction {
    /// Open a web page
    Url(&'static str),
    /// Start a program without waiting for it
    Spawn {
        /// Executable name
        program: &'static str,
        /// Arguments
        args: &'static [&'static str],
    },
}

const fn spawn(program: &'static str, args: &'static [&'static str]) -> LaunchAction {
    LaunchAction::Spawn { program, args }
}

const WINDOWS_APPS: &[(&str, LaunchAction)] = &[
    ("youtube", LaunchAction::Url("https://www.youtube.com")),
    ("whatsapp", spawn("cmd", &["/C", "start", "", "whatsapp:"])),
    ("calculator", spawn("calc.exe", &[])),
    ("gmail", LaunchAction::Url("https://mail.google.com")),
    ("chrome", spawn("chrome.exe", &[])),
    ("notepad", spawn("notepad.exe", &[])),
    ("file explorer", spawn("explorer.exe", &[])),
    ("control panel", spawn("control.exe", &[])),
    ("paint", spawn("mspaint.exe", &[])),
    ("word", spawn("winword.exe", &[])),
    ("excel", spawn("excel.exe", &[])),
    ("powerpoint", spawn("powerpnt.exe", &[])),
    ("spotify", spawn("spotify.exe", &[])),
    ("discord", spawn("discord.exe", &[])),
    ("steam", spawn("steam.exe", &[])),
    ("vlc", spawn("vlc.exe", &[])),
    ("firefox", spawn("cmd", &["/C", "start", "", "firefox"])),
    ("edge", spawn("msedge.exe", &[])),
];

const MACOS_APPS: &[(&str, LaunchAction)] = &[
    ("youtube", LaunchAction::Url("https://www.youtube.com")),
    ("whatsapp", spawn("open", &["-a", "WhatsApp"])),
    ("calculator", spawn("open", &["-a", "Calculator"])),
    ("gmail", LaunchAction::Url("https://mail.google.com")),
    ("safari", spawn("open", &["-a", "Safari"])),
    ("chrome", spawn("open", &["-a", "Google Chrome"])),
    ("finder", spawn("open", &["-a", "Finder"])),
    ("textedit", spawn("open", &["-a", "TextEdit"])),
    ("spotify", spawn("open", &["-a", "Spotify"])),
    ("discord", spawn("open", &["-a", "Discord"])),
    ("vlc", spawn("open", &["-a", "VLC"])),
];

const LINUX_APPS: &[(&str, LaunchAction)] = &[
    ("youtube", LaunchAction::Url("https://www.youtube.com")),
    ("whatsapp", spawn("whatsapp-desktop", &[])),
    ("calculator", spawn("gnome-calculator", &[])),
    ("gmail", LaunchAction::Url("https://mail.google.com")),
    ("firefox", spawn("firefox", &[])),
    ("chrome", spawn("google-chrome", &[])),
    ("file manager", spawn("nautilus", &[])),
    ("terminal", spawn("gnome-terminal", &[])),
    ("text editor", spawn("gedit", &[])),
    ("spotify", spawn("spotify", &[])),
    ("discord", spawn("discord", &[])),
    ("vlc", spawn("vlc", &[])),
];

/// Built-in launch table for `platform`, in match order
#[must_use]
pub const fn default_table(platform: Platform) -> &'static [(&'static str, LaunchAction)] {
    match platform {
        Platform::Windows => WINDOWS_APPS,
        Platform::MacOs => MACOS_APPS,
        Platform::Linux => LINUX_APPS,
    }
}

/// Launches applications from an ordered pattern table
pub struct SystemLauncher {
    table: Vec<(&'static str, LaunchAction)>,
    browser: Box<dyn BrowserOpener>,
}

impl SystemLauncher {
    /// Launcher using the built-in table for `platform`
    #[must_use]
    pub fn new(platform: Platform, browser: Box<dyn BrowserOpener>) -> Self {
        Self::with_table(default_table(platform).to_vec(), browser)
    }

    /// Launcher with an explicit table
    #[must_use]
    pub fn with_table(
        table: Vec<(&'static str, LaunchAction)>,
        browser: Box<dyn BrowserOpener>,
    ) -> Self {
        Self { table, browser }
    }

    /// First entry whose pattern contains `app` or is contained in it
    #[must_use]
    pub fn resolve(&self, app: &str) -> Option<LaunchAction> {
        let app = app.trim();
        if app.is_empty() {
            return None;
        }
        self.table
            .iter()
            .find(|(pattern, _)| pattern.contains(app) || app.contains(pattern))
            .map(|&(_, action)| action)
    }
}

impl AppLauncher for SystemLauncher {
    fn launch(&self, app: &str) -> Result<(), LaunchError> {
        let action = self
            .resolve(app)
            .ok_or_else(|| LaunchError::NotFound(app.to_owned()))?;
        tracing::info!(app, action = ?action, "launching application");

        match action {
            LaunchAction::Url(url) => self.browser.open_url(url),
            LaunchAction::Spawn { program, args } => Command::new(program)
                .args(args)
                .spawn()
                .map(drop)
                .map_err(|source| LaunchError::Spawn {
                    program: program.to_owned(),
                    source,
                }),
        }
    }
}
