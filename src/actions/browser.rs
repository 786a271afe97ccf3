use std::process::Command;

use super::{BrowserOpener, LaunchError, Platform};

/// Opens URLs with the platform's default handler
#[derive(Debug, Clone, Copy)]
pub struct SystemBrowser {
    platform: Platform,
}

impl SystemBrowser {
    /// Creates an opener for `platform`
    #[must_use]
    pub const fn new(platform: Platform) -> Self {
        Self { platform }
    }

    fn command(&self, url: &str) -> (&'static str, Vec<String>) {
        match self.platform {
            Platform::MacOs => ("open", vec![url.to_owned()]),
            Platform::Linux => ("xdg-open", vec![url.to_owned()]),
            // empty title argument, otherwise start treats a quoted url as the title
            Platform::Windows => (
                "cmd",
                vec![
                    "/C".to_owned(),
                    "start".to_owned(),
                    String::new(),
                    url.to_owned(),
                ],
            ),
        }
    }
}

impl BrowserOpener for SystemBrowser {
    fn open_url(&self, url: &str) -> Result<(), LaunchError> {
        let (program, args) = self.command(url);
        tracing::info!(url, "opening browser");
        Command::new(program)
            .args(&args)
            .spawn()
            .map(drop)
            .map_err(|source| LaunchError::Spawn {
                program: program.to_owned(),
                source,
            })
    }
}
