//! Side effects the dispatcher can trigger: launching programs and opening URLs.

/// Default browser
pub mod browser;
/// Per-platform application table
pub mod launcher;

use thiserror::Error;

pub use browser::SystemBrowser;
pub use launcher::{LaunchAction, SystemLauncher};

/// Operating system family, selects launch table and speech command
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Platform {
    /// macOS
    MacOs,
    /// Linux and other unix desktops
    Linux,
    /// Windows
    Windows,
}

impl Platform {
    /// Platform this binary was built for
    #[must_use]
    pub const fn current() -> Self {
        if cfg!(target_os = "macos") {
            Self::MacOs
        } else if cfg!(target_os = "windows") {
            Self::Windows
        } else {
            Self::Linux
        }
    }
}

/// Launch or open failure
#[derive(Debug, Error)]
pub enum LaunchError {
    /// No entry in the launch table matches the name
    #[error("no known application matches '{0}'")]
    NotFound(String),

    /// The program could not be started
    #[error("failed to start {program}: {source}")]
    Spawn {
        /// Program that was invoked
        program: String,
        /// Underlying I/O error
        source: std::io::Error,
    },
}

/// Starts desktop applications by name
#[cfg_attr(test, mockall::automock)]
pub trait AppLauncher {
    /// Launches the application matching `app` (lowercase)
    ///
    /// # Errors
    /// Returns [`LaunchError::NotFound`] if nothing matches, or the spawn failure
    fn launch(&self, app: &str) -> Result<(), LaunchError>;
}

/// Opens URLs without waiting for the browser
#[cfg_attr(test, mockall::automock)]
pub trait BrowserOpener {
    /// Opens `url` in the default browser
    ///
    /// # Errors
    /// Returns error if the opener command cannot be started
    fn open_url(&self, url: &str) -> Result<(), LaunchError>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_current_platform() {
        let platform = Platform::current();
        if cfg!(target_os = "macos") {
            assert_eq!(platform, Platform::MacOs);
        } else if cfg!(target_os = "windows") {
            assert_eq!(platform, Platform::Windows);
        } else {
            assert_eq!(platform, Platform::Linux);
        }
    }
}
