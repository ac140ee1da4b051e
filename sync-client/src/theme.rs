//! Theme state for the UI.
//!
//! [`ThemeController`] is the theming consumer. The sync engine never
//! reaches into it directly; it holds a [`ThemeSink`] handed over at
//! bootstrap and calls [`ThemeSink::adopt_theme`] when the server or
//! another device changes the theme.

use std::sync::Arc;
use tokio::sync::watch;
use tracing::debug;
use trailsync_types::Theme;

/// Receives theme changes from the sync engine.
pub trait ThemeSink: Send + Sync {
    /// Adopt `theme` if it differs from the current one. Returns whether it changed.
    fn adopt_theme(&self, theme: Theme) -> bool;
}

/// Tells whether the OS prefers a dark appearance.
pub trait SystemAppearance: Send + Sync {
    /// True when the OS is in dark mode.
    fn prefers_dark(&self) -> bool;
}

/// Appearance fixed at construction.
#[derive(Debug, Clone, Copy, Default)]
pub struct FixedAppearance {
    /// Whether the simulated OS is dark.
    pub dark: bool,
}

impl SystemAppearance for FixedAppearance {
    fn prefers_dark(&self) -> bool {
        self.dark
    }
}

/// Concrete light or dark after resolving `system`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResolvedTheme {
    /// Light
    Light,
    /// Dark
    Dark,
}

/// What the UI renders.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ThemeSnapshot {
    /// The user's choice
    pub theme: Theme,
    /// What `theme` means right now
    pub resolved: ResolvedTheme,
}

impl ThemeSnapshot {
    /// True when rendering dark.
    pub fn is_dark(&self) -> bool {
        self.resolved == ResolvedTheme::Dark
    }
}

/// Holds the current theme and publishes changes.
pub struct ThemeController {
    appearance: Arc<dyn SystemAppearance>,
    current: watch::Sender<ThemeSnapshot>,
}

impl ThemeController {
    /// Create a controller starting at `initial`.
    pub fn new(initial: Theme, appearance: Arc<dyn SystemAppearance>) -> Self {
        let snapshot = ThemeSnapshot {
            theme: initial,
            resolved: resolve(initial, appearance.as_ref()),
        };
        let (current, _) = watch::channel(snapshot);
        Self {
            appearance,
            current,
        }
    }

    /// The user's choice.
    pub fn theme(&self) -> Theme {
        self.current.borrow().theme
    }

    /// Light or dark after resolving `system`.
    pub fn resolved_theme(&self) -> ResolvedTheme {
        self.current.borrow().resolved
    }

    /// True when rendering dark.
    pub fn is_dark(&self) -> bool {
        self.current.borrow().is_dark()
    }

    /// Current snapshot.
    pub fn snapshot(&self) -> ThemeSnapshot {
        *self.current.borrow()
    }

    /// Apply a theme chosen on this device, before the server confirms it.
    pub fn set_local(&self, theme: Theme) -> bool {
        self.apply(theme)
    }

    /// Re-resolve `system` after the OS appearance changed.
    pub fn refresh_system(&self) -> bool {
        let theme = self.theme();
        self.apply(theme)
    }

    /// Watch for changes.
    pub fn subscribe(&self) -> watch::Receiver<ThemeSnapshot> {
        self.current.subscribe()
    }

    fn apply(&self, theme: Theme) -> bool {
        let next = ThemeSnapshot {
            theme,
            resolved: resolve(theme, self.appearance.as_ref()),
        };
        self.current.send_if_modified(|snapshot| {
            if *snapshot == next {
                false
            } else {
                debug!(theme = %theme, "theme changed");
                *snapshot = next;
                true
            }
        })
    }
}

impl ThemeSink for ThemeController {
    fn adopt_theme(&self, theme: Theme) -> bool {
        if self.theme() == theme {
            return false;
        }
        self.apply(theme)
    }
}

fn resolve(theme: Theme, appearance: &dyn SystemAppearance) -> ResolvedTheme {
    match theme {
        Theme::Light => ResolvedTheme::Light,
        Theme::Dark => ResolvedTheme::Dark,
        Theme::System if appearance.prefers_dark() => ResolvedTheme::Dark,
        Theme::System => ResolvedTheme::Light,
    }
}
