use ratatui::style::Color;

/// Colors used by every panel.
#[derive(Debug, Clone, Copy)]
pub struct Theme {
    pub bg_dark: Color,
    pub bg_medium: Color,
    pub fg_primary: Color,
    pub fg_secondary: Color,
    pub fg_muted: Color,
    pub accent_primary: Color,
    pub accent_secondary: Color,
    pub accent_highlight: Color,
    pub border: Color,
    pub border_focused: Color,
    pub star: Color,
    pub success: Color,
    pub warning: Color,
}

const DARK: Theme = Theme {
    bg_dark: Color::Rgb(22, 24, 30),
    bg_medium: Color::Rgb(36, 39, 48),
    fg_primary: Color::Rgb(224, 228, 236),
    fg_secondary: Color::Rgb(170, 176, 190),
    fg_muted: Color::Rgb(104, 110, 126),
    accent_primary: Color::Rgb(130, 170, 255),
    accent_secondary: Color::Rgb(120, 200, 210),
    accent_highlight: Color::Rgb(255, 200, 90),
    border: Color::Rgb(64, 68, 82),
    border_focused: Color::Rgb(130, 170, 255),
    star: Color::Rgb(255, 200, 60),
    success: Color::Rgb(140, 210, 130),
    warning: Color::Rgb(240, 120, 100),
};

const LIGHT: Theme = Theme {
    bg_dark: Color::Rgb(244, 245, 248),
    bg_medium: Color::Rgb(226, 229, 236),
    fg_primary: Color::Rgb(30, 34, 44),
    fg_secondary: Color::Rgb(70, 76, 92),
    fg_muted: Color::Rgb(130, 136, 150),
    accent_primary: Color::Rgb(40, 90, 200),
    accent_secondary: Color::Rgb(20, 130, 140),
    accent_highlight: Color::Rgb(190, 120, 0),
    border: Color::Rgb(190, 194, 204),
    border_focused: Color::Rgb(40, 90, 200),
    star: Color::Rgb(200, 140, 0),
    success: Color::Rgb(40, 140, 60),
    warning: Color::Rgb(190, 60, 40),
};

/// Palette by name; anything but "light" is the dark palette.
pub fn theme(name: &str) -> Theme {
    if name.eq_ignore_ascii_case("light") {
        LIGHT
    } else {
        DARK
    }
}
