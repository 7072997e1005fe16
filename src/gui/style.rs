use iced::{Color, Theme};
use iced::widget::slider::{Appearance, Handle, HandleShape, Rail, StyleSheet};

const TOMATO: Color = Color::from_rgb(1.0, 0.388, 0.278);
const GRAY: Color = Color::from_rgb(0.5, 0.5, 0.5);

/// Gray below the handle, tomato above it.
pub struct RpmSliderStyleSheet;

impl RpmSliderStyleSheet {
    fn appearance(&self, handle_color: Color) -> Appearance {
        Appearance {
            rail: Rail {
                colors: (GRAY, TOMATO),
                width: 8.0,
                border_radius: 5.0.into(),
            },
            handle: Handle {
                shape: HandleShape::Circle { radius: 12.0 },
                color: handle_color,
                border_width: 1.0,
                border_color: Color::WHITE,
            },
        }
    }
}

impl StyleSheet for RpmSliderStyleSheet {
    type Style = Theme;

    fn active(&self, _style: &Self::Style) -> Appearance {
        self.appearance(GRAY)
    }

    fn hovered(&self, _style: &Self::Style) -> Appearance {
        self.appearance(Color { a: 0.8, ..GRAY })
    }

    fn dragging(&self, _style: &Self::Style) -> Appearance {
        self.appearance(Color::BLACK)
    }
}
