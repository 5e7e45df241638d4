//! # Kaleidoscope Widget
//!
//! A purely decorative animation shown while the transcriber runs. Fifty
//! coloured circles pulse around the centre of the canvas, alternating
//! between a radial "kaleidoscope" pattern and a looping "headset" orbit
//! every full turn of the animation phase.

use iced::widget::canvas::{self, Geometry, Path};
use iced::widget::container;
use iced::{mouse, Color, Element, Point, Rectangle, Renderer, Theme};
use std::f32::consts::{PI, TAU};

const SHAPE_COUNT: usize = 50;

/// Phase advance per animation tick.
const PHASE_STEP: f32 = 0.02;

const GOLDEN_RATIO_CONJUGATE: f32 = 0.618_034;

/// Background behind the shapes.
const BACKGROUND: Color = Color::from_rgb(30.0 / 255.0, 30.0 / 255.0, 30.0 / 255.0);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DrawMode {
    Kaleidoscope,
    Headset,
}

#[derive(Debug, Clone, Copy)]
struct Shape {
    color: Color,
    /// Base radius in pixels.
    size: f32,
    /// Direction from the centre, in radians.
    angle: f32,
}

/// Animation state owned by the application.
#[derive(Debug, Clone)]
pub struct KaleidoscopeState {
    phase: f32,
    mode: DrawMode,
    shapes: Vec<Shape>,
}

impl KaleidoscopeState {
    pub fn new() -> Self {
        Self {
            phase: 0.0,
            mode: DrawMode::Kaleidoscope,
            shapes: generate_shapes(),
        }
    }

    pub fn phase(&self) -> f32 {
        self.phase
    }

    pub fn mode(&self) -> DrawMode {
        self.mode
    }

    /// Moves one tick forward, switching mode when the phase wraps.
    pub fn advance(&mut self) {
        self.phase += PHASE_STEP;
        if self.phase >= TAU {
            self.phase = 0.0;
            self.mode = match self.mode {
                DrawMode::Kaleidoscope => DrawMode::Headset,
                DrawMode::Headset => DrawMode::Kaleidoscope,
            };
        }
    }

    /// Rewinds to the start of a full turn, keeping the current mode.
    pub fn restart(&mut self) {
        self.phase = 0.0;
    }

    pub fn view(&self) -> Element<'static, crate::Message> {
        container(
            canvas::Canvas::new(self.clone())
                .width(iced::Length::Fill)
                .height(iced::Length::Fill),
        )
        .into()
    }
}

impl Default for KaleidoscopeState {
    fn default() -> Self {
        Self::new()
    }
}

/// Spreads hues, sizes and angles with the golden ratio so the pattern looks
/// scattered without needing a random source.
fn generate_shapes() -> Vec<Shape> {
    (0..SHAPE_COUNT)
        .map(|i| {
            let spread = (i as f32 * GOLDEN_RATIO_CONJUGATE).fract();
            Shape {
                color: hue_to_color(spread),
                size: 20.0 + 30.0 * ((i as f32 * 0.37).sin() * 0.5 + 0.5),
                angle: spread * TAU + i as f32,
            }
        })
        .collect()
}

/// Fully saturated colour for a hue in `[0, 1)`.
fn hue_to_color(hue: f32) -> Color {
    let h = hue.rem_euclid(1.0) * 6.0;
    let x = 1.0 - (h % 2.0 - 1.0).abs();
    let (r, g, b) = match h as u32 {
        0 => (1.0, x, 0.0),
        1 => (x, 1.0, 0.0),
        2 => (0.0, 1.0, x),
        3 => (0.0, x, 1.0),
        4 => (x, 0.0, 1.0),
        _ => (1.0, 0.0, x),
    };
    Color::from_rgb(r, g, b)
}

impl<Message> canvas::Program<Message> for KaleidoscopeState {
    type State = ();

    fn draw(
        &self,
        _state: &Self::State,
        renderer: &Renderer,
        _theme: &Theme,
        bounds: Rectangle,
        _cursor: mouse::Cursor,
    ) -> Vec<Geometry> {
        let mut frame = canvas::Frame::new(renderer, bounds.size());

        if !bounds.width.is_finite() || !bounds.height.is_finite() {
            return vec![frame.into_geometry()];
        }

        frame.fill_rectangle(Point::ORIGIN, bounds.size(), BACKGROUND);

        let center = frame.center();
        let max_radius = bounds.width.min(bounds.height) / 3.0;
        let swing = self.phase + self.phase.sin() * PI;

        for (i, shape) in self.shapes.iter().enumerate() {
            let position = match self.mode {
                DrawMode::Kaleidoscope => {
                    let radius = max_radius * swing.sin();
                    let angle = shape.angle + self.phase * (1.0 + i as f32 * 0.1);
                    Point::new(center.x + radius * angle.cos(), center.y + radius * angle.sin())
                }
                DrawMode::Headset => {
                    Point::new(center.x + swing.cos() * 100.0, center.y + swing.sin() * 50.0)
                }
            };
            let size = shape.size * (0.5 + 0.5 * swing.sin());

            if size.is_finite() && size > 0.0 {
                frame.fill(&Path::circle(position, size), shape.color);
            }
        }

        vec![frame.into_geometry()]
    }
}
