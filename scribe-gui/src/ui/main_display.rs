//! # Main Display Module
//!
//! Layout of the Notescribe window: the animation, transcription and score
//! preview on the left, capture controls and the input device in the sidebar.

use iced::widget::{button, column, container, image, pick_list, row, scrollable, text, Space};
use iced::{Alignment, Color, Element, Length};
use scribe_core::SessionState;

use crate::{AppDisplayData, Message};

/// Creates the complete main application view
pub fn create_main_view(data: &AppDisplayData) -> Element<'_, Message> {
    let title = text("Notescribe").size(28);

    let current_note = text(data.current_note.clone().unwrap_or_else(|| "--".to_string())).size(48);
    let elapsed = text(format!("{:.1} s captured", data.captured_seconds)).size(14);

    let animation = container(data.kaleidoscope.view())
        .width(Length::Fill)
        .height(Length::Fixed(320.0));

    let main_content = row![
        column![
            title,
            Space::with_height(10),
            row![current_note, Space::with_width(20), elapsed].align_y(Alignment::Center),
            animation,
            create_notes_panel(&data.notes),
            create_score_panel(data.score_preview.as_ref()),
            text(data.status.clone()).size(16),
        ]
        .width(Length::Fill)
        .spacing(10),
        Space::with_width(10),
        create_sidebar(data),
    ]
    .align_y(Alignment::Start)
    .padding(20);

    container(main_content)
        .width(Length::Fill)
        .height(Length::Fill)
        .into()
}

/// The transcription so far, wrapped into lines.
fn create_notes_panel(notes: &[String]) -> Element<'static, Message> {
    let body = if notes.is_empty() {
        "No notes yet".to_string()
    } else {
        notes.join("  ")
    };

    container(
        column![
            text(format!("Notes ({})", notes.len())).size(18),
            scrollable(text(body).size(16)).height(Length::Fill),
        ]
        .spacing(5),
    )
    .width(Length::Fill)
    .height(Length::Fixed(140.0))
    .into()
}

/// The last exported score as LilyPond rendered it.
fn create_score_panel(preview: Option<&image::Handle>) -> Element<'static, Message> {
    let content: Element<'static, Message> = match preview {
        Some(handle) => image(handle.clone()).width(Length::Fill).into(),
        None => text("No score yet").size(14).into(),
    };

    container(column![text("Score").size(18), content].spacing(5))
        .width(Length::Fill)
        .height(Length::Fixed(180.0))
        .into()
}

fn create_sidebar(data: &AppDisplayData) -> Element<'_, Message> {
    let capturing = data.session_state == SessionState::Capturing;
    let idle = data.session_state == SessionState::Idle && !data.exporting;

    let (start_label, start_color) = if capturing {
        ("Capturing", Color::from_rgb(1.0, 0.84, 0.0))
    } else {
        ("Start", Color::from_rgb(0.2, 0.6, 0.2))
    };

    // Changes are ignored outside Idle; see `Message::DeviceSelected`.
    let device = pick_list(
        data.devices.as_slice(),
        Some(&data.selected_device),
        Message::DeviceSelected,
    )
    .text_size(14)
    .width(Length::Fill);

    column![
        text("Capture").size(18),
        Space::with_height(10),
        make_button(start_label, start_color, idle.then_some(Message::Start)),
        make_button("Stop", Color::from_rgb(0.8, 0.2, 0.2), capturing.then_some(Message::Stop)),
        Space::with_height(20),
        text("Input device").size(18),
        device,
    ]
    .spacing(8)
    .width(Length::Fixed(220.0))
    .into()
}

/// A full-width button; greyed out when `message` is `None`.
fn make_button(
    label: &'static str,
    color: Color,
    message: Option<Message>,
) -> Element<'static, Message> {
    let enabled = message.is_some();
    button(text(label).size(18).width(Length::Fill))
        .padding([12, 20])
        .style(move |_theme, _status| {
            use iced::widget::button;
            let (background, text_color) = if enabled {
                (color, Color::WHITE)
            } else {
                (Color::from_rgb(0.3, 0.3, 0.3), Color::from_rgb(0.6, 0.6, 0.6))
            };
            button::Style {
                background: Some(iced::Background::Color(background)),
                text_color,
                ..button::Style::default()
            }
        })
        .on_press_maybe(message)
        .into()
}
