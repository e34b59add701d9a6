/// The photo viewer: toolbar, scaled photo and status line
use chrono::NaiveDateTime;
use iced::widget::{button, column, container, image, row, text};
use iced::{Alignment, ContentFit, Element, Length};
use std::path::{Path, PathBuf};

use crate::pipeline::session::{Display, Shown};
use crate::state::data::Decision;
use crate::Message;

pub const APP_NAME: &str = "Picknick";

/// A ready photo, converted once into an iced image handle
#[derive(Debug, Clone)]
pub struct Photo {
    name: String,
    captured_at: Option<NaiveDateTime>,
    handle: image::Handle,
}

impl Photo {
    pub fn new(shown: &Shown) -> Self {
        let preview = &shown.preview;
        Self {
            name: shown.id.file_name(),
            captured_at: shown.captured_at,
            handle: image::Handle::from_rgba(
                preview.width(),
                preview.height(),
                preview.pixels().to_vec(),
            ),
        }
    }
}

#[derive(Debug, Clone)]
pub enum Screen {
    /// Waiting for the conversion of this file
    Loading(String),
    Photo(Photo),
    Unreadable { name: String, message: String },
    Finished { keep: PathBuf },
}

impl Screen {
    /// `None` when the queue is drained and the caller has to advance
    pub fn from_display(display: Display) -> Option<Self> {
        let screen = match display {
            Display::Ready(shown) => Screen::Photo(Photo::new(&shown)),
            Display::Loading(id) => Screen::Loading(id.file_name()),
            Display::Unreadable { id, message } => Screen::Unreadable {
                name: id.file_name(),
                message,
            },
            Display::Drained => return None,
        };
        Some(screen)
    }

    pub fn title(&self) -> String {
        match self {
            Screen::Photo(photo) => title_for(&photo.name, photo.captured_at),
            Screen::Loading(name) | Screen::Unreadable { name, .. } => title_for(name, None),
            Screen::Finished { .. } => APP_NAME.to_string(),
        }
    }

    /// Whether the toolbar accepts a decision
    pub fn can_classify(&self) -> bool {
        matches!(self, Screen::Photo(_) | Screen::Unreadable { .. })
    }
}

/// "Picknick - DSC_0001.NEF - 2024-05-01 10:22:03"
pub fn title_for(name: &str, captured_at: Option<NaiveDateTime>) -> String {
    match captured_at {
        Some(time) => format!("{APP_NAME} - {name} - {}", time.format("%Y-%m-%d %H:%M:%S")),
        None => format!("{APP_NAME} - {name}"),
    }
}

pub fn view<'a>(screen: &'a Screen, status: &'a str, remaining: usize) -> Element<'a, Message> {
    let body: Element<'a, Message> = match screen {
        Screen::Finished { keep } => return finished(keep),
        Screen::Photo(photo) => image(photo.handle.clone())
            .content_fit(ContentFit::Contain)
            .width(Length::Fill)
            .height(Length::Fill)
            .into(),
        Screen::Loading(name) => centered(text(format!("Loading {name}...")).size(20).into()),
        Screen::Unreadable { name, message } => centered(
            column![
                text(format!("Cannot display {name}")).size(20),
                text(message.as_str()).size(14),
            ]
            .spacing(10)
            .align_x(Alignment::Center)
            .into(),
        ),
    };

    let status_line = if status.is_empty() {
        format!("{remaining} remaining")
    } else {
        format!("{remaining} remaining | {status}")
    };

    column![toolbar(screen.can_classify()), body, text(status_line).size(14)]
        .spacing(10)
        .padding(10)
        .into()
}

fn toolbar<'a>(enabled: bool) -> Element<'a, Message> {
    let buttons = Decision::ALL.into_iter().map(|decision| -> Element<'a, Message> {
        let label = match decision {
            Decision::Keep => "Keep",
            Decision::Skip => "Skip",
            Decision::Maybe => "Maybe",
        };
        button(text(format!("{label} ({})", decision.shortcut())))
            .on_press_maybe(enabled.then_some(Message::Classify(decision)))
            .padding(10)
            .into()
    });

    row(buttons).spacing(10).into()
}

fn centered(content: Element<'_, Message>) -> Element<'_, Message> {
    container(content)
        .width(Length::Fill)
        .height(Length::Fill)
        .center_x(Length::Fill)
        .center_y(Length::Fill)
        .into()
}

fn finished(keep: &Path) -> Element<'_, Message> {
    let content = column![
        text("All images have been processed").size(32),
        text(format!("Kept photos are in {}", keep.display())).size(16),
        button("Close").on_press(Message::Close).padding(10),
    ]
    .spacing(20)
    .padding(40)
    .align_x(Alignment::Center);

    centered(content.into())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::raw::convert::Preview;
    use crate::state::data::ItemId;
    use chrono::NaiveDate;
    use ::image::RgbaImage;

    #[test]
    fn test_title_with_and_without_capture_time() {
        let time = NaiveDate::from_ymd_opt(2024, 5, 1)
            .unwrap()
            .and_hms_opt(10, 22, 3)
            .unwrap();

        assert_eq!(title_for("A.NEF", None), "Picknick - A.NEF");
        assert_eq!(
            title_for("A.NEF", Some(time)),
            "Picknick - A.NEF - 2024-05-01 10:22:03"
        );
    }

    #[test]
    fn test_screen_from_display() {
        let id = ItemId::new("/photos/A.NEF");
        let shown = Shown {
            id: id.clone(),
            preview: Preview::new(RgbaImage::new(4, 3)),
            captured_at: None,
        };

        let photo = Screen::from_display(Display::Ready(shown)).unwrap();
        assert_eq!(photo.title(), "Picknick - A.NEF");
        assert!(photo.can_classify());

        let loading = Screen::from_display(Display::Loading(id)).unwrap();
        assert!(!loading.can_classify());

        assert!(Screen::from_display(Display::Drained).is_none());
    }
}
