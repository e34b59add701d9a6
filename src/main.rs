use clap::Parser;
use iced::keyboard::{self, Key};
use iced::{Element, Subscription, Task, Theme};
use rfd::FileDialog;
use std::path::{Path, PathBuf};
use std::process::ExitCode;
use std::sync::{Arc, Mutex};
use tracing::{debug, error, info, warn};
use tracing_subscriber::EnvFilter;

mod error;
mod pipeline;
mod raw;
mod state;
mod ui;

#[cfg(test)]
mod testing;

use error::StartupError;
use pipeline::prefetch::{Completion, Job};
use pipeline::session::{Display, Event, PipelineConfig, Session};
use raw::convert::Converter;
use state::data::Decision;
use state::settings::Settings;
use state::triage::Phase;
use ui::viewer::{self, Screen};

/// Sort a directory of RAW photos into keep, skip and maybe
#[derive(Parser, Debug)]
#[command(name = "picknick", version, about)]
struct Args {
    /// Directory with the RAW files to sort (asks if omitted)
    directory: Option<PathBuf>,

    /// RAW decoder program (dcraw or compatible)
    #[arg(long)]
    decoder: Option<PathBuf>,

    /// Number of images converted ahead of the current one
    #[arg(long)]
    prefetch: Option<usize>,

    /// Concurrent decoder processes for prefetching
    #[arg(long)]
    workers: Option<usize>,

    /// Longest edge of the displayed preview in pixels
    #[arg(long)]
    max_dimension: Option<u32>,
}

impl Args {
    /// Command line values win over the settings file
    fn apply(&self, settings: &mut Settings) {
        if let Some(decoder) = &self.decoder {
            settings.decoder = decoder.clone();
        }
        if let Some(prefetch) = self.prefetch {
            settings.prefetch_count = prefetch;
        }
        if let Some(workers) = self.workers {
            settings.workers = workers;
        }
        if let Some(max_dimension) = self.max_dimension {
            settings.preview_max_dimension = max_dimension;
        }
    }
}

/// Carries a value that is not `Clone` through iced's message type.
/// The first `take` wins.
#[derive(Debug)]
struct Envelope<T>(Arc<Mutex<Option<T>>>);

impl<T> Envelope<T> {
    fn new(value: T) -> Self {
        Self(Arc::new(Mutex::new(Some(value))))
    }

    fn take(&self) -> Option<T> {
        self.0.lock().ok()?.take()
    }
}

impl<T> Clone for Envelope<T> {
    fn clone(&self) -> Self {
        Self(self.0.clone())
    }
}

/// Application messages (events)
#[derive(Debug, Clone)]
enum Message {
    /// User picked a verdict for the current photo
    Classify(Decision),
    /// A background conversion finished
    Converted(Envelope<Completion>),
    /// Close button on the completion screen
    Close,
}

/// Main application state
struct Picknick {
    session: Session,
    screen: Screen,
    /// Last noteworthy outcome (move failures, auto-skips)
    status: String,
}

impl Picknick {
    fn new(session: Session) -> (Self, Task<Message>) {
        let mut app = Picknick {
            session,
            screen: Screen::Loading(String::new()),
            status: String::new(),
        };
        app.refresh();
        let task = app.dispatch();
        (app, task)
    }

    /// Handle application messages and update state
    fn update(&mut self, message: Message) -> Task<Message> {
        match message {
            Message::Classify(decision) => self.classify(decision),
            Message::Converted(envelope) => {
                if let Some(completion) = envelope.take() {
                    self.converted(completion);
                }
            }
            Message::Close => {
                self.session.shutdown();
                return iced::exit();
            }
        }
        self.dispatch()
    }

    fn classify(&mut self, decision: Decision) {
        if !self.screen.can_classify() {
            return;
        }
        let name = self
            .session
            .current_identity()
            .map(|id| id.file_name())
            .unwrap_or_default();

        match self.session.classify(decision) {
            Ok(_) => {
                self.status = format!("{name} -> {}", decision.label());
                self.refresh();
            }
            // The photo stays on screen so the user can retry
            Err(err) => self.status = err.to_string(),
        }
    }

    fn converted(&mut self, completion: Completion) {
        match self.session.apply(completion) {
            Some(Event::CurrentReady(id)) => {
                debug!(item = %id, "showing converted image");
                self.refresh();
            }
            Some(Event::CurrentFailed { id, message }) => {
                self.status = format!("{} could not be read: {message}", id.file_name());
                self.refresh();
            }
            Some(Event::AutoSkipped {
                id,
                error,
                moved,
                next,
            }) => {
                self.status = match moved {
                    Some(_) => format!("{} could not be read and was moved to skip", id.file_name()),
                    None => format!("{} could not be read or moved: {error}", id.file_name()),
                };
                self.show(next);
            }
            None => {}
        }
    }

    fn refresh(&mut self) {
        let display = self.session.request_display();
        self.show(display);
    }

    /// Put `display` on screen, moving on to the next directory when the
    /// queue has run dry
    fn show(&mut self, mut display: Display) {
        loop {
            if let Some(screen) = Screen::from_display(display) {
                self.screen = screen;
                return;
            }
            if self.session.advance_if_drained() == Phase::Finished {
                self.screen = Screen::Finished {
                    keep: self.session.targets().keep.clone(),
                };
                return;
            }
            display = self.session.request_display();
        }
    }

    /// Spawn every conversion the session has claimed
    fn dispatch(&mut self) -> Task<Message> {
        Task::batch(self.session.take_jobs().into_iter().map(spawn))
    }

    fn view(&self) -> Element<'_, Message> {
        viewer::view(&self.screen, &self.status, self.session.remaining())
    }

    fn title(&self) -> String {
        self.screen.title()
    }

    fn subscription(&self) -> Subscription<Message> {
        keyboard::on_key_press(|key, _modifiers| match key.as_ref() {
            Key::Character(c) => c
                .chars()
                .next()
                .and_then(Decision::from_shortcut)
                .map(Message::Classify),
            _ => None,
        })
    }

    /// Set the application theme
    fn theme(&self) -> Theme {
        Theme::Dark
    }
}

fn spawn(job: Job) -> Task<Message> {
    debug!(item = %job.id(), kind = ?job.kind(), "spawning conversion");
    Task::perform(job.run(), |completion| {
        Message::Converted(Envelope::new(completion))
    })
}

fn main() -> ExitCode {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("picknick=info")),
        )
        .init();

    match run(Args::parse()) {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            error!(error = %err, "picknick stopped");
            ExitCode::FAILURE
        }
    }
}

fn run(args: Args) -> Result<(), StartupError> {
    let settings_path = Settings::default_path()
        .inspect_err(|err| warn!(error = %err, "settings will not be persisted"))
        .ok();
    let stored = load_settings(settings_path.as_deref());

    let root = match &args.directory {
        Some(dir) => dir.clone(),
        None => pick_directory(&stored).ok_or(StartupError::NoSelection)?,
    };
    let session = open_session(&root, stored, &args, settings_path.as_deref())?;

    info!(root = %root.display(), "opening viewer");
    iced::application(Picknick::title, Picknick::update, Picknick::view)
        .subscription(Picknick::subscription)
        .theme(Picknick::theme)
        .centered()
        .run_with(move || Picknick::new(session))?;

    Ok(())
}

/// Start triaging `root`. Only a directory that actually opened is
/// remembered, and one-off command line overrides are not.
fn open_session(
    root: &Path,
    mut stored: Settings,
    args: &Args,
    settings_path: Option<&Path>,
) -> Result<Session, StartupError> {
    let mut settings = stored.clone();
    args.apply(&mut settings);

    let converter = Converter::new(&settings.decoder)
        .with_leading_args(settings.decoder_args.clone())
        .with_max_dimension(settings.preview_max_dimension);
    let session = Session::start(root, PipelineConfig::from(settings), converter)?;

    stored.initial_directory = Some(root.to_path_buf());
    if let Some(path) = settings_path {
        if let Err(err) = stored.save(path) {
            warn!(error = %err, path = %path.display(), "failed to save settings");
        }
    }
    Ok(session)
}

/// Settings from disk; a missing or broken file gives the defaults
fn load_settings(path: Option<&Path>) -> Settings {
    let Some(path) = path else {
        return Settings::default();
    };
    Settings::load(path).unwrap_or_else(|err| {
        warn!(error = %err, path = %path.display(), "using default settings");
        Settings::default()
    })
}

/// Show the native folder picker, starting where the user left off
fn pick_directory(settings: &Settings) -> Option<PathBuf> {
    let start = settings
        .initial_directory
        .clone()
        .filter(|dir| dir.is_dir())
        .or_else(dirs::picture_dir);

    let mut dialog = FileDialog::new().set_title("Select a folder with RAW photos");
    if let Some(dir) = start {
        dialog = dialog.set_directory(dir);
    }
    dialog.pick_folder()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_command_line_overrides_settings() {
        let args = Args::parse_from(["picknick", "/photos", "--prefetch", "3", "--decoder", "/opt/dcraw"]);
        let mut settings = Settings::default();
        args.apply(&mut settings);

        assert_eq!(args.directory, Some(PathBuf::from("/photos")));
        assert_eq!(settings.prefetch_count, 3);
        assert_eq!(settings.decoder, PathBuf::from("/opt/dcraw"));
        assert_eq!(settings.workers, Settings::default().workers);
    }

    #[test]
    fn test_only_an_opened_directory_is_remembered() {
        let dir = tempfile::tempdir().unwrap();
        let settings_path = dir.path().join("settings.json");
        let args = Args::parse_from(["picknick", "--prefetch", "3"]);

        let typo = dir.path().join("imprt");
        let err = open_session(&typo, Settings::default(), &args, Some(&settings_path));
        assert!(matches!(err, Err(StartupError::MissingSource(_))));
        assert!(!settings_path.exists());

        let root = dir.path().join("import");
        std::fs::create_dir(&root).unwrap();
        open_session(&root, Settings::default(), &args, Some(&settings_path)).unwrap();

        let saved = Settings::load(&settings_path).unwrap();
        assert_eq!(saved.initial_directory, Some(root));
        assert_eq!(saved.prefetch_count, Settings::default().prefetch_count);
    }

    #[test]
    fn test_envelope_is_taken_once() {
        let envelope = Envelope::new(7);
        let copy = envelope.clone();

        assert_eq!(copy.take(), Some(7));
        assert_eq!(envelope.take(), None);
    }
}
