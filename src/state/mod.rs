/// State management module
///
/// This module handles the triage workflow state, including:
/// - Shared data structures (data.rs)
/// - The queue of undecided files and its cursor (queue.rs)
/// - Directory transitions and file moves (triage.rs)
/// - Persisted user settings (settings.rs)

pub mod data;
pub mod queue;
pub mod settings;
pub mod triage;
