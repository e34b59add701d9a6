/// UI components for the triage window

pub mod viewer;
