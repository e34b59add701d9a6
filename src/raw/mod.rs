/// RAW source handling
///
/// This module handles:
/// - Running the external decoder to extract the embedded preview
/// - Decoding and downscaling that preview for display
/// - Reading the capture time from EXIF metadata

pub mod convert;
pub mod metadata;
