//! Test fixtures shared by the unit tests.

use std::fs;
use std::path::{Path, PathBuf};

use image::{ImageFormat, Rgb, RgbImage};

use crate::pipeline::session::{Event, Session};
use crate::raw::convert::Converter;

/// A stand-in for dcraw: a shell script that records each invocation and
/// copies the source file to stdout, failing for names containing
/// "corrupt". Run through `/bin/sh` so it needs no exec permission.
pub struct FakeDecoder {
    script: PathBuf,
    log: PathBuf,
}

pub fn fake_decoder(dir: &Path) -> FakeDecoder {
    let script = dir.join("fake-dcraw.sh");
    let log = dir.join("fake-dcraw.log");
    let body = format!(
        r#"#!/bin/sh
# invoked as: fake-dcraw.sh -e -c <source>
echo "$3" >> '{log}'
case "$3" in
  *corrupt*) echo "cannot decode $3" >&2; exit 3 ;;
esac
cat "$3"
"#,
        log = log.display()
    );
    fs::write(&script, body).unwrap();
    FakeDecoder { script, log }
}

impl FakeDecoder {
    pub fn converter(&self) -> Converter {
        Converter::new("/bin/sh").with_leading_args([self.script.clone()])
    }

    /// Sources the decoder has been run on, in order
    pub fn invocations(&self) -> Vec<PathBuf> {
        fs::read_to_string(&self.log)
            .unwrap_or_default()
            .lines()
            .map(PathBuf::from)
            .collect()
    }

    pub fn count_for(&self, source: &Path) -> usize {
        self.invocations().iter().filter(|p| *p == source).count()
    }
}

/// Write a small solid-colour JPEG; the fake decoder passes it through
pub fn write_jpeg(path: &Path, width: u32, height: u32) {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent).unwrap();
    }
    RgbImage::from_pixel(width, height, Rgb([180, 40, 40]))
        .save_with_format(path, ImageFormat::Jpeg)
        .unwrap();
}

/// Spawn every job the session has queued, feed completions back in, and
/// repeat until no new work appears. Returns the events in order.
pub async fn run_jobs(session: &mut Session) -> Vec<Event> {
    let mut events = Vec::new();
    loop {
        let jobs = session.take_jobs();
        if jobs.is_empty() {
            return events;
        }
        let handles: Vec<_> = jobs.into_iter().map(|job| tokio::spawn(job.run())).collect();
        for handle in handles {
            let completion = handle.await.unwrap();
            events.extend(session.apply(completion));
        }
    }
}
