use std::time::Instant;
use tracing::info;

/// Formats whole seconds as `"{h}h {m}min {s}sec"`.
pub fn seconds_to_string(total: u64) -> String {
    let seconds = total % 60;
    let minutes = (total / 60) % 60;
    let hours = total / 3600;
    format!("{}h {}min {}sec", hours, minutes, seconds)
}

/// Periodic progress lines while rebuilding a sequence.
///
/// A line is emitted when the number of done frames is a multiple of the
/// period, and additionally at 2, period/10 and period/2 done frames so that
/// an estimate shows up early in long runs.
#[derive(Debug)]
pub struct StatusReporter {
    period: u64,
    start_frame: usize,
    total_frames: usize,
    started: Instant,
    last_frame: Instant,
}

impl StatusReporter {
    pub fn new(period: u64, start_frame: usize, total_frames: usize, now: Instant) -> Self {
        Self {
            period,
            start_frame,
            total_frames,
            started: now,
            last_frame: now,
        }
    }

    fn due(&self, done: u64) -> bool {
        let p = self.period;
        p > 0 && done != 0 && (done % p == 0 || done == 2 || done == p / 10 || done == p / 2)
    }

    /// Called when frame `current` starts. Returns the line that was logged, if any.
    pub fn frame_started(&mut self, current: usize, now: Instant) -> Option<String> {
        let last = std::mem::replace(&mut self.last_frame, now);
        let done = current.saturating_sub(self.start_frame) as u64;
        if !self.due(done) {
            return None;
        }

        let elapsed = now.saturating_duration_since(self.started).as_secs();
        let remaining_frames = self.total_frames.saturating_sub(current) as u64;
        let remaining = (elapsed / done) * remaining_frames;
        let last_frame = now.saturating_duration_since(last).as_secs();

        let msg = format!(
            "Frame {} / {} ({}/{}) - Estimated Remaining Time: {} - Last Frame Time: {}sec - Total Elapsed Time: {}",
            done,
            self.total_frames.saturating_sub(self.start_frame),
            current,
            self.total_frames,
            seconds_to_string(remaining),
            last_frame,
            seconds_to_string(elapsed)
        );
        info!("{}", msg);
        Some(msg)
    }
}
