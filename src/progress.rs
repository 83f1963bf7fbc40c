use std::time::{Duration, Instant};

use crate::models::ProgressEvent;

const ELLIPSIS_STEP: Duration = Duration::from_millis(500);
const BAR_CELLS: usize = 10;
const CELL_LEVELS: [char; 4] = ['░', '▒', '▓', '█'];

/// Renders batch progress events as a single status line. Owns the ellipsis
/// animation, so one renderer per status line.
#[derive(Debug)]
pub struct StatusLine {
    dots: usize,
    last_step: Option<Instant>,
}

impl Default for StatusLine {
    fn default() -> Self {
        Self::new()
    }
}

impl StatusLine {
    pub fn new() -> Self {
        Self {
            dots: 0,
            last_step: None,
        }
    }

    pub fn render(&mut self, event: &ProgressEvent) -> String {
        self.render_at(event, Instant::now())
    }

    pub fn render_at(&mut self, event: &ProgressEvent, now: Instant) -> String {
        self.advance(now);
        format!(
            "{}{} {}/{} {} {:.2} MB/s",
            event.phase.verb(),
            ".".repeat(self.dots),
            event.completed,
            event.total,
            progress_bar(event.percent),
            event.speed_mbps
        )
    }

    fn advance(&mut self, now: Instant) {
        match self.last_step {
            None => self.last_step = Some(now),
            Some(last) if now.duration_since(last) >= ELLIPSIS_STEP => {
                self.dots = (self.dots + 1) % 4;
                self.last_step = Some(now);
            }
            Some(_) => {}
        }
    }
}

/// Fixed-width bar; each cell is quantized to one of four fill levels.
pub fn progress_bar(percent: f64) -> String {
    let percent = if percent.is_finite() {
        percent.clamp(0.0, 100.0)
    } else {
        0.0
    };
    let per_cell = 100.0 / BAR_CELLS as f64;
    (0..BAR_CELLS)
        .map(|cell| {
            let fill = ((percent - cell as f64 * per_cell) / per_cell).clamp(0.0, 1.0);
            let level = if fill >= 1.0 {
                3
            } else if fill >= 0.5 {
                2
            } else if fill > 0.0 {
                1
            } else {
                0
            };
            CELL_LEVELS[level]
        })
        .collect()
}
