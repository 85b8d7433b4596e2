//! Console activity indicator for long-running phases.
//!
//! Prints a spinner line to stderr so structured output on stdout stays
//! clean. Purely cosmetic: nothing reads it, and dropping it mid-build
//! loses nothing.

use std::io::{self, Write};
use std::time::Duration;

use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use crate::queue::WorkQueue;

const FRAMES: [char; 10] = ['⠋', '⠙', '⠹', '⠸', '⠼', '⠴', '⠦', '⠧', '⠇', '⠏'];
const TICK: Duration = Duration::from_millis(120);

/// A running indicator line. Cancel it with [`Spinner::stop`].
pub struct Spinner {
    token: CancellationToken,
    handle: JoinHandle<()>,
}

impl Spinner {
    /// Starts a plain spinner with a label.
    pub fn start(label: &str) -> Spinner {
        Self::launch(label.to_string(), None::<WorkQueue<()>>)
    }

    /// Starts a spinner that also reports the queue backlog.
    pub fn start_with_queue<T: Send + 'static>(label: &str, queue: WorkQueue<T>) -> Spinner {
        Self::launch(label.to_string(), Some(queue))
    }

    fn launch<T: Send + 'static>(label: String, queue: Option<WorkQueue<T>>) -> Spinner {
        let token = CancellationToken::new();
        let handle = tokio::spawn(tick_loop(label, queue, token.clone()));
        Spinner { token, handle }
    }

    /// Stops the indicator and clears its line.
    pub async fn stop(self) {
        self.token.cancel();
        let _ = self.handle.await;
    }
}

async fn tick_loop<T: Send + 'static>(
    label: String,
    queue: Option<WorkQueue<T>>,
    token: CancellationToken,
) {
    let mut interval = tokio::time::interval(TICK);
    let mut frame = 0usize;
    loop {
        tokio::select! {
            _ = token.cancelled() => break,
            _ = interval.tick() => {
                let glyph = FRAMES[frame % FRAMES.len()];
                let line = match &queue {
                    Some(queue) => {
                        format!("\r{} {} ({} queued)  ", glyph, label, queue.len().await)
                    }
                    None => format!("\r{} {}  ", glyph, label),
                };
                write_indicator(line.as_bytes());
                frame += 1;
            }
        }
    }
    write_indicator(b"\r\x1b[2K");
}

fn write_indicator(bytes: &[u8]) {
    let mut stderr = io::stderr();
    let _ = stderr.write_all(bytes);
    let _ = stderr.flush();
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test(start_paused = true)]
    async fn test_spinner_stops_cleanly() {
        let spinner = Spinner::start("Working");
        tokio::time::sleep(Duration::from_secs(1)).await;
        spinner.stop().await;
    }

    #[tokio::test(start_paused = true)]
    async fn test_spinner_tracks_queue_depth() {
        let queue = WorkQueue::new(vec![1, 2, 3]);
        let spinner = Spinner::start_with_queue("Building", queue.clone());
        tokio::time::sleep(Duration::from_millis(500)).await;
        let _ = queue.pop(Duration::from_millis(10)).await;
        tokio::time::sleep(Duration::from_millis(500)).await;
        spinner.stop().await;
    }
}
