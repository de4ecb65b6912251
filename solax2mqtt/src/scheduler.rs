use std::sync::mpsc::{Receiver, RecvTimeoutError};
use std::time::Duration;

use chrono::{Local, NaiveDateTime, TimeDelta, Timelike};
use log::info;

/// Cycles start on minutes divisible by this.
pub const BLOCK_MINUTES: u32 = 5;
/// Second within the starting minute at which a cycle fires.
pub const TARGET_SECOND: u32 = 10;

/// The first instant strictly after `now` whose minute is a multiple of
/// [`BLOCK_MINUTES`] and whose second is [`TARGET_SECOND`].
pub fn next_run_after(now: NaiveDateTime) -> NaiveDateTime {
    let into_block = TimeDelta::minutes(i64::from(now.minute() % BLOCK_MINUTES))
        + TimeDelta::seconds(i64::from(now.second()))
        + TimeDelta::nanoseconds(i64::from(now.nanosecond()));
    let target = now - into_block + TimeDelta::seconds(i64::from(TARGET_SECOND));

    if target <= now {
        target + TimeDelta::minutes(i64::from(BLOCK_MINUTES))
    } else {
        target
    }
}

/// Runs a job immediately and then on every clock boundary until a message
/// (or hang-up) arrives on the shutdown channel.
///
/// The next boundary is derived from the wall clock each time, so a slow
/// cycle never shifts the ones after it.
pub struct Scheduler {
    shutdown: Receiver<()>,
    clock: fn() -> NaiveDateTime,
}

fn local_now() -> NaiveDateTime {
    Local::now().naive_local()
}

impl Scheduler {
    pub fn new(shutdown: Receiver<()>) -> Self {
        Self::with_clock(shutdown, local_now)
    }

    pub fn with_clock(shutdown: Receiver<()>, clock: fn() -> NaiveDateTime) -> Self {
        Self { shutdown, clock }
    }

    /// Sleeps until the next boundary. Returns `false` when interrupted.
    pub fn wait_for_next_run(&self) -> bool {
        let now = (self.clock)();
        let target = next_run_after(now);
        let sleep = (target - now).to_std().unwrap_or(Duration::ZERO);
        info!(
            "Next run scheduled at {} (sleeping {}s).",
            target.format("%H:%M:%S"),
            sleep.as_secs()
        );

        match self.shutdown.recv_timeout(sleep) {
            Err(RecvTimeoutError::Timeout) => true,
            Ok(()) | Err(RecvTimeoutError::Disconnected) => false,
        }
    }

    pub fn run<F: FnMut()>(&self, mut job: F) {
        job();
        while self.wait_for_next_run() {
            job();
        }
        info!("Stopping scheduler");
    }
}
