//! The Dispatcher's background task (C5): a dedicated OS thread selecting
//! over the station's trigger channel and two `crossbeam_channel::tick`
//! timers, grounded in the same "single task, event channel plus a
//! periodic safety net" shape the teacher documents on
//! `ev_core::dispatcher`, just run on its own thread instead of as an
//! async task since `crossbeam_channel::select!` blocks.

use std::sync::Arc;
use std::time::{Duration, Instant};

use crossbeam_channel::{bounded, select};
use ev_core::dispatcher::DispatchTrigger;
use ev_core::station::Station;
use tracing::info;

const PROGRESS_TICK: Duration = Duration::from_secs(1);

pub fn spawn(station: Arc<Station>, dispatch_tick: Duration) -> std::thread::JoinHandle<()> {
    let (tx, rx) = bounded::<DispatchTrigger>(64);
    station.attach_trigger_sender(tx);

    std::thread::spawn(move || {
        let dispatch_ticker = crossbeam_channel::tick(dispatch_tick);
        let progress_ticker = crossbeam_channel::tick(PROGRESS_TICK);
        let mut last_progress = Instant::now();

        info!(?dispatch_tick, "dispatch loop started");
        loop {
            select! {
                recv(rx) -> trigger => {
                    if trigger.is_err() {
                        break;
                    }
                    // Coalesce anything else queued before running a pass.
                    while rx.try_recv().is_ok() {}
                    station.run_dispatch_pass();
                }
                recv(dispatch_ticker) -> _ => {
                    station.run_dispatch_pass();
                }
                recv(progress_ticker) -> _ => {
                    let elapsed = last_progress.elapsed().as_secs_f64();
                    last_progress = Instant::now();
                    station.tick_progress_all(elapsed);
                }
            }
        }
        info!("dispatch loop stopped");
    })
}
