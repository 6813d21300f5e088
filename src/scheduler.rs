//! Generic background-work scheduler, in the style of the source project's
//! own `scheduler.rs`: a thin trait over `std::thread::spawn` so that
//! [`crate::sender::ClockSender`]'s tick-generation loop isn't hard-wired to
//! a specific threading strategy.

use std::thread;

pub trait Scheduler: Send + Sync {
    fn spawn(&self, f: Box<dyn FnOnce() + Send + 'static>);
}

#[derive(Default)]
pub struct ThreadScheduler;

impl ThreadScheduler {
    pub fn new() -> Self {
        ThreadScheduler
    }
}

impl Scheduler for ThreadScheduler {
    fn spawn(&self, f: Box<dyn FnOnce() + Send + 'static>) {
        let _ = thread::spawn(f);
    }
}
