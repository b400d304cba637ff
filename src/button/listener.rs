//! Dedicated OS-thread button listener using `rdev::listen`.
//!
//! # Shutdown caveat
//!
//! `rdev::listen` has **no graceful shutdown API**.  Dropping the
//! [`ButtonListener`] sets a stop flag so no further events reach the
//! handler, but the OS thread stays blocked in the rdev event loop until the
//! process exits.

use std::sync::{
    atomic::{AtomicBool, Ordering},
    Arc,
};

use super::ButtonEvent;

// ---------------------------------------------------------------------------
// ButtonListener
// ---------------------------------------------------------------------------

/// Handle to a running listener thread.  Drop it to stop forwarding events.
pub struct ButtonListener {
    stop: Arc<AtomicBool>,
    _thread: std::thread::JoinHandle<()>,
}

impl ButtonListener {
    /// Spawn the listener thread and call `handler` for every edge of `key`.
    ///
    /// The handler runs on the listener thread, so it must return quickly;
    /// long work belongs on a worker thread.
    ///
    /// # Errors
    ///
    /// Fails only if the OS refuses to create the thread.
    pub fn start<F>(key: rdev::Key, handler: F) -> std::io::Result<Self>
    where
        F: Fn(ButtonEvent) + Send + 'static,
    {
        let stop = Arc::new(AtomicBool::new(false));
        let stop_clone = Arc::clone(&stop);

        let thread = std::thread::Builder::new()
            .name("button-listener".into())
            .spawn(move || {
                let mut filter = EdgeFilter::default();
                let result = rdev::listen(move |event| {
                    if stop_clone.load(Ordering::Relaxed) {
                        return;
                    }

                    let edge = match event.event_type {
                        rdev::EventType::KeyPress(k) if k == key => ButtonEvent::Pressed,
                        rdev::EventType::KeyRelease(k) if k == key => ButtonEvent::Released,
                        _ => return,
                    };
                    if filter.accept(edge) {
                        handler(edge);
                    }
                });

                if let Err(e) = result {
                    log::error!("button: rdev::listen exited with error: {e:?}");
                }
            })?;

        Ok(Self {
            stop,
            _thread: thread,
        })
    }
}

impl Drop for ButtonListener {
    fn drop(&mut self) {
        self.stop.store(true, Ordering::Relaxed);
    }
}

// ---------------------------------------------------------------------------
// EdgeFilter
// ---------------------------------------------------------------------------

/// Drops key auto-repeat: a press only counts after a release.
#[derive(Debug, Default)]
struct EdgeFilter {
    held: bool,
}

impl EdgeFilter {
    fn accept(&mut self, edge: ButtonEvent) -> bool {
        match edge {
            ButtonEvent::Pressed if self.held => false,
            ButtonEvent::Pressed => {
                self.held = true;
                true
            }
            ButtonEvent::Released => {
                let was_held = self.held;
                self.held = false;
                was_held
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn auto_repeat_presses_are_collapsed() {
        let mut f = EdgeFilter::default();
        assert!(f.accept(ButtonEvent::Pressed));
        assert!(!f.accept(ButtonEvent::Pressed));
        assert!(!f.accept(ButtonEvent::Pressed));
        assert!(f.accept(ButtonEvent::Released));
        assert!(f.accept(ButtonEvent::Pressed));
    }

    #[test]
    fn stray_release_is_ignored() {
        let mut f = EdgeFilter::default();
        assert!(!f.accept(ButtonEvent::Released));
    }
}
