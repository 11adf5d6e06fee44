//! Resource and connectivity monitor.
//!
//! Tracks the host signals (network, app lifecycle, memory pressure, caller
//! pause) and turns each change into a [`Directive`] the scheduler engine
//! applies. Pause sources compose: admission is suspended while *any* of them
//! is active. Only network loss aborts in-flight work.

use serde::{Deserialize, Serialize};

/// App lifecycle reported by the host.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AppLifecycle {
    Foreground,
    Background,
}

/// What the engine must do after a signal. Admission re-runs after every
/// signal regardless.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Directive {
    Continue,
    /// Abort every active transfer (network lost).
    AbortActive,
}

#[derive(Debug, Clone)]
pub struct ResourceMonitor {
    configured_concurrency: usize,
    pressure_concurrency: usize,
    max_concurrency: usize,
    memory_optimized: bool,
    user_paused: bool,
    backgrounded: bool,
    network_suspended: bool,
}

impl ResourceMonitor {
    pub fn new(max_concurrency: usize, pressure_concurrency: usize) -> Self {
        let configured = max_concurrency.max(1);
        Self {
            configured_concurrency: configured,
            pressure_concurrency: pressure_concurrency.max(1),
            max_concurrency: configured,
            memory_optimized: false,
            user_paused: false,
            backgrounded: false,
            network_suspended: false,
        }
    }

    pub fn max_concurrency(&self) -> usize {
        self.max_concurrency
    }

    /// Cap in force under memory pressure: never above the configured cap.
    fn reduced_concurrency(&self) -> usize {
        self.pressure_concurrency.min(self.configured_concurrency)
    }

    pub fn is_memory_optimized(&self) -> bool {
        self.memory_optimized
    }

    pub fn is_network_suspended(&self) -> bool {
        self.network_suspended
    }

    /// True if any pause source is active.
    pub fn is_paused(&self) -> bool {
        self.user_paused || self.backgrounded || self.network_suspended
    }

    pub fn on_network_change(&mut self, online: bool) -> Directive {
        match (online, self.network_suspended) {
            (false, false) => {
                self.network_suspended = true;
                tracing::info!("network offline: suspending transfers");
                Directive::AbortActive
            }
            (true, true) => {
                self.network_suspended = false;
                tracing::info!("network online: resuming admission");
                Directive::Continue
            }
            _ => Directive::Continue,
        }
    }

    pub fn on_app_lifecycle_change(&mut self, state: AppLifecycle) -> Directive {
        let background = state == AppLifecycle::Background;
        if background != self.backgrounded {
            self.backgrounded = background;
            tracing::debug!(?state, "app lifecycle changed");
        }
        Directive::Continue
    }

    pub fn on_memory_warning(&mut self) -> Directive {
        self.memory_optimized = true;
        self.max_concurrency = self.reduced_concurrency();
        tracing::info!(
            max_concurrency = self.max_concurrency,
            "memory warning: concurrency reduced"
        );
        // Lowering the cap never evicts.
        Directive::Continue
    }

    /// Lift memory optimisation and go back to the configured cap.
    pub fn restore_concurrency(&mut self) -> Directive {
        if self.memory_optimized {
            self.memory_optimized = false;
            self.max_concurrency = self.configured_concurrency;
            tracing::info!(
                max_concurrency = self.max_concurrency,
                "memory pressure cleared: concurrency restored"
            );
        }
        Directive::Continue
    }

    /// Change the configured cap. While memory optimised, the reduced cap stays
    /// in force until [`restore_concurrency`](Self::restore_concurrency).
    pub fn set_max_concurrency(&mut self, n: usize) -> Directive {
        self.configured_concurrency = n.max(1);
        self.max_concurrency = if self.memory_optimized {
            self.reduced_concurrency()
        } else {
            self.configured_concurrency
        };
        Directive::Continue
    }

    pub fn set_user_paused(&mut self, paused: bool) -> Directive {
        self.user_paused = paused;
        Directive::Continue
    }
}
