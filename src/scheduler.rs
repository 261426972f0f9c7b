//! Periodic task scheduler.
//!
//! The control loop ticks much faster than any of its periodic jobs.  The
//! scheduler owns one interval timer per job and reports which are due on
//! each tick; the [`AppService`](crate::app::service::AppService) runs them
//! in a fixed order.
//!
//! ```text
//! ┌──────────────────────────────────────────────────────────────┐
//! │                     Periodic tasks                           │
//! │                                                              │
//! │  ┌───────────┐  ┌───────────┐  ┌───────────┐  ┌──────────┐   │
//! │  │ Sensor    │  │ Control   │  │ Data      │  │ Heart-   │   │
//! │  │ read      │  │ sample    │  │ publish   │  │ beat     │   │
//! │  └─────┬─────┘  └─────┬─────┘  └─────┬─────┘  └─────┬────┘   │
//! │        │              │              │              │        │
//! │        ▼              ▼              ▼              ▼        │
//! │  ┌────────────────────────────────────────────────────────┐  │
//! │  │              Scheduler::poll(now) → DueTasks           │  │
//! │  └───────────────────────┬────────────────────────────────┘  │
//! │                          ▼                                   │
//! │                    AppService.tick()                         │
//! └──────────────────────────────────────────────────────────────┘
//! ```
//!
//! A task that has never run is due immediately, so the first tick after
//! boot already has sensor data.  A late tick fires a task once; missed
//! periods are not replayed.

use log::debug;

use crate::config::SystemConfig;
use crate::time::{Millis, secs_to_ms};

// ═══════════════════════════════════════════════════════════════
//  Task identity
// ═══════════════════════════════════════════════════════════════

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Task {
    SensorRead,
    ControlSample,
    DataPublish,
    Heartbeat,
}

impl Task {
    pub const COUNT: usize = 4;

    pub const ALL: [Task; Self::COUNT] = [
        Task::SensorRead,
        Task::ControlSample,
        Task::DataPublish,
        Task::Heartbeat,
    ];

    pub const fn name(self) -> &'static str {
        match self {
            Self::SensorRead => "sensor_read",
            Self::ControlSample => "control_sample",
            Self::DataPublish => "data_publish",
            Self::Heartbeat => "heartbeat",
        }
    }
}

/// Which tasks fired on one [`Scheduler::poll`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DueTasks {
    pub sensor_read: bool,
    pub control_sample: bool,
    pub data_publish: bool,
    pub heartbeat: bool,
}

impl DueTasks {
    pub fn any(&self) -> bool {
        self.sensor_read || self.control_sample || self.data_publish || self.heartbeat
    }

    fn set(&mut self, task: Task) {
        match task {
            Task::SensorRead => self.sensor_read = true,
            Task::ControlSample => self.control_sample = true,
            Task::DataPublish => self.data_publish = true,
            Task::Heartbeat => self.heartbeat = true,
        }
    }
}

// ═══════════════════════════════════════════════════════════════
//  Scheduler engine
// ═══════════════════════════════════════════════════════════════

#[derive(Debug, Clone, Copy)]
struct Timer {
    interval_ms: u32,
    /// `None` until the first run.
    last_fired: Option<Millis>,
}

pub struct Scheduler {
    timers: [Timer; Task::COUNT],
}

impl Scheduler {
    pub fn new(config: &SystemConfig) -> Self {
        let mut sched = Self {
            timers: [Timer {
                interval_ms: 0,
                last_fired: None,
            }; Task::COUNT],
        };
        sched.set_intervals(config);
        sched
    }

    /// Pick up interval changes from a new configuration.  Elapsed time
    /// carries over, so a shorter interval may fire on the next poll.
    pub fn set_intervals(&mut self, config: &SystemConfig) {
        for task in Task::ALL {
            let interval_ms = match task {
                Task::SensorRead => config.timing.sensor_read_interval_ms,
                Task::ControlSample => secs_to_ms(config.control.sampling_secs),
                Task::DataPublish => config.timing.data_interval_ms,
                Task::Heartbeat => config.timing.heartbeat_interval_ms,
            };
            let timer = &mut self.timers[task as usize];
            if timer.interval_ms != interval_ms {
                debug!("Scheduler: {} every {} ms", task.name(), interval_ms);
                timer.interval_ms = interval_ms;
            }
        }
    }

    /// Report and re-arm every task whose interval has elapsed.
    pub fn poll(&mut self, now: Millis) -> DueTasks {
        let mut due = DueTasks::default();
        for task in Task::ALL {
            let timer = &mut self.timers[task as usize];
            let fire = timer
                .last_fired
                .is_none_or(|last| now.has_elapsed(last, timer.interval_ms));
            if fire {
                timer.last_fired = Some(now);
                due.set(task);
            }
        }
        due
    }
}

// ═══════════════════════════════════════════════════════════════
//  Tests
// ═══════════════════════════════════════════════════════════════
