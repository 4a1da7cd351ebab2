// `PeriodicTicker` backed by a free-running `stm32-hal2` timer in update-
// interrupt mode. `attach_us`/`detach` only arm or disarm the timer; the
// firmware binds the timer's update-interrupt vector to a task that calls
// `Tachomotor::pid_tick` (see `app`'s RTIC wiring).
//
// Licensed under the Apache License, Version 2.0
// Copyright 2024 Anton Khrustalev, creapunk.com

use hal::{
    pac::TIM6,
    timer::{Timer, TimerInterrupt},
};
use tachocore::PeriodicTicker;

/// Wraps the hardware timer used to drive `Tachomotor::pid_tick`.
pub struct TimerTicker {
    timer: Timer<TIM6>,
}

impl TimerTicker {
    pub fn new(timer: Timer<TIM6>) -> Self {
        Self { timer }
    }
}

impl PeriodicTicker for TimerTicker {
    fn attach_us(&mut self, period_us: u32) {
        self.timer.disable();
        self.timer.set_period_us(period_us);
        self.timer.reset_count();
        self.timer.enable_interrupt(TimerInterrupt::Update);
        self.timer.enable();
    }

    fn detach(&mut self) {
        self.timer.disable();
        self.timer.disable_interrupt(TimerInterrupt::Update);
    }
}
