// `DigitalPin` implementations over `stm32-hal2` GPIO: a plain input for
// the encoder's phase pins, and a PWM-capable output for the H-bridge's
// forward/reverse lines.
//
// Licensed under the Apache License, Version 2.0
// Copyright 2024 Anton Khrustalev, creapunk.com

use core::cell::RefCell;

use cortex_m::interrupt::Mutex as CortexMutex;
use hal::{
    gpio::Pin,
    pac::TIM2,
    timer::{OutputCompare, TimChannel, Timer},
};
use tachocore::DigitalPin;

/// Phase A/B of the quadrature encoder: a bare digital input. `set_digital`
/// and `set_analog*` are no-ops, since the decoder only ever reads these
/// pins (see `tachocore::quadrature`); they still satisfy `DigitalPin`
/// because the spec's pin primitive (§6) is bidirectional by convention.
pub struct EncoderInputPin {
    pin: Pin,
}

impl EncoderInputPin {
    pub fn new(pin: Pin) -> Self {
        Self { pin }
    }
}

impl DigitalPin for EncoderInputPin {
    fn set_digital(&mut self, _high: bool) {}

    fn get_digital(&self) -> bool {
        self.pin.is_high()
    }

    fn set_analog(&mut self, _raw_duty: u16) {}

    fn set_analog_period_us(&mut self, _period_us: u32) {}
}

/// Which `TIM2` output-compare channel a `HBridgePwmPin` drives.
#[derive(Clone, Copy)]
pub enum Channel {
    Forward,
    Reverse,
}

impl Channel {
    fn tim_channel(self) -> TimChannel {
        match self {
            Channel::Forward => TimChannel::C1,
            Channel::Reverse => TimChannel::C2,
        }
    }
}

/// Shared handle to the H-bridge's PWM timer. Both `HBridgePwmPin`s (fwd
/// and rev) drive channels of the same `TIM2`, so the timer is held behind
/// a `critical_section`-guarded cell rather than split per-pin — mirroring
/// how the teacher's `TimPWM` owns the whole timer and hands out channel
/// access, just generalized to two channels instead of four.
pub static HBRIDGE_TIMER: CortexMutex<RefCell<Option<Timer<TIM2>>>> =
    CortexMutex::new(RefCell::new(None));

/// Installs the shared H-bridge PWM timer. Call once during board
/// bring-up before constructing any `HBridgePwmPin`.
pub fn install_hbridge_timer(timer: Timer<TIM2>) {
    cortex_m::interrupt::free(|cs| {
        *HBRIDGE_TIMER.borrow(cs).borrow_mut() = Some(timer);
    });
}

/// One line (forward or reverse) of the H-bridge. PWMs via the shared
/// `TIM2` channel while running; at saturation (`set_digital`) the pin is
/// pulled out of alternate-function mode and driven statically, matching
/// `HBridge::power_fast_decay`/`power_slow_decay`'s saturation behavior.
pub struct HBridgePwmPin {
    pin: Pin,
    channel: Channel,
}

impl HBridgePwmPin {
    pub fn new(pin: Pin, channel: Channel) -> Self {
        Self { pin, channel }
    }
}

impl DigitalPin for HBridgePwmPin {
    fn set_digital(&mut self, high: bool) {
        if high {
            self.pin.set_high();
        } else {
            self.pin.set_low();
        }
    }

    fn get_digital(&self) -> bool {
        self.pin.is_high()
    }

    fn set_analog(&mut self, raw_duty: u16) {
        let channel = self.channel.tim_channel();
        cortex_m::interrupt::free(|cs| {
            if let Some(timer) = HBRIDGE_TIMER.borrow(cs).borrow_mut().as_mut() {
                let period = timer.get_max_duty();
                let duty = (raw_duty as u32 * period) >> 16;
                timer.enable_pwm_output(channel, OutputCompare::Pwm1, 0.0);
                timer.set_duty(channel, duty);
            }
        });
    }

    fn set_analog_period_us(&mut self, period_us: u32) {
        cortex_m::interrupt::free(|cs| {
            if let Some(timer) = HBRIDGE_TIMER.borrow(cs).borrow_mut().as_mut() {
                timer.set_period_us(period_us);
            }
        });
    }
}
