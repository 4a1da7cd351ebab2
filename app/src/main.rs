#![no_main]
#![no_std]

// Licensed under the Apache License, Version 2.0
// Copyright 2024 Anton Khrustalev, creapunk.com

//! Firmware binary: binds the quadrature decoder's phase-A edge interrupt,
//! the `pollPeriod` timer tick, and the operator console's serial RX to
//! `tachocore::Tachomotor`'s entry points. All control logic lives in
//! `tachocore`; this crate only wires hardware events to it (RTIC 2 tasks),
//! per the "external collaborators" split in spec §1/§6.

use defmt_rtt as _;
use panic_probe as _;

use hal::{
    clocks::Clocks,
    gpio::{Edge, Pin, Pull},
    pac,
    pac::USART1,
    timer::Timer,
    usart::{Usart, UsartConfig, UsartInterrupt},
};

use tachocore::console::{Console, REFRESH_PERIOD_US};
use tachocore::tachomotor::POLL_PERIOD_US;
use tachocore::{HBridge, QuadratureDecoder, Tachomotor};
use tachocore_drivers::{
    clock::CycleCounterClock,
    gpio::{self, Channel, EncoderInputPin, HBridgePwmPin},
    pinout,
    ticker::TimerTicker,
};

type Motor = Tachomotor<EncoderInputPin, EncoderInputPin, HBridgePwmPin, HBridgePwmPin, TimerTicker>;

#[rtic::app(device = pac, peripherals = true)]
mod app {
    use super::*;

    #[shared]
    struct Shared {
        motor: Motor,
        console: Console,
        uart: Usart<USART1>,
    }

    #[local]
    struct Local {
        phase_a_pin: Pin,
        edge_clock: CycleCounterClock,
        tick_clock: CycleCounterClock,
        console_clock: CycleCounterClock,
        console_tick_counter: u32,
    }

    #[init]
    fn init(ctx: init::Context) -> (Shared, Local) {
        let mut cp = ctx.core;
        let dp = ctx.device;

        // `CycleCounterClock` reads DWT->CYCCNT; arm it before anyone calls
        // `now_us()`, or every timestamp it hands out reads a counter that
        // never moves.
        cp.DCB.enable_trace();
        cortex_m::peripheral::DWT::unlock();
        cp.DWT.enable_cycle_counter();

        let clock_cfg = Clocks::default();
        clock_cfg.setup().unwrap();
        let sysclk_hz = clock_cfg.sysclk();
        defmt::info!("system clock: {} Hz", sysclk_hz);
        let clock = CycleCounterClock::new(sysclk_hz);

        // Quadrature encoder: phase A is the sole EXTI-capable clock pin
        // (see pinout::ENCODER_PHASE_A's doc comment); phase B is level
        // read only and never interrupts. The EXTI task needs its own `Pin`
        // handle to clear the interrupt and read the edge level; the
        // decoder gets a second handle from the same `PinDef` for the level
        // reads `reset_position()` needs, rather than reconstructing one
        // from the first handle's (nonexistent) accessor methods.
        let mut phase_a_pin = pinout::ENCODER_PHASE_A.init();
        let decoder_phase_a_pin = pinout::ENCODER_PHASE_A.init();
        let phase_b_pin = pinout::ENCODER_PHASE_B.init();
        phase_a_pin.pull(Pull::None); // some encoders load this line via an
                                      // identifying resistor; don't fight it
        phase_a_pin.enable_interrupt(Edge::Both);

        let decoder = QuadratureDecoder::new(
            EncoderInputPin::new(decoder_phase_a_pin),
            EncoderInputPin::new(phase_b_pin),
        );

        // H-bridge: forward/reverse PWM on TIM2 channels 1/2.
        let mut pwm_timer = Timer::new_tim2(dp.TIM2, 10_000.0, Default::default(), &clock_cfg);
        pwm_timer.enable();
        gpio::install_hbridge_timer(pwm_timer);

        let forward_pin = HBridgePwmPin::new(pinout::HBRIDGE_FORWARD.init(), Channel::Forward);
        let reverse_pin = HBridgePwmPin::new(pinout::HBRIDGE_REVERSE.init(), Channel::Reverse);
        let bridge = HBridge::new(forward_pin, reverse_pin, 100);

        // pollPeriod ticker: TIM6 in update-interrupt mode, armed/disarmed
        // by Tachomotor::enter/sleep via attach_us/detach.
        let tick_timer = Timer::new_tim6(dp.TIM6, 500.0, Default::default(), &clock_cfg);
        let ticker = TimerTicker::new(tick_timer);

        let motor = Tachomotor::new(decoder, bridge, ticker);

        // Operator console over USART1, refreshed at ~20 Hz from the
        // pollPeriod tick (see `pid_tick` below). Key presses arrive via
        // the read-not-empty interrupt, dispatched to `console_rx`.
        let mut uart = Usart::new(dp.USART1, 115_200, UsartConfig::default(), &clock_cfg);
        uart.enable_interrupt(UsartInterrupt::ReadNotEmpty);

        (
            Shared {
                motor,
                console: Console::new(),
                uart,
            },
            Local {
                phase_a_pin,
                edge_clock: clock,
                tick_clock: clock,
                console_clock: clock,
                console_tick_counter: 0,
            },
        )
    }

    /// Phase-A edge ISR: the hard real-time path described in spec §4.2.
    /// Reads the new level directly off the EXTI-triggering pin and
    /// forwards it, with a fresh timestamp, to the decoder.
    #[task(binds = EXTI9_5, shared = [motor], local = [phase_a_pin, edge_clock])]
    fn phase_a_edge(mut ctx: phase_a_edge::Context) {
        ctx.local.phase_a_pin.clear_interrupt();
        let new_level = ctx.local.phase_a_pin.is_high();
        let timestamp_us = ctx.local.edge_clock.now_us();
        ctx.shared.motor.lock(|motor| {
            motor.on_phase_a_edge(new_level, timestamp_us);
        });
    }

    /// `pollPeriod` tick (2 ms): runs `pid_tick`, then refreshes the
    /// console readout every `REFRESH_PERIOD_US / pollPeriod` ticks
    /// (roughly 20 Hz, matching the original's `wait_ms(49)` loop).
    #[task(
        binds = TIM6_DAC,
        shared = [motor, console, uart],
        local = [tick_clock, console_tick_counter]
    )]
    fn pid_tick(ctx: pid_tick::Context) {
        let now_us = ctx.local.tick_clock.now_us();
        let pid_tick::SharedResources { mut motor, mut console, mut uart } = ctx.shared;

        motor.lock(|motor| motor.pid_tick(now_us));

        *ctx.local.console_tick_counter += POLL_PERIOD_US;
        if *ctx.local.console_tick_counter >= REFRESH_PERIOD_US {
            *ctx.local.console_tick_counter = 0;
            let mut line = heapless::String::<256>::new();
            let rendered = (&mut motor, &mut console).lock(|motor, console| console.render(&mut line, motor).is_ok());
            if rendered {
                uart.lock(|uart| {
                    let _ = uart.write(line.as_bytes());
                });
            }
        }
    }

    /// Serial RX: one key per interrupt, dispatched straight into the
    /// console (presets on `0`-`9`, PID gain nudges on `p`/`i`/`d`).
    #[task(binds = USART1, shared = [motor, console, uart], local = [console_clock])]
    fn console_rx(ctx: console_rx::Context) {
        let console_rx::SharedResources { mut motor, mut console, mut uart } = ctx.shared;
        let mut byte = [0u8; 1];
        let received = uart.lock(|uart| {
            uart.clear_interrupt(UsartInterrupt::ReadNotEmpty);
            uart.read(&mut byte).is_ok()
        });
        if received {
            let clock = *ctx.local.console_clock;
            (&mut motor, &mut console).lock(|motor, console| {
                console.handle_key(byte[0], motor, &clock);
            });
        }
    }
}
