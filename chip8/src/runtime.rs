//! Threaded driver that runs a VM against its IO devices.
use std::{
    sync::{
        atomic::{AtomicBool, Ordering},
        mpsc::{self, Receiver, RecvTimeoutError, SyncSender},
        Arc, Mutex,
    },
    thread,
    time::Duration,
};

use crate::{
    clock::Clock,
    cpu::CpuState,
    devices::{Debugger, Display, KeyCode},
    error::{Chip8Error, Chip8Result},
    vm::{Chip8Vm, Flow},
};

/// Interval at which a paused execution loop re-checks its flags.
const PAUSE_POLL_INTERVAL: Duration = Duration::from_millis(10);

/// Interval at which a machine stalled on a key wait checks the keypad.
const KEY_POLL_INTERVAL: Duration = Duration::from_millis(2);

/// Flags shared between the execution loop and its controllers.
struct Shared {
    debug: AtomicBool,
    stop: AtomicBool,
}

/// Owns a VM and runs it on the calling thread, with the 60Hz timers on a
/// second thread.
///
/// ```no_run
/// # use chip8vm::prelude::*;
/// struct Headless;
///
/// impl Display for Headless {
///     fn draw(&mut self, _display: &Framebuffer) {}
/// }
///
/// let mut vm = Chip8Vm::new(Chip8Conf::default());
/// vm.load_program(&[0x12, 0x00]).unwrap();
///
/// let runtime = Runtime::new(vm);
/// let controller = runtime.controller();
/// std::thread::spawn(move || controller.stop());
/// runtime.run(&mut Headless, None).unwrap();
/// ```
pub struct Runtime {
    vm: Arc<Mutex<Chip8Vm>>,
    shared: Arc<Shared>,
    step_tx: SyncSender<()>,
    step_rx: Receiver<()>,
}

impl Runtime {
    pub fn new(vm: Chip8Vm) -> Self {
        let debug = vm.config().debug;
        // Zero capacity, so a step request only completes when the loop takes it.
        let (step_tx, step_rx) = mpsc::sync_channel(0);

        Self {
            vm: Arc::new(Mutex::new(vm)),
            shared: Arc::new(Shared {
                debug: AtomicBool::new(debug),
                stop: AtomicBool::new(false),
            }),
            step_tx,
            step_rx,
        }
    }

    /// Handle to the machine, for inspection after or during the run.
    pub fn vm(&self) -> Arc<Mutex<Chip8Vm>> {
        self.vm.clone()
    }

    /// Create a handle for controlling the execution loop from other threads.
    pub fn controller(&self) -> Controller {
        Controller {
            vm: self.vm.clone(),
            shared: self.shared.clone(),
            step_tx: self.step_tx.clone(),
        }
    }

    /// Run the machine until it's stopped, the display closes, or a fault occurs.
    ///
    /// The display receives the blank screen first, then one frame for every
    /// executed draw or clear, in execution order. The debugger, when given,
    /// receives a snapshot after every executed cycle.
    pub fn run(
        self,
        display: &mut impl Display,
        mut debugger: Option<&mut dyn Debugger>,
    ) -> Chip8Result<()> {
        let Runtime {
            vm,
            shared,
            step_tx: _step_tx,
            step_rx,
        } = self;

        let (interval, frame) = {
            let vm = vm.lock()?;
            let interval = vm.config().clock_frequency.map(Duration::from);
            (interval.unwrap_or_default(), *vm.display_buffer())
        };
        display.draw(&frame);
        log::info!("runtime started");

        let result = thread::scope(|scope| {
            let timers = scope.spawn(|| run_timers(&vm, &shared));

            let result = run_cycles(&vm, &shared, &step_rx, interval, display, &mut debugger);
            shared.stop.store(true, Ordering::SeqCst);

            let timers_result = timers.join().unwrap_or_else(|_| {
                log::error!("timer thread panicked");
                Err(Chip8Error::ThreadPanicked)
            });
            result.and(timers_result)
        });

        match &result {
            Ok(()) => log::info!("runtime stopped"),
            Err(err) => log::error!("runtime stopped: {err}"),
        }

        result
    }
}

fn run_timers(vm: &Mutex<Chip8Vm>, shared: &Shared) -> Chip8Result<()> {
    let mut clock = Clock::timer();

    while !shared.stop.load(Ordering::SeqCst) {
        clock.wait();
        vm.lock()?.tick_timers();
    }

    Ok(())
}

fn run_cycles(
    vm: &Mutex<Chip8Vm>,
    shared: &Shared,
    step_rx: &Receiver<()>,
    interval: Duration,
    display: &mut impl Display,
    debugger: &mut Option<&mut dyn Debugger>,
) -> Chip8Result<()> {
    let mut clock = Clock::new(interval);

    loop {
        if shared.stop.load(Ordering::SeqCst) || display.is_closing() {
            return Ok(());
        }

        if shared.debug.load(Ordering::SeqCst) {
            match step_rx.recv_timeout(PAUSE_POLL_INTERVAL) {
                Ok(()) => {}
                // Re-check the stop and debug flags.
                Err(RecvTimeoutError::Timeout) => continue,
                Err(RecvTimeoutError::Disconnected) => return Ok(()),
            }
        } else {
            // Release a step request that raced with debug mode being turned off.
            let _ = step_rx.try_recv();
        }

        // Lock is only held for the duration of one cycle.
        let (flow, executed, frame, snapshot) = {
            let mut vm = vm.lock()?;
            let was_waiting = matches!(vm.state(), CpuState::AwaitingKey { .. });
            let flow = vm.step()?;

            // Polling a key wait doesn't count as a cycle.
            let executed = !was_waiting || flow != Flow::KeyWait;
            let frame = (flow == Flow::Draw).then(|| *vm.display_buffer());
            let snapshot = (executed && debugger.is_some()).then(|| vm.snapshot());
            (flow, executed, frame, snapshot)
        };

        if let Some(frame) = frame {
            display.draw(&frame);
        }

        if let (Some(debugger), Some(snapshot)) = (debugger.as_mut(), snapshot) {
            debugger.update(&snapshot);
        }

        if flow == Flow::KeyWait {
            if executed {
                log::debug!("waiting for key press");
            }
            thread::sleep(KEY_POLL_INTERVAL);
        } else {
            clock.wait();
        }
    }
}

/// Handle for steering a running [`Runtime`] from another thread.
#[derive(Clone)]
pub struct Controller {
    vm: Arc<Mutex<Chip8Vm>>,
    shared: Arc<Shared>,
    step_tx: SyncSender<()>,
}

impl Controller {
    /// Execute one cycle while in debug mode.
    ///
    /// Blocks until the execution loop takes the request. Returns `false`
    /// without stepping when debug mode is off, and when the runtime exits
    /// before taking the request.
    pub fn step(&self) -> bool {
        if !self.is_debug() || self.is_stopped() {
            return false;
        }

        // Fails once the execution loop has exited and dropped the receiver.
        self.step_tx.send(()).is_ok()
    }

    pub fn is_debug(&self) -> bool {
        self.shared.debug.load(Ordering::SeqCst)
    }

    /// Flip debug mode, returning the new state.
    pub fn toggle_debug(&self) -> bool {
        let debug = !self.shared.debug.fetch_xor(true, Ordering::SeqCst);
        self.on_debug_changed(debug);
        debug
    }

    pub fn set_debug(&self, debug: bool) {
        if self.shared.debug.swap(debug, Ordering::SeqCst) != debug {
            self.on_debug_changed(debug);
        }
    }

    fn on_debug_changed(&self, debug: bool) {
        log::info!("debug mode {}", if debug { "on" } else { "off" });

        if !debug {
            // Wake a paused loop early.
            let _ = self.step_tx.try_send(());
        }
    }

    pub fn set_key(&self, key: KeyCode, pressed: bool) -> Chip8Result<()> {
        self.vm.lock()?.set_key(key, pressed);
        Ok(())
    }

    /// Ask the execution loop to exit after the current cycle.
    pub fn stop(&self) {
        if !self.shared.stop.swap(true, Ordering::SeqCst) {
            log::info!("stop requested");
        }
    }

    pub fn is_stopped(&self) -> bool {
        self.shared.stop.load(Ordering::SeqCst)
    }
}
