//! Bare-metal x86_64 port: PIC8259 timer IRQ, RFLAGS.IF masking and COM1 logging.
//!
//! Remaps IRQ 0-15 to interrupt vectors 32-47 to avoid conflicts with CPU
//! exception vectors (0-31). The integrator registers [`timer_handler`] at
//! [`InterruptIndex::Timer`] in its IDT and supplies the switch routine.

use core::fmt::Write;

use lazy_static::lazy_static;
use log::{LevelFilter, Log, Metadata, Record};
use pic8259::ChainedPics;
use spin::Mutex;
use uart_16550::SerialPort;
use x86_64::instructions::interrupts;
use x86_64::structures::idt::InterruptStackFrame;

use super::{KernelCell, PortHooks, SwitchHook};

/// PIC1 starts at vector 32 (right after CPU exceptions 0-31).
pub const PIC_1_OFFSET: u8 = 32;
/// PIC2 starts at vector 40.
pub const PIC_2_OFFSET: u8 = PIC_1_OFFSET + 8;

/// Hardware interrupt vector indices.
#[derive(Debug, Clone, Copy)]
#[repr(u8)]
pub enum InterruptIndex {
    Timer = PIC_1_OFFSET, // IRQ0 → vector 32
}

impl InterruptIndex {
    pub fn as_u8(self) -> u8 {
        self as u8
    }

    pub fn as_usize(self) -> usize {
        usize::from(self.as_u8())
    }
}

pub static PICS: Mutex<ChainedPics> =
    Mutex::new(unsafe { ChainedPics::new(PIC_1_OFFSET, PIC_2_OFFSET) });

/// The kernel driven by the timer interrupt.
pub static KERNEL: KernelCell = KernelCell::new();

fn mask() -> bool {
    let was_enabled = interrupts::are_enabled();
    interrupts::disable();
    was_enabled
}

fn restore(was_enabled: bool) {
    if was_enabled {
        interrupts::enable();
    }
}

/// Port hooks masking all maskable interrupts around critical sections.
pub fn hooks(switch_context: SwitchHook) -> PortHooks {
    PortHooks::new(switch_context).with_critical(mask, restore)
}

/// Initialize the 8259 PIC.
pub fn init_pic() {
    unsafe {
        PICS.lock().initialize();
    }
}

/// Timer interrupt handler (IRQ0, vector 32).
pub extern "x86-interrupt" fn timer_handler(_stack_frame: InterruptStackFrame) {
    // Send EOI directly via port I/O to avoid locking PICS mutex. It goes
    // out first because the dispatch below may not return to this frame.
    unsafe {
        x86_64::instructions::port::Port::<u8>::new(0x20).write(0x20);
    }

    KERNEL.tick_and_dispatch();
}

// ─── Serial logger ───────────────────────────────────────────────

lazy_static! {
    static ref SERIAL1: Mutex<SerialPort> = {
        let mut serial_port = unsafe { SerialPort::new(0x3F8) };
        serial_port.init();
        Mutex::new(serial_port)
    };
}

struct SerialLogger;

static LOGGER: SerialLogger = SerialLogger;

impl Log for SerialLogger {
    fn enabled(&self, _metadata: &Metadata) -> bool {
        true
    }

    fn log(&self, record: &Record) {
        // Mask interrupts while holding the serial lock so a tick that
        // logs cannot deadlock against task code mid-print.
        interrupts::without_interrupts(|| {
            let _ = writeln!(SERIAL1.lock(), "{:5} {}", record.level(), record.args());
        });
    }

    fn flush(&self) {}
}

/// Route `log` output to COM1 (QEMU console).
pub fn init_logger(level: LevelFilter) {
    if log::set_logger(&LOGGER).is_ok() {
        log::set_max_level(level);
    }
}
