//! GDT and TSS initialization.
//!
//! IA-32 flat descriptors are encoded by hand into the classic 8-byte
//! access-byte/flags layout: a `lazy_static!` table plus a `Selectors`
//! struct, an `init()` that loads the GDT and the task register, and
//! `user_code_selector()`/`user_data_selector()` accessors the syscall
//! trampoline and `execute()` use to build a ring-3 `iret` frame.

use core::mem::size_of;

use lazy_static::lazy_static;
use spin::Mutex;

use crate::config::KERNEL_STACK_TOP;

/// Number of entries in the flat GDT: null, kernel code, kernel data, user
/// code, user data, TSS.
const GDT_ENTRY_COUNT: usize = 6;

const KERNEL_CODE_INDEX: usize = 1;
const KERNEL_DATA_INDEX: usize = 2;
const USER_CODE_INDEX: usize = 3;
const USER_DATA_INDEX: usize = 4;
const TSS_INDEX: usize = 5;

/// Requested privilege level 0 (kernel).
const RPL0: u16 = 0;
/// Requested privilege level 3 (user).
const RPL3: u16 = 3;

/// One 8-byte GDT entry in its raw on-the-wire form.
#[derive(Clone, Copy)]
#[repr(C)]
struct GdtEntry {
    limit_low: u16,
    base_low: u16,
    base_mid: u8,
    access: u8,
    limit_high_and_flags: u8,
    base_high: u8,
}

impl GdtEntry {
    const fn null() -> Self {
        Self {
            limit_low: 0,
            base_low: 0,
            base_mid: 0,
            access: 0,
            limit_high_and_flags: 0,
            base_high: 0,
        }
    }

    /// Builds a flat (base 0, limit 4 GiB) segment descriptor.
    ///
    /// `access` carries present/DPL/type; the 4 KiB granularity and 32-bit
    /// default-operand-size flags are fixed for every flat segment this
    /// kernel uses.
    const fn flat(access: u8) -> Self {
        Self {
            limit_low: 0xFFFF,
            base_low: 0,
            base_mid: 0,
            access,
            limit_high_and_flags: 0xC0 | 0x0F, // granularity=4K, 32-bit, limit bits 16..19
            base_high: 0,
        }
    }

    /// Builds a descriptor for a system segment (the TSS) at `base` with the
    /// given byte `limit` and access byte.
    fn system(base: u32, limit: u32, access: u8) -> Self {
        Self {
            limit_low: (limit & 0xFFFF) as u16,
            base_low: (base & 0xFFFF) as u16,
            base_mid: ((base >> 16) & 0xFF) as u8,
            access,
            limit_high_and_flags: ((limit >> 16) & 0x0F) as u8,
            base_high: ((base >> 24) & 0xFF) as u8,
        }
    }
}

/// `lgdt`/`lidt` operand: a 16-bit limit followed by a 32-bit linear base.
#[repr(C, packed)]
pub struct DescriptorTablePointer {
    pub limit: u16,
    pub base: u32,
}

/// The 32-bit hardware Task State Segment. Only `ss0`/`esp0` are live here:
/// the kernel switches tasks in software ([`crate::process::scheduler`]),
/// so the TSS exists solely to give the CPU somewhere to load `SS0:ESP0`
/// from on a ring-3-to-ring-0 privilege transition.
#[derive(Clone, Copy)]
#[repr(C)]
struct TaskStateSegment {
    link: u16,
    _r0: u16,
    esp0: u32,
    ss0: u16,
    _r1: u16,
    esp1: u32,
    ss1: u16,
    _r2: u16,
    esp2: u32,
    ss2: u16,
    _r3: u16,
    cr3: u32,
    eip: u32,
    eflags: u32,
    eax: u32,
    ecx: u32,
    edx: u32,
    ebx: u32,
    esp: u32,
    ebp: u32,
    esi: u32,
    edi: u32,
    es: u16,
    _r4: u16,
    cs: u16,
    _r5: u16,
    ss: u16,
    _r6: u16,
    ds: u16,
    _r7: u16,
    fs: u16,
    _r8: u16,
    gs: u16,
    _r9: u16,
    ldtr: u16,
    _r10: u16,
    _r11: u16,
    iomap_base: u16,
}

impl TaskStateSegment {
    const fn new() -> Self {
        Self {
            link: 0,
            _r0: 0,
            esp0: 0,
            ss0: 0,
            _r1: 0,
            esp1: 0,
            ss1: 0,
            _r2: 0,
            esp2: 0,
            ss2: 0,
            _r3: 0,
            cr3: 0,
            eip: 0,
            eflags: 0,
            eax: 0,
            ecx: 0,
            edx: 0,
            ebx: 0,
            esp: 0,
            ebp: 0,
            esi: 0,
            edi: 0,
            es: 0,
            _r4: 0,
            cs: 0,
            _r5: 0,
            ss: 0,
            _r6: 0,
            ds: 0,
            _r7: 0,
            fs: 0,
            _r8: 0,
            gs: 0,
            _r9: 0,
            ldtr: 0,
            _r10: 0,
            _r11: 0,
            iomap_base: size_of::<TaskStateSegment>() as u16,
        }
    }
}

/// Segment selectors handed out to code that needs to build a far jump or
/// an `iret` frame into a particular ring.
pub struct Selectors {
    pub kernel_code: u16,
    pub kernel_data: u16,
    pub user_code: u16,
    pub user_data: u16,
    pub tss: u16,
}

fn selector(index: usize, rpl: u16) -> u16 {
    ((index as u16) << 3) | rpl
}

lazy_static! {
    static ref TSS: Mutex<TaskStateSegment> = Mutex::new(TaskStateSegment::new());
}

lazy_static! {
    static ref GDT: ([GdtEntry; GDT_ENTRY_COUNT], Selectors) = {
        let mut entries = [GdtEntry::null(); GDT_ENTRY_COUNT];
        entries[KERNEL_CODE_INDEX] = GdtEntry::flat(0x9A); // present, ring0, code, exec/read
        entries[KERNEL_DATA_INDEX] = GdtEntry::flat(0x92); // present, ring0, data, read/write
        entries[USER_CODE_INDEX] = GdtEntry::flat(0xFA); // present, ring3, code, exec/read
        entries[USER_DATA_INDEX] = GdtEntry::flat(0xF2); // present, ring3, data, read/write

        let tss_base = &*TSS.lock() as *const TaskStateSegment as u32;
        entries[TSS_INDEX] =
            GdtEntry::system(tss_base, (size_of::<TaskStateSegment>() - 1) as u32, 0x89);

        let selectors = Selectors {
            kernel_code: selector(KERNEL_CODE_INDEX, RPL0),
            kernel_data: selector(KERNEL_DATA_INDEX, RPL0),
            user_code: selector(USER_CODE_INDEX, RPL3),
            user_data: selector(USER_DATA_INDEX, RPL3),
            tss: selector(TSS_INDEX, RPL0),
        };

        (entries, selectors)
    };
}

/// Returns the ring-3 code segment selector, used to build the `iret` frame
/// that enters user mode.
#[must_use]
pub fn user_code_selector() -> u16 {
    GDT.1.user_code
}

/// Returns the ring-3 data segment selector.
#[must_use]
pub fn user_data_selector() -> u16 {
    GDT.1.user_data
}

/// Returns the ring-0 kernel data segment selector, loaded into `SS0` for
/// the next process scheduled in.
#[must_use]
pub fn kernel_data_selector() -> u16 {
    GDT.1.kernel_data
}

/// Returns the ring-0 kernel code segment selector, used by every IDT gate
/// that runs in kernel mode.
#[must_use]
pub fn kernel_code_selector() -> u16 {
    GDT.1.kernel_code
}

/// Updates `TSS.esp0`/`TSS.ss0` so the next ring-3-to-ring-0 transition
/// lands on `kernel_stack_top` in the kernel data segment.
///
/// Called by the scheduler on every context switch: each process has its
/// own kernel stack, so the TSS must point at the incoming process's stack
/// before `iret`/the next interrupt can land safely.
pub fn set_kernel_stack(kernel_stack_top: u32) {
    let mut tss = TSS.lock();
    tss.esp0 = kernel_stack_top;
    tss.ss0 = kernel_data_selector();
}

/// Loads the GDT, reloads the code/data segment registers, and loads the
/// task register.
///
/// # Safety
/// Must run once, early in boot, before any far jump, `iret`, or interrupt
/// relies on the GDT being present.
pub unsafe fn init() {
    set_kernel_stack(KERNEL_STACK_TOP);

    let ptr = DescriptorTablePointer {
        limit: (size_of::<[GdtEntry; GDT_ENTRY_COUNT]>() - 1) as u16,
        base: GDT.0.as_ptr() as u32,
    };
    crate::port::lgdt(&ptr);

    let code_selector = GDT.1.kernel_code;
    let data_selector = GDT.1.kernel_data;
    let tss_selector = GDT.1.tss;

    // A far jump is the only way to reload CS; there is no `mov cs, ax`.
    // Pushing the target selector and a label address then `retf`-ing into
    // it is the standard substitute for `ljmp` in inline asm.
    core::arch::asm!(
        "push {code_sel:e}",
        "lea {tmp}, [1f]",
        "push {tmp}",
        "retf",
        "1:",
        "mov ax, {data_sel:x}",
        "mov ds, ax",
        "mov es, ax",
        "mov fs, ax",
        "mov gs, ax",
        "mov ss, ax",
        code_sel = in(reg) u32::from(code_selector),
        data_sel = in(reg) data_selector,
        tmp = out(reg) _,
        out("ax") _,
        options(nostack),
    );

    crate::port::ltr(tss_selector);
}
