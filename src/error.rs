use std::path::Path;

use miette::{miette, Report, Severity};

// Load errors

pub fn load_no_origin(path: &Path) -> Report {
    miette!(
        severity = Severity::Error,
        code = "load::origin",
        help = "a valid image starts with a 16-bit big-endian load origin.",
        "Image file `{}` is too short to contain a load origin.",
        path.display(),
    )
}

pub fn load_unaligned(path: &Path) -> Report {
    miette!(
        severity = Severity::Error,
        code = "load::align",
        help = "images are sequences of 16-bit big-endian words and must have an even byte length.",
        "Image file `{}` is not aligned to 16-bit words.",
        path.display(),
    )
}

pub fn load_overflow(path: &Path, orig: u16, words: usize) -> Report {
    miette!(
        severity = Severity::Error,
        code = "load::overflow",
        help = "the address space ends at 0xFFFF; lower the load origin or shrink the image.",
        "Image file `{}` places {words} words at origin 0x{orig:04X}, overflowing memory.",
        path.display(),
    )
}

// Runtime errors

pub fn reserved_opcode(opcode: u16, addr: u16) -> Report {
    miette!(
        severity = Severity::Error,
        code = "run::reserved",
        help = "opcodes 0x8 (RTI) and 0xD are reserved in this architecture revision; \
                the image is corrupt or was built for a different machine.",
        "Executed reserved opcode 0x{opcode:X} at address 0x{addr:04X}.",
    )
}
