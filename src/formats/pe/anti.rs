//! Anti-analysis indicators: VM-detection byte sequences in the raw image and
//! debugger-detection APIs in the import table.

use aho_corasick::AhoCorasick;
use once_cell::sync::Lazy;

/// Known VM-detection byte sequences and their labels.
pub const ANTI_VM_SIGNATURES: &[(&str, &[u8])] = &[
    ("Red Pill", b"\x0f\x01\x0d\x00\x00\x00\x00\xc3"),
    ("VirtualPc trick", b"\x0f\x3f\x07\x0b"),
    ("VMware trick", b"VMXh"),
    ("VMCheck.dll", b"\x45\xc7\x00\x01"),
    (
        "VMCheck.dll for VirtualPC",
        b"\x0f\x3f\x07\x0b\xc7\x45\xfc\xff\xff\xff\xff",
    ),
    ("Xen", b"XenVMM"),
    ("Bochs & QEmu CPUID Trick", b"\x44\x4d\x41\x63"),
    (
        "Torpig VMM Trick",
        b"\xe8\xed\xff\xff\xff\x25\x00\x00\x00\xff\x33\xc9\x3d\x00\x00\x00\x80\x0f\x95\xc1\x8b\xc1\xc3",
    ),
    (
        "Torpig (UPX) VMM Trick",
        b"\x51\x51\x0f\x01\x27\x00\xc1\xfb\xb5\xd5\x35\x02\xe2\xc3\xd1\x66\x25\x32\xbd\x83\x7f\xb7\x4e\x3d\x06\x80\x0f\x95\xc1\x8b\xc1\xc3",
    ),
];

/// Import-name prefixes of debugger-detection APIs.
pub const ANTI_DEBUG_PREFIXES: &[&str] = &[
    "CheckRemoteDebuggerPresent",
    "FindWindow",
    "GetWindowThreadProcessId",
    "IsDebuggerPresent",
    "OutputDebugString",
    "Process32First",
    "Process32Next",
    "TerminateProcess",
    "UnhandledExceptionFilter",
    "ZwQueryInformation",
];

static ANTI_VM_MATCHER: Lazy<AhoCorasick> = Lazy::new(|| {
    AhoCorasick::new(ANTI_VM_SIGNATURES.iter().map(|(_, bytes)| *bytes))
        .expect("valid anti-vm patterns")
});

/// First offset of every anti-VM signature present in `data`, as `"0x<offset> <label>"`.
///
/// Results follow table order. Signatures overlap (the VirtualPC trick is a
/// prefix of the VMCheck.dll variant), so all overlapping matches are considered.
pub fn scan_anti_vm(data: &[u8]) -> Vec<String> {
    let mut first: Vec<Option<usize>> = vec![None; ANTI_VM_SIGNATURES.len()];
    for m in ANTI_VM_MATCHER.find_overlapping_iter(data) {
        let slot = &mut first[m.pattern().as_usize()];
        if slot.map_or(true, |prev| m.start() < prev) {
            *slot = Some(m.start());
        }
    }

    first
        .iter()
        .zip(ANTI_VM_SIGNATURES)
        .filter_map(|(offset, (label, _))| offset.map(|o| format!("0x{:x} {}", o, label)))
        .collect()
}

/// Whether an imported symbol name is a known debugger-detection API.
pub fn is_anti_debug_import(name: &str) -> bool {
    !name.is_empty() && ANTI_DEBUG_PREFIXES.iter().any(|p| name.starts_with(p))
}

/// Format one anti-debug hit as `"0x<address> <name>"`.
pub fn format_anti_debug(address: u64, name: &str) -> String {
    format!("0x{:x} {}", address, name)
}
